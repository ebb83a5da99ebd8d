//! Verify the codec and the response interpreter against JSON test vectors
//! stored in `test-vectors/`.
//!
//! Paths are compared byte for byte: they are the wire contract with the
//! server. Decoded queries are compared structurally.

use rest_driver::{
    codec, ApiError, CodecError, ColumnType, HttpMethod, HttpResponse, Interpreter, Model,
    Operation, Outcome, Query, RequestLine,
};
use serde_json::Value;

fn user_model() -> Model {
    Model::new("user")
        .storage("users")
        .column("id", ColumnType::Text)
        .column("name", ColumnType::Text)
        .column("age", ColumnType::Integer)
        .column("score", ColumnType::Float)
        .column("active", ColumnType::Boolean)
        .column("tags", ColumnType::Json)
        .embedded(
            "address",
            Model::new("address").column("city", ColumnType::Text),
        )
}

fn codec_error_kind(err: &CodecError) -> &'static str {
    match err {
        CodecError::Schema { .. } => "Schema",
        CodecError::Format(_) => "Format",
        CodecError::Operator { .. } => "Operator",
    }
}

fn parse_operation(s: &str) -> Operation {
    match s {
        "insert" => Operation::Insert,
        "find" => Operation::Find,
        "find_by_id" => Operation::FindById,
        "update" => Operation::Update,
        "update_by_id" => Operation::UpdateById,
        "replace_by_id" => Operation::ReplaceById,
        "delete" => Operation::Delete,
        "delete_by_id" => Operation::DeleteById,
        "count" => Operation::Count,
        other => panic!("unknown operation: {other}"),
    }
}

/// Translate the `expected` object of a response vector into an `Outcome`.
fn parse_outcome(expected: &Value) -> Outcome {
    let (key, value) = expected.as_object().unwrap().iter().next().unwrap();
    match key.as_str() {
        "id" => Outcome::Id(value.clone()),
        "entities" => Outcome::Entities(value.as_array().unwrap().clone()),
        "entity" => Outcome::Entity((!value.is_null()).then(|| value.clone())),
        "count" => Outcome::Count(value.as_u64().unwrap()),
        "applied" => Outcome::Applied(value.as_bool().unwrap()),
        other => panic!("unknown outcome: {other}"),
    }
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

#[test]
fn codec_test_vectors() {
    let raw = include_str!("../../test-vectors/codec.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();
    let model = user_model();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let query: Query = serde_json::from_value(case["query"].clone()).unwrap();
        let path = case["path"].as_str().unwrap();

        assert_eq!(codec::encode(&model, &query).unwrap(), path, "{name}: encode");
        assert_eq!(codec::decode(&model, path).unwrap(), query, "{name}: decode");
    }
}

#[test]
fn codec_decode_error_vectors() {
    let raw = include_str!("../../test-vectors/codec.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();
    let model = user_model();

    for case in vectors["decode_errors"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let err = codec::decode(&model, case["path"].as_str().unwrap()).unwrap_err();
        assert_eq!(codec_error_kind(&err), case["error"], "{name}");
    }
}

#[test]
fn codec_encode_error_vectors() {
    let raw = include_str!("../../test-vectors/codec.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();
    let model = user_model();

    for case in vectors["encode_errors"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let query: Query = serde_json::from_value(case["query"].clone()).unwrap();
        let err = codec::encode(&model, &query).unwrap_err();
        assert_eq!(codec_error_kind(&err), case["error"], "{name}");
    }
}

#[test]
fn non_query_paths_decode_to_nothing() {
    let raw = include_str!("../../test-vectors/codec.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();
    let model = user_model();

    for path in vectors["not_queries"].as_array().unwrap() {
        let path = path.as_str().unwrap();
        assert_eq!(codec::decode(&model, path).unwrap(), Query::new(), "{path:?}");
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[test]
fn response_test_vectors() {
    let raw = include_str!("../../test-vectors/responses.json");
    let vectors: Value = serde_json::from_str(raw).unwrap();
    let interpreter = Interpreter {
        identifier: vectors["identifier"].as_str().unwrap(),
        count_header: vectors["count_header"].as_str().unwrap(),
    };

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let operation = parse_operation(case["operation"].as_str().unwrap());
        let headers = case["headers"]
            .as_array()
            .map(|headers| {
                headers
                    .iter()
                    .map(|h| {
                        let pair = h.as_array().unwrap();
                        (
                            pair[0].as_str().unwrap().to_string(),
                            pair[1].as_str().unwrap().to_string(),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();
        let response = HttpResponse {
            input: RequestLine {
                method: HttpMethod::Get,
                path: "users".to_string(),
            },
            status: case["status"].as_u64().unwrap() as u16,
            message: String::new(),
            headers,
            body: case["body"].as_str().unwrap().to_string(),
        };

        let result = interpreter.interpret(operation, &response);

        if let Some(expected_error) = case.get("expected_error") {
            let err = result.unwrap_err();
            match expected_error.as_str().unwrap() {
                "Protocol" => assert!(matches!(err, ApiError::Protocol { .. }), "{name}: {err}"),
                "Shape" => assert!(matches!(err, ApiError::Shape(_)), "{name}: {err}"),
                other => panic!("{name}: unknown expected_error: {other}"),
            }
        } else {
            assert_eq!(result.unwrap(), parse_outcome(&case["expected"]), "{name}");
        }
    }
}
