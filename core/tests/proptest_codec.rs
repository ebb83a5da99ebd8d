//! Property tests for the query codec (encode/decode roundtrips)

use proptest::prelude::*;
use rest_driver::{
    codec, ColumnType, LimitSpec, MatchExpression, MatchOperation, MatchRules, Model, Operator,
    Order, Query, SortSpec,
};
use serde_json::Value;

const COLUMNS: [&str; 6] = ["name", "age", "score", "active", "tags", "address.city"];

fn model() -> Model {
    Model::new("user")
        .storage("users")
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

/// Strings that look like other JSON values once their quotes are gone.
fn arb_lookalike() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("null".to_string()),
        Just("true".to_string()),
        any::<i64>().prop_map(|n| n.to_string()),
        any::<String>(),
    ]
}

/// A value of the column's type.
fn arb_value(column: &'static str) -> BoxedStrategy<Value> {
    match column {
        "age" => prop_oneof![
            any::<i64>().prop_map(Value::from),
            any::<u64>().prop_map(Value::from),
            Just(Value::Null),
        ]
        .boxed(),
        "score" => prop_oneof![
            any::<f64>().prop_map(Value::from),
            (-1000i64..1000).prop_map(|n| Value::from(n as f64)),
            any::<i64>().prop_map(Value::from),
            Just(Value::Null),
        ]
        .boxed(),
        "active" => prop_oneof![any::<bool>().prop_map(Value::from), Just(Value::Null)].boxed(),
        "tags" => prop_oneof![
            arb_lookalike().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
            Just(Value::Null),
        ]
        .boxed(),
        _ => arb_lookalike().prop_map(Value::from).boxed(),
    }
}

fn arb_operation(column: &'static str) -> BoxedStrategy<MatchOperation> {
    let scalar = (
        prop::sample::select(vec![
            Operator::LessThan,
            Operator::LessThanOrEqual,
            Operator::Equal,
            Operator::NotEqual,
            Operator::GreaterOrEqual,
            Operator::GreaterThan,
        ]),
        arb_value(column),
    )
        .prop_map(|(operator, value)| MatchOperation { operator, value });
    let sequence = (
        prop::sample::select(vec![Operator::Between, Operator::Contain, Operator::NotContain]),
        prop::collection::vec(arb_value(column), 0..4),
    )
        .prop_map(|(operator, values)| MatchOperation {
            operator,
            value: Value::Array(values),
        });
    let pattern = (any::<String>(), "[imsx]{0,3}")
        .prop_map(|(source, flags)| MatchOperation::regexp(&source, &flags));
    prop_oneof![scalar, sequence, pattern].boxed()
}

fn arb_expression() -> impl Strategy<Value = MatchExpression> {
    prop::collection::vec(
        prop::sample::select(COLUMNS.to_vec())
            .prop_flat_map(|column| arb_operation(column).prop_map(move |op| (column, op))),
        1..4,
    )
    .prop_map(|conditions| {
        conditions
            .into_iter()
            .fold(MatchExpression::new(), |expression, (column, operation)| {
                expression.with_operation(column, operation)
            })
    })
}

fn arb_rules() -> impl Strategy<Value = Option<MatchRules>> {
    prop::option::of(prop::collection::vec(arb_expression(), 1..4).prop_map(MatchRules::Any))
}

fn arb_sort() -> impl Strategy<Value = Option<SortSpec>> {
    let keys = prop::sample::subsequence(COLUMNS.to_vec(), 1..=COLUMNS.len()).prop_flat_map(
        |columns| {
            let n = columns.len();
            (Just(columns), prop::collection::vec(any::<bool>(), n))
        },
    );
    prop::option::of(keys.prop_map(|(columns, descending)| {
        columns
            .into_iter()
            .zip(descending)
            .map(|(column, desc)| {
                let order = if desc { Order::Descending } else { Order::Ascending };
                (column.to_string(), order)
            })
            .collect::<SortSpec>()
    }))
}

fn arb_query() -> impl Strategy<Value = Query> {
    (
        arb_rules(),
        arb_rules(),
        arb_sort(),
        prop::option::of((any::<u64>(), any::<u64>())),
        prop::option::of(prop::sample::subsequence(COLUMNS.to_vec(), 1..=COLUMNS.len())),
    )
        .prop_map(|(pre, post, sort, limit, fields)| Query {
            pre,
            post,
            sort,
            limit: limit.map(|(start, count)| LimitSpec { start, count }),
            fields: fields.map(|fields| fields.into_iter().map(str::to_string).collect()),
        })
}

proptest! {
    /// decode(encode(q)) == q for every query the model accepts
    #[test]
    fn encode_then_decode_is_identity(query in arb_query()) {
        let model = model();
        let path = codec::encode(&model, &query).unwrap();
        prop_assert!(path.starts_with(codec::QUERY_TAG));
        let decoded = codec::decode(&model, &path).unwrap();
        prop_assert_eq!(decoded, query);
    }

    /// Encoded paths are plain printable ASCII
    #[test]
    fn tokens_are_printable_ascii(query in arb_query()) {
        let path = codec::encode(&model(), &query).unwrap();
        prop_assert!(path.bytes().all(|b| b.is_ascii_graphic()));
    }

    /// Duplicated field lists encode like their deduplicated form
    #[test]
    fn duplicate_fields_encode_once(
        fields in prop::collection::vec(prop::sample::select(COLUMNS.to_vec()), 1..10)
    ) {
        let model = model();
        let mut unique: Vec<&str> = Vec::new();
        for field in &fields {
            if !unique.contains(field) {
                unique.push(*field);
            }
        }
        let with_duplicates = codec::encode(&model, &Query::new().fields(fields.clone())).unwrap();
        let deduplicated = codec::encode(&model, &Query::new().fields(unique.clone())).unwrap();
        prop_assert_eq!(&with_duplicates, &deduplicated);

        let decoded = codec::decode(&model, &with_duplicates).unwrap();
        let expected: Vec<String> = unique.into_iter().map(str::to_string).collect();
        prop_assert_eq!(decoded.fields, Some(expected));
    }
}
