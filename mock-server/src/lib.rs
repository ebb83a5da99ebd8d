//! In-memory REST server speaking the driver's path grammar.
//!
//! Every collection is addressed as `/{storage}`; the rest of the path is an
//! identifier, `count`, or an encoded query decoded with the driver's own
//! codec. Documents live in a `RwLock`ed map per collection.

pub mod filter;

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use indexmap::IndexMap;
use percent_encoding::percent_decode_str;
use rest_driver::{codec, ColumnType, Model, Query};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::filter::{project, select};

pub const COUNT_HEADER: &str = "x-api-count";
pub const AUTH_HEADER: &str = "x-api-key";

/// Collections served by default.
pub fn models() -> Vec<Model> {
    vec![
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
                Model::new("address")
                    .column("city", ColumnType::Text)
                    .column("zip", ColumnType::Text),
            ),
        Model::new("note")
            .storage("notes")
            .identified_by("key")
            .column("key", ColumnType::Text)
            .column("title", ColumnType::Text)
            .column("done", ColumnType::Boolean),
    ]
}

pub type Db = Arc<RwLock<HashMap<String, IndexMap<String, Value>>>>;

#[derive(Clone)]
pub struct AppState {
    db: Db,
    models: Arc<Vec<Model>>,
    api_key: Option<String>,
}

pub fn app() -> Router {
    app_with_key(None)
}

/// Router that rejects requests without a matching `x-api-key` header.
pub fn app_with_key(api_key: Option<String>) -> Router {
    let state = AppState {
        db: Arc::new(RwLock::new(HashMap::new())),
        models: Arc::new(models()),
        api_key,
    };
    Router::new()
        .route(
            "/{*path}",
            get(find).post(insert).patch(update).delete(remove),
        )
        .with_state(state)
}

pub async fn run_with_key(listener: TcpListener, api_key: Option<String>) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_key(api_key)).await
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("unknown collection `{0}`")]
    UnknownCollection(String),
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    BadRequest(String),
    #[error("missing or invalid api key")]
    Unauthorized,
    #[error("method not allowed")]
    MethodNotAllowed,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match self {
            ServerError::UnknownCollection(_) | ServerError::NotFound => StatusCode::NOT_FOUND,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServerError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

impl From<rest_driver::CodecError> for ServerError {
    fn from(err: rest_driver::CodecError) -> Self {
        ServerError::BadRequest(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

enum Target {
    Collection(Query),
    Count(Query),
    Item(String, Query),
}

struct Resolved {
    model: Model,
    target: Target,
}

fn resolve(state: &AppState, headers: &HeaderMap, uri: &Uri) -> Result<Resolved, ServerError> {
    if let Some(key) = &state.api_key {
        let given = headers.get(AUTH_HEADER).and_then(|v| v.to_str().ok());
        if given != Some(key.as_str()) {
            return Err(ServerError::Unauthorized);
        }
    }

    let path = uri.path().trim_start_matches('/');
    let (storage, rest) = path.split_once('/').unwrap_or((path, ""));
    let model = state
        .models
        .iter()
        .find(|model| model.storage_path().is_ok_and(|p| p == storage))
        .cloned()
        .ok_or_else(|| ServerError::UnknownCollection(storage.to_string()))?;

    let (head, tail) = rest.split_once('/').unwrap_or((rest, ""));
    let target = match head {
        "" => Target::Collection(Query::default()),
        codec::QUERY_TAG => Target::Collection(codec::decode(&model, rest)?),
        "count" => Target::Count(codec::decode(&model, tail)?),
        id => {
            let id = percent_decode_str(id)
                .decode_utf8()
                .map_err(|_| ServerError::BadRequest("identifier is not UTF-8".to_string()))?;
            Target::Item(id.into_owned(), codec::decode(&model, tail)?)
        }
    };
    Ok(Resolved { model, target })
}

fn counted(status: StatusCode, count: usize, body: Option<Value>) -> Response {
    let mut response = match body {
        Some(body) => (status, Json(body)).into_response(),
        None => status.into_response(),
    };
    response
        .headers_mut()
        .insert(COUNT_HEADER, HeaderValue::from(count));
    response
}

fn storage(model: &Model) -> String {
    model.storage_path().unwrap_or_default().to_string()
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn find(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, ServerError> {
    debug!(path = uri.path(), "GET");
    let Resolved { model, target } = resolve(&state, &headers, &uri)?;
    let db = state.db.read().await;
    let documents = db.get(&storage(&model));
    let all = documents.into_iter().flat_map(|docs| docs.values());
    match target {
        Target::Collection(query) => {
            let selection = select(all, &query).map_err(ServerError::BadRequest)?;
            Ok(counted(
                StatusCode::OK,
                selection.total,
                Some(Value::Array(selection.documents)),
            ))
        }
        Target::Count(query) => {
            let selection = select(all, &query).map_err(ServerError::BadRequest)?;
            Ok(counted(StatusCode::NO_CONTENT, selection.total, None))
        }
        Target::Item(id, query) => {
            let document = documents
                .and_then(|docs| docs.get(&id))
                .ok_or(ServerError::NotFound)?;
            let document = match &query.fields {
                Some(fields) => project(document, fields),
                None => document.clone(),
            };
            Ok(Json(document).into_response())
        }
    }
}

async fn insert(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    Json(body): Json<Value>,
) -> Result<Response, ServerError> {
    debug!(path = uri.path(), "POST");
    let Resolved { model, target } = resolve(&state, &headers, &uri)?;
    let Value::Object(mut document) = body else {
        return Err(ServerError::BadRequest("expected a JSON object".to_string()));
    };
    let identifier = model.identifier().to_string();
    let mut db = state.db.write().await;
    let collection = db.entry(storage(&model)).or_default();
    match target {
        Target::Collection(_) => {
            let id = match document.get(&identifier) {
                Some(Value::String(id)) => id.clone(),
                Some(Value::Number(id)) => id.to_string(),
                _ => Uuid::new_v4().to_string(),
            };
            document.insert(identifier, Value::String(id.clone()));
            let document = Value::Object(document);
            collection.insert(id, document.clone());
            Ok((StatusCode::CREATED, Json(document)).into_response())
        }
        Target::Item(id, _) => {
            let existing = collection.get_mut(&id).ok_or(ServerError::NotFound)?;
            document.insert(identifier, Value::String(id));
            *existing = Value::Object(document);
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        Target::Count(_) => Err(ServerError::MethodNotAllowed),
    }
}

async fn update(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    Json(body): Json<Value>,
) -> Result<Response, ServerError> {
    debug!(path = uri.path(), "PATCH");
    let Resolved { model, target } = resolve(&state, &headers, &uri)?;
    let Value::Object(mut patch) = body else {
        return Err(ServerError::BadRequest("expected a JSON object".to_string()));
    };
    patch.shift_remove(model.identifier());
    let mut db = state.db.write().await;
    let collection = db.entry(storage(&model)).or_default();
    let merge = |document: &mut Value| {
        if let Value::Object(fields) = document {
            for (key, value) in &patch {
                fields.insert(key.clone(), value.clone());
            }
        }
    };
    match target {
        Target::Collection(query) => {
            let ids = matching_ids(collection, &model, &query)?;
            for id in &ids {
                if let Some(document) = collection.get_mut(id) {
                    merge(document);
                }
            }
            Ok(counted(StatusCode::OK, ids.len(), None))
        }
        Target::Item(id, _) => {
            let document = collection.get_mut(&id).ok_or(ServerError::NotFound)?;
            merge(document);
            Ok(StatusCode::NO_CONTENT.into_response())
        }
        Target::Count(_) => Err(ServerError::MethodNotAllowed),
    }
}

async fn remove(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, ServerError> {
    debug!(path = uri.path(), "DELETE");
    let Resolved { model, target } = resolve(&state, &headers, &uri)?;
    let mut db = state.db.write().await;
    let collection = db.entry(storage(&model)).or_default();
    match target {
        Target::Collection(query) => {
            let ids = matching_ids(collection, &model, &query)?;
            for id in &ids {
                collection.shift_remove(id);
            }
            Ok(counted(StatusCode::NO_CONTENT, ids.len(), None))
        }
        Target::Item(id, _) => {
            collection
                .shift_remove(&id)
                .map(|_| StatusCode::NO_CONTENT.into_response())
                .ok_or(ServerError::NotFound)
        }
        Target::Count(_) => Err(ServerError::MethodNotAllowed),
    }
}

/// Identifiers of the documents a bulk mutation touches.
fn matching_ids(
    collection: &IndexMap<String, Value>,
    model: &Model,
    query: &Query,
) -> Result<Vec<String>, ServerError> {
    let selection = select(collection.values(), query).map_err(ServerError::BadRequest)?;
    Ok(selection
        .documents
        .iter()
        .filter_map(|document| document.get(model.identifier()))
        .filter_map(|id| id.as_str().map(str::to_string))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_models_have_storage_paths() {
        for model in models() {
            assert!(model.storage_path().is_ok(), "{}", model.name());
        }
    }

    #[test]
    fn server_errors_map_to_status_codes() {
        assert_eq!(
            ServerError::NotFound.into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServerError::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        let codec_error: ServerError = rest_driver::CodecError::Format("x".to_string()).into();
        assert_eq!(codec_error.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
