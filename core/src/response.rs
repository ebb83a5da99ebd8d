//! Response interpretation.
//!
//! # Design
//! Each operation accepts a fixed set of status codes and extracts its result
//! from a fixed place: the identifier field of the payload, the payload
//! itself, or the result-count header. Anything outside the accepted set is a
//! `Protocol` error and anything of the wrong shape is a `Shape` error.
//!
//! By-id mutations are the exception: they report success as a boolean and
//! never fail on status. A 404 and a 500 both come back as `Ok(false)`.
//!
//! Every function here is pure; caching of the last payload happens in the
//! driver.

use serde_json::Value;
use tracing::warn;

use crate::error::{ApiError, ApiResult};
use crate::http::HttpResponse;

/// The operation a response answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Insert,
    Find,
    FindById,
    Update,
    UpdateById,
    ReplaceById,
    Delete,
    DeleteById,
    Count,
}

impl Operation {
    /// Status codes treated as success.
    pub fn accepted(&self) -> &'static [u16] {
        match self {
            Operation::Insert => &[200, 201],
            Operation::Find | Operation::FindById | Operation::Update => &[200],
            Operation::UpdateById
            | Operation::ReplaceById
            | Operation::Delete
            | Operation::DeleteById
            | Operation::Count => &[200, 204],
        }
    }
}

/// Typed result of an interpreted response.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Id(Value),
    Entities(Vec<Value>),
    Entity(Option<Value>),
    Count(u64),
    Applied(bool),
}

/// Names the response fields an interpretation reads.
#[derive(Debug, Clone, Copy)]
pub struct Interpreter<'a> {
    pub identifier: &'a str,
    pub count_header: &'a str,
}

impl Interpreter<'_> {
    /// Interpret `response` as the answer to `operation`. Hosts that run
    /// their own I/O on top of the `build_*` methods dispatch through here.
    pub fn interpret(&self, operation: Operation, response: &HttpResponse) -> ApiResult<Outcome> {
        match operation {
            Operation::Insert => self.parse_insert(response).map(Outcome::Id),
            Operation::Find => parse_find(response).map(Outcome::Entities),
            Operation::FindById => parse_find_by_id(response).map(Outcome::Entity),
            Operation::Update => self.parse_update(response).map(Outcome::Count),
            Operation::Delete => self.parse_delete(response).map(Outcome::Count),
            Operation::Count => self.parse_count(response).map(Outcome::Count),
            Operation::UpdateById | Operation::ReplaceById | Operation::DeleteById => {
                Ok(Outcome::Applied(parse_applied(operation, response)))
            }
        }
    }

    /// Extract the identifier of a freshly inserted entity.
    pub fn parse_insert(&self, response: &HttpResponse) -> ApiResult<Value> {
        check_status(response, Operation::Insert)?;
        match response.payload()? {
            Some(Value::Object(mut entity)) => entity.remove(self.identifier).ok_or_else(|| {
                ApiError::Shape(format!(
                    "inserted entity has no `{}` field",
                    self.identifier
                ))
            }),
            Some(Value::Array(_)) => Err(ApiError::Shape(
                "insert returned an array, expected one entity".to_string(),
            )),
            Some(_) | None => Err(ApiError::Shape(
                "insert returned no entity".to_string(),
            )),
        }
    }

    pub fn parse_update(&self, response: &HttpResponse) -> ApiResult<u64> {
        check_status(response, Operation::Update)?;
        self.result_count(response)
    }

    pub fn parse_delete(&self, response: &HttpResponse) -> ApiResult<u64> {
        check_status(response, Operation::Delete)?;
        self.result_count(response)
    }

    pub fn parse_count(&self, response: &HttpResponse) -> ApiResult<u64> {
        check_status(response, Operation::Count)?;
        self.result_count(response)
    }

    fn result_count(&self, response: &HttpResponse) -> ApiResult<u64> {
        let raw = response.header(self.count_header).ok_or_else(|| {
            ApiError::Shape(format!("missing `{}` header", self.count_header))
        })?;
        raw.trim().parse().map_err(|_| {
            ApiError::Shape(format!(
                "`{}` header is not a count: `{raw}`",
                self.count_header
            ))
        })
    }
}

pub fn parse_find(response: &HttpResponse) -> ApiResult<Vec<Value>> {
    check_status(response, Operation::Find)?;
    match response.payload()? {
        Some(Value::Array(entities)) => Ok(entities),
        _ => Err(ApiError::Shape("find expects an array payload".to_string())),
    }
}

pub fn parse_find_by_id(response: &HttpResponse) -> ApiResult<Option<Value>> {
    check_status(response, Operation::FindById)?;
    Ok(response.payload()?.filter(|entity| !entity.is_null()))
}

/// Result of a by-id mutation. Never an error.
pub fn parse_applied(operation: Operation, response: &HttpResponse) -> bool {
    let applied = operation.accepted().contains(&response.status);
    if !applied {
        warn!(
            method = %response.input.method,
            path = %response.input.path,
            status = response.status,
            "by-id mutation was not applied"
        );
    }
    applied
}

/// Map a status outside the accepted set to a `Protocol` error.
fn check_status(response: &HttpResponse, operation: Operation) -> ApiResult<()> {
    if operation.accepted().contains(&response.status) {
        return Ok(());
    }
    Err(ApiError::Protocol {
        method: response.input.method,
        path: response.input.path.clone(),
        status: response.status,
        message: response.message.clone(),
    })
}
