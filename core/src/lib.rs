//! Client-side REST data-access driver.
//!
//! # Overview
//! Maps CRUD and query operations on registered entity models onto a REST
//! API. Filters, sort orders, pagination and field projections are packed
//! into a compact, reversible URL path suffix by the query codec; responses
//! are turned into typed results by the response interpreter.
//!
//! # Design
//! - `Model` describes an entity: storage path, identifier field, columns.
//! - `codec::encode` / `codec::decode` are pure and validate every column
//!   path against the model.
//! - `Driver` builds `HttpRequest` values and hands them to a caller-supplied
//!   `Transport`; it never opens a socket itself.
//! - By-id mutations report success as a boolean; every other operation
//!   raises a classified `ApiError`.

pub mod codec;
pub mod driver;
pub mod error;
pub mod extract;
pub mod http;
pub mod model;
pub mod query;
pub mod response;

pub use codec::{decode, encode};
pub use driver::{Driver, DriverConfig};
pub use error::{ApiError, ApiResult, CodecError, CodecResult, ErrorKind};
pub use extract::{extract, extract_all};
pub use http::{HttpMethod, HttpRequest, HttpResponse, RequestLine, Transport, TransportError};
pub use model::{Column, ColumnType, Model};
pub use query::{
    LimitSpec, MatchExpression, MatchOperation, MatchRules, Operator, Order, Query, SortSpec,
};
pub use response::{Interpreter, Operation, Outcome};
