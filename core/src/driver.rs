//! Driver façade: path construction, dispatch and result interpretation.
//!
//! # Design
//! `Driver` owns its configuration and a `Transport`. Every operation is
//! split the same way: a `build_*` method produces the `HttpRequest`, the
//! transport executes it, and the matching `Interpreter` method turns the
//! response into a typed result. Callers that run their own I/O can use the
//! `build_*` methods alone.
//!
//! Request paths are `{storage}[/{extra}][/{query}]`. By-id operations use
//! the extra path `:id` and `count` uses `count`; a template installed with
//! `with_path` replaces that default for the next request only.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::codec::{self, encode_component};
use crate::error::{ApiError, ApiResult};
use crate::extract::extract;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport};
use crate::model::Model;
use crate::query::Query;
use crate::response::{parse_applied, parse_find, parse_find_by_id, Interpreter, Operation};

/// Placeholder replaced by the percent-encoded identifier in extra paths.
pub const ID_PLACEHOLDER: &str = ":id";

const COUNT_PATH: &str = "count";

/// Connection settings. Deserializable so it can live in a config file;
/// missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub auth_header: String,
    pub count_header: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: None,
            auth_header: "x-api-key".to_string(),
            count_header: "x-api-count".to_string(),
        }
    }
}

impl DriverConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            ..Self::default()
        }
    }
}

/// REST data-access driver.
#[derive(Debug)]
pub struct Driver<T> {
    config: DriverConfig,
    transport: T,
    extra_path: Option<String>,
    last_payload: Option<Value>,
}

impl<T: Transport> Driver<T> {
    pub fn connect(config: DriverConfig, transport: T) -> Self {
        let mut config = config;
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        Self {
            config,
            transport,
            extra_path: None,
            last_payload: None,
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn set_base_url(&mut self, base_url: &str) {
        self.config.base_url = base_url.trim_end_matches('/').to_string();
    }

    pub fn set_api_key(&mut self, api_key: Option<&str>) {
        self.config.api_key = api_key.map(str::to_string);
    }

    pub fn set_auth_header(&mut self, name: &str) {
        self.config.auth_header = name.to_string();
    }

    pub fn set_count_header(&mut self, name: &str) {
        self.config.count_header = name.to_string();
    }

    /// Install an extra path for the next request only. `:id` in the
    /// template is replaced with the identifier of a by-id call; operations
    /// without an identifier reject a template that contains it.
    pub fn with_path(&mut self, template: &str) -> &mut Self {
        self.extra_path = Some(template.to_string());
        self
    }

    /// Payload of the most recent response, successful or not.
    pub fn last_payload(&self) -> Option<&Value> {
        self.last_payload.as_ref()
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Insert one entity and return the identifier the server assigned.
    pub fn insert<E: Serialize + ?Sized>(&mut self, model: &Model, entity: &E) -> ApiResult<Value> {
        let request = self.build_insert(model, entity)?;
        let response = self.execute(request)?;
        self.interpreter(model).parse_insert(&response)
    }

    pub fn find(&mut self, model: &Model, query: &Query) -> ApiResult<Vec<Value>> {
        let request = self.build_find(model, query)?;
        let response = self.execute(request)?;
        parse_find(&response)
    }

    /// Fetch one entity, optionally projected onto `fields`.
    pub fn find_by_id(&mut self, model: &Model, id: &str, fields: &[&str]) -> ApiResult<Option<Value>> {
        let request = self.build_find_by_id(model, id, fields)?;
        let response = self.execute(request)?;
        parse_find_by_id(&response)
    }

    /// Apply `patch` to every entity matching `query`; returns the count.
    pub fn update<E: Serialize + ?Sized>(
        &mut self,
        model: &Model,
        query: &Query,
        patch: &E,
    ) -> ApiResult<u64> {
        let request = self.build_update(model, query, patch)?;
        let response = self.execute(request)?;
        self.interpreter(model).parse_update(&response)
    }

    pub fn update_by_id<E: Serialize + ?Sized>(
        &mut self,
        model: &Model,
        id: &str,
        patch: &E,
    ) -> ApiResult<bool> {
        let request = self.build_update_by_id(model, id, patch)?;
        let response = self.execute(request)?;
        Ok(parse_applied(Operation::UpdateById, &response))
    }

    pub fn replace_by_id<E: Serialize + ?Sized>(
        &mut self,
        model: &Model,
        id: &str,
        entity: &E,
    ) -> ApiResult<bool> {
        let request = self.build_replace_by_id(model, id, entity)?;
        let response = self.execute(request)?;
        Ok(parse_applied(Operation::ReplaceById, &response))
    }

    pub fn delete(&mut self, model: &Model, query: &Query) -> ApiResult<u64> {
        let request = self.build_delete(model, query)?;
        let response = self.execute(request)?;
        self.interpreter(model).parse_delete(&response)
    }

    pub fn delete_by_id(&mut self, model: &Model, id: &str) -> ApiResult<bool> {
        let request = self.build_delete_by_id(model, id)?;
        let response = self.execute(request)?;
        Ok(parse_applied(Operation::DeleteById, &response))
    }

    pub fn count(&mut self, model: &Model, query: &Query) -> ApiResult<u64> {
        let request = self.build_count(model, query)?;
        let response = self.execute(request)?;
        self.interpreter(model).parse_count(&response)
    }

    // -----------------------------------------------------------------------
    // Request builders
    //
    // Builders take `&mut self` because they consume the one-shot extra path.
    // -----------------------------------------------------------------------

    pub fn build_insert<E: Serialize + ?Sized>(
        &mut self,
        model: &Model,
        entity: &E,
    ) -> ApiResult<HttpRequest> {
        let path = self.path(model, None, None, None)?;
        Ok(self.request(HttpMethod::Post, path, Some(extract(entity)?)))
    }

    pub fn build_find(&mut self, model: &Model, query: &Query) -> ApiResult<HttpRequest> {
        let path = self.path(model, None, None, Some(query))?;
        Ok(self.request(HttpMethod::Get, path, None))
    }

    pub fn build_find_by_id(
        &mut self,
        model: &Model,
        id: &str,
        fields: &[&str],
    ) -> ApiResult<HttpRequest> {
        let query = Query::new().fields(fields.iter().copied());
        let path = self.path(model, Some(ID_PLACEHOLDER), Some(id), Some(&query))?;
        Ok(self.request(HttpMethod::Get, path, None))
    }

    pub fn build_update<E: Serialize + ?Sized>(
        &mut self,
        model: &Model,
        query: &Query,
        patch: &E,
    ) -> ApiResult<HttpRequest> {
        let path = self.path(model, None, None, Some(query))?;
        Ok(self.request(HttpMethod::Patch, path, Some(extract(patch)?)))
    }

    pub fn build_update_by_id<E: Serialize + ?Sized>(
        &mut self,
        model: &Model,
        id: &str,
        patch: &E,
    ) -> ApiResult<HttpRequest> {
        let path = self.path(model, Some(ID_PLACEHOLDER), Some(id), None)?;
        Ok(self.request(HttpMethod::Patch, path, Some(extract(patch)?)))
    }

    pub fn build_replace_by_id<E: Serialize + ?Sized>(
        &mut self,
        model: &Model,
        id: &str,
        entity: &E,
    ) -> ApiResult<HttpRequest> {
        let path = self.path(model, Some(ID_PLACEHOLDER), Some(id), None)?;
        Ok(self.request(HttpMethod::Post, path, Some(extract(entity)?)))
    }

    pub fn build_delete(&mut self, model: &Model, query: &Query) -> ApiResult<HttpRequest> {
        let path = self.path(model, None, None, Some(query))?;
        Ok(self.request(HttpMethod::Delete, path, None))
    }

    pub fn build_delete_by_id(&mut self, model: &Model, id: &str) -> ApiResult<HttpRequest> {
        let path = self.path(model, Some(ID_PLACEHOLDER), Some(id), None)?;
        Ok(self.request(HttpMethod::Delete, path, None))
    }

    pub fn build_count(&mut self, model: &Model, query: &Query) -> ApiResult<HttpRequest> {
        let path = self.path(model, Some(COUNT_PATH), None, Some(query))?;
        Ok(self.request(HttpMethod::Get, path, None))
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn interpreter<'a>(&'a self, model: &'a Model) -> Interpreter<'a> {
        Interpreter {
            identifier: model.identifier(),
            count_header: &self.config.count_header,
        }
    }

    /// `{storage}[/{extra}][/{query}]`. The one-shot template is taken
    /// before anything can fail, so a failed build still consumes it.
    fn path(
        &mut self,
        model: &Model,
        default_extra: Option<&str>,
        id: Option<&str>,
        query: Option<&Query>,
    ) -> ApiResult<String> {
        let template = self.extra_path.take();
        let mut path = model.storage_path()?.to_string();

        if let Some(extra) = template.as_deref().or(default_extra) {
            let extra = match id {
                Some(id) => extra.replace(ID_PLACEHOLDER, &encode_component(id)),
                None if extra.contains(ID_PLACEHOLDER) => {
                    return Err(ApiError::UnboundPlaceholder(extra.to_string()));
                }
                None => extra.to_string(),
            };
            let extra = extra.trim_matches('/');
            if !extra.is_empty() {
                path.push('/');
                path.push_str(extra);
            }
        }

        if let Some(query) = query.filter(|query| !query.is_empty()) {
            path.push('/');
            path.push_str(&codec::encode(model, query)?);
        }
        Ok(path)
    }

    fn request(&self, method: HttpMethod, path: String, body: Option<Value>) -> HttpRequest {
        let mut headers = Vec::new();
        if let Some(key) = &self.config.api_key {
            headers.push((self.config.auth_header.clone(), key.clone()));
        }
        if body.is_some() {
            headers.push(("content-type".to_string(), "application/json".to_string()));
        }
        HttpRequest {
            method,
            url: format!("{}/{path}", self.config.base_url),
            path,
            headers,
            body: body.map(|value| value.to_string()),
        }
    }

    /// Run a request through the transport and remember its payload.
    fn execute(&mut self, request: HttpRequest) -> ApiResult<HttpResponse> {
        debug!(method = %request.method, path = %request.path, "dispatching request");
        let response = self.transport.request(request)?;
        debug!(
            method = %response.input.method,
            path = %response.input.path,
            status = response.status,
            "received response"
        );
        self.last_payload = match response.payload() {
            Ok(payload) => payload,
            Err(_) => Some(Value::String(response.body.clone())),
        };
        Ok(response)
    }
}
