//! Entity model descriptors.
//!
//! A `Model` is registered once by the caller and describes where an entity
//! lives on the server (`storage_path`), which field carries its identifier,
//! and which columns exist. The codec only ever asks it two things: does a
//! column path resolve, and how should a decoded token be typed.

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{ApiError, ApiResult, CodecError, CodecResult};

/// Column value kind, used to restore JSON types on decode.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnType {
    Text,
    Integer,
    Float,
    Boolean,
    Json,
    Embedded(Model),
}

impl ColumnType {
    /// Render a value as the wire token `cast` reads back. Json and embedded
    /// columns always carry JSON text, so a string operand travels quoted.
    pub fn token(&self, value: &Value) -> String {
        match (self, value) {
            (ColumnType::Json | ColumnType::Embedded(_), value) => value.to_string(),
            (_, Value::String(s)) => s.clone(),
            (_, other) => other.to_string(),
        }
    }

    /// Cast a percent-decoded wire token back into a JSON value.
    pub fn cast(&self, token: &str) -> CodecResult<Value> {
        if token == "null" && !matches!(self, ColumnType::Text) {
            return Ok(Value::Null);
        }
        match self {
            ColumnType::Text => Ok(Value::String(token.to_string())),
            ColumnType::Integer => integer(token)
                .ok_or_else(|| CodecError::Format(format!("`{token}` is not an integer"))),
            // Integral tokens stay integers so `3` and `3.0` keep their JSON form.
            ColumnType::Float => integer(token)
                .or_else(|| {
                    token
                        .parse::<f64>()
                        .ok()
                        .and_then(serde_json::Number::from_f64)
                        .map(Value::Number)
                })
                .ok_or_else(|| CodecError::Format(format!("`{token}` is not a float"))),
            ColumnType::Boolean => match token {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(CodecError::Format(format!("`{token}` is not a boolean"))),
            },
            ColumnType::Json | ColumnType::Embedded(_) => serde_json::from_str(token)
                .map_err(|_| CodecError::Format(format!("`{token}` is not JSON text"))),
        }
    }

    /// True if `value` survives a `token` then `cast` trip unchanged.
    pub fn accepts(&self, value: &Value) -> bool {
        self.cast(&self.token(value))
            .is_ok_and(|restored| restored == *value)
    }
}

fn integer(token: &str) -> Option<Value> {
    token
        .parse::<i64>()
        .map(Value::from)
        .or_else(|_| token.parse::<u64>().map(Value::from))
        .ok()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

/// Descriptor of an entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    name: String,
    storage_path: Option<String>,
    identifier: String,
    columns: IndexMap<String, Column>,
}

impl Model {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            storage_path: None,
            identifier: "id".to_string(),
            columns: IndexMap::new(),
        }
    }

    pub fn storage(mut self, path: &str) -> Self {
        self.storage_path = Some(path.trim_matches('/').to_string());
        self
    }

    /// Name of the field the server returns the identifier in.
    pub fn identified_by(mut self, field: &str) -> Self {
        self.identifier = field.to_string();
        self
    }

    pub fn column(mut self, name: &str, column_type: ColumnType) -> Self {
        self.columns.insert(
            name.to_string(),
            Column {
                name: name.to_string(),
                column_type,
            },
        );
        self
    }

    pub fn embedded(self, name: &str, model: Model) -> Self {
        self.column(name, ColumnType::Embedded(model))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn storage_path(&self) -> ApiResult<&str> {
        self.storage_path
            .as_deref()
            .filter(|path| !path.is_empty())
            .ok_or_else(|| ApiError::MissingStoragePath(self.name.clone()))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.values()
    }

    /// Resolve a dotted column path, descending through embedded models.
    pub fn resolve_column(&self, path: &str) -> Option<&Column> {
        let mut segments = path.split('.');
        let mut column = self.columns.get(segments.next()?)?;
        for segment in segments {
            match &column.column_type {
                ColumnType::Embedded(model) => column = model.columns.get(segment)?,
                _ => return None,
            }
        }
        Some(column)
    }

    /// Like `resolve_column`, but failing with a schema error.
    pub fn require_column(&self, path: &str) -> CodecResult<&Column> {
        self.resolve_column(path).ok_or_else(|| CodecError::Schema {
            model: self.name.clone(),
            path: path.to_string(),
        })
    }
}
