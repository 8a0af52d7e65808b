//! Domain DTOs for the Strapi API.
//!
//! # Design
//! Collections have no fixed schema, so an `Entity` is a JSON object that is
//! guaranteed to carry an `id`. The id is parsed once at construction and
//! kept next to the field map; the map still contains the `id` field so the
//! entity serializes back to exactly what the backend sent.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::ApiError;

/// Identifier of a backend record.
///
/// Numeric and textual ids never compare equal: `2` and `"2"` are different.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Number(u64),
    Text(String),
}

impl EntityId {
    /// Read an id from a JSON value. Only non-negative integers and non-empty
    /// strings qualify.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64().map(EntityId::Number),
            Value::String(s) if !s.is_empty() => Some(EntityId::Text(s.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            EntityId::Number(n) => Value::from(*n),
            EntityId::Text(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Number(n) => write!(f, "{n}"),
            EntityId::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for EntityId {
    fn from(id: u64) -> Self {
        EntityId::Number(id)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        EntityId::Text(id.to_string())
    }
}

impl From<String> for EntityId {
    fn from(id: String) -> Self {
        EntityId::Text(id)
    }
}

/// A normalized, flattened record with a definite id.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct Entity {
    id: EntityId,
    fields: Map<String, Value>,
}

impl Entity {
    /// Wrap a flat JSON object. Fails when the object has no usable `id`.
    pub fn from_map(fields: Map<String, Value>) -> Result<Self, ApiError> {
        let id = fields
            .get("id")
            .and_then(EntityId::from_value)
            .ok_or_else(|| ApiError::Normalization("record has no usable id".to_string()))?;
        Ok(Self { id, fields })
    }

    /// Build an entity from an id and a set of fields. The given id wins over
    /// any `id` already present in `fields`.
    pub fn with_id(id: EntityId, mut fields: Map<String, Value>) -> Self {
        fields.insert("id".to_string(), id.to_value());
        Self { id, fields }
    }

    pub fn id(&self) -> &EntityId {
        &self.id
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// String field convenience accessor.
    pub fn str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.fields
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

impl TryFrom<Map<String, Value>> for Entity {
    type Error = ApiError;

    fn try_from(fields: Map<String, Value>) -> Result<Self, Self::Error> {
        Entity::from_map(fields)
    }
}

impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.fields.serialize(serializer)
    }
}

/// Request payload for `POST /auth/local`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub identifier: String,
    pub password: String,
}

/// Request payload for `POST /auth/local/register`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Successful login/registration answer. `jwt` is absent when the backend
/// requires e-mail confirmation before issuing a token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub jwt: Option<String>,
    pub user: Value,
}

/// A file to send in a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl FilePart {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }
}

/// Optional link between an uploaded file and a record field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UploadTarget {
    /// Content type uid, e.g. `api::profile.profile`.
    pub reference: Option<String>,
    pub ref_id: Option<EntityId>,
    pub field: Option<String>,
}
