//! Response envelope normalization.
//!
//! Strapi answers in several shapes depending on the backend version and the
//! endpoint:
//!
//! ```text
//! { "data": [ { "id": 1, "attributes": { .. } } ], "meta": { .. } }   nested list (v4)
//! { "data": { "id": 1, "attributes": { .. } } }                        nested single (v4)
//! { "data": [ { "id": 1, .. } ] } / { "data": { "id": 1, .. } }        flat (v5)
//! [ { "id": 1, .. } ] / { "id": 1, .. }                                bare (upload, users)
//! ```
//!
//! `Envelope` and `Record` name those shapes explicitly; `normalize` turns
//! any of them into flat `Entity` values. Everything here is pure: inputs are
//! borrowed and never modified.

use serde_json::{Map, Value};

use crate::error::{ApiError, Result};
use crate::types::{Entity, EntityId};

static NULL: Value = Value::Null;

/// The outer shape of a response body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Envelope<'a> {
    /// No body, `null`, or `{"data": null}`.
    Empty,
    /// `{"data": [..]}`.
    List(&'a [Value]),
    /// `{"data": {..}}`.
    Single(&'a Map<String, Value>),
    /// A body without a `data` wrapper: a bare array or a bare object.
    Bare(&'a Value),
}

impl<'a> Envelope<'a> {
    pub fn classify(body: Option<&'a Value>) -> Result<Self> {
        let body = match body {
            None | Some(Value::Null) => return Ok(Envelope::Empty),
            Some(body) => body,
        };
        match body {
            Value::Object(map) => match map.get("data") {
                Some(Value::Null) => Ok(Envelope::Empty),
                Some(Value::Array(items)) => Ok(Envelope::List(items)),
                Some(Value::Object(data)) => Ok(Envelope::Single(data)),
                Some(other) => Err(ApiError::Normalization(format!(
                    "`data` is a {}",
                    kind(other)
                ))),
                None => Ok(Envelope::Bare(body)),
            },
            Value::Array(_) => Ok(Envelope::Bare(body)),
            other => Err(ApiError::Normalization(format!(
                "response body is a {}",
                kind(other)
            ))),
        }
    }
}

/// The shape of one record inside an envelope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Record<'a> {
    /// `{"id": .., "attributes": {..}}`
    Nested {
        id: &'a Value,
        attributes: &'a Map<String, Value>,
    },
    /// Fields at the top level next to `id`.
    Flat(&'a Map<String, Value>),
}

impl<'a> Record<'a> {
    pub fn classify(value: &'a Value) -> Result<Self> {
        let map = value.as_object().ok_or_else(|| {
            ApiError::Normalization(format!("record is a {}", kind(value)))
        })?;
        Ok(Record::from_map(map))
    }

    pub fn from_map(map: &'a Map<String, Value>) -> Self {
        match map.get("attributes") {
            Some(Value::Object(attributes)) => Record::Nested {
                id: map.get("id").unwrap_or(&NULL),
                attributes,
            },
            _ => Record::Flat(map),
        }
    }

    /// Flatten into an entity. For nested records the outer id wins over
    /// any `id` inside `attributes`.
    pub fn to_entity(self) -> Result<Entity> {
        match self {
            Record::Nested { id, attributes } => {
                let id = EntityId::from_value(id).ok_or_else(|| {
                    ApiError::Normalization("nested record has no usable id".to_string())
                })?;
                Ok(Entity::with_id(id, attributes.clone()))
            }
            Record::Flat(map) => Entity::from_map(map.clone()),
        }
    }
}

/// Result of normalizing one envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Empty,
    One(Entity),
    Many(Vec<Entity>),
}

impl Normalized {
    /// View the result as a list. A single entity becomes a one-element list.
    pub fn into_many(self) -> Vec<Entity> {
        match self {
            Normalized::Empty => Vec::new(),
            Normalized::One(entity) => vec![entity],
            Normalized::Many(entities) => entities,
        }
    }

    /// Expect exactly one entity.
    pub fn into_one(self) -> Result<Entity> {
        match self {
            Normalized::One(entity) => Ok(entity),
            Normalized::Empty => Err(ApiError::Normalization(
                "expected a single record, got nothing".to_string(),
            )),
            Normalized::Many(entities) => Err(ApiError::Normalization(format!(
                "expected a single record, got a list of {}",
                entities.len()
            ))),
        }
    }
}

/// Flatten an envelope into entities.
pub fn normalize(body: Option<&Value>) -> Result<Normalized> {
    match Envelope::classify(body)? {
        Envelope::Empty => Ok(Normalized::Empty),
        Envelope::List(items) => normalize_list(items),
        Envelope::Single(data) => Ok(Normalized::One(Record::from_map(data).to_entity()?)),
        Envelope::Bare(Value::Array(items)) => normalize_list(items),
        Envelope::Bare(value) => Ok(Normalized::One(Record::classify(value)?.to_entity()?)),
    }
}

/// The `meta` block (pagination) that accompanies list responses.
pub fn split_meta(body: &Value) -> Option<Value> {
    match body.get("meta") {
        None | Some(Value::Null) => None,
        Some(meta) => Some(meta.clone()),
    }
}

fn normalize_list(items: &[Value]) -> Result<Normalized> {
    items
        .iter()
        .map(|item| Record::classify(item)?.to_entity())
        .collect::<Result<Vec<_>>>()
        .map(Normalized::Many)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
