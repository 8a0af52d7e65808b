//! Query parameters in Strapi's bracket notation.
//!
//! Strapi reads nested parameters the way `qs` writes them:
//! `filters[slug][$eq]=intro`, `populate[0]=avatar`, `pagination[page]=2`.
//! A `Query` keeps the parameters as a JSON object and flattens them only
//! when the request is built, so callers can pass any nesting through.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Query(Map<String, Value>);

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a top-level parameter, replacing any previous value.
    pub fn param(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    /// `populate=*`, or any nested populate tree.
    pub fn populate(self, value: impl Into<Value>) -> Self {
        self.param("populate", value)
    }

    /// Add `filters[..path..][op]=value`. `field` may be a dotted path into a
    /// relation, e.g. `users_permissions_user.id`.
    pub fn filter(mut self, field: &str, op: &str, value: impl Into<Value>) -> Self {
        let mut node = self
            .0
            .entry("filters")
            .or_insert_with(|| Value::Object(Map::new()));
        for segment in field.split('.') {
            node = as_object_mut(node)
                .entry(segment)
                .or_insert_with(|| Value::Object(Map::new()));
        }
        as_object_mut(node).insert(op.to_string(), value.into());
        self
    }

    /// Append a sort clause such as `title:asc`.
    pub fn sort(mut self, clause: &str) -> Self {
        let entry = self
            .0
            .entry("sort")
            .or_insert_with(|| Value::Array(Vec::new()));
        match entry {
            Value::Array(clauses) => clauses.push(Value::from(clause)),
            other => *other = Value::Array(vec![other.take(), Value::from(clause)]),
        }
        self
    }

    pub fn page(self, page: u64, page_size: u64) -> Self {
        self.param(
            "pagination",
            serde_json::json!({ "page": page, "pageSize": page_size }),
        )
    }

    /// Overlay `other` on top of `self`; top-level keys in `other` win.
    pub fn merge(mut self, other: Query) -> Self {
        self.0.extend(other.0);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Flatten into `(key, value)` pairs. `null` values are dropped.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for (key, value) in &self.0 {
            flatten(key.clone(), value, &mut pairs);
        }
        pairs
    }

    /// Percent-encoded query string without the leading `?`.
    pub fn to_query_string(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.to_pairs())
            .finish()
    }
}

impl From<Map<String, Value>> for Query {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn flatten(prefix: String, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Null => {}
        Value::Bool(b) => out.push((prefix, b.to_string())),
        Value::Number(n) => out.push((prefix, n.to_string())),
        Value::String(s) => out.push((prefix, s.clone())),
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                flatten(format!("{prefix}[{index}]"), item, out);
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                flatten(format!("{prefix}[{key}]"), item, out);
            }
        }
    }
}

/// Coerce a node into an object, discarding a scalar that was there before.
fn as_object_mut(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("node was just replaced with an object"),
    }
}
