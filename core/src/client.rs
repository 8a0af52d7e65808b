//! Stateless HTTP request builder and response parser for the Strapi API.
//!
//! # Design
//! `StrapiClient` holds only a `base_url` and carries no mutable state between
//! calls. Each backend operation is split into a `build_*` method that
//! produces an `HttpRequest` and a `parse_*` method that consumes an
//! `HttpResponse`. The caller (a `Session`, or any host with its own HTTP
//! stack) executes the round-trip in between, keeping this layer
//! deterministic and free of I/O.

use serde::Serialize;
use serde_json::Value;
use url::form_urlencoded;

use crate::error::{ApiError, Result};
use crate::http::{HttpBody, HttpMethod, HttpRequest, HttpResponse};
use crate::normalize::{normalize, split_meta};
use crate::query::Query;
use crate::types::{AuthResponse, Entity, EntityId, FilePart, LoginRequest, RegisterRequest, UploadTarget};
use crate::upload::encode_multipart;

/// Strapi wraps every create/update payload in `{"data": ..}`.
#[derive(Serialize)]
struct DataWrapper<'a, T> {
    data: &'a T,
}

#[derive(Debug, Clone)]
pub struct StrapiClient {
    base_url: String,
}

impl StrapiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // -- collections --------------------------------------------------------

    pub fn build_find(&self, collection: &str, query: &Query) -> HttpRequest {
        self.get(&path(&[collection]), query)
    }

    pub fn build_find_one(&self, collection: &str, id: &EntityId, query: &Query) -> HttpRequest {
        self.get(&path(&[collection, &id.to_string()]), query)
    }

    pub fn build_create<T: Serialize>(&self, collection: &str, fields: &T) -> Result<HttpRequest> {
        self.json(HttpMethod::Post, &path(&[collection]), &DataWrapper { data: fields })
    }

    pub fn build_update<T: Serialize>(
        &self,
        collection: &str,
        id: &EntityId,
        fields: &T,
    ) -> Result<HttpRequest> {
        self.json(HttpMethod::Put, &path(&[collection, &id.to_string()]), &DataWrapper { data: fields })
    }

    pub fn build_delete(&self, collection: &str, id: &EntityId) -> HttpRequest {
        self.bare(HttpMethod::Delete, &path(&[collection, &id.to_string()]))
    }

    // -- auth ---------------------------------------------------------------

    pub fn build_login(&self, input: &LoginRequest) -> Result<HttpRequest> {
        self.json(HttpMethod::Post, "/auth/local", input)
    }

    pub fn build_register(&self, input: &RegisterRequest) -> Result<HttpRequest> {
        self.json(HttpMethod::Post, "/auth/local/register", input)
    }

    // -- media library ------------------------------------------------------

    pub fn build_upload(&self, files: &[FilePart], target: &UploadTarget) -> HttpRequest {
        let (boundary, bytes) = encode_multipart(files, target);
        HttpRequest {
            method: HttpMethod::Post,
            path: self.url("/upload", None),
            headers: vec![(
                "content-type".to_string(),
                format!("multipart/form-data; boundary={boundary}"),
            )],
            body: Some(HttpBody::Multipart { boundary, bytes }),
        }
    }

    pub fn build_list_files(&self, query: &Query) -> HttpRequest {
        self.get("/upload/files", query)
    }

    pub fn build_delete_file(&self, id: &EntityId) -> HttpRequest {
        self.bare(HttpMethod::Delete, &format!("/upload/files{}", path(&[&id.to_string()])))
    }

    // -- parsing ------------------------------------------------------------

    /// Check the status and decode the body as JSON. An empty body (204) is
    /// `Value::Null`.
    pub fn parse_body(&self, response: HttpResponse) -> Result<Value> {
        check_status(&response)?;
        if response.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&response.body).map_err(|e| ApiError::Deserialization(e.to_string()))
    }

    /// Normalized list plus the accompanying `meta` block.
    pub fn parse_entities(&self, response: HttpResponse) -> Result<(Vec<Entity>, Option<Value>)> {
        let body = self.parse_body(response)?;
        let entities = normalize(Some(&body))?.into_many();
        Ok((entities, split_meta(&body)))
    }

    pub fn parse_entity(&self, response: HttpResponse) -> Result<Entity> {
        let body = self.parse_body(response)?;
        normalize(Some(&body))?.into_one()
    }

    pub fn parse_auth(&self, response: HttpResponse) -> Result<AuthResponse> {
        let body = self.parse_body(response)?;
        serde_json::from_value(body).map_err(|e| ApiError::Deserialization(e.to_string()))
    }

    /// Resolve a media path returned by the backend into an absolute URL.
    /// Media is served from the server root, so a trailing `/api` on the base
    /// URL is dropped.
    pub fn media_url(&self, url: &str) -> String {
        if url.is_empty() {
            return String::new();
        }
        if url.starts_with("http://") || url.starts_with("https://") {
            return url.to_string();
        }
        let root = self.base_url.strip_suffix("/api").unwrap_or(&self.base_url);
        format!("{root}{url}")
    }

    // -- helpers ------------------------------------------------------------

    fn url(&self, path: &str, query: Option<&Query>) -> String {
        match query.filter(|q| !q.is_empty()) {
            Some(query) => format!("{}{path}?{}", self.base_url, query.to_query_string()),
            None => format!("{}{path}", self.base_url),
        }
    }

    fn get(&self, path: &str, query: &Query) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            path: self.url(path, Some(query)),
            headers: Vec::new(),
            body: None,
        }
    }

    fn bare(&self, method: HttpMethod, path: &str) -> HttpRequest {
        HttpRequest {
            method,
            path: self.url(path, None),
            headers: Vec::new(),
            body: None,
        }
    }

    fn json<T: Serialize>(&self, method: HttpMethod, path: &str, payload: &T) -> Result<HttpRequest> {
        let body = serde_json::to_string(payload).map_err(|e| ApiError::Serialization(e.to_string()))?;
        Ok(HttpRequest {
            method,
            path: self.url(path, None),
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Some(HttpBody::Json(body)),
        })
    }
}

/// Map non-success status codes to the appropriate `ApiError` variant.
/// Join `segments` into an absolute path, percent-encoding each one so ids
/// and names can't introduce separators, query strings or fragments.
fn path(segments: &[&str]) -> String {
    segments.iter().fold(String::new(), |mut path, segment| {
        path.push('/');
        // `form_urlencoded` writes spaces as `+`, which a path reads literally.
        path.extend(form_urlencoded::byte_serialize(segment.as_bytes()).map(|chunk| {
            if chunk == "+" { "%20" } else { chunk }
        }));
        path
    })
}

fn check_status(response: &HttpResponse) -> Result<()> {
    if response.is_success() {
        return Ok(());
    }
    Err(ApiError::from_response(response.status, response.body.clone()))
}
