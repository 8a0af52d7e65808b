//! HTTP transport types for the host-does-IO pattern.
//!
//! # Design
//! These types describe HTTP requests and responses as plain data. The
//! `StrapiClient` builds `HttpRequest` values and parses `HttpResponse`
//! values without touching the network; a `Transport` (or any other host)
//! performs the actual round-trip. JSON and multipart bodies are both carried
//! as already-encoded payloads so every transport sends them verbatim.

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// Encoded request payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpBody {
    /// Serialized JSON document.
    Json(String),
    /// A `multipart/form-data` body. The boundary is repeated in the
    /// request's content-type header.
    Multipart { boundary: String, bytes: Vec<u8> },
}

impl HttpBody {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            HttpBody::Json(json) => json.as_bytes(),
            HttpBody::Multipart { bytes, .. } => bytes,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            HttpBody::Json(json) => json.into_bytes(),
            HttpBody::Multipart { bytes, .. } => bytes,
        }
    }

    /// The JSON text, if this is a JSON body.
    pub fn as_json(&self) -> Option<&str> {
        match self {
            HttpBody::Json(json) => Some(json),
            HttpBody::Multipart { .. } => None,
        }
    }
}

/// An HTTP request described as plain data.
///
/// `path` is the absolute URL including any encoded query string.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<HttpBody>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Replace any existing header of the same name.
    pub fn set_header(&mut self, name: &str, value: String) {
        self.headers.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value));
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_header_replaces_case_insensitively() {
        let mut req = HttpRequest {
            method: HttpMethod::Get,
            path: "http://localhost/api/articles".to_string(),
            headers: vec![("Authorization".to_string(), "Bearer old".to_string())],
            body: None,
        };
        req.set_header("authorization", "Bearer new".to_string());
        assert_eq!(req.headers.len(), 1);
        assert_eq!(req.header("AUTHORIZATION"), Some("Bearer new"));
    }

    #[test]
    fn success_covers_whole_2xx_range() {
        let response = |status| HttpResponse {
            status,
            headers: Vec::new(),
            body: String::new(),
        };
        assert!(response(200).is_success());
        assert!(response(204).is_success());
        assert!(!response(301).is_success());
        assert!(!response(401).is_success());
    }
}
