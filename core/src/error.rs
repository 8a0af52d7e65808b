//! Error types for the Strapi client.
//!
//! # Design
//! `NotFound` and `Unauthorized` get dedicated variants because callers act
//! on them (show "missing" views, send the user to the login screen). All
//! other non-2xx responses land in `HttpError` with the raw status and body.
//! Whenever the backend sent its structured `{"error": {...}}` block it is
//! parsed into `BackendError` and kept alongside.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApiError>;

/// The `error` block Strapi puts in failed responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendError {
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub name: Option<String>,
    pub message: String,
    #[serde(default)]
    pub details: Value,
}

impl BackendError {
    /// Extract the `error` block from a response body, if there is one.
    pub fn from_body(body: &str) -> Option<Self> {
        #[derive(Deserialize)]
        struct Wrapper {
            error: BackendError,
        }

        serde_json::from_str::<Wrapper>(body)
            .ok()
            .map(|wrapper| wrapper.error)
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never produced a response (connection refused, timeout).
    #[error("transport failed: {0}")]
    Transport(String),

    /// 401. Stored credentials have already been cleared when this surfaces.
    #[error("unauthorized")]
    Unauthorized { error: Option<BackendError> },

    /// 404.
    #[error("resource not found")]
    NotFound { error: Option<BackendError> },

    /// Any other non-2xx status.
    #[error("HTTP {status}: {body}")]
    HttpError {
        status: u16,
        error: Option<BackendError>,
        body: String,
    },

    /// The envelope did not match any known response shape.
    #[error("unrecognized response shape: {0}")]
    Normalization(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("deserialization failed: {0}")]
    Deserialization(String),

    #[error("credential storage failed: {0}")]
    Storage(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ApiError {
    /// Map a non-success response to the matching variant.
    pub fn from_response(status: u16, body: String) -> Self {
        let error = BackendError::from_body(&body);
        match status {
            401 => ApiError::Unauthorized { error },
            404 => ApiError::NotFound { error },
            _ => ApiError::HttpError {
                status,
                error,
                body,
            },
        }
    }

    /// HTTP status of the failed response, if one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { .. } => Some(401),
            ApiError::NotFound { .. } => Some(404),
            ApiError::HttpError { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn backend_error(&self) -> Option<&BackendError> {
        match self {
            ApiError::Unauthorized { error }
            | ApiError::NotFound { error }
            | ApiError::HttpError { error, .. } => error.as_ref(),
            _ => None,
        }
    }

    /// The human-readable message the backend attached to the failure.
    pub fn backend_message(&self) -> Option<&str> {
        self.backend_error().map(|error| error.message.as_str())
    }

    /// Backend message when present, `fallback` otherwise.
    pub fn message_or(&self, fallback: &str) -> String {
        self.backend_message().unwrap_or(fallback).to_string()
    }
}
