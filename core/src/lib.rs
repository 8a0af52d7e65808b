//! Client core for a Strapi content backend.
//!
//! # Overview
//! Authenticates against Strapi, runs CRUD on arbitrary named collections,
//! uploads media and manages user profiles. Responses are normalized into
//! flat `Entity` records whatever envelope shape the backend version uses,
//! and each accessor keeps an observable in-memory copy of its collection in
//! sync with every mutation.
//!
//! # Design
//! - `StrapiClient` is stateless: `build_*` produces an `HttpRequest`,
//!   `parse_*` consumes an `HttpResponse`, so the I/O boundary is explicit.
//! - `Session` executes requests through a `Transport`, attaches the stored
//!   bearer token and signs out on 401. It is the only writer of auth state.
//! - `Collection`, `Profiles` and the auth state publish their state through
//!   `tokio::sync::watch`, so views can subscribe to changes.

pub mod client;
pub mod collection;
pub mod config;
pub mod error;
pub mod guard;
pub mod http;
pub mod logging;
pub mod normalize;
pub mod posts;
pub mod profile;
pub mod query;
pub mod session;
mod state;
pub mod store;
pub mod transport;
pub mod types;
pub mod upload;

pub use client::StrapiClient;
pub use collection::{Collection, CollectionState};
pub use config::Config;
pub use error::{ApiError, BackendError, Result};
pub use guard::{Access, Navigation, RouteGuard};
pub use http::{HttpBody, HttpMethod, HttpRequest, HttpResponse};
pub use normalize::{normalize, Envelope, Normalized, Record};
pub use profile::{ProfileState, Profiles};
pub use query::Query;
pub use session::{AuthState, Session};
pub use store::{CredentialStore, Credentials, FileStore, MemoryStore};
pub use transport::{ReqwestTransport, Transport};
pub use types::{AuthResponse, Entity, EntityId, FilePart, LoginRequest, RegisterRequest, UploadTarget};
pub use upload::Uploads;
