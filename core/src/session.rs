//! The authenticated connection to one Strapi backend.
//!
//! # Design
//! A `Session` owns the request builder, the transport, the credential store
//! and the authentication state. It is cheap to clone (all clones share one
//! inner value) and is handed to every accessor that needs the network.
//!
//! Authentication state has exactly one writer: the session itself. Views
//! read it through `auth_state()` or a `watch::Receiver` from
//! `subscribe_auth()`. Every transition (login, register, logout, refresh and
//! the 401 interceptor) writes the credential store and the in-memory state
//! in one synchronous step, so the persisted token and the `authenticated`
//! flag never disagree.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::client::StrapiClient;
use crate::collection::Collection;
use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::http::{HttpRequest, HttpResponse};
use crate::profile::Profiles;
use crate::query::Query;
use crate::state::{InFlight, LoadingGuard};
use crate::store::{CredentialStore, Credentials, FileStore, MemoryStore};
use crate::transport::{ReqwestTransport, Transport};
use crate::types::{AuthResponse, Entity, EntityId, LoginRequest, RegisterRequest};
use crate::upload::Uploads;

/// Snapshot of who is signed in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthState {
    user: Option<Value>,
    authenticated: bool,
    in_flight: usize,
    error: Option<String>,
}

impl AuthState {
    fn from_credentials(credentials: Option<Credentials>) -> Self {
        match credentials {
            Some(credentials) => Self {
                user: Some(credentials.user).filter(|user| !user.is_null()),
                authenticated: true,
                ..Self::default()
            },
            None => Self::default(),
        }
    }

    pub fn user(&self) -> Option<&Value> {
        self.user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn loading(&self) -> bool {
        self.in_flight > 0
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn signed_out(&mut self) {
        self.user = None;
        self.authenticated = false;
    }
}

impl InFlight for AuthState {
    fn in_flight(&mut self) -> &mut usize {
        &mut self.in_flight
    }
}

struct Inner<T> {
    client: StrapiClient,
    transport: T,
    store: Box<dyn CredentialStore>,
    auth: watch::Sender<AuthState>,
}

pub struct Session<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Session<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Session<ReqwestTransport> {
    /// Build a session from configuration: a reqwest transport with the
    /// configured timeout, and a file-backed store when a credentials path is
    /// set (in-memory otherwise).
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport = ReqwestTransport::new(config.timeout)?;
        let client = StrapiClient::new(&config.api_url);
        Ok(match &config.credentials_path {
            Some(path) => Session::new(client, transport, FileStore::new(path)),
            None => Session::new(client, transport, MemoryStore::new()),
        })
    }
}

impl<T: Transport> Session<T> {
    /// Create a session, seeding the auth state from whatever the store
    /// already holds.
    pub fn new(client: StrapiClient, transport: T, store: impl CredentialStore + 'static) -> Self {
        let credentials = store.load().unwrap_or_else(|e| {
            warn!("ignoring stored credentials: {e}");
            None
        });
        let auth = watch::Sender::new(AuthState::from_credentials(credentials));
        Self {
            inner: Arc::new(Inner {
                client,
                transport,
                store: Box::new(store),
                auth,
            }),
        }
    }

    pub fn client(&self) -> &StrapiClient {
        &self.inner.client
    }

    pub fn auth_state(&self) -> AuthState {
        self.inner.auth.borrow().clone()
    }

    pub fn subscribe_auth(&self) -> watch::Receiver<AuthState> {
        self.inner.auth.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.auth.borrow().authenticated
    }

    /// Accessor for one collection, e.g. `articles`.
    pub fn collection(&self, name: &str) -> Result<Collection<T>> {
        Collection::new(self.clone(), name)
    }

    pub fn uploads(&self) -> Uploads<T> {
        Uploads::new(self.clone())
    }

    pub fn profiles(&self) -> Profiles<T> {
        Profiles::new(self.clone())
    }

    /// Execute a request with the stored bearer token attached. Non-2xx
    /// responses come back as `Err`; a 401 also signs the session out.
    pub async fn send(&self, mut request: HttpRequest) -> Result<HttpResponse> {
        match self.inner.store.load() {
            Ok(Some(credentials)) => {
                request.set_header("authorization", format!("Bearer {}", credentials.jwt));
            }
            Ok(None) => {}
            Err(e) => warn!("sending request without credentials: {e}"),
        }

        debug!(method = request.method.as_str(), path = %request.path, "sending request");
        let response = match self.inner.transport.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                error!("could not reach the server: {e}");
                return Err(e);
            }
        };

        if response.is_success() {
            return Ok(response);
        }

        let err = ApiError::from_response(response.status, response.body);
        match response.status {
            401 => {
                warn!("credentials rejected, signing out");
                self.sign_out();
            }
            403 => warn!("not permitted: {}", err.message_or("forbidden")),
            404 => warn!("resource not found"),
            status if status >= 500 => error!("server error {status}"),
            status => debug!("request failed with {status}"),
        }
        Err(err)
    }

    /// One-off list request that does not touch any collection state.
    pub async fn find(&self, collection: &str, query: &Query) -> Result<(Vec<Entity>, Option<Value>)> {
        let response = self.send(self.inner.client.build_find(collection, query)).await?;
        self.inner.client.parse_entities(response)
    }

    /// One-off single-record request that does not touch any collection state.
    pub async fn find_one(&self, collection: &str, id: &EntityId, query: &Query) -> Result<Entity> {
        let response = self.send(self.inner.client.build_find_one(collection, id, query)).await?;
        self.inner.client.parse_entity(response)
    }

    pub async fn login(&self, identifier: &str, password: &str) -> Result<AuthResponse> {
        let _loading = self.begin_auth();
        let input = LoginRequest {
            identifier: identifier.to_string(),
            password: password.to_string(),
        };
        let result = match self.inner.client.build_login(&input) {
            Ok(request) => self.authenticate(request).await,
            Err(e) => Err(e),
        };
        self.record_auth_error(result, "failed to log in")
    }

    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<AuthResponse> {
        let _loading = self.begin_auth();
        let input = RegisterRequest {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        let result = match self.inner.client.build_register(&input) {
            Ok(request) => self.authenticate(request).await,
            Err(e) => Err(e),
        };
        self.record_auth_error(result, "failed to register")
    }

    /// Forget the stored credentials and the signed-in user.
    pub fn logout(&self) -> Result<()> {
        let cleared = self.inner.store.clear();
        self.inner.auth.send_modify(AuthState::signed_out);
        info!("signed out");
        cleared
    }

    /// Re-read the auth state from the credential store.
    pub fn refresh_user(&self) {
        let credentials = self.inner.store.load().unwrap_or_else(|e| {
            warn!("ignoring stored credentials: {e}");
            None
        });
        let fresh = AuthState::from_credentials(credentials);
        self.inner.auth.send_modify(|state| {
            state.user = fresh.user;
            state.authenticated = fresh.authenticated;
        });
    }

    async fn authenticate(&self, request: HttpRequest) -> Result<AuthResponse> {
        let response = self.send(request).await?;
        let auth = self.inner.client.parse_auth(response)?;
        match &auth.jwt {
            Some(jwt) => {
                let credentials = Credentials {
                    jwt: jwt.clone(),
                    user: auth.user.clone(),
                };
                self.inner.store.save(&credentials)?;
                self.inner.auth.send_modify(|state| {
                    state.user = Some(auth.user.clone());
                    state.authenticated = true;
                });
                info!("signed in");
            }
            // Registration with e-mail confirmation enabled returns no token.
            None => info!("backend issued no token; session stays anonymous"),
        }
        Ok(auth)
    }

    fn sign_out(&self) {
        if let Err(e) = self.inner.store.clear() {
            error!("could not clear stored credentials: {e}");
        }
        self.inner.auth.send_modify(AuthState::signed_out);
    }

    fn begin_auth(&self) -> LoadingGuard<'_, AuthState> {
        let guard = LoadingGuard::begin(&self.inner.auth);
        self.inner.auth.send_modify(|state| state.error = None);
        guard
    }

    fn record_auth_error<R>(&self, result: Result<R>, fallback: &str) -> Result<R> {
        if let Err(e) = &result {
            let message = e.message_or(fallback);
            self.inner.auth.send_modify(|state| state.error = Some(message));
        }
        result
    }
}
