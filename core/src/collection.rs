//! Generic CRUD accessor for one named collection.
//!
//! # Design
//! A `Collection` pairs a `Session` with an observable `CollectionState`
//! held in a `watch` channel. The accessor is the only writer; views read
//! snapshots or subscribe to changes. After every successful mutation the
//! local list is patched in place (append on create, replace on update,
//! remove on delete) so it matches the backend without a re-fetch.
//!
//! Failures are recorded in the state's error slot and then returned to the
//! caller unchanged. Loading is tracked with a scoped guard, so it is reset on
//! every exit path.
//!
//! A `fetch_all` that resolves after a newer `fetch_all` on the same accessor
//! has started is returned to its caller but not written to the state.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;

use crate::error::{ApiError, Result};
use crate::query::Query;
use crate::session::Session;
use crate::state::{InFlight, LoadingGuard};
use crate::transport::Transport;
use crate::types::{Entity, EntityId};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionState {
    items: Vec<Entity>,
    selected: Option<Entity>,
    in_flight: usize,
    error: Option<String>,
    meta: Option<Value>,
}

impl CollectionState {
    /// Entities in server order, patched by local mutations.
    pub fn items(&self) -> &[Entity] {
        &self.items
    }

    /// Result of the last `fetch_by_id`.
    pub fn selected(&self) -> Option<&Entity> {
        self.selected.as_ref()
    }

    pub fn loading(&self) -> bool {
        self.in_flight > 0
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Pagination block of the last list response.
    pub fn meta(&self) -> Option<&Value> {
        self.meta.as_ref()
    }
}

impl InFlight for CollectionState {
    fn in_flight(&mut self) -> &mut usize {
        &mut self.in_flight
    }
}

pub struct Collection<T> {
    name: String,
    session: Session<T>,
    state: watch::Sender<CollectionState>,
    fetch_generation: AtomicU64,
}

impl<T: Transport> Collection<T> {
    pub fn new(session: Session<T>, name: &str) -> Result<Self> {
        let name = name.trim_matches('/');
        if name.is_empty() {
            return Err(ApiError::InvalidInput("collection name must not be empty".to_string()));
        }
        if name.contains(|c: char| matches!(c, '/' | '?' | '#') || c.is_whitespace()) {
            return Err(ApiError::InvalidInput(format!("invalid collection name: {name:?}")));
        }
        Ok(Self {
            name: name.to_string(),
            session,
            state: watch::Sender::new(CollectionState::default()),
            fetch_generation: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn snapshot(&self) -> CollectionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CollectionState> {
        self.state.subscribe()
    }

    /// Replace the local list with the backend's answer to `query`.
    pub async fn fetch_all(&self, query: &Query) -> Result<Vec<Entity>> {
        let generation = self.fetch_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let _loading = self.begin();
        let result = self.session.find(&self.name, query).await;
        let superseded = self.fetch_generation.load(Ordering::SeqCst) != generation;

        match result {
            Ok((items, meta)) => {
                if superseded {
                    debug!(collection = %self.name, "discarding superseded list response");
                } else {
                    debug!(collection = %self.name, count = items.len(), "fetched items");
                    let local = items.clone();
                    self.state.send_modify(|state| {
                        state.items = local;
                        state.meta = meta;
                    });
                }
                Ok(items)
            }
            Err(e) if superseded => Err(e),
            Err(e) => Err(self.fail(e, "failed to fetch items")),
        }
    }

    /// Load one record into the selected slot.
    pub async fn fetch_by_id(&self, id: impl Into<EntityId>, query: &Query) -> Result<Entity> {
        let id = id.into();
        let _loading = self.begin();
        match self.session.find_one(&self.name, &id, query).await {
            Ok(entity) => {
                let selected = entity.clone();
                self.state.send_modify(|state| state.selected = Some(selected));
                Ok(entity)
            }
            Err(e) => Err(self.fail(e, "failed to fetch item")),
        }
    }

    /// Create a record and append it to the end of the local list.
    pub async fn create_item<F: Serialize>(&self, fields: &F) -> Result<Entity> {
        let _loading = self.begin();
        match self.create(fields).await {
            Ok(entity) => {
                debug!(collection = %self.name, id = %entity.id(), "created item");
                let appended = entity.clone();
                self.state.send_modify(|state| state.items.push(appended));
                Ok(entity)
            }
            Err(e) => Err(self.fail(e, "failed to create item")),
        }
    }

    /// Update a record and replace the first local entry with the same id.
    /// When there is no local entry the list is left as it is.
    pub async fn update_item<F: Serialize>(&self, id: impl Into<EntityId>, fields: &F) -> Result<Entity> {
        let id = id.into();
        let _loading = self.begin();
        match self.update(&id, fields).await {
            Ok(entity) => {
                let replacement = entity.clone();
                self.state.send_if_modified(|state| {
                    match state.items.iter().position(|item| item.id() == &id) {
                        Some(index) => {
                            state.items[index] = replacement;
                            true
                        }
                        None => {
                            debug!(collection = %self.name, %id, "updated item has no local copy");
                            false
                        }
                    }
                });
                Ok(entity)
            }
            Err(e) => Err(self.fail(e, "failed to update item")),
        }
    }

    /// Delete a record and drop every local entry with that id.
    pub async fn delete_item(&self, id: impl Into<EntityId>) -> Result<bool> {
        let id = id.into();
        let _loading = self.begin();
        let request = self.session.client().build_delete(&self.name, &id);
        match self.session.send(request).await {
            Ok(_) => {
                debug!(collection = %self.name, %id, "deleted item");
                self.state.send_modify(|state| state.items.retain(|item| item.id() != &id));
                Ok(true)
            }
            Err(e) => Err(self.fail(e, "failed to delete item")),
        }
    }

    /// Drop the list, the selection, the error and the meta block. No I/O.
    pub fn clear(&self) {
        self.state.send_modify(|state| {
            state.items.clear();
            state.selected = None;
            state.error = None;
            state.meta = None;
        });
    }

    async fn create<F: Serialize>(&self, fields: &F) -> Result<Entity> {
        let request = self.session.client().build_create(&self.name, fields)?;
        let response = self.session.send(request).await?;
        self.session.client().parse_entity(response)
    }

    async fn update<F: Serialize>(&self, id: &EntityId, fields: &F) -> Result<Entity> {
        let request = self.session.client().build_update(&self.name, id, fields)?;
        let response = self.session.send(request).await?;
        self.session.client().parse_entity(response)
    }

    fn begin(&self) -> LoadingGuard<'_, CollectionState> {
        let guard = LoadingGuard::begin(&self.state);
        self.state.send_modify(|state| state.error = None);
        guard
    }

    fn fail(&self, err: ApiError, fallback: &str) -> ApiError {
        let message = err.message_or(fallback);
        self.state.send_modify(|state| state.error = Some(message));
        err
    }
}
