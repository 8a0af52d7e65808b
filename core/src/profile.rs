//! User profiles: a `profiles` collection linked one-to-one with users.

use serde::Serialize;
use serde_json::{json, Map, Value};
use tokio::sync::watch;
use tracing::debug;

use crate::error::{ApiError, Result};
use crate::http::HttpRequest;
use crate::query::Query;
use crate::session::Session;
use crate::state::{InFlight, LoadingGuard};
use crate::transport::Transport;
use crate::types::{Entity, EntityId, FilePart, UploadTarget};

pub const PROFILES: &str = "profiles";
/// Content type uid used to attach uploads to a profile.
pub const PROFILE_UID: &str = "api::profile.profile";
/// Relation field pointing at the owning user.
pub const OWNER_FIELD: &str = "users_permissions_user";
pub const AVATAR_FIELD: &str = "avatar";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileState {
    profile: Option<Entity>,
    in_flight: usize,
    error: Option<String>,
}

impl ProfileState {
    pub fn profile(&self) -> Option<&Entity> {
        self.profile.as_ref()
    }

    pub fn loading(&self) -> bool {
        self.in_flight > 0
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

impl InFlight for ProfileState {
    fn in_flight(&mut self) -> &mut usize {
        &mut self.in_flight
    }
}

/// Query selecting the profile owned by `user_id`, with its avatar, owner
/// and post populated.
pub fn owner_query(user_id: &EntityId) -> Query {
    Query::new()
        .filter(&format!("{OWNER_FIELD}.id"), "$eq", user_id.to_value())
        .populate(json!({ AVATAR_FIELD: "*", OWNER_FIELD: "*", "post": "*" }))
}

/// Id of the user owning `profile`. Understands a populated v4 relation
/// (`{"data": {"id": ..}}`), a populated v5 relation (`{"id": ..}`) and a bare id.
pub fn owner_id(profile: &Entity) -> Option<EntityId> {
    let owner = profile.get(OWNER_FIELD)?;
    let id = owner
        .pointer("/data/id")
        .or_else(|| owner.get("id"))
        .unwrap_or(owner);
    EntityId::from_value(id)
}

pub struct Profiles<T> {
    session: Session<T>,
    state: watch::Sender<ProfileState>,
}

impl<T: Transport> Profiles<T> {
    pub fn new(session: Session<T>) -> Self {
        Self {
            session,
            state: watch::Sender::new(ProfileState::default()),
        }
    }

    pub fn snapshot(&self) -> ProfileState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProfileState> {
        self.state.subscribe()
    }

    /// Load the profile of `user_id`. `None` when the user has no profile yet.
    pub async fn load(&self, user_id: impl Into<EntityId>) -> Result<Option<Entity>> {
        let user_id = user_id.into();
        let _loading = self.begin();
        match self.session.find(PROFILES, &owner_query(&user_id)).await {
            Ok((items, _)) => {
                let profile = items.into_iter().next();
                if profile.is_none() {
                    debug!(%user_id, "user has no profile");
                }
                let stored = profile.clone();
                self.state.send_modify(|state| state.profile = stored);
                Ok(profile)
            }
            Err(e) => Err(self.fail(e, "failed to load profile")),
        }
    }

    /// Create a profile for `user_id`. The owner link is added to `fields`.
    pub async fn create(&self, user_id: impl Into<EntityId>, mut fields: Map<String, Value>) -> Result<Entity> {
        fields.insert(OWNER_FIELD.to_string(), user_id.into().to_value());
        let _loading = self.begin();
        let result = self.submit(self.session.client().build_create(PROFILES, &fields)).await;
        self.settle(result, "failed to create profile")
    }

    pub async fn update<F: Serialize>(&self, profile_id: impl Into<EntityId>, fields: &F) -> Result<Entity> {
        let profile_id = profile_id.into();
        let _loading = self.begin();
        let result = self
            .submit(self.session.client().build_update(PROFILES, &profile_id, fields))
            .await;
        self.settle(result, "failed to update profile")
    }

    /// Upload an avatar and attach it to the profile, then reload the current
    /// profile so it carries the new avatar. Returns the uploaded file records.
    pub async fn upload_avatar(&self, file: FilePart, profile_id: impl Into<EntityId>) -> Result<Vec<Entity>> {
        let _loading = self.begin();
        let target = UploadTarget {
            reference: Some(PROFILE_UID.to_string()),
            ref_id: Some(profile_id.into()),
            field: Some(AVATAR_FIELD.to_string()),
        };
        let result = async move {
            let uploaded = self.session.uploads().upload(&[file], &target).await?;
            let owner = self.state.borrow().profile.as_ref().and_then(owner_id);
            if let Some(owner) = owner {
                self.load(owner).await?;
            }
            Ok::<_, ApiError>(uploaded)
        }
        .await;
        match result {
            Ok(uploaded) => Ok(uploaded),
            Err(e) => Err(self.fail(e, "failed to upload avatar")),
        }
    }

    pub fn clear(&self) {
        self.state.send_modify(|state| {
            state.profile = None;
            state.error = None;
        });
    }

    async fn submit(&self, request: Result<HttpRequest>) -> Result<Entity> {
        let response = self.session.send(request?).await?;
        self.session.client().parse_entity(response)
    }

    fn settle(&self, result: Result<Entity>, fallback: &str) -> Result<Entity> {
        match result {
            Ok(profile) => {
                let stored = profile.clone();
                self.state.send_modify(|state| state.profile = Some(stored));
                Ok(profile)
            }
            Err(e) => Err(self.fail(e, fallback)),
        }
    }

    fn begin(&self) -> LoadingGuard<'_, ProfileState> {
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
