//! In-memory Strapi lookalike for tests and local development.
//!
//! Serves the subset of the REST API the client uses: local auth, generic
//! collection CRUD under `/api/{collection}`, and the upload plugin. Answers
//! in either the v4 nested-attributes envelope or the v5 flat one.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};
use uuid::Uuid;

/// Envelope style of the responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Shape {
    /// `{"data": {"id": 1, "attributes": {..}}}` (Strapi v4)
    #[default]
    Nested,
    /// `{"data": {"id": 1, ..}}` (Strapi v5)
    Flat,
}

impl Shape {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "nested" | "v4" => Some(Shape::Nested),
            "flat" | "v5" => Some(Shape::Flat),
            _ => None,
        }
    }
}

pub const DEFAULT_PAGE_SIZE: usize = 25;

/// Relation fields stored as plain ids and expanded when rendered.
const RELATIONS: &[(&str, Source)] = &[
    ("users_permissions_user", Source::User),
    ("avatar", Source::File),
    ("cover_image", Source::File),
];

#[derive(Debug, Clone, Copy)]
enum Source {
    User,
    File,
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub email: String,
    password: String,
}

impl User {
    fn public(&self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("id".to_string(), json!(self.id));
        map.insert("username".to_string(), json!(self.username));
        map.insert("email".to_string(), json!(self.email));
        map.insert("confirmed".to_string(), json!(true));
        map.insert("blocked".to_string(), json!(false));
        map
    }
}

#[derive(Default)]
struct Store {
    collections: HashMap<String, Vec<Map<String, Value>>>,
    users: Vec<User>,
    tokens: HashMap<String, u64>,
    files: Vec<Map<String, Value>>,
    next_ids: HashMap<String, u64>,
}

impl Store {
    fn next_id(&mut self, table: &str) -> u64 {
        let next = self.next_ids.entry(table.to_string()).or_insert(0);
        *next += 1;
        *next
    }

    fn issue_token(&mut self, user_id: u64) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.tokens.insert(token.clone(), user_id);
        token
    }
}

pub struct AppState {
    shape: Shape,
    store: RwLock<Store>,
}

pub type Db = Arc<AppState>;

#[derive(Debug, Error)]
pub enum ApiFailure {
    #[error("Missing or invalid credentials")]
    Unauthorized,
    #[error("Forbidden")]
    Forbidden,
    #[error("Not Found")]
    NotFound,
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Application(String),
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let (status, name) = match self {
            ApiFailure::Unauthorized => (StatusCode::UNAUTHORIZED, "UnauthorizedError"),
            ApiFailure::Forbidden => (StatusCode::FORBIDDEN, "ForbiddenError"),
            ApiFailure::NotFound => (StatusCode::NOT_FOUND, "NotFoundError"),
            ApiFailure::Validation(_) => (StatusCode::BAD_REQUEST, "ValidationError"),
            ApiFailure::Application(_) => (StatusCode::BAD_REQUEST, "ApplicationError"),
        };
        let body = json!({
            "data": null,
            "error": {
                "status": status.as_u16(),
                "name": name,
                "message": self.to_string(),
                "details": {},
            }
        });
        (status, Json(body)).into_response()
    }
}

type Outcome<T> = Result<T, ApiFailure>;

pub fn app() -> Router {
    app_with_shape(Shape::default())
}

pub fn app_with_shape(shape: Shape) -> Router {
    let db: Db = Arc::new(AppState {
        shape,
        store: RwLock::new(Store::default()),
    });
    Router::new()
        .route("/api/auth/local", post(login))
        .route("/api/auth/local/register", post(register))
        .route("/api/upload", post(upload))
        .route("/api/upload/files", get(list_files))
        .route("/api/upload/files/{id}", get(get_file).delete(delete_file))
        .route("/api/{collection}", get(list_items).post(create_item))
        .route(
            "/api/{collection}/{id}",
            get(get_item).put(update_item).delete(delete_item),
        )
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    run_with_shape(listener, Shape::default()).await
}

pub async fn run_with_shape(listener: TcpListener, shape: Shape) -> Result<(), std::io::Error> {
    info!(?shape, "mock Strapi listening on {}", listener.local_addr()?);
    axum::serve(listener, app_with_shape(shape)).await
}

// --- auth -------------------------------------------------------------------

#[derive(Deserialize)]
pub struct RegisterBody {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginBody {
    pub identifier: String,
    pub password: String,
}

async fn register(State(db): State<Db>, Json(input): Json<RegisterBody>) -> Outcome<Json<Value>> {
    if input.username.is_empty() || input.email.is_empty() || input.password.len() < 6 {
        return Err(ApiFailure::Validation(
            "username, email and a password of at least 6 characters are required".to_string(),
        ));
    }
    let mut store = db.store.write().await;
    let taken = store
        .users
        .iter()
        .any(|u| u.email.eq_ignore_ascii_case(&input.email) || u.username == input.username);
    if taken {
        return Err(ApiFailure::Application("Email or Username are already taken".to_string()));
    }
    let user = User {
        id: store.next_id("users"),
        username: input.username,
        email: input.email,
        password: input.password,
    };
    let jwt = store.issue_token(user.id);
    let body = json!({ "jwt": jwt, "user": user.public() });
    debug!(user = user.id, "registered");
    store.users.push(user);
    Ok(Json(body))
}

async fn login(State(db): State<Db>, Json(input): Json<LoginBody>) -> Outcome<Json<Value>> {
    let mut store = db.store.write().await;
    let user = store
        .users
        .iter()
        .find(|u| {
            (u.email.eq_ignore_ascii_case(&input.identifier) || u.username == input.identifier)
                && u.password == input.password
        })
        .cloned()
        .ok_or_else(|| ApiFailure::Validation("Invalid identifier or password".to_string()))?;
    let jwt = store.issue_token(user.id);
    Ok(Json(json!({ "jwt": jwt, "user": user.public() })))
}

/// The signed-in user, `None` for anonymous requests. A malformed or unknown
/// token is rejected outright.
async fn caller(db: &AppState, headers: &HeaderMap) -> Outcome<Option<u64>> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let token = value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiFailure::Unauthorized)?;
    let store = db.store.read().await;
    store
        .tokens
        .get(token)
        .copied()
        .map(Some)
        .ok_or(ApiFailure::Unauthorized)
}

async fn require_user(db: &AppState, headers: &HeaderMap) -> Outcome<u64> {
    caller(db, headers).await?.ok_or(ApiFailure::Forbidden)
}

// --- collections ------------------------------------------------------------

async fn list_items(
    State(db): State<Db>,
    Path(collection): Path<String>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Outcome<Json<Value>> {
    caller(&db, &headers).await?;
    let store = db.store.read().await;
    let matching: Vec<&Map<String, Value>> = store
        .collections
        .get(&collection)
        .map(|records| records.iter().filter(|r| matches_filters(r, &params)).collect())
        .unwrap_or_default();

    let page = param(&params, "pagination[page]").unwrap_or(1).max(1);
    let page_size = param(&params, "pagination[pageSize]")
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .max(1);
    let total = matching.len();
    let data: Vec<Value> = matching
        .into_iter()
        .skip((page - 1) * page_size)
        .take(page_size)
        .map(|record| render(db.shape, &store, record))
        .collect();

    Ok(Json(json!({
        "data": data,
        "meta": {
            "pagination": {
                "page": page,
                "pageSize": page_size,
                "pageCount": total.div_ceil(page_size),
                "total": total,
            }
        }
    })))
}

async fn get_item(
    State(db): State<Db>,
    Path((collection, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Outcome<Json<Value>> {
    caller(&db, &headers).await?;
    let store = db.store.read().await;
    let record = find(&store.collections, &collection, &id).ok_or(ApiFailure::NotFound)?;
    Ok(Json(json!({ "data": render(db.shape, &store, record), "meta": {} })))
}

async fn create_item(
    State(db): State<Db>,
    Path(collection): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Outcome<Json<Value>> {
    require_user(&db, &headers).await?;
    let mut fields = data_payload(body)?;
    let mut store = db.store.write().await;
    let id = store.next_id(&collection);
    fields.insert("id".to_string(), json!(id));
    if db.shape == Shape::Flat {
        fields.insert("documentId".to_string(), json!(Uuid::new_v4().simple().to_string()));
    }
    let rendered = render(db.shape, &store, &fields);
    store.collections.entry(collection).or_default().push(fields);
    Ok(Json(json!({ "data": rendered, "meta": {} })))
}

async fn update_item(
    State(db): State<Db>,
    Path((collection, id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Outcome<Json<Value>> {
    require_user(&db, &headers).await?;
    let mut fields = data_payload(body)?;
    fields.remove("id");
    let mut store = db.store.write().await;
    let record = find_mut(&mut store.collections, &collection, &id).ok_or(ApiFailure::NotFound)?;
    record.extend(fields);
    let record = record.clone();
    Ok(Json(json!({ "data": render(db.shape, &store, &record), "meta": {} })))
}

async fn delete_item(
    State(db): State<Db>,
    Path((collection, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Outcome<Response> {
    require_user(&db, &headers).await?;
    let mut store = db.store.write().await;
    let records = store.collections.get_mut(&collection).ok_or(ApiFailure::NotFound)?;
    let index = records
        .iter()
        .position(|r| id_matches(r, &id))
        .ok_or(ApiFailure::NotFound)?;
    let removed = records.remove(index);
    Ok(match db.shape {
        Shape::Flat => StatusCode::NO_CONTENT.into_response(),
        Shape::Nested => Json(json!({ "data": render(db.shape, &store, &removed), "meta": {} })).into_response(),
    })
}

// --- upload plugin ----------------------------------------------------------

async fn upload(State(db): State<Db>, headers: HeaderMap, mut multipart: Multipart) -> Outcome<Json<Value>> {
    require_user(&db, &headers).await?;

    let mut files = Vec::new();
    let mut target: HashMap<String, String> = HashMap::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiFailure::Validation(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "files" {
            let file_name = field.file_name().unwrap_or("file").to_string();
            let mime = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiFailure::Validation(e.to_string()))?;
            files.push((file_name, mime, bytes.len()));
        } else {
            let text = field
                .text()
                .await
                .map_err(|e| ApiFailure::Validation(e.to_string()))?;
            target.insert(name, text);
        }
    }
    if files.is_empty() {
        return Err(ApiFailure::Validation("Files are empty".to_string()));
    }

    let mut store = db.store.write().await;
    let mut created = Vec::new();
    for (name, mime, size) in files {
        let id = store.next_id("files");
        let mut file = Map::new();
        file.insert("id".to_string(), json!(id));
        file.insert("name".to_string(), json!(name));
        file.insert("mime".to_string(), json!(mime));
        file.insert("size".to_string(), json!(size));
        file.insert("url".to_string(), json!(format!("/uploads/{id}_{name}")));
        store.files.push(file.clone());
        created.push(file);
    }

    if let (Some(reference), Some(ref_id), Some(field)) =
        (target.get("ref"), target.get("refId"), target.get("field"))
    {
        let collection = collection_of(reference).ok_or(ApiFailure::NotFound)?;
        let record = find_mut(&mut store.collections, &collection, ref_id).ok_or(ApiFailure::NotFound)?;
        record.insert(field.clone(), created[0]["id"].clone());
    }

    Ok(Json(Value::Array(created.into_iter().map(Value::Object).collect())))
}

async fn list_files(State(db): State<Db>, headers: HeaderMap) -> Outcome<Json<Value>> {
    caller(&db, &headers).await?;
    let store = db.store.read().await;
    Ok(Json(Value::Array(store.files.iter().cloned().map(Value::Object).collect())))
}

async fn get_file(State(db): State<Db>, Path(id): Path<String>, headers: HeaderMap) -> Outcome<Json<Value>> {
    caller(&db, &headers).await?;
    let store = db.store.read().await;
    let file = store
        .files
        .iter()
        .find(|f| id_matches(f, &id))
        .ok_or(ApiFailure::NotFound)?;
    Ok(Json(Value::Object(file.clone())))
}

async fn delete_file(State(db): State<Db>, Path(id): Path<String>, headers: HeaderMap) -> Outcome<Json<Value>> {
    require_user(&db, &headers).await?;
    let mut store = db.store.write().await;
    let index = store
        .files
        .iter()
        .position(|f| id_matches(f, &id))
        .ok_or(ApiFailure::NotFound)?;
    Ok(Json(Value::Object(store.files.remove(index))))
}

// --- helpers ----------------------------------------------------------------

fn data_payload(body: Value) -> Outcome<Map<String, Value>> {
    match body {
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Object(data)) => Ok(data),
            _ => Err(ApiFailure::Validation(
                "Missing \"data\" payload in the request body".to_string(),
            )),
        },
        _ => Err(ApiFailure::Validation("Request body must be an object".to_string())),
    }
}

/// `api::profile.profile` -> `profiles`
fn collection_of(uid: &str) -> Option<String> {
    let singular = uid.strip_prefix("api::")?.split('.').next()?;
    Some(format!("{singular}s"))
}

fn id_matches(record: &Map<String, Value>, id: &str) -> bool {
    match record.get("id") {
        Some(Value::Number(n)) => n.to_string() == id,
        Some(Value::String(s)) => s == id,
        _ => false,
    }
}

fn find<'a>(
    collections: &'a HashMap<String, Vec<Map<String, Value>>>,
    collection: &str,
    id: &str,
) -> Option<&'a Map<String, Value>> {
    collections.get(collection)?.iter().find(|r| id_matches(r, id))
}

fn find_mut<'a>(
    collections: &'a mut HashMap<String, Vec<Map<String, Value>>>,
    collection: &str,
    id: &str,
) -> Option<&'a mut Map<String, Value>> {
    collections.get_mut(collection)?.iter_mut().find(|r| id_matches(r, id))
}

fn param(params: &HashMap<String, String>, key: &str) -> Option<usize> {
    params.get(key).and_then(|v| v.parse().ok())
}

/// `filters[a][b][$op]=value`; only `$eq` and `$contains` are understood.
fn matches_filters(record: &Map<String, Value>, params: &HashMap<String, String>) -> bool {
    params.iter().all(|(key, expected)| {
        let Some(path) = key.strip_prefix("filters[").and_then(|k| k.strip_suffix(']')) else {
            return true;
        };
        let segments: Vec<&str> = path.split("][").collect();
        let Some((op, fields)) = segments.split_last() else {
            return false;
        };
        let actual = lookup(record, fields);
        match *op {
            "$eq" => actual.is_some_and(|v| scalar_text(v).as_deref() == Some(expected.as_str())),
            "$contains" => actual
                .and_then(scalar_text)
                .is_some_and(|text| text.contains(expected.as_str())),
            _ => false,
        }
    })
}

fn lookup<'a>(record: &'a Map<String, Value>, fields: &[&str]) -> Option<&'a Value> {
    let (first, rest) = fields.split_first()?;
    let mut current = record.get(*first)?;
    for field in rest {
        current = match current {
            Value::Object(map) => map.get(*field)?,
            // A relation stored as a bare id answers `[id]` with itself.
            Value::Number(_) if *field == "id" => current,
            _ => return None,
        };
    }
    Some(current)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Render a stored record in the configured envelope shape, expanding
/// relation ids into the related records.
fn render(shape: Shape, store: &Store, record: &Map<String, Value>) -> Value {
    let mut fields = record.clone();
    for (name, source) in RELATIONS {
        let Some(related_id) = fields.get(*name).and_then(Value::as_u64) else {
            continue;
        };
        let related = match source {
            Source::User => store.users.iter().find(|u| u.id == related_id).map(User::public),
            Source::File => store
                .files
                .iter()
                .find(|f| f.get("id").and_then(Value::as_u64) == Some(related_id))
                .cloned(),
        };
        if let Some(related) = related {
            let value = match shape {
                Shape::Flat => Value::Object(related),
                Shape::Nested => json!({ "data": nest(related) }),
            };
            fields.insert(name.to_string(), value);
        }
    }
    match shape {
        Shape::Flat => Value::Object(fields),
        Shape::Nested => nest(fields),
    }
}

fn nest(mut fields: Map<String, Value>) -> Value {
    let id = fields.remove("id").unwrap_or(Value::Null);
    json!({ "id": id, "attributes": fields })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn nest_moves_fields_under_attributes() {
        let nested = nest(record(json!({"id": 1, "title": "A"})));
        assert_eq!(nested, json!({"id": 1, "attributes": {"title": "A"}}));
    }

    #[test]
    fn collection_of_pluralizes_uid() {
        assert_eq!(collection_of("api::profile.profile").as_deref(), Some("profiles"));
        assert_eq!(collection_of("plugin::users-permissions.user"), None);
    }

    #[test]
    fn filters_follow_relation_ids() {
        let profile = record(json!({"id": 3, "users_permissions_user": 7, "slug": "intro"}));
        let params = HashMap::from([(
            "filters[users_permissions_user][id][$eq]".to_string(),
            "7".to_string(),
        )]);
        assert!(matches_filters(&profile, &params));

        let params = HashMap::from([("filters[slug][$eq]".to_string(), "other".to_string())]);
        assert!(!matches_filters(&profile, &params));
    }

    #[test]
    fn non_filter_params_are_ignored() {
        let params = HashMap::from([("populate".to_string(), "*".to_string())]);
        assert!(matches_filters(&record(json!({"id": 1})), &params));
    }

    #[test]
    fn contains_filter() {
        let params = HashMap::from([("filters[title][$contains]".to_string(), "ell".to_string())]);
        assert!(matches_filters(&record(json!({"id": 1, "title": "hello"})), &params));
    }

    #[test]
    fn failure_body_matches_strapi() {
        let response = ApiFailure::Forbidden.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn shape_names() {
        assert_eq!(Shape::from_name("FLAT"), Some(Shape::Flat));
        assert_eq!(Shape::from_name("v4"), Some(Shape::Nested));
        assert_eq!(Shape::from_name("v3"), None);
    }
}
