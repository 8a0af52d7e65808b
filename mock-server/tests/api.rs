use axum::http::{self, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use mock_server::{app, app_with_shape, Shape};
use serde_json::{json, Value};
use tower::ServiceExt;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<String> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(http::header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(body.to_string()).unwrap()
}

fn get(uri: &str) -> Request<String> {
    Request::builder().uri(uri).body(String::new()).unwrap()
}

async fn register(app: &Router, username: &str) -> String {
    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/local/register",
            None,
            json!({"username": username, "email": format!("{username}@example.com"), "password": "secret123"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    body_json(resp).await["jwt"].as_str().unwrap().to_string()
}

// --- auth ---

#[tokio::test]
async fn register_then_login() {
    let app = app();
    register(&app, "ana").await;

    let resp = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/auth/local",
            None,
            json!({"identifier": "ana@example.com", "password": "secret123"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert!(body["jwt"].is_string());
    assert_eq!(body["user"]["username"], "ana");
    assert!(body["user"].get("password").is_none());
}

#[tokio::test]
async fn wrong_password_is_a_validation_error() {
    let app = app();
    register(&app, "ana").await;

    let resp = app
        .oneshot(json_request(
            "POST",
            "/api/auth/local",
            None,
            json!({"identifier": "ana", "password": "nope"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body = body_json(resp).await;
    assert_eq!(body["error"]["name"], "ValidationError");
    assert_eq!(body["error"]["message"], "Invalid identifier or password");
}

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let app = app();
    register(&app, "ana").await;
    let resp = app
        .oneshot(json_request(
            "POST",
            "/api/auth/local/register",
            None,
            json!({"username": "ana", "email": "other@example.com", "password": "secret123"}),
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"]["message"], "Email or Username are already taken");
}

// --- collections ---

#[tokio::test]
async fn list_empty_collection_has_pagination() {
    let resp = app().oneshot(get("/api/articles")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_json(resp).await;
    assert_eq!(body["data"], json!([]));
    assert_eq!(body["meta"]["pagination"]["total"], 0);
    assert_eq!(body["meta"]["pagination"]["pageSize"], 25);
}

#[tokio::test]
async fn create_without_token_is_forbidden() {
    let resp = app()
        .oneshot(json_request("POST", "/api/articles", None, json!({"data": {"title": "A"}})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body = body_json(resp).await;
    assert_eq!(body["data"], Value::Null);
    assert_eq!(body["error"]["name"], "ForbiddenError");
    assert_eq!(body["error"]["message"], "Forbidden");
}

#[tokio::test]
async fn unknown_token_is_unauthorized() {
    let resp = app()
        .oneshot(json_request("GET", "/api/articles", Some("stale"), Value::Null))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_requires_data_wrapper() {
    let app = app();
    let token = register(&app, "ana").await;
    let resp = app
        .oneshot(json_request("POST", "/api/articles", Some(&token), json!({"title": "A"})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"]["name"], "ValidationError");
}

#[tokio::test]
async fn nested_shape_crud() {
    let app = app();
    let token = register(&app, "ana").await;

    let resp = app
        .clone()
        .oneshot(json_request("POST", "/api/articles", Some(&token), json!({"data": {"title": "A"}})))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let created = body_json(resp).await;
    assert_eq!(created["data"], json!({"id": 1, "attributes": {"title": "A"}}));

    let resp = app
        .clone()
        .oneshot(json_request("PUT", "/api/articles/1", Some(&token), json!({"data": {"title": "B"}})))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["data"]["attributes"]["title"], "B");

    let resp = app.clone().oneshot(get("/api/articles/1")).await.unwrap();
    assert_eq!(body_json(resp).await["data"]["attributes"]["title"], "B");

    let resp = app
        .clone()
        .oneshot(json_request("DELETE", "/api/articles/1", Some(&token), Value::Null))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_json(resp).await["data"]["id"], 1);

    let resp = app.oneshot(get("/api/articles/1")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(resp).await["error"]["name"], "NotFoundError");
}

#[tokio::test]
async fn flat_shape_crud() {
    let app = app_with_shape(Shape::Flat);
    let token = register(&app, "ana").await;

    let resp = app
        .clone()
        .oneshot(json_request("POST", "/api/articles", Some(&token), json!({"data": {"title": "A"}})))
        .await
        .unwrap();
    let created = body_json(resp).await;
    assert_eq!(created["data"]["id"], 1);
    assert_eq!(created["data"]["title"], "A");
    assert!(created["data"]["documentId"].is_string());
    assert!(created["data"].get("attributes").is_none());

    let resp = app
        .clone()
        .oneshot(json_request("DELETE", "/api/articles/1", Some(&token), Value::Null))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(body_bytes(resp).await.is_empty());
}

#[tokio::test]
async fn list_filters_and_paginates() {
    let app = app();
    let token = register(&app, "ana").await;
    for slug in ["intro", "guide", "intro"] {
        app.clone()
            .oneshot(json_request("POST", "/api/docs", Some(&token), json!({"data": {"slug": slug}})))
            .await
            .unwrap();
    }

    let resp = app
        .clone()
        .oneshot(get("/api/docs?filters%5Bslug%5D%5B%24eq%5D=intro"))
        .await
        .unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    assert_eq!(body["meta"]["pagination"]["total"], 2);

    let resp = app
        .oneshot(get("/api/docs?pagination%5Bpage%5D=2&pagination%5BpageSize%5D=2"))
        .await
        .unwrap();
    let body = body_json(resp).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["meta"]["pagination"]["pageCount"], 2);
}

#[tokio::test]
async fn owner_relation_is_expanded() {
    let app = app();
    let token = register(&app, "ana").await;
    app.clone()
        .oneshot(json_request(
            "POST",
            "/api/profiles",
            Some(&token),
            json!({"data": {"bio": "hi", "users_permissions_user": 1}}),
        ))
        .await
        .unwrap();

    let resp = app
        .oneshot(get("/api/profiles?filters%5Busers_permissions_user%5D%5Bid%5D%5B%24eq%5D=1"))
        .await
        .unwrap();
    let body = body_json(resp).await;
    let owner = &body["data"][0]["attributes"]["users_permissions_user"];
    assert_eq!(owner["data"]["id"], 1);
    assert_eq!(owner["data"]["attributes"]["username"], "ana");
}

// --- upload ---

fn multipart_request(token: &str, fields: &[(&str, &str)]) -> Request<String> {
    let boundary = "test-boundary";
    let mut body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"me.png\"\r\nContent-Type: image/png\r\n\r\nPNG\r\n"
    );
    for (name, value) in fields {
        body.push_str(&format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    body.push_str(&format!("--{boundary}--\r\n"));
    Request::builder()
        .method("POST")
        .uri("/api/upload")
        .header(http::header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
        .header(http::header::AUTHORIZATION, format!("Bearer {token}"))
        .body(body)
        .unwrap()
}

#[tokio::test]
async fn upload_attaches_avatar_to_profile() {
    let app = app();
    let token = register(&app, "ana").await;
    app.clone()
        .oneshot(json_request("POST", "/api/profiles", Some(&token), json!({"data": {"bio": "hi"}})))
        .await
        .unwrap();

    let resp = app
        .clone()
        .oneshot(multipart_request(
            &token,
            &[("ref", "api::profile.profile"), ("refId", "1"), ("field", "avatar")],
        ))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let uploaded = body_json(resp).await;
    assert_eq!(uploaded[0]["name"], "me.png");
    assert_eq!(uploaded[0]["mime"], "image/png");
    assert_eq!(uploaded[0]["size"], 3);

    let resp = app.clone().oneshot(get("/api/profiles/1")).await.unwrap();
    let profile = body_json(resp).await;
    assert_eq!(profile["data"]["attributes"]["avatar"]["data"]["attributes"]["name"], "me.png");

    let resp = app.clone().oneshot(get("/api/upload/files")).await.unwrap();
    assert_eq!(body_json(resp).await.as_array().unwrap().len(), 1);

    let resp = app
        .clone()
        .oneshot(json_request("DELETE", "/api/upload/files/1", Some(&token), Value::Null))
        .await
        .unwrap();
    assert_eq!(body_json(resp).await["id"], 1);

    let resp = app.oneshot(get("/api/upload/files/1")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn upload_requires_token() {
    let resp = app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/upload")
                .header(http::header::CONTENT_TYPE, "multipart/form-data; boundary=x")
                .body("--x--\r\n".to_string())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}
