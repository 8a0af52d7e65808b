//! Scripted transport shared by the session-level tests.
//!
//! Responses are queued up front and handed out in request order; every
//! request is recorded so tests can assert on what was sent.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use strapi_core::{
    ApiError, Credentials, HttpRequest, HttpResponse, MemoryStore, Result, Session, StrapiClient, Transport,
};

pub const BASE_URL: &str = "http://localhost:1337/api";

struct Reply {
    delay: Duration,
    result: Result<HttpResponse>,
}

#[derive(Default)]
struct Script {
    replies: VecDeque<Reply>,
    requests: Vec<HttpRequest>,
}

#[derive(Clone, Default)]
pub struct Scripted {
    script: Arc<Mutex<Script>>,
}

impl Scripted {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, status: u16, body: Value) -> &Self {
        self.push(Duration::ZERO, Ok(response(status, body.to_string())))
    }

    pub fn respond_after(&self, delay: Duration, status: u16, body: Value) -> &Self {
        self.push(delay, Ok(response(status, body.to_string())))
    }

    pub fn respond_empty(&self, status: u16) -> &Self {
        self.push(Duration::ZERO, Ok(response(status, String::new())))
    }

    /// The next request fails before any response arrives.
    pub fn unreachable(&self) -> &Self {
        self.push(
            Duration::ZERO,
            Err(ApiError::Transport("connection refused".to_string())),
        )
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.script.lock().unwrap().requests.clone()
    }

    pub fn last_request(&self) -> HttpRequest {
        self.requests().pop().expect("no request was sent")
    }

    fn push(&self, delay: Duration, result: Result<HttpResponse>) -> &Self {
        self.script.lock().unwrap().replies.push_back(Reply { delay, result });
        self
    }
}

impl Transport for Scripted {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let reply = {
            let mut script = self.script.lock().unwrap();
            script.requests.push(request);
            script.replies.pop_front().expect("no scripted response left")
        };
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        reply.result
    }
}

fn response(status: u16, body: String) -> HttpResponse {
    HttpResponse {
        status,
        headers: vec![("content-type".to_string(), "application/json".to_string())],
        body,
    }
}

pub fn anonymous(transport: &Scripted) -> Session<Scripted> {
    Session::new(StrapiClient::new(BASE_URL), transport.clone(), MemoryStore::new())
}

/// A session whose store already holds a token, plus a handle on that store.
pub fn signed_in(transport: &Scripted) -> (Session<Scripted>, Arc<MemoryStore>) {
    let credentials = Credentials {
        jwt: "token-1".to_string(),
        user: json!({"id": 1, "username": "ana"}),
    };
    let store = Arc::new(MemoryStore::with_credentials(&credentials).unwrap());
    let session = Session::new(StrapiClient::new(BASE_URL), transport.clone(), Arc::clone(&store));
    (session, store)
}

pub fn strapi_error(status: u16, name: &str, message: &str) -> Value {
    json!({
        "data": null,
        "error": {"status": status, "name": name, "message": message, "details": {}}
    })
}
