//! In-process test harness: a router over a temp-dir SQLite store with a
//! seeded admin token, driven through `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use rafflebox::auth::{TokenHasher, issue_admin_token};
use rafflebox::clock::SystemClock;
use rafflebox::config::Config;
use rafflebox::error::Result;
use rafflebox::notify::{Notification, Notifier};
use rafflebox::orders::SeededDraw;
use rafflebox::server::{AppState, create_router};
use rafflebox::store::{SqliteStore, Store};

pub const PAYPHONE_STORE_ID: &str = "store-1";
pub const PAYPHONE_SECRET: &str = "s3cret";

/// Collects notifications instead of delivering them.
#[derive(Default)]
pub struct Outbox(Mutex<Vec<Notification>>);

impl Notifier for Outbox {
    fn send(&self, notification: &Notification) -> Result<()> {
        self.0.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

impl Outbox {
    pub fn templates(&self) -> Vec<&'static str> {
        self.0
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.template.as_str())
            .collect()
    }

    pub fn last_data(&self) -> Value {
        self.0.lock().unwrap().last().expect("no notification").data.clone()
    }
}

pub struct TestApp {
    _temp_dir: TempDir,
    pub store: Arc<SqliteStore>,
    pub outbox: Arc<Outbox>,
    pub admin_token: String,
    router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(customize: impl FnOnce(&mut Config)) -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");

        let mut config = Config::default();
        config.server.data_dir = temp_dir.path().to_path_buf();
        config.server.public_base_url = Some("https://tickets.example.com".to_string());
        config.server.dev_mode = true;
        config.payments.payphone.store_id = Some(PAYPHONE_STORE_ID.to_string());
        config.payments.payphone.webhook_secret = Some(PAYPHONE_SECRET.to_string());
        customize(&mut config);

        let store = Arc::new(SqliteStore::new(config.server.db_path()).expect("open store"));
        store.initialize().expect("initialize store");
        let admin_token =
            issue_admin_token(store.as_ref(), &TokenHasher::new()).expect("issue admin token");

        let outbox = Arc::new(Outbox::default());
        let state = AppState::with_collaborators(
            store.clone(),
            config,
            Arc::new(SystemClock),
            Arc::new(SeededDraw::new(42)),
            outbox.clone(),
        );
        let router = create_router(Arc::new(state));

        Self {
            _temp_dir: temp_dir,
            store,
            outbox,
            admin_token,
            router,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, body)
    }

    pub async fn get(&self, path: &str) -> (StatusCode, Value) {
        self.send(
            Request::get(path)
                .body(Body::empty())
                .expect("build request"),
        )
        .await
    }

    pub async fn post_json(&self, path: &str, body: &Value) -> (StatusCode, Value) {
        self.send(json_request("POST", path, body, None)).await
    }

    pub async fn admin(&self, method: &str, path: &str, body: Option<&Value>) -> (StatusCode, Value) {
        let request = match body {
            Some(body) => json_request(method, path, body, Some(&self.admin_token)),
            None => Request::builder()
                .method(method)
                .uri(path)
                .header(header::AUTHORIZATION, format!("Bearer {}", self.admin_token))
                .body(Body::empty())
                .expect("build request"),
        };
        self.send(request).await
    }

    /// Creates and publishes a raffle, returning its id.
    pub async fn published_raffle(&self, unit_price: &str, stock_total: i64) -> String {
        let (status, body) = self
            .admin(
                "POST",
                "/api/v1/admin/raffles",
                Some(&serde_json::json!({
                    "title": "Motorbike",
                    "unit_price": unit_price,
                    "stock_total": stock_total,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create raffle: {body}");
        let id = body["data"]["id"].as_str().expect("raffle id").to_string();

        let (status, body) = self
            .admin(
                "PATCH",
                &format!("/api/v1/admin/raffles/{id}"),
                Some(&serde_json::json!({ "state": "published" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "publish raffle: {body}");
        id
    }
}

pub fn json_request(method: &str, path: &str, body: &Value, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("build request")
}
