#![allow(dead_code, clippy::unwrap_used)]

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use rollcall_core::Config;
use tower::ServiceExt;

use rollcall_server::app::{AppState, build_router};
use rollcall_server::storage::{Device, RollcallDatabase};

pub struct TestApp {
    pub db: RollcallDatabase,
    pub router: Router,
}

pub async fn app() -> TestApp {
    app_with(&Config::default()).await
}

pub async fn app_with(config: &Config) -> TestApp {
    let db = RollcallDatabase::open_in_memory().await.unwrap();
    let state = AppState::new(db.clone(), config).unwrap();
    TestApp {
        db,
        router: build_router(state),
    }
}

impl TestApp {
    pub async fn device(&self, serial: &str, tenant: &str) -> Device {
        self.db.create_device(serial, "Gate", tenant).await.unwrap()
    }

    /// Send a request and return (status, body text).
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        headers: &[(&str, &str)],
        body: impl Into<Body>,
    ) -> (StatusCode, String) {
        let mut builder = Request::builder().method(method).uri(uri);
        for &(name, value) in headers {
            builder = builder.header(name, value);
        }
        let resp = self
            .router
            .clone()
            .oneshot(builder.body(body.into()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, String) {
        self.send(Method::GET, uri, &[], Body::empty()).await
    }

    pub async fn post(&self, uri: &str, body: &str) -> (StatusCode, String) {
        self.send(Method::POST, uri, &[], body.to_string()).await
    }

    /// Admin call as `tenant` with an optional JSON body.
    pub async fn admin(
        &self,
        method: Method,
        uri: &str,
        tenant: &str,
        json: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut headers = vec![("x-tenant-id", tenant)];
        let body = match json {
            Some(v) => {
                headers.push(("content-type", "application/json"));
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let (status, text) = self.send(method, uri, &headers, body).await;
        let value = if text.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_str(&text).unwrap()
        };
        (status, value)
    }
}
