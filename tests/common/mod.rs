#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    response::Response,
    Router,
};
use helpdesk_backend::{
    config::Settings,
    models::User,
    routes::create_router,
    services::LocalFileStorage,
    test_support::{self, InMemoryDatabase},
    AppState,
};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

pub const BOUNDARY: &str = "helpdesk-test-boundary";

/// Router over in-memory repositories with attachment bytes in a temp dir.
pub struct TestApp {
    pub router: Router,
    pub db: Arc<InMemoryDatabase>,
    pub state: AppState,
    pub storage_dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        let storage_dir = tempfile::tempdir().expect("temp dir");
        let mut settings = Settings::new_with_env_file(false).expect("test settings");
        settings.attachment_storage_path = storage_dir.path().to_string_lossy().to_string();

        let db = InMemoryDatabase::new();
        let storage = Arc::new(LocalFileStorage::new(storage_dir.path()));
        let state = AppState::from_parts(settings, None, db.repositories(), storage)
            .expect("app state");

        Self {
            router: create_router(state.clone()),
            db,
            state,
            storage_dir,
        }
    }

    /// Encrypted session cookie for a fixture user.
    pub fn cookie(&self, user: &User) -> String {
        test_support::session_cookie(&self.state.key, user, 3600)
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.expect("router call")
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
        self.send(request(Method::GET, uri, cookie).body(Body::empty()).unwrap())
            .await
    }

    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: Value,
    ) -> Response {
        let request = request(method, uri, cookie)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    pub async fn multipart(
        &self,
        uri: &str,
        cookie: Option<&str>,
        content: Option<&str>,
        files: &[(&str, &str, &[u8])],
    ) -> Response {
        let request = request(Method::POST, uri, cookie)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(content, files)))
            .unwrap();
        self.send(request).await
    }
}

fn request(method: Method, uri: &str, cookie: Option<&str>) -> axum::http::request::Builder {
    let builder = Request::builder().method(method).uri(uri);
    match cookie {
        Some(cookie) => builder.header(header::COOKIE, cookie),
        None => builder,
    }
}

/// `files` are `(file name, content type, bytes)`.
pub fn multipart_body(content: Option<&str>, files: &[(&str, &str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some(content) = content {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"content\"\r\n\r\n{}\r\n",
                BOUNDARY, content
            )
            .as_bytes(),
        );
    }
    for (name, content_type, data) in files {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                BOUNDARY, name, content_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub async fn extract_body(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), 64 * 1024 * 1024)
        .await
        .unwrap()
        .to_vec()
}

pub async fn json_body(response: Response) -> Value {
    let bytes = extract_body(response).await;
    serde_json::from_slice(&bytes).expect("json body")
}

/// `name=value` part of the first `Set-Cookie` header.
pub fn set_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}
