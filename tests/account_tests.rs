mod common;

use axum::http::{header, Method, StatusCode};
use common::*;
use helpdesk_backend::{auth::rbac::Role, test_support::TEST_PASSWORD};
use serde_json::json;

#[tokio::test]
async fn test_registration_requires_confirmation() {
    let app = TestApp::new();
    let admin = app.db.add_admin("ada");

    let response = app
        .json(
            Method::POST,
            "/api/account/register",
            None,
            json!({
                "username": "newbie",
                "email": "newbie@example.com",
                "full_name": "New Customer",
                "password": "long-enough-secret",
                "confirm_password": "long-enough-secret"
            }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = json_body(response).await;
    assert_eq!(created["is_active"], false);
    assert_eq!(created["roles"], json!(["Customer"]));
    let user_id = created["id"].as_str().unwrap().to_string();

    let login = json!({"username": "newbie", "password": "long-enough-secret"});
    let response = app.json(Method::POST, "/api/account/login", None, login.clone()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .json(
            Method::PUT,
            &format!("/api/users/{}/confirm", user_id),
            Some(&app.cookie(&admin)),
            json!({}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.json(Method::POST, "/api/account/login", None, login).await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = set_cookie(&response).expect("session cookie");
    assert!(response.headers()[header::SET_COOKIE]
        .to_str()
        .unwrap()
        .contains("HttpOnly"));

    let response = app.get("/api/account/status", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["username"], "newbie");
}

#[tokio::test]
async fn test_login_rejects_wrong_password() {
    let app = TestApp::new();
    app.db.add_customer("carol");

    let response = app
        .json(
            Method::POST,
            "/api/account/login",
            None,
            json!({"username": "carol", "password": "not-the-password"}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(header::SET_COOKIE).is_none());

    let response = app
        .json(
            Method::POST,
            "/api/account/login",
            None,
            json!({"username": "CAROL", "password": TEST_PASSWORD}),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_protected_routes_require_session() {
    let app = TestApp::new();

    for uri in ["/api/tickets/my", "/api/account/status", "/api/users"] {
        let response = app.get(uri, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
    }

    let response = app.get("/api/tickets/my", Some("session=garbage")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_deleted_user_session_is_rejected() {
    let app = TestApp::new();
    let admin = app.db.add_admin("ada");
    let customer = app.db.add_customer("carol");
    let cookie = app.cookie(&customer);

    let response = app.get("/api/tickets/my", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .send(
            axum::http::Request::builder()
                .method(Method::DELETE)
                .uri(format!("/api/users/{}", customer.id))
                .header(header::COOKIE, app.cookie(&admin))
                .body(axum::body::Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.get("/api/tickets/my", Some(&cookie)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_user_management_is_role_gated() {
    let app = TestApp::new();
    let support = app.db.add_staff("sam", &[Role::Support]);
    let manager = app.db.add_staff("tim", &[Role::TechnicalManager]);

    let response = app.get("/api/users", Some(&app.cookie(&support))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app.get("/api/users", Some(&app.cookie(&manager))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["total_count"], 2);
}

#[tokio::test]
async fn test_health_and_info_are_public() {
    let app = TestApp::new();

    let response = app.get("/api/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(
        response.headers()["x-content-type-options"],
        "nosniff"
    );

    let response = app.get("/api/health/simple", None).await;
    assert_eq!(extract_body(response).await, b"OK");

    let response = app.get("/api/info/status", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["name"], env!("CARGO_PKG_NAME"));
}
