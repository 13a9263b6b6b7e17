//! HTTP flows through the full router.

mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use common::{
    bearer_request, body_json, cookie_request, json_request, session_cookies, set_cookies,
    TestApp,
};
use serde_json::json;

#[tokio::test]
async fn register_returns_created_user() {
    let app = TestApp::spawn().await;

    let response = app
        .send(json_request(
            Method::POST,
            "/auth/register",
            None,
            json!({ "login": "alice", "password": "secret1" }),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["login"], "alice");
    assert!(body.get("password").is_none());

    let response = app
        .send(json_request(
            Method::POST,
            "/auth/register",
            None,
            json!({ "login": "alice", "password": "secret2" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn register_validates_body() {
    let app = TestApp::spawn().await;

    let response = app
        .send(json_request(
            Method::POST,
            "/auth/register",
            None,
            json!({ "login": "alice", "password": "abc" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/auth/register")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .expect("request");
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_sets_session_cookies() {
    let app = TestApp::spawn().await;
    app.register("alice", "secret1").await;

    let response = app
        .send(json_request(
            Method::POST,
            "/auth/login",
            None,
            json!({ "login": "alice", "password": "secret1" }),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let cookies = set_cookies(&response);
    let access = cookies
        .iter()
        .find(|c| c.starts_with("access_token_cookie="))
        .expect("access cookie");
    assert!(access.contains("HttpOnly"));
    let expire = cookies
        .iter()
        .find(|c| c.starts_with("access_expire="))
        .expect("access expiry cookie");
    assert!(!expire.contains("HttpOnly"));
    assert!(cookies.iter().any(|c| c.starts_with("refresh_token_cookie=")));
    assert!(cookies.iter().any(|c| c.starts_with("refresh_expire=")));

    let body = body_json(response).await;
    assert_eq!(body["token_type"], "Bearer");
    assert!(body["access_token"].as_str().is_some_and(|t| !t.is_empty()));
}

#[tokio::test]
async fn login_with_wrong_password_is_unauthorized() {
    let app = TestApp::spawn().await;
    app.register("alice", "secret1").await;

    let response = app
        .send(json_request(
            Method::POST,
            "/auth/login",
            None,
            json!({ "login": "alice", "password": "wrong1" }),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["detail"], "Invalid login or password");
}

#[tokio::test]
async fn access_token_accepted_from_header_or_cookie() {
    let app = TestApp::spawn().await;
    let alice = app.register("alice", "secret1").await;
    let pair = app.login("alice", "secret1").await;

    let response = app
        .send(bearer_request(Method::GET, "/auth/checkout_access", &pair.access_token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["valid"], true);

    let response = app
        .send(cookie_request(Method::GET, "/auth/get_payload", &session_cookies(&pair)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["user_id"], alice.id.to_string());
    assert_eq!(body["token_type"], "access");

    let response = app
        .send(
            Request::builder()
                .uri("/auth/checkout_access")
                .body(Body::empty())
                .expect("request"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn refresh_sets_new_access_cookie() {
    let app = TestApp::spawn().await;
    app.register("alice", "secret1").await;
    let pair = app.login("alice", "secret1").await;

    let response = app
        .send(cookie_request(
            Method::GET,
            "/auth/refresh",
            &format!("refresh_token_cookie={}", pair.refresh_token),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let cookies = set_cookies(&response);
    assert!(cookies.iter().any(|c| c.starts_with("access_token_cookie=")));
    assert!(!cookies.iter().any(|c| c.starts_with("refresh_token_cookie=")));

    let body = body_json(response).await;
    let token = body["access_token"].as_str().expect("access token");
    app.claims(token).await;
}

#[tokio::test]
async fn logout_clears_cookies_and_revoked_token_clears_them_again() {
    let app = TestApp::spawn().await;
    app.register("alice", "secret1").await;
    let pair = app.login("alice", "secret1").await;

    let response = app
        .send(cookie_request(Method::GET, "/auth/logout", &session_cookies(&pair)))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookies(&response)
        .iter()
        .any(|c| c.starts_with("access_token_cookie=;") && c.contains("Max-Age=0")));

    let response = app
        .send(bearer_request(Method::GET, "/auth/checkout_access", &pair.access_token))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let cleared = set_cookies(&response);
    for name in [
        "access_token_cookie=",
        "access_expire=",
        "refresh_token_cookie=",
        "refresh_expire=",
    ] {
        assert!(
            cleared.iter().any(|c| c.starts_with(name) && c.contains("Max-Age=0")),
            "{} not cleared in {:?}",
            name,
            cleared
        );
    }
}

#[tokio::test]
async fn invalid_token_does_not_clear_cookies() {
    let app = TestApp::spawn().await;

    let response = app
        .send(bearer_request(Method::GET, "/auth/checkout_access", "garbage"))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookies(&response).is_empty());
}

#[tokio::test]
async fn change_password_then_delete_account() {
    let app = TestApp::spawn().await;
    app.register("alice", "secret1").await;
    let pair = app.login("alice", "secret1").await;

    let response = app
        .send(json_request(
            Method::PUT,
            "/auth/change_password",
            Some(&pair.access_token),
            json!({ "old_password": "secret1", "new_password": "secret2" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .send(bearer_request(Method::DELETE, "/auth/delete", &pair.access_token))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .send(bearer_request(Method::GET, "/auth/get_payload", &pair.access_token))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn permission_routes_require_privileged_caller() {
    let app = TestApp::spawn().await;
    app.register("alice", "secret1").await;
    let alice = app.login("alice", "secret1").await;

    let response = app
        .send(
            Request::builder()
                .uri("/permission/get_all")
                .body(Body::empty())
                .expect("request"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .send(bearer_request(Method::GET, "/permission/get_all", &alice.access_token))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_manages_permissions_over_http() {
    let app = TestApp::spawn().await;
    let root = app.admin_session("root").await;
    app.register("alice", "secret1").await;
    let alice = app.login("alice", "secret1").await;
    let token = Some(root.access_token.as_str());

    let response = app
        .send(json_request(
            Method::POST,
            "/permission/create",
            token,
            json!({ "name": "reports", "description": "Read reports" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let created = body_json(response).await;
    assert_eq!(created["name"], "reports");

    let response = app
        .send(json_request(
            Method::POST,
            "/permission/assign",
            token,
            json!({ "permission": { "id": created["id"] }, "user": { "login": "alice" } }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let granted = body_json(response).await;
    assert_eq!(granted["login"], "alice");
    assert_eq!(granted["permissions"][0]["name"], "reports");

    // Alice's session predates the grant.
    let response = app
        .send(bearer_request(Method::GET, "/auth/checkout_access", &alice.access_token))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .send(json_request(
            Method::POST,
            "/permission/get_user_permissions",
            token,
            json!({ "login": "alice" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["permissions"].as_array().map(Vec::len), Some(1));

    let response = app
        .send(json_request(
            Method::PUT,
            "/permission/update",
            token,
            json!({ "permission": { "name": "reports" }, "changes": { "name": "analytics" } }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["name"], "analytics");

    let take_away = json!({ "permission": { "name": "analytics" }, "user": { "login": "alice" } });
    let response = app
        .send(json_request(
            Method::DELETE,
            "/permission/take_away",
            token,
            take_away.clone(),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .send(json_request(Method::DELETE, "/permission/take_away", token, take_away))
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .send(json_request(
            Method::DELETE,
            "/permission/delete",
            token,
            json!({ "name": "analytics" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .send(bearer_request(Method::GET, "/permission/get_all", &root.access_token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let all = body_json(response).await;
    let names: Vec<_> = all["permissions"]
        .as_array()
        .expect("permissions array")
        .iter()
        .filter_map(|p| p["name"].as_str())
        .collect();
    assert_eq!(names, ["admin"]);
}

#[tokio::test]
async fn selector_without_id_or_name_is_bad_request() {
    let app = TestApp::spawn().await;
    let root = app.admin_session("root").await;

    let response = app
        .send(json_request(
            Method::DELETE,
            "/permission/delete",
            Some(&root.access_token),
            json!({}),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["detail"], "not enough information");
}

#[tokio::test]
async fn deleting_admin_permission_locks_out_admins() {
    let app = TestApp::spawn().await;
    let root = app.admin_session("root").await;

    let response = app
        .send(json_request(
            Method::DELETE,
            "/permission/delete",
            Some(&root.access_token),
            json!({ "name": "admin" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .send(bearer_request(Method::GET, "/permission/get_all", &root.access_token))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(!set_cookies(&response).is_empty());
}

#[tokio::test]
async fn health_reports_store_outage() {
    let app = TestApp::spawn().await;

    let response = app
        .send(Request::builder().uri("/health").body(Body::empty()).expect("request"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "auth-service-test");

    app.revocation_store.set_unavailable(true);
    let response = app
        .send(Request::builder().uri("/health").body(Body::empty()).expect("request"))
        .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn metrics_and_openapi_are_served() {
    let app = TestApp::spawn().await;
    app.register("alice", "secret1").await;
    app.login("alice", "secret1").await;

    let response = app
        .send(Request::builder().uri("/metrics").body(Body::empty()).expect("request"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .send(
            Request::builder()
                .uri("/.well-known/openapi.json")
                .body(Body::empty())
                .expect("request"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let openapi = body_json(response).await;
    assert!(openapi["paths"].get("/auth/login").is_some());
    assert!(openapi["paths"].get("/permission/assign").is_some());
}
