mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use common::{PASSWORD, TestApp, body_json, cookie_pair, json_request};

#[tokio::test]
async fn test_register_returns_token_and_refresh_cookie() {
    let app = TestApp::new().await;

    let response = app
        .send(json_request(
            "POST",
            "/auth/register",
            serde_json::json!({ "name": "Alice", "email": "alice@example.com", "password": PASSWORD }),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(set_cookie.starts_with("refreshToken="));
    assert!(set_cookie.contains("HttpOnly"));

    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["user"]["email"], "alice@example.com");
    assert_eq!(json["user"]["role"], "user");
    assert!(json["user"].get("passwordHash").is_none());
    assert!(json["accessToken"].as_str().is_some());
}

#[tokio::test]
async fn test_register_duplicate_email_conflicts() {
    let app = TestApp::new().await;
    app.register("Alice", "alice@example.com").await;

    let response = app
        .send(json_request(
            "POST",
            "/auth/register",
            serde_json::json!({ "name": "Other", "email": "alice@example.com", "password": PASSWORD }),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json = body_json(response).await;
    assert_eq!(json["error"], "User with this email already exists");
}

#[tokio::test]
async fn test_register_validates_fields() {
    let app = TestApp::new().await;

    for body in [
        serde_json::json!({ "name": "A", "email": "a@example.com", "password": PASSWORD }),
        serde_json::json!({ "name": "Alice", "email": "not-an-email", "password": PASSWORD }),
        serde_json::json!({ "name": "Alice", "email": "a@example.com", "password": "short" }),
    ] {
        let response = app.send(json_request("POST", "/auth/register", body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn test_login_wrong_password_unauthorized() {
    let app = TestApp::new().await;
    app.register("Alice", "alice@example.com").await;

    let response = app
        .send(json_request(
            "POST",
            "/auth/login",
            serde_json::json!({ "email": "alice@example.com", "password": "wrong-password" }),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = body_json(response).await;
    assert_eq!(json["error"], "Invalid email or password");
}

#[tokio::test]
async fn test_refresh_issues_new_access_token() {
    let app = TestApp::new().await;
    let session = app.register("Alice", "alice@example.com").await;

    let response = app
        .send(
            Request::get("/auth/token")
                .header(header::COOKIE, &session.refresh_cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["user"]["id"], session.user_id.as_str());

    let token = json["accessToken"].as_str().unwrap();
    let response = app
        .send(
            Request::get("/auth/user")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_rejects_missing_or_tampered_cookie() {
    let app = TestApp::new().await;
    let session = app.register("Alice", "alice@example.com").await;

    let response = app
        .send(Request::get("/auth/token").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let tampered = format!("{}x", session.refresh_cookie);
    let response = app
        .send(
            Request::get("/auth/token")
                .header(header::COOKIE, tampered)
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_access_token_is_not_a_refresh_token() {
    let app = TestApp::new().await;
    let session = app.register("Alice", "alice@example.com").await;
    let signed = session.refresh_cookie.trim_start_matches("refreshToken=");
    let (refresh_token, _signature) = signed.rsplit_once('.').unwrap();

    let response = app
        .send(
            Request::get("/auth/user")
                .header(header::AUTHORIZATION, format!("Bearer {}", refresh_token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_clears_refresh_cookie() {
    let app = TestApp::new().await;

    let response = app
        .send(Request::get("/auth/logout").body(Body::empty()).unwrap())
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let cleared = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(cleared.starts_with("refreshToken=;"));
    assert!(cleared.contains("Max-Age=0"));
    assert_eq!(cookie_pair(&response, "refreshToken").as_deref(), Some("refreshToken="));
    assert_eq!(body_json(response).await["success"], true);
}

#[tokio::test]
async fn test_current_user_requires_token() {
    let app = TestApp::new().await;

    let response = app
        .send(Request::get("/auth/user").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .send(
            Request::get("/auth/user")
                .header(header::AUTHORIZATION, "Bearer not-a-jwt")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_current_user_and_roles() {
    let app = TestApp::new().await;
    let session = app.register("Alice", "alice@example.com").await;

    let response = app
        .send(
            Request::get("/auth/user")
                .header(header::AUTHORIZATION, session.bearer())
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["user"]["name"], "Alice");

    let admin = app.admin("root@example.com").await;
    let response = app
        .send(
            Request::get("/auth/user/roles")
                .header(header::AUTHORIZATION, admin.bearer())
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!(["admin"]));
}
