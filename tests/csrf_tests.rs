mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use common::{TestApp, body_json, product_body};

fn create_product_request(
    bearer: &str,
    csrf_header: Option<&str>,
    cookie: Option<&str>,
) -> Request<Body> {
    let mut builder = Request::post("/product")
        .header(header::AUTHORIZATION, bearer)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = csrf_header {
        builder = builder.header("x-csrf-token", token);
    }
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder
        .body(Body::from(product_body("Mug", 12.5).to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_csrf_token_endpoint_sets_cookie() {
    let app = TestApp::new().await;

    let response = app
        .send(Request::get("/csrf-token").body(Body::empty()).unwrap())
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(cookie.starts_with("__csrf="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Strict"));
    assert!(cookie.contains("Max-Age=3600"));

    let json = body_json(response).await;
    assert!(!json["csrfToken"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_csrf_is_forbidden() {
    let app = TestApp::new().await;
    let admin = app.admin("root@example.com").await;
    let csrf = app.csrf().await;

    for (header_value, cookie) in [
        (None, None),
        (Some(csrf.token.as_str()), None),
        (None, Some(csrf.cookie.as_str())),
    ] {
        let response = app
            .send(create_product_request(&admin.bearer(), header_value, cookie))
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(response).await["error"], "Invalid CSRF token");
    }

    let (products, total) = app.db.products().list(10, 0).await.unwrap();
    assert!(products.is_empty());
    assert_eq!(total, 0);
}

#[tokio::test]
async fn test_mismatched_csrf_is_forbidden() {
    let app = TestApp::new().await;
    let admin = app.admin("root@example.com").await;
    let first = app.csrf().await;
    let second = app.csrf().await;

    let response = app
        .send(create_product_request(
            &admin.bearer(),
            Some(&first.token),
            Some(&second.cookie),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let forged = format!("__csrf={}.forged", first.token);
    let response = app
        .send(create_product_request(
            &admin.bearer(),
            Some(&first.token),
            Some(&forged),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_matching_csrf_is_accepted() {
    let app = TestApp::new().await;
    let admin = app.admin("root@example.com").await;
    let csrf = app.csrf().await;

    let response = app
        .send(create_product_request(
            &admin.bearer(),
            Some(&csrf.token),
            Some(&csrf.cookie),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_auth_is_checked_before_csrf() {
    let app = TestApp::new().await;

    let response = app
        .send(
            Request::post("/product")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(product_body("Mug", 1.0).to_string()))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
