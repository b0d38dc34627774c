#![allow(dead_code)]

use std::path::PathBuf;

use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use storefront::{
    ServerConfig, auth::IpSource, create_app, db::Database, types::UserRole,
};
use tower::ServiceExt;

pub const PASSWORD: &str = "correct-horse";

/// Fresh per-test upload directory under the system temp dir.
pub fn upload_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("storefront-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("Failed to create upload dir");
    dir
}

pub async fn test_config() -> ServerConfig {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    ServerConfig {
        db,
        access_token_secret: b"test-access-token-secret-0123456789".to_vec(),
        refresh_token_secret: b"test-refresh-token-secret-012345678".to_vec(),
        cookie_secret: b"test-cookie-secret-0123456789abcdef".to_vec(),
        csrf_secret: b"test-csrf-secret-0123456789abcdefgh".to_vec(),
        csrf_cookie_name: "__csrf".to_string(),
        production: false,
        origin_allow: None,
        max_body_size: 10 * 1024,
        max_requests_per_minute: 0,
        ip_source: IpSource::Connection,
        upload_dir: upload_dir(),
    }
}

pub struct TestApp {
    pub router: Router,
    pub db: Database,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(test_config().await)
    }

    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            router: create_app(&config),
            db: config.db.clone(),
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Fetch a CSRF token. Returns the header value and the cookie pair to send back.
    pub async fn csrf(&self) -> Csrf {
        let response = self
            .send(Request::get("/csrf-token").body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = cookie_pair(&response, "__csrf").expect("CSRF cookie missing");
        let json = body_json(response).await;
        Csrf {
            token: json["csrfToken"].as_str().unwrap().to_string(),
            cookie,
        }
    }

    /// Register a user and return their access token and refresh cookie pair.
    pub async fn register(&self, name: &str, email: &str) -> Session {
        let response = self
            .send(json_request(
                "POST",
                "/auth/register",
                serde_json::json!({ "name": name, "email": email, "password": PASSWORD }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        session_from(response).await
    }

    pub async fn login(&self, email: &str) -> Session {
        let response = self
            .send(json_request(
                "POST",
                "/auth/login",
                serde_json::json!({ "email": email, "password": PASSWORD }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        session_from(response).await
    }

    /// Register a user, promote them to admin, and log in again so the token carries the role.
    pub async fn admin(&self, email: &str) -> Session {
        self.register("Admin", email).await;
        let user = self
            .db
            .users()
            .get_by_email(email)
            .await
            .unwrap()
            .expect("user missing");
        self.db
            .users()
            .set_role(user.id, UserRole::Admin)
            .await
            .unwrap();
        self.login(email).await
    }
}

pub struct Csrf {
    pub token: String,
    pub cookie: String,
}

impl Csrf {
    /// Attach the header and cookie to a request builder.
    pub fn apply(&self, builder: axum::http::request::Builder) -> axum::http::request::Builder {
        builder
            .header("x-csrf-token", &self.token)
            .header(header::COOKIE, &self.cookie)
    }
}

pub struct Session {
    pub user_id: String,
    pub access_token: String,
    pub refresh_cookie: String,
}

impl Session {
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

async fn session_from(response: Response<Body>) -> Session {
    let refresh_cookie = cookie_pair(&response, "refreshToken").expect("refresh cookie missing");
    let json = body_json(response).await;
    Session {
        user_id: json["user"]["id"].as_str().unwrap().to_string(),
        access_token: json["accessToken"].as_str().unwrap().to_string(),
        refresh_cookie,
    }
}

/// `name=value` of the named cookie from the response's Set-Cookie headers.
pub fn cookie_pair(response: &Response<Body>, name: &str) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .find(|pair| pair.starts_with(&format!("{}=", name)))
        .map(str::to_string)
}

pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

pub fn product_body(title: &str, price: f64) -> serde_json::Value {
    serde_json::json!({
        "title": title,
        "image": { "fileName": "/images/test.png", "originalName": "test.png" },
        "category": "kitchen",
        "description": "A test product",
        "price": price
    })
}
