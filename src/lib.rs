pub mod api;
pub mod auth;
pub mod cli;
pub mod client;
pub mod csrf;
pub mod db;
pub mod jwt;
pub mod password;
pub mod rate_limit;
pub mod types;

use api::{ApiConfig, Guards, UploadConfig, create_api_router};
use auth::{CookiePolicy, CookieSigner, IpSource};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderName, HeaderValue, Method, header},
    middleware,
    routing::get,
};
use csrf::{CSRF_HEADER_NAME, CsrfGuard, issue_csrf_token};
use db::Database;
use jwt::JwtConfig;
use rate_limit::{RateLimitConfig, rate_limit};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Public path prefix of uploaded files.
pub const UPLOAD_PUBLIC_PREFIX: &str = "/images";

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Secret for signing access tokens
    pub access_token_secret: Vec<u8>,
    /// Secret for signing refresh tokens
    pub refresh_token_secret: Vec<u8>,
    /// Secret for signing the refresh cookie
    pub cookie_secret: Vec<u8>,
    /// Secret for signing the CSRF cookie
    pub csrf_secret: Vec<u8>,
    pub csrf_cookie_name: String,
    /// Secure cookies and SameSite=Strict for the refresh cookie
    pub production: bool,
    /// Single origin allowed to make credentialed cross-origin requests
    pub origin_allow: Option<HeaderValue>,
    /// Maximum request body size in bytes (uploads have their own limit)
    pub max_body_size: usize,
    /// Per-IP request quota; 0 disables rate limiting
    pub max_requests_per_minute: u32,
    pub ip_source: IpSource,
    pub upload_dir: PathBuf,
}

fn cors_layer(origin: HeaderValue) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(CSRF_HEADER_NAME),
        ])
}

/// Create the application router with the given configuration.
/// Must run inside a Tokio runtime when rate limiting is enabled.
pub fn create_app(config: &ServerConfig) -> Router {
    let jwt = Arc::new(JwtConfig::new(
        &config.access_token_secret,
        &config.refresh_token_secret,
    ));
    let csrf = Arc::new(CsrfGuard::new(
        &config.csrf_secret,
        config.csrf_cookie_name.clone(),
        config.production,
    ));

    let api_router = create_api_router(ApiConfig {
        db: config.db.clone(),
        guards: Guards {
            jwt,
            csrf: csrf.clone(),
        },
        cookie_signer: CookieSigner::new(&config.cookie_secret),
        cookies: CookiePolicy::for_environment(config.production),
        uploads: Arc::new(UploadConfig::new(
            config.upload_dir.clone(),
            UPLOAD_PUBLIC_PREFIX,
        )),
    });

    let mut app = Router::new()
        .route("/csrf-token", get(issue_csrf_token).with_state(csrf))
        .merge(api_router)
        .layer(DefaultBodyLimit::max(config.max_body_size));

    if let Some(limits) =
        RateLimitConfig::per_minute(config.max_requests_per_minute, config.ip_source)
    {
        limits.spawn_pruning(rate_limit::PRUNE_INTERVAL);
        app = app.layer(middleware::from_fn_with_state(Arc::new(limits), rate_limit));
    }

    if let Some(origin) = config.origin_allow.clone() {
        app = app.layer(cors_layer(origin));
    }

    app.layer(TraceLayer::new_for_http())
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
