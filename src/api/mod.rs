mod auth;
mod customers;
mod error;
mod orders;
mod products;
mod query;
mod upload;

use axum::Router;
use std::sync::Arc;

use crate::auth::{CookiePolicy, CookieSigner};
use crate::csrf::CsrfGuard;
use crate::db::Database;
use crate::jwt::JwtConfig;

pub use error::{ApiError, ResultExt};
pub use query::{DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT, PageParams};
pub use upload::{ALLOWED_MIME_TYPES, MAX_FILE_SIZE, MIN_FILE_SIZE, UploadConfig};

/// Shared guard state for the per-route auth and CSRF middleware.
#[derive(Clone)]
pub struct Guards {
    pub jwt: Arc<JwtConfig>,
    pub csrf: Arc<CsrfGuard>,
}

/// Everything the resource routers need.
pub struct ApiConfig {
    pub db: Database,
    pub guards: Guards,
    pub cookie_signer: CookieSigner,
    pub cookies: CookiePolicy,
    pub uploads: Arc<UploadConfig>,
}

/// Create the API router.
pub fn create_api_router(config: ApiConfig) -> Router {
    let auth_state = auth::AuthState {
        db: config.db.clone(),
        jwt: config.guards.jwt.clone(),
        signer: config.cookie_signer,
        cookies: config.cookies,
    };

    let products_state = products::ProductsState {
        db: config.db.clone(),
        uploads: config.uploads.clone(),
    };

    let orders_state = orders::OrdersState {
        db: config.db.clone(),
    };

    let customers_state = customers::CustomersState { db: config.db };

    let upload_state = upload::UploadState {
        config: config.uploads,
    };

    Router::new()
        .nest("/auth", auth::router(auth_state))
        .nest("/product", products::router(products_state, &config.guards))
        .nest("/order", orders::router(orders_state, &config.guards))
        .nest(
            "/customers",
            customers::router(customers_state, &config.guards),
        )
        .nest(
            "/upload",
            upload::router(upload_state, config.guards.jwt.clone()),
        )
}
