//! Account and session endpoints.
//!
//! - POST `/register` - Create a user account and start a session
//! - POST `/login` - Verify credentials and start a session
//! - GET `/token` - Exchange the refresh cookie for a new access token
//! - GET `/logout` - Clear the refresh cookie
//! - GET `/user` - Current account (auth)
//! - GET `/user/roles` - Current account roles (auth)

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use std::sync::Arc;
use tracing::{info, warn};

use super::error::{
    ApiError, ResultExt, StoreResultExt, validate_email, validate_length,
};
use crate::auth::{
    Auth, CookiePolicy, CookieSigner, REFRESH_COOKIE_NAME, get_cookie, require_auth,
};
use crate::db::{Database, User};
use crate::jwt::{JwtConfig, REFRESH_TOKEN_DURATION_SECS};
use crate::password::{hash_password, verify_password};
use crate::types::{
    Account, AuthResponse, CurrentUserResponse, LoginRequest, RegisterRequest, SuccessResponse,
    UserRole,
};

const MIN_PASSWORD_LENGTH: usize = 6;
const MAX_PASSWORD_LENGTH: usize = 128;

#[derive(Clone)]
pub struct AuthState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
    pub signer: CookieSigner,
    pub cookies: CookiePolicy,
}

impl AuthState {
    /// Issue both tokens for a user. Returns the response body and the refresh `Set-Cookie`.
    fn start_session(&self, user: &Account) -> Result<(AuthResponse, String), ApiError> {
        let access = self
            .jwt
            .generate_access_token(&user.id, &user.email, user.role)
            .map_err(|e| ApiError::internal_error("Failed to issue access token", e))?;
        let refresh = self
            .jwt
            .generate_refresh_token(&user.id, &user.email, user.role)
            .map_err(|e| ApiError::internal_error("Failed to issue refresh token", e))?;

        let cookie = self.cookies.set(
            REFRESH_COOKIE_NAME,
            &self.signer.sign(&refresh.token),
            REFRESH_TOKEN_DURATION_SECS,
        );
        let body = AuthResponse {
            success: true,
            user: user.clone(),
            access_token: access.token,
        };
        Ok((body, cookie))
    }

    async fn current_user(&self, uuid: &str) -> Result<User, ApiError> {
        self.db
            .users()
            .get_by_uuid(uuid)
            .await
            .db_err("Failed to get user")?
            .ok_or_else(|| ApiError::not_found("User not found"))
    }
}

pub fn router(state: AuthState) -> Router {
    let protected = Router::new()
        .route("/user", get(current_user))
        .route("/user/roles", get(current_user_roles))
        .route_layer(middleware::from_fn_with_state(
            state.jwt.clone(),
            require_auth,
        ));

    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/token", get(refresh_access_token))
        .route("/logout", get(logout))
        .merge(protected)
        .with_state(state)
}

async fn register(
    State(state): State<AuthState>,
    Json(body): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = body.name.trim();
    let email = body.email.trim();
    validate_length("Name", name, 2, 30)?;
    validate_email(email)?;
    validate_length(
        "Password",
        &body.password,
        MIN_PASSWORD_LENGTH,
        MAX_PASSWORD_LENGTH,
    )?;

    let password_hash = hash_password(&body.password)
        .map_err(|e| ApiError::internal_error("Failed to hash password", e))?;
    let uuid = uuid::Uuid::new_v4().to_string();
    state
        .db
        .users()
        .create(&uuid, name, email, &password_hash, UserRole::User)
        .await
        .store_err("Failed to create user", "User with this email already exists")?;

    let account = Account {
        id: uuid,
        name: name.to_string(),
        email: email.to_string(),
        role: UserRole::User,
    };
    let (body, cookie) = state.start_session(&account)?;
    info!(user = %account.id, "User registered");

    Ok((StatusCode::CREATED, [(SET_COOKIE, cookie)], Json(body)))
}

async fn login(
    State(state): State<AuthState>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .users()
        .get_by_email(body.email.trim())
        .await
        .db_err("Failed to get user")?;

    let user = match user {
        Some(user) if verify_password(&body.password, &user.password_hash) => user,
        _ => {
            warn!("Failed login attempt");
            return Err(ApiError::unauthorized("Invalid email or password"));
        }
    };

    let (body, cookie) = state.start_session(&user.account())?;
    info!(user = %user.uuid, "User logged in");

    Ok(([(SET_COOKIE, cookie)], Json(body)))
}

/// Exchange the signed refresh cookie for a new access token.
/// The refresh token itself is not rotated.
async fn refresh_access_token(
    State(state): State<AuthState>,
    headers: HeaderMap,
) -> Result<Json<AuthResponse>, ApiError> {
    let signed = get_cookie(&headers, REFRESH_COOKIE_NAME)
        .ok_or_else(|| ApiError::unauthorized("No refresh token"))?;
    let token = state
        .signer
        .unsign(signed)
        .ok_or_else(|| ApiError::unauthorized("Invalid refresh token"))?;

    let claims = state
        .jwt
        .validate_refresh_token(token)
        .map_err(|_| ApiError::unauthorized("Invalid or expired refresh token"))?;

    let user = state
        .db
        .users()
        .get_by_uuid(&claims.sub)
        .await
        .db_err("Failed to get user")?
        .ok_or_else(|| ApiError::unauthorized("User not found"))?;

    let account = user.account();
    let access = state
        .jwt
        .generate_access_token(&account.id, &account.email, account.role)
        .map_err(|e| ApiError::internal_error("Failed to issue access token", e))?;

    Ok(Json(AuthResponse {
        success: true,
        user: account,
        access_token: access.token,
    }))
}

async fn logout(State(state): State<AuthState>) -> impl IntoResponse {
    (
        [(SET_COOKIE, state.cookies.clear(REFRESH_COOKIE_NAME))],
        Json(SuccessResponse { success: true }),
    )
}

async fn current_user(
    State(state): State<AuthState>,
    auth: Auth,
) -> Result<Json<CurrentUserResponse>, ApiError> {
    let user = state.current_user(&auth.principal().id).await?;
    Ok(Json(CurrentUserResponse {
        success: true,
        user: user.account(),
    }))
}

async fn current_user_roles(
    State(state): State<AuthState>,
    auth: Auth,
) -> Result<Json<Vec<UserRole>>, ApiError> {
    let user = state.current_user(&auth.principal().id).await?;
    Ok(Json(vec![user.role]))
}
