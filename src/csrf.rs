//! Double-submit CSRF protection.
//!
//! `GET /csrf-token` hands out a random token in the response body and the
//! same token, HMAC-signed, in an httpOnly cookie. Guarded routes require the
//! `x-csrf-token` header to equal the token embedded in a correctly signed
//! cookie.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;

use crate::api::ApiError;
use crate::auth::{CookiePolicy, CookieSigner, SameSite, get_cookie};
use crate::types::CsrfTokenResponse;

pub const CSRF_HEADER_NAME: &str = "x-csrf-token";
pub const DEFAULT_CSRF_COOKIE_NAME: &str = "__csrf";
pub const CSRF_COOKIE_MAX_AGE_SECS: u64 = 60 * 60;

#[derive(Clone)]
pub struct CsrfGuard {
    signer: CookieSigner,
    cookie_name: String,
    policy: CookiePolicy,
}

impl CsrfGuard {
    pub fn new(secret: &[u8], cookie_name: impl Into<String>, production: bool) -> Self {
        Self {
            signer: CookieSigner::new(secret),
            cookie_name: cookie_name.into(),
            policy: CookiePolicy::for_environment(production).with_same_site(SameSite::Strict),
        }
    }

    /// Generate a fresh token and the `Set-Cookie` value carrying its signed form.
    pub fn generate(&self) -> (String, String) {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        let token = URL_SAFE_NO_PAD.encode(bytes);
        let cookie = self.policy.set(
            &self.cookie_name,
            &self.signer.sign(&token),
            CSRF_COOKIE_MAX_AGE_SECS,
        );
        (token, cookie)
    }

    /// Check that the header token matches the signed cookie token.
    pub fn verify(&self, headers: &HeaderMap) -> bool {
        let Some(cookie_token) =
            get_cookie(headers, &self.cookie_name).and_then(|c| self.signer.unsign(c))
        else {
            return false;
        };
        let Some(header_token) = headers
            .get(CSRF_HEADER_NAME)
            .and_then(|v| v.to_str().ok())
        else {
            return false;
        };
        !header_token.is_empty() && header_token == cookie_token
    }
}

/// `GET /csrf-token`
pub async fn issue_csrf_token(State(guard): State<Arc<CsrfGuard>>) -> impl IntoResponse {
    let (csrf_token, cookie) = guard.generate();
    (
        [(header::SET_COOKIE, cookie)],
        Json(CsrfTokenResponse { csrf_token }),
    )
}

/// Middleware rejecting requests whose CSRF header and cookie do not match.
pub async fn csrf_protect(
    State(guard): State<Arc<CsrfGuard>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !guard.verify(request.headers()) {
        tracing::debug!(
            method = %request.method(),
            path = %request.uri().path(),
            "Rejected request with invalid CSRF token"
        );
        return Err(ApiError::forbidden("Invalid CSRF token"));
    }
    Ok(next.run(request).await)
}
