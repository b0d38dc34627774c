//! Access-token guard middleware and role-checking extractors.

use std::marker::PhantomData;
use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::Response,
};

use super::errors::{ApiAuthError, AuthErrorKind};
use super::types::Principal;
use crate::jwt::JwtConfig;
use crate::types::UserRole;

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Middleware guarding protected routes.
///
/// Verifies the bearer token and attaches the decoded [`Principal`] to the
/// request extensions. Requests without a valid token never reach the inner
/// service and never carry a principal.
pub async fn require_auth(
    State(jwt): State<Arc<JwtConfig>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiAuthError> {
    let token = bearer_token(request.headers())
        .ok_or(ApiAuthError::new(AuthErrorKind::NotAuthenticated))?;

    let claims = jwt.validate_access_token(token).map_err(|e| {
        tracing::debug!(error = %e, "Rejected access token");
        ApiAuthError::new(AuthErrorKind::InvalidToken)
    })?;

    request.extensions_mut().insert(Principal::from(claims));
    Ok(next.run(request).await)
}

/// Role requirement checked by the [`Auth`] extractor.
pub trait RoleConstraint {
    fn allows(role: UserRole) -> bool;
}

/// Any authenticated principal.
pub struct AnyRole;

impl RoleConstraint for AnyRole {
    fn allows(_role: UserRole) -> bool {
        true
    }
}

/// Admin principals only.
pub struct AdminOnly;

impl RoleConstraint for AdminOnly {
    fn allows(role: UserRole) -> bool {
        role.satisfies(UserRole::Admin)
    }
}

/// Extractor for the principal attached by [`require_auth`].
///
/// Rejects with 401 when no principal is attached and with 403 when the
/// principal's role does not satisfy `R`. Performs no I/O.
pub struct Auth<R: RoleConstraint = AnyRole>(pub Principal, PhantomData<R>);

impl<R: RoleConstraint> Auth<R> {
    pub fn principal(&self) -> &Principal {
        &self.0
    }
}

impl<S, R> FromRequestParts<S> for Auth<R>
where
    S: Send + Sync,
    R: RoleConstraint,
{
    type Rejection = ApiAuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let principal = parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or(ApiAuthError::new(AuthErrorKind::NotAuthenticated))?;

        if !R::allows(principal.role) {
            return Err(ApiAuthError::new(AuthErrorKind::InsufficientRole));
        }

        Ok(Auth(principal, PhantomData))
    }
}
