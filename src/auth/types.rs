//! Authentication user types.

use crate::jwt::Claims;
use crate::types::UserRole;

/// Identity resolved from a verified access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// User UUID
    pub id: String,
    pub email: String,
    pub role: UserRole,
}

impl From<Claims> for Principal {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            email: claims.email,
            role: claims.role,
        }
    }
}
