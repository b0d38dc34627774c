//! JWT authentication with role-based access control.
//!
//! Dual-token system: short-lived access tokens (10 min, bearer header) and
//! long-lived refresh tokens (7 days, signed httpOnly cookie). Both are
//! stateless; a refresh only reissues the access token.

mod cookie;
mod errors;
mod extractors;
mod ip;
mod types;

pub use cookie::{CookiePolicy, CookieSigner, REFRESH_COOKIE_NAME, SameSite, get_cookie};
pub use errors::{ApiAuthError, AuthErrorKind};
pub use extractors::{AdminOnly, AnyRole, Auth, RoleConstraint, bearer_token, require_auth};
pub use ip::{HasHeadersAndExtensions, IpSource, extract_client_ip};
pub use types::Principal;
