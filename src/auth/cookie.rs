//! Cookie parsing, signing and `Set-Cookie` formatting.

use axum::http::header;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Cookie name for the refresh token (long-lived, 7 days).
pub const REFRESH_COOKIE_NAME: &str = "refreshToken";

type HmacSha256 = Hmac<Sha256>;

/// Extract a cookie value from the Cookie header.
pub fn get_cookie<'a>(headers: &'a axum::http::HeaderMap, name: &str) -> Option<&'a str> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    for part in cookie_header.split(';') {
        let part = part.trim();
        if let Some((key, value)) = part.split_once('=') {
            if key.trim() == name {
                return Some(value.trim());
            }
        }
    }
    None
}

/// Signs cookie values as `<value>.<base64url HMAC-SHA256>`.
#[derive(Clone)]
pub struct CookieSigner {
    mac: HmacSha256,
}

impl CookieSigner {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            mac: HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any length"),
        }
    }

    fn signature(&self, value: &str) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(value.as_bytes());
        mac
    }

    pub fn sign(&self, value: &str) -> String {
        let tag = self.signature(value).finalize().into_bytes();
        format!("{}.{}", value, URL_SAFE_NO_PAD.encode(tag))
    }

    /// Return the original value if the signature is valid.
    /// The comparison is constant-time.
    pub fn unsign<'a>(&self, signed: &'a str) -> Option<&'a str> {
        let (value, tag) = signed.rsplit_once('.')?;
        let tag = URL_SAFE_NO_PAD.decode(tag).ok()?;
        self.signature(value).verify_slice(&tag).ok()?;
        Some(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
}

impl SameSite {
    fn as_str(&self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
        }
    }
}

/// Attributes applied to every httpOnly cookie the server sets.
#[derive(Debug, Clone, Copy)]
pub struct CookiePolicy {
    pub secure: bool,
    pub same_site: SameSite,
}

impl CookiePolicy {
    /// Production cookies are Secure and SameSite=Strict.
    pub fn for_environment(production: bool) -> Self {
        Self {
            secure: production,
            same_site: if production {
                SameSite::Strict
            } else {
                SameSite::Lax
            },
        }
    }

    pub fn with_same_site(self, same_site: SameSite) -> Self {
        Self { same_site, ..self }
    }

    pub fn set(&self, name: &str, value: &str, max_age_secs: u64) -> String {
        let secure = if self.secure { "; Secure" } else { "" };
        format!(
            "{}={}; HttpOnly; SameSite={}; Path=/; Max-Age={}{}",
            name,
            value,
            self.same_site.as_str(),
            max_age_secs,
            secure
        )
    }

    pub fn clear(&self, name: &str) -> String {
        self.set(name, "", 0)
    }
}
