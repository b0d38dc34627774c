//! JWT token generation and validation.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::UserRole;

/// Token type for distinguishing access vs refresh tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Short-lived bearer token, never stored server-side
    Access,
    /// Long-lived token carried in the signed refresh cookie
    Refresh,
}

/// JWT claims shared by both token types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user UUID)
    pub sub: String,
    pub email: String,
    pub role: UserRole,
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Access token duration: 10 minutes
pub const ACCESS_TOKEN_DURATION_SECS: u64 = 10 * 60;

/// Refresh token duration: 7 days
pub const REFRESH_TOKEN_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// Configuration for JWT operations. Access and refresh tokens use separate secrets.
pub struct JwtConfig {
    access: KeyPair,
    refresh: KeyPair,
}

/// A freshly signed token.
#[derive(Debug, Clone)]
pub struct TokenResult {
    pub token: String,
    /// Token duration in seconds
    pub duration: u64,
}

impl JwtConfig {
    pub fn new(access_secret: &[u8], refresh_secret: &[u8]) -> Self {
        Self {
            access: KeyPair::new(access_secret),
            refresh: KeyPair::new(refresh_secret),
        }
    }

    pub fn generate_access_token(
        &self,
        user_uuid: &str,
        email: &str,
        role: UserRole,
    ) -> Result<TokenResult, JwtError> {
        self.generate(
            &self.access,
            user_uuid,
            email,
            role,
            TokenType::Access,
            ACCESS_TOKEN_DURATION_SECS,
        )
    }

    pub fn generate_refresh_token(
        &self,
        user_uuid: &str,
        email: &str,
        role: UserRole,
    ) -> Result<TokenResult, JwtError> {
        self.generate(
            &self.refresh,
            user_uuid,
            email,
            role,
            TokenType::Refresh,
            REFRESH_TOKEN_DURATION_SECS,
        )
    }

    fn generate(
        &self,
        keys: &KeyPair,
        user_uuid: &str,
        email: &str,
        role: UserRole,
        token_type: TokenType,
        duration: u64,
    ) -> Result<TokenResult, JwtError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| JwtError::TimeError)?
            .as_secs();

        let claims = Claims {
            sub: user_uuid.to_string(),
            email: email.to_string(),
            role,
            token_type,
            iat: now,
            exp: now + duration,
        };

        let token = jsonwebtoken::encode(&Header::default(), &claims, &keys.encoding)
            .map_err(JwtError::Encoding)?;

        Ok(TokenResult { token, duration })
    }

    /// Validate and decode an access token.
    pub fn validate_access_token(&self, token: &str) -> Result<Claims, JwtError> {
        Self::validate(&self.access, token, TokenType::Access)
    }

    /// Validate and decode a refresh token.
    pub fn validate_refresh_token(&self, token: &str) -> Result<Claims, JwtError> {
        Self::validate(&self.refresh, token, TokenType::Refresh)
    }

    fn validate(keys: &KeyPair, token: &str, expected: TokenType) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let token_data = jsonwebtoken::decode::<Claims>(token, &keys.decoding, &validation)
            .map_err(JwtError::Decoding)?;

        if token_data.claims.token_type != expected {
            return Err(JwtError::WrongTokenType);
        }

        Ok(token_data.claims)
    }
}

/// Errors that can occur during JWT operations.
#[derive(Debug)]
pub enum JwtError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// Error decoding the token
    Decoding(jsonwebtoken::errors::Error),
    /// System time error
    TimeError,
    /// Wrong token type (e.g., using refresh token as access token)
    WrongTokenType,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::Decoding(e) => write!(f, "Failed to decode token: {}", e),
            JwtError::TimeError => write!(f, "System time error"),
            JwtError::WrongTokenType => write!(f, "Wrong token type"),
        }
    }
}

impl std::error::Error for JwtError {}
