//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::auth::IpSource;
use crate::csrf::DEFAULT_CSRF_COOKIE_NAME;
use crate::db::{Database, StoreError};
use crate::password::hash_password;
use crate::types::UserRole;
use axum::http::HeaderValue;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use clap::Parser;
use rand::RngCore;
use std::path::PathBuf;
use tracing::{error, info};
use url::Url;
use uuid::Uuid;

const MIN_SECRET_LENGTH: usize = 32;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "storefront",
    about = "Storefront API: products, orders, customers and uploads"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "3000")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "DB_PATH", default_value = "storefront.db")]
    pub database: String,

    /// Path to file containing the access token secret. Prefer AUTH_ACCESS_TOKEN_SECRET
    #[arg(long)]
    pub access_token_secret_file: Option<String>,

    /// Path to file containing the refresh token secret. Prefer AUTH_REFRESH_TOKEN_SECRET
    #[arg(long)]
    pub refresh_token_secret_file: Option<String>,

    /// Path to file containing the cookie signing secret. Prefer COOKIES_SECRET
    #[arg(long)]
    pub cookie_secret_file: Option<String>,

    /// Path to file containing the CSRF secret. Prefer CSRF_SECRET
    #[arg(long)]
    pub csrf_secret_file: Option<String>,

    /// Name of the CSRF cookie
    #[arg(long, env = "CSRF_COOKIE_NAME", default_value = DEFAULT_CSRF_COOKIE_NAME)]
    pub csrf_cookie_name: String,

    /// Origin allowed to make credentialed cross-origin requests
    #[arg(long, env = "ORIGIN_ALLOW")]
    pub origin_allow: Option<String>,

    /// Production mode: Secure cookies and SameSite=Strict
    #[arg(long, env = "PRODUCTION")]
    pub production: bool,

    /// Maximum JSON body size in bytes
    #[arg(long, env = "MAX_BODY_SIZE", default_value = "10240")]
    pub max_body_size: usize,

    /// Requests allowed per client IP per minute (0 disables the limiter)
    #[arg(long, env = "MAX_REQUEST_PER_MINUTE", default_value = "100")]
    pub max_requests_per_minute: u32,

    /// Where to read the client IP from for rate limiting
    #[arg(long, env = "IP_SOURCE", value_enum, default_value = "connection")]
    pub ip_source: IpSource,

    /// Directory uploaded images are written to
    #[arg(long, env = "UPLOAD_DIR", default_value = "public/images")]
    pub upload_dir: PathBuf,

    /// Create (or promote) an admin account with this email on startup
    #[arg(long, value_name = "EMAIL")]
    pub create_admin: Option<String>,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load a secret from an environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_secret(env_var: &str, secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var(env_var) {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var(env_var) };
        secret
    } else if let Some(path) = secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read secret file");
                return None;
            }
        }
    } else {
        error!(
            variable = env_var,
            "Secret is required. Set the environment variable (recommended) or pass the secret file option"
        );
        return None;
    };

    if secret.len() < MIN_SECRET_LENGTH {
        error!(
            variable = env_var,
            "Secret is shorter than {} characters. Use a longer secret", MIN_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// All signing secrets, loaded at startup.
pub struct Secrets {
    pub access_token: String,
    pub refresh_token: String,
    pub cookie: String,
    pub csrf: String,
}

/// Load every secret, logging each one that is missing or too short.
pub fn load_secrets(args: &Args) -> Option<Secrets> {
    let access_token = load_secret(
        "AUTH_ACCESS_TOKEN_SECRET",
        args.access_token_secret_file.as_deref(),
    );
    let refresh_token = load_secret(
        "AUTH_REFRESH_TOKEN_SECRET",
        args.refresh_token_secret_file.as_deref(),
    );
    let cookie = load_secret("COOKIES_SECRET", args.cookie_secret_file.as_deref());
    let csrf = load_secret("CSRF_SECRET", args.csrf_secret_file.as_deref());

    Some(Secrets {
        access_token: access_token?,
        refresh_token: refresh_token?,
        cookie: cookie?,
        csrf: csrf?,
    })
}

/// Parse and validate the allowed CORS origin.
/// Returns None and logs an error if validation fails.
pub fn validate_origin(origin: &str) -> Option<HeaderValue> {
    let url = match Url::parse(origin) {
        Ok(url) => url,
        Err(e) => {
            error!(origin = %origin, error = %e, "Invalid origin URL");
            return None;
        }
    };

    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        error!(origin = %origin, "Origin must be an http(s) URL with a host");
        return None;
    }

    let origin = url.origin().ascii_serialization();
    match HeaderValue::from_str(&origin) {
        Ok(value) => Some(value),
        Err(e) => {
            error!(origin = %origin, error = %e, "Origin is not a valid header value");
            None
        }
    }
}

fn generate_password() -> String {
    let mut bytes = [0u8; 18];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Handle the --create-admin flag: promote an existing account or create a new
/// admin with a random password, printed once.
pub async fn handle_create_admin(db: &Database, email: &str) -> Result<(), String> {
    let email = email.trim();
    match db.users().get_by_email(email).await {
        Ok(Some(existing)) => {
            if existing.role == UserRole::Admin {
                info!(email = %existing.email, "Admin already exists");
                return Ok(());
            }
            db.users()
                .set_role(existing.id, UserRole::Admin)
                .await
                .map_err(|e| format!("Failed to promote user: {}", e))?;
            println!();
            println!("User promoted to admin: {}", existing.email);
            println!();
            Ok(())
        }
        Ok(None) => {
            let password = generate_password();
            let hash =
                hash_password(&password).map_err(|e| format!("Failed to hash password: {}", e))?;
            let uuid = Uuid::new_v4().to_string();

            match db
                .users()
                .create(&uuid, "Administrator", email, &hash, UserRole::Admin)
                .await
            {
                Ok(_) => {
                    println!();
                    println!("Admin user created: {}", email);
                    println!("Password: {}", password);
                    println!();
                    Ok(())
                }
                Err(StoreError::Duplicate) => Err(format!("User {} already exists", email)),
                Err(e) => Err(format!("Failed to create admin user: {}", e)),
            }
        }
        Err(e) => Err(format!("Failed to check for existing user: {}", e)),
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(
    args: &Args,
    db: Database,
    secrets: Secrets,
    origin_allow: Option<HeaderValue>,
) -> ServerConfig {
    ServerConfig {
        db,
        access_token_secret: secrets.access_token.into_bytes(),
        refresh_token_secret: secrets.refresh_token.into_bytes(),
        cookie_secret: secrets.cookie.into_bytes(),
        csrf_secret: secrets.csrf.into_bytes(),
        csrf_cookie_name: args.csrf_cookie_name.clone(),
        production: args.production,
        origin_allow,
        max_body_size: args.max_body_size,
        max_requests_per_minute: args.max_requests_per_minute,
        ip_source: args.ip_source,
        upload_dir: args.upload_dir.clone(),
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
