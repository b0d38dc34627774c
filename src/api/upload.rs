//! Image upload endpoint.
//!
//! - POST `/` - Store a single image from the multipart field `file` (auth)

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    middleware,
    routing::post,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use super::error::ApiError;
use crate::auth::{Auth, require_auth};
use crate::jwt::JwtConfig;
use crate::types::UploadedFile;

pub const MIN_FILE_SIZE: usize = 2 * 1024;
pub const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;
pub const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/png",
    "image/jpg",
    "image/jpeg",
    "image/gif",
    "image/svg+xml",
];

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Where uploads are written and the public path they are served under.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub dir: PathBuf,
    pub public_prefix: String,
}

impl UploadConfig {
    pub fn new(dir: impl Into<PathBuf>, public_prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            public_prefix: public_prefix.into().trim_end_matches('/').to_string(),
        }
    }

    fn public_path(&self, stored_name: &str) -> String {
        format!("{}/{}", self.public_prefix, stored_name)
    }

    /// Map a public path produced by this config back to a file in `dir`.
    fn local_path(&self, public_path: &str) -> Option<PathBuf> {
        let name = public_path
            .strip_prefix(&self.public_prefix)?
            .strip_prefix('/')?;
        let valid = !name.is_empty()
            && !name.contains(['/', '\\'])
            && name != "."
            && name != "..";
        valid.then(|| self.dir.join(name))
    }

    /// Best-effort removal of a previously uploaded file.
    pub async fn remove(&self, public_path: &str) {
        let Some(path) = self.local_path(public_path) else {
            return;
        };
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "Failed to remove uploaded file");
            }
        }
    }
}

#[derive(Clone)]
pub struct UploadState {
    pub config: Arc<UploadConfig>,
}

pub fn router(state: UploadState, jwt: Arc<JwtConfig>) -> Router {
    Router::new()
        .route("/", post(upload_file))
        .route_layer(middleware::from_fn_with_state(jwt, require_auth))
        .layer(DefaultBodyLimit::max(MAX_FILE_SIZE + MULTIPART_OVERHEAD))
        .with_state(state)
}

/// Keep a short alphanumeric extension from the client's file name.
fn sanitized_extension(original_name: &str) -> String {
    Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

fn check_size(size: usize) -> Result<(), ApiError> {
    if size < MIN_FILE_SIZE {
        return Err(ApiError::bad_request(
            "File is too small. The minimum file size is 2 KB.",
        ));
    }
    if size > MAX_FILE_SIZE {
        return Err(ApiError::bad_request(
            "File is too large. The maximum file size is 10 MB.",
        ));
    }
    Ok(())
}

async fn upload_file(
    State(state): State<UploadState>,
    auth: Auth,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadedFile>), ApiError> {
    let too_large = |e: axum::extract::multipart::MultipartError| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::bad_request("File is too large. The maximum file size is 10 MB.")
        } else {
            ApiError::bad_request("Invalid multipart data")
        }
    };

    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(too_large)? {
        if field.name() != Some("file") {
            continue;
        }
        if upload.is_some() {
            return Err(ApiError::bad_request("Only one file can be uploaded"));
        }

        let content_type = field.content_type().unwrap_or("").to_string();
        if !ALLOWED_MIME_TYPES.contains(&content_type.as_str()) {
            return Err(ApiError::bad_request("File type is not allowed"));
        }
        let original_name = field.file_name().unwrap_or("").to_string();
        let data = field.bytes().await.map_err(too_large)?;
        upload = Some((original_name, data));
    }

    let (original_name, data) =
        upload.ok_or_else(|| ApiError::bad_request("File was not uploaded"))?;
    check_size(data.len())?;

    let stored_name = format!(
        "{}{}",
        uuid::Uuid::new_v4(),
        sanitized_extension(&original_name)
    );
    let path = state.config.dir.join(&stored_name);

    tokio::fs::create_dir_all(&state.config.dir)
        .await
        .map_err(|e| ApiError::internal_error("Failed to prepare upload directory", e))?;
    tokio::fs::write(&path, &data)
        .await
        .map_err(|e| ApiError::internal_error("Failed to store file", e))?;

    info!(
        user = %auth.principal().id,
        file = %stored_name,
        size = data.len(),
        "File uploaded"
    );

    Ok((
        StatusCode::CREATED,
        Json(UploadedFile {
            file_name: state.config.public_path(&stored_name),
            original_name,
        }),
    ))
}
