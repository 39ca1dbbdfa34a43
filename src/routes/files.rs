/**
 * File Routes
 * Cover-image storage for posts (auth required)
 *
 * Images land on local disk under the storage directory and are served
 * statically from /uploads. The returned url is what goes into a post's
 * `image` field.
 */
use axum::{
    extract::{Multipart, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::path::PathBuf;
use uuid::Uuid;

use crate::routes::{verify_auth, ErrorResponse};

const MAX_IMAGE_SIZE: usize = 5 * 1024 * 1024;
const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];

fn storage_dir() -> PathBuf {
    std::env::var("UPLOAD_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("uploads/blog"))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResponse {
    pub success: bool,
    pub url: String,
    pub filename: String,
    pub size: usize,
    pub mime_type: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    pub filename: String,
    pub url: String,
    pub size: u64,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct FileListResponse {
    pub success: bool,
    pub data: Vec<StoredFile>,
}

/// Sniff the image type from leading bytes so a renamed non-image is caught
/// even when its extension looks fine.
fn sniff_image_type(bytes: &[u8]) -> Option<&'static str> {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [0x89, 0x50, 0x4E, 0x47, ..] => Some("image/png"),
        [0x47, 0x49, 0x46, 0x38, ..] => Some("image/gif"),
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Some("image/webp"),
        _ => None,
    }
}

fn extension_for(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "bin",
    }
}

/// Stored filenames are server-generated UUIDs, so anything with path
/// syntax in it was never handed out by us.
fn is_safe_filename(filename: &str) -> bool {
    !filename.is_empty()
        && !filename.contains("..")
        && !filename.contains('/')
        && !filename.contains('\\')
        && !filename.contains('\0')
}

fn bad_request(error: &str) -> (StatusCode, Json<ErrorResponse>) {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(error)))
}

/// POST /api/v1/files - Store a cover image, returns its public url
pub async fn upload_file(headers: HeaderMap, mut multipart: Multipart) -> impl IntoResponse {
    if let Err(err_response) = verify_auth(&headers) {
        return err_response.into_response();
    }

    let dir = storage_dir();
    if let Err(e) = tokio::fs::create_dir_all(&dir).await {
        tracing::error!("Failed to create storage directory: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new("Error storing file")),
        )
            .into_response();
    }

    let field = match multipart.next_field().await {
        Ok(Some(field)) => field,
        Ok(None) => return bad_request("File is required").into_response(),
        Err(e) => {
            tracing::error!("Multipart error: {}", e);
            return bad_request("Invalid multipart data").into_response();
        }
    };

    let original_ext = field
        .file_name()
        .unwrap_or("")
        .rsplit('.')
        .next()
        .unwrap_or("")
        .to_lowercase();
    if !ALLOWED_EXTENSIONS.contains(&original_ext.as_str()) {
        return bad_request("Unsupported file type. Allowed: JPEG, PNG, WebP, GIF")
            .into_response();
    }

    let bytes = match field.bytes().await {
        Ok(b) => b,
        Err(e) => {
            tracing::error!("Failed to read upload bytes: {}", e);
            return bad_request("Failed to read file data").into_response();
        }
    };

    if bytes.is_empty() {
        return bad_request("Empty file").into_response();
    }
    if bytes.len() > MAX_IMAGE_SIZE {
        return bad_request("File too large. Maximum size is 5MB").into_response();
    }

    let mime_type = match sniff_image_type(&bytes) {
        Some(mime) => mime,
        None => {
            return bad_request("File content does not match an allowed image type")
                .into_response();
        }
    };

    let filename = format!("{}.{}", Uuid::new_v4(), extension_for(mime_type));
    if let Err(e) = tokio::fs::write(dir.join(&filename), &bytes).await {
        tracing::error!("Failed to write file {}: {}", filename, e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new("Error storing file")),
        )
            .into_response();
    }

    tracing::info!("Stored image {} ({} bytes)", filename, bytes.len());

    (
        StatusCode::CREATED,
        Json(FileResponse {
            success: true,
            url: format!("/uploads/blog/{}", filename),
            filename,
            size: bytes.len(),
            mime_type: mime_type.to_string(),
        }),
    )
        .into_response()
}

/// GET /api/v1/files - List stored images, newest first
pub async fn list_files(headers: HeaderMap) -> impl IntoResponse {
    if let Err(err_response) = verify_auth(&headers) {
        return err_response.into_response();
    }

    let dir = storage_dir();
    if !dir.exists() {
        return (
            StatusCode::OK,
            Json(FileListResponse {
                success: true,
                data: vec![],
            }),
        )
            .into_response();
    }

    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::error!("Failed to read storage directory: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Error listing files")),
            )
                .into_response();
        }
    };

    let mut files = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let filename = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => continue,
        };
        let ext = filename.rsplit('.').next().unwrap_or("").to_lowercase();
        if !ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
            continue;
        }
        let metadata = match entry.metadata().await {
            Ok(m) => m,
            Err(_) => continue,
        };
        let created_at = metadata
            .created()
            .or_else(|_| metadata.modified())
            .map(|t| {
                let dt: chrono::DateTime<chrono::Utc> = t.into();
                dt.to_rfc3339()
            })
            .unwrap_or_default();

        files.push(StoredFile {
            url: format!("/uploads/blog/{}", filename),
            filename,
            size: metadata.len(),
            created_at,
        });
    }

    files.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    (
        StatusCode::OK,
        Json(FileListResponse {
            success: true,
            data: files,
        }),
    )
        .into_response()
}

/// DELETE /api/v1/files/{filename} - Remove a stored image
pub async fn delete_file(headers: HeaderMap, Path(filename): Path<String>) -> impl IntoResponse {
    if let Err(err_response) = verify_auth(&headers) {
        return err_response.into_response();
    }

    if !is_safe_filename(&filename) {
        return bad_request("Invalid filename").into_response();
    }

    let path = storage_dir().join(&filename);
    if !path.exists() {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("File not found")),
        )
            .into_response();
    }

    if let Err(e) = tokio::fs::remove_file(&path).await {
        tracing::error!("Failed to delete file {}: {}", filename, e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new("Error deleting file")),
        )
            .into_response();
    }

    tracing::info!("Deleted image {}", filename);
    StatusCode::NO_CONTENT.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::Request,
        routing::{delete, get},
        Router,
    };
    use tower::ServiceExt;

    #[test]
    fn test_sniff_image_type_known_formats() {
        assert_eq!(sniff_image_type(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("image/jpeg"));
        assert_eq!(
            sniff_image_type(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A]),
            Some("image/png")
        );
        assert_eq!(sniff_image_type(&[0x47, 0x49, 0x46, 0x38, 0x39]), Some("image/gif"));
        assert_eq!(
            sniff_image_type(&[
                0x52, 0x49, 0x46, 0x46, 0x00, 0x00, 0x00, 0x00, 0x57, 0x45, 0x42, 0x50
            ]),
            Some("image/webp")
        );
    }

    #[test]
    fn test_sniff_image_type_rejects_other_content() {
        assert_eq!(sniff_image_type(b"<svg></svg>"), None);
        assert_eq!(sniff_image_type(b""), None);
        assert_eq!(sniff_image_type(&[0xFF, 0xD8]), None);
    }

    #[test]
    fn test_is_safe_filename_rejects_traversal() {
        assert!(is_safe_filename("abc-123.png"));
        assert!(!is_safe_filename("../etc/passwd"));
        assert!(!is_safe_filename("a/b.png"));
        assert!(!is_safe_filename("a\\b.png"));
        assert!(!is_safe_filename(""));
    }

    #[tokio::test]
    async fn test_list_files_requires_auth() {
        let app = Router::new().route("/api/v1/files", get(list_files));
        let res = app
            .oneshot(
                Request::get("/api/v1/files")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_delete_file_requires_auth() {
        let app = Router::new().route("/api/v1/files/{filename}", delete(delete_file));
        let res = app
            .oneshot(
                Request::delete("/api/v1/files/some.png")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
