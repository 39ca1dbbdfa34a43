/**
 * Routes Module
 * API route handlers
 */
use axum::{
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};

pub mod analytics;
pub mod auth;
pub mod blog;
pub mod category;
pub mod comment;
pub mod files;
pub mod health;
pub mod interactions;
pub mod users;

/// Error response shared by all route handlers
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: None,
        }
    }

    pub fn with_message(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: Some(message.into()),
        }
    }
}

/// Success response (for delete and other ack-only endpoints)
#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Extract and verify the bearer token on admin endpoints.
pub fn verify_auth(headers: &HeaderMap) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match token {
        Some(t) => match auth::verify_access_token(t) {
            Ok(_) => Ok(()),
            Err(_) => Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new("Invalid or expired token")),
            )),
        },
        None => Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new("Authorization required")),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_auth_rejects_missing_header() {
        let headers = HeaderMap::new();
        assert!(verify_auth(&headers).is_err());
    }

    #[test]
    fn test_verify_auth_rejects_garbage_token() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer not.a.jwt".parse().unwrap());
        let err = verify_auth(&headers).err().unwrap();
        assert_eq!(err.0, StatusCode::UNAUTHORIZED);
    }
}
