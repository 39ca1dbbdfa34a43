/**
 * User Admin Routes
 * List, inspect, update and remove author accounts (auth required)
 */
use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use bcrypt::{hash, DEFAULT_COST};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::{self, models::User};
use crate::routes::{verify_auth, ErrorResponse, SuccessResponse};

/// Request body for PATCH /api/v1/user/:id
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub image: Option<String>,
    /// When present, re-hashed before storage
    pub password: Option<String>,
}

fn db_unavailable() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorResponse::new("Database not available")),
    )
}

/// GET /api/v1/user - List users (auth required; hashes never serialized)
pub async fn list_users(headers: HeaderMap) -> impl IntoResponse {
    if let Err(err_response) = verify_auth(&headers) {
        return err_response.into_response();
    }

    let pool = match db::get_pool() {
        Some(p) => p,
        None => return db_unavailable().into_response(),
    };

    match sqlx::query_as::<_, User>(
        r#"
        SELECT id, name, email, password_hash, image, created_at
        FROM users
        ORDER BY created_at DESC
        "#,
    )
    .fetch_all(pool.as_ref())
    .await
    {
        Ok(users) => (StatusCode::OK, Json(users)).into_response(),
        Err(e) => {
            tracing::error!("Database error listing users: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Database error")),
            )
                .into_response()
        }
    }
}

/// GET /api/v1/user/:id - Get a user (auth required)
pub async fn get_user(headers: HeaderMap, Path(id): Path<Uuid>) -> impl IntoResponse {
    if let Err(err_response) = verify_auth(&headers) {
        return err_response.into_response();
    }

    let pool = match db::get_pool() {
        Some(p) => p,
        None => return db_unavailable().into_response(),
    };

    match sqlx::query_as::<_, User>(
        r#"
        SELECT id, name, email, password_hash, image, created_at
        FROM users
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool.as_ref())
    .await
    {
        Ok(Some(user)) => (StatusCode::OK, Json(user)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("User not found")),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Database error fetching user: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Database error")),
            )
                .into_response()
        }
    }
}

/// PATCH /api/v1/user/:id - Update profile fields (auth required)
pub async fn update_user(
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> impl IntoResponse {
    if let Err(err_response) = verify_auth(&headers) {
        return err_response.into_response();
    }

    let pool = match db::get_pool() {
        Some(p) => p,
        None => return db_unavailable().into_response(),
    };

    let existing = match sqlx::query_as::<_, User>(
        r#"
        SELECT id, name, email, password_hash, image, created_at
        FROM users
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool.as_ref())
    .await
    {
        Ok(Some(u)) => u,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new("User not found")),
            )
                .into_response();
        }
        Err(e) => {
            tracing::error!("Database error fetching user: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Database error")),
            )
                .into_response();
        }
    };

    let password_hash = match payload.password {
        Some(password) => {
            if password.len() < 8 {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ErrorResponse::new(
                        "Password must be at least 8 characters long",
                    )),
                )
                    .into_response();
            }
            // bcrypt off the executor, same as the auth routes
            match tokio::task::spawn_blocking(move || hash(&password, DEFAULT_COST)).await {
                Ok(Ok(h)) => h,
                _ => {
                    return (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(ErrorResponse::new("Failed to process password")),
                    )
                        .into_response();
                }
            }
        }
        None => existing.password_hash,
    };

    let name = payload.name.unwrap_or(existing.name);
    let email = payload.email.unwrap_or(existing.email);
    let image = payload.image.unwrap_or(existing.image);

    match sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET name = $1, email = $2, image = $3, password_hash = $4
        WHERE id = $5
        RETURNING id, name, email, password_hash, image, created_at
        "#,
    )
    .bind(&name)
    .bind(&email)
    .bind(&image)
    .bind(&password_hash)
    .bind(id)
    .fetch_one(pool.as_ref())
    .await
    {
        Ok(user) => (StatusCode::OK, Json(user)).into_response(),
        Err(e) => {
            if e.to_string().contains("unique") || e.to_string().contains("duplicate key") {
                return (
                    StatusCode::CONFLICT,
                    Json(ErrorResponse::new("Email already registered")),
                )
                    .into_response();
            }
            tracing::error!("Database error updating user: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to update user")),
            )
                .into_response()
        }
    }
}

/// DELETE /api/v1/user/:id - Remove a user (auth required)
///
/// Their posts survive with author set NULL by the foreign key.
pub async fn delete_user(headers: HeaderMap, Path(id): Path<Uuid>) -> impl IntoResponse {
    if let Err(err_response) = verify_auth(&headers) {
        return err_response.into_response();
    }

    let pool = match db::get_pool() {
        Some(p) => p,
        None => return db_unavailable().into_response(),
    };

    match sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(pool.as_ref())
        .await
    {
        Ok(result) => {
            if result.rows_affected() == 0 {
                return (
                    StatusCode::NOT_FOUND,
                    Json(ErrorResponse::new("User not found")),
                )
                    .into_response();
            }
            (StatusCode::OK, Json(SuccessResponse { success: true })).into_response()
        }
        Err(e) => {
            tracing::error!("Database error deleting user: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to delete user")),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, routing::get, Router};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_list_users_without_auth_returns_unauthorized() {
        let app = Router::new().route("/api/v1/user", get(list_users));
        let req = Request::get("/api/v1/user").body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
