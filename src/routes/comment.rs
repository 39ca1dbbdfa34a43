/**
 * Comment Routes
 * Public comment submission and per-post listing, plus admin moderation
 */
use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{self, models::Comment};
use crate::routes::{verify_auth, ErrorResponse, SuccessResponse};

/// Request body for POST /api/v1/comment (public)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCommentRequest {
    pub name: String,
    pub email: String,
    pub comment: String,
    pub blog_id: Uuid,
}

/// Request body for PATCH /api/v1/comment/:id (admin moderation)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCommentRequest {
    pub comment: Option<String>,
}

/// Comment joined with its post title, for the admin list
#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CommentWithPost {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub comment: String,
    pub blog_id: Uuid,
    pub blog_title: String,
    pub created_at: DateTime<Utc>,
}

/// Response wrapper used by the public comment endpoints
#[derive(Debug, Serialize)]
pub struct CommentDataResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

fn db_unavailable() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorResponse::new("Database not available")),
    )
}

/// POST /api/v1/comment - Submit a comment (public, no auth)
pub async fn create_comment(Json(payload): Json<CreateCommentRequest>) -> impl IntoResponse {
    if payload.name.trim().is_empty()
        || payload.email.trim().is_empty()
        || payload.comment.trim().is_empty()
    {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Missing required fields")),
        )
            .into_response();
    }

    let pool = match db::get_pool() {
        Some(p) => p,
        None => return db_unavailable().into_response(),
    };

    // Verify the post exists before attaching a comment to it
    let blog_exists: (bool,) =
        match sqlx::query_as("SELECT EXISTS(SELECT 1 FROM blog_posts WHERE id = $1)")
            .bind(payload.blog_id)
            .fetch_one(pool.as_ref())
            .await
        {
            Ok(row) => row,
            Err(e) => {
                tracing::error!("Database error checking blog for comment: {}", e);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse::new("Internal Server Error")),
                )
                    .into_response();
            }
        };
    if !blog_exists.0 {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("Blog not found")),
        )
            .into_response();
    }

    match sqlx::query_as::<_, Comment>(
        r#"
        INSERT INTO comments (name, email, comment, blog_id, created_at)
        VALUES ($1, $2, $3, $4, now())
        RETURNING id, name, email, comment, blog_id, created_at
        "#,
    )
    .bind(payload.name.trim())
    .bind(payload.email.trim())
    .bind(payload.comment.trim())
    .bind(payload.blog_id)
    .fetch_one(pool.as_ref())
    .await
    {
        Ok(comment) => (
            StatusCode::CREATED,
            Json(CommentDataResponse {
                success: true,
                data: comment,
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Database error creating comment: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Internal Server Error")),
            )
                .into_response()
        }
    }
}

/// GET /api/v1/blog/{slug}/comments - Comments for one post, newest first
pub async fn list_comments_for_post(Path(slug): Path<String>) -> impl IntoResponse {
    let pool = match db::get_pool() {
        Some(p) => p,
        None => return db_unavailable().into_response(),
    };

    let blog_id: Option<(Uuid,)> =
        match sqlx::query_as("SELECT id FROM blog_posts WHERE slug = $1")
            .bind(&slug)
            .fetch_optional(pool.as_ref())
            .await
        {
            Ok(row) => row,
            Err(e) => {
                tracing::error!("Database error resolving slug for comments: {}", e);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse::new("Internal Server Error")),
                )
                    .into_response();
            }
        };
    let blog_id = match blog_id {
        Some((id,)) => id,
        None => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new("Blog not found")),
            )
                .into_response();
        }
    };

    match sqlx::query_as::<_, Comment>(
        r#"
        SELECT id, name, email, comment, blog_id, created_at
        FROM comments
        WHERE blog_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(blog_id)
    .fetch_all(pool.as_ref())
    .await
    {
        Ok(comments) => (
            StatusCode::OK,
            Json(CommentDataResponse {
                success: true,
                data: comments,
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Database error listing comments: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Internal Server Error")),
            )
                .into_response()
        }
    }
}

/// GET /api/v1/comment - All comments with post titles (auth required)
pub async fn list_comments(headers: HeaderMap) -> impl IntoResponse {
    if let Err(err_response) = verify_auth(&headers) {
        return err_response.into_response();
    }

    let pool = match db::get_pool() {
        Some(p) => p,
        None => return db_unavailable().into_response(),
    };

    match sqlx::query_as::<_, CommentWithPost>(
        r#"
        SELECT co.id, co.name, co.email, co.comment, co.blog_id,
               b.title AS blog_title, co.created_at
        FROM comments co
        JOIN blog_posts b ON b.id = co.blog_id
        ORDER BY co.created_at DESC
        "#,
    )
    .fetch_all(pool.as_ref())
    .await
    {
        Ok(comments) => (StatusCode::OK, Json(comments)).into_response(),
        Err(e) => {
            tracing::error!("Database error listing all comments: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Database error")),
            )
                .into_response()
        }
    }
}

/// PATCH /api/v1/comment/:id - Edit a comment's text (auth required)
pub async fn update_comment(
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCommentRequest>,
) -> impl IntoResponse {
    if let Err(err_response) = verify_auth(&headers) {
        return err_response.into_response();
    }

    let text = match payload.comment {
        Some(ref t) if !t.trim().is_empty() => t.trim().to_string(),
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("Comment text is required")),
            )
                .into_response();
        }
    };

    let pool = match db::get_pool() {
        Some(p) => p,
        None => return db_unavailable().into_response(),
    };

    match sqlx::query_as::<_, Comment>(
        r#"
        UPDATE comments
        SET comment = $1
        WHERE id = $2
        RETURNING id, name, email, comment, blog_id, created_at
        "#,
    )
    .bind(&text)
    .bind(id)
    .fetch_optional(pool.as_ref())
    .await
    {
        Ok(Some(comment)) => (StatusCode::OK, Json(comment)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("Comment not found")),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Database error updating comment: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to update comment")),
            )
                .into_response()
        }
    }
}

/// DELETE /api/v1/comment/:id - Remove a comment (auth required)
pub async fn delete_comment(headers: HeaderMap, Path(id): Path<Uuid>) -> impl IntoResponse {
    if let Err(err_response) = verify_auth(&headers) {
        return err_response.into_response();
    }

    let pool = match db::get_pool() {
        Some(p) => p,
        None => return db_unavailable().into_response(),
    };

    match sqlx::query("DELETE FROM comments WHERE id = $1")
        .bind(id)
        .execute(pool.as_ref())
        .await
    {
        Ok(result) => {
            if result.rows_affected() == 0 {
                return (
                    StatusCode::NOT_FOUND,
                    Json(ErrorResponse::new("Comment not found")),
                )
                    .into_response();
            }
            (StatusCode::OK, Json(SuccessResponse { success: true })).into_response()
        }
        Err(e) => {
            tracing::error!("Database error deleting comment: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to delete comment")),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, routing::post, Router};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_create_comment_missing_fields_returns_bad_request() {
        let app = Router::new().route("/api/v1/comment", post(create_comment));
        let body = serde_json::json!({
            "name": "",
            "email": "reader@example.com",
            "comment": "Nice post",
            "blogId": Uuid::new_v4(),
        });
        let req = Request::post("/api/v1/comment")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_list_all_comments_without_auth_returns_unauthorized() {
        let app = Router::new().route(
            "/api/v1/comment",
            axum::routing::get(list_comments).post(create_comment),
        );
        let req = Request::get("/api/v1/comment").body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
