/**
 * Category Routes
 * CRUD API endpoints for post categories
 */
use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::db::{self, models::Category};
use crate::routes::{verify_auth, ErrorResponse, SuccessResponse};

/// Request body for POST /api/v1/category
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCategoryRequest {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
}

/// Request body for PATCH /api/v1/category/:id
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
}

fn db_unavailable() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorResponse::new("Database not available")),
    )
}

/// GET /api/v1/category - List all categories, newest first
pub async fn list_categories() -> impl IntoResponse {
    let pool = match db::get_pool() {
        Some(p) => p,
        None => return db_unavailable().into_response(),
    };

    match sqlx::query_as::<_, Category>(
        r#"
        SELECT id, name, slug, description, created_at, updated_at
        FROM categories
        ORDER BY created_at DESC
        "#,
    )
    .fetch_all(pool.as_ref())
    .await
    {
        Ok(categories) => (StatusCode::OK, Json(categories)).into_response(),
        Err(e) => {
            tracing::error!("Database error listing categories: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Database error")),
            )
                .into_response()
        }
    }
}

/// GET /api/v1/category/:id - Get single category
pub async fn get_category(Path(id): Path<Uuid>) -> impl IntoResponse {
    let pool = match db::get_pool() {
        Some(p) => p,
        None => return db_unavailable().into_response(),
    };

    match sqlx::query_as::<_, Category>(
        r#"
        SELECT id, name, slug, description, created_at, updated_at
        FROM categories
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool.as_ref())
    .await
    {
        Ok(Some(category)) => (StatusCode::OK, Json(category)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("Category not found")),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Database error fetching category: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Database error")),
            )
                .into_response()
        }
    }
}

/// POST /api/v1/category - Create category (auth required)
pub async fn create_category(
    headers: HeaderMap,
    Json(payload): Json<CreateCategoryRequest>,
) -> impl IntoResponse {
    if let Err(err_response) = verify_auth(&headers) {
        return err_response.into_response();
    }

    if payload.name.trim().is_empty() || payload.slug.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Name and Slug are required")),
        )
            .into_response();
    }

    let pool = match db::get_pool() {
        Some(p) => p,
        None => return db_unavailable().into_response(),
    };

    match sqlx::query_as::<_, Category>(
        r#"
        INSERT INTO categories (name, slug, description, created_at, updated_at)
        VALUES ($1, $2, $3, now(), now())
        RETURNING id, name, slug, description, created_at, updated_at
        "#,
    )
    .bind(&payload.name)
    .bind(&payload.slug)
    .bind(&payload.description)
    .fetch_one(pool.as_ref())
    .await
    {
        Ok(category) => (StatusCode::CREATED, Json(category)).into_response(),
        Err(e) => {
            if e.to_string().contains("duplicate key")
                || e.to_string().contains("unique constraint")
            {
                return (
                    StatusCode::CONFLICT,
                    Json(ErrorResponse::new(
                        "Category with this name or slug already exists",
                    )),
                )
                    .into_response();
            }
            tracing::error!("Database error creating category: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to create category")),
            )
                .into_response()
        }
    }
}

/// PATCH /api/v1/category/:id - Update category (auth required)
pub async fn update_category(
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCategoryRequest>,
) -> impl IntoResponse {
    if let Err(err_response) = verify_auth(&headers) {
        return err_response.into_response();
    }

    let pool = match db::get_pool() {
        Some(p) => p,
        None => return db_unavailable().into_response(),
    };

    let existing = match sqlx::query_as::<_, Category>(
        r#"
        SELECT id, name, slug, description, created_at, updated_at
        FROM categories
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool.as_ref())
    .await
    {
        Ok(Some(c)) => c,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new("Category not found")),
            )
                .into_response();
        }
        Err(e) => {
            tracing::error!("Database error fetching category: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Database error")),
            )
                .into_response();
        }
    };

    let name = payload.name.unwrap_or(existing.name);
    let slug = payload.slug.unwrap_or(existing.slug);
    let description = payload.description.or(existing.description);

    match sqlx::query_as::<_, Category>(
        r#"
        UPDATE categories
        SET name = $1, slug = $2, description = $3, updated_at = now()
        WHERE id = $4
        RETURNING id, name, slug, description, created_at, updated_at
        "#,
    )
    .bind(&name)
    .bind(&slug)
    .bind(&description)
    .bind(id)
    .fetch_one(pool.as_ref())
    .await
    {
        Ok(category) => (StatusCode::OK, Json(category)).into_response(),
        Err(e) => {
            tracing::error!("Database error updating category: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to update category")),
            )
                .into_response()
        }
    }
}

/// DELETE /api/v1/category/:id - Delete category (auth required)
///
/// Posts in the category are kept; their category reference is set NULL by
/// the foreign key.
pub async fn delete_category(headers: HeaderMap, Path(id): Path<Uuid>) -> impl IntoResponse {
    if let Err(err_response) = verify_auth(&headers) {
        return err_response.into_response();
    }

    let pool = match db::get_pool() {
        Some(p) => p,
        None => return db_unavailable().into_response(),
    };

    match sqlx::query("DELETE FROM categories WHERE id = $1")
        .bind(id)
        .execute(pool.as_ref())
        .await
    {
        Ok(result) => {
            if result.rows_affected() == 0 {
                return (
                    StatusCode::NOT_FOUND,
                    Json(ErrorResponse::new("Category not found")),
                )
                    .into_response();
            }
            (StatusCode::OK, Json(SuccessResponse { success: true })).into_response()
        }
        Err(e) => {
            tracing::error!("Database error deleting category: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to delete category")),
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
    async fn test_create_category_without_auth_returns_unauthorized() {
        let app = Router::new().route("/api/v1/category", post(create_category));
        let body = serde_json::json!({"name": "Rust", "slug": "rust"});
        let req = Request::post("/api/v1/category")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
