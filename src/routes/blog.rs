/**
 * Blog Routes
 * CRUD API endpoints for blog posts, plus title search
 */
use axum::{
    extract::{Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::{self, models::BlogPost};
use crate::routes::{verify_auth, ErrorResponse, SuccessResponse};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for GET /api/v1/blog (list)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogListQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
    /// Filter by category slug
    pub category: Option<String>,
    /// Filter by advisory post type (latest | popular | featured)
    pub post_type: Option<String>,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    10
}

/// Response for GET /api/v1/blog (list)
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogListResponse {
    pub items: Vec<BlogPostSummary>,
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
}

/// Blog post summary (for list view), with joined display names
#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BlogPostSummary {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub image: String,
    pub post_type: String,
    pub views: i64,
    pub category_name: Option<String>,
    pub author_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for POST /api/v1/blog (create)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBlogRequest {
    pub title: String,
    pub slug: String,
    pub description: String,
    pub content: String,
    pub image: String,
    pub category_id: Uuid,
    pub post_type: Option<String>,
}

/// Request body for PATCH /api/v1/blog/:slug (update)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBlogRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub image: Option<String>,
    pub category_id: Option<Uuid>,
    pub post_type: Option<String>,
}

/// Query parameters for GET /api/search
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: Option<String>,
}

/// One search hit
#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub title: String,
    pub slug: String,
    pub image: String,
    pub category_slug: Option<String>,
}

/// Response for GET /api/search
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub success: bool,
    pub data: Vec<SearchHit>,
}

// ============================================================================
// Validation
// ============================================================================

lazy_static::lazy_static! {
    /// Valid slug pattern: lowercase letters, numbers, and hyphens
    static ref SLUG_REGEX: Regex = Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").unwrap();
}

fn is_valid_slug(slug: &str) -> bool {
    SLUG_REGEX.is_match(slug)
}

fn is_valid_post_type(post_type: &str) -> bool {
    matches!(post_type, "latest" | "popular" | "featured")
}

/// Sanitize HTML content using ammonia
fn sanitize_html(html: &str) -> String {
    ammonia::clean(html)
}

fn invalid_slug_response() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse::with_message(
            "Invalid slug",
            "Slug must contain only lowercase letters, numbers, and hyphens",
        )),
    )
}

fn db_unavailable() -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorResponse::new("Database not available")),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/blog - List blog posts, newest first, with optional
/// category/post-type filters and pagination
pub async fn list_posts(Query(query): Query<BlogListQuery>) -> impl IntoResponse {
    if let Some(ref post_type) = query.post_type {
        if !is_valid_post_type(post_type) {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("Invalid post type")),
            )
                .into_response();
        }
    }

    let pool = match db::get_pool() {
        Some(p) => p,
        None => return db_unavailable().into_response(),
    };

    // Clamp page_size to max 100
    let page_size = query.page_size.min(100).max(1);
    let page = query.page.max(1);
    let offset = (page - 1) * page_size;

    let posts = match sqlx::query_as::<_, BlogPostSummary>(
        r#"
        SELECT b.id, b.title, b.slug, b.description, b.image, b.post_type,
               b.views, c.name AS category_name, u.name AS author_name,
               b.created_at, b.updated_at
        FROM blog_posts b
        LEFT JOIN categories c ON c.id = b.category_id
        LEFT JOIN users u ON u.id = b.author_id
        WHERE ($1::text IS NULL OR c.slug = $1)
          AND ($2::text IS NULL OR b.post_type = $2)
        ORDER BY b.created_at DESC
        LIMIT $3 OFFSET $4
        "#,
    )
    .bind(&query.category)
    .bind(&query.post_type)
    .bind(page_size)
    .bind(offset)
    .fetch_all(pool.as_ref())
    .await
    {
        Ok(posts) => posts,
        Err(e) => {
            tracing::error!("Database error listing blog posts: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Database error")),
            )
                .into_response();
        }
    };

    let total: (i64,) = match sqlx::query_as(
        r#"
        SELECT COUNT(*)
        FROM blog_posts b
        LEFT JOIN categories c ON c.id = b.category_id
        WHERE ($1::text IS NULL OR c.slug = $1)
          AND ($2::text IS NULL OR b.post_type = $2)
        "#,
    )
    .bind(&query.category)
    .bind(&query.post_type)
    .fetch_one(pool.as_ref())
    .await
    {
        Ok(total) => total,
        Err(e) => {
            tracing::error!("Database error counting blog posts: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Database error")),
            )
                .into_response();
        }
    };

    (
        StatusCode::OK,
        Json(BlogListResponse {
            items: posts,
            page,
            page_size,
            total: total.0,
        }),
    )
        .into_response()
}

/// GET /api/v1/blog/:slug - Get single blog post by slug
pub async fn get_post(Path(slug): Path<String>) -> impl IntoResponse {
    if !is_valid_slug(&slug) {
        return invalid_slug_response().into_response();
    }

    let pool = match db::get_pool() {
        Some(p) => p,
        None => return db_unavailable().into_response(),
    };

    match sqlx::query_as::<_, BlogPost>(
        r#"
        SELECT id, title, slug, description, content, image, post_type,
               views, author_id, category_id, created_at, updated_at
        FROM blog_posts
        WHERE slug = $1
        "#,
    )
    .bind(&slug)
    .fetch_optional(pool.as_ref())
    .await
    {
        Ok(Some(post)) => (StatusCode::OK, Json(post)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("Not found")),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Database error fetching blog post: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Database error")),
            )
                .into_response()
        }
    }
}

/// POST /api/v1/blog - Create new blog post (auth required)
pub async fn create_post(
    headers: HeaderMap,
    Json(payload): Json<CreateBlogRequest>,
) -> impl IntoResponse {
    let author_id = match verify_auth(&headers) {
        Ok(()) => author_from_headers(&headers),
        Err(err_response) => return err_response.into_response(),
    };

    if payload.title.trim().is_empty()
        || payload.description.trim().is_empty()
        || payload.content.trim().is_empty()
        || payload.image.trim().is_empty()
    {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("All fields are required")),
        )
            .into_response();
    }

    if !is_valid_slug(&payload.slug) {
        return invalid_slug_response().into_response();
    }

    let post_type = payload.post_type.unwrap_or_else(|| "latest".to_string());
    if !is_valid_post_type(&post_type) {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Invalid post type")),
        )
            .into_response();
    }

    let pool = match db::get_pool() {
        Some(p) => p,
        None => return db_unavailable().into_response(),
    };

    // Verify the category exists before inserting
    let category_exists: (bool,) =
        match sqlx::query_as("SELECT EXISTS(SELECT 1 FROM categories WHERE id = $1)")
            .bind(payload.category_id)
            .fetch_one(pool.as_ref())
            .await
        {
            Ok(row) => row,
            Err(e) => {
                tracing::error!("Database error checking category: {}", e);
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse::new("Database error")),
                )
                    .into_response();
            }
        };
    if !category_exists.0 {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Invalid Category")),
        )
            .into_response();
    }

    let content = sanitize_html(&payload.content);

    match sqlx::query_as::<_, BlogPost>(
        r#"
        INSERT INTO blog_posts
            (title, slug, description, content, image, post_type, author_id, category_id,
             created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now(), now())
        RETURNING id, title, slug, description, content, image, post_type,
                  views, author_id, category_id, created_at, updated_at
        "#,
    )
    .bind(&payload.title)
    .bind(&payload.slug)
    .bind(&payload.description)
    .bind(&content)
    .bind(&payload.image)
    .bind(&post_type)
    .bind(author_id)
    .bind(payload.category_id)
    .fetch_one(pool.as_ref())
    .await
    {
        Ok(post) => (StatusCode::CREATED, Json(post)).into_response(),
        Err(e) => {
            // Unique constraint violation means the slug is taken
            if e.to_string().contains("duplicate key")
                || e.to_string().contains("unique constraint")
            {
                return (
                    StatusCode::CONFLICT,
                    Json(ErrorResponse::new("Slug already exists")),
                )
                    .into_response();
            }

            tracing::error!("Database error creating blog post: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to create post")),
            )
                .into_response()
        }
    }
}

/// PATCH /api/v1/blog/:slug - Update blog post (auth required)
pub async fn update_post(
    headers: HeaderMap,
    Path(slug): Path<String>,
    Json(payload): Json<UpdateBlogRequest>,
) -> impl IntoResponse {
    if let Err(err_response) = verify_auth(&headers) {
        return err_response.into_response();
    }

    if !is_valid_slug(&slug) {
        return invalid_slug_response().into_response();
    }

    if let Some(ref post_type) = payload.post_type {
        if !is_valid_post_type(post_type) {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("Invalid post type")),
            )
                .into_response();
        }
    }

    let pool = match db::get_pool() {
        Some(p) => p,
        None => return db_unavailable().into_response(),
    };

    let existing = match sqlx::query_as::<_, BlogPost>(
        r#"
        SELECT id, title, slug, description, content, image, post_type,
               views, author_id, category_id, created_at, updated_at
        FROM blog_posts
        WHERE slug = $1
        "#,
    )
    .bind(&slug)
    .fetch_optional(pool.as_ref())
    .await
    {
        Ok(Some(p)) => p,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new("Not found")),
            )
                .into_response();
        }
        Err(e) => {
            tracing::error!("Database error fetching blog post: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Database error")),
            )
                .into_response();
        }
    };

    let title = payload.title.unwrap_or(existing.title);
    let description = payload.description.unwrap_or(existing.description);
    let content = payload
        .content
        .map(|c| sanitize_html(&c))
        .unwrap_or(existing.content);
    let image = payload.image.unwrap_or(existing.image);
    let post_type = payload.post_type.unwrap_or(existing.post_type);
    let category_id = payload.category_id.or(existing.category_id);

    match sqlx::query_as::<_, BlogPost>(
        r#"
        UPDATE blog_posts
        SET title = $1, description = $2, content = $3, image = $4,
            post_type = $5, category_id = $6, updated_at = now()
        WHERE slug = $7
        RETURNING id, title, slug, description, content, image, post_type,
                  views, author_id, category_id, created_at, updated_at
        "#,
    )
    .bind(&title)
    .bind(&description)
    .bind(&content)
    .bind(&image)
    .bind(&post_type)
    .bind(category_id)
    .bind(&slug)
    .fetch_one(pool.as_ref())
    .await
    {
        Ok(post) => (StatusCode::OK, Json(post)).into_response(),
        Err(e) => {
            tracing::error!("Database error updating blog post: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to update post")),
            )
                .into_response()
        }
    }
}

/// DELETE /api/v1/blog/:slug - Delete blog post (auth required)
///
/// Interactions and comments go with it via ON DELETE CASCADE.
pub async fn delete_post(headers: HeaderMap, Path(slug): Path<String>) -> impl IntoResponse {
    if let Err(err_response) = verify_auth(&headers) {
        return err_response.into_response();
    }

    if !is_valid_slug(&slug) {
        return invalid_slug_response().into_response();
    }

    let pool = match db::get_pool() {
        Some(p) => p,
        None => return db_unavailable().into_response(),
    };

    match sqlx::query("DELETE FROM blog_posts WHERE slug = $1")
        .bind(&slug)
        .execute(pool.as_ref())
        .await
    {
        Ok(result) => {
            if result.rows_affected() == 0 {
                return (
                    StatusCode::NOT_FOUND,
                    Json(ErrorResponse::new("Not found")),
                )
                    .into_response();
            }
            (StatusCode::OK, Json(SuccessResponse { success: true })).into_response()
        }
        Err(e) => {
            tracing::error!("Database error deleting blog post: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Failed to delete post")),
            )
                .into_response()
        }
    }
}

/// GET /api/search - Case-insensitive title search, top 5 hits
pub async fn search_posts(Query(query): Query<SearchQuery>) -> impl IntoResponse {
    let term = match query.query {
        Some(ref q) if !q.trim().is_empty() => q.trim().to_string(),
        _ => {
            return (
                StatusCode::OK,
                Json(SearchResponse {
                    success: true,
                    data: vec![],
                }),
            )
                .into_response();
        }
    };

    let pool = match db::get_pool() {
        Some(p) => p,
        None => return db_unavailable().into_response(),
    };

    // Escape LIKE wildcards so a literal % or _ in the query matches itself
    let pattern = format!(
        "%{}%",
        term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
    );

    match sqlx::query_as::<_, SearchHit>(
        r#"
        SELECT b.title, b.slug, b.image, c.slug AS category_slug
        FROM blog_posts b
        LEFT JOIN categories c ON c.id = b.category_id
        WHERE b.title ILIKE $1
        ORDER BY b.created_at DESC
        LIMIT 5
        "#,
    )
    .bind(&pattern)
    .fetch_all(pool.as_ref())
    .await
    {
        Ok(hits) => (
            StatusCode::OK,
            Json(SearchResponse {
                success: true,
                data: hits,
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Database error searching blog posts: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("Internal Server Error")),
            )
                .into_response()
        }
    }
}

/// Pull the author id out of the verified bearer token, if it parses.
fn author_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(|t| crate::routes::auth::verify_access_token(t).ok())
        .and_then(|claims| Uuid::parse_str(&claims.sub).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, routing::get, Router};
    use tower::ServiceExt;

    #[test]
    fn test_valid_slugs() {
        assert!(is_valid_slug("hello-world"));
        assert!(is_valid_slug("post-123"));
        assert!(is_valid_slug("a"));
    }

    #[test]
    fn test_invalid_slugs() {
        assert!(!is_valid_slug(""));
        assert!(!is_valid_slug("Hello-World"));
        assert!(!is_valid_slug("has space"));
        assert!(!is_valid_slug("trailing-"));
        assert!(!is_valid_slug("-leading"));
        assert!(!is_valid_slug("under_score"));
    }

    #[test]
    fn test_post_type_whitelist() {
        assert!(is_valid_post_type("latest"));
        assert!(is_valid_post_type("popular"));
        assert!(is_valid_post_type("featured"));
        assert!(!is_valid_post_type("trending"));
        assert!(!is_valid_post_type(""));
    }

    #[test]
    fn test_sanitize_html_strips_script() {
        let dirty = "<p>ok</p><script>alert('x')</script>";
        let clean = sanitize_html(dirty);
        assert!(clean.contains("<p>ok</p>"));
        assert!(!clean.contains("script"));
    }

    #[tokio::test]
    async fn test_get_post_invalid_slug_returns_bad_request() {
        let app = Router::new().route("/api/v1/blog/{slug}", get(get_post));
        let req = Request::get("/api/v1/blog/Not%20A%20Slug")
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_search_without_query_returns_empty_success() {
        let app = Router::new().route("/api/search", get(search_posts));
        let req = Request::get("/api/search").body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], true);
        assert!(body["data"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_posts_invalid_post_type_returns_bad_request() {
        let app = Router::new().route("/api/v1/blog", get(list_posts));
        let req = Request::get("/api/v1/blog?postType=trending")
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
