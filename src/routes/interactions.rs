/**
 * Interaction Routes
 * Per-device view/like tracking backed by the interaction log
 *
 * The `interactions` table is the single source of truth. The `views`
 * column on `blog_posts` is a convenience mirror recomputed from the log on
 * every successful view insert, so it self-corrects after a partial failure.
 * Like state is never denormalized; it is always read from the log.
 */
use axum::{
    extract::Query,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{self, models::InteractionKind};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for POST /api/v1/blog/view and /api/v1/blog/like
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionRequest {
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub device_id: String,
}

/// Message-only response (errors and the already-viewed path)
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Response for POST /api/v1/blog/view
#[derive(Debug, Serialize, Deserialize)]
pub struct ViewResponse {
    pub message: String,
    pub views: i64,
}

/// Response for POST /api/v1/blog/like
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeResponse {
    pub success: bool,
    pub message: String,
    pub is_liked: bool,
    pub likes_count: i64,
}

/// Query parameters for GET /api/v1/blog/status
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    pub slug: Option<String>,
    pub device_id: Option<String>,
}

/// Response for GET /api/v1/blog/status
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub is_liked: bool,
    pub likes_count: i64,
    pub views: i64,
}

// ============================================================================
// Helpers
// ============================================================================

fn bad_request() -> (StatusCode, Json<MessageResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(MessageResponse {
            message: "Slug and Device ID are required".to_string(),
        }),
    )
}

fn not_found() -> (StatusCode, Json<MessageResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(MessageResponse {
            message: "Blog not found".to_string(),
        }),
    )
}

fn db_unavailable() -> (StatusCode, Json<MessageResponse>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(MessageResponse {
            message: "Database not available".to_string(),
        }),
    )
}

fn internal_error(message: &str) -> (StatusCode, Json<MessageResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(MessageResponse {
            message: message.to_string(),
        }),
    )
}

/// Resolve a slug to (post id, denormalized views).
async fn find_post(pool: &PgPool, slug: &str) -> Result<Option<(Uuid, i64)>, sqlx::Error> {
    sqlx::query_as::<_, (Uuid, i64)>("SELECT id, views FROM blog_posts WHERE slug = $1")
        .bind(slug)
        .fetch_optional(pool)
        .await
}

/// Live count of log records of one kind for a post.
async fn count_interactions(
    pool: &PgPool,
    blog_id: Uuid,
    kind: InteractionKind,
) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM interactions WHERE blog_id = $1 AND kind = $2")
            .bind(blog_id)
            .bind(kind.as_str())
            .fetch_one(pool)
            .await?;
    Ok(count)
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/blog/view - Record a view, at most once per device per post
///
/// Insert-if-absent on the unique (blog, device, kind) index; zero rows
/// affected means this device already viewed the post and the stored count
/// is returned unchanged. On a fresh insert the counter is recomputed from
/// the log rather than incremented, which repairs any earlier drift.
pub async fn record_view(Json(payload): Json<InteractionRequest>) -> impl IntoResponse {
    if payload.slug.trim().is_empty() || payload.device_id.trim().is_empty() {
        return bad_request().into_response();
    }

    let pool = match db::get_pool() {
        Some(p) => p,
        None => return db_unavailable().into_response(),
    };

    let (blog_id, current_views) = match find_post(pool.as_ref(), &payload.slug).await {
        Ok(Some(row)) => row,
        Ok(None) => return not_found().into_response(),
        Err(e) => {
            tracing::error!("Database error resolving slug for view: {}", e);
            return internal_error("Error recording view").into_response();
        }
    };

    let inserted = match sqlx::query(
        r#"
        INSERT INTO interactions (blog_id, device_id, kind)
        VALUES ($1, $2, $3)
        ON CONFLICT (blog_id, device_id, kind) DO NOTHING
        "#,
    )
    .bind(blog_id)
    .bind(&payload.device_id)
    .bind(InteractionKind::View.as_str())
    .execute(pool.as_ref())
    .await
    {
        Ok(result) => result.rows_affected() > 0,
        Err(e) => {
            tracing::error!("Database error inserting view interaction: {}", e);
            return internal_error("Error recording view").into_response();
        }
    };

    if !inserted {
        return (
            StatusCode::OK,
            Json(ViewResponse {
                message: "Already viewed".to_string(),
                views: current_views,
            }),
        )
            .into_response();
    }

    match sqlx::query_as::<_, (i64,)>(
        r#"
        UPDATE blog_posts
        SET views = (SELECT COUNT(*) FROM interactions WHERE blog_id = $1 AND kind = 'view'),
            updated_at = now()
        WHERE id = $1
        RETURNING views
        "#,
    )
    .bind(blog_id)
    .fetch_one(pool.as_ref())
    .await
    {
        Ok((views,)) => (
            StatusCode::OK,
            Json(ViewResponse {
                message: "View recorded".to_string(),
                views,
            }),
        )
            .into_response(),
        Err(e) => {
            // The log insert already committed; the counter heals on the
            // next successful view because it is recomputed, not incremented.
            tracing::error!("Database error syncing view counter: {}", e);
            internal_error("Error recording view").into_response()
        }
    }
}

/// POST /api/v1/blog/like - Toggle this device's like on a post
///
/// Delete-if-present, else insert-if-absent. Calling it twice from the same
/// device restores the original state. The returned count is always the
/// live log count, never a stored value.
pub async fn toggle_like(Json(payload): Json<InteractionRequest>) -> impl IntoResponse {
    if payload.slug.trim().is_empty() || payload.device_id.trim().is_empty() {
        return bad_request().into_response();
    }

    let pool = match db::get_pool() {
        Some(p) => p,
        None => return db_unavailable().into_response(),
    };

    let (blog_id, _) = match find_post(pool.as_ref(), &payload.slug).await {
        Ok(Some(row)) => row,
        Ok(None) => return not_found().into_response(),
        Err(e) => {
            tracing::error!("Database error resolving slug for like: {}", e);
            return internal_error("Error toggling like").into_response();
        }
    };

    let deleted = match sqlx::query(
        "DELETE FROM interactions WHERE blog_id = $1 AND device_id = $2 AND kind = $3",
    )
    .bind(blog_id)
    .bind(&payload.device_id)
    .bind(InteractionKind::Like.as_str())
    .execute(pool.as_ref())
    .await
    {
        Ok(result) => result.rows_affected() > 0,
        Err(e) => {
            tracing::error!("Database error removing like interaction: {}", e);
            return internal_error("Error toggling like").into_response();
        }
    };

    let is_liked = if deleted {
        false
    } else {
        if let Err(e) = sqlx::query(
            r#"
            INSERT INTO interactions (blog_id, device_id, kind)
            VALUES ($1, $2, $3)
            ON CONFLICT (blog_id, device_id, kind) DO NOTHING
            "#,
        )
        .bind(blog_id)
        .bind(&payload.device_id)
        .bind(InteractionKind::Like.as_str())
        .execute(pool.as_ref())
        .await
        {
            tracing::error!("Database error inserting like interaction: {}", e);
            return internal_error("Error toggling like").into_response();
        }
        true
    };

    let likes_count = match count_interactions(pool.as_ref(), blog_id, InteractionKind::Like).await
    {
        Ok(count) => count,
        Err(e) => {
            tracing::error!("Database error counting likes: {}", e);
            return internal_error("Error toggling like").into_response();
        }
    };

    (
        StatusCode::OK,
        Json(LikeResponse {
            success: true,
            message: if is_liked { "Liked" } else { "Unliked" }.to_string(),
            is_liked,
            likes_count,
        }),
    )
        .into_response()
}

/// GET /api/v1/blog/status - Read-only like/view status for one device
pub async fn get_status(Query(query): Query<StatusQuery>) -> impl IntoResponse {
    let (slug, device_id) = match (query.slug.as_deref(), query.device_id.as_deref()) {
        (Some(s), Some(d)) if !s.trim().is_empty() && !d.trim().is_empty() => (s, d),
        _ => return bad_request().into_response(),
    };

    let pool = match db::get_pool() {
        Some(p) => p,
        None => return db_unavailable().into_response(),
    };

    let (blog_id, _) = match find_post(pool.as_ref(), slug).await {
        Ok(Some(row)) => row,
        Ok(None) => return not_found().into_response(),
        Err(e) => {
            tracing::error!("Database error resolving slug for status: {}", e);
            return internal_error("Error fetching status").into_response();
        }
    };

    let is_liked = match sqlx::query_as::<_, (bool,)>(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM interactions
            WHERE blog_id = $1 AND device_id = $2 AND kind = $3
        )
        "#,
    )
    .bind(blog_id)
    .bind(device_id)
    .bind(InteractionKind::Like.as_str())
    .fetch_one(pool.as_ref())
    .await
    {
        Ok((liked,)) => liked,
        Err(e) => {
            tracing::error!("Database error checking like state: {}", e);
            return internal_error("Error fetching status").into_response();
        }
    };

    let likes_count = match count_interactions(pool.as_ref(), blog_id, InteractionKind::Like).await
    {
        Ok(count) => count,
        Err(e) => {
            tracing::error!("Database error counting likes: {}", e);
            return internal_error("Error fetching status").into_response();
        }
    };

    let views = match count_interactions(pool.as_ref(), blog_id, InteractionKind::View).await {
        Ok(count) => count,
        Err(e) => {
            tracing::error!("Database error counting views: {}", e);
            return internal_error("Error fetching status").into_response();
        }
    };

    (
        StatusCode::OK,
        Json(StatusResponse {
            is_liked,
            likes_count,
            views,
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::Request,
        routing::{get, post},
        Router,
    };
    use tower::ServiceExt;

    fn interaction_router() -> Router {
        Router::new()
            .route("/api/v1/blog/view", post(record_view))
            .route("/api/v1/blog/like", post(toggle_like))
            .route("/api/v1/blog/status", get(get_status))
    }

    async fn post_json(
        app: Router,
        uri: &str,
        json: &impl serde::Serialize,
    ) -> (StatusCode, axum::body::Bytes) {
        let body = Body::from(serde_json::to_vec(json).unwrap());
        let req = Request::post(uri)
            .header("content-type", "application/json")
            .body(body)
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes)
    }

    async fn get_uri(app: Router, uri: &str) -> (StatusCode, axum::body::Bytes) {
        let req = Request::get(uri).body(Body::empty()).unwrap();
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes)
    }

    #[tokio::test]
    async fn test_record_view_missing_device_id_returns_bad_request() {
        let (status, bytes) = post_json(
            interaction_router(),
            "/api/v1/blog/view",
            &InteractionRequest {
                slug: "some-post".to_string(),
                device_id: "".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: MessageResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.message, "Slug and Device ID are required");
    }

    #[tokio::test]
    async fn test_record_view_missing_slug_returns_bad_request() {
        let (status, _) = post_json(
            interaction_router(),
            "/api/v1/blog/view",
            &InteractionRequest {
                slug: "".to_string(),
                device_id: "device-a".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_record_view_whitespace_device_id_returns_bad_request() {
        let (status, _) = post_json(
            interaction_router(),
            "/api/v1/blog/view",
            &InteractionRequest {
                slug: "some-post".to_string(),
                device_id: "   ".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_record_view_body_without_fields_returns_bad_request() {
        // serde defaults absent fields to empty strings, which fail validation
        let (status, _) = post_json(
            interaction_router(),
            "/api/v1/blog/view",
            &serde_json::json!({}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_toggle_like_missing_fields_returns_bad_request() {
        let (status, bytes) = post_json(
            interaction_router(),
            "/api/v1/blog/like",
            &InteractionRequest {
                slug: "".to_string(),
                device_id: "".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: MessageResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.message, "Slug and Device ID are required");
    }

    #[tokio::test]
    async fn test_status_missing_device_id_returns_bad_request() {
        let (status, _) = get_uri(
            interaction_router(),
            "/api/v1/blog/status?slug=some-post",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_status_missing_slug_returns_bad_request() {
        let (status, _) = get_uri(
            interaction_router(),
            "/api/v1/blog/status?deviceId=device-a",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_valid_view_without_database_returns_service_unavailable() {
        let (status, _) = post_json(
            interaction_router(),
            "/api/v1/blog/view",
            &InteractionRequest {
                slug: "some-post".to_string(),
                device_id: "device-a".to_string(),
            },
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_like_response_wire_shape_is_camel_case() {
        let json = serde_json::to_value(LikeResponse {
            success: true,
            message: "Liked".to_string(),
            is_liked: true,
            likes_count: 3,
        })
        .unwrap();
        assert_eq!(json["isLiked"], true);
        assert_eq!(json["likesCount"], 3);
        assert_eq!(json["message"], "Liked");
    }

    #[test]
    fn test_status_response_wire_shape_is_camel_case() {
        let json = serde_json::to_value(StatusResponse {
            is_liked: false,
            likes_count: 0,
            views: 2,
        })
        .unwrap();
        assert_eq!(json["isLiked"], false);
        assert_eq!(json["likesCount"], 0);
        assert_eq!(json["views"], 2);
    }

    #[test]
    fn test_interaction_request_accepts_camel_case_device_id() {
        let req: InteractionRequest =
            serde_json::from_str(r#"{"slug":"post","deviceId":"abc"}"#).unwrap();
        assert_eq!(req.slug, "post");
        assert_eq!(req.device_id, "abc");
    }

    // Requires DATABASE_URL pointing at a scratch Postgres instance:
    //   cargo test interaction_lifecycle -- --ignored
    #[tokio::test]
    #[ignore]
    async fn test_interaction_lifecycle_against_database() {
        let pool = db::init_pool(None).await.unwrap();
        db::run_migrations(&pool).await.unwrap();

        let marker = Uuid::new_v4().simple().to_string();
        let slug = format!("lifecycle-{}", marker);
        let title = format!("Lifecycle {}", marker);
        sqlx::query("INSERT INTO blog_posts (title, slug) VALUES ($1, $2)")
            .bind(&title)
            .bind(&slug)
            .execute(pool.as_ref())
            .await
            .unwrap();

        let app = crate::create_app();
        let view = |device: &str| InteractionRequest {
            slug: slug.clone(),
            device_id: device.to_string(),
        };

        // First view from device A counts once
        let (status, bytes) = post_json(app.clone(), "/api/v1/blog/view", &view("device-a")).await;
        assert_eq!(status, StatusCode::OK);
        let body: ViewResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.message, "View recorded");
        assert_eq!(body.views, 1);

        // Repeat from the same device is a no-op
        let (status, bytes) = post_json(app.clone(), "/api/v1/blog/view", &view("device-a")).await;
        assert_eq!(status, StatusCode::OK);
        let body: ViewResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.message, "Already viewed");
        assert_eq!(body.views, 1);

        // A second device counts
        let (_, bytes) = post_json(app.clone(), "/api/v1/blog/view", &view("device-b")).await;
        let body: ViewResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.views, 2);

        // Like then unlike from the same device restores the original state
        let (status, bytes) = post_json(app.clone(), "/api/v1/blog/like", &view("device-a")).await;
        assert_eq!(status, StatusCode::OK);
        let body: LikeResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(body.is_liked);
        assert_eq!(body.message, "Liked");
        assert_eq!(body.likes_count, 1);

        let (_, bytes) = post_json(app.clone(), "/api/v1/blog/like", &view("device-a")).await;
        let body: LikeResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(!body.is_liked);
        assert_eq!(body.message, "Unliked");
        assert_eq!(body.likes_count, 0);

        // Status reflects the log, not any stored counter
        let (status, bytes) = get_uri(
            app.clone(),
            &format!("/api/v1/blog/status?slug={}&deviceId=device-a", slug),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let body: StatusResponse = serde_json::from_slice(&bytes).unwrap();
        assert!(!body.is_liked);
        assert_eq!(body.likes_count, 0);
        assert_eq!(body.views, 2);

        // Unknown slug is a 404, not a silent zero
        let (status, _) =
            post_json(app.clone(), "/api/v1/blog/view", &InteractionRequest {
                slug: format!("missing-{}", marker),
                device_id: "device-a".to_string(),
            })
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        // The all-time window ranks this post with both views
        let (status, bytes) = get_uri(app.clone(), "/api/v1/analytics?range=all").await;
        assert_eq!(status, StatusCode::OK);
        let body: crate::routes::analytics::AnalyticsResponse =
            serde_json::from_slice(&bytes).unwrap();
        assert!(body.success);
        let data = body.data.unwrap();
        assert!(data.total_views >= 2);
        let ranked = data
            .top_views
            .iter()
            .find(|p| p.title == title)
            .expect("post missing from top views");
        assert_eq!(ranked.count, 2);
        assert!(!data.top_likes.iter().any(|p| p.title == title));

        // Cascade cleanup removes the interaction rows with the post
        sqlx::query("DELETE FROM blog_posts WHERE slug = $1")
            .bind(&slug)
            .execute(pool.as_ref())
            .await
            .unwrap();
        let (remaining,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM interactions i \
             LEFT JOIN blog_posts b ON b.id = i.blog_id WHERE b.id IS NULL",
        )
        .fetch_one(pool.as_ref())
        .await
        .unwrap();
        assert_eq!(remaining, 0);
    }
}
