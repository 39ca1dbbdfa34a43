/**
 * Analytics Routes
 * Time-windowed rankings and totals aggregated from the interaction log
 *
 * Read-only over the `interactions` table; the denormalized `views` column
 * on posts is never consulted here, so an all-time figure reflects the log
 * even if a counter has ever drifted.
 */
use axum::{extract::Query, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::db::{self, models::InteractionKind};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Reporting window for the analytics endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyticsRange {
    Day,
    Week,
    Month,
    #[default]
    All,
}

impl AnalyticsRange {
    /// Lower bound on interaction timestamps for this window, or None for
    /// the unbounded all-time window. `month` is one calendar month, not a
    /// fixed 30 days.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            AnalyticsRange::Day => Some(now - Duration::hours(24)),
            AnalyticsRange::Week => Some(now - Duration::days(7)),
            AnalyticsRange::Month => Some(now.checked_sub_months(Months::new(1))?),
            AnalyticsRange::All => None,
        }
    }
}

/// Query parameters for GET /api/v1/analytics
#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    #[serde(default)]
    pub range: AnalyticsRange,
}

/// One entry in a top-10 ranking
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct RankedPost {
    pub title: String,
    pub count: i64,
}

/// Aggregated figures for the requested window
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsData {
    pub top_views: Vec<RankedPost>,
    pub top_likes: Vec<RankedPost>,
    pub total_views: i64,
    pub total_likes: i64,
}

/// Response for GET /api/v1/analytics
#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyticsResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<AnalyticsData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ============================================================================
// Aggregation queries
// ============================================================================

/// Top 10 posts by interaction count of one kind within the window.
/// Ties break on the most recent interaction first, so the ordering is
/// stable across storage engines.
async fn top_posts(
    pool: &PgPool,
    kind: InteractionKind,
    cutoff: Option<DateTime<Utc>>,
) -> Result<Vec<RankedPost>, sqlx::Error> {
    sqlx::query_as::<_, RankedPost>(
        r#"
        SELECT b.title, COUNT(*) AS count
        FROM interactions i
        JOIN blog_posts b ON b.id = i.blog_id
        WHERE i.kind = $1
          AND ($2::timestamptz IS NULL OR i.created_at >= $2)
        GROUP BY b.id, b.title
        ORDER BY COUNT(*) DESC, MAX(i.created_at) DESC
        LIMIT 10
        "#,
    )
    .bind(kind.as_str())
    .bind(cutoff)
    .fetch_all(pool)
    .await
}

/// Window-wide total of interactions of one kind.
async fn total_interactions(
    pool: &PgPool,
    kind: InteractionKind,
    cutoff: Option<DateTime<Utc>>,
) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM interactions
        WHERE kind = $1
          AND ($2::timestamptz IS NULL OR created_at >= $2)
        "#,
    )
    .bind(kind.as_str())
    .bind(cutoff)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

// ============================================================================
// Handler
// ============================================================================

/// GET /api/v1/analytics - Top posts and totals for a reporting window
pub async fn get_analytics(Query(query): Query<AnalyticsQuery>) -> impl IntoResponse {
    let pool = match db::get_pool() {
        Some(p) => p,
        None => {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(AnalyticsResponse {
                    success: false,
                    data: None,
                    message: Some("Database not available".to_string()),
                }),
            );
        }
    };

    let cutoff = query.range.cutoff(Utc::now());

    let result = async {
        let top_views = top_posts(pool.as_ref(), InteractionKind::View, cutoff).await?;
        let top_likes = top_posts(pool.as_ref(), InteractionKind::Like, cutoff).await?;
        let total_views = total_interactions(pool.as_ref(), InteractionKind::View, cutoff).await?;
        let total_likes = total_interactions(pool.as_ref(), InteractionKind::Like, cutoff).await?;
        Ok::<AnalyticsData, sqlx::Error>(AnalyticsData {
            top_views,
            top_likes,
            total_views,
            total_likes,
        })
    }
    .await;

    match result {
        Ok(data) => (
            StatusCode::OK,
            Json(AnalyticsResponse {
                success: true,
                data: Some(data),
                message: None,
            }),
        ),
        Err(e) => {
            tracing::error!(range = ?query.range, "Analytics aggregation failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(AnalyticsResponse {
                    success: false,
                    data: None,
                    message: Some("Error fetching analytics".to_string()),
                }),
            )
        }
    }
}
