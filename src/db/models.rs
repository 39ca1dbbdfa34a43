//! Database Models - structs representing database tables (used by sqlx/serde).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// User model. The password hash never leaves the process: it is skipped
/// during serialization so list/get endpoints cannot leak it.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub image: String,
    pub created_at: DateTime<Utc>,
}

/// Category model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Blog post model.
///
/// `views` is a denormalized counter mirroring the interaction log; it is
/// recomputed from the log on every successful view insert, never
/// incremented in place. Liked/viewed device sets are not stored here at
/// all - they are always derived from the `interactions` table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogPost {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub content: String,
    pub image: String,
    pub post_type: String,
    pub views: i64,
    pub author_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Comment model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub comment: String,
    pub blog_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Kind of interaction a device performed on a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionKind {
    View,
    Like,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::View => "view",
            InteractionKind::Like => "like",
        }
    }
}

impl std::fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interaction_kind_as_str() {
        assert_eq!(InteractionKind::View.as_str(), "view");
        assert_eq!(InteractionKind::Like.as_str(), "like");
    }

    #[test]
    fn test_interaction_kind_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&InteractionKind::View).unwrap(),
            "\"view\""
        );
        let kind: InteractionKind = serde_json::from_str("\"like\"").unwrap();
        assert_eq!(kind, InteractionKind::Like);
    }

    #[test]
    fn test_user_serialization_skips_password_hash() {
        let user = User {
            id: Uuid::new_v4(),
            name: "Author".to_string(),
            email: "author@example.com".to_string(),
            password_hash: "$2b$12$secret".to_string(),
            image: String::new(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password"));
        assert!(!json.contains("secret"));
    }
}
