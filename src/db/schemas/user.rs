//! Read-side views of collaborator collections
//!
//! The `users` and `posts` collections are owned by the account and feed
//! services. This crate only reads the fields below and increments the
//! points counters.

use bson::{doc, Document};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use super::datetime;
use crate::db::mongo::IntoIndexes;

/// Collection name for user accounts
pub const USER_COLLECTION: &str = "users";

/// Collection name for feed posts
pub const POST_COLLECTION: &str = "posts";

/// Subset of a user account relevant to missions
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instagram_url: Option<String>,

    #[serde(default)]
    pub p_total: i64,

    #[serde(default)]
    pub p_spent: i64,

    #[serde(default)]
    pub p_current: i64,
}

impl UserProfile {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            ..Default::default()
        }
    }

    pub fn balance(&self) -> PointsBalance {
        PointsBalance {
            total: self.p_total,
            spent: self.p_spent,
            current: self.p_current,
        }
    }
}

impl IntoIndexes for UserProfile {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        // Owned and indexed by the account service
        Vec::new()
    }
}

/// Per-user point counters
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PointsBalance {
    /// Points earned over the account's lifetime
    pub total: i64,
    pub spent: i64,
    pub current: i64,
}

/// Subset of a feed post relevant to completion checks
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeedPost {
    pub owner_id: String,

    #[serde(with = "datetime::required")]
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub hashtags: Vec<String>,

    #[serde(default)]
    pub image_url: String,
}

impl FeedPost {
    pub fn has_image(&self) -> bool {
        !self.image_url.trim().is_empty()
    }

    pub fn has_hashtag(&self, hashtag: &str) -> bool {
        let wanted = hashtag.trim_start_matches('#');
        self.hashtags
            .iter()
            .any(|h| h.trim_start_matches('#') == wanted)
    }
}

impl IntoIndexes for FeedPost {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        // Owned and indexed by the feed service
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashtag_match_ignores_hash_prefix() {
        let post = FeedPost {
            owner_id: "u1".into(),
            created_at: Utc::now(),
            hashtags: vec!["#offsite".into(), "team".into()],
            image_url: String::new(),
        };
        assert!(post.has_hashtag("offsite"));
        assert!(post.has_hashtag("#team"));
        assert!(!post.has_hashtag("launch"));
        assert!(!post.has_image());
    }
}
