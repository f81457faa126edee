//! Notification document schema
//!
//! Notifications carry an explicit target: a subscriber category for
//! broadcasts or a single user for private alerts.

use bson::{doc, oid::ObjectId, Document};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::datetime;
use crate::db::mongo::IntoIndexes;
use crate::types::EngineError;

/// Collection name for notifications
pub const NOTIFICATION_COLLECTION: &str = "notifications";

/// Subscriber category
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Feed,
    Birthday,
    Contact,
    Mission,
    /// General announcements
    All,
}

/// Every known category; the default subscription of a new device
pub const ALL_CATEGORIES: [Category; 5] = [
    Category::Feed,
    Category::Birthday,
    Category::Contact,
    Category::Mission,
    Category::All,
];

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Feed => "feed",
            Category::Birthday => "birthday",
            Category::Contact => "contact",
            Category::Mission => "mission",
            Category::All => "all",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_CATEGORIES
            .iter()
            .copied()
            .find(|c| c.as_str() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| EngineError::InvalidArgument(format!("Unknown category: {}", s)))
    }
}

/// Who a notification is for
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum NotificationTarget {
    /// Broadcast to every device subscribed to the category
    Category(Category),
    /// Private alert to one user
    User(String),
}

impl NotificationTarget {
    pub fn is_visible_to(&self, user_id: &str) -> bool {
        match self {
            NotificationTarget::Category(_) => true,
            NotificationTarget::User(target) => target == user_id,
        }
    }
}

impl fmt::Display for NotificationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationTarget::Category(c) => write!(f, "category:{}", c),
            NotificationTarget::User(u) => write!(f, "user:{}", u),
        }
    }
}

/// Notification document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub text: String,

    pub target: NotificationTarget,

    /// Users who have seen the notification (unique)
    #[serde(default)]
    pub visualized: Vec<String>,

    #[serde(with = "datetime::required")]
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(text: String, target: NotificationTarget, created_at: DateTime<Utc>) -> Self {
        Self {
            id: ObjectId::new(),
            text,
            target,
            visualized: Vec::new(),
            created_at,
        }
    }

    pub fn seen_by(&self, user_id: &str) -> bool {
        self.visualized.iter().any(|u| u == user_id)
    }
}

impl IntoIndexes for Notification {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "target.kind": 1, "target.value": 1, "createdAt": -1 },
            Some(
                IndexOptions::builder()
                    .name("target_created".to_string())
                    .build(),
            ),
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parsing() {
        assert_eq!("mission".parse::<Category>().unwrap(), Category::Mission);
        assert_eq!(" Feed ".parse::<Category>().unwrap(), Category::Feed);
        assert!("newsletter".parse::<Category>().is_err());
    }

    #[test]
    fn test_target_encoding() {
        let doc = bson::to_document(&Notification::new(
            "hello".into(),
            NotificationTarget::Category(Category::Birthday),
            Utc::now(),
        ))
        .unwrap();
        let target = doc.get_document("target").unwrap();
        assert_eq!(target.get_str("kind").unwrap(), "category");
        assert_eq!(target.get_str("value").unwrap(), "birthday");
    }

    #[test]
    fn test_visibility() {
        let private = NotificationTarget::User("u1".into());
        assert!(private.is_visible_to("u1"));
        assert!(!private.is_visible_to("u2"));
        assert!(NotificationTarget::Category(Category::Feed).is_visible_to("u2"));
    }
}
