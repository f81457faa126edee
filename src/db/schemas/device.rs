//! Device token document schema
//!
//! Maps a push token to its owner and subscribed categories.

use bson::{doc, oid::ObjectId, Document};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use super::datetime;
use super::notification::Category;
use crate::db::mongo::IntoIndexes;

/// Collection name for device tokens
pub const DEVICE_TOKEN_COLLECTION: &str = "deviceTokens";

/// Device token document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeviceToken {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub user_id: String,

    /// Push provider registration token
    pub device_token: String,

    /// Subscribed categories; empty means every category
    #[serde(default)]
    pub notification_types: Vec<Category>,

    #[serde(with = "datetime::required")]
    pub updated_at: DateTime<Utc>,
}

impl DeviceToken {
    /// Whether a broadcast to `category` should reach this device
    pub fn subscribed_to(&self, category: Category) -> bool {
        self.notification_types.is_empty() || self.notification_types.contains(&category)
    }
}

impl IntoIndexes for DeviceToken {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // One record per (user, token)
            (
                doc! { "userId": 1, "deviceToken": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("user_token_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "notificationTypes": 1 },
                Some(
                    IndexOptions::builder()
                        .name("notification_types".to_string())
                        .build(),
                ),
            ),
        ]
    }
}
