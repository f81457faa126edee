//! Storage traits consumed by the engine services
//!
//! Each service receives the stores it needs at construction time. Two
//! backends implement every trait: [`crate::db::MongoStore`] for
//! production and [`MemoryStore`] for tests and dev mode.
//!
//! Set mutations (completed users, notification viewers) are atomic
//! add-if-absent operations that report whether the element was inserted.

mod memory;

use async_trait::async_trait;
use bson::oid::ObjectId;
use chrono::{DateTime, Utc};

use crate::db::schemas::{
    Category, Decision, DeviceToken, FeedPost, Mission, Notification, Validation,
    ValidationStatus,
};
use crate::types::Result;

pub use memory::MemoryStore;

/// Outcome of an add-if-absent set mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetInsert {
    Inserted,
    AlreadyPresent,
    /// The owning document does not exist
    Missing,
}

#[async_trait]
pub trait MissionStore: Send + Sync {
    async fn insert_mission(&self, mission: &Mission) -> Result<()>;

    async fn get_mission(&self, id: &ObjectId) -> Result<Option<Mission>>;

    /// All missions, newest first
    async fn list_missions(&self) -> Result<Vec<Mission>>;

    /// Missions ending after `now`, nearest expiry first
    async fn list_active_missions(&self, now: DateTime<Utc>) -> Result<Vec<Mission>>;

    /// Add `user_id` to the completed set unless already present
    async fn add_completion(&self, id: &ObjectId, user_id: &str) -> Result<SetInsert>;

    /// Returns whether a mission was removed
    async fn delete_mission(&self, id: &ObjectId) -> Result<bool>;
}

#[async_trait]
pub trait ValidationStore: Send + Sync {
    async fn insert_validation(&self, validation: &Validation) -> Result<()>;

    async fn get_validation(&self, id: &ObjectId) -> Result<Option<Validation>>;

    /// Apply `decision` only while the validation is still pending.
    /// Returns whether a record was changed.
    async fn decide(&self, id: &ObjectId, decision: &Decision) -> Result<bool>;

    /// Validations in `status`, oldest submission first
    async fn list_by_status(&self, status: ValidationStatus) -> Result<Vec<Validation>>;

    /// A user's validations, newest submission first
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Validation>>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert_notification(&self, notification: &Notification) -> Result<()>;

    async fn get_notification(&self, id: &ObjectId) -> Result<Option<Notification>>;

    /// Record that `user_id` has seen the notification
    async fn add_viewer(&self, id: &ObjectId, user_id: &str) -> Result<SetInsert>;

    /// Broadcasts plus notifications targeted at `user_id`, newest first
    async fn list_visible(&self, user_id: &str, limit: usize) -> Result<Vec<Notification>>;

    async fn delete_notification(&self, id: &ObjectId) -> Result<bool>;
}

#[async_trait]
pub trait DeviceTokenStore: Send + Sync {
    /// Insert or update the (user, token) record
    async fn upsert_token(
        &self,
        user_id: &str,
        token: &str,
        categories: &[Category],
        at: DateTime<Utc>,
    ) -> Result<DeviceToken>;

    /// Tokens subscribed to `category` (or to every category)
    async fn tokens_for_category(&self, category: Category) -> Result<Vec<DeviceToken>>;

    /// The user's most recently registered token
    async fn latest_token_for_user(&self, user_id: &str) -> Result<Option<DeviceToken>>;
}

/// Read access to the feed owned by the social service
#[async_trait]
pub trait FeedReader: Send + Sync {
    async fn latest_post(&self, user_id: &str) -> Result<Option<FeedPost>>;
}

/// Read access to user profiles owned by the account service
#[async_trait]
pub trait ProfileDirectory: Send + Sync {
    /// Linked Instagram profile, if any
    async fn instagram_handle(&self, user_id: &str) -> Result<Option<String>>;
}
