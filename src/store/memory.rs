//! In-memory backend (for testing/local development)

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{
    DeviceTokenStore, FeedReader, MissionStore, NotificationStore, ProfileDirectory, SetInsert,
    ValidationStore,
};
use crate::db::schemas::{
    Category, Decision, DeviceToken, FeedPost, Mission, Notification, PointsBalance,
    UserProfile, Validation, ValidationStatus,
};
use crate::ledger::PointsLedger;
use crate::types::{EngineError, Result};

#[derive(Default)]
struct Tables {
    missions: HashMap<ObjectId, Mission>,
    validations: HashMap<ObjectId, Validation>,
    notifications: HashMap<ObjectId, Notification>,
    devices: Vec<DeviceToken>,
    users: HashMap<String, UserProfile>,
    posts: Vec<FeedPost>,
}

/// Every store trait backed by process memory
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    ledger_down: Arc<AtomicBool>,
    latency_ms: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user account so the ledger can credit it
    pub async fn add_user(&self, profile: UserProfile) {
        self.tables
            .write()
            .await
            .users
            .insert(profile.uid.clone(), profile);
    }

    pub async fn add_post(&self, post: FeedPost) {
        self.tables.write().await.posts.push(post);
    }

    /// Make every ledger write fail with `Unavailable`
    pub fn set_ledger_down(&self, down: bool) {
        self.ledger_down.store(down, Ordering::SeqCst);
    }

    /// Delay every store call by `latency`
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    async fn simulate_io(&self) {
        let ms = self.latency_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }
}

#[async_trait]
impl MissionStore for MemoryStore {
    async fn insert_mission(&self, mission: &Mission) -> Result<()> {
        self.simulate_io().await;
        self.tables
            .write()
            .await
            .missions
            .insert(mission.id, mission.clone());
        Ok(())
    }

    async fn get_mission(&self, id: &ObjectId) -> Result<Option<Mission>> {
        self.simulate_io().await;
        Ok(self.tables.read().await.missions.get(id).cloned())
    }

    async fn list_missions(&self) -> Result<Vec<Mission>> {
        self.simulate_io().await;
        let mut missions: Vec<Mission> =
            self.tables.read().await.missions.values().cloned().collect();
        missions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(missions)
    }

    async fn list_active_missions(&self, now: DateTime<Utc>) -> Result<Vec<Mission>> {
        self.simulate_io().await;
        let mut missions: Vec<Mission> = self
            .tables
            .read()
            .await
            .missions
            .values()
            .filter(|m| m.is_active_at(now))
            .cloned()
            .collect();
        missions.sort_by(|a, b| a.end_date.cmp(&b.end_date));
        Ok(missions)
    }

    async fn add_completion(&self, id: &ObjectId, user_id: &str) -> Result<SetInsert> {
        self.simulate_io().await;
        let mut tables = self.tables.write().await;
        let Some(mission) = tables.missions.get_mut(id) else {
            return Ok(SetInsert::Missing);
        };
        if mission.has_completed(user_id) {
            return Ok(SetInsert::AlreadyPresent);
        }
        mission.completed.push(user_id.to_string());
        Ok(SetInsert::Inserted)
    }

    async fn delete_mission(&self, id: &ObjectId) -> Result<bool> {
        self.simulate_io().await;
        Ok(self.tables.write().await.missions.remove(id).is_some())
    }
}

#[async_trait]
impl ValidationStore for MemoryStore {
    async fn insert_validation(&self, validation: &Validation) -> Result<()> {
        self.simulate_io().await;
        self.tables
            .write()
            .await
            .validations
            .insert(validation.id, validation.clone());
        Ok(())
    }

    async fn get_validation(&self, id: &ObjectId) -> Result<Option<Validation>> {
        self.simulate_io().await;
        Ok(self.tables.read().await.validations.get(id).cloned())
    }

    async fn decide(&self, id: &ObjectId, decision: &Decision) -> Result<bool> {
        self.simulate_io().await;
        let mut tables = self.tables.write().await;
        match tables.validations.get_mut(id) {
            Some(v) if v.status == ValidationStatus::Pending => {
                v.status = decision.status;
                v.validated_by = Some(decision.decided_by.clone());
                v.validated_at = Some(decision.decided_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_by_status(&self, status: ValidationStatus) -> Result<Vec<Validation>> {
        self.simulate_io().await;
        let mut validations: Vec<Validation> = self
            .tables
            .read()
            .await
            .validations
            .values()
            .filter(|v| v.status == status)
            .cloned()
            .collect();
        validations.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));
        Ok(validations)
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Validation>> {
        self.simulate_io().await;
        let mut validations: Vec<Validation> = self
            .tables
            .read()
            .await
            .validations
            .values()
            .filter(|v| v.user_id == user_id)
            .cloned()
            .collect();
        validations.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(validations)
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert_notification(&self, notification: &Notification) -> Result<()> {
        self.simulate_io().await;
        self.tables
            .write()
            .await
            .notifications
            .insert(notification.id, notification.clone());
        Ok(())
    }

    async fn get_notification(&self, id: &ObjectId) -> Result<Option<Notification>> {
        self.simulate_io().await;
        Ok(self.tables.read().await.notifications.get(id).cloned())
    }

    async fn add_viewer(&self, id: &ObjectId, user_id: &str) -> Result<SetInsert> {
        self.simulate_io().await;
        let mut tables = self.tables.write().await;
        let Some(notification) = tables.notifications.get_mut(id) else {
            return Ok(SetInsert::Missing);
        };
        if notification.seen_by(user_id) {
            return Ok(SetInsert::AlreadyPresent);
        }
        notification.visualized.push(user_id.to_string());
        Ok(SetInsert::Inserted)
    }

    async fn list_visible(&self, user_id: &str, limit: usize) -> Result<Vec<Notification>> {
        self.simulate_io().await;
        let mut visible: Vec<Notification> = self
            .tables
            .read()
            .await
            .notifications
            .values()
            .filter(|n| n.target.is_visible_to(user_id))
            .cloned()
            .collect();
        visible.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        visible.truncate(limit);
        Ok(visible)
    }

    async fn delete_notification(&self, id: &ObjectId) -> Result<bool> {
        self.simulate_io().await;
        Ok(self.tables.write().await.notifications.remove(id).is_some())
    }
}

#[async_trait]
impl DeviceTokenStore for MemoryStore {
    async fn upsert_token(
        &self,
        user_id: &str,
        token: &str,
        categories: &[Category],
        at: DateTime<Utc>,
    ) -> Result<DeviceToken> {
        self.simulate_io().await;
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables
            .devices
            .iter_mut()
            .find(|d| d.user_id == user_id && d.device_token == token)
        {
            existing.notification_types = categories.to_vec();
            existing.updated_at = at;
            return Ok(existing.clone());
        }

        let record = DeviceToken {
            id: ObjectId::new(),
            user_id: user_id.to_string(),
            device_token: token.to_string(),
            notification_types: categories.to_vec(),
            updated_at: at,
        };
        tables.devices.push(record.clone());
        Ok(record)
    }

    async fn tokens_for_category(&self, category: Category) -> Result<Vec<DeviceToken>> {
        self.simulate_io().await;
        Ok(self
            .tables
            .read()
            .await
            .devices
            .iter()
            .filter(|d| d.subscribed_to(category))
            .cloned()
            .collect())
    }

    async fn latest_token_for_user(&self, user_id: &str) -> Result<Option<DeviceToken>> {
        self.simulate_io().await;
        Ok(self
            .tables
            .read()
            .await
            .devices
            .iter()
            .filter(|d| d.user_id == user_id)
            .max_by_key(|d| d.updated_at)
            .cloned())
    }
}

#[async_trait]
impl PointsLedger for MemoryStore {
    async fn credit(&self, user_id: &str, amount: i64) -> Result<()> {
        self.simulate_io().await;
        if self.ledger_down.load(Ordering::SeqCst) {
            return Err(EngineError::Unavailable("ledger store unreachable".into()));
        }
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(user_id)
            .ok_or_else(|| EngineError::NotFound(format!("User not found: {}", user_id)))?;
        user.p_total += amount;
        Ok(())
    }

    async fn balance(&self, user_id: &str) -> Result<PointsBalance> {
        self.simulate_io().await;
        self.tables
            .read()
            .await
            .users
            .get(user_id)
            .map(UserProfile::balance)
            .ok_or_else(|| EngineError::NotFound(format!("User not found: {}", user_id)))
    }
}

#[async_trait]
impl FeedReader for MemoryStore {
    async fn latest_post(&self, user_id: &str) -> Result<Option<FeedPost>> {
        self.simulate_io().await;
        Ok(self
            .tables
            .read()
            .await
            .posts
            .iter()
            .filter(|p| p.owner_id == user_id)
            .max_by_key(|p| p.created_at)
            .cloned())
    }
}

#[async_trait]
impl ProfileDirectory for MemoryStore {
    async fn instagram_handle(&self, user_id: &str) -> Result<Option<String>> {
        self.simulate_io().await;
        Ok(self
            .tables
            .read()
            .await
            .users
            .get(user_id)
            .and_then(|u| u.instagram_url.clone())
            .filter(|h| !h.trim().is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::MissionSpec;

    fn mission() -> Mission {
        Mission::new(
            "admin".into(),
            MissionSpec {
                text: "Share the launch post".into(),
                mission_type: "FEEDPOST".into(),
                hashtag: None,
                duration_ms: 7_200_000,
                value: 5,
            },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_add_completion_is_add_if_absent() {
        let store = MemoryStore::new();
        let m = mission();
        store.insert_mission(&m).await.unwrap();

        assert_eq!(store.add_completion(&m.id, "u1").await.unwrap(), SetInsert::Inserted);
        assert_eq!(
            store.add_completion(&m.id, "u1").await.unwrap(),
            SetInsert::AlreadyPresent
        );
        assert_eq!(
            store.add_completion(&ObjectId::new(), "u1").await.unwrap(),
            SetInsert::Missing
        );

        let stored = store.get_mission(&m.id).await.unwrap().unwrap();
        assert_eq!(stored.completed, vec!["u1".to_string()]);
    }

    #[tokio::test]
    async fn test_upsert_token_keeps_one_record() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .upsert_token("u1", "tok", &[Category::Feed], now)
            .await
            .unwrap();
        store
            .upsert_token("u1", "tok", &[Category::Mission], now)
            .await
            .unwrap();

        assert!(store.tokens_for_category(Category::Feed).await.unwrap().is_empty());
        let mission_tokens = store.tokens_for_category(Category::Mission).await.unwrap();
        assert_eq!(mission_tokens.len(), 1);
    }

    #[tokio::test]
    async fn test_credit_requires_known_user() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.credit("ghost", 5).await,
            Err(EngineError::NotFound(_))
        ));

        store.add_user(UserProfile::new("u1")).await;
        store.credit("u1", 5).await.unwrap();
        store.credit("u1", 7).await.unwrap();
        assert_eq!(store.balance("u1").await.unwrap().total, 12);
    }
}
