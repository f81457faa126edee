//! MongoDB implementations of the store traits

use async_trait::async_trait;
use bson::{doc, oid::ObjectId};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::db::schemas::{
    Category, Decision, DeviceToken, FeedPost, Mission, Notification, PointsBalance,
    UserProfile, Validation, ValidationStatus, DEVICE_TOKEN_COLLECTION, MISSION_COLLECTION,
    NOTIFICATION_COLLECTION, POST_COLLECTION, USER_COLLECTION, VALIDATION_COLLECTION,
};
use crate::db::{MongoClient, MongoCollection};
use crate::ledger::PointsLedger;
use crate::store::{
    DeviceTokenStore, FeedReader, MissionStore, NotificationStore, ProfileDirectory, SetInsert,
    ValidationStore,
};
use crate::types::{EngineError, Result};

/// Every store trait backed by MongoDB collections
#[derive(Clone)]
pub struct MongoStore {
    missions: MongoCollection<Mission>,
    validations: MongoCollection<Validation>,
    notifications: MongoCollection<Notification>,
    devices: MongoCollection<DeviceToken>,
    users: MongoCollection<UserProfile>,
    posts: MongoCollection<FeedPost>,
}

impl MongoStore {
    /// Open all collections and apply their indexes
    pub async fn open(mongo: &MongoClient) -> Result<Self> {
        Ok(Self {
            missions: mongo.collection(MISSION_COLLECTION).await?,
            validations: mongo.collection(VALIDATION_COLLECTION).await?,
            notifications: mongo.collection(NOTIFICATION_COLLECTION).await?,
            devices: mongo.collection(DEVICE_TOKEN_COLLECTION).await?,
            users: mongo.collection(USER_COLLECTION).await?,
            posts: mongo.collection(POST_COLLECTION).await?,
        })
    }
}

#[async_trait]
impl MissionStore for MongoStore {
    async fn insert_mission(&self, mission: &Mission) -> Result<()> {
        self.missions.insert_one(mission).await
    }

    async fn get_mission(&self, id: &ObjectId) -> Result<Option<Mission>> {
        self.missions.find_one(doc! { "_id": *id }).await
    }

    async fn list_missions(&self) -> Result<Vec<Mission>> {
        self.missions
            .find_many(doc! {}, doc! { "createdAt": -1 }, None)
            .await
    }

    async fn list_active_missions(&self, now: DateTime<Utc>) -> Result<Vec<Mission>> {
        self.missions
            .find_many(
                doc! { "endDate": { "$gt": bson::DateTime::from_chrono(now) } },
                doc! { "endDate": 1 },
                None,
            )
            .await
    }

    async fn add_completion(&self, id: &ObjectId, user_id: &str) -> Result<SetInsert> {
        let result = self
            .missions
            .update_one(
                doc! { "_id": *id, "completed": { "$ne": user_id } },
                doc! { "$addToSet": { "completed": user_id } },
            )
            .await?;

        if result.modified_count > 0 {
            return Ok(SetInsert::Inserted);
        }

        debug!(mission_id = %id, user_id = %user_id, "Completion write matched nothing");
        match self.get_mission(id).await? {
            Some(_) => Ok(SetInsert::AlreadyPresent),
            None => Ok(SetInsert::Missing),
        }
    }

    async fn delete_mission(&self, id: &ObjectId) -> Result<bool> {
        Ok(self.missions.delete_one(doc! { "_id": *id }).await? > 0)
    }
}

#[async_trait]
impl ValidationStore for MongoStore {
    async fn insert_validation(&self, validation: &Validation) -> Result<()> {
        self.validations.insert_one(validation).await
    }

    async fn get_validation(&self, id: &ObjectId) -> Result<Option<Validation>> {
        self.validations.find_one(doc! { "_id": *id }).await
    }

    async fn decide(&self, id: &ObjectId, decision: &Decision) -> Result<bool> {
        let result = self
            .validations
            .update_one(
                doc! { "_id": *id, "status": ValidationStatus::Pending.as_str() },
                doc! {
                    "$set": {
                        "status": decision.status.as_str(),
                        "validatedBy": decision.decided_by.as_str(),
                        "validatedAt": bson::DateTime::from_chrono(decision.decided_at),
                    }
                },
            )
            .await?;

        Ok(result.modified_count > 0)
    }

    async fn list_by_status(&self, status: ValidationStatus) -> Result<Vec<Validation>> {
        self.validations
            .find_many(
                doc! { "status": status.as_str() },
                doc! { "submittedAt": 1 },
                None,
            )
            .await
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Validation>> {
        self.validations
            .find_many(
                doc! { "userId": user_id },
                doc! { "submittedAt": -1 },
                None,
            )
            .await
    }
}

#[async_trait]
impl NotificationStore for MongoStore {
    async fn insert_notification(&self, notification: &Notification) -> Result<()> {
        self.notifications.insert_one(notification).await
    }

    async fn get_notification(&self, id: &ObjectId) -> Result<Option<Notification>> {
        self.notifications.find_one(doc! { "_id": *id }).await
    }

    async fn add_viewer(&self, id: &ObjectId, user_id: &str) -> Result<SetInsert> {
        let result = self
            .notifications
            .update_one(
                doc! { "_id": *id, "visualized": { "$ne": user_id } },
                doc! { "$addToSet": { "visualized": user_id } },
            )
            .await?;

        if result.modified_count > 0 {
            return Ok(SetInsert::Inserted);
        }

        match self.get_notification(id).await? {
            Some(_) => Ok(SetInsert::AlreadyPresent),
            None => Ok(SetInsert::Missing),
        }
    }

    async fn list_visible(&self, user_id: &str, limit: usize) -> Result<Vec<Notification>> {
        self.notifications
            .find_many(
                doc! {
                    "$or": [
                        { "target.kind": "category" },
                        { "target.kind": "user", "target.value": user_id },
                    ]
                },
                doc! { "createdAt": -1 },
                Some(limit as i64),
            )
            .await
    }

    async fn delete_notification(&self, id: &ObjectId) -> Result<bool> {
        Ok(self.notifications.delete_one(doc! { "_id": *id }).await? > 0)
    }
}

#[async_trait]
impl DeviceTokenStore for MongoStore {
    async fn upsert_token(
        &self,
        user_id: &str,
        token: &str,
        categories: &[Category],
        at: DateTime<Utc>,
    ) -> Result<DeviceToken> {
        let types: Vec<&str> = categories.iter().map(Category::as_str).collect();

        self.devices
            .upsert_returning(
                doc! { "userId": user_id, "deviceToken": token },
                doc! {
                    "$set": {
                        "userId": user_id,
                        "deviceToken": token,
                        "notificationTypes": types,
                        "updatedAt": bson::DateTime::from_chrono(at),
                    }
                },
            )
            .await?
            .ok_or_else(|| EngineError::Unavailable("Device token upsert returned nothing".into()))
    }

    async fn tokens_for_category(&self, category: Category) -> Result<Vec<DeviceToken>> {
        self.devices
            .find_many(
                doc! {
                    "$or": [
                        { "notificationTypes": category.as_str() },
                        { "notificationTypes": { "$size": 0 } },
                        { "notificationTypes": { "$exists": false } },
                    ]
                },
                doc! { "updatedAt": -1 },
                None,
            )
            .await
    }

    async fn latest_token_for_user(&self, user_id: &str) -> Result<Option<DeviceToken>> {
        self.devices
            .find_first(doc! { "userId": user_id }, doc! { "updatedAt": -1 })
            .await
    }
}

#[async_trait]
impl PointsLedger for MongoStore {
    async fn credit(&self, user_id: &str, amount: i64) -> Result<()> {
        let result = self
            .users
            .update_one(doc! { "uid": user_id }, doc! { "$inc": { "pTotal": amount } })
            .await?;

        if result.matched_count == 0 {
            return Err(EngineError::NotFound(format!("User not found: {}", user_id)));
        }
        Ok(())
    }

    async fn balance(&self, user_id: &str) -> Result<PointsBalance> {
        self.users
            .find_one(doc! { "uid": user_id })
            .await?
            .map(|u| u.balance())
            .ok_or_else(|| EngineError::NotFound(format!("User not found: {}", user_id)))
    }
}

#[async_trait]
impl FeedReader for MongoStore {
    async fn latest_post(&self, user_id: &str) -> Result<Option<FeedPost>> {
        self.posts
            .find_first(doc! { "ownerId": user_id }, doc! { "createdAt": -1 })
            .await
    }
}

#[async_trait]
impl ProfileDirectory for MongoStore {
    async fn instagram_handle(&self, user_id: &str) -> Result<Option<String>> {
        Ok(self
            .users
            .find_one(doc! { "uid": user_id })
            .await?
            .and_then(|u| u.instagram_url)
            .filter(|h| !h.trim().is_empty()))
    }
}
