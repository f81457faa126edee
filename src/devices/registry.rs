//! Device token registry
//!
//! Tracks which push tokens belong to which user and which categories each
//! device wants to hear about. Registration is an idempotent upsert keyed
//! by (user, token).

use std::sync::Arc;

use tracing::{debug, info};

use crate::auth::{authorize, Operation};
use crate::db::schemas::{Category, DeviceToken, ALL_CATEGORIES};
use crate::store::DeviceTokenStore;
use crate::types::{Clock, EngineError, RequestContext, Result};

pub struct DeviceRegistry {
    store: Arc<dyn DeviceTokenStore>,
    clock: Arc<dyn Clock>,
}

impl DeviceRegistry {
    pub fn new(store: Arc<dyn DeviceTokenStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Register (or refresh) the caller's device token.
    ///
    /// An empty category list subscribes the device to every known category.
    pub async fn register(
        &self,
        ctx: &RequestContext,
        token: &str,
        categories: &[Category],
    ) -> Result<DeviceToken> {
        authorize(ctx, Operation::RegisterDeviceToken)?;
        let user_id = ctx.caller()?.user_id.clone();

        let token = token.trim();
        if token.is_empty() {
            return Err(EngineError::InvalidArgument("Device token is required".into()));
        }

        let categories = normalize_categories(categories);
        let now = self.clock.now();

        let record = ctx
            .within(
                "register device token",
                self.store.upsert_token(&user_id, token, &categories, now),
            )
            .await?;

        info!(
            request_id = %ctx.request_id,
            user_id = %user_id,
            categories = ?categories,
            "Device token registered"
        );
        Ok(record)
    }

    /// Every token subscribed to `category`
    pub async fn tokens_for_category(
        &self,
        ctx: &RequestContext,
        category: Category,
    ) -> Result<Vec<DeviceToken>> {
        let tokens = ctx
            .within(
                "load category tokens",
                self.store.tokens_for_category(category),
            )
            .await?;
        debug!(category = %category, count = tokens.len(), "Resolved broadcast tokens");
        Ok(tokens)
    }

    /// The token used for private delivery to `user_id`
    pub async fn token_for_user(&self, ctx: &RequestContext, user_id: &str) -> Result<DeviceToken> {
        ctx.within("load user token", self.store.latest_token_for_user(user_id))
            .await?
            .ok_or_else(|| {
                EngineError::NotFound(format!("No device token registered for user {}", user_id))
            })
    }
}

/// Default empty lists to every category and drop duplicates
fn normalize_categories(categories: &[Category]) -> Vec<Category> {
    if categories.is_empty() {
        return ALL_CATEGORIES.to_vec();
    }
    let mut unique = Vec::with_capacity(categories.len());
    for category in categories {
        if !unique.contains(category) {
            unique.push(*category);
        }
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Caller, Role};
    use crate::store::MemoryStore;
    use crate::types::SystemClock;

    fn registry() -> DeviceRegistry {
        DeviceRegistry::new(Arc::new(MemoryStore::new()), Arc::new(SystemClock))
    }

    fn member(id: &str) -> RequestContext {
        RequestContext::new(Caller::new(id, Role::User, "member"))
    }

    #[tokio::test]
    async fn test_empty_categories_default_to_all() {
        let registry = registry();
        let record = registry.register(&member("u1"), "tok-1", &[]).await.unwrap();
        assert_eq!(record.notification_types, ALL_CATEGORIES.to_vec());
    }

    #[tokio::test]
    async fn test_reregistration_replaces_categories() {
        let registry = registry();
        let ctx = member("u1");
        registry
            .register(&ctx, "tok-1", &[Category::Feed, Category::Feed])
            .await
            .unwrap();
        registry
            .register(&ctx, "tok-1", &[Category::Birthday])
            .await
            .unwrap();

        let feed = registry.tokens_for_category(&ctx, Category::Feed).await.unwrap();
        let birthday = registry
            .tokens_for_category(&ctx, Category::Birthday)
            .await
            .unwrap();
        assert!(feed.is_empty());
        assert_eq!(birthday.len(), 1);
        assert_eq!(birthday[0].notification_types, vec![Category::Birthday]);
    }

    #[tokio::test]
    async fn test_token_for_user_missing() {
        let registry = registry();
        let result = registry.token_for_user(&member("u1"), "nobody").await;
        assert!(matches!(result, Err(EngineError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_register_requires_caller_and_token() {
        let registry = registry();
        assert!(matches!(
            registry
                .register(&RequestContext::anonymous(), "tok", &[])
                .await,
            Err(EngineError::Unauthorized(_))
        ));
        assert!(matches!(
            registry.register(&member("u1"), "   ", &[]).await,
            Err(EngineError::InvalidArgument(_))
        ));
    }
}
