//! Notification dispatcher
//!
//! Persists a notification first and only then attempts delivery, so a
//! push outage never loses the in-app record. Delivery outcome is reported
//! alongside the stored notification; a delivery that could not happen at
//! all surfaces as `PartialFailure`.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::push::{PushMessage, PushProvider};
use crate::auth::{authorize, Operation};
use crate::db::schemas::{Notification, NotificationTarget};
use crate::devices::DeviceRegistry;
use crate::store::{NotificationStore, SetInsert};
use crate::types::{parse_object_id, Clock, EngineError, RequestContext, Result};

/// Hard cap on notifications returned by one list call
pub const MAX_LIST_LIMIT: usize = 50;

/// Title used when none is configured
pub const DEFAULT_TITLE: &str = "Nova Notificação";

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Push title for every notification
    pub title: String,
    /// Default (and maximum) list size
    pub list_limit: usize,
    /// Upper bound on one push call (default: 5 seconds)
    pub push_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            list_limit: MAX_LIST_LIMIT,
            push_timeout: Duration::from_secs(5),
        }
    }
}

/// How delivery went for one notification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    /// Distinct tokens the push was addressed to
    pub recipients: usize,
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotifyOutcome {
    pub notification: Notification,
    pub delivery: DeliveryReport,
}

pub struct NotificationDispatcher {
    store: Arc<dyn NotificationStore>,
    devices: Arc<DeviceRegistry>,
    push: Arc<dyn PushProvider>,
    clock: Arc<dyn Clock>,
    config: DispatcherConfig,
}

impl NotificationDispatcher {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        devices: Arc<DeviceRegistry>,
        push: Arc<dyn PushProvider>,
        clock: Arc<dyn Clock>,
        config: DispatcherConfig,
    ) -> Self {
        let list_limit = config.list_limit.clamp(1, MAX_LIST_LIMIT);
        Self {
            store,
            devices,
            push,
            clock,
            config: DispatcherConfig {
                list_limit,
                ..config
            },
        }
    }

    /// Create and deliver a notification (admin only)
    pub async fn notify(
        &self,
        ctx: &RequestContext,
        text: &str,
        target: NotificationTarget,
    ) -> Result<NotifyOutcome> {
        authorize(ctx, Operation::CreateNotification)?;
        self.dispatch(ctx, text, target).await
    }

    /// Create and deliver a notification on behalf of the engine itself.
    ///
    /// Used by mission and validation flows; skips the role check.
    pub(crate) async fn dispatch(
        &self,
        ctx: &RequestContext,
        text: &str,
        target: NotificationTarget,
    ) -> Result<NotifyOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Err(EngineError::InvalidArgument(
                "Notification text is required".into(),
            ));
        }
        if let NotificationTarget::User(user_id) = &target {
            if user_id.trim().is_empty() {
                return Err(EngineError::InvalidArgument(
                    "Target user id is required".into(),
                ));
            }
        }

        let notification = Notification::new(text.to_string(), target, self.clock.now());
        ctx.within(
            "store notification",
            self.store.insert_notification(&notification),
        )
        .await?;

        info!(
            request_id = %ctx.request_id,
            notification_id = %notification.id,
            target = %notification.target,
            "Notification stored"
        );

        match self.deliver(ctx, &notification).await {
            Ok(delivery) => Ok(NotifyOutcome {
                notification,
                delivery,
            }),
            Err(reason) => {
                warn!(
                    request_id = %ctx.request_id,
                    notification_id = %notification.id,
                    reason = %reason,
                    "Notification stored but not delivered"
                );
                Err(EngineError::partial(
                    format!("notification {} stored", notification.id),
                    format!("delivery failed: {}", reason),
                ))
            }
        }
    }

    /// Dispatch and swallow any failure after logging it
    pub(crate) async fn dispatch_best_effort(
        &self,
        ctx: &RequestContext,
        text: &str,
        target: NotificationTarget,
    ) {
        if let Err(e) = self.dispatch(ctx, text, target).await {
            warn!(request_id = %ctx.request_id, error = %e, "Best-effort notification failed");
        }
    }

    /// Resolve recipients and push. `Err` carries why nothing was delivered.
    async fn deliver(
        &self,
        ctx: &RequestContext,
        notification: &Notification,
    ) -> std::result::Result<DeliveryReport, String> {
        let mut tokens: Vec<String> = match &notification.target {
            NotificationTarget::Category(category) => self
                .devices
                .tokens_for_category(ctx, *category)
                .await
                .map_err(|e| e.to_string())?
                .into_iter()
                .map(|d| d.device_token)
                .collect(),
            NotificationTarget::User(user_id) => {
                let device = self
                    .devices
                    .token_for_user(ctx, user_id)
                    .await
                    .map_err(|e| e.to_string())?;
                vec![device.device_token]
            }
        };
        tokens.sort();
        tokens.dedup();

        if tokens.is_empty() {
            debug!(notification_id = %notification.id, "No subscribed devices");
            return Ok(DeliveryReport::default());
        }

        let message = PushMessage {
            title: self.config.title.clone(),
            body: notification.text.clone(),
        };
        let limit = self.config.push_timeout.min(ctx.timeout);

        let report = match tokio::time::timeout(limit, self.push.send_multicast(&tokens, &message))
            .await
        {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => return Err(e.to_string()),
            Err(_) => return Err(format!("push timed out after {}ms", limit.as_millis())),
        };

        info!(
            notification_id = %notification.id,
            recipients = tokens.len(),
            delivered = report.success,
            failed = report.failure,
            "Notification pushed"
        );

        Ok(DeliveryReport {
            recipients: tokens.len(),
            delivered: report.success,
            failed: report.failure,
        })
    }

    /// Mark a notification as seen by the caller
    pub async fn acknowledge(&self, ctx: &RequestContext, notification_id: &str) -> Result<()> {
        authorize(ctx, Operation::AcknowledgeNotification)?;
        let user_id = ctx.caller()?.user_id.clone();
        let id = parse_object_id("notification", notification_id)?;

        let notification = ctx
            .within("load notification", self.store.get_notification(&id))
            .await?
            .filter(|n| n.target.is_visible_to(&user_id))
            .ok_or_else(|| {
                EngineError::NotFound(format!("Notification not found: {}", notification_id))
            })?;

        match ctx
            .within("acknowledge notification", self.store.add_viewer(&notification.id, &user_id))
            .await?
        {
            SetInsert::Inserted => {
                debug!(notification_id = %id, user_id = %user_id, "Notification acknowledged");
                Ok(())
            }
            SetInsert::AlreadyPresent => Err(EngineError::Conflict(format!(
                "Notification {} already viewed by {}",
                notification_id, user_id
            ))),
            SetInsert::Missing => Err(EngineError::NotFound(format!(
                "Notification not found: {}",
                notification_id
            ))),
        }
    }

    /// Notifications visible to the caller, newest first
    pub async fn list(&self, ctx: &RequestContext, limit: Option<usize>) -> Result<Vec<Notification>> {
        authorize(ctx, Operation::ListNotifications)?;
        let user_id = ctx.caller()?.user_id.clone();
        let limit = match limit {
            Some(0) => {
                return Err(EngineError::InvalidArgument(
                    "Notification limit must be at least 1".into(),
                ))
            }
            Some(limit) => limit.min(self.config.list_limit),
            None => self.config.list_limit,
        };

        ctx.within("list notifications", self.store.list_visible(&user_id, limit))
            .await
    }

    /// Remove a notification (admin only)
    pub async fn delete(&self, ctx: &RequestContext, notification_id: &str) -> Result<()> {
        authorize(ctx, Operation::DeleteNotification)?;
        let id = parse_object_id("notification", notification_id)?;

        let removed = ctx
            .within("delete notification", self.store.delete_notification(&id))
            .await?;
        if !removed {
            return Err(EngineError::NotFound(format!(
                "Notification not found: {}",
                notification_id
            )));
        }
        info!(request_id = %ctx.request_id, notification_id = %id, "Notification deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Caller, Role};
    use crate::db::schemas::Category;
    use crate::notify::push::{PushError, PushReport};
    use crate::store::MemoryStore;
    use crate::types::SystemClock;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingPush {
        calls: Mutex<Vec<Vec<String>>>,
        fail: bool,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl PushProvider for RecordingPush {
        async fn send_multicast(
            &self,
            tokens: &[String],
            _message: &PushMessage,
        ) -> std::result::Result<PushReport, PushError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.calls.lock().unwrap().push(tokens.to_vec());
            if self.fail {
                return Err(PushError::Network("connection refused".into()));
            }
            Ok(PushReport {
                success: tokens.len(),
                failure: 0,
            })
        }
    }

    struct Fixture {
        dispatcher: NotificationDispatcher,
        devices: Arc<DeviceRegistry>,
        push: Arc<RecordingPush>,
    }

    fn fixture(push: RecordingPush) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(SystemClock);
        let devices = Arc::new(DeviceRegistry::new(store.clone(), clock.clone()));
        let push = Arc::new(push);
        let dispatcher = NotificationDispatcher::new(
            store,
            devices.clone(),
            push.clone(),
            clock,
            DispatcherConfig::default(),
        );
        Fixture {
            dispatcher,
            devices,
            push,
        }
    }

    fn admin() -> RequestContext {
        RequestContext::new(Caller::new("admin", Role::Admin, "Admin"))
    }

    fn member(id: &str) -> RequestContext {
        RequestContext::new(Caller::new(id, Role::User, id))
    }

    #[tokio::test]
    async fn test_category_broadcast_reaches_subscribers_only() {
        let f = fixture(RecordingPush::default());
        f.devices
            .register(&member("u1"), "tok-feed", &[Category::Feed])
            .await
            .unwrap();
        f.devices
            .register(&member("u2"), "tok-bday", &[Category::Birthday])
            .await
            .unwrap();

        let outcome = f
            .dispatcher
            .notify(&admin(), "New post", NotificationTarget::Category(Category::Feed))
            .await
            .unwrap();

        assert_eq!(outcome.delivery.recipients, 1);
        let calls = f.push.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], vec!["tok-feed".to_string()]);
    }

    #[tokio::test]
    async fn test_private_notification_uses_one_token() {
        let f = fixture(RecordingPush::default());
        f.devices.register(&member("u1"), "tok-old", &[]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        f.devices.register(&member("u1"), "tok-new", &[]).await.unwrap();

        let outcome = f
            .dispatcher
            .notify(&admin(), "Your mission was validated", NotificationTarget::User("u1".into()))
            .await
            .unwrap();

        assert_eq!(outcome.delivery.recipients, 1);
        assert_eq!(f.push.calls.lock().unwrap()[0], vec!["tok-new".to_string()]);
    }

    #[tokio::test]
    async fn test_private_without_token_is_partial_failure_but_persisted() {
        let f = fixture(RecordingPush::default());
        let result = f
            .dispatcher
            .notify(&admin(), "hello", NotificationTarget::User("u9".into()))
            .await;
        assert!(matches!(result, Err(EngineError::PartialFailure { .. })));

        let listed = f.dispatcher.list(&member("u9"), None).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(f.push.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_is_partial_failure() {
        let f = fixture(RecordingPush {
            fail: true,
            ..Default::default()
        });
        f.devices.register(&member("u1"), "tok", &[]).await.unwrap();

        let result = f
            .dispatcher
            .notify(&admin(), "hello", NotificationTarget::Category(Category::Mission))
            .await;
        assert!(matches!(result, Err(EngineError::PartialFailure { .. })));
    }

    #[tokio::test]
    async fn test_slow_provider_times_out_as_partial_failure() {
        let f = fixture(RecordingPush {
            delay: Some(Duration::from_millis(500)),
            ..Default::default()
        });
        f.devices.register(&member("u1"), "tok", &[]).await.unwrap();

        let ctx = admin().with_timeout(Duration::from_millis(50));
        let result = f
            .dispatcher
            .notify(&ctx, "hello", NotificationTarget::Category(Category::Feed))
            .await;
        assert!(matches!(result, Err(EngineError::PartialFailure { .. })));
    }

    #[tokio::test]
    async fn test_acknowledge_twice_conflicts() {
        let f = fixture(RecordingPush::default());
        let outcome = f
            .dispatcher
            .notify(&admin(), "hello", NotificationTarget::Category(Category::All))
            .await
            .unwrap();
        let id = outcome.notification.id.to_hex();

        f.dispatcher.acknowledge(&member("u1"), &id).await.unwrap();
        let again = f.dispatcher.acknowledge(&member("u1"), &id).await;
        assert!(matches!(again, Err(EngineError::Conflict(_))));

        let listed = f.dispatcher.list(&member("u1"), None).await.unwrap();
        assert_eq!(listed[0].visualized, vec!["u1".to_string()]);
    }

    #[tokio::test]
    async fn test_private_notifications_hidden_from_others() {
        let f = fixture(RecordingPush::default());
        let _ = f
            .dispatcher
            .notify(&admin(), "just for u1", NotificationTarget::User("u1".into()))
            .await;

        assert!(f.dispatcher.list(&member("u2"), None).await.unwrap().is_empty());
        assert_eq!(f.dispatcher.list(&member("u1"), None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_limit_is_capped() {
        let f = fixture(RecordingPush::default());
        for i in 0..(MAX_LIST_LIMIT + 5) {
            f.dispatcher
                .notify(&admin(), &format!("n{}", i), NotificationTarget::Category(Category::Feed))
                .await
                .unwrap();
        }

        let listed = f.dispatcher.list(&member("u1"), Some(500)).await.unwrap();
        assert_eq!(listed.len(), MAX_LIST_LIMIT);
        let few = f.dispatcher.list(&member("u1"), Some(3)).await.unwrap();
        assert_eq!(few.len(), 3);
    }

    #[tokio::test]
    async fn test_list_zero_limit_is_invalid() {
        let f = fixture(RecordingPush::default());
        f.dispatcher
            .notify(&admin(), "hello", NotificationTarget::Category(Category::Feed))
            .await
            .unwrap();

        let result = f.dispatcher.list(&member("u1"), Some(0)).await;
        assert!(matches!(result, Err(EngineError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_notify_and_delete_require_admin() {
        let f = fixture(RecordingPush::default());
        let result = f
            .dispatcher
            .notify(&member("u1"), "hi", NotificationTarget::Category(Category::Feed))
            .await;
        assert!(matches!(result, Err(EngineError::Forbidden(_))));

        let missing = f
            .dispatcher
            .delete(&admin(), &bson::oid::ObjectId::new().to_hex())
            .await;
        assert!(matches!(missing, Err(EngineError::NotFound(_))));
    }
}
