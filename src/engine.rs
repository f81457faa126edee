//! Engine composition
//!
//! Wires the storage backend, push transport, social feed provider and
//! clock into the mission, validation, notification and device services.
//! Every collaborator is injected; nothing reaches for global handles.

use std::sync::Arc;

use tracing::info;

use crate::auth::{authorize, Operation};
use crate::db::schemas::PointsBalance;
use crate::db::MongoStore;
use crate::devices::DeviceRegistry;
use crate::ledger::PointsLedger;
use crate::missions::verifier::INSTAGRAM_STORY;
use crate::missions::{
    CompletionRecorder, ExternalMentionVerifier, MissionLifecycle, SocialFeedProvider,
    UnconfiguredFeedProvider, VerifierRegistry, DEFAULT_MENTION_MARKER,
};
use crate::notify::{DispatcherConfig, LogPushProvider, NotificationDispatcher, PushProvider};
use crate::store::{
    DeviceTokenStore, FeedReader, MemoryStore, MissionStore, NotificationStore, ProfileDirectory,
    ValidationStore,
};
use crate::types::{Clock, EngineError, RequestContext, Result, SystemClock};
use crate::validation::ValidationService;

/// Storage collaborators, one handle per concern
#[derive(Clone)]
pub struct Stores {
    pub missions: Arc<dyn MissionStore>,
    pub validations: Arc<dyn ValidationStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub devices: Arc<dyn DeviceTokenStore>,
    pub ledger: Arc<dyn PointsLedger>,
    pub feed: Arc<dyn FeedReader>,
    pub profiles: Arc<dyn ProfileDirectory>,
}

impl Stores {
    pub fn memory(store: MemoryStore) -> Self {
        let store = Arc::new(store);
        Self {
            missions: store.clone(),
            validations: store.clone(),
            notifications: store.clone(),
            devices: store.clone(),
            ledger: store.clone(),
            feed: store.clone(),
            profiles: store,
        }
    }

    pub fn mongo(store: MongoStore) -> Self {
        let store = Arc::new(store);
        Self {
            missions: store.clone(),
            validations: store.clone(),
            notifications: store.clone(),
            devices: store.clone(),
            ledger: store.clone(),
            feed: store.clone(),
            profiles: store,
        }
    }
}

/// Behavioural switches for the engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub dispatcher: DispatcherConfig,
    /// Require FEEDIMAGE posts to postdate the mission
    pub image_requires_fresh: bool,
    pub mention_marker: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dispatcher: DispatcherConfig::default(),
            image_requires_fresh: false,
            mention_marker: DEFAULT_MENTION_MARKER.to_string(),
        }
    }
}

pub struct EngineBuilder {
    stores: Stores,
    push: Arc<dyn PushProvider>,
    social: Arc<dyn SocialFeedProvider>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl EngineBuilder {
    pub fn push(mut self, push: Arc<dyn PushProvider>) -> Self {
        self.push = push;
        self
    }

    /// Caption source for INSTAGRAMSTORY missions
    pub fn social_feed(mut self, provider: Arc<dyn SocialFeedProvider>) -> Self {
        self.social = provider;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Engine {
        let Self {
            stores,
            push,
            social,
            clock,
            config,
        } = self;

        let devices = Arc::new(DeviceRegistry::new(stores.devices.clone(), clock.clone()));
        let notifications = Arc::new(NotificationDispatcher::new(
            stores.notifications.clone(),
            devices.clone(),
            push,
            clock.clone(),
            config.dispatcher.clone(),
        ));

        let mut verifiers =
            VerifierRegistry::with_feed_verifiers(stores.feed.clone(), config.image_requires_fresh);
        verifiers.register(
            INSTAGRAM_STORY,
            Arc::new(
                ExternalMentionVerifier::new(stores.profiles.clone(), social)
                    .with_marker(config.mention_marker.clone()),
            ),
        );

        let completions = Arc::new(CompletionRecorder::new(
            stores.missions.clone(),
            stores.ledger.clone(),
        ));

        let missions = MissionLifecycle::new(
            stores.missions.clone(),
            completions.clone(),
            verifiers,
            notifications.clone(),
            clock.clone(),
        );
        let validations = ValidationService::new(
            stores.validations.clone(),
            completions,
            notifications.clone(),
            clock,
        );

        info!(
            mission_types = ?missions.verifiers().mission_types(),
            "Mission engine assembled"
        );

        Engine {
            missions,
            validations,
            notifications,
            devices,
            ledger: stores.ledger,
        }
    }
}

/// The assembled mission engine
pub struct Engine {
    pub missions: MissionLifecycle,
    pub validations: ValidationService,
    pub notifications: Arc<NotificationDispatcher>,
    pub devices: Arc<DeviceRegistry>,
    ledger: Arc<dyn PointsLedger>,
}

impl Engine {
    /// Builder with a log-only push provider, no Instagram credentials and
    /// the system clock
    pub fn builder(stores: Stores) -> EngineBuilder {
        EngineBuilder {
            stores,
            push: Arc::new(LogPushProvider),
            social: Arc::new(UnconfiguredFeedProvider),
            clock: Arc::new(SystemClock),
            config: EngineConfig::default(),
        }
    }

    /// Engine over a fresh in-memory store
    pub fn in_memory(store: MemoryStore) -> Engine {
        Self::builder(Stores::memory(store)).build()
    }

    /// Points counters for `user_id`, or for the caller when `None`.
    /// Only admins may read another member's balance.
    pub async fn points_balance(
        &self,
        ctx: &RequestContext,
        user_id: Option<&str>,
    ) -> Result<PointsBalance> {
        authorize(ctx, Operation::PointsBalance)?;
        let caller = ctx.caller()?;
        let target = user_id.unwrap_or(&caller.user_id);

        if target != caller.user_id && !caller.is_admin() {
            return Err(EngineError::Forbidden(
                "Only admins may read another member's balance".into(),
            ));
        }

        ctx.within("read balance", self.ledger.balance(target)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Caller, Role};
    use crate::db::schemas::UserProfile;

    #[tokio::test]
    async fn test_points_balance_access() {
        let store = MemoryStore::new();
        store.add_user(UserProfile::new("u1")).await;
        store.add_user(UserProfile::new("u2")).await;
        let engine = Engine::in_memory(store);

        let u1 = RequestContext::new(Caller::new("u1", Role::User, "u1"));
        let admin = RequestContext::new(Caller::new("admin", Role::Admin, "Admin"));

        assert_eq!(engine.points_balance(&u1, None).await.unwrap().total, 0);
        assert!(matches!(
            engine.points_balance(&u1, Some("u2")).await,
            Err(EngineError::Forbidden(_))
        ));
        assert!(engine.points_balance(&admin, Some("u2")).await.is_ok());
        assert!(matches!(
            engine.points_balance(&admin, Some("ghost")).await,
            Err(EngineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_instagram_story_without_credentials_is_precondition_failed() {
        let store = MemoryStore::new();
        let mut profile = UserProfile::new("u1");
        profile.instagram_url = Some("member.handle".into());
        store.add_user(profile).await;
        let engine = Engine::in_memory(store);
        assert!(engine.missions.verifiers().get(INSTAGRAM_STORY).is_some());

        let admin = RequestContext::new(Caller::new("admin", Role::Admin, "Admin"));
        let mission = engine
            .missions
            .create(
                &admin,
                crate::db::schemas::MissionSpec {
                    text: "Mention us in a story".into(),
                    mission_type: INSTAGRAM_STORY.into(),
                    hashtag: None,
                    duration_ms: 7_200_000,
                    value: 20,
                },
            )
            .await
            .unwrap();

        let u1 = RequestContext::new(Caller::new("u1", Role::User, "u1"));
        let result = engine
            .missions
            .verify_and_complete(&u1, &mission.id.to_hex())
            .await;
        match result {
            Err(EngineError::PreconditionFailed(diagnostic)) => {
                assert!(diagnostic.contains("not configured"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
