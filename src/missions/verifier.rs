//! Completion verifiers
//!
//! Each mission type tag maps to a [`CompletionVerifier`] that decides
//! whether a user has satisfied the mission. Verifiers only observe; the
//! lifecycle service performs the completion write.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::db::schemas::{FeedPost, Mission};
use crate::store::FeedReader;
use crate::types::Result;

pub const FEED_POST: &str = "FEEDPOST";
pub const FEED_HASHTAG: &str = "FEEDHASHTAG";
pub const FEED_IMAGE: &str = "FEEDIMAGE";
pub const INSTAGRAM_STORY: &str = "INSTAGRAMSTORY";

/// Outcome of evaluating a completion condition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub met: bool,
    /// Why the condition was not met
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

impl Verdict {
    pub fn met() -> Self {
        Self {
            met: true,
            diagnostic: None,
        }
    }

    pub fn unmet(diagnostic: impl Into<String>) -> Self {
        Self {
            met: false,
            diagnostic: Some(diagnostic.into()),
        }
    }
}

#[async_trait]
pub trait CompletionVerifier: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    async fn evaluate(&self, mission: &Mission, user_id: &str) -> Result<Verdict>;
}

/// Mission type tag -> verifier
#[derive(Default, Clone)]
pub struct VerifierRegistry {
    verifiers: HashMap<String, Arc<dyn CompletionVerifier>>,
}

impl VerifierRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the three feed verifiers installed
    pub fn with_feed_verifiers(feed: Arc<dyn FeedReader>, image_requires_fresh: bool) -> Self {
        let mut registry = Self::new();
        registry.register(FEED_POST, Arc::new(LatestPostVerifier::new(feed.clone())));
        registry.register(FEED_HASHTAG, Arc::new(HashtagPostVerifier::new(feed.clone())));
        registry.register(
            FEED_IMAGE,
            Arc::new(ImagePostVerifier::new(feed).require_fresh(image_requires_fresh)),
        );
        registry
    }

    /// Install (or replace) the verifier for `mission_type`
    pub fn register(&mut self, mission_type: &str, verifier: Arc<dyn CompletionVerifier>) {
        debug!(mission_type = %mission_type, verifier = verifier.name(), "Verifier registered");
        self.verifiers.insert(mission_type.to_string(), verifier);
    }

    pub fn get(&self, mission_type: &str) -> Option<Arc<dyn CompletionVerifier>> {
        self.verifiers.get(mission_type).cloned()
    }

    pub fn mission_types(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.verifiers.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }
}

async fn latest_post_after(
    feed: &dyn FeedReader,
    mission: &Mission,
    user_id: &str,
) -> Result<std::result::Result<FeedPost, Verdict>> {
    let Some(post) = feed.latest_post(user_id).await? else {
        return Ok(Err(Verdict::unmet("No feed post found")));
    };
    if post.created_at <= mission.created_at {
        return Ok(Err(Verdict::unmet(
            "Latest feed post predates the mission",
        )));
    }
    Ok(Ok(post))
}

/// Met when the user's latest post was created after the mission
pub struct LatestPostVerifier {
    feed: Arc<dyn FeedReader>,
}

impl LatestPostVerifier {
    pub fn new(feed: Arc<dyn FeedReader>) -> Self {
        Self { feed }
    }
}

#[async_trait]
impl CompletionVerifier for LatestPostVerifier {
    fn name(&self) -> &'static str {
        "latest-feed-post"
    }

    async fn evaluate(&self, mission: &Mission, user_id: &str) -> Result<Verdict> {
        Ok(match latest_post_after(self.feed.as_ref(), mission, user_id).await? {
            Ok(_) => Verdict::met(),
            Err(unmet) => unmet,
        })
    }
}

/// Like [`LatestPostVerifier`], and the post must carry the mission hashtag
/// when one is set
pub struct HashtagPostVerifier {
    feed: Arc<dyn FeedReader>,
}

impl HashtagPostVerifier {
    pub fn new(feed: Arc<dyn FeedReader>) -> Self {
        Self { feed }
    }
}

#[async_trait]
impl CompletionVerifier for HashtagPostVerifier {
    fn name(&self) -> &'static str {
        "latest-feed-hashtag"
    }

    async fn evaluate(&self, mission: &Mission, user_id: &str) -> Result<Verdict> {
        let post = match latest_post_after(self.feed.as_ref(), mission, user_id).await? {
            Ok(post) => post,
            Err(unmet) => return Ok(unmet),
        };

        match mission.hashtag.as_deref() {
            None => Ok(Verdict::met()),
            Some(tag) if post.has_hashtag(tag) => Ok(Verdict::met()),
            Some(tag) => Ok(Verdict::unmet(format!(
                "Latest feed post does not carry #{}",
                tag.trim_start_matches('#')
            ))),
        }
    }
}

/// Met when the user's latest post has an image.
///
/// Post age is ignored unless `require_fresh` is set, so an image posted
/// before the mission started still counts.
pub struct ImagePostVerifier {
    feed: Arc<dyn FeedReader>,
    require_fresh: bool,
}

impl ImagePostVerifier {
    pub fn new(feed: Arc<dyn FeedReader>) -> Self {
        Self {
            feed,
            require_fresh: false,
        }
    }

    pub fn require_fresh(mut self, enabled: bool) -> Self {
        self.require_fresh = enabled;
        self
    }
}

#[async_trait]
impl CompletionVerifier for ImagePostVerifier {
    fn name(&self) -> &'static str {
        "latest-feed-image"
    }

    async fn evaluate(&self, mission: &Mission, user_id: &str) -> Result<Verdict> {
        let post = if self.require_fresh {
            match latest_post_after(self.feed.as_ref(), mission, user_id).await? {
                Ok(post) => post,
                Err(unmet) => return Ok(unmet),
            }
        } else {
            match self.feed.latest_post(user_id).await? {
                Some(post) => post,
                None => return Ok(Verdict::unmet("No feed post found")),
            }
        };

        if post.has_image() {
            Ok(Verdict::met())
        } else {
            Ok(Verdict::unmet("Latest feed post has no image"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::MissionSpec;
    use crate::store::MemoryStore;
    use chrono::{Duration, Utc};

    fn mission(mission_type: &str, hashtag: Option<&str>) -> Mission {
        Mission::new(
            "admin".into(),
            MissionSpec {
                text: "Show us your weekend".into(),
                mission_type: mission_type.into(),
                hashtag: hashtag.map(String::from),
                duration_ms: 7_200_000,
                value: 10,
            },
            Utc::now(),
        )
    }

    fn post(user: &str, age: Duration, hashtags: &[&str], image: &str) -> FeedPost {
        FeedPost {
            owner_id: user.into(),
            created_at: Utc::now() + age,
            hashtags: hashtags.iter().map(|h| h.to_string()).collect(),
            image_url: image.into(),
        }
    }

    #[tokio::test]
    async fn test_latest_post_must_follow_mission() {
        let store = Arc::new(MemoryStore::new());
        let verifier = LatestPostVerifier::new(store.clone());
        let m = mission(FEED_POST, None);

        let none = verifier.evaluate(&m, "u1").await.unwrap();
        assert!(!none.met);

        store.add_post(post("u1", Duration::hours(-1), &[], "")).await;
        assert!(!verifier.evaluate(&m, "u1").await.unwrap().met);

        store.add_post(post("u1", Duration::minutes(1), &[], "")).await;
        assert_eq!(verifier.evaluate(&m, "u1").await.unwrap(), Verdict::met());
    }

    #[tokio::test]
    async fn test_hashtag_requirement() {
        let store = Arc::new(MemoryStore::new());
        let verifier = HashtagPostVerifier::new(store.clone());
        store
            .add_post(post("u1", Duration::minutes(1), &["summer"], ""))
            .await;

        assert!(verifier.evaluate(&mission(FEED_HASHTAG, None), "u1").await.unwrap().met);
        assert!(
            verifier
                .evaluate(&mission(FEED_HASHTAG, Some("summer")), "u1")
                .await
                .unwrap()
                .met
        );

        let verdict = verifier
            .evaluate(&mission(FEED_HASHTAG, Some("winter")), "u1")
            .await
            .unwrap();
        assert!(!verdict.met);
        assert!(verdict.diagnostic.unwrap().contains("winter"));
    }

    #[tokio::test]
    async fn test_image_ignores_age_unless_fresh_required() {
        let store = Arc::new(MemoryStore::new());
        store
            .add_post(post("u1", Duration::hours(-5), &[], "https://cdn/x.jpg"))
            .await;
        let m = mission(FEED_IMAGE, None);

        let lenient = ImagePostVerifier::new(store.clone());
        assert!(lenient.evaluate(&m, "u1").await.unwrap().met);

        let strict = ImagePostVerifier::new(store.clone()).require_fresh(true);
        assert!(!strict.evaluate(&m, "u1").await.unwrap().met);
    }

    #[test]
    fn test_registry_defaults() {
        let registry = VerifierRegistry::with_feed_verifiers(Arc::new(MemoryStore::new()), false);
        assert_eq!(registry.mission_types(), vec![FEED_HASHTAG, FEED_IMAGE, FEED_POST]);
        assert!(registry.get(INSTAGRAM_STORY).is_none());
        assert_eq!(registry.get(FEED_IMAGE).unwrap().name(), "latest-feed-image");
    }
}
