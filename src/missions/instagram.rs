//! External mention verification through the Instagram Graph API
//!
//! A story mission is met when any recent caption on the community's
//! profile mentions the configured marker. The member must have an
//! Instagram profile linked to their account.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, warn};

use super::verifier::{CompletionVerifier, Verdict};
use crate::db::schemas::Mission;
use crate::store::ProfileDirectory;
use crate::types::Result;

/// Mention searched for when none is configured
pub const DEFAULT_MENTION_MARKER: &str = "@sd_nook";

const GRAPH_API_BASE: &str = "https://graph.instagram.com/v16.0";

/// Errors from the social profile provider
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider returned HTTP {0}")]
    Status(u16),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

/// Source of recent post captions for a social profile
#[async_trait]
pub trait SocialFeedProvider: Send + Sync {
    async fn recent_captions(&self) -> std::result::Result<Vec<String>, ProviderError>;
}

/// Stand-in when no Instagram credentials are configured; every lookup
/// fails with [`ProviderError::NotConfigured`]
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredFeedProvider;

#[async_trait]
impl SocialFeedProvider for UnconfiguredFeedProvider {
    async fn recent_captions(&self) -> std::result::Result<Vec<String>, ProviderError> {
        Err(ProviderError::NotConfigured(
            "INSTAGRAM_ID and INSTAGRAM_ACCESS_TOKEN are not set".into(),
        ))
    }
}

#[derive(Debug, Clone)]
pub struct InstagramConfig {
    pub profile_id: String,
    pub access_token: String,
    pub base_url: String,
    /// Timeout for HTTP requests (default: 5 seconds)
    pub request_timeout: Duration,
}

impl InstagramConfig {
    pub fn new(profile_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            profile_id: profile_id.into(),
            access_token: access_token.into(),
            base_url: GRAPH_API_BASE.to_string(),
            request_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Deserialize)]
struct MediaPage {
    #[serde(default)]
    data: Vec<MediaItem>,
}

#[derive(Deserialize)]
struct MediaItem {
    #[serde(default)]
    caption: Option<String>,
}

/// Graph API client listing the media captions of one profile
pub struct InstagramGraphProvider {
    config: InstagramConfig,
    http_client: reqwest::Client,
}

impl InstagramGraphProvider {
    pub fn new(config: InstagramConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent("mission-engine/1.0")
            .build()
            .unwrap_or_default();

        Self {
            config,
            http_client,
        }
    }

    fn media_url(&self) -> std::result::Result<Url, ProviderError> {
        if self.config.profile_id.is_empty() || self.config.access_token.is_empty() {
            return Err(ProviderError::NotConfigured(
                "Instagram profile id and access token are required".into(),
            ));
        }
        let base = format!(
            "{}/{}/media",
            self.config.base_url.trim_end_matches('/'),
            self.config.profile_id
        );
        Url::parse_with_params(
            &base,
            &[
                ("fields", "caption"),
                ("access_token", self.config.access_token.as_str()),
            ],
        )
        .map_err(|e| ProviderError::NotConfigured(e.to_string()))
    }
}

#[async_trait]
impl SocialFeedProvider for InstagramGraphProvider {
    async fn recent_captions(&self) -> std::result::Result<Vec<String>, ProviderError> {
        let url = self.media_url()?;
        debug!(profile_id = %self.config.profile_id, "Fetching Instagram captions");

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ProviderError::Status(response.status().as_u16()));
        }

        let page: MediaPage = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        Ok(page.data.into_iter().filter_map(|m| m.caption).collect())
    }
}

/// Met when a recent caption on the community profile contains the marker
pub struct ExternalMentionVerifier {
    profiles: Arc<dyn ProfileDirectory>,
    provider: Arc<dyn SocialFeedProvider>,
    marker: String,
}

impl ExternalMentionVerifier {
    pub fn new(profiles: Arc<dyn ProfileDirectory>, provider: Arc<dyn SocialFeedProvider>) -> Self {
        Self {
            profiles,
            provider,
            marker: DEFAULT_MENTION_MARKER.to_string(),
        }
    }

    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }
}

#[async_trait]
impl CompletionVerifier for ExternalMentionVerifier {
    fn name(&self) -> &'static str {
        "external-mention"
    }

    async fn evaluate(&self, mission: &Mission, user_id: &str) -> Result<Verdict> {
        if self.profiles.instagram_handle(user_id).await?.is_none() {
            return Ok(Verdict::unmet("User has no linked Instagram profile"));
        }

        let captions = match self.provider.recent_captions().await {
            Ok(captions) => captions,
            Err(e) => {
                warn!(mission_id = %mission.id, user_id = %user_id, error = %e, "Mention lookup failed");
                return Ok(Verdict::unmet(format!("Could not read Instagram posts: {}", e)));
            }
        };

        if captions.iter().any(|c| c.contains(&self.marker)) {
            Ok(Verdict::met())
        } else {
            Ok(Verdict::unmet(format!("No recent post mentions {}", self.marker)))
        }
    }
}
