//! Push transport
//!
//! The dispatcher hands a batch of device tokens and a message to a
//! [`PushProvider`]. [`FcmPushProvider`] speaks the FCM legacy multicast
//! HTTP API; [`LogPushProvider`] only logs and is used in dev mode.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// FCM accepts at most this many registration ids per request
pub const MAX_MULTICAST_TOKENS: usize = 500;

/// Title and body shown on the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
}

/// Per-token outcome counts of a multicast send
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PushReport {
    pub success: usize,
    pub failure: usize,
}

impl PushReport {
    fn merge(&mut self, other: PushReport) {
        self.success += other.success;
        self.failure += other.failure;
    }
}

/// Errors that fail a whole multicast call
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("Push provider unreachable: {0}")]
    Network(String),

    #[error("Push provider rejected request: {0}")]
    Rejected(String),

    #[error("Invalid push provider response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait PushProvider: Send + Sync {
    /// Deliver `message` to every token. Individual token rejections are
    /// counted in the report; only transport-level failures are errors.
    async fn send_multicast(
        &self,
        tokens: &[String],
        message: &PushMessage,
    ) -> Result<PushReport, PushError>;
}

/// Configuration for the FCM provider
#[derive(Debug, Clone)]
pub struct FcmConfig {
    pub endpoint: String,
    pub server_key: String,
    /// Timeout for each HTTP request (default: 5 seconds)
    pub request_timeout: Duration,
}

impl FcmConfig {
    pub fn new(endpoint: impl Into<String>, server_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            server_key: server_key.into(),
            request_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Serialize)]
struct MulticastRequest<'a> {
    registration_ids: &'a [String],
    notification: MulticastNotification<'a>,
}

#[derive(Serialize)]
struct MulticastNotification<'a> {
    title: &'a str,
    body: &'a str,
}

#[derive(Deserialize)]
struct MulticastResponse {
    success: usize,
    failure: usize,
}

/// FCM multicast over HTTPS
pub struct FcmPushProvider {
    config: FcmConfig,
    http_client: reqwest::Client,
}

impl FcmPushProvider {
    pub fn new(config: FcmConfig) -> Self {
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

    async fn send_chunk(
        &self,
        tokens: &[String],
        message: &PushMessage,
    ) -> Result<PushReport, PushError> {
        let body = MulticastRequest {
            registration_ids: tokens,
            notification: MulticastNotification {
                title: &message.title,
                body: &message.body,
            },
        };

        let response = self
            .http_client
            .post(&self.config.endpoint)
            .header("Authorization", format!("key={}", self.config.server_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| PushError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PushError::Rejected(format!(
                "HTTP {} from {}",
                response.status(),
                self.config.endpoint
            )));
        }

        let parsed: MulticastResponse = response
            .json()
            .await
            .map_err(|e| PushError::InvalidResponse(e.to_string()))?;

        Ok(PushReport {
            success: parsed.success,
            failure: parsed.failure,
        })
    }
}

#[async_trait]
impl PushProvider for FcmPushProvider {
    async fn send_multicast(
        &self,
        tokens: &[String],
        message: &PushMessage,
    ) -> Result<PushReport, PushError> {
        let report = send_in_chunks(tokens, |chunk| self.send_chunk(chunk, message)).await?;
        debug!(success = report.success, failure = report.failure, "Multicast sent");
        Ok(report)
    }
}

/// Send `tokens` in batches of [`MAX_MULTICAST_TOKENS`]. Every token of a
/// batch that fails outright counts as a failure; the call only errors
/// when no batch got through.
async fn send_in_chunks<'a, F, Fut>(
    tokens: &'a [String],
    mut send: F,
) -> Result<PushReport, PushError>
where
    F: FnMut(&'a [String]) -> Fut,
    Fut: Future<Output = Result<PushReport, PushError>>,
{
    let mut report = PushReport::default();
    let mut last_error = None;
    let mut delivered_batch = false;

    for chunk in tokens.chunks(MAX_MULTICAST_TOKENS) {
        match send(chunk).await {
            Ok(part) => {
                if part.failure > 0 {
                    warn!(
                        failure = part.failure,
                        batch = chunk.len(),
                        "Some device tokens were rejected"
                    );
                }
                delivered_batch = true;
                report.merge(part);
            }
            Err(e) => {
                warn!(batch = chunk.len(), error = %e, "Multicast batch failed");
                report.failure += chunk.len();
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) if !delivered_batch => Err(e),
        _ => Ok(report),
    }
}

/// Provider that only logs; every token counts as delivered
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPushProvider;

#[async_trait]
impl PushProvider for LogPushProvider {
    async fn send_multicast(
        &self,
        tokens: &[String],
        message: &PushMessage,
    ) -> Result<PushReport, PushError> {
        info!(
            tokens = tokens.len(),
            title = %message.title,
            body = %message.body,
            "Push delivery (log only)"
        );
        Ok(PushReport {
            success: tokens.len(),
            failure: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let tokens = vec!["a".to_string(), "b".to_string()];
        let body = MulticastRequest {
            registration_ids: &tokens,
            notification: MulticastNotification {
                title: "Nova Notificação",
                body: "hello",
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["registration_ids"][1], "b");
        assert_eq!(json["notification"]["title"], "Nova Notificação");
    }

    #[test]
    fn test_response_ignores_extra_fields() {
        let parsed: MulticastResponse = serde_json::from_str(
            r#"{"multicast_id":1,"success":2,"failure":1,"results":[{"message_id":"x"}]}"#,
        )
        .unwrap();
        assert_eq!(parsed.success, 2);
        assert_eq!(parsed.failure, 1);
    }

    #[tokio::test]
    async fn test_log_provider_counts_every_token() {
        let message = PushMessage {
            title: "t".into(),
            body: "b".into(),
        };
        let report = LogPushProvider
            .send_multicast(&["x".into(), "y".into()], &message)
            .await
            .unwrap();
        assert_eq!(report, PushReport { success: 2, failure: 0 });
    }

    #[tokio::test]
    async fn test_failed_batch_keeps_earlier_counts() {
        let tokens: Vec<String> = (0..1200).map(|i| format!("tok-{}", i)).collect();
        let mut calls = 0;
        let report = send_in_chunks(&tokens, |chunk| {
            calls += 1;
            let result = if calls == 2 {
                Err(PushError::Rejected("HTTP 503".into()))
            } else {
                Ok(PushReport {
                    success: chunk.len(),
                    failure: 0,
                })
            };
            std::future::ready(result)
        })
        .await
        .unwrap();

        assert_eq!(calls, 3);
        assert_eq!(report, PushReport { success: 700, failure: 500 });
    }

    #[tokio::test]
    async fn test_every_batch_failing_is_an_error() {
        let tokens: Vec<String> = (0..600).map(|i| format!("tok-{}", i)).collect();
        let result = send_in_chunks(&tokens, |_| {
            let failure = PushError::Network("connection refused".into());
            std::future::ready(Err::<PushReport, _>(failure))
        })
        .await;
        assert!(matches!(result, Err(PushError::Network(_))));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        let mut config = FcmConfig::new("http://127.0.0.1:9/fcm/send", "key");
        config.request_timeout = Duration::from_millis(500);
        let provider = FcmPushProvider::new(config);
        let message = PushMessage {
            title: "t".into(),
            body: "b".into(),
        };

        let result = provider.send_multicast(&["tok".into()], &message).await;
        assert!(matches!(result, Err(PushError::Network(_))));
    }
}
