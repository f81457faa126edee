//! Configuration for the mission engine
//!
//! CLI arguments and environment variable handling using clap. Every flag
//! can also come from the environment or a `.env` file.

use std::time::Duration;

use clap::Parser;

use crate::cli::Command;
use crate::engine::EngineConfig;
use crate::missions::{InstagramConfig, DEFAULT_MENTION_MARKER};
use crate::notify::{DispatcherConfig, FcmConfig, DEFAULT_TITLE, MAX_LIST_LIMIT};

/// Mission engine operator CLI
#[derive(Parser, Debug, Clone)]
#[command(name = "mission-engine")]
#[command(about = "Missions, validations, points and notifications for the community app")]
pub struct Args {
    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "nook")]
    pub mongodb_db: String,

    /// Give up on MongoDB server selection after this many milliseconds
    #[arg(long, env = "MONGODB_CONNECT_TIMEOUT_MS", default_value = "3000")]
    pub mongodb_connect_timeout_ms: u64,

    /// JWT secret used to verify caller tokens (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// Bearer token identifying the caller of this command
    #[arg(long, env = "CALLER_TOKEN", global = true)]
    pub token: Option<String>,

    /// Enable development mode (in-memory fallback, log-only push)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format (text, json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Per-operation deadline in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "10000")]
    pub request_timeout_ms: u64,

    /// Push multicast endpoint (FCM legacy HTTP API)
    #[arg(long, env = "PUSH_ENDPOINT")]
    pub push_endpoint: Option<String>,

    /// Server key for the push endpoint
    #[arg(long, env = "PUSH_SERVER_KEY")]
    pub push_server_key: Option<String>,

    /// Title shown on every push notification
    #[arg(long, env = "NOTIFICATION_TITLE", default_value = DEFAULT_TITLE)]
    pub notification_title: String,

    /// Default and maximum number of notifications per list call
    #[arg(long, env = "NOTIFICATION_LIST_LIMIT", default_value_t = MAX_LIST_LIMIT)]
    pub notification_list_limit: usize,

    /// Instagram profile whose captions are searched for mentions
    #[arg(long, env = "INSTAGRAM_ID")]
    pub instagram_id: Option<String>,

    /// Graph API access token for the Instagram profile
    #[arg(long, env = "INSTAGRAM_ACCESS_TOKEN")]
    pub instagram_access_token: Option<String>,

    /// Mention that completes INSTAGRAMSTORY missions
    #[arg(long, env = "MENTION_MARKER", default_value = DEFAULT_MENTION_MARKER)]
    pub mention_marker: String,

    /// Require FEEDIMAGE posts to be newer than the mission
    #[arg(long, env = "FEED_IMAGE_REQUIRE_FRESH", default_value = "false")]
    pub feed_image_require_fresh: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    /// Effective JWT secret (falls back to a fixed value in dev mode)
    pub fn jwt_secret(&self) -> Option<String> {
        match (&self.jwt_secret, self.dev_mode) {
            (Some(secret), _) => Some(secret.clone()),
            (None, true) => Some("dev-only-insecure-secret".to_string()),
            (None, false) => None,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn mongodb_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.mongodb_connect_timeout_ms)
    }

    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }

    /// FCM settings when both endpoint and key are set
    pub fn fcm_config(&self) -> Option<FcmConfig> {
        match (&self.push_endpoint, &self.push_server_key) {
            (Some(endpoint), Some(key)) => Some(FcmConfig::new(endpoint.clone(), key.clone())),
            _ => None,
        }
    }

    /// Instagram settings when both profile id and token are set
    pub fn instagram_config(&self) -> Option<InstagramConfig> {
        match (&self.instagram_id, &self.instagram_access_token) {
            (Some(id), Some(token)) => Some(InstagramConfig::new(id.clone(), token.clone())),
            _ => None,
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            dispatcher: DispatcherConfig {
                title: self.notification_title.clone(),
                list_limit: self.notification_list_limit,
                ..DispatcherConfig::default()
            },
            image_requires_fresh: self.feed_image_require_fresh,
            mention_marker: self.mention_marker.clone(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode && self.jwt_secret.is_none() {
            return Err("JWT_SECRET is required in production mode".to_string());
        }

        if self.mongodb_connect_timeout_ms == 0 {
            return Err("MONGODB_CONNECT_TIMEOUT_MS must be greater than zero".to_string());
        }

        if self.request_timeout_ms == 0 {
            return Err("REQUEST_TIMEOUT_MS must be greater than zero".to_string());
        }

        if self.notification_list_limit == 0 || self.notification_list_limit > MAX_LIST_LIMIT {
            return Err(format!(
                "NOTIFICATION_LIST_LIMIT must be between 1 and {}",
                MAX_LIST_LIMIT
            ));
        }

        if self.push_endpoint.is_some() != self.push_server_key.is_some() {
            return Err("PUSH_ENDPOINT and PUSH_SERVER_KEY must be set together".to_string());
        }

        if self.instagram_id.is_some() != self.instagram_access_token.is_some() {
            return Err(
                "INSTAGRAM_ID and INSTAGRAM_ACCESS_TOKEN must be set together".to_string(),
            );
        }

        if !self.dev_mode && self.fcm_config().is_none() {
            return Err("PUSH_ENDPOINT is required in production mode".to_string());
        }

        if !matches!(self.log_format.to_ascii_lowercase().as_str(), "text" | "json") {
            return Err(format!("Unknown LOG_FORMAT: {}", self.log_format));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["mission-engine"];
        argv.extend_from_slice(extra);
        argv.extend_from_slice(&["mission", "list"]);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_dev_mode_defaults_validate() {
        let args = parse(&["--dev-mode"]);
        assert!(args.validate().is_ok());
        assert!(args.jwt_secret().is_some());
        assert_eq!(args.notification_title, "Nova Notificação");
        assert_eq!(args.engine_config().dispatcher.list_limit, 50);
        assert_eq!(args.mongodb_connect_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn test_production_requires_secret_and_push() {
        let args = parse(&[]);
        assert!(args.validate().unwrap_err().contains("JWT_SECRET"));

        let args = parse(&["--jwt-secret", "s3cret"]);
        assert!(args.validate().unwrap_err().contains("PUSH_ENDPOINT"));

        let args = parse(&[
            "--jwt-secret",
            "s3cret",
            "--push-endpoint",
            "https://fcm.googleapis.com/fcm/send",
            "--push-server-key",
            "k",
        ]);
        assert!(args.validate().is_ok());
        assert!(args.fcm_config().is_some());
    }

    #[test]
    fn test_paired_settings() {
        let args = parse(&["--dev-mode", "--instagram-id", "1784"]);
        assert!(args.validate().is_err());

        let args = parse(&["--dev-mode", "--notification-list-limit", "80"]);
        assert!(args.validate().is_err());

        let args = parse(&["--dev-mode", "--mongodb-connect-timeout-ms", "0"]);
        assert!(args.validate().is_err());
    }
}
