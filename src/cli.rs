//! Operator CLI commands
//!
//! `mission-engine <group> <op>` runs one engine operation as the caller
//! identified by `--token` and prints the result as JSON.

use clap::Subcommand;
use serde::Serialize;

use crate::auth::{Caller, JwtValidator, Role};
use crate::db::schemas::{Category, MissionSpec, NotificationTarget};
use crate::engine::Engine;
use crate::types::{EngineError, RequestContext, Result};

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Mission lifecycle
    #[command(subcommand)]
    Mission(MissionCommand),

    /// Validation workflow
    #[command(subcommand)]
    Validation(ValidationCommand),

    /// Notifications
    #[command(subcommand)]
    Notification(NotificationCommand),

    /// Device token registration
    #[command(subcommand)]
    Device(DeviceCommand),

    /// Points balance of the caller, or of USER for admins
    Points {
        #[arg(long)]
        user: Option<String>,
    },

    /// Issue a caller token (dev mode only)
    Token {
        user_id: String,
        #[arg(long, default_value = "USER")]
        role: Role,
        #[arg(long, default_value = "")]
        name: String,
        /// Lifetime in seconds
        #[arg(long, default_value = "3600")]
        ttl: i64,
    },
}

#[derive(Debug, Clone, Subcommand)]
pub enum MissionCommand {
    /// Create a mission (admin)
    Create {
        #[arg(long)]
        text: String,
        /// Verifier tag (FEEDPOST, FEEDHASHTAG, FEEDIMAGE, INSTAGRAMSTORY)
        #[arg(long = "type")]
        mission_type: String,
        #[arg(long)]
        hashtag: Option<String>,
        /// Duration in milliseconds (at least 7200000)
        #[arg(long)]
        duration_ms: i64,
        /// Points credited on completion
        #[arg(long)]
        value: i64,
    },

    /// List missions
    List {
        /// Only missions that have not ended
        #[arg(long)]
        active: bool,
    },

    /// Record a completion for a user without verification (admin)
    Complete { mission_id: String, user_id: String },

    /// Verify and complete a mission for the caller
    Verify { mission_id: String },

    /// Delete a mission (admin)
    Delete { mission_id: String },
}

#[derive(Debug, Clone, Subcommand)]
pub enum ValidationCommand {
    /// Submit evidence for a mission
    Submit { mission_id: String, url: String },

    /// Accept a pending validation (admin)
    Accept { validation_id: String },

    /// Reject a pending validation (admin)
    Reject { validation_id: String },

    /// List pending validations (admin)
    Pending,

    /// List the caller's validations
    Mine,
}

#[derive(Debug, Clone, Subcommand)]
pub enum NotificationCommand {
    /// Send a notification to a category or a single user (admin)
    Send {
        text: String,
        #[arg(long, conflicts_with = "user", required_unless_present = "user")]
        category: Option<Category>,
        #[arg(long)]
        user: Option<String>,
    },

    /// List notifications visible to the caller
    List {
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Mark a notification as seen
    Ack { notification_id: String },

    /// Delete a notification (admin)
    Delete { notification_id: String },
}

#[derive(Debug, Clone, Subcommand)]
pub enum DeviceCommand {
    /// Register the caller's device token
    Register {
        token: String,
        /// Comma-separated categories (default: all)
        #[arg(long, value_delimiter = ',')]
        categories: Vec<Category>,
    },
}

/// Resolve the caller from an optional bearer token
pub fn resolve_caller(validator: &JwtValidator, token: Option<&str>) -> Result<Option<Caller>> {
    token
        .map(|t| validator.validate(crate::auth::extract_token(t)))
        .transpose()
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| EngineError::InvalidArgument(format!("Failed to encode output: {}", e)))
}

/// Run one command against the engine, returning JSON output
pub async fn execute_command(
    engine: &Engine,
    ctx: &RequestContext,
    command: Command,
) -> Result<String> {
    match command {
        Command::Mission(cmd) => match cmd {
            MissionCommand::Create {
                text,
                mission_type,
                hashtag,
                duration_ms,
                value,
            } => {
                let spec = MissionSpec {
                    text,
                    mission_type,
                    hashtag,
                    duration_ms,
                    value,
                };
                to_json(&engine.missions.create(ctx, spec).await?)
            }
            MissionCommand::List { active: true } => to_json(&engine.missions.list_active(ctx).await?),
            MissionCommand::List { active: false } => to_json(&engine.missions.list(ctx).await?),
            MissionCommand::Complete {
                mission_id,
                user_id,
            } => to_json(
                &engine
                    .missions
                    .complete_direct(ctx, &mission_id, &user_id)
                    .await?,
            ),
            MissionCommand::Verify { mission_id } => {
                to_json(&engine.missions.verify_and_complete(ctx, &mission_id).await?)
            }
            MissionCommand::Delete { mission_id } => {
                engine.missions.delete(ctx, &mission_id).await?;
                to_json(&serde_json::json!({ "deleted": mission_id }))
            }
        },

        Command::Validation(cmd) => match cmd {
            ValidationCommand::Submit { mission_id, url } => {
                to_json(&engine.validations.submit(ctx, &mission_id, &url).await?)
            }
            ValidationCommand::Accept { validation_id } => {
                to_json(&engine.validations.accept(ctx, &validation_id).await?)
            }
            ValidationCommand::Reject { validation_id } => {
                to_json(&engine.validations.reject(ctx, &validation_id).await?)
            }
            ValidationCommand::Pending => to_json(&engine.validations.list_pending(ctx).await?),
            ValidationCommand::Mine => to_json(&engine.validations.list_mine(ctx).await?),
        },

        Command::Notification(cmd) => match cmd {
            NotificationCommand::Send {
                text,
                category,
                user,
            } => {
                let target = match (category, user) {
                    (Some(category), None) => NotificationTarget::Category(category),
                    (None, Some(user)) => NotificationTarget::User(user),
                    _ => {
                        return Err(EngineError::InvalidArgument(
                            "Exactly one of --category or --user is required".into(),
                        ))
                    }
                };
                to_json(&engine.notifications.notify(ctx, &text, target).await?)
            }
            NotificationCommand::List { limit } => {
                to_json(&engine.notifications.list(ctx, limit).await?)
            }
            NotificationCommand::Ack { notification_id } => {
                engine.notifications.acknowledge(ctx, &notification_id).await?;
                to_json(&serde_json::json!({ "acknowledged": notification_id }))
            }
            NotificationCommand::Delete { notification_id } => {
                engine.notifications.delete(ctx, &notification_id).await?;
                to_json(&serde_json::json!({ "deleted": notification_id }))
            }
        },

        Command::Device(DeviceCommand::Register { token, categories }) => {
            to_json(&engine.devices.register(ctx, &token, &categories).await?)
        }

        Command::Points { user } => to_json(&engine.points_balance(ctx, user.as_deref()).await?),

        Command::Token { .. } => Err(EngineError::InvalidArgument(
            "Token issuance is handled before the engine starts".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(subcommand)]
        command: Command,
    }

    fn parse(argv: &[&str]) -> Command {
        let mut full = vec!["mission-engine"];
        full.extend_from_slice(argv);
        TestCli::try_parse_from(full).unwrap().command
    }

    #[test]
    fn test_parses_categories_and_targets() {
        match parse(&["device", "register", "tok", "--categories", "feed,mission"]) {
            Command::Device(DeviceCommand::Register { categories, .. }) => {
                assert_eq!(categories, vec![Category::Feed, Category::Mission]);
            }
            other => panic!("unexpected command: {:?}", other),
        }

        assert!(TestCli::try_parse_from(["mission-engine", "notification", "send", "hi"]).is_err());
    }

    #[tokio::test]
    async fn test_create_and_list_through_cli() {
        let engine = Engine::in_memory(MemoryStore::new());
        let admin = RequestContext::new(Caller::new("admin", Role::Admin, "Admin"));

        let created = execute_command(
            &engine,
            &admin,
            parse(&[
                "mission", "create", "--text", "Post a selfie", "--type", "FEEDIMAGE",
                "--duration-ms", "7200001", "--value", "10",
            ]),
        )
        .await
        .unwrap();
        assert!(created.contains("\"missionType\": \"FEEDIMAGE\""));

        let listed = execute_command(
            &engine,
            &RequestContext::anonymous(),
            parse(&["mission", "list", "--active"]),
        )
        .await
        .unwrap();
        assert!(listed.contains("Post a selfie"));
    }

    #[test]
    fn test_resolve_caller() {
        let validator = JwtValidator::new("secret");
        assert_eq!(resolve_caller(&validator, None).unwrap(), None);

        let caller = Caller::new("u1", Role::User, "Uma");
        let token = validator.issue(&caller, 60).unwrap();
        let bearer = format!("Bearer {}", token);
        let resolved = resolve_caller(&validator, Some(&bearer)).unwrap().unwrap();
        assert_eq!(resolved.user_id, "u1");
    }
}
