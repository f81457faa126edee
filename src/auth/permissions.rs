//! Caller identity, permission levels and the operation table

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{EngineError, RequestContext, Result};

/// Permission levels for engine operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
#[derive(Default)]
pub enum PermissionLevel {
    /// No authentication - read-only listings
    #[default]
    Public = 0,
    /// Authenticated member
    Authenticated = 1,
    /// Admin - mission authoring, validation decisions, broadcasts
    Admin = 2,
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PermissionLevel::Public => write!(f, "PUBLIC"),
            PermissionLevel::Authenticated => write!(f, "AUTHENTICATED"),
            PermissionLevel::Admin => write!(f, "ADMIN"),
        }
    }
}

/// Account role carried in the caller's claims
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Admin,
}

impl std::str::FromStr for Role {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "USER" => Ok(Role::User),
            "ADMIN" => Ok(Role::Admin),
            other => Err(EngineError::InvalidArgument(format!("Unknown role: {}", other))),
        }
    }
}

/// Already-verified identity of the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: String,
    pub role: Role,
    pub display_name: String,
}

impl Caller {
    pub fn new(user_id: impl Into<String>, role: Role, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            display_name: display_name.into(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn permission(&self) -> PermissionLevel {
        match self.role {
            Role::Admin => PermissionLevel::Admin,
            Role::User => PermissionLevel::Authenticated,
        }
    }
}

/// Operations exposed by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateMission,
    ListMissions,
    ListActiveMissions,
    CompleteMission,
    VerifyCompletion,
    DeleteMission,
    SubmitValidation,
    AcceptValidation,
    RejectValidation,
    ListPendingValidations,
    ListOwnValidations,
    CreateNotification,
    ListNotifications,
    AcknowledgeNotification,
    DeleteNotification,
    RegisterDeviceToken,
    PointsBalance,
}

/// Required permission level for an operation
pub fn required_permission(operation: Operation) -> PermissionLevel {
    match operation {
        Operation::ListMissions | Operation::ListActiveMissions => PermissionLevel::Public,

        Operation::VerifyCompletion
        | Operation::SubmitValidation
        | Operation::ListOwnValidations
        | Operation::ListNotifications
        | Operation::AcknowledgeNotification
        | Operation::RegisterDeviceToken
        | Operation::PointsBalance => PermissionLevel::Authenticated,

        Operation::CreateMission
        | Operation::CompleteMission
        | Operation::DeleteMission
        | Operation::AcceptValidation
        | Operation::RejectValidation
        | Operation::ListPendingValidations
        | Operation::CreateNotification
        | Operation::DeleteNotification => PermissionLevel::Admin,
    }
}

/// Check if an operation is allowed for the given permission level
pub fn is_operation_allowed(operation: Operation, level: PermissionLevel) -> bool {
    level >= required_permission(operation)
}

/// Human-readable operation name for logging
pub fn operation_description(operation: Operation) -> &'static str {
    match operation {
        Operation::CreateMission => "Create mission",
        Operation::ListMissions => "List missions",
        Operation::ListActiveMissions => "List active missions",
        Operation::CompleteMission => "Complete mission",
        Operation::VerifyCompletion => "Verify mission completion",
        Operation::DeleteMission => "Delete mission",
        Operation::SubmitValidation => "Submit validation",
        Operation::AcceptValidation => "Accept validation",
        Operation::RejectValidation => "Reject validation",
        Operation::ListPendingValidations => "List pending validations",
        Operation::ListOwnValidations => "List own validations",
        Operation::CreateNotification => "Create notification",
        Operation::ListNotifications => "List notifications",
        Operation::AcknowledgeNotification => "Acknowledge notification",
        Operation::DeleteNotification => "Delete notification",
        Operation::RegisterDeviceToken => "Register device token",
        Operation::PointsBalance => "Points balance",
    }
}

/// Fail with `Unauthorized`/`Forbidden` unless the context may run `operation`
pub fn authorize(ctx: &RequestContext, operation: Operation) -> Result<()> {
    let required = required_permission(operation);
    if required == PermissionLevel::Public {
        return Ok(());
    }

    let caller = ctx.caller()?;
    if is_operation_allowed(operation, caller.permission()) {
        Ok(())
    } else {
        Err(EngineError::Forbidden(format!(
            "{} requires {} (caller {} is {})",
            operation_description(operation),
            required,
            caller.user_id,
            caller.permission()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> Caller {
        Caller::new("65a1f0c2e4b0a1b2c3d4e5f6", Role::Admin, "Ada")
    }

    fn member() -> Caller {
        Caller::new("65a1f0c2e4b0a1b2c3d4e5f7", Role::User, "Bo")
    }

    #[test]
    fn test_public_operations() {
        assert!(is_operation_allowed(Operation::ListMissions, PermissionLevel::Public));
        assert!(authorize(&RequestContext::anonymous(), Operation::ListActiveMissions).is_ok());
    }

    #[test]
    fn test_authenticated_operations() {
        assert!(!is_operation_allowed(
            Operation::SubmitValidation,
            PermissionLevel::Public
        ));
        assert!(is_operation_allowed(
            Operation::SubmitValidation,
            PermissionLevel::Authenticated
        ));
        assert!(matches!(
            authorize(&RequestContext::anonymous(), Operation::SubmitValidation),
            Err(EngineError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_admin_operations() {
        assert!(matches!(
            authorize(&RequestContext::new(member()), Operation::AcceptValidation),
            Err(EngineError::Forbidden(_))
        ));
        assert!(authorize(&RequestContext::new(admin()), Operation::AcceptValidation).is_ok());
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("ADMIN".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn test_permission_ordering() {
        assert!(PermissionLevel::Admin > PermissionLevel::Authenticated);
        assert!(PermissionLevel::Authenticated > PermissionLevel::Public);
    }
}
