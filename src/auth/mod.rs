//! Caller identity and authorization
//!
//! Provides:
//! - JWT claims decoding into a [`Caller`]
//! - Permission levels and the per-operation requirement table

pub mod jwt;
pub mod permissions;

pub use jwt::{extract_token, Claims, JwtValidator};
pub use permissions::{
    authorize, is_operation_allowed, operation_description, required_permission, Caller,
    Operation, PermissionLevel, Role,
};
