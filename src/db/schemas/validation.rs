//! Validation document schema
//!
//! Evidence submitted by a member for a mission that cannot be verified
//! automatically. Moves exactly once from `pending` to a terminal state.

use bson::{doc, oid::ObjectId, Document};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::datetime;
use crate::db::mongo::IntoIndexes;

/// Collection name for validations
pub const VALIDATION_COLLECTION: &str = "validations";

/// Validation status
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ValidationStatus {
    /// Awaiting an admin decision
    #[default]
    Pending,
    /// Accepted; the mission was recorded as completed
    Validated,
    Rejected,
}

impl ValidationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationStatus::Pending => "pending",
            ValidationStatus::Validated => "validated",
            ValidationStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ValidationStatus::Pending)
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Validation {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    /// Member who submitted the evidence
    pub user_id: String,

    pub mission_id: ObjectId,

    /// Evidence URL
    #[serde(rename = "url")]
    pub evidence_url: String,

    #[serde(default)]
    pub status: ValidationStatus,

    #[serde(with = "datetime::required")]
    pub submitted_at: DateTime<Utc>,

    /// Admin who decided
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated_by: Option<String>,

    /// When the decision was made
    #[serde(
        default,
        with = "datetime::optional",
        skip_serializing_if = "Option::is_none"
    )]
    pub validated_at: Option<DateTime<Utc>>,
}

impl Validation {
    /// Create a pending validation
    pub fn pending(
        user_id: String,
        mission_id: ObjectId,
        evidence_url: String,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ObjectId::new(),
            user_id,
            mission_id,
            evidence_url,
            status: ValidationStatus::Pending,
            submitted_at,
            validated_by: None,
            validated_at: None,
        }
    }
}

/// A decision applied to a pending validation
#[derive(Clone, Debug)]
pub struct Decision {
    pub status: ValidationStatus,
    pub decided_by: String,
    pub decided_at: DateTime<Utc>,
}

impl IntoIndexes for Validation {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "status": 1, "submittedAt": 1 },
                Some(
                    IndexOptions::builder()
                        .name("status_submitted".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "userId": 1 },
                Some(IndexOptions::builder().name("user_id".to_string()).build()),
            ),
        ]
    }
}
