//! Mission document schema
//!
//! A time-boxed task with a point reward and a completion condition.

use bson::{doc, oid::ObjectId, Document};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use super::datetime;
use crate::db::mongo::IntoIndexes;

/// Collection name for missions
pub const MISSION_COLLECTION: &str = "missions";

/// Shortest allowed mission duration (2 hours, in milliseconds)
pub const MIN_MISSION_DURATION_MS: i64 = 7_200_000;

/// Mission document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Mission {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    /// Admin who created the mission
    pub owner_id: String,

    pub text: String,

    /// Tag selecting the completion verifier
    pub mission_type: String,

    /// Hashtag required by hashtag missions (none means any post counts)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashtag: Option<String>,

    /// Duration in milliseconds
    pub duration: i64,

    /// created_at + duration; never changes after creation
    #[serde(with = "datetime::required")]
    pub end_date: DateTime<Utc>,

    /// Points credited on completion
    pub value: i64,

    /// Users who completed the mission (unique)
    #[serde(default)]
    pub completed: Vec<String>,

    #[serde(with = "datetime::required")]
    pub created_at: DateTime<Utc>,
}

impl Mission {
    /// Build a mission starting at `now`
    pub fn new(owner_id: String, spec: MissionSpec, now: DateTime<Utc>) -> Self {
        Self {
            id: ObjectId::new(),
            owner_id,
            text: spec.text,
            mission_type: spec.mission_type,
            hashtag: spec.hashtag.filter(|h| !h.is_empty()),
            duration: spec.duration_ms,
            end_date: end_date_for(now, spec.duration_ms).unwrap_or(DateTime::<Utc>::MAX_UTC),
            value: spec.value,
            completed: Vec::new(),
            created_at: now,
        }
    }

    pub fn has_completed(&self, user_id: &str) -> bool {
        self.completed.iter().any(|u| u == user_id)
    }

    /// Whether the mission had ended before `at`
    pub fn ended_before(&self, at: DateTime<Utc>) -> bool {
        self.end_date < at
    }

    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.end_date > at
    }
}

/// End of a mission starting at `start`, or `None` when the duration
/// does not fit the calendar
pub fn end_date_for(start: DateTime<Utc>, duration_ms: i64) -> Option<DateTime<Utc>> {
    chrono::TimeDelta::try_milliseconds(duration_ms).and_then(|d| start.checked_add_signed(d))
}

/// Caller-supplied fields for a new mission
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct MissionSpec {
    pub text: String,
    pub mission_type: String,
    #[serde(default)]
    pub hashtag: Option<String>,
    #[serde(rename = "duration")]
    pub duration_ms: i64,
    pub value: i64,
}

impl IntoIndexes for Mission {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "createdAt": -1 },
                Some(
                    IndexOptions::builder()
                        .name("created_at_desc".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "endDate": 1 },
                Some(IndexOptions::builder().name("end_date".to_string()).build()),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(duration_ms: i64) -> MissionSpec {
        MissionSpec {
            text: "Post a photo from the offsite".into(),
            mission_type: "FEEDIMAGE".into(),
            hashtag: Some(String::new()),
            duration_ms,
            value: 10,
        }
    }

    #[test]
    fn test_end_date_is_creation_plus_duration() {
        let now = Utc::now();
        let mission = Mission::new("admin".into(), spec(7_200_001), now);

        assert_eq!(
            mission.end_date,
            now + chrono::Duration::milliseconds(7_200_001)
        );
        assert!(mission.completed.is_empty());
        assert_eq!(mission.hashtag, None);
    }

    #[test]
    fn test_end_date_overflow_is_none() {
        let now = Utc::now();
        assert!(end_date_for(now, i64::MAX / 2).is_none());
        assert!(end_date_for(now, i64::MIN).is_none());
        assert_eq!(
            end_date_for(now, MIN_MISSION_DURATION_MS),
            Some(now + chrono::Duration::hours(2))
        );
    }

    #[test]
    fn test_bson_field_names() {
        let mission = Mission::new("admin".into(), spec(MIN_MISSION_DURATION_MS), Utc::now());
        let doc = bson::to_document(&mission).unwrap();

        assert!(doc.get_object_id("_id").is_ok());
        assert!(doc.get_datetime("endDate").is_ok());
        assert!(doc.get_array("completed").is_ok());
        assert_eq!(doc.get_str("missionType").unwrap(), "FEEDIMAGE");

        let back: Mission = bson::from_document(doc).unwrap();
        assert_eq!(back.end_date.timestamp_millis(), mission.end_date.timestamp_millis());
    }
}
