//! Serde helpers storing chrono timestamps as BSON datetimes

pub use bson::serde_helpers::chrono_datetime_as_bson_datetime as required;

/// `Option<DateTime<Utc>>` as an optional BSON datetime
pub mod optional {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => bson::DateTime::from_chrono(*dt).serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        Option::<bson::DateTime>::deserialize(deserializer).map(|v| v.map(|dt| dt.to_chrono()))
    }
}
