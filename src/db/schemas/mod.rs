//! Database schemas
//!
//! Defines MongoDB document structures for missions, validations,
//! notifications and device tokens, plus read views of the user and post
//! collections owned by other services.

pub(crate) mod datetime;
mod device;
mod mission;
mod notification;
mod user;
mod validation;

pub use device::{DeviceToken, DEVICE_TOKEN_COLLECTION};
pub use mission::{end_date_for, Mission, MissionSpec, MIN_MISSION_DURATION_MS, MISSION_COLLECTION};
pub use notification::{
    Category, Notification, NotificationTarget, ALL_CATEGORIES, NOTIFICATION_COLLECTION,
};
pub use user::{FeedPost, PointsBalance, UserProfile, POST_COLLECTION, USER_COLLECTION};
pub use validation::{Decision, Validation, ValidationStatus, VALIDATION_COLLECTION};
