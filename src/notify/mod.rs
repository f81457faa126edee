//! In-app notifications and push fan-out

mod dispatcher;
pub mod push;

pub use dispatcher::{
    DeliveryReport, DispatcherConfig, NotificationDispatcher, NotifyOutcome, DEFAULT_TITLE,
    MAX_LIST_LIMIT,
};
pub use push::{FcmConfig, FcmPushProvider, LogPushProvider, PushError, PushMessage, PushProvider, PushReport};
