//! Mission Engine - engagement core for the community app
//!
//! Time-boxed missions that members complete through in-app or external
//! actions, a human-in-the-loop validation workflow, a points ledger
//! credited on completion, and push notifications fanned out to
//! subscribed devices.
//!
//! ## Services
//!
//! - **Missions**: creation, listing, direct and verified completion
//! - **Validation**: pending -> validated / rejected state machine
//! - **Notifications**: persisted alerts with category or private delivery
//! - **Devices**: push token registry with per-category subscriptions
//! - **Ledger**: points credited on every completion

pub mod auth;
pub mod cli;
pub mod config;
pub mod db;
pub mod devices;
pub mod engine;
pub mod ledger;
pub mod missions;
pub mod notify;
pub mod store;
pub mod types;
pub mod validation;

pub use config::Args;
pub use engine::{Engine, EngineBuilder, EngineConfig, Stores};
pub use types::{EngineError, RequestContext, Result};
