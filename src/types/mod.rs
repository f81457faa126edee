//! Shared types: error taxonomy, request context and clock

mod context;
mod error;

pub use context::{
    parse_object_id, within, Clock, ManualClock, RequestContext, SystemClock, DEFAULT_TIMEOUT,
};
pub use error::{EngineError, Result};
