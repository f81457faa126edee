//! Human-in-the-loop mission validation

mod service;

pub use service::ValidationService;
