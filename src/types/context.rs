//! Request-scoped context, deadlines and time source

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::{Caller, PermissionLevel};
use crate::types::{EngineError, Result};

/// Default per-operation deadline
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything an operation needs to know about the request that triggered it
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub caller: Option<Caller>,
    pub timeout: Duration,
}

impl RequestContext {
    /// Context for an already-verified caller
    pub fn new(caller: Caller) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            caller: Some(caller),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Context without a caller (public read operations)
    pub fn anonymous() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            caller: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Permission level of the caller (public when anonymous)
    pub fn permission(&self) -> PermissionLevel {
        self.caller
            .as_ref()
            .map(|c| c.permission())
            .unwrap_or(PermissionLevel::Public)
    }

    /// The authenticated caller, or `Unauthorized`
    pub fn caller(&self) -> Result<&Caller> {
        self.caller
            .as_ref()
            .ok_or_else(|| EngineError::Unauthorized("No authenticated caller".into()))
    }

    /// Run `fut` under this context's deadline
    pub async fn within<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        within(self.timeout, operation, fut).await
    }
}

/// Run `fut`, failing with `Timeout` once `limit` elapses
pub async fn within<T, F>(limit: Duration, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(EngineError::Timeout(format!(
            "{} exceeded {}ms",
            operation,
            limit.as_millis()
        ))),
    }
}

/// Parse a hex object id, reporting `InvalidArgument` on bad input
pub fn parse_object_id(kind: &str, value: &str) -> Result<ObjectId> {
    ObjectId::parse_str(value)
        .map_err(|_| EngineError::InvalidArgument(format!("Invalid {} id: {}", kind, value)))
}

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for tests and replays
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_within_times_out() {
        let result: Result<()> = within(Duration::from_millis(10), "slow op", async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(EngineError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_within_passes_result_through() {
        let result = within(Duration::from_secs(1), "fast op", async { Ok(7) }).await;
        assert_eq!(result, Ok(7));
    }

    #[test]
    fn test_parse_object_id_rejects_garbage() {
        assert!(parse_object_id("mission", "65a1f0c2e4b0a1b2c3d4e5f6").is_ok());
        assert!(matches!(
            parse_object_id("mission", "not-an-id"),
            Err(EngineError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_manual_clock_advances() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        clock.advance(chrono::Duration::hours(3));
        assert_eq!(clock.now(), start + chrono::Duration::hours(3));
    }
}
