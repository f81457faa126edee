//! Points ledger accessor
//!
//! Every member carries `total`, `spent` and `current` counters. Mission
//! completion only ever increments `total`.

use async_trait::async_trait;

use crate::db::schemas::PointsBalance;
use crate::types::Result;

#[async_trait]
pub trait PointsLedger: Send + Sync {
    /// Atomically add `amount` (may be negative) to the user's total
    async fn credit(&self, user_id: &str, amount: i64) -> Result<()>;

    async fn balance(&self, user_id: &str) -> Result<PointsBalance>;
}
