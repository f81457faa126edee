//! Completion recording
//!
//! Recording a completion is two writes: add the user to the mission's
//! completed set, then credit the mission value to the user's ledger. The
//! first write is an atomic add-if-absent; a failed credit after a
//! successful add is reported as `PartialFailure` and logged for manual
//! reconciliation.
//!
//! Decisions about one mission are serialized in-process through a keyed
//! async lock. Entries are dropped once no task holds or waits on them.

use std::sync::Arc;

use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info};

use crate::db::schemas::Mission;
use crate::ledger::PointsLedger;
use crate::store::{MissionStore, SetInsert};
use crate::types::{EngineError, RequestContext, Result};

type LockTable = DashMap<ObjectId, Arc<Mutex<()>>>;

/// Result of a recorded completion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReceipt {
    pub mission_id: String,
    pub user_id: String,
    pub points: i64,
}

/// Held while a completion decision for one mission is in progress
pub struct MissionGuard {
    id: ObjectId,
    locks: Arc<LockTable>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for MissionGuard {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

pub struct CompletionRecorder {
    missions: Arc<dyn MissionStore>,
    ledger: Arc<dyn PointsLedger>,
    locks: Arc<LockTable>,
}

impl CompletionRecorder {
    pub fn new(missions: Arc<dyn MissionStore>, ledger: Arc<dyn PointsLedger>) -> Self {
        Self {
            missions,
            ledger,
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Wait for exclusive access to completion decisions on `mission_id`
    pub async fn lock(&self, mission_id: &ObjectId) -> MissionGuard {
        let lock = self.locks.entry(*mission_id).or_default().clone();
        let guard = lock.lock_owned().await;
        MissionGuard {
            id: *mission_id,
            locks: self.locks.clone(),
            guard: Some(guard),
        }
    }

    /// Number of missions with a live lock entry
    pub fn active_locks(&self) -> usize {
        self.locks.len()
    }

    /// Load a mission or fail with `NotFound`
    pub async fn load(&self, ctx: &RequestContext, mission_id: &ObjectId) -> Result<Mission> {
        ctx.within("load mission", self.missions.get_mission(mission_id))
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("Mission not found: {}", mission_id)))
    }

    /// Add `user_id` to the completed set and credit the mission value
    pub async fn record(
        &self,
        ctx: &RequestContext,
        mission: &Mission,
        user_id: &str,
    ) -> Result<CompletionReceipt> {
        let inserted = ctx
            .within(
                "record completion",
                self.missions.add_completion(&mission.id, user_id),
            )
            .await?;

        match inserted {
            SetInsert::Inserted => {}
            SetInsert::AlreadyPresent => return Err(already_completed(mission, user_id)),
            SetInsert::Missing => {
                return Err(EngineError::NotFound(format!(
                    "Mission not found: {}",
                    mission.id
                )))
            }
        }

        info!(
            request_id = %ctx.request_id,
            mission_id = %mission.id,
            user_id = %user_id,
            "Completion recorded"
        );

        if let Err(e) = ctx
            .within("credit points", self.ledger.credit(user_id, mission.value))
            .await
        {
            error!(
                request_id = %ctx.request_id,
                mission_id = %mission.id,
                user_id = %user_id,
                amount = mission.value,
                error = %e,
                "Points credit failed after completion was recorded"
            );
            return Err(EngineError::partial(
                format!("completion of mission {} by {} recorded", mission.id, user_id),
                format!("crediting {} points failed: {}", mission.value, e),
            ));
        }

        Ok(CompletionReceipt {
            mission_id: mission.id.to_hex(),
            user_id: user_id.to_string(),
            points: mission.value,
        })
    }
}

/// Reject completions of a mission that ended before `at` or that the user
/// already completed
pub fn check_completable(mission: &Mission, user_id: &str, at: DateTime<Utc>) -> Result<()> {
    if mission.ended_before(at) {
        return Err(EngineError::Expired(format!(
            "Mission {} ended at {}",
            mission.id,
            mission.end_date.to_rfc3339()
        )));
    }
    if mission.has_completed(user_id) {
        return Err(already_completed(mission, user_id));
    }
    Ok(())
}

fn already_completed(mission: &Mission, user_id: &str) -> EngineError {
    EngineError::AlreadyCompleted {
        mission_id: mission.id.to_hex(),
        user_id: user_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Caller, Role};
    use crate::db::schemas::{MissionSpec, UserProfile};
    use crate::store::MemoryStore;
    use std::time::Duration;

    async fn setup() -> (Arc<MemoryStore>, CompletionRecorder, Mission) {
        let store = Arc::new(MemoryStore::new());
        store.add_user(UserProfile::new("u1")).await;
        let mission = Mission::new(
            "admin".into(),
            MissionSpec {
                text: "Invite a friend".into(),
                mission_type: "FEEDPOST".into(),
                hashtag: None,
                duration_ms: 7_200_000,
                value: 15,
            },
            Utc::now(),
        );
        store.insert_mission(&mission).await.unwrap();
        let recorder = CompletionRecorder::new(store.clone(), store.clone());
        (store, recorder, mission)
    }

    fn ctx() -> RequestContext {
        RequestContext::new(Caller::new("admin", Role::Admin, "Admin"))
    }

    #[tokio::test]
    async fn test_record_adds_and_credits_once() {
        let (store, recorder, mission) = setup().await;

        let receipt = recorder.record(&ctx(), &mission, "u1").await.unwrap();
        assert_eq!(receipt.points, 15);

        let again = recorder.record(&ctx(), &mission, "u1").await;
        assert!(matches!(again, Err(EngineError::AlreadyCompleted { .. })));
        assert_eq!(store.balance("u1").await.unwrap().total, 15);
    }

    #[tokio::test]
    async fn test_ledger_failure_keeps_completion() {
        let (store, recorder, mission) = setup().await;
        store.set_ledger_down(true);

        let result = recorder.record(&ctx(), &mission, "u1").await;
        assert!(matches!(result, Err(EngineError::PartialFailure { .. })));

        let stored = store.get_mission(&mission.id).await.unwrap().unwrap();
        assert!(stored.has_completed("u1"));
        assert_eq!(store.balance("u1").await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_lock_serializes_and_cleans_up() {
        let (_store, recorder, mission) = setup().await;
        let recorder = Arc::new(recorder);

        let first = recorder.lock(&mission.id).await;
        let contender = {
            let recorder = recorder.clone();
            let id = mission.id;
            tokio::spawn(async move {
                let _guard = recorder.lock(&id).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(first);
        contender.await.unwrap();
        assert_eq!(recorder.active_locks(), 0);
    }

    #[test]
    fn test_check_completable() {
        let now = Utc::now();
        let mut mission = Mission::new(
            "admin".into(),
            MissionSpec {
                text: "t".into(),
                mission_type: "FEEDPOST".into(),
                hashtag: None,
                duration_ms: 7_200_000,
                value: 1,
            },
            now,
        );

        assert!(check_completable(&mission, "u1", now).is_ok());
        assert!(matches!(
            check_completable(&mission, "u1", now + chrono::Duration::hours(3)),
            Err(EngineError::Expired(_))
        ));

        mission.completed.push("u1".into());
        assert!(matches!(
            check_completable(&mission, "u1", now),
            Err(EngineError::AlreadyCompleted { .. })
        ));
    }
}
