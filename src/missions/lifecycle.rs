//! Mission lifecycle service
//!
//! Admin-created missions, public listing, and the two completion paths:
//! direct completion by an admin and self-service completion gated by the
//! verifier registered for the mission type.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::completion::{check_completable, CompletionReceipt, CompletionRecorder};
use super::verifier::VerifierRegistry;
use crate::auth::{authorize, Operation};
use crate::db::schemas::{
    end_date_for, Category, Mission, MissionSpec, NotificationTarget, MIN_MISSION_DURATION_MS,
};
use crate::notify::NotificationDispatcher;
use crate::store::MissionStore;
use crate::types::{parse_object_id, Clock, EngineError, RequestContext, Result};

pub struct MissionLifecycle {
    missions: Arc<dyn MissionStore>,
    completions: Arc<CompletionRecorder>,
    verifiers: VerifierRegistry,
    notifier: Arc<NotificationDispatcher>,
    clock: Arc<dyn Clock>,
}

impl MissionLifecycle {
    pub fn new(
        missions: Arc<dyn MissionStore>,
        completions: Arc<CompletionRecorder>,
        verifiers: VerifierRegistry,
        notifier: Arc<NotificationDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            missions,
            completions,
            verifiers,
            notifier,
            clock,
        }
    }

    pub fn verifiers(&self) -> &VerifierRegistry {
        &self.verifiers
    }

    /// Create a mission owned by the calling admin and announce it to
    /// devices subscribed to mission news
    pub async fn create(&self, ctx: &RequestContext, spec: MissionSpec) -> Result<Mission> {
        authorize(ctx, Operation::CreateMission)?;
        let owner = ctx.caller()?.user_id.clone();
        let now = self.clock.now();
        let spec = validate_spec(spec, now)?;

        let mission = Mission::new(owner, spec, now);
        ctx.within("create mission", self.missions.insert_mission(&mission))
            .await?;

        info!(
            request_id = %ctx.request_id,
            mission_id = %mission.id,
            mission_type = %mission.mission_type,
            value = mission.value,
            end_date = %mission.end_date.to_rfc3339(),
            "Mission created"
        );

        self.notifier
            .dispatch_best_effort(
                ctx,
                &format!("Nova missão disponível: {}", mission.text),
                NotificationTarget::Category(Category::Mission),
            )
            .await;

        Ok(mission)
    }

    /// Every mission, newest first
    pub async fn list(&self, ctx: &RequestContext) -> Result<Vec<Mission>> {
        authorize(ctx, Operation::ListMissions)?;
        ctx.within("list missions", self.missions.list_missions())
            .await
    }

    /// Missions that have not ended yet, nearest expiry first
    pub async fn list_active(&self, ctx: &RequestContext) -> Result<Vec<Mission>> {
        authorize(ctx, Operation::ListActiveMissions)?;
        let now = self.clock.now();
        ctx.within("list active missions", self.missions.list_active_missions(now))
            .await
    }

    /// Record a completion on behalf of `user_id` without running a verifier
    pub async fn complete_direct(
        &self,
        ctx: &RequestContext,
        mission_id: &str,
        user_id: &str,
    ) -> Result<CompletionReceipt> {
        authorize(ctx, Operation::CompleteMission)?;
        let id = parse_object_id("mission", mission_id)?;
        if user_id.trim().is_empty() {
            return Err(EngineError::InvalidArgument("User id is required".into()));
        }

        let _guard = self.completions.lock(&id).await;
        let mission = self.completions.load(ctx, &id).await?;
        check_completable(&mission, user_id, self.clock.now())?;

        let receipt = self.completions.record(ctx, &mission, user_id).await?;
        info!(
            request_id = %ctx.request_id,
            mission_id = %id,
            user_id = %user_id,
            actor = %ctx.caller()?.user_id,
            "Mission completed directly"
        );
        Ok(receipt)
    }

    /// Complete a mission for the caller once its verifier reports the
    /// condition as met
    pub async fn verify_and_complete(
        &self,
        ctx: &RequestContext,
        mission_id: &str,
    ) -> Result<CompletionReceipt> {
        authorize(ctx, Operation::VerifyCompletion)?;
        let user_id = ctx.caller()?.user_id.clone();
        let id = parse_object_id("mission", mission_id)?;

        let mission = self.completions.load(ctx, &id).await?;
        check_completable(&mission, &user_id, self.clock.now())?;

        let verifier = self.verifiers.get(&mission.mission_type).ok_or_else(|| {
            EngineError::InvalidArgument(format!(
                "No verifier for mission type {}",
                mission.mission_type
            ))
        })?;

        let verdict = ctx
            .within("verify completion", verifier.evaluate(&mission, &user_id))
            .await?;
        debug!(
            mission_id = %id,
            user_id = %user_id,
            verifier = verifier.name(),
            met = verdict.met,
            "Verifier evaluated"
        );
        if !verdict.met {
            return Err(EngineError::PreconditionFailed(
                verdict
                    .diagnostic
                    .unwrap_or_else(|| "Completion condition not met".into()),
            ));
        }

        // Verification ran unlocked; re-check against fresh state
        let _guard = self.completions.lock(&id).await;
        let mission = self.completions.load(ctx, &id).await?;
        check_completable(&mission, &user_id, self.clock.now())?;

        self.completions.record(ctx, &mission, &user_id).await
    }

    /// Hard-delete a mission. Points already credited stay credited.
    pub async fn delete(&self, ctx: &RequestContext, mission_id: &str) -> Result<()> {
        authorize(ctx, Operation::DeleteMission)?;
        let id = parse_object_id("mission", mission_id)?;

        let removed = ctx
            .within("delete mission", self.missions.delete_mission(&id))
            .await?;
        if !removed {
            return Err(EngineError::NotFound(format!("Mission not found: {}", mission_id)));
        }
        info!(request_id = %ctx.request_id, mission_id = %id, "Mission deleted");
        Ok(())
    }
}

fn validate_spec(mut spec: MissionSpec, now: DateTime<Utc>) -> Result<MissionSpec> {
    spec.text = spec.text.trim().to_string();
    spec.mission_type = spec.mission_type.trim().to_string();
    spec.hashtag = spec
        .hashtag
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty());

    if spec.text.is_empty() {
        return Err(EngineError::InvalidArgument("Mission text is required".into()));
    }
    if spec.mission_type.is_empty() {
        return Err(EngineError::InvalidArgument("Mission type is required".into()));
    }
    if spec.duration_ms < MIN_MISSION_DURATION_MS {
        return Err(EngineError::InvalidArgument(format!(
            "Mission duration must be at least {}ms, got {}ms",
            MIN_MISSION_DURATION_MS, spec.duration_ms
        )));
    }
    if end_date_for(now, spec.duration_ms).is_none() {
        return Err(EngineError::InvalidArgument(format!(
            "Mission duration {}ms is out of range",
            spec.duration_ms
        )));
    }
    if spec.value <= 0 {
        return Err(EngineError::InvalidArgument(
            "Mission value must be positive".into(),
        ));
    }
    Ok(spec)
}
