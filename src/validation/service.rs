//! Validation state machine
//!
//! `pending -> validated` and `pending -> rejected` are the only
//! transitions. Both are conditional writes on the pending status, so a
//! validation is decided at most once no matter how many admins race.

use std::sync::Arc;

use reqwest::Url;
use tracing::{error, info, warn};

use crate::auth::{authorize, Operation};
use crate::db::schemas::{Decision, NotificationTarget, Validation, ValidationStatus};
use crate::missions::{check_completable, CompletionRecorder};
use crate::notify::NotificationDispatcher;
use crate::store::ValidationStore;
use crate::types::{parse_object_id, Clock, EngineError, RequestContext, Result};

pub struct ValidationService {
    validations: Arc<dyn ValidationStore>,
    completions: Arc<CompletionRecorder>,
    notifier: Arc<NotificationDispatcher>,
    clock: Arc<dyn Clock>,
}

impl ValidationService {
    pub fn new(
        validations: Arc<dyn ValidationStore>,
        completions: Arc<CompletionRecorder>,
        notifier: Arc<NotificationDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            validations,
            completions,
            notifier,
            clock,
        }
    }

    /// Submit evidence for a mission. The mission's expiry is checked at
    /// acceptance time against the submission timestamp.
    pub async fn submit(
        &self,
        ctx: &RequestContext,
        mission_id: &str,
        evidence_url: &str,
    ) -> Result<Validation> {
        authorize(ctx, Operation::SubmitValidation)?;
        let user_id = ctx.caller()?.user_id.clone();
        let mission_id = parse_object_id("mission", mission_id)?;
        let evidence_url = parse_evidence_url(evidence_url)?;

        let validation = Validation::pending(user_id, mission_id, evidence_url, self.clock.now());
        ctx.within(
            "submit validation",
            self.validations.insert_validation(&validation),
        )
        .await?;

        info!(
            request_id = %ctx.request_id,
            validation_id = %validation.id,
            mission_id = %mission_id,
            user_id = %validation.user_id,
            "Validation submitted"
        );
        Ok(validation)
    }

    /// Accept a pending validation: mark it validated, record the
    /// completion and credit the mission value
    pub async fn accept(&self, ctx: &RequestContext, validation_id: &str) -> Result<Validation> {
        authorize(ctx, Operation::AcceptValidation)?;
        let actor = ctx.caller()?.user_id.clone();
        let id = parse_object_id("validation", validation_id)?;

        let validation = self.load(ctx, &id).await?;
        ensure_pending(&validation)?;

        let _guard = self.completions.lock(&validation.mission_id).await;
        let mission = self.completions.load(ctx, &validation.mission_id).await?;
        check_completable(&mission, &validation.user_id, validation.submitted_at)?;

        let decision = Decision {
            status: ValidationStatus::Validated,
            decided_by: actor,
            decided_at: self.clock.now(),
        };
        let changed = ctx
            .within("accept validation", self.validations.decide(&id, &decision))
            .await?;
        if !changed {
            return Err(EngineError::Conflict(format!(
                "Validation {} was decided concurrently",
                validation_id
            )));
        }

        // Decision is persisted; failures past this point are partial
        match self
            .completions
            .record(ctx, &mission, &validation.user_id)
            .await
        {
            Ok(_) => {}
            Err(e @ EngineError::AlreadyCompleted { .. }) => {
                warn!(
                    request_id = %ctx.request_id,
                    validation_id = %id,
                    mission_id = %mission.id,
                    "Validation accepted but user had already completed the mission"
                );
                return Err(e);
            }
            Err(e @ EngineError::PartialFailure { .. }) => return Err(e),
            Err(e) => {
                error!(
                    request_id = %ctx.request_id,
                    validation_id = %id,
                    mission_id = %mission.id,
                    user_id = %validation.user_id,
                    error = %e,
                    "Validation accepted but the completion was not recorded"
                );
                return Err(EngineError::partial(
                    format!("validation {} accepted", id),
                    format!(
                        "recording completion of mission {} by {} failed: {}",
                        mission.id, validation.user_id, e
                    ),
                ));
            }
        }

        info!(
            request_id = %ctx.request_id,
            validation_id = %id,
            mission_id = %mission.id,
            user_id = %validation.user_id,
            actor = %decision.decided_by,
            points = mission.value,
            "Validation accepted"
        );

        self.notifier
            .dispatch_best_effort(
                ctx,
                &format!("Sua missão \"{}\" foi validada!", mission.text),
                NotificationTarget::User(validation.user_id.clone()),
            )
            .await;

        Ok(decided(validation, decision))
    }

    /// Reject a pending validation
    pub async fn reject(&self, ctx: &RequestContext, validation_id: &str) -> Result<Validation> {
        authorize(ctx, Operation::RejectValidation)?;
        let actor = ctx.caller()?.user_id.clone();
        let id = parse_object_id("validation", validation_id)?;

        let decision = Decision {
            status: ValidationStatus::Rejected,
            decided_by: actor,
            decided_at: self.clock.now(),
        };
        let changed = ctx
            .within("reject validation", self.validations.decide(&id, &decision))
            .await?;
        if !changed {
            return Err(EngineError::Conflict(format!(
                "Validation {} is not pending",
                validation_id
            )));
        }

        let validation = self.load(ctx, &id).await?;
        info!(
            request_id = %ctx.request_id,
            validation_id = %id,
            user_id = %validation.user_id,
            actor = %decision.decided_by,
            "Validation rejected"
        );

        self.notifier
            .dispatch_best_effort(
                ctx,
                "Sua validação de missão foi recusada.",
                NotificationTarget::User(validation.user_id.clone()),
            )
            .await;

        Ok(validation)
    }

    /// Pending validations, oldest first (admin only)
    pub async fn list_pending(&self, ctx: &RequestContext) -> Result<Vec<Validation>> {
        authorize(ctx, Operation::ListPendingValidations)?;
        ctx.within(
            "list pending validations",
            self.validations.list_by_status(ValidationStatus::Pending),
        )
        .await
    }

    /// The caller's own validations, newest first
    pub async fn list_mine(&self, ctx: &RequestContext) -> Result<Vec<Validation>> {
        authorize(ctx, Operation::ListOwnValidations)?;
        let user_id = ctx.caller()?.user_id.clone();
        ctx.within("list validations", self.validations.list_for_user(&user_id))
            .await
    }

    async fn load(&self, ctx: &RequestContext, id: &bson::oid::ObjectId) -> Result<Validation> {
        ctx.within("load validation", self.validations.get_validation(id))
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("Validation not found: {}", id)))
    }
}

fn ensure_pending(validation: &Validation) -> Result<()> {
    if validation.status.is_terminal() {
        return Err(EngineError::Conflict(format!(
            "Validation {} is already {}",
            validation.id, validation.status
        )));
    }
    Ok(())
}

fn decided(mut validation: Validation, decision: Decision) -> Validation {
    validation.status = decision.status;
    validation.validated_by = Some(decision.decided_by);
    validation.validated_at = Some(decision.decided_at);
    validation
}

/// Evidence must be an absolute http(s) URL with a host
fn parse_evidence_url(raw: &str) -> Result<String> {
    let url = Url::parse(raw.trim())
        .map_err(|e| EngineError::InvalidArgument(format!("Invalid evidence URL: {}", e)))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(EngineError::InvalidArgument(format!(
            "Evidence URL must be http or https: {}",
            raw
        )));
    }
    Ok(url.to_string())
}
