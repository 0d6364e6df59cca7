//! Endpoints driven by the external scheduler. There is no in-process timer.

use axum::{extract::State, response::Json};
use chrono::{DateTime, TimeDelta, Utc};
use clinexec_store::Action;
use serde::Serialize;
use std::sync::Arc;

use super::sync::{run_sync, SyncRunResponse};
use crate::audit::{self, AuditContext};
use crate::error::ApiResult;
use crate::worker_trigger::TriggerOutcome;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ScrapSweep {
    /// Processing jobs failed for exceeding the worker timeout
    pub recovered: usize,
    /// Finished jobs deleted past retention
    pub pruned: usize,
    pub trigger: TriggerOutcome,
}

/// `now - age`, or the earliest representable time when that overflows,
/// so nothing counts as old enough.
fn cutoff(now: DateTime<Utc>, age: Option<TimeDelta>) -> DateTime<Utc> {
    age.and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// POST /api/cron/sync
pub async fn sync(
    State(state): State<Arc<AppState>>,
    ctx: AuditContext,
) -> ApiResult<Json<SyncRunResponse>> {
    run_sync(&state, &ctx, None).await
}

/// POST /api/cron/scrap
pub async fn scrap(
    State(state): State<Arc<AppState>>,
    ctx: AuditContext,
) -> ApiResult<Json<ScrapSweep>> {
    let now = Utc::now();
    let worker = &state.config.worker;
    let recovered = state
        .store
        .recover_stale_jobs(cutoff(now, worker.stale_after()))?;
    let pruned = state
        .store
        .prune_finished_jobs(cutoff(now, worker.retention()))?;
    let trigger = state.worker.maybe_trigger(&state.store, "cron").await?;

    tracing::info!(
        recovered,
        pruned,
        trigger = trigger.as_str(),
        "Cron scrap sweep finished"
    );
    audit::record(
        &ctx,
        Action::Trigger,
        "scrap_queue",
        None,
        Ok(Some(format!(
            "recovered {}, pruned {}, trigger {}",
            recovered,
            pruned,
            trigger.as_str()
        ))),
        &state.audit,
    );

    Ok(Json(ScrapSweep {
        recovered,
        pruned,
        trigger,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerSettings;

    #[test]
    fn test_cutoff() {
        let now = Utc::now();
        let settings = WorkerSettings {
            stale_after_secs: 600,
            ..WorkerSettings::default()
        };
        assert_eq!(cutoff(now, settings.stale_after()), now - TimeDelta::minutes(10));

        let huge = WorkerSettings {
            stale_after_secs: u64::MAX,
            ..WorkerSettings::default()
        };
        assert!(huge.stale_after().is_none());
        assert_eq!(cutoff(now, huge.stale_after()), DateTime::<Utc>::MIN_UTC);

        // Fits a TimeDelta but not a date subtraction
        let far = TimeDelta::try_seconds(i64::MAX / 1_000).unwrap();
        assert_eq!(cutoff(now, Some(far)), DateTime::<Utc>::MIN_UTC);
    }
}
