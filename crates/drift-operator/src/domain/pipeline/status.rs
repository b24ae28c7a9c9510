//! Status written back to a `CtrlDrift` after each pass

use api_types::Condition;
use api_types::CtrlDriftObservation;
use api_types::CtrlDriftStatus;
use api_types::CONDITION_READY;
use api_types::CONDITION_SYNCED;
use chrono::DateTime;
use chrono::SecondsFormat;
use chrono::Utc;

use super::evaluator::Evaluation;

pub const REASON_AVAILABLE: &str = "Available";
pub const REASON_CREATING: &str = "Creating";
pub const REASON_RECONCILE_SUCCESS: &str = "ReconcileSuccess";
pub const REASON_RECONCILE_ERROR: &str = "ReconcileError";

/// Build the status for a finished pass.
///
/// `errors` are the failures of this pass; a clean pass clears `last_error`.
/// Transition times are kept for conditions whose status did not change.
pub fn build_status(
    previous: Option<&CtrlDriftStatus>,
    evaluation: &Evaluation,
    exists: bool,
    errors: &[String],
    now: DateTime<Utc>,
) -> CtrlDriftStatus {
    let now = now.to_rfc3339_opts(SecondsFormat::Secs, true);
    let last_error = errors.last().cloned();

    let ready = if exists {
        condition(CONDITION_READY, "True", REASON_AVAILABLE, None)
    } else {
        condition(CONDITION_READY, "False", REASON_CREATING, None)
    };
    let synced = match &last_error {
        None => condition(CONDITION_SYNCED, "True", REASON_RECONCILE_SUCCESS, None),
        Some(error) => condition(
            CONDITION_SYNCED,
            "False",
            REASON_RECONCILE_ERROR,
            Some(error.clone()),
        ),
    };

    let conditions = [ready, synced]
        .into_iter()
        .map(|mut c| {
            let kept = previous
                .and_then(|p| p.condition(&c.type_))
                .filter(|p| p.status == c.status)
                .and_then(|p| p.last_transition_time.clone());
            c.last_transition_time = Some(kept.unwrap_or_else(|| now.clone()));
            c
        })
        .collect();

    CtrlDriftStatus {
        at_provider: CtrlDriftObservation {
            drift: evaluation.drift.to_string(),
            phase: Some(evaluation.phase.to_string()),
            sample_count: evaluation.sample_count,
        },
        conditions,
        last_error,
    }
}

fn condition(type_: &str, status: &str, reason: &str, message: Option<String>) -> Condition {
    Condition {
        type_: type_.to_string(),
        status: status.to_string(),
        reason: Some(reason.to_string()),
        message,
        last_transition_time: None,
    }
}
