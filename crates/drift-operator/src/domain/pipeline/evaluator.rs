//! Pipeline state evaluator
//!
//! The pipeline keeps no state of its own. Each pass the phase is inferred from
//! a fresh [`ObservedPipelineState`] and [`evaluate`] returns the actions that
//! move the cluster one step further:
//!
//! ```text
//! NoMonitor -> Idle -> LaunchingTraining -> Training -> TrainingSucceeded
//!           -> Converting -> ConversionSucceeded -> (restart) -> Idle
//! ```
//!
//! Unknown observations never produce a create or a delete.

use super::drift_signal::DriftLevel;
use super::drift_signal::DriftSignal;
use super::observed::JobStatus;
use super::observed::JobSummary;
use super::observed::Observation;
use super::observed::ObservedPipelineState;
use super::templates::WorkloadKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConvergenceAction {
    Create(WorkloadKind),
    Delete(WorkloadKind),
}

/// Pipeline phase inferred during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum PipelinePhase {
    NoMonitor,
    Idle,
    DriftBelowThreshold,
    LaunchingTraining,
    Training,
    TrainingSucceeded,
    TrainingFailed,
    Converting,
    ConversionSucceeded,
    ConversionFailed,
    Unknown,
}

/// Outcome of evaluating one observed state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// Job actions, in the order they must be applied.
    pub actions: Vec<ConvergenceAction>,
    pub resource_exists: bool,
    /// False once a training or conversion completion was handled.
    pub resource_up_to_date: bool,
    pub phase: PipelinePhase,
    pub drift: DriftLevel,
    pub sample_count: Option<u64>,
    /// Reasons for observations that could not be made.
    pub warnings: Vec<String>,
}

/// Compute the convergence actions for `state`.
pub fn evaluate(state: &ObservedPipelineState, threshold: u64) -> Evaluation {
    let mut actions = Vec::new();
    let mut warnings = Vec::new();
    let mut completion_handled = false;

    let resource_exists = match &state.monitor_exists {
        Observation::Known(exists) => *exists,
        Observation::Unknown(reason) => {
            // an unknown monitor must not trigger Create
            warnings.push(format!("monitor deployment unknown: {reason}"));
            true
        }
    };

    let drift = state.drift.level(threshold);
    if let DriftSignal::Unknown { reason } = &state.drift {
        warnings.push(format!("drift signal unknown: {reason}"));
    }

    let mut launching = false;
    if drift == DriftLevel::AboveThreshold {
        match &state.training_jobs {
            Observation::Known(jobs) if jobs.is_empty() => {
                actions.push(ConvergenceAction::Create(WorkloadKind::TrainingJob));
                launching = true;
            }
            Observation::Known(_) => {}
            Observation::Unknown(reason) => {
                warnings.push(format!("training jobs unknown: {reason}"));
            }
        }
    } else if let Some(reason) = state.training_jobs.unknown_reason() {
        warnings.push(format!("training jobs unknown: {reason}"));
    }

    if let Some(reason) = state.conversion_jobs.unknown_reason() {
        warnings.push(format!("conversion jobs unknown: {reason}"));
    }

    let training = scan(&state.training_jobs);
    let conversion = scan(&state.conversion_jobs);

    match training {
        Some(JobStatus::Succeeded) => {
            actions.push(ConvergenceAction::Delete(WorkloadKind::TrainingJob));
            let conversion_absent = state
                .conversion_jobs
                .known()
                .is_some_and(|jobs| jobs.is_empty());
            if conversion_absent {
                actions.push(ConvergenceAction::Create(WorkloadKind::ConversionJob));
            }
            completion_handled = true;
        }
        Some(JobStatus::Failed) => {
            actions.push(ConvergenceAction::Delete(WorkloadKind::TrainingJob));
        }
        _ => {}
    }

    match conversion {
        Some(JobStatus::Succeeded) => {
            actions.push(ConvergenceAction::Delete(WorkloadKind::ConversionJob));
            completion_handled = true;
        }
        Some(JobStatus::Failed) => {
            actions.push(ConvergenceAction::Delete(WorkloadKind::ConversionJob));
        }
        _ => {}
    }

    let phase = infer_phase(
        &state.monitor_exists,
        drift,
        launching,
        training,
        conversion,
    );

    Evaluation {
        actions,
        resource_exists,
        resource_up_to_date: !completion_handled,
        phase,
        drift,
        sample_count: state.drift.sample_count(),
        warnings,
    }
}

/// Most relevant status among the live jobs of one kind.
///
/// Jobs already being deleted are skipped so re-observation never re-triggers
/// their completion.
fn scan(jobs: &Observation<Vec<JobSummary>>) -> Option<JobStatus> {
    let jobs = jobs.known()?;
    let statuses = jobs
        .iter()
        .filter(|job| !job.terminating)
        .map(JobSummary::status);

    statuses.fold(None, |acc, status| match (acc, status) {
        (Some(JobStatus::Succeeded), _) | (_, JobStatus::Succeeded) => Some(JobStatus::Succeeded),
        (Some(JobStatus::Failed), _) | (_, JobStatus::Failed) => Some(JobStatus::Failed),
        _ => Some(JobStatus::Running),
    })
}

fn infer_phase(
    monitor: &Observation<bool>,
    drift: DriftLevel,
    launching: bool,
    training: Option<JobStatus>,
    conversion: Option<JobStatus>,
) -> PipelinePhase {
    match (conversion, training) {
        (Some(JobStatus::Succeeded), _) => return PipelinePhase::ConversionSucceeded,
        (Some(JobStatus::Failed), _) => return PipelinePhase::ConversionFailed,
        (_, Some(JobStatus::Succeeded)) => return PipelinePhase::TrainingSucceeded,
        (_, Some(JobStatus::Failed)) => return PipelinePhase::TrainingFailed,
        (Some(JobStatus::Running), _) => return PipelinePhase::Converting,
        (_, Some(JobStatus::Running)) => return PipelinePhase::Training,
        _ => {}
    }

    if launching {
        return PipelinePhase::LaunchingTraining;
    }

    match (monitor, drift) {
        (Observation::Known(false), _) => PipelinePhase::NoMonitor,
        (Observation::Unknown(_), _) | (_, DriftLevel::Unknown) => PipelinePhase::Unknown,
        (_, DriftLevel::BelowThreshold) => PipelinePhase::DriftBelowThreshold,
        _ => PipelinePhase::Idle,
    }
}

/// Workloads created when a pipeline is first provisioned.
pub fn provision_plan() -> Vec<ConvergenceAction> {
    vec![
        ConvergenceAction::Create(WorkloadKind::MonitorDeployment),
        ConvergenceAction::Create(WorkloadKind::InferenceDeployment),
    ]
}

/// Restart both deployments so they pick up the new model and reference data.
pub fn restart_plan() -> Vec<ConvergenceAction> {
    vec![
        ConvergenceAction::Delete(WorkloadKind::MonitorDeployment),
        ConvergenceAction::Create(WorkloadKind::MonitorDeployment),
        ConvergenceAction::Delete(WorkloadKind::InferenceDeployment),
        ConvergenceAction::Create(WorkloadKind::InferenceDeployment),
    ]
}

/// Remove every workload the pipeline may own.
pub fn teardown_plan() -> Vec<ConvergenceAction> {
    vec![
        ConvergenceAction::Delete(WorkloadKind::MonitorDeployment),
        ConvergenceAction::Delete(WorkloadKind::InferenceDeployment),
        ConvergenceAction::Delete(WorkloadKind::TrainingJob),
        ConvergenceAction::Delete(WorkloadKind::ConversionJob),
    ]
}
