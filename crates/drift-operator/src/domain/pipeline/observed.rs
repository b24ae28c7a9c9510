use super::drift_signal::DriftSignal;
use super::settings::CONVERSION_JOB_NAME;
use super::settings::TRAINING_JOB_NAME;

/// A value read from the cluster, or the reason it could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation<T> {
    Known(T),
    Unknown(String),
}

impl<T> Observation<T> {
    pub fn known(&self) -> Option<&T> {
        match self {
            Self::Known(value) => Some(value),
            Self::Unknown(_) => None,
        }
    }

    pub fn unknown_reason(&self) -> Option<&str> {
        match self {
            Self::Known(_) => None,
            Self::Unknown(reason) => Some(reason),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Observation<U> {
        match self {
            Self::Known(value) => Observation::Known(f(value)),
            Self::Unknown(reason) => Observation::Unknown(reason),
        }
    }
}

/// Completion state of a job as reported by the cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSummary {
    pub name: String,
    pub succeeded: u32,
    pub failed: u32,
    /// The job already carries a deletion timestamp.
    pub terminating: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Succeeded,
    Failed,
}

impl JobSummary {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            succeeded: 0,
            failed: 0,
            terminating: false,
        }
    }

    pub fn status(&self) -> JobStatus {
        if self.succeeded > 0 {
            JobStatus::Succeeded
        } else if self.failed > 0 {
            JobStatus::Failed
        } else {
            JobStatus::Running
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentSummary {
    pub name: String,
}

/// Everything the evaluator needs to know about one pipeline, gathered fresh
/// each pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedPipelineState {
    pub monitor_exists: Observation<bool>,
    pub training_jobs: Observation<Vec<JobSummary>>,
    pub conversion_jobs: Observation<Vec<JobSummary>>,
    pub drift: DriftSignal,
}

impl ObservedPipelineState {
    /// Build the state from raw listings of the workload namespace.
    pub fn from_listings(
        monitor_name: &str,
        deployments: Observation<Vec<DeploymentSummary>>,
        jobs: Observation<Vec<JobSummary>>,
        drift: DriftSignal,
    ) -> Self {
        let monitor_exists = deployments.map(|d| d.iter().any(|d| d.name == monitor_name));
        let filter = |name: &str| match &jobs {
            Observation::Known(jobs) => Observation::Known(
                jobs.iter()
                    .filter(|job| job.name == name)
                    .cloned()
                    .collect(),
            ),
            Observation::Unknown(reason) => Observation::Unknown(reason.clone()),
        };

        Self {
            monitor_exists,
            training_jobs: filter(TRAINING_JOB_NAME),
            conversion_jobs: filter(CONVERSION_JOB_NAME),
            drift,
        }
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn job_status_prefers_success() {
        let mut job = JobSummary::new("training-job");
        assert_eq!(job.status(), JobStatus::Running);

        job.failed = 1;
        assert_eq!(job.status(), JobStatus::Failed);

        job.succeeded = 1;
        assert_eq!(job.status(), JobStatus::Succeeded);
    }

    #[test]
    fn from_listings_splits_jobs_by_name() {
        let state = ObservedPipelineState::from_listings(
            "drift-deploy",
            Observation::Known(vec![DeploymentSummary {
                name: "drift-deploy".to_string(),
            }]),
            Observation::Known(vec![
                JobSummary::new("training-job"),
                JobSummary::new("converting-job"),
                JobSummary::new("unrelated"),
            ]),
            DriftSignal::Absent,
        );

        assert_eq!(state.monitor_exists, Observation::Known(true));
        assert_eq!(
            state.training_jobs,
            Observation::Known(vec![JobSummary::new("training-job")])
        );
        assert_eq!(
            state.conversion_jobs,
            Observation::Known(vec![JobSummary::new("converting-job")])
        );
    }

    #[test]
    fn failed_listings_stay_unknown() {
        let state = ObservedPipelineState::from_listings(
            "drift-deploy",
            Observation::Unknown("timeout".to_string()),
            Observation::Unknown("forbidden".to_string()),
            DriftSignal::Absent,
        );

        assert_eq!(state.monitor_exists.unknown_reason(), Some("timeout"));
        assert_eq!(state.training_jobs.unknown_reason(), Some("forbidden"));
        assert_eq!(state.conversion_jobs.unknown_reason(), Some("forbidden"));
    }

    #[test]
    fn missing_monitor_is_known_absent() {
        let state = ObservedPipelineState::from_listings(
            "drift-deploy",
            Observation::Known(vec![DeploymentSummary {
                name: "python-tflite-deploy".to_string(),
            }]),
            Observation::Known(vec![]),
            DriftSignal::Absent,
        );

        assert_eq!(state.monitor_exists.known(), Some(&false));
    }
}
