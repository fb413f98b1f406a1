//! Batch outcome aggregation

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ErrorReport;
use crate::types::{JobId, JobState, Status};

/// Terminal outcome of one job within a batch
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobOutcome {
    /// Job ID assigned by the scheduler
    pub id: JobId,
    /// Source file the job processed
    pub input: PathBuf,
    /// Terminal status
    pub status: Status,
    /// Error that terminated the job, if it failed
    pub error: Option<ErrorReport>,
    /// Written stem paths, non-empty iff completed
    pub outputs: Vec<PathBuf>,
}

impl JobOutcome {
    /// Build an outcome from a job's terminal state
    pub(crate) fn from_state(id: JobId, input: PathBuf, state: JobState) -> Self {
        Self {
            id,
            input,
            status: state.status,
            error: state.error,
            outputs: state.outputs,
        }
    }
}

/// Aggregate counts derived from a batch report
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Jobs that completed and produced outputs
    pub succeeded: usize,
    /// Jobs that failed
    pub failed: usize,
    /// Jobs cancelled before completion
    pub cancelled: usize,
    /// Total jobs in the batch
    pub total: usize,
}

/// Append-only mapping from input file to terminal outcome
///
/// Built incrementally by the scheduler as jobs finish and read-only once
/// the batch run returns. Entries keep the order of the submitted specs, so
/// consumers can locate a file's outcome regardless of completion order.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BatchReport {
    jobs: Vec<JobOutcome>,
}

impl BatchReport {
    pub(crate) fn new() -> Self {
        Self { jobs: Vec::new() }
    }

    pub(crate) fn record(&mut self, outcome: JobOutcome) {
        self.jobs.push(outcome);
    }

    /// All outcomes, in submission order
    pub fn jobs(&self) -> &[JobOutcome] {
        &self.jobs
    }

    /// Outcome for a given input path, if it was part of this batch
    pub fn outcome_for(&self, input: &Path) -> Option<&JobOutcome> {
        self.jobs.iter().find(|job| job.input == input)
    }

    /// Number of completed jobs
    pub fn succeeded(&self) -> usize {
        self.count(Status::Completed)
    }

    /// Number of failed jobs
    pub fn failed(&self) -> usize {
        self.count(Status::Failed)
    }

    /// Number of cancelled jobs
    pub fn cancelled(&self) -> usize {
        self.count(Status::Cancelled)
    }

    /// Process-level success signal: no job failed
    ///
    /// Cancelled jobs are reported separately; they are neither failures nor
    /// successes for this signal.
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Derived aggregate counts
    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            succeeded: self.succeeded(),
            failed: self.failed(),
            cancelled: self.cancelled(),
            total: self.jobs.len(),
        }
    }

    fn count(&self, status: Status) -> usize {
        self.jobs.iter().filter(|job| job.status == status).count()
    }
}
