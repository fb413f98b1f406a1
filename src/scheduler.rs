//! Batch scheduler
//!
//! Runs many jobs concurrently under a worker-count limit and aggregates
//! their terminal outcomes into a [`BatchReport`]. One job's failure never
//! aborts the others; a batch run always returns a complete report, even if
//! every job failed.

use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Semaphore, broadcast};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::client::{RemoteServiceClient, SeparationApi};
use crate::config::Config;
use crate::error::{Error, ErrorKind, ErrorReport, Result};
use crate::job::Job;
use crate::report::{BatchReport, JobOutcome};
use crate::types::{Event, JobId, JobSpec, JobState, Status};

/// Size of the lifecycle event broadcast buffer
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Runs batches of separation jobs with bounded concurrency
///
/// The scheduler owns the batch-wide cancellation token and the event
/// channel. The service client and configuration are shared, immutable, and
/// lock-free across all jobs.
pub struct Scheduler {
    api: Arc<dyn SeparationApi>,
    config: Arc<Config>,
    event_tx: broadcast::Sender<Event>,
    cancel: CancellationToken,
}

impl Scheduler {
    /// Create a scheduler talking to the real remote service
    pub fn new(config: Config) -> Result<Self> {
        let client = RemoteServiceClient::new(config.api.clone())?;
        Ok(Self::with_api(Arc::new(client), config))
    }

    /// Create a scheduler over any [`SeparationApi`] implementation
    ///
    /// Used by tests to substitute a service stub; also useful for callers
    /// wrapping the client with their own instrumentation.
    pub fn with_api(api: Arc<dyn SeparationApi>, config: Config) -> Self {
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            api,
            config: Arc::new(config),
            event_tx,
            cancel: CancellationToken::new(),
        }
    }

    /// Subscribe to job lifecycle events
    ///
    /// Multiple subscribers are supported; each receives all events
    /// independently. A subscriber that falls behind the buffer capacity
    /// receives a `Lagged` error and resumes with current events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Request cooperative cancellation of the running batch
    ///
    /// In-flight jobs stop at their next checkpoint; queued jobs terminate
    /// as `Cancelled` without starting network work. Already-issued network
    /// calls are not interrupted.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run a batch with the configured worker count
    pub async fn run(&self, specs: Vec<JobSpec>) -> Result<BatchReport> {
        let workers = self.config.workers;
        self.run_with_workers(specs, workers).await
    }

    /// Run a batch with at most `workers` jobs executing concurrently
    ///
    /// Returns once every job has reached a terminal state. The report maps
    /// outcomes by input identity in submission order, independent of
    /// completion order. An invalid worker count is a caller bug and is the
    /// only error this method returns.
    pub async fn run_with_workers(
        &self,
        specs: Vec<JobSpec>,
        workers: usize,
    ) -> Result<BatchReport> {
        if workers == 0 {
            return Err(Error::Config {
                message: "worker count must be at least 1".to_string(),
                key: Some("workers".to_string()),
            });
        }

        let total = specs.len();
        tracing::info!(jobs = total, workers, "Batch started");

        let semaphore = Arc::new(Semaphore::new(workers));
        let mut join_set: JoinSet<(usize, JobState)> = JoinSet::new();
        let mut inputs: Vec<PathBuf> = Vec::with_capacity(total);

        for (index, spec) in specs.into_iter().enumerate() {
            let id = JobId::new(index as u64);
            inputs.push(spec.input.clone());
            self.event_tx
                .send(Event::Queued {
                    id,
                    input: spec.input.clone(),
                })
                .ok();

            let job = Job::new(
                id,
                spec,
                Arc::clone(&self.api),
                Arc::clone(&self.config),
                self.cancel.child_token(),
                self.event_tx.clone(),
            );
            let semaphore = Arc::clone(&semaphore);
            let cancel = self.cancel.clone();

            join_set.spawn(async move {
                // Hold a permit while the job executes; after cancellation
                // skip the queue wait so the job can record Cancelled at its
                // first checkpoint instead of blocking on a slot
                let _permit = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
                };
                let state = job.run().await;
                (index, state)
            });
        }

        let mut slots: Vec<Option<JobState>> = (0..total).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, state)) => slots[index] = Some(state),
                Err(e) => {
                    tracing::error!(error = %e, "Job task did not run to completion");
                }
            }
        }

        let mut report = BatchReport::new();
        for (index, slot) in slots.into_iter().enumerate() {
            let id = JobId::new(index as u64);
            let input = inputs[index].clone();
            match slot {
                Some(state) => report.record(JobOutcome::from_state(id, input, state)),
                // Jobs capture all their failures, so a missing slot means
                // the task itself was lost; still give the input a terminal
                // entry so the report covers every spec
                None => report.record(JobOutcome {
                    id,
                    input,
                    status: Status::Failed,
                    error: Some(ErrorReport {
                        kind: ErrorKind::UnexpectedResponse,
                        message: "job aborted before reaching a terminal state".to_string(),
                    }),
                    outputs: Vec::new(),
                }),
            }
        }

        let summary = report.summary();
        tracing::info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            cancelled = summary.cancelled,
            total = summary.total,
            "Batch finished"
        );
        Ok(report)
    }
}
