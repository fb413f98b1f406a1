//! Per-file job state machine
//!
//! A [`Job`] drives one [`JobSpec`] from `Pending` to a terminal status,
//! calling the separation service at each phase through the retry policy.
//! Failures of any kind are captured into the job's own state; `run` never
//! propagates an error past the scheduler.
//!
//! Cancellation is cooperative: the token is checked at every phase boundary
//! and before each poll iteration, never by aborting an in-flight network
//! call, so cancellation latency is bounded by the time to the next
//! checkpoint.

use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::client::SeparationApi;
use crate::config::Config;
use crate::error::{Error, ErrorReport, Result};
use crate::output::OutputWriter;
use crate::retry::with_retry;
use crate::types::{Event, JobId, JobSpec, JobState, RemoteStatus, Status};
use crate::utils;

/// State machine driving one input file through submission, polling, and
/// retrieval
pub struct Job {
    id: JobId,
    spec: JobSpec,
    state: JobState,
    api: Arc<dyn SeparationApi>,
    config: Arc<Config>,
    writer: OutputWriter,
    cancel: CancellationToken,
    event_tx: broadcast::Sender<Event>,
}

impl Job {
    /// Create a job in `Pending` state
    pub fn new(
        id: JobId,
        spec: JobSpec,
        api: Arc<dyn SeparationApi>,
        config: Arc<Config>,
        cancel: CancellationToken,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            id,
            spec,
            state: JobState::new(),
            api,
            config,
            writer: OutputWriter::new(),
            cancel,
            event_tx,
        }
    }

    /// Job ID
    pub fn id(&self) -> JobId {
        self.id
    }

    /// The spec this job is executing
    pub fn spec(&self) -> &JobSpec {
        &self.spec
    }

    /// Run the job to a terminal state
    ///
    /// Always returns a terminal [`JobState`]; every failure mode is folded
    /// into it rather than surfaced as an error.
    pub async fn run(mut self) -> JobState {
        tracing::info!(
            job_id = %self.id,
            input = %self.spec.input.display(),
            target = %self.spec.target,
            "Job started"
        );

        match self.execute().await {
            Ok(outputs) => {
                self.state.outputs = outputs;
                self.set_status(Status::Completed);
                tracing::info!(
                    job_id = %self.id,
                    outputs = self.state.outputs.len(),
                    "Job completed"
                );
                self.emit(Event::Completed {
                    id: self.id,
                    outputs: self.state.outputs.clone(),
                });
            }
            Err(Error::Cancelled) => {
                self.set_status(Status::Cancelled);
                tracing::info!(job_id = %self.id, "Job cancelled");
                self.emit(Event::Cancelled { id: self.id });
            }
            Err(e) => {
                let report = ErrorReport::from(&e);
                tracing::error!(job_id = %self.id, error = %e, "Job failed");
                self.state.error = Some(report.clone());
                self.set_status(Status::Failed);
                self.emit(Event::Failed {
                    id: self.id,
                    error: report,
                });
            }
        }

        self.state
    }

    async fn execute(&mut self) -> Result<Vec<std::path::PathBuf>> {
        let api = Arc::clone(&self.api);
        let retry = self.config.retry.clone();

        self.checkpoint()?;

        // Reject bad inputs before spending any network traffic on them
        if !self.spec.input.is_file() {
            return Err(Error::Validation(format!(
                "input file not found: {}",
                self.spec.input.display()
            )));
        }
        if !utils::is_supported_audio_file(&self.spec.input) {
            return Err(Error::Validation(format!(
                "unsupported audio format: {}",
                self.spec.input.display()
            )));
        }

        // Pending → Uploading
        self.set_status(Status::Uploading);
        self.emit(Event::Uploading { id: self.id });

        let filename = self
            .spec
            .input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());
        let bytes = Bytes::from(tokio::fs::read(&self.spec.input).await?);

        let upload_attempts = AtomicU32::new(0);
        let uploaded = with_retry(&retry, || {
            upload_attempts.fetch_add(1, Ordering::Relaxed);
            let api = Arc::clone(&api);
            let bytes = bytes.clone();
            let filename = filename.clone();
            async move { api.upload(bytes, &filename).await }
        })
        .await;
        self.state.attempts.upload = upload_attempts.into_inner();
        let uploaded = uploaded?;

        // Uploading → Submitted
        self.checkpoint()?;
        let create_attempts = AtomicU32::new(0);
        let task_id = with_retry(&retry, || {
            create_attempts.fetch_add(1, Ordering::Relaxed);
            let api = Arc::clone(&api);
            let uploaded = uploaded.clone();
            let spec = self.spec.clone();
            async move { api.create_task(&uploaded, &spec).await }
        })
        .await;
        self.state.attempts.create = create_attempts.into_inner();
        let task_id = task_id?;

        self.state.task_id = Some(task_id.clone());
        self.set_status(Status::Submitted);
        self.emit(Event::Submitted {
            id: self.id,
            task_id: task_id.clone(),
        });

        // Submitted → Polling
        self.checkpoint()?;
        self.set_status(Status::Polling);
        self.emit(Event::Polling { id: self.id });

        let deadline = Instant::now() + self.config.poll.job_timeout;
        let poll_attempts = AtomicU32::new(0);
        let snapshot = loop {
            self.checkpoint()?;

            let observed = with_retry(&retry, || {
                poll_attempts.fetch_add(1, Ordering::Relaxed);
                let api = Arc::clone(&api);
                let task_id = task_id.clone();
                async move { api.get_status(&task_id).await }
            })
            .await;
            self.state.attempts.poll = poll_attempts.load(Ordering::Relaxed);
            let observed = observed?;

            match observed.status {
                RemoteStatus::Failed => {
                    let reason = observed
                        .failure
                        .unwrap_or_else(|| "no reason supplied".to_string());
                    return Err(Error::RemoteTaskFailed(reason));
                }
                RemoteStatus::Completed => break observed,
                RemoteStatus::Queued | RemoteStatus::Processing => {}
            }

            if Instant::now() >= deadline {
                return Err(Error::PollTimeout {
                    elapsed: self.config.poll.job_timeout,
                });
            }

            // Wake immediately on cancellation instead of sleeping it out
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(self.config.poll.interval) => {}
            }
        };

        // Polling → Downloading
        self.checkpoint()?;
        if snapshot.results.is_empty() {
            return Err(Error::UnexpectedResponse(
                "completed task reported no output artifacts".to_string(),
            ));
        }

        self.set_status(Status::Downloading);
        self.emit(Event::Downloading {
            id: self.id,
            artifacts: snapshot.results.len(),
        });

        let download_attempts = AtomicU32::new(0);
        let mut outputs = Vec::with_capacity(snapshot.results.len());
        for artifact in &snapshot.results {
            self.checkpoint()?;

            let stream = with_retry(&retry, || {
                download_attempts.fetch_add(1, Ordering::Relaxed);
                let api = Arc::clone(&api);
                let artifact = artifact.clone();
                async move { api.fetch_result(&artifact).await }
            })
            .await;
            self.state.attempts.download = download_attempts.load(Ordering::Relaxed);
            let stream = stream?;

            let path = self.writer.write(&self.spec, artifact, stream).await?;
            outputs.push(path);
        }

        Ok(outputs)
    }

    fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    fn set_status(&mut self, status: Status) {
        tracing::debug!(
            job_id = %self.id,
            from = %self.state.status,
            to = %status,
            "Status transition"
        );
        self.state.status = status;
    }

    fn emit(&self, event: Event) {
        // send() fails when no one is subscribed, which is fine
        self.event_tx.send(event).ok();
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ArtifactStream;
    use crate::config::{ApiConfig, PollConfig, RetryConfig};
    use crate::error::ErrorKind;
    use crate::types::{ResultRef, TaskId, TaskSnapshot, UploadRef};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Configurable service stub shared across job tests
    #[derive(Default)]
    struct StubApi {
        fail_uploads: u32,
        create_error: Mutex<Option<Error>>,
        always_processing: bool,
        remote_failure: Option<String>,
        upload_calls: AtomicU32,
        create_calls: AtomicU32,
        status_calls: AtomicU32,
        fetch_calls: AtomicU32,
    }

    #[async_trait]
    impl SeparationApi for StubApi {
        async fn upload(&self, _bytes: Bytes, _filename: &str) -> Result<UploadRef> {
            let call = self.upload_calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_uploads {
                return Err(Error::ServiceUnavailable {
                    status: 503,
                    message: "stub outage".to_string(),
                });
            }
            Ok(UploadRef("asset-stub".to_string()))
        }

        async fn create_task(&self, _upload: &UploadRef, _spec: &JobSpec) -> Result<TaskId> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = self.create_error.lock().unwrap().take() {
                return Err(err);
            }
            Ok(TaskId("task-stub".to_string()))
        }

        async fn get_status(&self, _task: &TaskId) -> Result<TaskSnapshot> {
            self.status_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(reason) = &self.remote_failure {
                return Ok(TaskSnapshot {
                    status: RemoteStatus::Failed,
                    results: Vec::new(),
                    failure: Some(reason.clone()),
                });
            }
            if self.always_processing {
                return Ok(TaskSnapshot {
                    status: RemoteStatus::Processing,
                    results: Vec::new(),
                    failure: None,
                });
            }
            Ok(TaskSnapshot {
                status: RemoteStatus::Completed,
                results: vec![ResultRef {
                    name: "vocals".to_string(),
                    link: "https://stub.example.com/vocals.wav".to_string(),
                    format: Some("wav".to_string()),
                }],
                failure: None,
            })
        }

        async fn fetch_result(&self, _artifact: &ResultRef) -> Result<ArtifactStream> {
            self.fetch_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Box::pin(futures::stream::iter(vec![Ok(
                Bytes::from_static(b"stub-audio"),
            )])))
        }
    }

    fn test_config() -> Arc<Config> {
        Arc::new(Config {
            api: ApiConfig {
                api_key: "test".to_string(),
                ..ApiConfig::default()
            },
            retry: RetryConfig {
                max_attempts: 3,
                initial_delay: Duration::from_millis(5),
                max_delay: Duration::from_millis(20),
                backoff_multiplier: 2.0,
                jitter: false,
            },
            poll: PollConfig {
                interval: Duration::from_millis(10),
                job_timeout: Duration::from_secs(5),
            },
            workers: 2,
        })
    }

    /// Temp dir with one valid input file and a spec pointing at it
    fn test_spec(dir: &TempDir) -> JobSpec {
        let input = dir.path().join("song.mp3");
        std::fs::write(&input, b"fake audio bytes").unwrap();
        JobSpec::new(input, dir.path().join("out"))
    }

    fn make_job(spec: JobSpec, api: Arc<StubApi>) -> Job {
        let (event_tx, _rx) = broadcast::channel(64);
        Job::new(
            JobId::new(0),
            spec,
            api,
            test_config(),
            CancellationToken::new(),
            event_tx,
        )
    }

    #[tokio::test]
    async fn happy_path_completes_with_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(StubApi::default());
        let state = make_job(test_spec(&dir), api.clone()).run().await;

        assert_eq!(state.status, Status::Completed);
        assert_eq!(state.task_id, Some(TaskId("task-stub".to_string())));
        assert_eq!(state.outputs.len(), 1);
        assert!(state.outputs[0].ends_with("song_vocals.wav"));
        assert!(state.outputs[0].exists());
        assert!(state.error.is_none());
        assert_eq!(state.attempts.upload, 1);
        assert_eq!(state.attempts.create, 1);
    }

    #[tokio::test]
    async fn two_transient_upload_failures_retry_then_submit() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(StubApi {
            fail_uploads: 2,
            ..StubApi::default()
        });
        let state = make_job(test_spec(&dir), api.clone()).run().await;

        assert_eq!(state.status, Status::Completed);
        assert_eq!(
            api.upload_calls.load(Ordering::SeqCst),
            3,
            "two retries means exactly three upload calls"
        );
        assert_eq!(state.attempts.upload, 3);
    }

    #[tokio::test]
    async fn auth_error_on_create_fails_without_retry() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(StubApi {
            create_error: Mutex::new(Some(Error::Auth("key expired".to_string()))),
            ..StubApi::default()
        });
        let state = make_job(test_spec(&dir), api.clone()).run().await;

        assert_eq!(state.status, Status::Failed);
        assert_eq!(api.create_calls.load(Ordering::SeqCst), 1, "no retries");
        let error = state.error.unwrap();
        assert_eq!(error.kind, ErrorKind::Auth);
        // Task was never created, so no task id may be recorded
        assert!(state.task_id.is_none());
        assert!(state.outputs.is_empty());
    }

    #[tokio::test]
    async fn exhausted_upload_retries_fail_the_job() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(StubApi {
            fail_uploads: u32::MAX,
            ..StubApi::default()
        });
        let state = make_job(test_spec(&dir), api.clone()).run().await;

        assert_eq!(state.status, Status::Failed);
        assert_eq!(state.error.unwrap().kind, ErrorKind::TransientNetwork);
        // initial call + max_attempts retries
        assert_eq!(api.upload_calls.load(Ordering::SeqCst), 4);
        assert_eq!(state.attempts.upload, 4);
    }

    #[tokio::test]
    async fn remote_task_failure_is_terminal_with_reason() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(StubApi {
            remote_failure: Some("separation model rejected input".to_string()),
            ..StubApi::default()
        });
        let state = make_job(test_spec(&dir), api.clone()).run().await;

        assert_eq!(state.status, Status::Failed);
        assert_eq!(api.status_calls.load(Ordering::SeqCst), 1, "no poll retry after remote failure");
        let error = state.error.unwrap();
        assert_eq!(error.kind, ErrorKind::RemoteTaskFailed);
        assert!(error.message.contains("separation model rejected input"));
    }

    #[tokio::test]
    async fn polling_budget_exhaustion_fails_with_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(StubApi {
            always_processing: true,
            ..StubApi::default()
        });
        let mut config = Config::clone(&test_config());
        config.poll.job_timeout = Duration::from_millis(50);
        let (event_tx, _rx) = broadcast::channel(64);
        let job = Job::new(
            JobId::new(0),
            test_spec(&dir),
            api.clone(),
            Arc::new(config),
            CancellationToken::new(),
            event_tx,
        );

        let state = job.run().await;
        assert_eq!(state.status, Status::Failed);
        assert_eq!(state.error.unwrap().kind, ErrorKind::PollTimeout);
        assert!(api.status_calls.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn pre_cancelled_job_makes_no_network_calls() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(StubApi::default());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let (event_tx, _rx) = broadcast::channel(64);
        let job = Job::new(
            JobId::new(0),
            test_spec(&dir),
            api.clone(),
            test_config(),
            cancel,
            event_tx,
        );

        let state = job.run().await;
        assert_eq!(state.status, Status::Cancelled);
        assert_eq!(api.upload_calls.load(Ordering::SeqCst), 0);
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn cancellation_during_polling_stops_at_next_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(StubApi {
            always_processing: true,
            ..StubApi::default()
        });
        let cancel = CancellationToken::new();
        let (event_tx, _rx) = broadcast::channel(64);
        let job = Job::new(
            JobId::new(0),
            test_spec(&dir),
            api.clone(),
            test_config(),
            cancel.clone(),
            event_tx,
        );

        let handle = tokio::spawn(job.run());
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();

        let state = handle.await.unwrap();
        assert_eq!(state.status, Status::Cancelled);
        assert!(state.outputs.is_empty());
    }

    #[tokio::test]
    async fn missing_input_fails_validation_before_upload() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(StubApi::default());
        let spec = JobSpec::new(dir.path().join("nope.mp3"), dir.path());
        let state = make_job(spec, api.clone()).run().await;

        assert_eq!(state.status, Status::Failed);
        assert_eq!(state.error.unwrap().kind, ErrorKind::Validation);
        assert_eq!(api.upload_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unsupported_extension_fails_validation_before_upload() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("notes.txt");
        std::fs::write(&input, b"not audio").unwrap();
        let api = Arc::new(StubApi::default());
        let state = make_job(JobSpec::new(input, dir.path()), api.clone())
            .run()
            .await;

        assert_eq!(state.status, Status::Failed);
        assert_eq!(state.error.unwrap().kind, ErrorKind::Validation);
        assert_eq!(api.upload_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn rerun_after_failure_starts_from_fresh_state() {
        let dir = tempfile::tempdir().unwrap();
        let spec = test_spec(&dir);

        let failing = Arc::new(StubApi {
            fail_uploads: u32::MAX,
            ..StubApi::default()
        });
        let first = make_job(spec.clone(), failing).run().await;
        assert_eq!(first.status, Status::Failed);

        let healthy = Arc::new(StubApi::default());
        let second = make_job(spec, healthy).run().await;
        assert_eq!(second.status, Status::Completed);
        assert!(second.error.is_none());
        assert_eq!(second.attempts.upload, 1, "no residue from the failed run");
    }

    #[tokio::test]
    async fn lifecycle_events_are_emitted_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let api = Arc::new(StubApi::default());
        let (event_tx, mut rx) = broadcast::channel(64);
        let job = Job::new(
            JobId::new(7),
            test_spec(&dir),
            api,
            test_config(),
            CancellationToken::new(),
            event_tx,
        );

        let state = job.run().await;
        assert_eq!(state.status, Status::Completed);

        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            seen.push(event);
        }
        assert!(matches!(seen[0], Event::Uploading { .. }));
        assert!(matches!(seen[1], Event::Submitted { .. }));
        assert!(matches!(seen[2], Event::Polling { .. }));
        assert!(matches!(seen[3], Event::Downloading { artifacts: 1, .. }));
        assert!(matches!(seen[4], Event::Completed { .. }));
    }
}
