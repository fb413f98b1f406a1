//! # stemsep
//!
//! Batch client library for a remote audio stem-separation service.
//!
//! stemsep takes local audio files, submits them for source separation, polls
//! the service until each task finishes, and streams the produced stems back
//! to disk. The whole pipeline runs as a batch under a configurable
//! concurrency limit, with per-phase retry, cooperative cancellation, and a
//! per-file outcome report.
//!
//! ## Design Philosophy
//!
//! stemsep is designed to be:
//! - **Library-first** - No CLI or UI, purely a Rust crate for embedding
//! - **Batch-oriented** - One call processes many files; partial failure is
//!   a normal outcome, reported per file rather than aborting the run
//! - **Event-driven** - Consumers subscribe to lifecycle events, no polling
//!   required
//! - **Stub-friendly** - The service boundary is a trait, so the pipeline is
//!   testable without a network
//!
//! ## Quick Start
//!
//! ```no_run
//! use stemsep::{ApiConfig, Config, JobSpec, Scheduler, StemTarget};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config {
//!         api: ApiConfig {
//!             api_key: std::env::var("STEMSEP_API_KEY")?,
//!             ..Default::default()
//!         },
//!         ..Default::default()
//!     };
//!
//!     let scheduler = Scheduler::new(config)?;
//!
//!     // Subscribe to events
//!     let mut events = scheduler.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let specs = vec![
//!         JobSpec::new("music/one.mp3", "stems").target(StemTarget::Vocals),
//!         JobSpec::new("music/two.mp3", "stems").target(StemTarget::Drums),
//!     ];
//!     let report = scheduler.run(specs).await?;
//!     println!("{} succeeded, {} failed", report.succeeded(), report.failed());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Remote service client and the API boundary trait
pub mod client;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Per-file job state machine
pub mod job;
/// Output artifact persistence
pub mod output;
/// Batch outcome aggregation
pub mod report;
/// Retry logic with exponential backoff
pub mod retry;
/// Batch scheduler with bounded concurrency
pub mod scheduler;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use client::{ArtifactStream, RemoteServiceClient, SeparationApi};
pub use config::{ApiConfig, Config, PollConfig, RetryConfig};
pub use error::{Error, ErrorKind, ErrorReport, Result};
pub use job::Job;
pub use output::OutputWriter;
pub use report::{BatchReport, BatchSummary, JobOutcome};
pub use retry::{IsRetryable, with_retry};
pub use scheduler::Scheduler;
pub use types::{
    Event, JobId, JobSpec, JobState, OutputFormat, PhaseAttempts, RemoteStatus, ResultRef, Status,
    StemTarget, TaskId, TaskSnapshot, UploadRef,
};
pub use utils::{SUPPORTED_EXTENSIONS, find_audio_files, is_supported_audio_file};
