//! Core types and events for stemsep

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ErrorReport;

/// Unique identifier for a job within a batch
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl JobId {
    /// Create a new JobId
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for JobId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stem component requested from the separation service
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StemTarget {
    /// Vocal track
    #[default]
    Vocals,
    /// Everything except vocals
    Instrumental,
    /// Drum track
    Drums,
    /// Bass track
    Bass,
    /// Residual "other" stem
    Other,
}

impl StemTarget {
    /// Model name as the service expects it
    pub fn as_str(&self) -> &'static str {
        match self {
            StemTarget::Vocals => "vocals",
            StemTarget::Instrumental => "instrumental",
            StemTarget::Drums => "drums",
            StemTarget::Bass => "bass",
            StemTarget::Other => "other",
        }
    }
}

impl std::fmt::Display for StemTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output audio format for produced stems
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Uncompressed WAV (default)
    #[default]
    Wav,
    /// MP3
    Mp3,
    /// FLAC
    Flac,
}

impl OutputFormat {
    /// Format name as the service expects it (also the file extension)
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Wav => "wav",
            OutputFormat::Mp3 => "mp3",
            OutputFormat::Flac => "flac",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable description of one requested separation
///
/// Created once by the caller and never mutated by the engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobSpec {
    /// Source audio file
    pub input: PathBuf,
    /// Directory where produced stems are written
    pub output_dir: PathBuf,
    /// Requested stem component
    #[serde(default)]
    pub target: StemTarget,
    /// Requested output format
    #[serde(default)]
    pub format: OutputFormat,
    /// Optional model variant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    /// Also produce the residual stem (everything except the target)
    #[serde(default)]
    pub residual: bool,
}

impl JobSpec {
    /// Create a spec with default target (vocals) and format (wav)
    pub fn new(input: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output_dir: output_dir.into(),
            target: StemTarget::default(),
            format: OutputFormat::default(),
            variant: None,
            residual: false,
        }
    }

    /// Set the stem target
    pub fn target(mut self, target: StemTarget) -> Self {
        self.target = target;
        self
    }

    /// Set the output format
    pub fn format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the model variant
    pub fn variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }

    /// Request the residual stem alongside the target
    pub fn residual(mut self, residual: bool) -> Self {
        self.residual = residual;
        self
    }
}

/// Job status
///
/// Legal transitions run strictly forward through the pipeline:
/// `Pending → Uploading → Submitted → Polling → Downloading → Completed`,
/// with `Failed` reachable from any in-flight status and `Cancelled` from
/// any non-terminal one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Created, not yet started
    Pending,
    /// Reading the input and uploading it to the service
    Uploading,
    /// Separation task created, not yet polling
    Submitted,
    /// Waiting for the remote task to finish
    Polling,
    /// Fetching and writing result artifacts
    Downloading,
    /// All artifacts written
    Completed,
    /// Terminal failure (error recorded)
    Failed,
    /// Cancelled before completion
    Cancelled,
}

impl Status {
    /// Whether no further transition can occur from this status
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Completed | Status::Failed | Status::Cancelled)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Status::Pending => "pending",
            Status::Uploading => "uploading",
            Status::Submitted => "submitted",
            Status::Polling => "polling",
            Status::Downloading => "downloading",
            Status::Completed => "completed",
            Status::Failed => "failed",
            Status::Cancelled => "cancelled",
        };
        write!(f, "{name}")
    }
}

/// Reference to an uploaded asset on the service
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadRef(pub String);

impl std::fmt::Display for UploadRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a separation task on the service
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to one produced artifact of a completed task
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRef {
    /// Stem name reported by the service (e.g., "vocals")
    pub name: String,
    /// Download link for the artifact
    pub link: String,
    /// Audio format reported by the service, if any
    pub format: Option<String>,
}

/// Remote task status, reduced to the vocabulary the engine understands
///
/// The service's own status strings are mapped onto this set at the client
/// boundary; unrecognized strings count as [`Processing`](RemoteStatus::Processing).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoteStatus {
    /// Accepted, waiting for a processing slot
    Queued,
    /// Separation in progress
    Processing,
    /// All targets finished successfully
    Completed,
    /// At least one target failed
    Failed,
}

/// One observation of a remote task's state
#[derive(Clone, Debug)]
pub struct TaskSnapshot {
    /// Reduced remote status
    pub status: RemoteStatus,
    /// Result artifacts, populated once the task is completed
    pub results: Vec<ResultRef>,
    /// Failure reason supplied by the service, if the task failed
    pub failure: Option<String>,
}

/// Per-phase attempt counters
///
/// Each counter records how many calls the corresponding operation made,
/// including retries. Never exceeds `1 + retry.max_attempts` per operation
/// (the poll counter accumulates across poll iterations).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseAttempts {
    /// Upload calls
    pub upload: u32,
    /// Task creation calls
    pub create: u32,
    /// Status poll calls
    pub poll: u32,
    /// Artifact fetch calls
    pub download: u32,
}

/// Mutable record owned by a running job
///
/// Mutated only by the owning job's run loop; becomes effectively immutable
/// once a terminal status is recorded.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobState {
    /// Current status
    pub status: Status,
    /// Remote task identifier, assigned when the task is created
    pub task_id: Option<TaskId>,
    /// Attempt counters per phase
    pub attempts: PhaseAttempts,
    /// Error that terminated the job, if it failed
    pub error: Option<ErrorReport>,
    /// Local paths of written stems; non-empty iff completed
    pub outputs: Vec<PathBuf>,
}

impl JobState {
    /// Fresh state for a newly constructed job
    pub fn new() -> Self {
        Self {
            status: Status::Pending,
            task_id: None,
            attempts: PhaseAttempts::default(),
            error: None,
            outputs: Vec::new(),
        }
    }
}

impl Default for JobState {
    fn default() -> Self {
        Self::new()
    }
}

/// Event emitted during a job's lifecycle
///
/// The scheduler exposes these over a broadcast channel so consumers (CLI
/// progress display, GUI) can observe jobs without the engine depending on
/// any UI technology. Dropping all receivers is fine; events are then
/// discarded.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Job accepted into the batch
    Queued {
        /// Job ID
        id: JobId,
        /// Source file
        input: PathBuf,
    },

    /// Job started uploading its input
    Uploading {
        /// Job ID
        id: JobId,
    },

    /// Separation task created on the service
    Submitted {
        /// Job ID
        id: JobId,
        /// Remote task identifier
        task_id: TaskId,
    },

    /// Job is polling for remote completion
    Polling {
        /// Job ID
        id: JobId,
    },

    /// Remote task finished; artifacts are being fetched
    Downloading {
        /// Job ID
        id: JobId,
        /// Number of artifacts to fetch
        artifacts: usize,
    },

    /// Job completed; all stems written
    Completed {
        /// Job ID
        id: JobId,
        /// Written stem paths
        outputs: Vec<PathBuf>,
    },

    /// Job failed
    Failed {
        /// Job ID
        id: JobId,
        /// Error that terminated the job
        error: ErrorReport,
    },

    /// Job was cancelled
    Cancelled {
        /// Job ID
        id: JobId,
    },
}
