//! Output artifact persistence
//!
//! Streams fetched stem artifacts to disk under a job's destination
//! directory using the deterministic naming scheme
//! `{input-basename}_{stem}.{extension}`.

use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use futures::StreamExt;

use crate::client::ArtifactStream;
use crate::error::Result;
use crate::types::{JobSpec, ResultRef};

/// Writes completed artifacts to the destination directory
///
/// Stateless; concurrent jobs may share one instance. Distinct inputs derive
/// distinct filenames, so cross-job writes never need locking. Existing
/// files at the destination path are overwritten (last-writer-wins).
#[derive(Clone, Copy, Debug, Default)]
pub struct OutputWriter;

impl OutputWriter {
    /// Create a writer
    pub fn new() -> Self {
        Self
    }

    /// Stream one artifact to its destination path
    ///
    /// Creates the destination directory if absent. Any filesystem or stream
    /// error propagates; the caller marks the job failed since the
    /// user-visible deliverable was not produced.
    pub async fn write(
        &self,
        spec: &JobSpec,
        artifact: &ResultRef,
        mut stream: ArtifactStream,
    ) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&spec.output_dir).await?;

        let path = self.artifact_path(spec, artifact);
        let mut file = tokio::fs::File::create(&path).await?;

        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;

        tracing::debug!(path = %path.display(), stem = artifact.name, "Artifact written");
        Ok(path)
    }

    /// Destination path for one artifact: `{input-basename}_{stem}.{extension}`
    pub fn artifact_path(&self, spec: &JobSpec, artifact: &ResultRef) -> PathBuf {
        let base = spec
            .input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        let extension = artifact_extension(spec, artifact);
        spec.output_dir
            .join(format!("{}_{}.{}", base, artifact.name, extension))
    }
}

/// Pick the artifact's file extension
///
/// Prefers the format the service reported for the artifact, then the suffix
/// of the download link, then the format the job requested.
fn artifact_extension(spec: &JobSpec, artifact: &ResultRef) -> String {
    if let Some(format) = &artifact.format {
        if !format.is_empty() {
            return format.to_ascii_lowercase();
        }
    }
    // Presigned links carry query strings; strip them before looking at the suffix
    let link_path = artifact.link.split('?').next().unwrap_or("");
    if let Some(ext) = Path::new(link_path).extension() {
        return ext.to_string_lossy().to_ascii_lowercase();
    }
    spec.format.as_str().to_string()
}
