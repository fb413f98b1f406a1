//! Remote separation service client
//!
//! Thin, stateless wrappers around the service's four operations: upload an
//! asset, create a separation task, poll task status, and fetch a result
//! artifact. Each is a single HTTP call with an explicit timeout. No retry
//! logic lives here; failures are only classified (see [`crate::retry`]).
//!
//! The service's loosely-typed payloads are mapped onto the crate's fixed
//! vocabulary at this boundary; nothing untyped flows past it into the job
//! or scheduler logic.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, TryStreamExt};
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use url::Url;

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::types::{JobSpec, RemoteStatus, ResultRef, TaskId, TaskSnapshot, UploadRef};

/// Streamed artifact body
///
/// Result artifacts are streamed rather than buffered whole so memory stays
/// bounded for large audio files.
pub type ArtifactStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Operations the job state machine needs from the separation service
///
/// Implemented by [`RemoteServiceClient`] for the real service and by stubs
/// in tests. Implementations must be stateless across calls so a single
/// instance can be shared by concurrently running jobs.
#[async_trait]
pub trait SeparationApi: Send + Sync {
    /// Upload an audio file, returning a reference to the stored asset
    async fn upload(&self, bytes: Bytes, filename: &str) -> Result<UploadRef>;

    /// Create a separation task for an uploaded asset
    async fn create_task(&self, upload: &UploadRef, spec: &JobSpec) -> Result<TaskId>;

    /// Fetch the current status of a task
    async fn get_status(&self, task: &TaskId) -> Result<TaskSnapshot>;

    /// Open a byte stream for one result artifact
    async fn fetch_result(&self, artifact: &ResultRef) -> Result<ArtifactStream>;
}

/// HTTP client for the remote separation service
///
/// Holds no mutable state across calls; safe to share across concurrent jobs
/// behind an `Arc`.
#[derive(Debug)]
pub struct RemoteServiceClient {
    http: reqwest::Client,
    base_url: Url,
    config: ApiConfig,
}

impl RemoteServiceClient {
    /// Create a client from an API configuration
    ///
    /// Fails with a configuration error if the API key is empty or the base
    /// URL does not parse.
    pub fn new(config: ApiConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(Error::Config {
                message: "API key is not set".to_string(),
                key: Some("api.api_key".to_string()),
            });
        }

        // Normalize to a trailing slash so Url::join appends instead of
        // replacing the last path segment
        let normalized = if config.base_url.ends_with('/') {
            config.base_url.clone()
        } else {
            format!("{}/", config.base_url)
        };
        let base_url = Url::parse(&normalized).map_err(|e| Error::Config {
            message: format!("invalid base URL '{}': {}", config.base_url, e),
            key: Some("api.base_url".to_string()),
        })?;

        let http = reqwest::Client::builder().build()?;

        Ok(Self {
            http,
            base_url,
            config,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url.join(path).map_err(|e| Error::Config {
            message: format!("cannot build endpoint '{path}': {e}"),
            key: Some("api.base_url".to_string()),
        })
    }
}

#[async_trait]
impl SeparationApi for RemoteServiceClient {
    async fn upload(&self, bytes: Bytes, filename: &str) -> Result<UploadRef> {
        let url = self.endpoint("assets")?;
        let part = Part::stream(reqwest::Body::from(bytes)).file_name(filename.to_string());
        let form = Form::new().part("file", part);

        let response = self
            .http
            .post(url)
            .header("x-api-key", &self.config.api_key)
            .multipart(form)
            .timeout(self.config.upload_timeout)
            .send()
            .await?;

        let body: AssetResponse = parse_response(response).await?;
        let id = body
            .id
            .ok_or_else(|| Error::UnexpectedResponse("asset response missing 'id'".to_string()))?;

        tracing::debug!(asset_id = %id, filename, "Asset uploaded");
        Ok(UploadRef(id))
    }

    async fn create_task(&self, upload: &UploadRef, spec: &JobSpec) -> Result<TaskId> {
        let url = self.endpoint("tasks")?;
        let request = TaskRequest {
            asset_id: &upload.0,
            targets: vec![TargetRequest {
                model: spec.target.as_str(),
                formats: vec![spec.format.as_str()],
                variant: spec.variant.as_deref(),
                residual: spec.residual,
            }],
        };

        let response = self
            .http
            .post(url)
            .header("x-api-key", &self.config.api_key)
            .json(&request)
            .timeout(self.config.request_timeout)
            .send()
            .await?;

        let body: TaskCreatedResponse = parse_response(response).await?;
        let id = body
            .id
            .ok_or_else(|| Error::UnexpectedResponse("task response missing 'id'".to_string()))?;

        tracing::debug!(task_id = %id, asset_id = %upload.0, "Separation task created");
        Ok(TaskId(id))
    }

    async fn get_status(&self, task: &TaskId) -> Result<TaskSnapshot> {
        let url = self.endpoint(&format!("tasks/{}", task.0))?;

        let response = self
            .http
            .get(url)
            .header("x-api-key", &self.config.api_key)
            .timeout(self.config.status_timeout)
            .send()
            .await?;

        let body: TaskStatusResponse = parse_response(response).await?;
        Ok(reduce_targets(&body.targets))
    }

    async fn fetch_result(&self, artifact: &ResultRef) -> Result<ArtifactStream> {
        // Artifact links are usually absolute (presigned storage URLs); the
        // API key is deliberately not forwarded to them
        let url = Url::parse(&artifact.link)
            .or_else(|_| self.base_url.join(&artifact.link))
            .map_err(|e| {
                Error::UnexpectedResponse(format!("invalid artifact link '{}': {}", artifact.link, e))
            })?;

        let response = self
            .http
            .get(url)
            .timeout(self.config.download_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_http_error(status, &body));
        }

        Ok(Box::pin(response.bytes_stream().map_err(Error::from)))
    }
}

/// Check the HTTP status and deserialize the JSON body
async fn parse_response<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(map_http_error(status, &body));
    }
    let parsed = response.json::<T>().await?;
    Ok(parsed)
}

/// Map an HTTP error status onto the crate's error taxonomy
fn map_http_error(status: StatusCode, body: &str) -> Error {
    let message = truncate_body(body);
    match status.as_u16() {
        401 | 403 => Error::Auth(format!("service rejected credential: {message}")),
        429 => Error::QuotaExceeded(message),
        400 | 404 | 422 => Error::Validation(message),
        code if status.is_server_error() => Error::ServiceUnavailable {
            status: code,
            message,
        },
        code => Error::UnexpectedResponse(format!("HTTP {code}: {message}")),
    }
}

/// Truncate a response body for error messages
fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "(empty body)".to_string()
    } else if trimmed.len() <= MAX {
        trimmed.to_string()
    } else {
        let cut = trimmed
            .char_indices()
            .take_while(|(i, _)| *i < MAX)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(MAX);
        format!("{}…", &trimmed[..cut])
    }
}

/// Reduce per-target statuses to one [`TaskSnapshot`]
///
/// The task is failed if any target failed, completed only when every target
/// is completed. Unrecognized status strings are treated as still processing
/// so a new service-side state does not break the poll loop.
fn reduce_targets(targets: &[TargetStatus]) -> TaskSnapshot {
    if targets.is_empty() {
        return TaskSnapshot {
            status: RemoteStatus::Processing,
            results: Vec::new(),
            failure: None,
        };
    }

    let mut all_completed = true;
    let mut all_queued = true;
    for target in targets {
        match target.status.as_str() {
            "failed" => {
                let reason = target
                    .error
                    .clone()
                    .unwrap_or_else(|| "no reason supplied".to_string());
                return TaskSnapshot {
                    status: RemoteStatus::Failed,
                    results: Vec::new(),
                    failure: Some(reason),
                };
            }
            "completed" => {
                all_queued = false;
            }
            "queued" => {
                all_completed = false;
            }
            "processing" => {
                all_completed = false;
                all_queued = false;
            }
            other => {
                tracing::warn!(status = other, "Unrecognized remote status, treating as processing");
                all_completed = false;
                all_queued = false;
            }
        }
    }

    if all_completed {
        let results = targets
            .iter()
            .flat_map(|t| t.output.iter())
            .filter_map(|out| {
                let link = out.link.clone()?;
                Some(ResultRef {
                    name: out.name.clone().unwrap_or_else(|| "output".to_string()),
                    link,
                    format: out.format.clone(),
                })
            })
            .collect();
        TaskSnapshot {
            status: RemoteStatus::Completed,
            results,
            failure: None,
        }
    } else if all_queued {
        TaskSnapshot {
            status: RemoteStatus::Queued,
            results: Vec::new(),
            failure: None,
        }
    } else {
        TaskSnapshot {
            status: RemoteStatus::Processing,
            results: Vec::new(),
            failure: None,
        }
    }
}

#[derive(Deserialize)]
struct AssetResponse {
    id: Option<String>,
}

#[derive(Deserialize)]
struct TaskCreatedResponse {
    id: Option<String>,
}

#[derive(Serialize)]
struct TaskRequest<'a> {
    #[serde(rename = "assetId")]
    asset_id: &'a str,
    targets: Vec<TargetRequest<'a>>,
}

#[derive(Serialize)]
struct TargetRequest<'a> {
    model: &'a str,
    formats: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    variant: Option<&'a str>,
    #[serde(skip_serializing_if = "is_false")]
    residual: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Deserialize)]
struct TaskStatusResponse {
    #[serde(default)]
    targets: Vec<TargetStatus>,
}

#[derive(Deserialize)]
struct TargetStatus {
    #[serde(default)]
    status: String,
    error: Option<String>,
    #[serde(default)]
    output: Vec<OutputEntry>,
}

#[derive(Deserialize)]
struct OutputEntry {
    name: Option<String>,
    link: Option<String>,
    format: Option<String>,
}
