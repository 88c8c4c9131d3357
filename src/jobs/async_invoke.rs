//! Asynchronous invocations (video generation)
//!
//! Async jobs write their output to S3. Besides starting and listing jobs,
//! this module mirrors finished jobs into a local directory: one folder per
//! job holding either `failed.json` or `completed.json` plus the generated
//! video.

use crate::core::client::{BedrockClient, Service};
use crate::core::provider::BedrockError;
use crate::jobs::poller::{JobStatus, PollError, Poller};
use crate::models::bedrock::{
    AsyncInvokeJob, AsyncInvokeStatus, AsyncOutputDataConfig, ListAsyncInvokesResponse,
    StartAsyncInvokeRequest, StartAsyncInvokeResponse,
};
use crate::storage::{ObjectStore, S3Uri, StorageError};
use chrono::{DateTime, Local, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

const ASYNC_INVOKE: &str = "async-invoke";
const FAILED_FILE: &str = "failed.json";
const COMPLETED_FILE: &str = "completed.json";
const START_RESPONSE_FILE: &str = "start_async_invoke_response.json";
const MODEL_INPUT_FILE: &str = "model_input.json";
const VIDEO_EXTENSION: &str = ".mp4";

#[derive(Error, Debug)]
pub enum AsyncJobError {
    #[error(transparent)]
    Bedrock(#[from] BedrockError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize job: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl JobStatus for AsyncInvokeJob {
    fn is_terminal(&self) -> bool {
        matches!(self.status, AsyncInvokeStatus::Completed | AsyncInvokeStatus::Failed)
    }

    fn label(&self) -> String {
        self.status.as_str().to_string()
    }
}

/// Nova Reel text-to-video input
pub fn text_to_video_input(prompt: &str, duration_secs: u32, seed: u32) -> Value {
    json!({
        "taskType": "TEXT_VIDEO",
        "textToVideoParams": {"text": prompt},
        "videoGenerationConfig": {
            "durationSeconds": duration_secs,
            "fps": 24,
            "dimension": "1280x720",
            "seed": seed
        }
    })
}

/// Start an async invocation and return its ARN
pub async fn start(
    client: &BedrockClient,
    model_id: &str,
    model_input: Value,
    s3_output_uri: &str,
) -> Result<String, BedrockError> {
    let request = StartAsyncInvokeRequest {
        model_id: model_id.to_string(),
        model_input,
        output_data_config: AsyncOutputDataConfig::s3(s3_output_uri),
        client_request_token: None,
    };

    let response: StartAsyncInvokeResponse = client
        .post_json(Service::Runtime, &[ASYNC_INVOKE], &request)
        .await?;

    info!("Started async invocation {}", response.invocation_arn);
    Ok(response.invocation_arn)
}

pub async fn get(client: &BedrockClient, invocation_arn: &str) -> Result<AsyncInvokeJob, BedrockError> {
    client
        .get_json(Service::Runtime, &[ASYNC_INVOKE, invocation_arn], &[])
        .await
}

/// List jobs, optionally filtered by status and submit time; follows pagination
pub async fn list(
    client: &BedrockClient,
    status: Option<AsyncInvokeStatus>,
    submit_time_after: Option<DateTime<Utc>>,
) -> Result<Vec<AsyncInvokeJob>, BedrockError> {
    let submit_after = submit_time_after.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true));
    let mut jobs = Vec::new();
    let mut next_token: Option<String> = None;

    loop {
        let mut query: Vec<(&str, &str)> = Vec::new();
        if let Some(status) = status {
            query.push(("statusEquals", status.as_str()));
        }
        if let Some(after) = &submit_after {
            query.push(("submitTimeAfter", after.as_str()));
        }
        if let Some(token) = &next_token {
            query.push(("nextToken", token.as_str()));
        }

        let page: ListAsyncInvokesResponse = client
            .get_json(Service::Runtime, &[ASYNC_INVOKE], &query)
            .await?;
        jobs.extend(page.async_invoke_summaries);

        match page.next_token {
            Some(token) if !token.is_empty() => next_token = Some(token),
            _ => break,
        }
    }

    Ok(jobs)
}

/// Poll one invocation until it completes or fails
pub async fn wait(
    client: &BedrockClient,
    invocation_arn: &str,
    poller: &Poller,
) -> Result<AsyncInvokeJob, PollError> {
    poller
        .poll_until(invocation_arn, || get(client, invocation_arn))
        .await
}

/// Last path segment of an invocation ARN
pub fn job_id_from_arn(invocation_arn: &str) -> &str {
    invocation_arn.rsplit('/').next().unwrap_or(invocation_arn)
}

/// Local-time submit timestamp followed by the job id
pub fn folder_name_for_job(job: &AsyncInvokeJob) -> String {
    let submitted = job.submit_time.with_timezone(&Local);
    format!(
        "{}_{}",
        submitted.format("%Y-%m-%d_%H-%M-%S"),
        job_id_from_arn(&job.invocation_arn)
    )
}

/// Seconds from submission to end, or to `now` while still running
pub fn elapsed_secs(job: &AsyncInvokeJob, now: DateTime<Utc>) -> i64 {
    (job.end_time.unwrap_or(now) - job.submit_time).num_seconds()
}

async fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<(), AsyncJobError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| AsyncJobError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
    }
    let body = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, body).await.map_err(|source| AsyncJobError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Record a just-started job in its local folder
///
/// Looks the job up to learn its submit time, then writes the start
/// response and the model input next to where its output will land.
/// Returns the job folder.
pub async fn save_invocation_info(
    client: &BedrockClient,
    invocation_arn: &str,
    model_input: &Value,
    output_dir: &Path,
) -> Result<PathBuf, AsyncJobError> {
    let job = get(client, invocation_arn).await?;
    let folder = output_dir.join(folder_name_for_job(&job));

    let started = StartAsyncInvokeResponse {
        invocation_arn: invocation_arn.to_string(),
    };
    write_json(&started, &folder.join(START_RESPONSE_FILE)).await?;
    write_json(model_input, &folder.join(MODEL_INPUT_FILE)).await?;

    info!("Recorded job {} in {}", job_id_from_arn(invocation_arn), folder.display());
    Ok(folder)
}

/// Record a failed job; returns false when it was already recorded
pub async fn save_failed_job(job: &AsyncInvokeJob, output_dir: &Path) -> Result<bool, AsyncJobError> {
    let path = output_dir.join(folder_name_for_job(job)).join(FAILED_FILE);
    if path.exists() {
        return Ok(false);
    }

    write_json(job, &path).await?;
    warn!(
        "Job {} failed: {}",
        job_id_from_arn(&job.invocation_arn),
        job.failure_message.as_deref().unwrap_or("no failure message")
    );
    Ok(true)
}

/// Download the video of a completed job and record it
///
/// Returns false when the video is already present locally or the job left
/// no `.mp4` output.
pub async fn save_completed_job(
    job: &AsyncInvokeJob,
    output_dir: &Path,
    store: &dyn ObjectStore,
) -> Result<bool, AsyncJobError> {
    let job_id = job_id_from_arn(&job.invocation_arn);
    let folder = output_dir.join(folder_name_for_job(job));
    let video_path = folder.join(format!("{job_id}{VIDEO_EXTENSION}"));
    if video_path.exists() {
        return Ok(false);
    }

    let output = S3Uri::parse(&job.output_data_config.s3_output_data_config.s3_uri)?;
    let keys = store.list_keys(&output.bucket, job_id).await?;
    let Some(video_key) = keys.iter().find(|key| key.ends_with(VIDEO_EXTENSION)) else {
        warn!("Job {} completed but no video was found under s3://{}/{}", job_id, output.bucket, job_id);
        return Ok(false);
    };

    store.download(&output.bucket, video_key, &video_path).await?;
    write_json(job, &folder.join(COMPLETED_FILE)).await?;

    info!(
        "Saved job {} ({}s) to {}",
        job_id,
        elapsed_secs(job, Utc::now()),
        folder.display()
    );
    Ok(true)
}

async fn save_finished(
    job: &AsyncInvokeJob,
    output_dir: &Path,
    store: &dyn ObjectStore,
) -> Result<bool, AsyncJobError> {
    match job.status {
        AsyncInvokeStatus::Failed => save_failed_job(job, output_dir).await,
        AsyncInvokeStatus::Completed => save_completed_job(job, output_dir, store).await,
        _ => Ok(false),
    }
}

/// Counts of jobs saved by `monitor_and_download`
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSummary {
    pub completed: usize,
    pub failed: usize,
}

impl MonitorSummary {
    fn record(&mut self, job: &AsyncInvokeJob, saved: bool) {
        if !saved {
            return;
        }
        match job.status {
            AsyncInvokeStatus::Completed => self.completed += 1,
            AsyncInvokeStatus::Failed => self.failed += 1,
            _ => {}
        }
    }
}

/// Save every finished job, then follow in-progress jobs until none remain
pub async fn monitor_and_download(
    client: &BedrockClient,
    store: &dyn ObjectStore,
    output_dir: &Path,
    submit_time_after: Option<DateTime<Utc>>,
    interval: Duration,
) -> Result<MonitorSummary, AsyncJobError> {
    let mut summary = MonitorSummary::default();

    for status in [AsyncInvokeStatus::Failed, AsyncInvokeStatus::Completed] {
        for job in list(client, Some(status), submit_time_after).await? {
            let saved = save_finished(&job, output_dir, store).await?;
            summary.record(&job, saved);
        }
    }

    let mut pending: HashSet<String> = HashSet::new();
    loop {
        let running = list(client, Some(AsyncInvokeStatus::InProgress), submit_time_after).await?;
        let running_arns: HashSet<String> = running.iter().map(|j| j.invocation_arn.clone()).collect();

        for finished in pending.difference(&running_arns) {
            let job = get(client, finished).await?;
            let saved = save_finished(&job, output_dir, store).await?;
            summary.record(&job, saved);
        }

        if running_arns.is_empty() {
            break;
        }

        let now = Utc::now();
        for job in &running {
            info!(
                "Job {} in progress ({}s elapsed)",
                job_id_from_arn(&job.invocation_arn),
                elapsed_secs(job, now)
            );
        }

        pending = running_arns;
        tokio::time::sleep(interval).await;
    }

    info!(
        "Monitoring finished: {} completed, {} failed",
        summary.completed, summary.failed
    );
    Ok(summary)
}
