//! External job-runner boundary.
//! The scheduler hands tasks off here fire-and-forget; it never waits on
//! job completion. Lookup-or-create must be safe to call repeatedly for
//! the same key.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::task::{JobKind, LifecycleTarget, Task};

/// Wire spec submitted when creating a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub key: Uuid,
    pub kind: JobKind,
    pub namespace: String,
    pub name: String,
}

impl JobSpec {
    pub fn for_task<T: LifecycleTarget>(task: &Task<T>) -> Self {
        let object_ref = task.target().object_ref();
        Self {
            key: task.key(),
            kind: task.kind(),
            namespace: object_ref.namespace.clone(),
            name: object_ref.name.clone(),
        }
    }
}

/// Execution phase reported by the job runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// State of an existing external job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub key: Uuid,
    pub phase: JobPhase,
}

/// Outcome of an idempotent submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobSubmission {
    /// No job existed for the key; one was created.
    Created,
    /// A job already existed; its current phase is reported.
    Existing(JobPhase),
}

/// The out-of-core subsystem that actually performs a scan/install.
#[async_trait]
pub trait JobRunner<T: LifecycleTarget>: Send + Sync {
    /// Look up an existing job by key; `None` when absent.
    async fn find_job(&self, key: Uuid) -> Result<Option<JobStatus>>;

    /// Create a job for the task.
    async fn create_job(&self, task: &Task<T>) -> Result<()>;

    /// Idempotent lookup-or-create: inspect an existing job by key, or
    /// create one when absent.
    async fn ensure_job(&self, task: &Task<T>) -> Result<JobSubmission> {
        if let Some(status) = self.find_job(task.key()).await? {
            return Ok(JobSubmission::Existing(status.phase));
        }
        self.create_job(task).await?;
        Ok(JobSubmission::Created)
    }
}

/// REST client for the job-runner service.
#[derive(Clone)]
pub struct HttpJobRunner {
    client: Client,
    base_url: Arc<str>,
}

impl HttpJobRunner {
    pub fn new(base_url: impl Into<Arc<str>>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("building job runner HTTP client")?;
        Ok(Self {
            client,
            base_url: normalize_base_url(base_url),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl<T: LifecycleTarget> JobRunner<T> for HttpJobRunner {
    async fn find_job(&self, key: Uuid) -> Result<Option<JobStatus>> {
        let resp = self
            .client
            .get(self.url(&format!("jobs/{key}")))
            .send()
            .await
            .context("looking up job")?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!(
                "job lookup failed status={} body_sample={}",
                status,
                truncate_body_snippet(&text, 500)
            );
        }
        let job: JobStatus = resp.json().await.context("parsing job status")?;
        Ok(Some(job))
    }

    async fn create_job(&self, task: &Task<T>) -> Result<()> {
        let spec = JobSpec::for_task(task);
        let resp = self
            .client
            .post(self.url("jobs"))
            .json(&spec)
            .send()
            .await
            .context("creating job")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!(
                "job create failed status={} body_sample={}",
                status,
                truncate_body_snippet(&text, 500)
            );
        }
        Ok(())
    }
}

fn normalize_base_url(base_url: impl Into<Arc<str>>) -> Arc<str> {
    let raw: Arc<str> = base_url.into();
    let trimmed = raw.trim_end_matches('/');
    if trimmed.len() == raw.len() {
        raw
    } else {
        Arc::from(trimmed)
    }
}

fn truncate_body_snippet(body: &str, max: usize) -> &str {
    match body.char_indices().nth(max) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
