//! HTTP job store client

use super::{JobRef, JobRequest, JobState, JobStore};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;
use url::Url;

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Deserialize)]
struct JobObject {
    #[serde(default)]
    status: JobObjectStatus,
}

#[derive(Deserialize, Default)]
struct JobObjectStatus {
    #[serde(default)]
    state: String,
}

/// Job store speaking a small REST protocol:
///
/// - `POST {base}/namespaces/{ns}/jobs` creates a job from a [`JobRequest`]
/// - `GET {base}/namespaces/{ns}/jobs/{name}` returns `{"status": {"state": ..}}`
pub struct HttpJobStore {
    client: Client,
    base_url: String,
}

impl HttpJobStore {
    /// Create a client for the job system at `base_url`
    pub fn new(base_url: &str) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("invalid job store url {base_url:?}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "job store url must be http(s), got {base_url:?}"
            )));
        }

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| Error::JobStore(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn jobs_url(&self, namespace: &str) -> String {
        format!(
            "{}/namespaces/{}/jobs",
            self.base_url,
            urlencoding::encode(namespace)
        )
    }
}

#[async_trait]
impl JobStore for HttpJobStore {
    async fn create(&self, request: &JobRequest) -> Result<JobRef> {
        debug!(job = %request.name, pulls = request.pulls.len(), "creating job");
        self.client
            .post(self.jobs_url(&request.namespace))
            .json(request)
            .send()
            .await
            .map_err(|e| Error::JobStore(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::JobStore(format!("create failed: {e}")))?;

        Ok(JobRef {
            namespace: request.namespace.clone(),
            name: request.name.clone(),
        })
    }

    async fn state(&self, job: &JobRef) -> Result<JobState> {
        let url = format!(
            "{}/{}",
            self.jobs_url(&job.namespace),
            urlencoding::encode(&job.name)
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::JobStore(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::JobNotFound(job.to_string()));
        }

        let object: JobObject = response
            .error_for_status()
            .map_err(|e| Error::JobStore(format!("get failed: {e}")))?
            .json()
            .await
            .map_err(|e| Error::JobStore(format!("failed to parse job: {e}")))?;

        let state = JobState::parse(&object.status.state);
        debug!(%job, ?state, "polled job");
        Ok(state)
    }
}
