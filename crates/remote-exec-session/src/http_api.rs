//! Content API over HTTP.

use async_trait::async_trait;
use remote_exec_core::{ContentApi, ContentApiError, CreateProcessResponse, ProcessSpec};

const USER_AGENT: &str = concat!("remote-exec/", env!("CARGO_PKG_VERSION"));

/// Creates processes with `POST {base}/exec`.
#[derive(Debug, Clone)]
pub struct HttpContentApi {
    client: reqwest::Client,
    base: String,
}

impl HttpContentApi {
    /// Client for the API rooted at `base`.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(base: impl Into<String>) -> Result<Self, ContentApiError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ContentApiError::Request(e.to_string()))?;
        Ok(Self::with_client(client, base))
    }

    /// Use an existing client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, base: impl Into<String>) -> Self {
        let base = base.into().trim_end_matches('/').to_string();
        Self { client, base }
    }

    fn exec_url(&self) -> String {
        format!("{}/exec", self.base)
    }
}

#[async_trait]
impl ContentApi for HttpContentApi {
    async fn create_process(
        &self,
        spec: &ProcessSpec,
    ) -> Result<CreateProcessResponse, ContentApiError> {
        let url = self.exec_url();
        tracing::debug!(%url, executor = %spec.executor_kind, "Requesting process creation");

        let response = self
            .client
            .post(&url)
            .json(spec)
            .send()
            .await
            .map_err(|e| ContentApiError::Request(e.to_string()))?;

        // Failure responses carry a JSON body too
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ContentApiError::Request(e.to_string()))?;

        serde_json::from_slice(&body).map_err(|e| {
            tracing::warn!(%status, "Undecodable content API response: {e}");
            ContentApiError::Decode(format!("{status}: {e}"))
        })
    }
}
