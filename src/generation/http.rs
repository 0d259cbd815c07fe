//! HTTP collaborators
//!
//! JSON clients for a generation backend and a quality-analysis backend.
//! Both speak camelCase payloads:
//!
//! - `POST <generator_url>` `{prompt, options}` -> `{success, artifactRef, error?}`
//! - `POST <analyzer_url>` `{artifactRef, templateId, context}` -> `{rawScore, errors, success}`

use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{AnalysisContext, AnalysisReport, GenerateOptions, GeneratedArtifact, Generator, QualityAnalyzer};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    prompt: &'a str,
    options: &'a GenerateOptions,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    success: bool,
    #[serde(default)]
    artifact_ref: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl GenerateResponse {
    fn into_artifact(self) -> Result<GeneratedArtifact> {
        match (self.success, self.artifact_ref) {
            (true, Some(artifact_ref)) => Ok(GeneratedArtifact { artifact_ref }),
            (true, None) => bail!("Generator reported success without an artifact"),
            (false, _) => bail!(
                "Generator failed: {}",
                self.error.unwrap_or_else(|| "no error given".to_string())
            ),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeRequest<'a> {
    artifact_ref: &'a str,
    template_id: &'a str,
    context: &'a AnalysisContext,
}

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

async fn post_json<B: Serialize + ?Sized, R: for<'de> Deserialize<'de>>(
    client: &Client,
    url: &str,
    body: &B,
    what: &str,
) -> Result<R> {
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .with_context(|| format!("Failed to send request to {}", what))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        bail!("{} error ({}): {}", what, status, body);
    }

    response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", what))
}

/// Generator backed by an HTTP endpoint
pub struct HttpGenerator {
    client: Arc<Client>,
    url: String,
}

impl HttpGenerator {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Arc::new(build_client(timeout)?),
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl Generator for HttpGenerator {
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<GeneratedArtifact> {
        debug!("Requesting generation from {} ({} chars)", self.url, prompt.len());
        let response: GenerateResponse = post_json(
            &self.client,
            &self.url,
            &GenerateRequest { prompt, options },
            "generator",
        )
        .await?;
        response.into_artifact()
    }
}

/// Quality analyzer backed by an HTTP endpoint
pub struct HttpAnalyzer {
    client: Arc<Client>,
    url: String,
}

impl HttpAnalyzer {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Arc::new(build_client(timeout)?),
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl QualityAnalyzer for HttpAnalyzer {
    async fn analyze(
        &self,
        artifact_ref: &str,
        template_id: &str,
        context: &AnalysisContext,
    ) -> Result<AnalysisReport> {
        debug!("Requesting analysis of {} from {}", artifact_ref, self.url);
        post_json(
            &self.client,
            &self.url,
            &AnalyzeRequest {
                artifact_ref,
                template_id,
                context,
            },
            "analyzer",
        )
        .await
    }
}
