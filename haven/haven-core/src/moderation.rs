//! Fail-open media validation.
//!
//! Submissions in a human-moderated marketplace must never be blocked by an
//! unreachable validator, so every external check races a timer and the
//! fallback is "pass, pending manual review".

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Time the validator gets before a submission passes for manual review.
pub const VALIDATION_LIMIT: Duration = Duration::from_secs(60);

const LISTING_IMAGE_CAP: usize = 5;
const DOCUMENT_IMAGE_CAP: usize = 2;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Verdict {
    pub fn manual_review() -> Self {
        Self {
            valid: true,
            reason: Some("pending manual review".to_string()),
        }
    }
}

#[async_trait]
pub trait MediaValidator: Send + Sync {
    async fn assess(&self, images: &[String], context: &str) -> anyhow::Result<Verdict>;
}

/// Race an operation against a timer; timeout or error yields the fallback.
pub async fn fail_open<T, F>(op: F, limit: Duration, fallback: T) -> T
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(limit, op).await {
        Ok(Ok(value)) => value,
        Ok(Err(err)) => {
            tracing::warn!(%err, "validator failed, failing open");
            fallback
        }
        Err(_) => {
            tracing::warn!(limit = ?limit, "validator timed out, failing open");
            fallback
        }
    }
}

/// Screen a marketplace listing's images; at most five are sent.
pub async fn screen_listing(
    validator: &dyn MediaValidator,
    images: &[String],
    context: &str,
) -> Verdict {
    let images = &images[..images.len().min(LISTING_IMAGE_CAP)];
    fail_open(
        validator.assess(images, context),
        VALIDATION_LIMIT,
        Verdict::manual_review(),
    )
    .await
}

/// Screen an ID-document pair (front, back).
pub async fn screen_documents(
    validator: &dyn MediaValidator,
    images: &[String],
    context: &str,
) -> Verdict {
    let images = &images[..images.len().min(DOCUMENT_IMAGE_CAP)];
    fail_open(
        validator.assess(images, context),
        VALIDATION_LIMIT,
        Verdict::manual_review(),
    )
    .await
}

/// Validator used when no external service is configured.
pub struct ApproveAll;

#[async_trait]
impl MediaValidator for ApproveAll {
    async fn assess(&self, _images: &[String], _context: &str) -> anyhow::Result<Verdict> {
        Ok(Verdict {
            valid: true,
            reason: None,
        })
    }
}

/// reqwest client for the hosted validation service.
pub struct RemoteValidator {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

impl RemoteValidator {
    pub fn new(url: String, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            api_key,
        }
    }
}

#[derive(Serialize)]
struct AssessRequest<'a> {
    images: &'a [String],
    context: &'a str,
}

#[async_trait]
impl MediaValidator for RemoteValidator {
    async fn assess(&self, images: &[String], context: &str) -> anyhow::Result<Verdict> {
        let verdict = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&AssessRequest { images, context })
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(verdict)
    }
}
