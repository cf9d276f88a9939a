//! reqwest-backed document host.
//!
//! The remote speaks a narrow protocol: `GET <url>` returns
//! `{ "record": <partial document> }` with the revision in the `ETag`
//! header, `PUT <url>` writes the full document conditionally via
//! `If-Match` and answers `412` when the revision moved. Authentication is
//! a single static key header.

use super::{DocumentHost, SaveOutcome, Versioned};
use crate::error::DomainError;
use crate::model::HubDocument;
use async_trait::async_trait;
use reqwest::header::{self, HeaderValue};
use reqwest::StatusCode;
use serde::Deserialize;

const ACCESS_KEY_HEADER: &str = "x-access-key";

#[derive(Clone, Debug)]
pub struct RemoteHostConfig {
    pub url: String,
    pub access_key: String,
}

pub struct RemoteHost {
    client: reqwest::Client,
    config: RemoteHostConfig,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    record: HubDocument,
}

fn revision_from_etag(value: Option<&HeaderValue>) -> u64 {
    let Some(raw) = value.and_then(|v| v.to_str().ok()) else {
        return 0;
    };
    let raw = raw.strip_prefix("W/").unwrap_or(raw);
    raw.trim_matches('"').parse().unwrap_or(0)
}

impl RemoteHost {
    pub fn new(config: RemoteHostConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl DocumentHost for RemoteHost {
    async fn fetch(&self) -> Result<Versioned, DomainError> {
        let resp = self
            .client
            .get(&self.config.url)
            .header(ACCESS_KEY_HEADER, &self.config.access_key)
            .send()
            .await
            .map_err(|e| DomainError::StoreUnavailable(e.to_string()))?;
        // Nothing stored yet: start from the empty document at revision 0.
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(Versioned {
                revision: 0,
                doc: HubDocument::default(),
            });
        }
        if !resp.status().is_success() {
            return Err(DomainError::StoreUnavailable(format!(
                "fetch returned {}",
                resp.status()
            )));
        }
        let revision = revision_from_etag(resp.headers().get(header::ETAG));
        let envelope: Envelope = resp
            .json()
            .await
            .map_err(|e| DomainError::StoreUnavailable(e.to_string()))?;
        Ok(Versioned {
            revision,
            doc: envelope.record,
        })
    }

    async fn save(&self, doc: &HubDocument, expected: u64) -> Result<SaveOutcome, DomainError> {
        let resp = self
            .client
            .put(&self.config.url)
            .header(ACCESS_KEY_HEADER, &self.config.access_key)
            .header(header::IF_MATCH, format!("\"{expected}\""))
            .json(doc)
            .send()
            .await
            .map_err(|e| DomainError::StoreUnavailable(e.to_string()))?;
        if resp.status() == StatusCode::PRECONDITION_FAILED {
            return Ok(SaveOutcome::Conflict);
        }
        if !resp.status().is_success() {
            return Err(DomainError::StoreUnavailable(format!(
                "save returned {}",
                resp.status()
            )));
        }
        let revision = revision_from_etag(resp.headers().get(header::ETAG));
        Ok(SaveOutcome::Saved { revision })
    }
}
