//! In-process document host honoring the same conditional-save contract as
//! the remote one. Used by the test suites and for local development when no
//! remote host is configured.

use super::{DocumentHost, SaveOutcome, Versioned};
use crate::error::DomainError;
use crate::model::HubDocument;
use async_trait::async_trait;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct MemoryHost {
    state: Mutex<(u64, HubDocument)>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(doc: HubDocument) -> Self {
        Self {
            state: Mutex::new((0, doc)),
        }
    }
}

#[async_trait]
impl DocumentHost for MemoryHost {
    async fn fetch(&self) -> Result<Versioned, DomainError> {
        let state = self.state.lock().await;
        Ok(Versioned {
            revision: state.0,
            doc: state.1.clone(),
        })
    }

    async fn save(&self, doc: &HubDocument, expected: u64) -> Result<SaveOutcome, DomainError> {
        let mut state = self.state.lock().await;
        if state.0 != expected {
            return Ok(SaveOutcome::Conflict);
        }
        state.0 += 1;
        state.1 = doc.clone();
        Ok(SaveOutcome::Saved { revision: state.0 })
    }
}
