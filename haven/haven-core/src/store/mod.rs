//! Shared-document persistence: the document-host seam and the entity
//! collection operations layered on it.
//!
//! Everything the application persists lives in one [`HubDocument`] on a
//! remote host. The host exposes exactly two primitives, a versioned fetch
//! and a conditional save, and every mutation in the system goes through
//! [`HubStore::mutate`]: fetch, apply a closure in memory, save against the
//! fetched revision, retry from a fresh fetch when a concurrent writer got
//! there first. Preconditions checked inside the closure therefore hold at
//! the revision that actually commits.

mod memory;
mod remote;

pub use memory::MemoryHost;
pub use remote::{RemoteHost, RemoteHostConfig};

use crate::error::DomainError;
use crate::model::{
    AppSettings, Asset, AssetStatus, ChatMessage, HubDocument, Listing, ModerationStatus, Product,
    SupportTicket, TicketKind, TicketStatus, Transaction, UserProfile,
};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// A document together with the revision it was read at.
#[derive(Clone, Debug)]
pub struct Versioned {
    pub revision: u64,
    pub doc: HubDocument,
}

/// Outcome of a conditional save.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved { revision: u64 },
    /// The document moved past the expected revision; nothing was written.
    Conflict,
}

/// The two primitive operations against the document host.
#[async_trait]
pub trait DocumentHost: Send + Sync {
    async fn fetch(&self) -> Result<Versioned, DomainError>;
    async fn save(&self, doc: &HubDocument, expected: u64) -> Result<SaveOutcome, DomainError>;
}

/// Attempts before a mutation gives up with [`DomainError::Contention`].
const MAX_SAVE_ATTEMPTS: u32 = 5;

/// New-asset submission. Moderation is forced to `Pending` unless the caller
/// supplies an explicit outcome (e.g. an upfront validation rejection).
pub struct AssetSubmission {
    pub name: String,
    pub description: String,
    pub handling_notes: Option<String>,
    pub listing: Listing,
    pub images: Vec<String>,
    pub ownership_video: Option<String>,
    pub owner_id: Uuid,
    pub location: String,
    pub moderation: Option<ModerationStatus>,
    pub rejection_reason: Option<String>,
}

pub struct TicketRequest {
    pub user_id: Uuid,
    pub user_name: String,
    pub kind: TicketKind,
    pub subject: String,
    pub message: String,
}

pub struct ProductInput {
    pub name: String,
    pub price: u64,
    pub stock: u32,
    pub image: Option<String>,
    pub category: String,
}

pub struct HubStore {
    host: Arc<dyn DocumentHost>,
}

impl HubStore {
    pub fn new(host: Arc<dyn DocumentHost>) -> Self {
        Self { host }
    }

    /// Fetch the current document.
    pub async fn read(&self) -> Result<HubDocument, DomainError> {
        Ok(self.host.fetch().await?.doc)
    }

    /// Read-modify-write with optimistic retry. The closure re-runs against
    /// fresh state whenever a conflicting writer committed first, so it must
    /// be re-applicable; domain errors it returns abort the cycle without
    /// writing.
    pub async fn mutate<T, F>(&self, op: F) -> Result<T, DomainError>
    where
        F: Fn(&mut HubDocument) -> Result<T, DomainError>,
    {
        for attempt in 0..MAX_SAVE_ATTEMPTS {
            let Versioned { revision, mut doc } = self.host.fetch().await?;
            let out = op(&mut doc)?;
            match self.host.save(&doc, revision).await? {
                SaveOutcome::Saved { .. } => return Ok(out),
                SaveOutcome::Conflict => {
                    tracing::debug!(attempt, "document revision moved, retrying mutation");
                }
            }
        }
        Err(DomainError::Contention)
    }

    // ---- users ------------------------------------------------------------

    /// All accounts, credential-stripped.
    pub async fn list_profiles(&self) -> Result<Vec<UserProfile>, DomainError> {
        Ok(self.read().await?.users.iter().map(UserProfile::from).collect())
    }

    pub async fn profile(&self, id: Uuid) -> Result<UserProfile, DomainError> {
        self.read()
            .await?
            .users
            .iter()
            .find(|u| u.id == id)
            .map(UserProfile::from)
            .ok_or_else(|| DomainError::not_found("user", id))
    }

    // ---- assets -----------------------------------------------------------

    /// The renter/buyer view: moderation-approved listings only. `status`
    /// does not gate visibility, only rentability.
    pub async fn marketplace(&self) -> Result<Vec<Asset>, DomainError> {
        Ok(self
            .read()
            .await?
            .assets
            .into_iter()
            .filter(|a| a.moderation == ModerationStatus::Approved)
            .collect())
    }

    pub async fn list_assets(&self) -> Result<Vec<Asset>, DomainError> {
        Ok(self.read().await?.assets)
    }

    pub async fn create_asset(&self, submission: AssetSubmission) -> Result<Asset, DomainError> {
        let asset = Asset {
            id: Uuid::new_v4(),
            name: submission.name,
            description: submission.description,
            handling_notes: submission.handling_notes,
            listing: submission.listing,
            images: submission.images,
            ownership_video: submission.ownership_video,
            status: AssetStatus::Available,
            moderation: submission.moderation.unwrap_or(ModerationStatus::Pending),
            rejection_reason: submission.rejection_reason,
            owner_id: submission.owner_id,
            location: submission.location,
        };
        self.mutate(|doc| {
            doc.assets.push(asset.clone());
            Ok(())
        })
        .await?;
        Ok(asset)
    }

    /// Replace the asset matching `asset.id`. Status, moderation and owner
    /// are carried over from the stored record; edits go through the
    /// dedicated transitions instead.
    pub async fn update_asset(&self, asset: Asset) -> Result<Asset, DomainError> {
        self.mutate(|doc| {
            let stored = doc
                .assets
                .iter_mut()
                .find(|a| a.id == asset.id)
                .ok_or_else(|| DomainError::not_found("asset", asset.id))?;
            let mut updated = asset.clone();
            updated.status = stored.status;
            updated.moderation = stored.moderation;
            updated.rejection_reason = stored.rejection_reason.clone();
            updated.owner_id = stored.owner_id;
            *stored = updated.clone();
            Ok(updated)
        })
        .await
    }

    pub async fn delete_asset(&self, id: Uuid) -> Result<(), DomainError> {
        self.mutate(|doc| {
            let before = doc.assets.len();
            doc.assets.retain(|a| a.id != id);
            if doc.assets.len() == before {
                return Err(DomainError::not_found("asset", id));
            }
            Ok(())
        })
        .await
    }

    pub async fn set_moderation(
        &self,
        id: Uuid,
        moderation: ModerationStatus,
        reason: Option<String>,
    ) -> Result<(), DomainError> {
        self.mutate(|doc| {
            let asset = doc
                .assets
                .iter_mut()
                .find(|a| a.id == id)
                .ok_or_else(|| DomainError::not_found("asset", id))?;
            asset.moderation = moderation;
            asset.rejection_reason = if moderation == ModerationStatus::Rejected {
                reason.clone()
            } else {
                None
            };
            Ok(())
        })
        .await
    }

    // ---- transactions -----------------------------------------------------

    /// All transactions, most recent start date first.
    pub async fn list_transactions(&self) -> Result<Vec<Transaction>, DomainError> {
        let mut transactions = self.read().await?.transactions;
        transactions.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        Ok(transactions)
    }

    // ---- tickets ----------------------------------------------------------

    /// All tickets, newest first.
    pub async fn list_tickets(&self) -> Result<Vec<SupportTicket>, DomainError> {
        let mut tickets = self.read().await?.tickets;
        tickets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tickets)
    }

    pub async fn open_ticket(&self, request: TicketRequest) -> Result<SupportTicket, DomainError> {
        let ticket = SupportTicket {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            user_name: request.user_name,
            kind: request.kind,
            subject: request.subject,
            message: request.message,
            status: TicketStatus::Pending,
            admin_reply: None,
            created_at: Utc::now(),
        };
        self.mutate(|doc| {
            doc.tickets.push(ticket.clone());
            Ok(())
        })
        .await?;
        Ok(ticket)
    }

    /// One-shot `Pending -> Resolved`; there is no reopen path.
    pub async fn reply_ticket(&self, id: Uuid, reply: String) -> Result<(), DomainError> {
        self.mutate(|doc| {
            let ticket = doc
                .tickets
                .iter_mut()
                .find(|t| t.id == id)
                .ok_or_else(|| DomainError::not_found("ticket", id))?;
            if ticket.status == TicketStatus::Resolved {
                return Err(DomainError::TicketClosed);
            }
            ticket.status = TicketStatus::Resolved;
            ticket.admin_reply = Some(reply.clone());
            Ok(())
        })
        .await
    }

    // ---- products ---------------------------------------------------------

    pub async fn list_products(&self) -> Result<Vec<Product>, DomainError> {
        Ok(self.read().await?.products)
    }

    pub async fn create_product(&self, input: ProductInput) -> Result<Product, DomainError> {
        let product = Product {
            id: Uuid::new_v4(),
            name: input.name,
            price: input.price,
            stock: input.stock,
            image: input.image,
            category: input.category,
        };
        self.mutate(|doc| {
            doc.products.push(product.clone());
            Ok(())
        })
        .await?;
        Ok(product)
    }

    pub async fn update_product(&self, product: Product) -> Result<(), DomainError> {
        self.mutate(|doc| {
            let stored = doc
                .products
                .iter_mut()
                .find(|p| p.id == product.id)
                .ok_or_else(|| DomainError::not_found("product", product.id))?;
            *stored = product.clone();
            Ok(())
        })
        .await
    }

    pub async fn delete_product(&self, id: Uuid) -> Result<(), DomainError> {
        self.mutate(|doc| {
            let before = doc.products.len();
            doc.products.retain(|p| p.id != id);
            if doc.products.len() == before {
                return Err(DomainError::not_found("product", id));
            }
            Ok(())
        })
        .await
    }

    // ---- chat log ---------------------------------------------------------

    pub async fn append_chat(&self, message: ChatMessage) -> Result<(), DomainError> {
        self.mutate(|doc| {
            doc.chat_log.push(message.clone());
            Ok(())
        })
        .await
    }

    pub async fn chat_log(&self) -> Result<Vec<ChatMessage>, DomainError> {
        Ok(self.read().await?.chat_log)
    }

    pub async fn delete_chat(&self, id: Uuid) -> Result<(), DomainError> {
        self.mutate(|doc| {
            let before = doc.chat_log.len();
            doc.chat_log.retain(|m| m.id != id);
            if doc.chat_log.len() == before {
                return Err(DomainError::not_found("chat message", id));
            }
            Ok(())
        })
        .await
    }

    // ---- settings ---------------------------------------------------------

    pub async fn settings(&self) -> Result<AppSettings, DomainError> {
        Ok(self.read().await?.settings)
    }

    /// Overwrites the singleton wholesale.
    pub async fn update_settings(&self, settings: AppSettings) -> Result<(), DomainError> {
        self.mutate(|doc| {
            doc.settings = settings.clone();
            Ok(())
        })
        .await
    }
}
