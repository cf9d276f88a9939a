//! The persisted hub document and the entity types it aggregates.
//! The whole application state lives in one remote JSON document; every
//! collection here is a top-level field of that document.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Nurse,
    User,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

/// Last reported position of a user, kept for the companion features.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    /// Argon2 PHC string. Never leaves the store layer; listings and login
    /// return [`UserProfile`] instead.
    pub password_hash: String,
    pub role: Role,
    pub verified: bool,
    pub approval: ApprovalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_document_front: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_document_back: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_location: Option<GeoPoint>,
    pub created_at: DateTime<Utc>,
}

/// Credential-stripped projection of a [`UserAccount`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub role: Role,
    pub verified: bool,
    pub approval: ApprovalStatus,
}

impl From<&UserAccount> for UserProfile {
    fn from(account: &UserAccount) -> Self {
        Self {
            id: account.id,
            name: account.name.clone(),
            email: account.email.clone(),
            phone: account.phone.clone(),
            role: account.role,
            verified: account.verified,
            approval: account.approval,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    Available,
    Rented,
    Sold,
    Maintenance,
}

impl AssetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetStatus::Available => "available",
            AssetStatus::Rented => "rented",
            AssetStatus::Sold => "sold",
            AssetStatus::Maintenance => "maintenance",
        }
    }
}

/// How an asset is offered. Rent and sale are mutually exclusive, so the
/// price field lives inside the variant.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Listing {
    Rent { daily_rate: u64 },
    Sale { price: u64 },
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModerationStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Asset {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handling_notes: Option<String>,
    pub listing: Listing,
    /// Ordered; the first image is the cover.
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ownership_video: Option<String>,
    pub status: AssetStatus,
    /// Gates marketplace visibility, independently of `status`.
    pub moderation: ModerationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    /// Reference by convention only; never validated against `users`.
    pub owner_id: Uuid,
    pub location: String,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    PendingApproval,
    InTransit,
    Active,
    Returned,
    Disputed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::PendingApproval => "pending_approval",
            TransactionStatus::InTransit => "in_transit",
            TransactionStatus::Active => "active",
            TransactionStatus::Returned => "returned",
            TransactionStatus::Disputed => "disputed",
        }
    }

    /// A transaction still occupying its asset.
    pub fn is_open(&self) -> bool {
        !matches!(self, TransactionStatus::Returned | TransactionStatus::Disputed)
    }
}

/// One rental or purchase. Names and owner are snapshotted at creation and
/// never kept in sync afterwards.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub asset_id: Uuid,
    pub asset_name: String,
    pub renter_id: Uuid,
    pub renter_name: String,
    pub owner_id: Uuid,
    pub start_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    pub total_cost: u64,
    pub status: TransactionStatus,
    pub deposit_held: bool,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Model,
    Nurse,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Model => "model",
            ChatRole::Nurse => "nurse",
        }
    }
}

/// A durably persisted care-chat message. The live conversation buffer is
/// ephemeral; messages land here only when a nurse saves them or an
/// escalation forces an audit entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub role: ChatRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub escalated: bool,
    #[serde(default)]
    pub saved: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub price: u64,
    pub stock: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    pub category: String,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TicketKind {
    Complaint,
    Help,
    Return,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Pending,
    Resolved,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SupportTicket {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    pub kind: TicketKind,
    pub subject: String,
    pub message: String,
    pub status: TicketStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_reply: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Singleton organization settings, overwritten wholesale on save.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppSettings {
    pub org_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_url: Option<String>,
    /// Overrides the configured chat-service key when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_api_key: Option<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            org_name: "Haven".to_string(),
            logo_url: None,
            chat_api_key: None,
        }
    }
}

/// The whole persisted document. `#[serde(default)]` fills in any collection
/// a partial remote document omits, so callers never see a missing field.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HubDocument {
    pub users: Vec<UserAccount>,
    pub assets: Vec<Asset>,
    pub transactions: Vec<Transaction>,
    pub chat_log: Vec<ChatMessage>,
    pub products: Vec<Product>,
    pub tickets: Vec<SupportTicket>,
    pub settings: AppSettings,
}
