//! HTTP API layer exposing the hub operations.

use axum::{
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use haven_core::accounts::{Accounts, ProfileUpdate, Registration};
use haven_core::error::DomainError;
use haven_core::events::{Event, EventBus};
use haven_core::model::{
    ApprovalStatus, AppSettings, Asset, ChatRole, Listing, ModerationStatus, Product, Role,
    SupportTicket, TicketKind, Transaction, TransactionStatus, UserProfile,
};
use haven_core::moderation::{screen_documents, screen_listing, MediaValidator};
use haven_core::rental::RentalEngine;
use haven_core::store::{AssetSubmission, HubStore, ProductInput, TicketRequest};
use haven_core::triage::{ChatTurn, TriageReply, TriageService};
use haven_core::auth::TokenVerifier;

/// Authentication context extracted from the bearer token.
#[derive(Clone, Debug)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub role: Role,
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(auth) = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
        {
            if let Some(token) = auth.strip_prefix("Bearer ") {
                if let Some(claims) = state.verifier.verify(token).await {
                    return Ok(Self {
                        user_id: claims.sub,
                        role: claims.role,
                    });
                }
            }
        }
        Err(StatusCode::UNAUTHORIZED)
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<HubStore>,
    pub accounts: Arc<Accounts>,
    pub rentals: Arc<RentalEngine>,
    pub triage: Arc<TriageService>,
    pub validator: Arc<dyn MediaValidator>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub events: EventBus,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

type Rejection = (StatusCode, Json<ErrorBody>);
type ApiResult<T> = Result<T, Rejection>;

fn reject(err: DomainError) -> Rejection {
    let status = match &err {
        DomainError::NotFound { .. } => StatusCode::NOT_FOUND,
        DomainError::EmailTaken
        | DomainError::AssetUnavailable
        | DomainError::InvalidTransition { .. }
        | DomainError::TicketClosed
        | DomainError::Contention => StatusCode::CONFLICT,
        DomainError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        DomainError::AccountPending | DomainError::AccountRejected => StatusCode::FORBIDDEN,
        DomainError::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
        DomainError::StoreUnavailable(_) => StatusCode::BAD_GATEWAY,
        DomainError::Credential | DomainError::Token(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
}

fn forbidden() -> Rejection {
    (
        StatusCode::FORBIDDEN,
        Json(ErrorBody {
            error: "insufficient role".to_string(),
        }),
    )
}

fn require(auth: &AuthContext, roles: &[Role]) -> Result<(), Rejection> {
    if roles.contains(&auth.role) {
        Ok(())
    } else {
        Err(forbidden())
    }
}

#[derive(Deserialize)]
struct RegisterRequest {
    name: String,
    email: String,
    #[serde(default)]
    phone: String,
    password: String,
}

#[derive(Deserialize)]
struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
struct LoginResponse {
    token: String,
    user: UserProfile,
}

#[derive(Deserialize)]
struct ApprovalRequest {
    approval: ApprovalStatus,
}

#[derive(Deserialize)]
struct RoleRequest {
    role: Role,
}

#[derive(Deserialize)]
struct ProfileRequest {
    name: String,
    #[serde(default)]
    phone: String,
}

#[derive(Deserialize)]
struct KycRequest {
    front: String,
    back: String,
}

#[derive(Deserialize)]
struct LocationRequest {
    lat: f64,
    lng: f64,
}

#[derive(Deserialize)]
struct AssetRequest {
    name: String,
    description: String,
    #[serde(default)]
    handling_notes: Option<String>,
    listing: Listing,
    #[serde(default)]
    images: Vec<String>,
    #[serde(default)]
    ownership_video: Option<String>,
    location: String,
}

#[derive(Deserialize)]
struct ModerationRequest {
    moderation: ModerationStatus,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Deserialize)]
struct RentRequest {
    days: u32,
}

#[derive(Deserialize)]
struct TransitionRequest {
    status: TransactionStatus,
}

#[derive(Deserialize)]
struct TicketBody {
    kind: TicketKind,
    subject: String,
    message: String,
}

#[derive(Deserialize)]
struct ReplyRequest {
    reply: String,
}

#[derive(Deserialize)]
struct ProductRequest {
    name: String,
    price: u64,
    stock: u32,
    #[serde(default)]
    image: Option<String>,
    category: String,
}

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    nurse_mode: bool,
    #[serde(default)]
    history: Vec<ChatTurn>,
}

#[derive(Deserialize)]
struct SaveMessageRequest {
    role: ChatRole,
    text: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/users", get(list_users))
        .route("/users/{id}/approval", put(set_approval))
        .route("/users/{id}/role", put(set_role))
        .route("/users/{id}/profile", put(update_profile))
        .route("/users/{id}/kyc", post(submit_kyc))
        .route("/users/{id}/location", put(record_location))
        .route("/assets", get(marketplace).post(create_asset))
        .route("/assets/all", get(list_all_assets))
        .route("/assets/{id}", put(update_asset).delete(delete_asset))
        .route("/assets/{id}/moderation", put(set_moderation))
        .route("/assets/{id}/rent", post(rent_asset))
        .route("/assets/{id}/purchase", post(purchase_asset))
        .route("/rentals", get(list_transactions))
        .route("/rentals/{id}/status", put(advance_transaction))
        .route("/tickets", get(list_tickets).post(open_ticket))
        .route("/tickets/{id}/reply", put(reply_ticket))
        .route("/products", get(list_products).post(create_product))
        .route("/products/{id}", put(update_product).delete(delete_product))
        .route("/settings", get(get_settings).put(put_settings))
        .route("/triage/chat", post(triage_chat))
        .route("/triage/log", get(triage_log).post(save_chat_message))
        .route("/triage/log/{id}", axum::routing::delete(delete_chat_message))
        .with_state(state)
}

// ---- auth ------------------------------------------------------------------

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<Json<UserProfile>> {
    let profile = state
        .accounts
        .register(Registration {
            name: req.name,
            email: req.email,
            phone: req.phone,
            password: req.password,
        })
        .await
        .map_err(reject)?;
    Ok(Json(profile))
}

async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let outcome = state
        .accounts
        .login(&req.email, &req.password)
        .await
        .map_err(reject)?;
    Ok(Json(LoginResponse {
        token: outcome.token,
        user: outcome.profile,
    }))
}

// ---- users -----------------------------------------------------------------

async fn list_users(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<Vec<UserProfile>>> {
    require(&auth, &[Role::Admin])?;
    Ok(Json(state.store.list_profiles().await.map_err(reject)?))
}

async fn set_approval(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<ApprovalRequest>,
) -> ApiResult<StatusCode> {
    require(&auth, &[Role::Admin])?;
    state
        .accounts
        .set_approval(id, req.approval)
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_role(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<RoleRequest>,
) -> ApiResult<StatusCode> {
    require(&auth, &[Role::Admin])?;
    state.accounts.set_role(id, req.role).await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn update_profile(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<ProfileRequest>,
) -> ApiResult<Json<UserProfile>> {
    if auth.user_id != id {
        require(&auth, &[Role::Admin])?;
    }
    let profile = state
        .accounts
        .update_profile(
            id,
            ProfileUpdate {
                name: req.name,
                phone: req.phone,
            },
        )
        .await
        .map_err(reject)?;
    Ok(Json(profile))
}

async fn submit_kyc(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<KycRequest>,
) -> ApiResult<StatusCode> {
    if auth.user_id != id {
        return Err(forbidden());
    }
    // Advisory screening only: approval stays a manual admin action.
    let documents = [req.front.clone(), req.back.clone()];
    let verdict = screen_documents(state.validator.as_ref(), &documents, "identity documents").await;
    if !verdict.valid {
        tracing::warn!(user = %id, reason = ?verdict.reason, "kyc documents flagged for review");
    }
    state
        .accounts
        .submit_kyc(id, req.front, req.back)
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn record_location(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<LocationRequest>,
) -> ApiResult<StatusCode> {
    if auth.user_id != id {
        return Err(forbidden());
    }
    state
        .accounts
        .record_location(id, req.lat, req.lng)
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- assets ----------------------------------------------------------------

async fn marketplace(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> ApiResult<Json<Vec<Asset>>> {
    Ok(Json(state.store.marketplace().await.map_err(reject)?))
}

async fn list_all_assets(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<Vec<Asset>>> {
    require(&auth, &[Role::Admin])?;
    Ok(Json(state.store.list_assets().await.map_err(reject)?))
}

async fn create_asset(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<AssetRequest>,
) -> ApiResult<Json<Asset>> {
    let verdict = screen_listing(state.validator.as_ref(), &req.images, &req.description).await;
    let (moderation, rejection_reason) = if verdict.valid {
        (None, None)
    } else {
        (Some(ModerationStatus::Rejected), verdict.reason)
    };
    let asset = state
        .store
        .create_asset(AssetSubmission {
            name: req.name,
            description: req.description,
            handling_notes: req.handling_notes,
            listing: req.listing,
            images: req.images,
            ownership_video: req.ownership_video,
            owner_id: auth.user_id,
            location: req.location,
            moderation,
            rejection_reason,
        })
        .await
        .map_err(reject)?;
    state.events.send(Event::AssetSubmitted { asset: asset.id });
    Ok(Json(asset))
}

async fn require_asset_access(
    state: &AppState,
    auth: &AuthContext,
    id: Uuid,
) -> Result<Asset, Rejection> {
    let asset = state
        .store
        .list_assets()
        .await
        .map_err(reject)?
        .into_iter()
        .find(|a| a.id == id)
        .ok_or_else(|| reject(DomainError::not_found("asset", id)))?;
    if auth.role != Role::Admin && asset.owner_id != auth.user_id {
        return Err(forbidden());
    }
    Ok(asset)
}

async fn update_asset(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<AssetRequest>,
) -> ApiResult<Json<Asset>> {
    let stored = require_asset_access(&state, &auth, id).await?;
    let updated = state
        .store
        .update_asset(Asset {
            id,
            name: req.name,
            description: req.description,
            handling_notes: req.handling_notes,
            listing: req.listing,
            images: req.images,
            ownership_video: req.ownership_video,
            status: stored.status,
            moderation: stored.moderation,
            rejection_reason: stored.rejection_reason,
            owner_id: stored.owner_id,
            location: req.location,
        })
        .await
        .map_err(reject)?;
    Ok(Json(updated))
}

async fn delete_asset(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    require_asset_access(&state, &auth, id).await?;
    state.store.delete_asset(id).await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn set_moderation(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<ModerationRequest>,
) -> ApiResult<StatusCode> {
    require(&auth, &[Role::Admin])?;
    state
        .store
        .set_moderation(id, req.moderation, req.reason)
        .await
        .map_err(reject)?;
    state.events.send(Event::ModerationChanged {
        asset: id,
        moderation: req.moderation,
    });
    Ok(StatusCode::NO_CONTENT)
}

// ---- rentals ---------------------------------------------------------------

async fn rent_asset(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<RentRequest>,
) -> ApiResult<Json<Transaction>> {
    let renter = state.store.profile(auth.user_id).await.map_err(reject)?;
    let transaction = state
        .rentals
        .rent(id, &renter, req.days)
        .await
        .map_err(reject)?;
    Ok(Json(transaction))
}

async fn purchase_asset(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Transaction>> {
    let buyer = state.store.profile(auth.user_id).await.map_err(reject)?;
    let transaction = state.rentals.purchase(id, &buyer).await.map_err(reject)?;
    Ok(Json(transaction))
}

async fn list_transactions(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<Vec<Transaction>>> {
    let mut transactions = state.store.list_transactions().await.map_err(reject)?;
    if auth.role != Role::Admin {
        transactions.retain(|t| t.renter_id == auth.user_id || t.owner_id == auth.user_id);
    }
    Ok(Json(transactions))
}

async fn advance_transaction(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<TransitionRequest>,
) -> ApiResult<Json<Transaction>> {
    require(&auth, &[Role::Admin])?;
    let transaction = state
        .rentals
        .advance(id, req.status)
        .await
        .map_err(reject)?;
    Ok(Json(transaction))
}

// ---- tickets ---------------------------------------------------------------

async fn list_tickets(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<Vec<SupportTicket>>> {
    let mut tickets = state.store.list_tickets().await.map_err(reject)?;
    if auth.role != Role::Admin {
        tickets.retain(|t| t.user_id == auth.user_id);
    }
    Ok(Json(tickets))
}

async fn open_ticket(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<TicketBody>,
) -> ApiResult<Json<SupportTicket>> {
    let profile = state.store.profile(auth.user_id).await.map_err(reject)?;
    let ticket = state
        .store
        .open_ticket(TicketRequest {
            user_id: profile.id,
            user_name: profile.name,
            kind: req.kind,
            subject: req.subject,
            message: req.message,
        })
        .await
        .map_err(reject)?;
    state.events.send(Event::TicketOpened { ticket: ticket.id });
    Ok(Json(ticket))
}

async fn reply_ticket(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<ReplyRequest>,
) -> ApiResult<StatusCode> {
    require(&auth, &[Role::Admin])?;
    state.store.reply_ticket(id, req.reply).await.map_err(reject)?;
    state.events.send(Event::TicketResolved { ticket: id });
    Ok(StatusCode::NO_CONTENT)
}

// ---- products --------------------------------------------------------------

async fn list_products(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> ApiResult<Json<Vec<Product>>> {
    Ok(Json(state.store.list_products().await.map_err(reject)?))
}

async fn create_product(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<ProductRequest>,
) -> ApiResult<Json<Product>> {
    require(&auth, &[Role::Admin])?;
    let product = state
        .store
        .create_product(ProductInput {
            name: req.name,
            price: req.price,
            stock: req.stock,
            image: req.image,
            category: req.category,
        })
        .await
        .map_err(reject)?;
    Ok(Json(product))
}

async fn update_product(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<ProductRequest>,
) -> ApiResult<StatusCode> {
    require(&auth, &[Role::Admin])?;
    state
        .store
        .update_product(Product {
            id,
            name: req.name,
            price: req.price,
            stock: req.stock,
            image: req.image,
            category: req.category,
        })
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_product(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    require(&auth, &[Role::Admin])?;
    state.store.delete_product(id).await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- settings --------------------------------------------------------------

async fn get_settings(
    State(state): State<AppState>,
    _auth: AuthContext,
) -> ApiResult<Json<AppSettings>> {
    Ok(Json(state.store.settings().await.map_err(reject)?))
}

async fn put_settings(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(settings): Json<AppSettings>,
) -> ApiResult<StatusCode> {
    require(&auth, &[Role::Admin])?;
    state.store.update_settings(settings).await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- triage ----------------------------------------------------------------

async fn triage_chat(
    State(state): State<AppState>,
    _auth: AuthContext,
    Json(req): Json<ChatRequest>,
) -> ApiResult<Json<TriageReply>> {
    let reply = state
        .triage
        .converse(&req.history, &req.message, req.nurse_mode)
        .await
        .map_err(reject)?;
    Ok(Json(reply))
}

async fn triage_log(
    State(state): State<AppState>,
    auth: AuthContext,
) -> ApiResult<Json<Vec<haven_core::model::ChatMessage>>> {
    require(&auth, &[Role::Nurse, Role::Admin])?;
    Ok(Json(state.triage.log().await.map_err(reject)?))
}

async fn save_chat_message(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<SaveMessageRequest>,
) -> ApiResult<Json<Uuid>> {
    require(&auth, &[Role::Nurse, Role::Admin])?;
    let id = state
        .triage
        .save_message(req.role, req.text)
        .await
        .map_err(reject)?;
    Ok(Json(id))
}

async fn delete_chat_message(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    require(&auth, &[Role::Nurse, Role::Admin])?;
    state.triage.delete_message(id).await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}
