use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use haven::api::{self, AppState};
use haven::config::ServerConfig;
use haven_core::accounts::Accounts;
use haven_core::auth::Hs256Tokens;
use haven_core::events::EventBus;
use haven_core::moderation::{ApproveAll, MediaValidator, RemoteValidator};
use haven_core::rental::RentalEngine;
use haven_core::store::{DocumentHost, HubStore, MemoryHost, RemoteHost, RemoteHostConfig};
use haven_core::triage::{
    ChatModel, GenerativeClient, GenerativeClientConfig, KeywordClassifier, OfflineModel,
    TriageService, DEFAULT_ESCALATION_TERMS,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("haven=info,haven_core=info")),
        )
        .init();

    let host: Arc<dyn DocumentHost> = match &config.store_url {
        Some(url) => Arc::new(RemoteHost::new(RemoteHostConfig {
            url: url.clone(),
            access_key: config.store_key.clone(),
        })),
        None => {
            tracing::warn!("no document host configured, state will not survive a restart");
            Arc::new(MemoryHost::new())
        }
    };
    let store = Arc::new(HubStore::new(host));
    let tokens = Arc::new(Hs256Tokens::new(&config.jwt_secret));
    let events = EventBus::new();

    let accounts = Arc::new(Accounts::new(store.clone(), tokens.clone(), events.clone()));
    accounts
        .seed_admin(&config.admin_email, &config.admin_password)
        .await?;

    let rentals = Arc::new(RentalEngine::new(store.clone(), events.clone()));

    let model: Arc<dyn ChatModel> = match &config.chat_endpoint {
        Some(endpoint) => Arc::new(
            GenerativeClient::new(GenerativeClientConfig {
                endpoint: endpoint.clone(),
                api_key: config.chat_api_key.clone(),
                primary_model: config.chat_model.clone(),
                fallback_model: config.chat_fallback_model.clone(),
            })
            .with_key_override(store.clone()),
        ),
        None => {
            tracing::warn!("no chat service configured, triage will serve fallback replies");
            Arc::new(OfflineModel)
        }
    };
    let terms = DEFAULT_ESCALATION_TERMS
        .iter()
        .map(|t| t.to_string())
        .chain(config.escalation_terms.iter().cloned());
    let triage = Arc::new(TriageService::new(
        store.clone(),
        model,
        Arc::new(KeywordClassifier::new(terms)),
        events.clone(),
    ));

    let validator: Arc<dyn MediaValidator> = match &config.validator_url {
        Some(url) => Arc::new(RemoteValidator::new(
            url.clone(),
            config.validator_key.clone(),
        )),
        None => Arc::new(ApproveAll),
    };

    // Audit trail: every domain event lands in the structured log.
    let mut audit_rx = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = audit_rx.recv().await {
            tracing::info!(target: "haven::audit", event = ?event, "domain event");
        }
    });

    let app = api::router(AppState {
        store,
        accounts,
        rentals,
        triage,
        validator,
        verifier: tokens,
        events,
    })
    .layer(TraceLayer::new_for_http())
    .layer(CorsLayer::permissive());

    let listener = TcpListener::bind(&config.bind).await?;
    tracing::info!(bind = %config.bind, "listening");
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
