//! Health-chat escalation and conversation orchestration.
//!
//! The escalation decision is made before the model is consulted and is
//! never revised by a model failure: the classifier picks the persona, the
//! persona picks the fallback copy, and an escalated turn always leaves an
//! audit entry in the chat log.

use crate::error::DomainError;
use crate::events::{Event, EventBus};
use crate::model::{ChatMessage, ChatRole};
use crate::store::HubStore;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Terms that force the triage persona when present in a message.
pub const DEFAULT_ESCALATION_TERMS: &[&str] = &[
    "emergency",
    "bleeding",
    "unconscious",
    "overdose",
    "suicide",
    "chest pain",
    "can't breathe",
    "cannot breathe",
    "seizure",
    "severe pain",
    "miscarriage",
    "assault",
];

/// Shown when the model is unreachable on an escalated turn.
pub const ESCALATED_FALLBACK: &str = "We could not reach the care assistant. If this is an \
     emergency, contact your local emergency number now - do not wait for this chat.";

/// Shown when the model is unreachable on an ordinary turn.
pub const GENERIC_FALLBACK: &str =
    "The assistant is handling a lot of traffic right now. Please try again in a moment.";

/// How long a settings lookup for the key override may hold up a turn.
const KEY_LOOKUP_LIMIT: Duration = Duration::from_millis(1500);

/// Strategy seam: swap the keyword list for a smarter classifier without
/// touching callers.
pub trait EscalationPolicy: Send + Sync {
    fn classify(&self, text: &str, nurse_mode: bool) -> bool;
}

pub struct KeywordClassifier {
    terms: Vec<String>,
}

impl KeywordClassifier {
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            terms: terms
                .into_iter()
                .map(|t| t.as_ref().to_lowercase())
                .collect(),
        }
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_ESCALATION_TERMS)
    }
}

impl EscalationPolicy for KeywordClassifier {
    /// Case-insensitive substring match; no stemming, no negation awareness.
    fn classify(&self, text: &str, nurse_mode: bool) -> bool {
        if nurse_mode {
            return true;
        }
        let text = text.to_lowercase();
        self.terms.iter().any(|term| text.contains(term.as_str()))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn reply(
        &self,
        system: &str,
        history: &[ChatTurn],
        message: &str,
    ) -> anyhow::Result<String>;
}

/// Stand-in when no chat service is configured; every turn takes the
/// fallback path.
pub struct OfflineModel;

#[async_trait]
impl ChatModel for OfflineModel {
    async fn reply(
        &self,
        _system: &str,
        _history: &[ChatTurn],
        _message: &str,
    ) -> anyhow::Result<String> {
        Err(anyhow::anyhow!("no chat service configured"))
    }
}

#[derive(Clone, Debug)]
pub struct GenerativeClientConfig {
    pub endpoint: String,
    pub api_key: String,
    pub primary_model: String,
    pub fallback_model: String,
}

/// reqwest client for the hosted generative service. Tries the primary
/// model, then the fallback model, before giving up.
pub struct GenerativeClient {
    client: reqwest::Client,
    config: GenerativeClientConfig,
    key_override: Option<Arc<HubStore>>,
}

#[derive(Serialize)]
struct WireTurn<'a> {
    role: &'a str,
    text: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    system: &'a str,
    messages: Vec<WireTurn<'a>>,
}

#[derive(Deserialize)]
struct ChatResponse {
    text: String,
}

impl GenerativeClient {
    pub fn new(config: GenerativeClientConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            key_override: None,
        }
    }

    /// Let operators rotate the service key through the stored settings.
    pub fn with_key_override(mut self, store: Arc<HubStore>) -> Self {
        self.key_override = Some(store);
        self
    }

    /// The settings lookup is best effort: it races a short timer and falls
    /// back to the configured key.
    async fn api_key(&self) -> String {
        if let Some(store) = &self.key_override {
            if let Ok(Ok(settings)) = tokio::time::timeout(KEY_LOOKUP_LIMIT, store.settings()).await
            {
                if let Some(key) = settings.chat_api_key {
                    return key;
                }
            }
        }
        self.config.api_key.clone()
    }

    async fn call(
        &self,
        model: &str,
        system: &str,
        history: &[ChatTurn],
        message: &str,
    ) -> anyhow::Result<String> {
        let mut messages: Vec<WireTurn> = history
            .iter()
            .map(|turn| WireTurn {
                role: turn.role.as_str(),
                text: &turn.text,
            })
            .collect();
        messages.push(WireTurn {
            role: ChatRole::User.as_str(),
            text: message,
        });
        let request = ChatRequest {
            model,
            system,
            messages,
        };
        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(self.api_key().await)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        let body: ChatResponse = response.json().await?;
        Ok(body.text)
    }
}

#[async_trait]
impl ChatModel for GenerativeClient {
    async fn reply(
        &self,
        system: &str,
        history: &[ChatTurn],
        message: &str,
    ) -> anyhow::Result<String> {
        match self
            .call(&self.config.primary_model, system, history, message)
            .await
        {
            Ok(text) => Ok(text),
            Err(err) => {
                tracing::warn!(%err, model = %self.config.primary_model, "primary chat model failed, trying fallback");
                self.call(&self.config.fallback_model, system, history, message)
                    .await
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Persona {
    Companion,
    Nurse,
}

impl Persona {
    fn system_instruction(&self) -> &'static str {
        match self {
            Persona::Companion => {
                "You are a supportive wellness companion for everyday health questions. \
                 Be warm and practical, and encourage professional care when symptoms persist."
            }
            Persona::Nurse => {
                "You are a triage nurse. Ask focused questions, assess urgency, and always \
                 direct the user to emergency services for life-threatening symptoms."
            }
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct TriageReply {
    pub text: String,
    pub persona: Persona,
    pub escalated: bool,
    /// Tells the UI to bring the triage tab forward.
    pub switch_to_triage: bool,
    pub audit_message: Option<Uuid>,
}

pub struct TriageService {
    store: Arc<HubStore>,
    model: Arc<dyn ChatModel>,
    policy: Arc<dyn EscalationPolicy>,
    events: EventBus,
}

impl TriageService {
    pub fn new(
        store: Arc<HubStore>,
        model: Arc<dyn ChatModel>,
        policy: Arc<dyn EscalationPolicy>,
        events: EventBus,
    ) -> Self {
        Self {
            store,
            model,
            policy,
            events,
        }
    }

    pub async fn converse(
        &self,
        history: &[ChatTurn],
        message: &str,
        nurse_mode: bool,
    ) -> Result<TriageReply, DomainError> {
        // Decided up front; a model failure below must not change it.
        let escalated = self.policy.classify(message, nurse_mode);
        let persona = if escalated {
            Persona::Nurse
        } else {
            Persona::Companion
        };
        let text = match self
            .model
            .reply(persona.system_instruction(), history, message)
            .await
        {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(%err, escalated, "chat model unavailable, serving fallback");
                if escalated {
                    ESCALATED_FALLBACK.to_string()
                } else {
                    GENERIC_FALLBACK.to_string()
                }
            }
        };

        let mut audit_message = None;
        if escalated {
            let entry = ChatMessage {
                id: Uuid::new_v4(),
                role: ChatRole::Nurse,
                text: format!("[escalated] user: {message}\nreply: {text}"),
                timestamp: Utc::now(),
                escalated: true,
                saved: true,
            };
            let entry_id = entry.id;
            audit_message = Some(entry_id);
            // Fire and forget: the reply stands even if the audit write loses.
            if let Err(err) = self.store.append_chat(entry).await {
                tracing::error!(%err, "failed to persist escalation audit entry");
            }
            self.events.send(Event::EscalationRaised { message: entry_id });
        }

        Ok(TriageReply {
            text,
            persona,
            escalated,
            switch_to_triage: escalated && !nurse_mode,
            audit_message,
        })
    }

    /// Explicit nurse save of a conversation turn.
    pub async fn save_message(&self, role: ChatRole, text: String) -> Result<Uuid, DomainError> {
        let entry = ChatMessage {
            id: Uuid::new_v4(),
            role,
            text,
            timestamp: Utc::now(),
            escalated: false,
            saved: true,
        };
        let id = entry.id;
        self.store.append_chat(entry).await?;
        Ok(id)
    }

    pub async fn log(&self) -> Result<Vec<ChatMessage>, DomainError> {
        self.store.chat_log().await
    }

    pub async fn delete_message(&self, id: Uuid) -> Result<(), DomainError> {
        self.store.delete_chat(id).await
    }
}
