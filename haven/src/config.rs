use clap::Parser;

/// Runtime configuration. Every flag can also come from the environment so
/// deployments never bake credentials into the binary.
#[derive(Parser, Debug, Clone)]
#[command(name = "haven", about = "Shared-document hub service")]
pub struct ServerConfig {
    /// Address to listen on.
    #[arg(long, env = "HAVEN_BIND", default_value = "127.0.0.1:3000")]
    pub bind: String,

    /// Remote document host URL. Falls back to an in-memory store when
    /// unset (development only; nothing survives a restart).
    #[arg(long, env = "HAVEN_STORE_URL")]
    pub store_url: Option<String>,

    /// Static access key sent to the document host.
    #[arg(long, env = "HAVEN_STORE_KEY", default_value = "")]
    pub store_key: String,

    /// Secret for signing session tokens.
    #[arg(long, env = "HAVEN_JWT_SECRET")]
    pub jwt_secret: String,

    /// Email of the initial admin account seeded at startup.
    #[arg(long, env = "HAVEN_ADMIN_EMAIL")]
    pub admin_email: String,

    /// Password of the initial admin account.
    #[arg(long, env = "HAVEN_ADMIN_PASSWORD")]
    pub admin_password: String,

    /// Chat-service endpoint. The offline fallback replies are served when
    /// unset.
    #[arg(long, env = "HAVEN_CHAT_ENDPOINT")]
    pub chat_endpoint: Option<String>,

    /// Chat-service API key; can be overridden at runtime via settings.
    #[arg(long, env = "HAVEN_CHAT_KEY", default_value = "")]
    pub chat_api_key: String,

    #[arg(long, env = "HAVEN_CHAT_MODEL", default_value = "care-chat-1")]
    pub chat_model: String,

    #[arg(long, env = "HAVEN_CHAT_FALLBACK_MODEL", default_value = "care-chat-lite")]
    pub chat_fallback_model: String,

    /// Media-validation service endpoint. Submissions pass for manual
    /// review when unset.
    #[arg(long, env = "HAVEN_VALIDATOR_URL")]
    pub validator_url: Option<String>,

    #[arg(long, env = "HAVEN_VALIDATOR_KEY", default_value = "")]
    pub validator_key: String,

    /// Extra escalation terms appended to the built-in list.
    #[arg(long, env = "HAVEN_ESCALATION_TERMS", value_delimiter = ',')]
    pub escalation_terms: Vec<String>,
}
