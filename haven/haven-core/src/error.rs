//! The domain error type returned by every fallible hub operation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("document host unreachable: {0}")]
    StoreUnavailable(String),

    /// A bounded number of conditional saves lost against concurrent writers.
    #[error("the document changed under concurrent writers, please retry")]
    Contention,

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("email is already registered")]
    EmailTaken,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("account is awaiting approval")]
    AccountPending,

    #[error("account application was rejected")]
    AccountRejected,

    #[error("asset is not available")]
    AssetUnavailable,

    #[error("cannot move transaction from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    #[error("ticket is already resolved")]
    TicketClosed,

    #[error("{0}")]
    Invalid(String),

    #[error("credential hashing failed")]
    Credential,

    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}
