//! Registration, login gating and the approval/verification lifecycle.
//!
//! Approval and verification are independent axes: approval gates login,
//! verification records the KYC outcome. Registration always starts at
//! `Pending`/unverified, and a fresh KYC submission drops an account back
//! there regardless of where it was.

use crate::auth::{self, Hs256Tokens};
use crate::error::DomainError;
use crate::events::{Event, EventBus};
use crate::model::{ApprovalStatus, GeoPoint, Role, UserAccount, UserProfile};
use crate::store::HubStore;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

const MIN_PASSWORD_LEN: usize = 8;

pub struct Registration {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
}

pub struct ProfileUpdate {
    pub name: String,
    pub phone: String,
}

#[derive(Debug)]
pub struct LoginOutcome {
    pub profile: UserProfile,
    pub token: String,
}

pub struct Accounts {
    store: Arc<HubStore>,
    tokens: Arc<Hs256Tokens>,
    events: EventBus,
}

impl Accounts {
    pub fn new(store: Arc<HubStore>, tokens: Arc<Hs256Tokens>, events: EventBus) -> Self {
        Self {
            store,
            tokens,
            events,
        }
    }

    pub async fn register(&self, request: Registration) -> Result<UserProfile, DomainError> {
        if request.password.len() < MIN_PASSWORD_LEN {
            return Err(DomainError::Invalid(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        let email = request.email.trim().to_string();
        if email.is_empty() || !email.contains('@') {
            return Err(DomainError::Invalid("a valid email is required".to_string()));
        }
        let account = UserAccount {
            id: Uuid::new_v4(),
            name: request.name,
            email,
            phone: request.phone,
            password_hash: auth::hash_password(&request.password)?,
            role: Role::User,
            verified: false,
            approval: ApprovalStatus::Pending,
            id_document_front: None,
            id_document_back: None,
            last_location: None,
            created_at: Utc::now(),
        };
        let profile = UserProfile::from(&account);
        self.store
            .mutate(|doc| {
                if doc
                    .users
                    .iter()
                    .any(|u| u.email.eq_ignore_ascii_case(&account.email))
                {
                    return Err(DomainError::EmailTaken);
                }
                doc.users.push(account.clone());
                Ok(())
            })
            .await?;
        self.events.send(Event::Registered { user: profile.id });
        Ok(profile)
    }

    /// Credential check first, then the approval gate: pending and rejected
    /// accounts fail with their own errors so the caller can explain why,
    /// never with a generic credential failure.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, DomainError> {
        let doc = self.store.read().await?;
        let account = doc
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email.trim()))
            .ok_or(DomainError::InvalidCredentials)?;
        if !auth::verify_password(password, &account.password_hash) {
            return Err(DomainError::InvalidCredentials);
        }
        match account.approval {
            ApprovalStatus::Pending => return Err(DomainError::AccountPending),
            ApprovalStatus::Rejected => return Err(DomainError::AccountRejected),
            ApprovalStatus::Approved => {}
        }
        let token = self.tokens.issue(account.id, account.role)?;
        Ok(LoginOutcome {
            profile: UserProfile::from(account),
            token,
        })
    }

    pub async fn set_approval(
        &self,
        id: Uuid,
        approval: ApprovalStatus,
    ) -> Result<(), DomainError> {
        self.store
            .mutate(|doc| {
                let user = doc
                    .users
                    .iter_mut()
                    .find(|u| u.id == id)
                    .ok_or_else(|| DomainError::not_found("user", id))?;
                user.approval = approval;
                Ok(())
            })
            .await?;
        self.events.send(Event::ApprovalChanged { user: id, approval });
        Ok(())
    }

    pub async fn set_role(&self, id: Uuid, role: Role) -> Result<(), DomainError> {
        self.store
            .mutate(|doc| {
                let user = doc
                    .users
                    .iter_mut()
                    .find(|u| u.id == id)
                    .ok_or_else(|| DomainError::not_found("user", id))?;
                user.role = role;
                Ok(())
            })
            .await?;
        self.events.send(Event::RoleChanged { user: id });
        Ok(())
    }

    pub async fn set_verified(&self, id: Uuid, verified: bool) -> Result<(), DomainError> {
        self.store
            .mutate(|doc| {
                let user = doc
                    .users
                    .iter_mut()
                    .find(|u| u.id == id)
                    .ok_or_else(|| DomainError::not_found("user", id))?;
                user.verified = verified;
                Ok(())
            })
            .await
    }

    /// Whitelisted fields only; the stored credential always survives, no
    /// matter what the caller's payload carried.
    pub async fn update_profile(
        &self,
        id: Uuid,
        update: ProfileUpdate,
    ) -> Result<UserProfile, DomainError> {
        self.store
            .mutate(|doc| {
                let user = doc
                    .users
                    .iter_mut()
                    .find(|u| u.id == id)
                    .ok_or_else(|| DomainError::not_found("user", id))?;
                user.name = update.name.clone();
                user.phone = update.phone.clone();
                Ok(UserProfile::from(&*user))
            })
            .await
    }

    /// Stores the ID document references and drops the account back to
    /// `Pending`/unverified for review.
    pub async fn submit_kyc(
        &self,
        id: Uuid,
        front: String,
        back: String,
    ) -> Result<(), DomainError> {
        self.store
            .mutate(|doc| {
                let user = doc
                    .users
                    .iter_mut()
                    .find(|u| u.id == id)
                    .ok_or_else(|| DomainError::not_found("user", id))?;
                user.id_document_front = Some(front.clone());
                user.id_document_back = Some(back.clone());
                user.approval = ApprovalStatus::Pending;
                user.verified = false;
                Ok(())
            })
            .await?;
        self.events.send(Event::KycSubmitted { user: id });
        Ok(())
    }

    pub async fn record_location(&self, id: Uuid, lat: f64, lng: f64) -> Result<(), DomainError> {
        let recorded_at = Utc::now();
        self.store
            .mutate(|doc| {
                let user = doc
                    .users
                    .iter_mut()
                    .find(|u| u.id == id)
                    .ok_or_else(|| DomainError::not_found("user", id))?;
                user.last_location = Some(GeoPoint {
                    lat,
                    lng,
                    recorded_at,
                });
                Ok(())
            })
            .await
    }

    /// Deployment-time bootstrap: creates the configured admin account if no
    /// account with that email exists yet. Idempotent across restarts.
    pub async fn seed_admin(&self, email: &str, password: &str) -> Result<bool, DomainError> {
        let account = UserAccount {
            id: Uuid::new_v4(),
            name: "Administrator".to_string(),
            email: email.trim().to_string(),
            phone: String::new(),
            password_hash: auth::hash_password(password)?,
            role: Role::Admin,
            verified: true,
            approval: ApprovalStatus::Approved,
            id_document_front: None,
            id_document_back: None,
            last_location: None,
            created_at: Utc::now(),
        };
        let created = self
            .store
            .mutate(|doc| {
                if doc
                    .users
                    .iter()
                    .any(|u| u.email.eq_ignore_ascii_case(&account.email))
                {
                    return Ok(false);
                }
                doc.users.push(account.clone());
                Ok(true)
            })
            .await?;
        if created {
            tracing::info!(email, "seeded initial admin account");
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryHost;

    fn accounts() -> (Accounts, Arc<HubStore>) {
        let store = Arc::new(HubStore::new(Arc::new(MemoryHost::new())));
        let tokens = Arc::new(Hs256Tokens::new("test-secret"));
        (
            Accounts::new(store.clone(), tokens, EventBus::new()),
            store,
        )
    }

    fn registration(email: &str) -> Registration {
        Registration {
            name: "Amai Tariro".to_string(),
            email: email.to_string(),
            phone: "+263770000000".to_string(),
            password: "long enough secret".to_string(),
        }
    }

    #[tokio::test]
    async fn fresh_accounts_cannot_log_in_until_approved() {
        let (accounts, _) = accounts();
        let profile = accounts.register(registration("a@x.com")).await.unwrap();
        assert_eq!(profile.approval, ApprovalStatus::Pending);
        assert!(!profile.verified);

        let err = accounts.login("a@x.com", "long enough secret").await.unwrap_err();
        assert!(matches!(err, DomainError::AccountPending));

        accounts
            .set_approval(profile.id, ApprovalStatus::Approved)
            .await
            .unwrap();
        let outcome = accounts.login("a@x.com", "long enough secret").await.unwrap();
        assert_eq!(outcome.profile.id, profile.id);
        assert!(!outcome.token.is_empty());
    }

    #[tokio::test]
    async fn rejected_accounts_get_a_distinct_refusal() {
        let (accounts, _) = accounts();
        let profile = accounts.register(registration("b@x.com")).await.unwrap();
        accounts
            .set_approval(profile.id, ApprovalStatus::Rejected)
            .await
            .unwrap();
        let err = accounts.login("b@x.com", "long enough secret").await.unwrap_err();
        assert!(matches!(err, DomainError::AccountRejected));
    }

    #[tokio::test]
    async fn bad_credentials_stay_generic() {
        let (accounts, _) = accounts();
        let profile = accounts.register(registration("c@x.com")).await.unwrap();
        accounts
            .set_approval(profile.id, ApprovalStatus::Approved)
            .await
            .unwrap();
        let err = accounts.login("c@x.com", "not the password").await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidCredentials));
        let err = accounts.login("nobody@x.com", "whatever").await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidCredentials));
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected_case_insensitively() {
        let (accounts, store) = accounts();
        accounts.register(registration("a@x.com")).await.unwrap();
        let err = accounts.register(registration("A@X.COM")).await.unwrap_err();
        assert!(matches!(err, DomainError::EmailTaken));
        assert_eq!(store.read().await.unwrap().users.len(), 1);
    }

    #[tokio::test]
    async fn short_passwords_are_refused() {
        let (accounts, store) = accounts();
        let mut request = registration("d@x.com");
        request.password = "short".to_string();
        let err = accounts.register(request).await.unwrap_err();
        assert!(matches!(err, DomainError::Invalid(_)));
        assert!(store.read().await.unwrap().users.is_empty());
    }

    #[tokio::test]
    async fn profile_update_never_touches_the_credential() {
        let (accounts, store) = accounts();
        let profile = accounts.register(registration("e@x.com")).await.unwrap();
        let hash_before = store.read().await.unwrap().users[0].password_hash.clone();

        let updated = accounts
            .update_profile(
                profile.id,
                ProfileUpdate {
                    name: "Tariro M".to_string(),
                    phone: "+263771111111".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Tariro M");

        let stored = store.read().await.unwrap();
        assert_eq!(stored.users[0].password_hash, hash_before);
        assert_eq!(stored.users[0].name, "Tariro M");
    }

    #[tokio::test]
    async fn kyc_submission_resets_the_review_axes() {
        let (accounts, store) = accounts();
        let profile = accounts.register(registration("f@x.com")).await.unwrap();
        accounts
            .set_approval(profile.id, ApprovalStatus::Approved)
            .await
            .unwrap();
        accounts.set_verified(profile.id, true).await.unwrap();

        accounts
            .submit_kyc(
                profile.id,
                "https://img.example/front.jpg".to_string(),
                "https://img.example/back.jpg".to_string(),
            )
            .await
            .unwrap();

        let stored = store.read().await.unwrap();
        assert_eq!(stored.users[0].approval, ApprovalStatus::Pending);
        assert!(!stored.users[0].verified);
        assert!(stored.users[0].id_document_front.is_some());
    }

    #[tokio::test]
    async fn admin_seeding_is_idempotent() {
        let (accounts, store) = accounts();
        assert!(accounts.seed_admin("admin@x.com", "ops secret 123").await.unwrap());
        assert!(!accounts.seed_admin("admin@x.com", "ops secret 123").await.unwrap());

        let stored = store.read().await.unwrap();
        assert_eq!(stored.users.len(), 1);
        assert_eq!(stored.users[0].role, Role::Admin);
        assert_eq!(stored.users[0].approval, ApprovalStatus::Approved);

        let outcome = accounts.login("admin@x.com", "ops secret 123").await.unwrap();
        assert_eq!(outcome.profile.role, Role::Admin);
    }
}
