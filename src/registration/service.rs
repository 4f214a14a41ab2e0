use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, instrument, warn};

use crate::error::ServiceError;
use crate::mailer::Mailer;

use super::code;
use super::password;
use super::repo::{RegistrationStore, StoreError};
use super::repo_types::User;

/// Upper bound on activation-code collision retries.
const MAX_CODE_ATTEMPTS: u32 = 5;

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Orchestrates registration and activation across the store and the mail
/// transport. Owns neither: uniqueness and atomicity live in the store, so
/// concurrent calls from unrelated processes stay safe without locks here.
pub struct RegistrationService {
    store: Arc<dyn RegistrationStore>,
    mailer: Arc<dyn Mailer>,
    code_ttl: Duration,
    password_min_len: usize,
}

impl RegistrationService {
    pub fn new(
        store: Arc<dyn RegistrationStore>,
        mailer: Arc<dyn Mailer>,
        code_ttl: Duration,
        password_min_len: usize,
    ) -> Self {
        Self {
            store,
            mailer,
            code_ttl,
            password_min_len,
        }
    }

    #[instrument(skip(self, password))]
    pub async fn register(&self, email: &str, password: &str) -> Result<User, ServiceError> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            warn!(%email, "registration rejected: invalid email");
            return Err(ServiceError::InvalidEmail);
        }
        if password.chars().count() < self.password_min_len {
            warn!(%email, "registration rejected: password too short");
            return Err(ServiceError::WeakPassword(self.password_min_len));
        }

        let hash = password::hash_password(password)?;

        // the unique constraint on users.email decides concurrent races;
        // no pre-insert existence check
        let user = match self.store.create_user(&email, &hash).await {
            Ok(user) => user,
            Err(StoreError::DuplicateEmail) => {
                warn!(%email, "registration rejected: email already registered");
                return Err(ServiceError::EmailAlreadyRegistered);
            }
            Err(e) => return Err(internal(e)),
        };

        let issued = self.issue_code(&user).await?;
        debug!(user_id = %user.id, "activation token created");

        if let Err(e) = self.mailer.send_activation_code(&user.email, &issued).await {
            // registration still succeeds; the account stays pending
            warn!(user_id = %user.id, error = %e, "activation mail failed");
        } else {
            info!(user_id = %user.id, "activation mail dispatched");
        }

        Ok(user)
    }

    async fn issue_code(&self, user: &User) -> Result<String, ServiceError> {
        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let code = code::generate();
            match self.store.create_activation_token(user.id, &code).await {
                Ok(_) => return Ok(code),
                Err(StoreError::DuplicateCode) => {
                    debug!(user_id = %user.id, attempt, "activation code collision, retrying");
                }
                Err(e) => return Err(internal(e)),
            }
        }
        warn!(user_id = %user.id, "activation code retries exhausted");
        Err(ServiceError::CodeGenerationExhausted)
    }

    #[instrument(skip(self, submitted_code))]
    pub async fn activate(&self, email: &str, submitted_code: &str) -> Result<User, ServiceError> {
        let email = normalize_email(email);
        let user = match self.store.find_user_by_email(&email).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                warn!(%email, "activation failed: user not found");
                return Err(ServiceError::UserNotFound);
            }
            Err(e) => return Err(internal(e)),
        };

        // re-activation is idempotent so clients can retry safely
        if user.is_active() {
            debug!(user_id = %user.id, "user already active");
            return Ok(user);
        }

        // absent covers both "never issued" and "wrong code"; callers
        // cannot probe which codes exist
        let token = match self
            .store
            .find_activation_token(user.id, submitted_code)
            .await
        {
            Ok(Some(token)) => token,
            Ok(None) => {
                warn!(user_id = %user.id, "activation failed: invalid code");
                return Err(ServiceError::InvalidCode);
            }
            Err(e) => return Err(internal(e)),
        };

        if code::is_expired(token.created_at, OffsetDateTime::now_utc(), self.code_ttl) {
            // expired codes are one-shot: delete so the value can be reissued
            if let Err(e) = self.store.delete_activation_token(user.id, &token.code).await {
                return Err(internal(e));
            }
            warn!(user_id = %user.id, "activation failed: code expired");
            return Err(ServiceError::CodeExpired);
        }

        match self.store.activate_user(user.id, &token.code).await {
            Ok(user) => {
                info!(user_id = %user.id, "user activated");
                Ok(user)
            }
            // a concurrent activation won the race for the token
            Err(StoreError::NotFound) => Err(ServiceError::InvalidCode),
            Err(e) => Err(internal(e)),
        }
    }
}

fn internal(err: StoreError) -> ServiceError {
    ServiceError::Internal(err.into())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::super::repo::mem::MemStore;
    use super::super::repo_types::UserStatus;
    use super::*;

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send_activation_code(&self, email: &str, code: &str) -> anyhow::Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((email.to_string(), code.to_string()));
            Ok(())
        }
    }

    struct FailingMailer;

    #[async_trait]
    impl Mailer for FailingMailer {
        async fn send_activation_code(&self, _email: &str, _code: &str) -> anyhow::Result<()> {
            anyhow::bail!("mail gateway down")
        }
    }

    fn service(store: Arc<MemStore>, mailer: Arc<dyn Mailer>) -> RegistrationService {
        RegistrationService::new(store, mailer, Duration::minutes(15), 8)
    }

    #[tokio::test]
    async fn register_creates_pending_user_and_mails_the_code() {
        let store = Arc::new(MemStore::new());
        let mailer = Arc::new(RecordingMailer::default());
        let svc = service(store.clone(), mailer.clone());

        let user = svc.register(" Alice@Example.com ", "Secret123").await.unwrap();
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.status, UserStatus::Pending);

        let token = store.token_for(user.id).expect("token issued");
        assert_eq!(token.code.len(), 4);

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], ("alice@example.com".to_string(), token.code));
    }

    #[tokio::test]
    async fn register_rejects_malformed_email_and_short_password() {
        let store = Arc::new(MemStore::new());
        let svc = service(store, Arc::new(RecordingMailer::default()));

        let err = svc.register("not-an-email", "Secret123").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidEmail));

        let err = svc.register("a@x.com", "short").await.unwrap_err();
        assert!(matches!(err, ServiceError::WeakPassword(8)));
    }

    #[tokio::test]
    async fn register_rejects_duplicate_email() {
        let store = Arc::new(MemStore::new());
        let svc = service(store, Arc::new(RecordingMailer::default()));

        svc.register("a@x.com", "Secret123").await.unwrap();
        let err = svc.register("a@x.com", "Other456pw").await.unwrap_err();
        assert!(matches!(err, ServiceError::EmailAlreadyRegistered));
    }

    #[tokio::test]
    async fn register_survives_a_mail_outage() {
        let store = Arc::new(MemStore::new());
        let svc = service(store.clone(), Arc::new(FailingMailer));

        let user = svc.register("a@x.com", "Secret123").await.unwrap();
        assert_eq!(user.status, UserStatus::Pending);
        assert!(store.token_for(user.id).is_some());
    }

    #[tokio::test]
    async fn register_retries_code_collisions() {
        let store = Arc::new(MemStore::new());
        let svc = service(store.clone(), Arc::new(RecordingMailer::default()));

        store.fail_next_codes(4);
        let user = svc.register("a@x.com", "Secret123").await.unwrap();
        assert!(store.token_for(user.id).is_some());
    }

    #[tokio::test]
    async fn register_gives_up_after_exhausting_code_retries() {
        let store = Arc::new(MemStore::new());
        let svc = service(store.clone(), Arc::new(RecordingMailer::default()));

        store.fail_next_codes(5);
        let err = svc.register("a@x.com", "Secret123").await.unwrap_err();
        assert!(matches!(err, ServiceError::CodeGenerationExhausted));
    }

    #[tokio::test]
    async fn activate_flips_status_and_consumes_the_token() {
        let store = Arc::new(MemStore::new());
        let svc = service(store.clone(), Arc::new(RecordingMailer::default()));

        let user = svc.register("a@x.com", "Secret123").await.unwrap();
        let code = store.token_for(user.id).unwrap().code;

        let activated = svc.activate("a@x.com", &code).await.unwrap();
        assert_eq!(activated.status, UserStatus::Active);
        assert!(activated.updated_at.is_some());
        assert!(store.token_for(user.id).is_none());
    }

    #[tokio::test]
    async fn activate_after_activation_is_idempotent() {
        let store = Arc::new(MemStore::new());
        let svc = service(store.clone(), Arc::new(RecordingMailer::default()));

        let user = svc.register("a@x.com", "Secret123").await.unwrap();
        let code = store.token_for(user.id).unwrap().code;

        svc.activate("a@x.com", &code).await.unwrap();
        // the consumed code no longer matters; an active account reports
        // success on re-activation
        let again = svc.activate("a@x.com", &code).await.unwrap();
        assert_eq!(again.status, UserStatus::Active);
    }

    #[tokio::test]
    async fn activate_rejects_a_wrong_code_without_mutating_state() {
        let store = Arc::new(MemStore::new());
        let svc = service(store.clone(), Arc::new(RecordingMailer::default()));

        let user = svc.register("a@x.com", "Secret123").await.unwrap();
        let code = store.token_for(user.id).unwrap().code;
        let wrong = if code == "0000" { "0001" } else { "0000" };

        let err = svc.activate("a@x.com", wrong).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCode));

        let user = store.find_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(user.status, UserStatus::Pending);
        assert!(store.token_for(user.id).is_some());
    }

    #[tokio::test]
    async fn activate_rejects_an_expired_code_and_deletes_it() {
        let store = Arc::new(MemStore::new());
        let svc = service(store.clone(), Arc::new(RecordingMailer::default()));

        let user = svc.register("a@x.com", "Secret123").await.unwrap();
        let code = store.token_for(user.id).unwrap().code;
        store.age_token(user.id, Duration::minutes(16));

        let err = svc.activate("a@x.com", &code).await.unwrap_err();
        assert!(matches!(err, ServiceError::CodeExpired));
        // one-shot: the expired token is gone and cannot be retried
        assert!(store.token_for(user.id).is_none());

        let user = store.find_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(user.status, UserStatus::Pending);
    }

    #[tokio::test]
    async fn activate_rejects_unknown_users() {
        let store = Arc::new(MemStore::new());
        let svc = service(store, Arc::new(RecordingMailer::default()));

        let err = svc.activate("nobody@x.com", "0042").await.unwrap_err();
        assert!(matches!(err, ServiceError::UserNotFound));
    }

    #[test]
    fn email_validation_accepts_plausible_addresses_only() {
        assert!(is_valid_email("a@x.com"));
        assert!(is_valid_email("first.last@sub.domain.org"));
        assert!(!is_valid_email("a@x"));
        assert!(!is_valid_email("no-at-sign.com"));
        assert!(!is_valid_email("spaces in@x.com"));
    }
}
