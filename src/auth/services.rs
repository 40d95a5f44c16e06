use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        claims::Claims,
        dto::{PublicUser, Session},
        jwt::JwtKeys,
        password::{hash_password, hash_password_blocking, verify_password, verify_password_blocking},
        repo::UserStore,
    },
    error::AppError,
};

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    // Verified against when the email is unknown so both login failures cost the same.
    // Only touched from the blocking pool.
    static ref DUMMY_HASH: Option<String> = hash_password("dummy-password-for-timing").ok();
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Burns one Argon2 verify on the blocking pool, initializing the dummy
/// digest there on first use.
async fn verify_against_dummy(password: String) -> Result<(), AppError> {
    tokio::task::spawn_blocking(move || {
        if let Some(dummy) = DUMMY_HASH.as_ref() {
            verify_password(&password, dummy);
        }
    })
    .await
    .map_err(|e| AppError::Internal(e.to_string()))
}

fn require_credentials(email: &str, password: &str) -> Result<(), AppError> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(AppError::InvalidInput("Email and password are required"));
    }
    Ok(())
}

/// Signup and login over an injected store and optional signing keys.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn UserStore>,
    keys: Option<JwtKeys>,
}

impl AuthService {
    pub fn new(store: Arc<dyn UserStore>, keys: Option<JwtKeys>) -> Self {
        Self { store, keys }
    }

    pub fn store(&self) -> &dyn UserStore {
        self.store.as_ref()
    }

    /// Signing keys, or `MisconfiguredSecret` when none were configured.
    pub fn keys(&self) -> Result<&JwtKeys, AppError> {
        self.keys.as_ref().ok_or(AppError::MisconfiguredSecret)
    }

    #[instrument(skip(self, password))]
    pub async fn signup(&self, email: &str, password: &str) -> Result<PublicUser, AppError> {
        require_credentials(email, password)?;
        if !is_valid_email(email) {
            warn!("invalid email");
            return Err(AppError::InvalidInput("Invalid email"));
        }

        if self.store.find_by_email(email).await?.is_some() {
            warn!("email already registered");
            return Err(AppError::DuplicateEmail);
        }

        let hash = hash_password_blocking(password.to_string()).await?;
        // The store re-checks atomically; a concurrent signup can still lose here.
        let user = self.store.insert(email, &hash).await?;

        info!(user_id = %user.id, "user registered");
        Ok(user.into())
    }

    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AppError> {
        require_credentials(email, password)?;

        let user = match self.store.find_by_email(email).await? {
            Some(u) => u,
            None => {
                verify_against_dummy(password.to_string()).await?;
                warn!("login unknown email");
                return Err(AppError::InvalidCredentials);
            }
        };

        let ok = verify_password_blocking(password.to_string(), user.password_hash.clone()).await?;
        if !ok {
            warn!(user_id = %user.id, "login invalid password");
            return Err(AppError::InvalidCredentials);
        }

        let token = self.keys()?.issue(user.id, &user.email)?;
        info!(user_id = %user.id, "user logged in");
        Ok(Session {
            token,
            user: user.into(),
        })
    }

    /// Resolves validated claims to the current user record.
    pub async fn current_user(&self, claims: &Claims) -> Result<PublicUser, AppError> {
        match self.store.find_by_email(&claims.email).await? {
            Some(u) if u.id == claims.user_id => Ok(u.into()),
            _ => Err(AppError::Unauthorized("User not found")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::repo::MemoryUserStore, config::JwtConfig};

    fn keys() -> JwtKeys {
        JwtKeys::from_config(&JwtConfig {
            secret: Some("unit-test-secret".into()),
            ..JwtConfig::default()
        })
        .unwrap()
    }

    fn service() -> (AuthService, Arc<MemoryUserStore>) {
        let store = Arc::new(MemoryUserStore::new());
        (AuthService::new(store.clone(), Some(keys())), store)
    }

    #[test]
    fn email_shape() {
        assert!(is_valid_email("a@x.com"));
        assert!(!is_valid_email("a@x"));
        assert!(!is_valid_email("a x@x.com"));
        assert!(!is_valid_email("@x.com"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn dummy_verify_completes_on_single_threaded_runtime() {
        verify_against_dummy("pw123".into()).await.expect("blocking pool verify");
        let (svc, _) = service();
        assert!(matches!(
            svc.login("nobody@x.com", "pw123").await,
            Err(AppError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn signup_then_login() {
        let (svc, _) = service();
        let user = svc.signup("a@x.com", "pw123").await.expect("signup");
        assert_eq!(user.email, "a@x.com");

        let session = svc.login("a@x.com", "pw123").await.expect("login");
        assert!(!session.token.is_empty());
        assert_eq!(session.user, user);

        let claims = svc.keys().unwrap().validate(&session.token).unwrap();
        assert_eq!(claims.user_id, user.id);
        assert_eq!(claims.email, "a@x.com");
    }

    #[tokio::test]
    async fn second_signup_is_duplicate_and_record_unchanged() {
        let (svc, store) = service();
        svc.signup("a@x.com", "pw123").await.unwrap();
        let before = store.find_by_email("a@x.com").await.unwrap().unwrap();

        let err = svc.signup("a@x.com", "other-pw").await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateEmail));

        let after = store.find_by_email("a@x.com").await.unwrap().unwrap();
        assert_eq!(before, after);
        assert!(svc.login("a@x.com", "pw123").await.is_ok());
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_look_the_same() {
        let (svc, _) = service();
        svc.signup("a@x.com", "pw123").await.unwrap();

        let wrong = svc.login("a@x.com", "wrong").await.unwrap_err();
        let unknown = svc.login("nobody@x.com", "pw123").await.unwrap_err();
        assert!(matches!(wrong, AppError::InvalidCredentials));
        assert!(matches!(unknown, AppError::InvalidCredentials));
        assert_eq!(wrong.status_code(), unknown.status_code());
        assert_eq!(wrong.public_message(), unknown.public_message());
    }

    #[tokio::test]
    async fn missing_fields_are_invalid_input() {
        let (svc, store) = service();
        for (email, password) in [("", "pw"), ("a@x.com", ""), ("  ", "pw"), ("", "")] {
            assert!(matches!(
                svc.signup(email, password).await,
                Err(AppError::InvalidInput(_))
            ));
            assert!(matches!(
                svc.login(email, password).await,
                Err(AppError::InvalidInput(_))
            ));
        }
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn email_is_case_sensitive() {
        let (svc, _) = service();
        svc.signup("A@x.com", "pw123").await.unwrap();
        assert!(matches!(
            svc.login("a@x.com", "pw123").await,
            Err(AppError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn login_without_keys_is_misconfigured_but_signup_works() {
        let store = Arc::new(MemoryUserStore::new());
        let svc = AuthService::new(store, None);
        svc.signup("a@x.com", "pw123").await.expect("signup still served");
        assert!(matches!(
            svc.login("a@x.com", "pw123").await,
            Err(AppError::MisconfiguredSecret)
        ));
    }

    #[tokio::test]
    async fn stored_legacy_digest_fails_closed() {
        let (svc, store) = service();
        store.insert("old@x.com", "hashed-pw123").await.unwrap();
        assert!(matches!(
            svc.login("old@x.com", "pw123").await,
            Err(AppError::InvalidCredentials)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_signups_yield_one_record() {
        let (svc, store) = service();
        let mut tasks = Vec::new();
        for _ in 0..4 {
            let svc = svc.clone();
            tasks.push(tokio::spawn(async move {
                svc.signup("race@x.com", "pw123").await
            }));
        }
        let mut ok = 0;
        for t in tasks {
            match t.await.unwrap() {
                Ok(_) => ok += 1,
                Err(AppError::DuplicateEmail) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn current_user_resolves_claims() {
        let (svc, _) = service();
        let user = svc.signup("a@x.com", "pw123").await.unwrap();
        let session = svc.login("a@x.com", "pw123").await.unwrap();
        let claims = svc.keys().unwrap().validate(&session.token).unwrap();
        assert_eq!(svc.current_user(&claims).await.unwrap(), user);

        let mut stranger = claims.clone();
        stranger.email = "ghost@x.com".into();
        assert!(matches!(
            svc.current_user(&stranger).await,
            Err(AppError::Unauthorized(_))
        ));
    }
}
