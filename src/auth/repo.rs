use std::collections::{hash_map::Entry, HashMap};

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::auth::repo_types::User;
use crate::error::AppError;

/// Lookup and creation of user records.
///
/// `insert` must reject an email that is already present, and the check must
/// be atomic with the write: two concurrent inserts for the same email never
/// both succeed.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;
    async fn insert(&self, email: &str, password_hash: &str) -> Result<User, AppError>;
    fn backend_name(&self) -> &'static str;
}

/// Process-local store. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<String, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self.users.read().await.get(email).cloned())
    }

    async fn insert(&self, email: &str, password_hash: &str) -> Result<User, AppError> {
        let mut users = self.users.write().await;
        match users.entry(email.to_string()) {
            Entry::Occupied(_) => Err(AppError::DuplicateEmail),
            Entry::Vacant(slot) => {
                let user = User {
                    id: Uuid::new_v4(),
                    email: email.to_string(),
                    password_hash: password_hash.to_string(),
                    created_at: OffsetDateTime::now_utc(),
                };
                debug!(user_id = %user.id, "user stored in memory");
                Ok(slot.insert(user).clone())
            }
        }
    }

    fn backend_name(&self) -> &'static str {
        "Using in-memory storage"
    }
}

/// PostgreSQL store. Uniqueness is enforced by the `users.email` constraint.
#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn insert(&self, email: &str, password_hash: &str) -> Result<User, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, password_hash)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO NOTHING
            RETURNING id, email, password_hash, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(password_hash)
        .fetch_optional(&self.db)
        .await?;
        user.ok_or(AppError::DuplicateEmail)
    }

    fn backend_name(&self) -> &'static str {
        "Connected to PostgreSQL"
    }
}
