use std::sync::Arc;

use sqlx::PgPool;
use tracing::{error, info, warn};

use crate::auth::{
    jwt::JwtKeys,
    repo::{MemoryUserStore, PgUserStore, UserStore},
    services::AuthService,
};
use crate::{config::AppConfig, db};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub auth: AuthService,
}

/// Where user records live.
pub enum StoreBackend {
    InMemory,
    Postgres(PgPool),
}

impl StoreBackend {
    fn into_store(self) -> Arc<dyn UserStore> {
        match self {
            StoreBackend::InMemory => Arc::new(MemoryUserStore::new()),
            StoreBackend::Postgres(db) => Arc::new(PgUserStore::new(db)),
        }
    }
}

impl AppState {
    /// Reads configuration from the environment and picks the backend. An
    /// unreachable database degrades to the in-memory store.
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;

        let backend = match config.database_url.as_deref() {
            None => {
                warn!("DATABASE_URL not set; using in-memory storage");
                StoreBackend::InMemory
            }
            Some(url) => match db::connect(url).await {
                Ok(pool) => {
                    db::migrate(&pool).await;
                    info!("connected to PostgreSQL");
                    StoreBackend::Postgres(pool)
                }
                Err(e) => {
                    warn!(error = %e, "database unreachable; using in-memory storage, data is lost on restart");
                    StoreBackend::InMemory
                }
            },
        };

        Ok(Self::builder().config(config).backend(backend).build())
    }

    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::default()
    }
}

#[derive(Default)]
pub struct AppStateBuilder {
    config: Option<AppConfig>,
    store: Option<Arc<dyn UserStore>>,
}

impl AppStateBuilder {
    pub fn config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn backend(mut self, backend: StoreBackend) -> Self {
        self.store = Some(backend.into_store());
        self
    }

    pub fn store(mut self, store: Arc<dyn UserStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// A missing or public signing secret leaves login disabled rather than
    /// failing the whole process.
    pub fn build(self) -> AppState {
        let config = self.config.unwrap_or_default();
        let store = self
            .store
            .unwrap_or_else(|| StoreBackend::InMemory.into_store());

        let keys = match JwtKeys::from_config(&config.jwt) {
            Ok(k) => Some(k),
            Err(e) => {
                error!(error = %e, "JWT_SECRET missing or insecure; login is disabled");
                None
            }
        };

        AppState {
            config: Arc::new(config),
            auth: AuthService::new(store, keys),
        }
    }
}
