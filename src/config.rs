use serde::Deserialize;

/// Longest accepted token lifetime (one year).
pub const MAX_TTL_MINUTES: i64 = 60 * 24 * 365;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: Option<String>,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: None,
            issuer: "aitwin".into(),
            audience: "aitwin-users".into(),
            ttl_minutes: 60 * 24,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Absent means the in-memory store is used.
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub host: String,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            jwt: JwtConfig::default(),
            host: "0.0.0.0".into(),
            port: 3001,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();
        let database_url = non_empty_var("DATABASE_URL");
        let jwt = JwtConfig {
            secret: non_empty_var("JWT_SECRET"),
            issuer: std::env::var("JWT_ISSUER").unwrap_or(defaults.jwt.issuer),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or(defaults.jwt.audience),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .filter(|v| *v > 0)
                .map(|v| v.min(MAX_TTL_MINUTES))
                .unwrap_or(defaults.jwt.ttl_minutes),
        };
        let host = std::env::var("APP_HOST").unwrap_or(defaults.host);
        let port = match std::env::var("APP_PORT") {
            Ok(v) => v
                .parse::<u16>()
                .map_err(|e| anyhow::anyhow!("invalid APP_PORT {v:?}: {e}"))?,
            Err(_) => defaults.port,
        };
        Ok(Self {
            database_url,
            jwt,
            host,
            port,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
