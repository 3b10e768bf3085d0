use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub ttl_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum snippet creations per client key inside one window.
    pub max_requests: u32,
    pub window_secs: u64,
    /// Key clients on the first `X-Forwarded-For` hop instead of the peer address.
    pub trust_proxy: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub host: String,
    pub port: u16,
    pub jwt: JwtConfig,
    pub create_limit: RateLimitConfig,
    /// When set, `POST /api/snippets` accepts requests without a token.
    pub allow_anonymous_create: bool,
    pub expiry_sweep_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let secret = std::env::var("JWT_SECRET")
            .or_else(|_| std::env::var("TOKEN_KEY"))
            .context("JWT_SECRET (or TOKEN_KEY) must be set")?;
        anyhow::ensure!(!secret.is_empty(), "JWT_SECRET must not be empty");

        let port = std::env::var("APP_PORT")
            .or_else(|_| std::env::var("PORT"))
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(8080);

        Ok(Self {
            database_url,
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", 10),
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            jwt: JwtConfig {
                secret,
                ttl_days: env_parse("JWT_TTL_DAYS", 3),
            },
            create_limit: RateLimitConfig {
                max_requests: env_parse("CREATE_RATE_LIMIT", 30),
                window_secs: env_parse("CREATE_RATE_WINDOW_SECS", 60 * 60),
                trust_proxy: env_parse("TRUST_PROXY", false),
            },
            allow_anonymous_create: env_parse("ALLOW_ANONYMOUS_CREATE", false),
            expiry_sweep_secs: env_parse("EXPIRY_SWEEP_SECS", 300),
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}
