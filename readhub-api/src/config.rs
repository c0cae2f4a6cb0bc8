/// Configuration for the API server
///
/// Settings are read from the process environment (after loading `.env`
/// through `dotenvy`) with the `config` crate and mapped onto typed structs.
///
/// # Environment Variables
///
/// | Variable                   | Default                      |
/// |----------------------------|------------------------------|
/// | `API_HOST`                 | `0.0.0.0`                    |
/// | `API_PORT`                 | `8080`                       |
/// | `CORS_ORIGINS`             | `*` (comma separated)        |
/// | `PRODUCTION`               | `false`                      |
/// | `DATABASE_URL`             | required                     |
/// | `DATABASE_MAX_CONNECTIONS` | `10`                         |
/// | `JWT_SECRET`               | required, 32+ characters     |
/// | `REDIS_URL`                | unset disables cache/limits  |
/// | `UPLOAD_DIR`               | `./uploads`                  |
/// | `UPLOAD_BASE_URL`          | `/uploads`                   |
/// | `UPLOAD_MAX_BYTES`         | `5242880`                    |
/// | `AUTH_RATE_LIMIT_PER_MINUTE` | `20`                       |
/// | `TRUSTED_PROXY_HOPS`       | `0` (ignore X-Forwarded-For) |
/// | `TTS_DEFAULT_VOICE`        | `default`                    |
/// | `TTS_PROVIDER`             | `silent`                     |
///
/// # Example
///
/// ```no_run
/// use readhub_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use config::Environment;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Shortest accepted JWT secret
pub const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub redis: RedisConfig,
    pub uploads: UploadConfig,
    pub rate_limit: RateLimitConfig,
    pub tts: TtsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Allowed CORS origins; `*` allows any
    pub cors_origins: Vec<String>,

    /// Enables HSTS and JSON-only logging defaults
    pub production: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    /// HS256 signing secret
    ///
    /// Generate with: `openssl rand -hex 32`
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Cache and rate limiting are disabled when `None`
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub dir: String,
    /// Prefix of public file URLs
    pub base_url: String,
    pub max_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Per client IP on `/v1/auth/*`; 0 disables
    pub auth_per_minute: u64,

    /// Reverse proxies in front of the API whose `X-Forwarded-For`
    /// entries are trusted; 0 keys clients by socket address
    pub trusted_proxy_hops: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    pub default_voice: String,
    /// Recorded on each request; the worker's provider does the work
    pub provider: String,
}

/// Flat view of the environment
#[derive(Debug, Deserialize)]
struct RawSettings {
    api_host: String,
    api_port: u16,
    cors_origins: String,
    production: bool,
    database_url: Option<String>,
    database_max_connections: u32,
    jwt_secret: Option<String>,
    redis_url: Option<String>,
    upload_dir: String,
    upload_base_url: String,
    upload_max_bytes: usize,
    auth_rate_limit_per_minute: u64,
    trusted_proxy_hops: usize,
    tts_default_voice: String,
    tts_provider: String,
}

impl Config {
    /// Loads configuration from `.env` and the environment
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing or values are
    /// invalid (unparsable numbers, short JWT secret).
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();
        Self::load(Environment::default())
    }

    /// Loads configuration from an explicit variable map instead of the
    /// process environment
    pub fn from_map(vars: HashMap<String, String>) -> anyhow::Result<Self> {
        Self::load(Environment::default().source(Some(vars)))
    }

    fn load(env: Environment) -> anyhow::Result<Self> {
        let raw: RawSettings = config::Config::builder()
            .set_default("api_host", "0.0.0.0")?
            .set_default("api_port", 8080)?
            .set_default("cors_origins", "*")?
            .set_default("production", false)?
            .set_default("database_max_connections", 10)?
            .set_default("upload_dir", "./uploads")?
            .set_default("upload_base_url", "/uploads")?
            .set_default("upload_max_bytes", 5 * 1024 * 1024)?
            .set_default("auth_rate_limit_per_minute", 20)?
            .set_default("trusted_proxy_hops", 0)?
            .set_default("tts_default_voice", "default")?
            .set_default("tts_provider", "silent")?
            .add_source(env.try_parsing(true))
            .build()?
            .try_deserialize()?;

        raw.into_config()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    pub fn cache_enabled(&self) -> bool {
        self.redis.url.is_some()
    }
}

impl RawSettings {
    fn into_config(self) -> anyhow::Result<Config> {
        let database_url = self
            .database_url
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let jwt_secret = self
            .jwt_secret
            .ok_or_else(|| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;

        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            anyhow::bail!("JWT_SECRET must be at least 32 characters long");
        }

        if self.upload_max_bytes == 0 {
            anyhow::bail!("UPLOAD_MAX_BYTES must be greater than zero");
        }

        let cors_origins = parse_list(&self.cors_origins);

        Ok(Config {
            api: ApiConfig {
                host: self.api_host,
                port: self.api_port,
                cors_origins,
                production: self.production,
            },
            database: DatabaseConfig {
                url: database_url,
                max_connections: self.database_max_connections.max(1),
            },
            jwt: JwtConfig { secret: jwt_secret },
            redis: RedisConfig {
                url: self.redis_url.filter(|v| !v.trim().is_empty()),
            },
            uploads: UploadConfig {
                dir: self.upload_dir,
                base_url: self.upload_base_url,
                max_bytes: self.upload_max_bytes,
            },
            rate_limit: RateLimitConfig {
                auth_per_minute: self.auth_rate_limit_per_minute,
                trusted_proxy_hops: self.trusted_proxy_hops,
            },
            tts: TtsConfig {
                default_voice: self.tts_default_voice,
                provider: self.tts_provider,
            },
        })
    }
}

/// Splits a comma separated list, dropping blanks
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
