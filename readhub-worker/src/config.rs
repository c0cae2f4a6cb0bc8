/// Configuration for the background worker
///
/// Read from the environment (after `.env` via `dotenvy`) with the `config`
/// crate, the same way the API server loads its settings. The worker shares
/// `DATABASE_URL` and the `UPLOAD_*` variables with the API so audio lands in
/// the directory the API serves.
///
/// # Environment Variables
///
/// | Variable                        | Default                 |
/// |---------------------------------|-------------------------|
/// | `DATABASE_URL`                  | required                |
/// | `DATABASE_MAX_CONNECTIONS`      | `5`                     |
/// | `UPLOAD_DIR`                    | `./uploads`             |
/// | `UPLOAD_BASE_URL`               | `/uploads`              |
/// | `AUDIO_MAX_BYTES`               | `20971520`              |
/// | `WORKER_POLL_INTERVAL_SECS`     | `1`                     |
/// | `WORKER_MAX_CONCURRENT_JOBS`    | `4`                     |
/// | `WORKER_BATCH_SIZE`             | `4`                     |
/// | `WORKER_STALE_AFTER_SECS`       | `600`                   |
/// | `WORKER_SHUTDOWN_TIMEOUT_SECS`  | `30`                    |
/// | `TTS_PROVIDER`                  | `silent` (or `http`)    |
/// | `TTS_ENDPOINT`                  | required for `http`     |
/// | `TTS_API_KEY`                   | unset                   |
/// | `TTS_MAX_CHARS`                 | `1000`                  |
/// | `SCRAPER_JSON_HOSTS`            | empty (comma separated) |
/// | `SCRAPER_TIMEOUT_SECS`          | `15`                    |
/// | `SCRAPER_USER_AGENT`            | `ReadHubBot/<version>`  |
/// | `SCRAPER_MAX_BYTES`             | `2097152`               |

use crate::orchestrator::OrchestratorConfig;
use config::Environment;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseSettings,
    pub storage: StorageSettings,
    pub orchestrator: OrchestratorConfig,
    pub tts: TtsSettings,
    pub scraper: ScraperSettings,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub dir: String,
    pub base_url: String,
    pub max_bytes: usize,
}

/// Which speech backend synthesizes audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TtsBackend {
    Silent,
    Http {
        endpoint: String,
        api_key: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct TtsSettings {
    pub backend: TtsBackend,
    /// Longest text sent in one synthesis request
    pub max_chars: usize,
}

#[derive(Debug, Clone)]
pub struct ScraperSettings {
    /// Hosts answering chapter JSON instead of HTML
    pub json_hosts: Vec<String>,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub max_bytes: usize,
}

#[derive(Debug, Deserialize)]
struct RawSettings {
    database_url: Option<String>,
    database_max_connections: u32,
    upload_dir: String,
    upload_base_url: String,
    audio_max_bytes: usize,
    worker_poll_interval_secs: u64,
    worker_max_concurrent_jobs: usize,
    worker_batch_size: usize,
    worker_stale_after_secs: i64,
    worker_shutdown_timeout_secs: u64,
    tts_provider: String,
    tts_endpoint: Option<String>,
    tts_api_key: Option<String>,
    tts_max_chars: usize,
    scraper_json_hosts: String,
    scraper_timeout_secs: u64,
    scraper_user_agent: Option<String>,
    scraper_max_bytes: usize,
}

impl Config {
    /// Loads configuration from `.env` and the environment
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::load(Environment::default())
    }

    /// Loads configuration from an explicit variable map
    pub fn from_map(vars: HashMap<String, String>) -> anyhow::Result<Self> {
        Self::load(Environment::default().source(Some(vars)))
    }

    fn load(env: Environment) -> anyhow::Result<Self> {
        let defaults = OrchestratorConfig::default();

        let raw: RawSettings = config::Config::builder()
            .set_default("database_max_connections", 5)?
            .set_default("upload_dir", "./uploads")?
            .set_default("upload_base_url", "/uploads")?
            .set_default("audio_max_bytes", 20 * 1024 * 1024)?
            .set_default("worker_poll_interval_secs", defaults.poll_interval_secs)?
            .set_default("worker_max_concurrent_jobs", defaults.max_concurrent_jobs as u64)?
            .set_default("worker_batch_size", defaults.batch_size as u64)?
            .set_default("worker_stale_after_secs", defaults.stale_after_secs)?
            .set_default("worker_shutdown_timeout_secs", defaults.shutdown_timeout_secs)?
            .set_default("tts_provider", "silent")?
            .set_default("tts_max_chars", 1000)?
            .set_default("scraper_json_hosts", "")?
            .set_default("scraper_timeout_secs", 15)?
            .set_default("scraper_max_bytes", 2 * 1024 * 1024)?
            .add_source(env.try_parsing(true))
            .build()?
            .try_deserialize()?;

        raw.into_config()
    }
}

impl RawSettings {
    fn into_config(self) -> anyhow::Result<Config> {
        let database_url = non_blank(self.database_url)
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let backend = match self.tts_provider.trim().to_ascii_lowercase().as_str() {
            "silent" => TtsBackend::Silent,
            "http" => TtsBackend::Http {
                endpoint: non_blank(self.tts_endpoint).ok_or_else(|| {
                    anyhow::anyhow!("TTS_ENDPOINT is required when TTS_PROVIDER=http")
                })?,
                api_key: non_blank(self.tts_api_key),
            },
            other => anyhow::bail!("Unknown TTS_PROVIDER: {}", other),
        };

        if self.tts_max_chars == 0 {
            anyhow::bail!("TTS_MAX_CHARS must be greater than zero");
        }
        if self.worker_max_concurrent_jobs == 0 {
            anyhow::bail!("WORKER_MAX_CONCURRENT_JOBS must be greater than zero");
        }

        let user_agent = non_blank(self.scraper_user_agent)
            .unwrap_or_else(|| format!("ReadHubBot/{}", env!("CARGO_PKG_VERSION")));

        Ok(Config {
            database: DatabaseSettings {
                url: database_url,
                max_connections: self.database_max_connections.max(1),
            },
            storage: StorageSettings {
                dir: self.upload_dir,
                base_url: self.upload_base_url,
                max_bytes: self.audio_max_bytes,
            },
            orchestrator: OrchestratorConfig {
                poll_interval_secs: self.worker_poll_interval_secs.max(1),
                max_concurrent_jobs: self.worker_max_concurrent_jobs,
                batch_size: self.worker_batch_size.max(1),
                stale_after_secs: self.worker_stale_after_secs.max(60),
                shutdown_timeout_secs: self.worker_shutdown_timeout_secs,
            },
            tts: TtsSettings {
                backend,
                max_chars: self.tts_max_chars,
            },
            scraper: ScraperSettings {
                json_hosts: self
                    .scraper_json_hosts
                    .split(',')
                    .map(|h| h.trim().to_ascii_lowercase())
                    .filter(|h| !h.is_empty())
                    .collect(),
                timeout_secs: self.scraper_timeout_secs.max(1),
                user_agent,
                max_bytes: self.scraper_max_bytes,
            },
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_map(vars(&[("DATABASE_URL", "postgresql://localhost/readhub")])).unwrap();

        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.storage.dir, "./uploads");
        assert_eq!(config.tts.backend, TtsBackend::Silent);
        assert_eq!(config.tts.max_chars, 1000);
        assert!(config.scraper.json_hosts.is_empty());
        assert!(config.scraper.user_agent.starts_with("ReadHubBot/"));
        assert_eq!(config.orchestrator.max_concurrent_jobs, 4);
    }

    #[test]
    fn test_database_url_required() {
        assert!(Config::from_map(vars(&[])).is_err());
        assert!(Config::from_map(vars(&[("DATABASE_URL", "  ")])).is_err());
    }

    #[test]
    fn test_http_backend() {
        let config = Config::from_map(vars(&[
            ("DATABASE_URL", "postgresql://localhost/readhub"),
            ("TTS_PROVIDER", "HTTP"),
            ("TTS_ENDPOINT", "https://tts.example.com/v1/speak"),
            ("TTS_API_KEY", "secret"),
        ]))
        .unwrap();

        assert_eq!(
            config.tts.backend,
            TtsBackend::Http {
                endpoint: "https://tts.example.com/v1/speak".into(),
                api_key: Some("secret".into()),
            }
        );

        let missing = Config::from_map(vars(&[
            ("DATABASE_URL", "postgresql://localhost/readhub"),
            ("TTS_PROVIDER", "http"),
        ]));
        assert!(missing.is_err());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let result = Config::from_map(vars(&[
            ("DATABASE_URL", "postgresql://localhost/readhub"),
            ("TTS_PROVIDER", "carrier-pigeon"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_json_hosts_parsed() {
        let config = Config::from_map(vars(&[
            ("DATABASE_URL", "postgresql://localhost/readhub"),
            ("SCRAPER_JSON_HOSTS", " API.Novels.example , ,chapters.example.org"),
            ("WORKER_MAX_CONCURRENT_JOBS", "8"),
        ]))
        .unwrap();

        assert_eq!(
            config.scraper.json_hosts,
            vec!["api.novels.example".to_string(), "chapters.example.org".to_string()]
        );
        assert_eq!(config.orchestrator.max_concurrent_jobs, 8);
    }
}
