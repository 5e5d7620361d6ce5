/// Application configuration module
use std::env;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub nasa_api_url: String,
    pub nasa_api_key: String,
    pub bind_addr: String,
    pub http_timeout: Duration,
    pub cache: CacheLimits,
    pub recent_days: u32,
}

/// Capacities of the in-memory session caches
#[derive(Clone, Debug)]
pub struct CacheLimits {
    pub metadata_entries: usize,
    pub image_entries: usize,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://nasa_viewer.db?mode=rwc".to_string());

        let nasa_api_url = env::var("NASA_API_BASE_URL")
            .unwrap_or_else(|_| "https://api.nasa.gov".to_string())
            .trim_end_matches('/')
            .to_string();

        // NASA's shared public key; set NASA_API_KEY for real rate limits.
        let nasa_api_key = env::var("NASA_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .unwrap_or_else(|| "DEMO_KEY".to_string());

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        if !nasa_api_url.starts_with("http://") && !nasa_api_url.starts_with("https://") {
            anyhow::bail!("NASA_API_BASE_URL must be an http(s) URL, got {nasa_api_url}");
        }

        let cache = CacheLimits {
            metadata_entries: env_u64("CACHE_CAPACITY", 64).max(1) as usize,
            image_entries: env_u64("IMAGE_CACHE_CAPACITY", 32).max(1) as usize,
        };

        Ok(Self {
            database_url,
            nasa_api_url,
            nasa_api_key,
            bind_addr,
            http_timeout: Duration::from_secs(env_u64("HTTP_TIMEOUT_SECONDS", 30)),
            cache,
            recent_days: env_u64("RECENT_DAYS", 7).clamp(1, 30) as u32,
        })
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
