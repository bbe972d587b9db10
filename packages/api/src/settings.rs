use std::path::PathBuf;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct Backend {
    pub url: String,
    /// Public anon key, sent as `apikey` on every request.
    pub key: String,
}

impl Default for Backend {
    fn default() -> Self {
        Self {
            url: "http://localhost:54321".into(),
            key: String::new(),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Storage {
    pub bucket: String,
    /// Lifetime of signed bill URLs, in seconds.
    pub expiry: u64,
}

impl Storage {
    pub fn signed_url_lifetime(&self) -> Duration {
        Duration::from_secs(self.expiry)
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            bucket: "bills".into(),
            expiry: 3600,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Cache {
    pub dir: PathBuf,
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".dailytrack"),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct Settings {
    pub backend: Backend,
    pub storage: Storage,
    pub cache: Cache,
}

impl Settings {
    /// Defaults, then `config.toml` if present, then `BACKEND_URL`-style
    /// environment variables. `.env` is loaded first.
    pub fn new() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::load("config.toml")
    }

    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("backend.url", "http://localhost:54321")?
            .set_default("backend.key", "")?
            .set_default("storage.bucket", "bills")?
            .set_default("storage.expiry", 3600)?
            .set_default("cache.dir", ".dailytrack")?
            .add_source(File::with_name(path).format(FileFormat::Toml).required(false))
            .add_source(Environment::default().separator("_"))
            .build()?;

        config.try_deserialize()
    }
}
