//! Server configuration
//!
//! Values come from an optional YAML file named by `COLLECTIONS_CONFIG`,
//! then environment variables override individual fields:
//!
//! - `COLLECTIONS_BIND_ADDR` - listen address (default `0.0.0.0:4200`)
//! - `DATABASE_URL` - Postgres connection string; unset means in-memory storage
//! - `DATABASE_POOL_SIZE` - pool size (default 10)
//! - `COLLECTIONS_ID_SECRET` - secret keying external ids

use std::path::Path;

use anyhow::{Context, Result};
use rand::RngCore;
use serde::Deserialize;
use tracing::{info, warn};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:4200";
pub const DEFAULT_POOL_SIZE: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub database_url: Option<String>,
    pub database_pool_size: u32,
    pub id_secret: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            database_url: None,
            database_pool_size: DEFAULT_POOL_SIZE,
            id_secret: None,
        }
    }
}

impl ServerConfig {
    /// Load `.env`, the optional YAML file, then environment overrides.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = match std::env::var("COLLECTIONS_CONFIG") {
            Ok(path) => {
                info!("Loading configuration from {}", path);
                Self::load_from_file(Path::new(&path))?
            }
            Err(_) => Self::default(),
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        Self::load_from_str(&content)
            .with_context(|| format!("parsing config file {}", path.display()))
    }

    pub fn load_from_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Override fields from `lookup`, which maps variable names to values.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("COLLECTIONS_BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Some(url) = lookup("DATABASE_URL").filter(|u| !u.is_empty()) {
            self.database_url = Some(url);
        }
        if let Some(size) = lookup("DATABASE_POOL_SIZE") {
            self.database_pool_size = size
                .parse()
                .with_context(|| format!("DATABASE_POOL_SIZE must be a number, got '{size}'"))?;
        }
        if let Some(secret) = lookup("COLLECTIONS_ID_SECRET").filter(|s| !s.is_empty()) {
            self.id_secret = Some(secret);
        }
        Ok(())
    }

    /// The configured id secret, or a random one for this process only.
    ///
    /// Ids encoded under an ephemeral secret stop decoding after a restart.
    pub fn id_secret_or_ephemeral(&self) -> String {
        match &self.id_secret {
            Some(secret) => secret.clone(),
            None => {
                warn!("COLLECTIONS_ID_SECRET not set; using an ephemeral id secret");
                let mut bytes = [0u8; 32];
                rand::thread_rng().fill_bytes(&mut bytes);
                hex::encode(bytes)
            }
        }
    }
}
