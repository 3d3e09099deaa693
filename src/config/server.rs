use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Public base URL for external access (e.g., "https://tickets.example.com").
    /// Used for recovery links and dev checkout URLs. Derived from host and port if not set.
    pub public_base_url: Option<String>,
    /// Mounts the dev payment routes and registers the unsigned fake provider.
    pub dev_mode: bool,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse()
            .map_err(|e| Error::Config(format!("server address {addr} is invalid: {e}")))
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("rafflebox.db")
    }

    #[must_use]
    pub fn admin_token_path(&self) -> PathBuf {
        self.data_dir.join(".admin_token")
    }

    #[must_use]
    pub fn base_url(&self) -> String {
        match &self.public_base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            public_base_url: None,
            dev_mode: false,
        }
    }
}
