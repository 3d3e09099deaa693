//! Service configuration.
//!
//! Every field has a default, so an empty or absent file yields a working
//! local setup. Command-line flags are applied on top by the binary.

mod server;

pub use server::ServerConfig;

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::orders::DEFAULT_MAX_ATTEMPTS_PER_TICKET;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub rate_limits: RateLimitsConfig,
    pub payments: PaymentsConfig,
    pub assignment: AssignmentConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RateLimit {
    pub limit: u32,
    pub window_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitsConfig {
    pub checkout: RateLimit,
    pub my_numbers: RateLimit,
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            checkout: RateLimit {
                limit: 10,
                window_seconds: 3600,
            },
            my_numbers: RateLimit {
                limit: 3,
                window_seconds: 3600,
            },
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PaymentsConfig {
    pub payphone: PayphoneConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PayphoneConfig {
    /// Callbacks must carry this store id when set.
    pub store_id: Option<String>,
    /// Enables HMAC verification of the `X-Signature` header.
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssignmentConfig {
    pub max_attempts_per_ticket: u32,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            max_attempts_per_ticket: DEFAULT_MAX_ATTEMPTS_PER_TICKET,
        }
    }
}

impl Config {
    /// Reads a TOML file, or returns defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let raw = fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("cannot read {}: {e}", path.display()))
                })?;
                Self::from_toml(&raw)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        for (name, rule) in [
            ("checkout", self.rate_limits.checkout),
            ("my_numbers", self.rate_limits.my_numbers),
        ] {
            if rule.limit == 0 || rule.window_seconds == 0 {
                return Err(Error::Config(format!(
                    "rate_limits.{name} needs a positive limit and window"
                )));
            }
        }
        if self.assignment.max_attempts_per_ticket == 0 {
            return Err(Error::Config(
                "assignment.max_attempts_per_ticket must be at least 1".to_string(),
            ));
        }
        if let Some(url) = &self.server.public_base_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(Error::Config(format!(
                    "server.public_base_url must be an http(s) URL: {url}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.server.port, 8080);
        assert!(!config.server.dev_mode);
        assert_eq!(config.rate_limits.checkout.limit, 10);
        assert_eq!(config.rate_limits.my_numbers.limit, 3);
        assert_eq!(config.assignment.max_attempts_per_ticket, 25);
        assert_eq!(config.server.base_url(), "http://127.0.0.1:8080");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("rafflebox.toml");
        std::fs::write(
            &path,
            r#"
[server]
port = 9000
data_dir = "/var/lib/rafflebox"
public_base_url = "https://tickets.example.com/"
dev_mode = true

[rate_limits.my_numbers]
limit = 5
window_seconds = 600

[payments.payphone]
store_id = "store-1"
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.data_dir, PathBuf::from("/var/lib/rafflebox"));
        assert_eq!(config.server.base_url(), "https://tickets.example.com");
        assert!(config.server.dev_mode);
        assert_eq!(
            config.rate_limits.my_numbers,
            RateLimit {
                limit: 5,
                window_seconds: 600
            }
        );
        assert_eq!(config.rate_limits.checkout.limit, 10);
        assert_eq!(config.payments.payphone.store_id.as_deref(), Some("store-1"));
        assert!(config.payments.payphone.webhook_secret.is_none());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            Config::from_toml("[assignment]\nmax_attempts_per_ticket = 0")
                .unwrap()
                .validate(),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::from_toml("[server]\nport = \"eighty\""),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Config::load(Some(Path::new("/nonexistent/rafflebox.toml"))),
            Err(Error::Config(_))
        ));
    }
}
