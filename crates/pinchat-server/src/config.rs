use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Placeholder secrets that are refused outside development.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

const DEV_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Sqlite(PathBuf),
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailerConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub addr: SocketAddr,
    pub jwt_secret: String,
    pub storage: StorageBackend,
    /// `None` selects the console mailer.
    pub mailer: Option<MailerConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let environment = match var("PINCHAT_ENV").as_deref() {
            None | Some("development") => Environment::Development,
            Some("production") => Environment::Production,
            Some(other) => bail!("PINCHAT_ENV must be development or production, got {:?}", other),
        };

        let jwt_secret = var("PINCHAT_JWT_SECRET").unwrap_or_default();
        let placeholder = jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str());
        if placeholder && environment == Environment::Production {
            bail!("PINCHAT_JWT_SECRET is unset or still a placeholder");
        }
        let jwt_secret = if jwt_secret.is_empty() { DEV_SECRET.to_string() } else { jwt_secret };

        let host = var("PINCHAT_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = var("PINCHAT_PORT")
            .unwrap_or_else(|| "8000".into())
            .parse()
            .context("PINCHAT_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .context("PINCHAT_HOST must be an IP address")?;

        let storage = match var("PINCHAT_STORAGE").as_deref() {
            None | Some("sqlite") => StorageBackend::Sqlite(
                var("PINCHAT_DB_PATH").unwrap_or_else(|| "pinchat.db".into()).into(),
            ),
            Some("memory") => StorageBackend::Memory,
            Some(other) => bail!("PINCHAT_STORAGE must be sqlite or memory, got {:?}", other),
        };

        let mailer = var("PINCHAT_MAILER_URL").map(|url| MailerConfig {
            url,
            api_key: var("PINCHAT_MAILER_KEY"),
            from: var("PINCHAT_MAIL_FROM").unwrap_or_else(|| "PinChat <noreply@pinchat.local>".into()),
        });

        Ok(Self {
            environment,
            addr,
            jwt_secret,
            storage,
            mailer,
        })
    }
}
