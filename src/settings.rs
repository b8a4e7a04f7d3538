use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

use crate::auth::AccessPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

impl Server {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Session {
    /// Lifetime of a login cookie
    pub hours: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Access {
    pub policy: AccessPolicy,
}

/// Credentials of the hosted backend project.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Backend {
    pub project_id: String,
    pub auth_domain: String,
    pub api_key: String,
}

/// Admin account created at startup when both fields are set.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Bootstrap {
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Seed {
    /// JSON document loaded into the in-memory store
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: Server,
    pub session: Session,
    pub access: Access,
    #[serde(default)]
    pub backend: Backend,
    #[serde(default)]
    pub bootstrap: Bootstrap,
    #[serde(default)]
    pub seed: Seed,
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Config::builder()
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8080)?
        .set_default("session.hours", 24)?
        .set_default("access.policy", "any_authenticated")
}

impl Settings {
    /// Defaults, then `logistica.toml` if present, then `LOGISTICA__*`
    /// environment variables (`LOGISTICA__SERVER__PORT=9000`).
    pub fn new() -> Result<Self, ConfigError> {
        let config = defaults()?
            .add_source(
                File::with_name("logistica")
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                Environment::with_prefix("LOGISTICA")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Defaults overlaid with an inline TOML document.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    pub fn bootstrap_admin(&self) -> Option<(&str, &str)> {
        match (&self.bootstrap.admin_email, &self.bootstrap.admin_password) {
            (Some(email), Some(password)) if !email.is_empty() && !password.is_empty() => {
                Some((email.as_str(), password.as_str()))
            }
            _ => None,
        }
    }
}
