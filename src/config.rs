use std::collections::HashMap;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use anyhow::Context;
use url::Url;

/// Server settings, read from the environment (a `.env` file is honoured by
/// `main`).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub secure_cookies: bool,
    pub profiles: Profiles,
    pub authentication: Authentication,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:data/oplog.db".to_string());
        let host = env::var("OPLOG_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("OPLOG_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .context("OPLOG_PORT must be a port number")?;
        let secure_cookies = env::var("OPLOG_SECURE_COOKIES")
            .map(|value| matches!(value.as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        let profiles = match env::var("OPLOG_PROFILES") {
            Ok(path) => Profiles::load(Path::new(&path))?,
            Err(_) => Profiles::default(),
        };

        let authentication = Authentication::from_lookup(|name| env::var(name).ok())?;

        Ok(Self {
            database_url,
            host,
            port,
            secure_cookies,
            profiles,
            authentication,
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

/// Which backend checks login passwords (`OPLOG_AUTHENTICATOR`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authentication {
    Development,
    Ldap(LdapSettings),
}

/// Simple-bind settings. `${user}` in the template is replaced with the
/// escaped username.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapSettings {
    pub uri: String,
    pub start_tls: bool,
    pub user_dn_template: String,
}

impl Authentication {
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = lookup("OPLOG_AUTHENTICATOR").unwrap_or_else(|| "development".to_string());
        match backend.as_str() {
            "development" => Ok(Authentication::Development),
            "ldap" => Ok(Authentication::Ldap(LdapSettings {
                uri: lookup("OPLOG_LDAP_URI").unwrap_or_else(|| "ldaps://ldap.example.org".to_string()),
                start_tls: lookup("OPLOG_LDAP_START_TLS")
                    .map(|value| matches!(value.as_str(), "1" | "true" | "yes"))
                    .unwrap_or(true),
                user_dn_template: lookup("OPLOG_LDAP_USER_DN_TEMPLATE")
                    .unwrap_or_else(|| "uid=${user},ou=people,dc=example,dc=org".to_string()),
            })),
            other => anyhow::bail!("unknown OPLOG_AUTHENTICATOR {other} (expected development or ldap)"),
        }
    }
}

/// Application keys allowed to call the API without a session.
///
/// Loaded from a JSON object mapping application name to key.
#[derive(Debug, Clone, Default)]
pub struct Profiles(HashMap<String, String>);

impl Profiles {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("unable to read profile file {}", path.display()))?;
        let keys: HashMap<String, String> = serde_json::from_str(&content)
            .with_context(|| format!("unable to parse profile file {}", path.display()))?;
        tracing::info!(count = keys.len(), "loaded application profiles");
        Ok(Self(keys))
    }

    pub fn verify(&self, app: &str, key: &str) -> bool {
        self.0.get(app).is_some_and(|expected| expected == key)
    }
}

impl FromIterator<(String, String)> for Profiles {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// How the shell reaches and identifies itself to the API.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: Url,
    pub credentials: Credentials,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Login { username: String, password: String },
    Application { app: String, key: String },
}

impl Credentials {
    /// Identity entries written with these credentials are attributed to.
    pub fn viewer(&self) -> String {
        match self {
            Credentials::Login { username, .. } => username.clone(),
            Credentials::Application { app, .. } => format!("[{app}]"),
        }
    }
}

impl ClientConfig {
    /// Resolve client settings from explicit options, falling back to the
    /// `OPLOG_*` environment variables.
    pub fn resolve(options: &HashMap<String, String>) -> anyhow::Result<Self> {
        let lookup = |name: &str, var: &str| options.get(name).cloned().or_else(|| env::var(var).ok());

        let url = lookup("url", "OPLOG_URL").unwrap_or_else(|| "http://localhost:3000".to_string());
        let url = Url::parse(&url).with_context(|| format!("invalid server url {url}"))?;

        let credentials = match (lookup("app", "OPLOG_APP"), lookup("key", "OPLOG_KEY")) {
            (Some(app), Some(key)) => Credentials::Application { app, key },
            _ => {
                let username = lookup("user", "OPLOG_USER")
                    .context("a user (--user or OPLOG_USER) or an app key is required")?;
                let password = lookup("password", "OPLOG_PASSWORD").unwrap_or_else(|| username.clone());
                Credentials::Login { username, password }
            }
        };

        Ok(Self { url, credentials })
    }
}
