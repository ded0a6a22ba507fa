//! TOML configuration.
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:3000"
//!
//! [auth]
//! header = "authorization"
//! scheme = "Bearer"
//! ```
//!
//! Every key is optional; an empty document yields the defaults.

use std::net::SocketAddr;
use std::path::Path;

use http::HeaderName;
use serde::Deserialize;

use crate::error::Error;

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: "0.0.0.0:3000".to_owned() }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> Result<SocketAddr, Error> {
        self.bind
            .parse()
            .map_err(|e| Error::Config(format!("server.bind `{}`: {e}", self.bind)))
    }
}

/// Where token verification looks for the credential.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    pub header: String,
    pub scheme: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self { header: "authorization".to_owned(), scheme: "Bearer".to_owned() }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, Error> {
        let config: Config = toml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> Result<(), Error> {
        self.server.addr()?;
        HeaderName::try_from(self.auth.header.as_str())
            .map_err(|_| Error::Config(format!("auth.header `{}` is not a header name", self.auth.header)))?;
        if self.auth.scheme.is_empty() || self.auth.scheme.contains(char::is_whitespace) {
            return Err(Error::Config("auth.scheme must be a single non-empty token".to_owned()));
        }
        Ok(())
    }
}
