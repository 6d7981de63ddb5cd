//! Environment configuration.
//!
//! All recognized options come from the environment; nothing here reads
//! config files. TLS material is validated for existence up front so a
//! bad path fails at startup, not on the first request.

use std::path::PathBuf;
use thiserror::Error;

/// Default listen port.
const DEFAULT_PORT: u16 = 3001;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },

    #[error("TLS file for {name} does not exist: {path}")]
    MissingTlsFile { name: &'static str, path: String },
}

/// Proxy-header trust policy, mirroring the UI server's semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustProxy {
    Disabled,
    All,
    Hops(u32),
    Expression(String),
}

impl TrustProxy {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "" | "false" => TrustProxy::Disabled,
            "true" => TrustProxy::All,
            other => match other.parse::<u32>() {
                Ok(hops) => TrustProxy::Hops(hops),
                Err(_) => TrustProxy::Expression(raw.trim().to_string()),
            },
        }
    }
}

/// TLS material for the HTTPS listener.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub key_path: PathBuf,
    pub cert_path: PathBuf,
    pub ca_path: Option<PathBuf>,
    pub passphrase: Option<String>,
}

/// Optional GitHub OAuth exchange credentials.
#[derive(Debug, Clone)]
pub struct OauthConfig {
    pub client_id: String,
    pub client_secret: String,
}

/// The full recognized option set.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub port: u16,
    pub trust_proxy: TrustProxy,
    pub tls: Option<TlsConfig>,
    pub oauth: Option<OauthConfig>,
}

impl BridgeConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through a lookup function. Tests inject maps
    /// here instead of mutating the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = match lookup("BRIDGE_PORT") {
            None => DEFAULT_PORT,
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| ConfigError::Invalid {
                name: "BRIDGE_PORT",
                value: raw.clone(),
            })?,
        };

        let trust_proxy = lookup("TRUST_PROXY")
            .map(|raw| TrustProxy::parse(&raw))
            .unwrap_or(TrustProxy::Disabled);

        let use_https = lookup("MCP_USE_HTTPS")
            .map(|raw| raw.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        let tls = if use_https {
            let key_path = PathBuf::from(lookup("MCP_SSL_KEY_PATH").ok_or(
                ConfigError::Invalid {
                    name: "MCP_SSL_KEY_PATH",
                    value: String::new(),
                },
            )?);
            let cert_path = PathBuf::from(lookup("MCP_SSL_CERT_PATH").ok_or(
                ConfigError::Invalid {
                    name: "MCP_SSL_CERT_PATH",
                    value: String::new(),
                },
            )?);
            for (name, path) in [("MCP_SSL_KEY_PATH", &key_path), ("MCP_SSL_CERT_PATH", &cert_path)]
            {
                if !path.exists() {
                    return Err(ConfigError::MissingTlsFile {
                        name,
                        path: path.display().to_string(),
                    });
                }
            }
            Some(TlsConfig {
                key_path,
                cert_path,
                ca_path: lookup("MCP_SSL_CA_PATH").map(PathBuf::from),
                passphrase: lookup("MCP_SSL_PASSPHRASE"),
            })
        } else {
            None
        };

        let oauth = match (lookup("GITHUB_CLIENT_ID"), lookup("GITHUB_CLIENT_SECRET")) {
            (Some(client_id), Some(client_secret))
                if !client_id.is_empty() && !client_secret.is_empty() =>
            {
                Some(OauthConfig {
                    client_id,
                    client_secret,
                })
            }
            _ => None,
        };

        Ok(Self {
            port,
            trust_proxy,
            tls,
            oauth,
        })
    }
}
