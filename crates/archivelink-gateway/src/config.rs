//! Gateway configuration
//!
//! Read once at startup from `ARCHIVELINK_*` environment variables. The
//! dispatcher only ever sees the resulting [`DispatcherConfig`].

use serde::Deserialize;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::Level;

use archivelink_core::{access::PROTECTION_RCUD, parse_permissions, Certificate, TrustedCertificate};
use archivelink_dispatch::{DispatcherConfig, ForwardTarget};

pub const DEFAULT_ENDPOINT: &str = "/ContentServer/ContentServer.dll";
pub const DEFAULT_PORT: u16 = 8080;

/// Errors that stop the gateway from starting
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Invalid value for {name}: '{value}' ({reason})")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("Trust file {}: {reason}", .path.display())]
    TrustFile { path: PathBuf, reason: String },

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Complete gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind: IpAddr,
    pub port: u16,

    /// Path of the content server endpoint
    pub endpoint: String,

    pub dispatcher: DispatcherConfig,

    /// JSON file with repository certificates to trust at startup
    pub trust_file: Option<PathBuf>,

    pub log_level: Level,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            dispatcher: DispatcherConfig::default(),
            trust_file: None,
            log_level: Level::INFO,
        }
    }
}

impl GatewayConfig {
    /// Read the configuration from the process environment
    pub fn from_env() -> Result<Self, StartupError> {
        let vars: HashMap<String, String> = std::env::vars().collect();
        Self::from_kv(&vars)
    }

    /// Read the configuration from a variable map
    pub fn from_kv(vars: &HashMap<String, String>) -> Result<Self, StartupError> {
        let get = |name: &str| {
            vars.get(name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };

        let port = match get("ARCHIVELINK_PORT") {
            Some(v) => parse_number("ARCHIVELINK_PORT", v)?,
            None => DEFAULT_PORT,
        };

        let bind = match get("ARCHIVELINK_BIND") {
            Some(v) => v.parse().map_err(|e: std::net::AddrParseError| StartupError::InvalidValue {
                name: "ARCHIVELINK_BIND",
                value: v.to_string(),
                reason: e.to_string(),
            })?,
            None => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        };

        let endpoint = normalize_path(get("ARCHIVELINK_ENDPOINT").unwrap_or(DEFAULT_ENDPOINT));

        let protection_level = match get("ARCHIVELINK_PROTECTION") {
            Some(v) => parse_permissions(v).map_err(|e| StartupError::InvalidValue {
                name: "ARCHIVELINK_PROTECTION",
                value: v.to_string(),
                reason: e.to_string(),
            })?,
            None => PROTECTION_RCUD,
        };

        let allow_certificate_fallback = match get("ARCHIVELINK_CERT_FALLBACK") {
            Some(v) => parse_bool("ARCHIVELINK_CERT_FALLBACK", v)?,
            None => false,
        };

        let forward_enabled = match get("ARCHIVELINK_FORWARD_WRITES") {
            Some(v) => parse_bool("ARCHIVELINK_FORWARD_WRITES", v)?,
            None => false,
        };

        let forward_writes = if forward_enabled {
            let host = get("ARCHIVELINK_FORWARD_HOST")
                .ok_or(StartupError::Missing("ARCHIVELINK_FORWARD_HOST"))?;
            let port = match get("ARCHIVELINK_FORWARD_PORT") {
                Some(v) => parse_number("ARCHIVELINK_FORWARD_PORT", v)?,
                None => 80,
            };
            let scheme = get("ARCHIVELINK_FORWARD_SCHEME").unwrap_or("http");
            if scheme != "http" && scheme != "https" {
                return Err(StartupError::InvalidValue {
                    name: "ARCHIVELINK_FORWARD_SCHEME",
                    value: scheme.to_string(),
                    reason: "expected http or https".to_string(),
                });
            }
            Some(ForwardTarget {
                scheme: scheme.to_string(),
                host: host.to_string(),
                port,
                path: get("ARCHIVELINK_FORWARD_PATH")
                    .map(normalize_path)
                    .unwrap_or_else(|| endpoint.clone()),
            })
        } else {
            None
        };

        let log_level = match get("ARCHIVELINK_LOG_LEVEL") {
            Some(v) => v.parse().map_err(|_| StartupError::InvalidValue {
                name: "ARCHIVELINK_LOG_LEVEL",
                value: v.to_string(),
                reason: "expected trace, debug, info, warn or error".to_string(),
            })?,
            None => Level::INFO,
        };

        Ok(Self {
            bind,
            port,
            endpoint,
            dispatcher: DispatcherConfig {
                protection_level,
                forward_writes,
                allow_certificate_fallback,
            },
            trust_file: get("ARCHIVELINK_TRUST_FILE").map(PathBuf::from),
            log_level,
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

fn parse_number(name: &'static str, value: &str) -> Result<u16, StartupError> {
    value.parse().map_err(|e: std::num::ParseIntError| StartupError::InvalidValue {
        name,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, StartupError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(StartupError::InvalidValue {
            name,
            value: value.to_string(),
            reason: "expected true or false".to_string(),
        }),
    }
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

/// One entry of the trust file
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrustEntry {
    cont_rep: String,
    certificate: Certificate,
    #[serde(default)]
    permissions: Option<String>,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

/// Load repository certificates from a JSON trust file
///
/// ```json
/// [{"contRep": "K1", "certificate": {...}, "permissions": "rcud", "enabled": true}]
/// ```
pub fn load_trust_file(path: &Path) -> Result<Vec<(String, TrustedCertificate)>, StartupError> {
    let trust_error = |reason: String| StartupError::TrustFile {
        path: path.to_path_buf(),
        reason,
    };

    let content = std::fs::read_to_string(path)?;
    let entries: Vec<TrustEntry> =
        serde_json::from_str(&content).map_err(|e| trust_error(e.to_string()))?;

    entries
        .into_iter()
        .map(|entry| -> Result<(String, TrustedCertificate), StartupError> {
            let permissions = match &entry.permissions {
                Some(value) => parse_permissions(value).map_err(|e| trust_error(e.to_string()))?,
                None => PROTECTION_RCUD,
            };
            let trusted = TrustedCertificate::new(entry.certificate, permissions)
                .map_err(|e| trust_error(e.to_string()))?
                .with_enabled(entry.enabled);
            Ok((entry.cont_rep, trusted))
        })
        .collect()
}
