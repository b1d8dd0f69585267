// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment once at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Directory holding `custody.redb` | `/data` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//! | `ENCLAVE_URL` | Base URL of the signing enclave | Required without the `dev` feature |
//! | `ENCLAVE_TIMEOUT_MS` | Deadline of one enclave call | `10000` |
//! | `LOCK_LEASE_SECS` | Dispatch lock lease | `30` |
//! | `SESSION_TTL_SECS` | Session lifetime | `3600` |
//! | `RATE_LIMIT_MAX_SUBMISSIONS` | Submissions per requester and type per window | `30` |
//! | `RATE_LIMIT_WINDOW_SECS` | Rate limit window | `60` |
//! | `APPROVAL_TTL_SECS` | Maximum wait in `needs_quorum` | `86400` |
//! | `SWEEP_INTERVAL_SECS` | Sweeper period | `30` |
//! | `PROOF_SIGNING_KEY` | HMAC key for proof attestations | Random per process |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | PEM files for HTTPS | Plain HTTP |
//! | `BOOTSTRAP_ORG_NAME` / `BOOTSTRAP_ADMIN_EMAIL` | First-run organization | None |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::activity::EngineConfig;

pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const DEFAULT_DATA_DIR: &str = "/data";

/// File name of the database inside `DATA_DIR`.
pub const DATABASE_FILE: &str = "custody.redb";

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";
pub const ENCLAVE_URL_ENV: &str = "ENCLAVE_URL";
pub const ENCLAVE_TIMEOUT_MS_ENV: &str = "ENCLAVE_TIMEOUT_MS";
pub const LOCK_LEASE_SECS_ENV: &str = "LOCK_LEASE_SECS";
pub const SESSION_TTL_SECS_ENV: &str = "SESSION_TTL_SECS";
pub const RATE_LIMIT_MAX_ENV: &str = "RATE_LIMIT_MAX_SUBMISSIONS";
pub const RATE_LIMIT_WINDOW_SECS_ENV: &str = "RATE_LIMIT_WINDOW_SECS";
pub const APPROVAL_TTL_SECS_ENV: &str = "APPROVAL_TTL_SECS";
pub const SWEEP_INTERVAL_SECS_ENV: &str = "SWEEP_INTERVAL_SECS";

/// HMAC key for proof attestations. Any string; use at least 32 bytes.
pub const PROOF_SIGNING_KEY_ENV: &str = "PROOF_SIGNING_KEY";

pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";
pub const BOOTSTRAP_ORG_NAME_ENV: &str = "BOOTSTRAP_ORG_NAME";
pub const BOOTSTRAP_ADMIN_EMAIL_ENV: &str = "BOOTSTRAP_ADMIN_EMAIL";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} has invalid value `{value}`: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} is required")]
    Missing(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Clone)]
pub struct Bootstrap {
    pub organization_name: String,
    pub admin_email: String,
}

#[derive(Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub log_format: LogFormat,
    /// `None` only with the `dev` feature (simulated signer).
    pub enclave_url: Option<Url>,
    pub engine: EngineConfig,
    pub session_ttl: Duration,
    pub sweep_interval: Duration,
    pub proof_signing_key: Option<Vec<u8>>,
    pub tls: Option<TlsPaths>,
    pub bootstrap: Option<Bootstrap>,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("data_dir", &self.data_dir)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("log_format", &self.log_format)
            .field("enclave_url", &self.enclave_url.as_ref().map(Url::as_str))
            .field("engine", &self.engine)
            .field("session_ttl", &self.session_ttl)
            .field("sweep_interval", &self.sweep_interval)
            .field("proof_signing_key", &self.proof_signing_key.as_ref().map(|_| "<redacted>"))
            .field("tls", &self.tls)
            .field("bootstrap", &self.bootstrap)
            .finish()
    }
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let log_format = match var(LOG_FORMAT_ENV).as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: LOG_FORMAT_ENV,
                    value: other.to_string(),
                    reason: "expected `json` or `pretty`".to_string(),
                })
            }
        };

        let enclave_url = match var(ENCLAVE_URL_ENV) {
            Some(raw) => Some(Url::parse(&raw).map_err(|e| ConfigError::Invalid {
                name: ENCLAVE_URL_ENV,
                value: raw.clone(),
                reason: e.to_string(),
            })?),
            None if cfg!(feature = "dev") => None,
            None => return Err(ConfigError::Missing(ENCLAVE_URL_ENV)),
        };

        let tls = match (var(TLS_CERT_PATH_ENV), var(TLS_KEY_PATH_ENV)) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing(TLS_KEY_PATH_ENV)),
            (None, Some(_)) => return Err(ConfigError::Missing(TLS_CERT_PATH_ENV)),
        };

        let bootstrap = match (var(BOOTSTRAP_ORG_NAME_ENV), var(BOOTSTRAP_ADMIN_EMAIL_ENV)) {
            (Some(organization_name), Some(admin_email)) => Some(Bootstrap {
                organization_name,
                admin_email,
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing(BOOTSTRAP_ADMIN_EMAIL_ENV)),
            (None, Some(_)) => return Err(ConfigError::Missing(BOOTSTRAP_ORG_NAME_ENV)),
        };

        let engine = EngineConfig {
            enclave_timeout: Duration::from_millis(parse(&var, ENCLAVE_TIMEOUT_MS_ENV, 10_000)?),
            lock_lease: secs(&var, LOCK_LEASE_SECS_ENV, 30)?,
            approval_ttl: secs(&var, APPROVAL_TTL_SECS_ENV, 86_400)?,
            rate_limit_max: parse(&var, RATE_LIMIT_MAX_ENV, 30)?,
            rate_limit_window: secs(&var, RATE_LIMIT_WINDOW_SECS_ENV, 60)?,
        };

        Ok(Self {
            data_dir: var(DATA_DIR_ENV)
                .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string())
                .into(),
            host: var(HOST_ENV).unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse(&var, PORT_ENV, 8080)?,
            log_format,
            enclave_url,
            engine,
            session_ttl: secs(&var, SESSION_TTL_SECS_ENV, 3600)?,
            sweep_interval: secs(&var, SWEEP_INTERVAL_SECS_ENV, 30)?,
            proof_signing_key: var(PROOF_SIGNING_KEY_ENV).map(String::into_bytes),
            tls,
            bootstrap,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }
}

fn parse<T>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            value: raw.clone(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Positive number of seconds.
fn secs(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: u64,
) -> Result<Duration, ConfigError> {
    let value: u64 = parse(var, name, default)?;
    if value == 0 {
        return Err(ConfigError::Invalid {
            name,
            value: "0".to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(Duration::from_secs(value))
}
