// Runtime configuration, read from the environment with defaults.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::auth::TokenGrant;

pub const DEFAULT_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/taskflow.db";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_STATIC_DIR: &str = "static";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub database_url: String,
    pub max_connections: u32,
    pub static_dir: PathBuf,
    pub tokens: HashMap<String, TokenGrant>, // bearer token -> user id (+ expiry)
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let addr_raw = lookup("TASKFLOW_ADDR").unwrap_or_else(|| DEFAULT_ADDR.to_string());
        let addr = addr_raw.parse::<SocketAddr>().map_err(|e| ConfigError::Invalid {
            var: "TASKFLOW_ADDR",
            reason: format!("{e}"),
        })?;

        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());

        let max_connections = match lookup("TASKFLOW_DB_MAX_CONNECTIONS") {
            None => DEFAULT_MAX_CONNECTIONS,
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if n >= 1 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "TASKFLOW_DB_MAX_CONNECTIONS",
                        reason: format!("expected a positive integer, got {raw:?}"),
                    });
                }
            },
        };

        let static_dir = PathBuf::from(
            lookup("TASKFLOW_STATIC_DIR").unwrap_or_else(|| DEFAULT_STATIC_DIR.to_string()),
        );

        let tokens = match lookup("TASKFLOW_TOKENS") {
            Some(raw) => parse_tokens(&raw)?,
            None => HashMap::new(),
        };

        Ok(Config {
            addr,
            database_url,
            max_connections,
            static_dir,
            tokens,
        })
    }
}

// "tokenA=<uuid>,tokenB=<uuid>@<rfc3339 expiry>"
fn parse_tokens(raw: &str) -> Result<HashMap<String, TokenGrant>, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        var: "TASKFLOW_TOKENS",
        reason,
    };

    let mut tokens = HashMap::new();
    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((token, user)) = pair.split_once('=') else {
            return Err(invalid(format!("expected token=user_id, got {pair:?}")));
        };
        let token = token.trim();
        if token.is_empty() {
            return Err(invalid("empty token".to_string()));
        }
        let (user, expires_at) = match user.split_once('@') {
            Some((user, expiry)) => {
                let expires_at = DateTime::parse_from_rfc3339(expiry.trim())
                    .map_err(|e| invalid(format!("bad expiry for a token: {e}")))?;
                (user, Some(expires_at.with_timezone(&Utc)))
            }
            None => (user, None),
        };
        let user_id = Uuid::parse_str(user.trim())
            .map_err(|e| invalid(format!("bad user id for a token: {e}")))?;
        tokens.insert(token.to_string(), TokenGrant { user_id, expires_at });
    }
    Ok(tokens)
}
