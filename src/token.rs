//! Access token for the print endpoints.
//!
//! A single bearer token is persisted as JSON under the data directory. When
//! no token has been generated the agent runs in [`AuthMode::Open`] and every
//! request is accepted; generating a token switches it to
//! [`AuthMode::Token`].

use chrono::{DateTime, Utc};
use rand::{thread_rng, RngCore};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

use crate::errors::{AuthError, TokenError};

pub const TOKEN_PREFIX: &str = "lpa_";
const TOKEN_BYTES: usize = 24;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub token: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_used: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// No token configured, requests are not checked.
    Open,
    Token,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenStatus {
    pub configured: bool,
    pub mode: AuthMode,
    pub created_at: Option<DateTime<Utc>>,
    pub last_used: Option<DateTime<Utc>>,
}

pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    thread_rng().fill_bytes(&mut bytes);
    format!("{}{}", TOKEN_PREFIX, hex::encode(bytes))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub struct TokenStore {
    path: PathBuf,
    record: Mutex<Option<TokenRecord>>,
}

impl TokenStore {
    /// Opens the store at `path`. A missing file means no token yet.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, TokenError> {
        let path = path.into();
        let record = match std::fs::read_to_string(&path) {
            Ok(raw) => Some(serde_json::from_str::<TokenRecord>(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(source) => {
                return Err(TokenError::Read {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        info!(
            "Token store at {} ({})",
            path.display(),
            if record.is_some() { "token configured" } else { "open mode" }
        );
        Ok(Self {
            path,
            record: Mutex::new(record),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn current(&self) -> std::sync::MutexGuard<'_, Option<TokenRecord>> {
        self.record.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn mode(&self) -> AuthMode {
        if self.current().is_some() {
            AuthMode::Token
        } else {
            AuthMode::Open
        }
    }

    pub fn status(&self) -> TokenStatus {
        let record = self.current();
        TokenStatus {
            configured: record.is_some(),
            mode: if record.is_some() { AuthMode::Token } else { AuthMode::Open },
            created_at: record.as_ref().map(|r| r.created_at),
            last_used: record.as_ref().and_then(|r| r.last_used),
        }
    }

    /// Replaces any existing token with a fresh one and persists it.
    pub fn generate(&self) -> Result<TokenRecord, TokenError> {
        let record = TokenRecord {
            token: generate_token(),
            created_at: Utc::now(),
            last_used: None,
        };
        self.persist(&record)?;
        *self.current() = Some(record.clone());
        info!("Generated new access token");
        Ok(record)
    }

    /// True only when a token is configured and `candidate` matches it.
    pub fn validate(&self, candidate: &str) -> bool {
        self.current()
            .as_ref()
            .is_some_and(|r| constant_time_eq(r.token.as_bytes(), candidate.trim().as_bytes()))
    }

    /// Checks a presented token. Success records the time of use.
    pub fn authorize(&self, presented: Option<&str>) -> Result<(), AuthError> {
        let mut guard = self.current();
        let Some(record) = guard.as_mut() else {
            return Ok(());
        };
        let presented = presented
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::Unauthorized)?;
        if !constant_time_eq(record.token.as_bytes(), presented.as_bytes()) {
            warn!("Rejected request with an invalid token");
            return Err(AuthError::Forbidden);
        }

        record.last_used = Some(Utc::now());
        let snapshot = record.clone();
        drop(guard);
        if let Err(e) = self.persist(&snapshot) {
            warn!("Failed to record token use: {}", e);
        }
        Ok(())
    }

    fn persist(&self, record: &TokenRecord) -> Result<(), TokenError> {
        let write_error = |source| TokenError::Write {
            path: self.path.display().to_string(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(write_error)?;
        }
        let json = serde_json::to_string_pretty(record)?;
        let staging = self.path.with_extension("json.tmp");
        std::fs::write(&staging, json).map_err(write_error)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&staging, std::fs::Permissions::from_mode(0o600))
                .map_err(write_error)?;
        }

        std::fs::rename(&staging, &self.path).map_err(write_error)
    }
}
