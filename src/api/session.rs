//! Cookie sessions backed by an in-memory store.
//!
//! The raw token only ever travels in the cookie (or a bearer header); the
//! store is keyed by its SHA-256. A request works on a `SessionData`
//! snapshot and hands back the list of keys it changed, which the store
//! applies one key at a time so concurrent requests on the same session only
//! overwrite what they actually wrote.

use anyhow::{Context, Result};
use axum::http::{
    header::{InvalidHeaderValue, AUTHORIZATION, COOKIE},
    HeaderMap, HeaderValue,
};
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::gate::{SessionError, SessionStore};

pub const SESSION_COOKIE_NAME: &str = "sudo_gate_session";
pub const DEFAULT_SESSION_TTL_SECONDS: i64 = 12 * 60 * 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CookieConfig {
    ttl_seconds: i64,
    secure: bool,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            secure: false,
        }
    }
}

impl CookieConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_ttl_seconds(mut self, seconds: i64) -> Self {
        self.ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    #[must_use]
    pub fn ttl_seconds(&self) -> i64 {
        self.ttl_seconds
    }

    #[must_use]
    pub fn secure(&self) -> bool {
        self.secure
    }
}

/// Create a new session token for the cookie.
///
/// # Errors
/// Returns an error if the OS random source fails.
pub fn generate_session_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session token")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

#[must_use]
pub fn hash_session_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Build the `HttpOnly` session cookie.
///
/// # Errors
/// Returns an error if the token contains characters not allowed in a header.
pub fn session_cookie(config: CookieConfig, token: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = config.ttl_seconds();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if config.secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// # Errors
/// Never in practice; the value is built from constants.
pub fn clear_session_cookie(config: CookieConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if config.secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Bearer token first, then the session cookie.
#[must_use]
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    let value = headers.get(COOKIE)?.to_str().ok()?;
    value.split(';').find_map(|pair| {
        let (key, val) = pair.trim().split_once('=')?;
        (key.trim() == SESSION_COOKIE_NAME && !val.trim().is_empty())
            .then(|| val.trim().to_string())
    })
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Change {
    Set(String, Value),
    Forget(String),
}

/// Per-request view of one session.
#[derive(Clone, Debug, Default)]
pub struct SessionData {
    token_hash: Option<Vec<u8>>,
    values: HashMap<String, Value>,
    changes: Vec<Change>,
}

impl SessionData {
    /// A request without a (known) session: reads see nothing and writes
    /// are dropped on commit.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.token_hash.is_none()
    }

    #[must_use]
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.changes.is_empty()
    }
}

impl SessionStore for SessionData {
    fn get(&self, key: &str) -> Result<Option<Value>, SessionError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), SessionError> {
        self.values.insert(key.to_string(), value.clone());
        self.changes.push(Change::Set(key.to_string(), value));
        Ok(())
    }

    fn forget(&mut self, key: &str) -> Result<(), SessionError> {
        self.values.remove(key);
        self.changes.push(Change::Forget(key.to_string()));
        Ok(())
    }
}

#[derive(Debug)]
struct SessionEntry {
    values: HashMap<String, Value>,
    expires_at: DateTime<Utc>,
}

/// Process-local session store. Entries expire `ttl_seconds` after creation
/// and are pruned whenever a session is created or committed.
#[derive(Debug)]
pub struct MemorySessions {
    ttl_seconds: i64,
    entries: Mutex<HashMap<Vec<u8>, SessionEntry>>,
}

impl MemorySessions {
    #[must_use]
    pub fn new(ttl_seconds: i64) -> Self {
        Self {
            ttl_seconds,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Store a new session and return its raw token.
    ///
    /// # Errors
    /// Returns an error if a token cannot be generated.
    pub async fn create(&self, values: HashMap<String, Value>, now: DateTime<Utc>) -> Result<String> {
        let token = generate_session_token()?;
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            hash_session_token(&token),
            SessionEntry {
                values,
                expires_at: now + Duration::seconds(self.ttl_seconds),
            },
        );
        debug!(sessions = entries.len(), "Session created");
        Ok(token)
    }

    /// Snapshot of the session for `token_hash`, if it exists and is live.
    pub async fn load(&self, token_hash: &[u8], now: DateTime<Utc>) -> Option<SessionData> {
        let entries = self.entries.lock().await;
        let entry = entries
            .get(token_hash)
            .filter(|entry| entry.expires_at > now)?;
        Some(SessionData {
            token_hash: Some(token_hash.to_vec()),
            values: entry.values.clone(),
            changes: Vec::new(),
        })
    }

    /// Resolve request headers to a session, or an anonymous one.
    pub async fn from_headers(&self, headers: &HeaderMap, now: DateTime<Utc>) -> SessionData {
        let Some(token) = extract_session_token(headers) else {
            return SessionData::anonymous();
        };
        self.load(&hash_session_token(&token), now)
            .await
            .unwrap_or_else(SessionData::anonymous)
    }

    /// Apply the keys `session` changed. A session destroyed or expired in
    /// the meantime stays gone.
    pub async fn commit(&self, session: SessionData, now: DateTime<Utc>) {
        let Some(token_hash) = session.token_hash else {
            return;
        };
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| entry.expires_at > now);
        if session.changes.is_empty() {
            return;
        }
        let Some(entry) = entries.get_mut(&token_hash) else {
            debug!("Dropping changes for a session that no longer exists");
            return;
        };
        for change in session.changes {
            match change {
                Change::Set(key, value) => {
                    entry.values.insert(key, value);
                }
                Change::Forget(key) => {
                    entry.values.remove(&key);
                }
            }
        }
    }

    /// Returns whether a session was removed.
    pub async fn destroy(&self, token_hash: &[u8]) -> bool {
        self.entries.lock().await.remove(token_hash).is_some()
    }
}
