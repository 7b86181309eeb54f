//! Gate state persisted in the session.
//!
//! Two keys make up the state: `sudo_last_time` holds the last successful
//! verification as a UTC `Y-m-d H:M:S` string and `sudo_active` holds the
//! "passed" flag. Both are part of the contract with the challenge surface
//! and must not be renamed on their own.
//!
//! Expiry is lazy: nothing runs in the background, the gate resets
//! `sudo_active` the next time it evaluates stale state.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::warn;

use super::error::SessionError;

pub const LAST_VERIFIED_KEY: &str = "sudo_last_time";
pub const ACTIVE_KEY: &str = "sudo_active";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Opaque per-session key/value store.
///
/// Implementations decide durability and serialization between requests;
/// the gate assumes no transactions, only that each call is applied.
pub trait SessionStore {
    /// # Errors
    /// Returns `SessionError` if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<Value>, SessionError>;

    /// # Errors
    /// Returns `SessionError` if the backend cannot be written.
    fn set(&mut self, key: &str, value: Value) -> Result<(), SessionError>;

    /// # Errors
    /// Returns `SessionError` if the backend cannot be written.
    fn forget(&mut self, key: &str) -> Result<(), SessionError>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GateState {
    pub last_verified_at: Option<DateTime<Utc>>,
    pub active: bool,
}

impl GateState {
    /// Read the state from the session. Absent keys mean "never verified".
    ///
    /// # Errors
    /// Returns `SessionError` if the store cannot be read.
    pub fn load<S: SessionStore + ?Sized>(session: &S) -> Result<Self, SessionError> {
        let last_verified_at = match session.get(LAST_VERIFIED_KEY)? {
            Some(Value::String(raw)) if !raw.is_empty() => {
                let parsed = parse_timestamp(&raw);
                if parsed.is_none() {
                    warn!("Ignoring malformed {LAST_VERIFIED_KEY} value: {raw:?}");
                }
                parsed
            }
            Some(Value::Null | Value::String(_)) | None => None,
            Some(other) => {
                warn!("Ignoring non-string {LAST_VERIFIED_KEY} value: {other}");
                None
            }
        };

        let active = matches!(session.get(ACTIVE_KEY)?, Some(Value::Bool(true)));

        Ok(Self {
            last_verified_at,
            active,
        })
    }

    /// Whether the last verification happened no more than `duration_seconds` ago.
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>, duration_seconds: i64) -> bool {
        self.last_verified_at
            .is_some_and(|at| now.signed_duration_since(at).num_seconds() <= duration_seconds)
    }

    /// Active and fresh: the only state in which requests pass unchallenged.
    #[must_use]
    pub fn is_satisfied(&self, now: DateTime<Utc>, duration_seconds: i64) -> bool {
        self.active && self.is_fresh(now, duration_seconds)
    }
}

/// Read-only status check; never resets stale state.
///
/// # Errors
/// Returns `SessionError` if the store cannot be read.
pub fn is_sudo_mode_active<S: SessionStore + ?Sized>(
    session: &S,
    now: DateTime<Utc>,
    duration_seconds: i64,
) -> Result<bool, SessionError> {
    Ok(GateState::load(session)?.is_satisfied(now, duration_seconds))
}

/// Drop out of sudo mode. Idempotent.
///
/// # Errors
/// Returns `SessionError` if the store cannot be written.
pub fn exit<S: SessionStore + ?Sized>(session: &mut S) -> Result<(), SessionError> {
    session.forget(ACTIVE_KEY)?;
    session.forget(LAST_VERIFIED_KEY)
}

pub(crate) fn mark_inactive<S: SessionStore + ?Sized>(session: &mut S) -> Result<(), SessionError> {
    session.set(ACTIVE_KEY, Value::Bool(false))
}

pub(crate) fn mark_verified<S: SessionStore + ?Sized>(
    session: &mut S,
    now: DateTime<Utc>,
) -> Result<(), SessionError> {
    session.set(LAST_VERIFIED_KEY, Value::String(format_timestamp(now)))?;
    session.set(ACTIVE_KEY, Value::Bool(true))
}

#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}
