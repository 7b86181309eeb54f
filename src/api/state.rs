//! Shared application state handed to handlers through `Extension`.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::{
    session::{CookieConfig, MemorySessions},
    users::UserDirectory,
};
use crate::gate::{Clock, Gate, SystemClock};

pub struct AppState {
    gate: Gate,
    sessions: MemorySessions,
    directory: UserDirectory,
    cookie: CookieConfig,
    clock: Arc<dyn Clock>,
}

impl AppState {
    #[must_use]
    pub fn new(gate: Gate, directory: UserDirectory, cookie: CookieConfig) -> Self {
        Self {
            gate,
            sessions: MemorySessions::new(cookie.ttl_seconds()),
            directory,
            cookie,
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    #[must_use]
    pub fn sessions(&self) -> &MemorySessions {
        &self.sessions
    }

    #[must_use]
    pub fn directory(&self) -> &UserDirectory {
        &self.directory
    }

    #[must_use]
    pub fn cookie(&self) -> CookieConfig {
        self.cookie
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}
