//! File-backed user directory and the session-bound identity provider.
//!
//! Users come from a JSON array:
//!
//! ```json
//! [{"id": "u1", "email": "ana@example.com", "username": "ana", "name": "Ana",
//!   "password_hash": "$argon2id$v=19$...", "can_masquerade": true}]
//! ```
//!
//! Password hashes are argon2 PHC strings (`sudo-gate hash-password`).

use anyhow::{anyhow, bail, Context, Result};
use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use std::{collections::BTreeMap, path::Path};
use tracing::{debug, warn};

use super::session::SessionData;
use crate::gate::{
    Credentials, IdentityError, IdentityProvider, Masqueradable, Principal, SessionError,
    SessionStore,
};

/// Session key holding the id of the active user.
pub const AUTH_USER_KEY: &str = "auth_user_id";
/// Session key holding the id of the real user while masquerading.
pub const MASQUERADE_REAL_KEY: &str = "masquerade_real_id";

#[derive(Clone, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub name: String,
    pub password_hash: String,
    #[serde(default)]
    pub can_masquerade: bool,
}

impl std::fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserRecord")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// A signed-in user, possibly acting as someone else.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub email: String,
    pub username: String,
    pub name: String,
    pub can_masquerade: bool,
    impersonator: Option<Box<User>>,
}

impl User {
    fn from_record(record: &UserRecord) -> Self {
        Self {
            id: record.id.clone(),
            email: record.email.clone(),
            username: record.username.clone(),
            name: record.name.clone(),
            can_masquerade: record.can_masquerade,
            impersonator: None,
        }
    }

    /// `self` as seen while `real` masquerades as it.
    #[must_use]
    pub fn impersonated_by(mut self, real: User) -> Self {
        self.impersonator = Some(Box::new(real));
        self
    }

    #[must_use]
    pub fn impersonator(&self) -> Option<&User> {
        self.impersonator.as_deref()
    }
}

impl Principal for User {
    fn attribute(&self, name: &str) -> Option<String> {
        match name {
            "id" => Some(self.id.clone()),
            "email" => Some(self.email.clone()),
            "username" => Some(self.username.clone()),
            "name" => Some(self.name.clone()),
            _ => None,
        }
    }

    fn as_masqueradable(&self) -> Option<&dyn Masqueradable<Self>> {
        Some(self)
    }
}

impl Masqueradable<User> for User {
    fn is_masquerading(&self) -> bool {
        self.impersonator.is_some()
    }

    fn masquerading_principal(&self) -> Option<User> {
        self.impersonator.as_deref().cloned()
    }
}

#[derive(Debug)]
pub struct UserDirectory {
    records: BTreeMap<String, UserRecord>,
    // Checked against when the subject is unknown, so a miss costs one
    // argon2 verification like a wrong password does.
    dummy_hash: String,
}

impl UserDirectory {
    /// Build a directory, rejecting duplicate ids and unparsable hashes.
    ///
    /// # Errors
    /// Returns an error describing the first invalid record.
    pub fn from_records(records: Vec<UserRecord>) -> Result<Self> {
        let mut directory = BTreeMap::new();
        for record in records {
            PasswordHash::new(&record.password_hash)
                .map_err(|err| anyhow!("user {} has an invalid password_hash: {err}", record.id))?;
            if directory.contains_key(&record.id) {
                bail!("duplicate user id {}", record.id);
            }
            directory.insert(record.id.clone(), record);
        }
        let dummy_hash = dummy_hash(directory.values().next())?;
        Ok(Self {
            records: directory,
            dummy_hash,
        })
    }

    /// # Errors
    /// Returns an error if the JSON is not an array of valid user records.
    pub fn from_json(raw: &str) -> Result<Self> {
        let records: Vec<UserRecord> =
            serde_json::from_str(raw).context("users file must be a JSON array of users")?;
        Self::from_records(records)
    }

    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_json(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read users file at {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("Invalid users file {}", path.display()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<User> {
        self.records.get(id).map(User::from_record)
    }

    fn find_by_attribute(&self, attribute: &str, value: &str) -> Option<&UserRecord> {
        self.records.values().find(|record| {
            User::from_record(record).attribute(attribute).as_deref() == Some(value)
        })
    }

    /// Look up a user by `attribute` and check the password.
    ///
    /// Unknown users and wrong passwords are both `Ok(None)`.
    ///
    /// # Errors
    /// Returns `IdentityError::MalformedCredential` if the stored hash cannot be used.
    pub fn authenticate(
        &self,
        attribute: &str,
        username: &str,
        password: &SecretString,
    ) -> Result<Option<User>, IdentityError> {
        let Some(record) = self.find_by_attribute(attribute, username) else {
            debug!("No user matches the submitted {attribute}");
            check_password(&self.dummy_hash, password).map_err(|err| {
                IdentityError::MalformedCredential(format!("unknown-user hash: {err}"))
            })?;
            return Ok(None);
        };

        match check_password(&record.password_hash, password) {
            Ok(true) => Ok(Some(User::from_record(record))),
            Ok(false) => Ok(None),
            Err(err) => Err(IdentityError::MalformedCredential(format!(
                "{}: {err}",
                record.id
            ))),
        }
    }
}

fn check_password(phc: &str, password: &SecretString) -> Result<bool, password_hash::Error> {
    let hash = PasswordHash::new(phc)?;
    match Argon2::default().verify_password(password.expose_secret().as_bytes(), &hash) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(err) => Err(err),
    }
}

/// A throwaway hash with the same cost as the directory's own hashes.
fn dummy_hash(template: Option<&UserRecord>) -> Result<String> {
    let params = template
        .and_then(|record| PasswordHash::new(&record.password_hash).ok())
        .and_then(|hash| Params::try_from(&hash).ok())
        .unwrap_or_default();
    let salt = SaltString::generate(&mut OsRng);
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password(salt.as_str().as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| anyhow!("failed to prepare the unknown-user hash: {err}"))
}

/// Hash a password into an argon2id PHC string.
///
/// # Errors
/// Returns an error if hashing fails.
pub fn hash_password(password: &SecretString) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.expose_secret().as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| anyhow!("failed to hash password: {err}"))
}

/// Identity provider for one request: the active user is read from the
/// session and written back only if it changed.
#[derive(Debug)]
pub struct DirectoryIdentity<'a> {
    directory: &'a UserDirectory,
    initial: Option<User>,
    active: Option<User>,
}

impl<'a> DirectoryIdentity<'a> {
    #[must_use]
    pub fn from_session(directory: &'a UserDirectory, session: &SessionData) -> Self {
        let id_of = |key: &str| match session.value(key) {
            Some(Value::String(id)) => Some(id.as_str()),
            _ => None,
        };

        let active = id_of(AUTH_USER_KEY).and_then(|id| {
            let user = directory.get(id);
            if user.is_none() {
                warn!("Session refers to an unknown user");
            }
            user
        });
        let active = match (active, id_of(MASQUERADE_REAL_KEY).and_then(|id| directory.get(id))) {
            (Some(user), Some(real)) => Some(user.impersonated_by(real)),
            (active, _) => active,
        };

        Self {
            directory,
            initial: active.clone(),
            active,
        }
    }

    /// Write the active user back to the session if it differs from the one
    /// the request started with.
    ///
    /// # Errors
    /// Returns `SessionError` if the session cannot be written.
    pub fn persist<S: SessionStore + ?Sized>(&self, session: &mut S) -> Result<(), SessionError> {
        if self.active == self.initial {
            return Ok(());
        }
        match &self.active {
            Some(user) => {
                session.set(AUTH_USER_KEY, Value::String(user.id.clone()))?;
                match user.impersonator() {
                    Some(real) => session.set(MASQUERADE_REAL_KEY, Value::String(real.id.clone())),
                    None => session.forget(MASQUERADE_REAL_KEY),
                }
            }
            None => {
                session.forget(AUTH_USER_KEY)?;
                session.forget(MASQUERADE_REAL_KEY)
            }
        }
    }
}

impl IdentityProvider for DirectoryIdentity<'_> {
    type User = User;

    fn current_principal(&self) -> Option<User> {
        self.active.clone()
    }

    // A successful check signs the subject in, like a login would.
    fn verify(&mut self, credentials: &Credentials) -> Result<bool, IdentityError> {
        let user = self.directory.authenticate(
            credentials.attribute(),
            credentials.username(),
            credentials.password(),
        )?;
        match user {
            Some(user) => {
                self.active = Some(user);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn set_active_principal(&mut self, principal: User) {
        self.active = Some(principal);
    }
}
