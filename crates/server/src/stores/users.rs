//! Registered users with Argon2 password hashes

use std::collections::HashMap;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use fintrack_domain::constants::MIN_PASSWORD_LENGTH;
use fintrack_domain::{FinTrackError, RegisterRequest, Result, UserSummary};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use tracing::info;

static USERNAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_]{3,30}$").expect("USERNAME_REGEX should compile - this is a bug")
});

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9+_.-]+@[A-Za-z0-9.-]+$").expect("EMAIL_REGEX should compile - this is a bug")
});

/// Stored account. The password is only ever kept as a PHC hash string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
}

impl UserRecord {
    pub fn summary(&self) -> UserSummary {
        UserSummary { id: self.id, username: self.username.clone() }
    }
}

#[derive(Default)]
struct Users {
    next_id: i64,
    by_username: HashMap<String, UserRecord>,
}

/// Account store keyed by username.
///
/// Hashing is CPU-bound; async callers should run [`UserStore::register`]
/// and [`UserStore::authenticate`] on a blocking thread.
pub struct UserStore {
    users: RwLock<Users>,
    hasher: Argon2<'static>,
}

impl UserStore {
    pub fn new() -> Self {
        Self::with_hasher(Argon2::default())
    }

    /// Store using custom Argon2 parameters.
    pub fn with_hasher(hasher: Argon2<'static>) -> Self {
        Self { users: RwLock::new(Users::default()), hasher }
    }

    /// Validate and create an account.
    ///
    /// # Errors
    /// - [`FinTrackError::InvalidInput`] when a field fails validation
    /// - [`FinTrackError::Conflict`] when the username is taken
    pub fn register(&self, request: &RegisterRequest) -> Result<UserSummary> {
        let username = request.username.trim();
        let email = request.email.as_deref().map(str::trim).filter(|email| !email.is_empty());
        validate_registration(username, email, &request.password)?;

        let salt = SaltString::generate(OsRng);
        let password_hash = self
            .hasher
            .hash_password(request.password.as_bytes(), &salt)
            .map_err(|e| FinTrackError::Internal(format!("password hashing failed: {e}")))?
            .to_string();

        let mut users = self.users.write();
        if users.by_username.contains_key(username) {
            info!(username, "Registration rejected: username already exists");
            return Err(FinTrackError::Conflict("Username already exists".into()));
        }

        users.next_id += 1;
        let record = UserRecord {
            id: users.next_id,
            username: username.to_string(),
            email: email.map(str::to_string),
            password_hash,
        };
        let summary = record.summary();
        users.by_username.insert(record.username.clone(), record);

        info!(user_id = summary.id, username, "User registered");
        Ok(summary)
    }

    /// Check a username/password pair.
    pub fn authenticate(&self, username: &str, password: &str) -> Option<UserSummary> {
        let record = self.users.read().by_username.get(username.trim()).cloned()?;
        let parsed = PasswordHash::new(&record.password_hash).ok()?;
        self.hasher
            .verify_password(password.as_bytes(), &parsed)
            .ok()
            .map(|()| record.summary())
    }

    pub fn find(&self, username: &str) -> Option<UserRecord> {
        self.users.read().by_username.get(username).cloned()
    }

    pub fn len(&self) -> usize {
        self.users.read().by_username.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for UserStore {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_registration(username: &str, email: Option<&str>, password: &str) -> Result<()> {
    if username.is_empty() {
        return Err(FinTrackError::InvalidInput("Username is required".into()));
    }
    if !USERNAME_REGEX.is_match(username) {
        return Err(FinTrackError::InvalidInput(
            "Username must be 3-30 characters, containing only letters, numbers, and underscores"
                .into(),
        ));
    }
    if let Some(email) = email {
        if !EMAIL_REGEX.is_match(email) {
            return Err(FinTrackError::InvalidInput("Invalid email format".into()));
        }
    }
    if password.is_empty() {
        return Err(FinTrackError::InvalidInput("Password is required".into()));
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(FinTrackError::InvalidInput(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}
