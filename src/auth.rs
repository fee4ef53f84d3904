//! Login and session management.
//!
//! Students log in with their roster email and student id. Administrators
//! log in against the `Login_details` table, whose passwords may be stored in
//! plaintext or as argon2 hashes.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, SystemTime};

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use lazy_static::lazy_static;
use log::{debug, info};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::model::{AdminAccount, Identity, normalize_email};
use crate::roster::Roster;

/// An active login.
#[derive(Debug, Clone)]
struct Session {
    identity: Identity,
    expires_at: SystemTime,
}

lazy_static! {
    static ref SESSIONS: RwLock<HashMap<String, Session>> = RwLock::new(HashMap::new());
}

/// Check a login attempt. Students are matched first, then administrators.
pub fn authenticate(
    roster: &Roster,
    admins: &[AdminAccount],
    email: &str,
    secret: &str,
) -> AppResult<Identity> {
    let email = normalize_email(email);
    let secret = secret.trim();
    if email.is_empty() || secret.is_empty() {
        return Err(AppError::Unauthorized("email and password are required".into()));
    }

    if let Some(student) = roster.get(&email) {
        if student.student_id.trim() == secret {
            info!("student {} logged in", email);
            return Ok(Identity::student(&email));
        }
    }

    let admin = admins.iter().find(|a| a.email == email);
    if admin.is_some_and(|a| password_matches(secret, &a.password)) {
        info!("administrator {} logged in", email);
        return Ok(Identity::admin(&email));
    }

    debug!("rejected login for {}", email);
    Err(AppError::Unauthorized("invalid email or password".into()))
}

/// Compare against a stored password that is either an argon2 PHC string or plaintext.
fn password_matches(secret: &str, stored: &str) -> bool {
    if stored.starts_with("$argon2") {
        verify_password(secret, stored).unwrap_or(false)
    } else {
        stored == secret
    }
}

/// Hash a password with Argon2id and a random salt.
pub fn hash_password(password: &str) -> Result<String, String> {
    let salt = SaltString::generate(&mut OsRng);
    match Argon2::default().hash_password(password.as_bytes(), &salt) {
        Ok(hash) => Ok(hash.to_string()),
        Err(_) => Err("Password hashing failed".to_string()),
    }
}

/// Check `password` against an argon2 hash. Errors only on a malformed hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, String> {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(hash) => hash,
        Err(_) => return Err("Invalid password hash format".to_string()),
    };
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Start a session for `identity`, returning its id. Expired sessions are
/// dropped on the way.
pub fn create_session(identity: Identity, lifetime: Duration) -> String {
    let session_id = Uuid::new_v4().to_string();
    let now = SystemTime::now();
    let session = Session {
        identity,
        expires_at: now + lifetime,
    };

    let mut sessions = SESSIONS.write().unwrap_or_else(PoisonError::into_inner);
    let before = sessions.len();
    sessions.retain(|_, s| s.expires_at > now);
    if sessions.len() < before {
        debug!("dropped {} expired session(s)", before - sessions.len());
    }
    sessions.insert(session_id.clone(), session);
    session_id
}

/// The identity behind a live session.
pub fn validate_session(session_id: &str) -> Option<Identity> {
    let sessions = SESSIONS.read().unwrap_or_else(PoisonError::into_inner);
    sessions
        .get(session_id)
        .filter(|s| s.expires_at > SystemTime::now())
        .map(|s| s.identity.clone())
}

/// Log out. Returns whether the session existed.
pub fn end_session(session_id: &str) -> bool {
    SESSIONS
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(session_id)
        .is_some()
}
