//! Login and password policy, and bcrypt hashing.

use thiserror::Error;

pub const MIN_LOGIN_LENGTH: usize = 8;
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// bcrypt ignores input past 72 bytes.
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Why a login or password was rejected. The message is shown to the client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyViolation {
    #[error("login must be at least {} characters long", MIN_LOGIN_LENGTH)]
    LoginTooShort,
    #[error("login must contain only latin letters and digits")]
    LoginCharacters,
    #[error("password must be at least {} characters long", MIN_PASSWORD_LENGTH)]
    PasswordTooShort,
    #[error("password must be at most {} bytes long", MAX_PASSWORD_BYTES)]
    PasswordTooLong,
    #[error("password must not contain cyrillic characters")]
    DisallowedScript,
    #[error("password must contain at least 2 letters in different case")]
    MissingCase,
    #[error("password must contain at least 1 digit")]
    MissingDigit,
    #[error("password must contain at least 1 special character")]
    MissingSpecial,
}

/// Failures of the bcrypt primitives themselves.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PasswordError {
    #[error("password hashing failed: {0}")]
    HashingError(String),
}

pub fn validate_login(login: &str) -> Result<(), PolicyViolation> {
    if login.chars().count() < MIN_LOGIN_LENGTH {
        return Err(PolicyViolation::LoginTooShort);
    }
    if !login.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(PolicyViolation::LoginCharacters);
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), PolicyViolation> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(PolicyViolation::PasswordTooShort);
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(PolicyViolation::PasswordTooLong);
    }

    let mut has_upper = false;
    let mut has_lower = false;
    let mut has_digit = false;
    let mut has_special = false;

    for c in password.chars() {
        if is_cyrillic(c) {
            return Err(PolicyViolation::DisallowedScript);
        }

        if c.is_uppercase() {
            has_upper = true;
        } else if c.is_lowercase() {
            has_lower = true;
        } else if c.is_numeric() {
            has_digit = true;
        } else if !c.is_alphanumeric() && !c.is_whitespace() && !c.is_control() {
            has_special = true;
        }
    }

    if !has_upper || !has_lower {
        return Err(PolicyViolation::MissingCase);
    }
    if !has_digit {
        return Err(PolicyViolation::MissingDigit);
    }
    if !has_special {
        return Err(PolicyViolation::MissingSpecial);
    }
    Ok(())
}

/// Cyrillic, Cyrillic Supplement and the Extended-A/B/C blocks.
fn is_cyrillic(c: char) -> bool {
    matches!(
        c,
        '\u{0400}'..='\u{052F}'
            | '\u{1C80}'..='\u{1C8F}'
            | '\u{2DE0}'..='\u{2DFF}'
            | '\u{A640}'..='\u{A69F}'
    )
}

/// Hashes a password with bcrypt on the blocking pool.
///
/// Returns `PasswordError::HashingError` if bcrypt rejects the input or cost.
pub async fn hash_password(password: &str, cost: u32) -> Result<String, PasswordError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || {
        bcrypt::hash(password, cost).map_err(|e| PasswordError::HashingError(e.to_string()))
    })
    .await
    .map_err(|e| PasswordError::HashingError(format!("task join error: {}", e)))?
}

/// Checks a password against a bcrypt hash on the blocking pool.
///
/// A malformed hash counts as a mismatch.
pub async fn verify_password(password: &str, hash: &str) -> bool {
    let password = password.to_string();
    let hash = hash.to_string();
    match tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await {
        Ok(Ok(matches)) => matches,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Stored password hash is unreadable");
            false
        }
        Err(e) => {
            tracing::error!(error = %e, "Password verification task failed");
            false
        }
    }
}
