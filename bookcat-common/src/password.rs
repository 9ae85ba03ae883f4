//! Password policy and hashing
//!
//! Hashes are bcrypt so rows carried over from the earlier deployment
//! (`$2y$` prefix) keep verifying.

use crate::Result;

/// Minimum password length in bytes
pub const MIN_PASSWORD_LEN: usize = 12;

/// Check a candidate password against the policy.
///
/// Returns every failed rule's message, in a stable order. An empty list
/// means the password is acceptable.
pub fn policy_errors(password: &str, username: &str) -> Vec<&'static str> {
    let mut errors = Vec::new();
    if password.len() < MIN_PASSWORD_LEN {
        errors.push("Password must be at least 12 characters.");
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        errors.push("Password must include a lowercase letter.");
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        errors.push("Password must include an uppercase letter.");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        errors.push("Password must include a digit.");
    }
    if !password.chars().any(|c| !c.is_ascii_alphanumeric()) {
        errors.push("Password must include a special character.");
    }
    if !username.is_empty() && password.to_lowercase().contains(&username.to_lowercase()) {
        errors.push("Password cannot contain the username.");
    }
    errors
}

/// Hash a password with the default bcrypt cost
pub fn hash_password(password: &str) -> Result<String> {
    Ok(bcrypt::hash(password, bcrypt::DEFAULT_COST)?)
}

/// Verify a password; malformed stored hashes simply fail to verify
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}
