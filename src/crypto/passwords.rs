// ABOUTME: bcrypt password hashing plus random codes for email verification
// ABOUTME: Federated accounts get a hashed 32-char throwaway so password login stays closed
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use crate::errors::{AppError, AppResult};
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;

/// Hash a password with bcrypt at the default cost
///
/// # Errors
///
/// Returns an error if hashing fails.
pub fn hash_password(password: &str) -> AppResult<String> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| AppError::internal(format!("password hashing failed: {e}")))
}

/// Verify a password against a stored hash. A missing hash (federated
/// account) never verifies; comparison is constant-time inside bcrypt.
#[must_use]
pub fn verify_password(password: &str, stored_hash: Option<&str>) -> bool {
    match stored_hash {
        Some(hash) => bcrypt::verify(password, hash).unwrap_or(false),
        None => false,
    }
}

/// 32-character random password hashed into federated accounts so they can
/// never be logged into with a password
#[must_use]
pub fn generate_throwaway_password() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Decimal verification code of the given length from a CSPRNG
#[must_use]
pub fn generate_verification_code(length: usize) -> String {
    let mut rng = OsRng;
    (0..length)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}
