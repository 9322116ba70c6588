// ABOUTME: Cryptographic helpers: password hashing and short-code generation
// ABOUTME: bcrypt for credentials, OS randomness for codes and throwaway secrets
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

/// Password hashing and verification-code generation
pub mod passwords;

pub use passwords::{
    generate_throwaway_password, generate_verification_code, hash_password, verify_password,
};
