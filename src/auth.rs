// ABOUTME: RS256 token codec minting and validating access and refresh tokens
// ABOUTME: One RSA keypair per deployment; relying apps verify offline with the public key
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Token Codec
//!
//! Both token kinds are RS256-signed JWTs carrying the same claim shape; the
//! `token_type` claim tells them apart and a mint/parse kind mismatch is always
//! rejected. The `app_id` claim carries the application's stable `app_key`
//! string, never the numeric database id — it is the only field a resource
//! server can see.
//!
//! The expired case is split out of the generic invalid case because the
//! refresh and logout paths treat it differently: an expired access token is
//! still good enough to identify the device being logged out
//! ([`TokenCodec::parse_ignoring_expiry`]), and an expired refresh token gets a
//! distinct user-facing message.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// The two token kinds minted by the SSO
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Short-lived bearer credential checked by resource servers
    Access,
    /// Long-lived rotation credential redeemed at the token endpoint
    Refresh,
}

impl TokenKind {
    /// Value of the `token_type` claim
    #[must_use]
    pub const fn claim_value(self) -> &'static str {
        match self {
            Self::Access => "access_token",
            Self::Refresh => "refresh_token",
        }
    }
}

/// Token validation failure, distinguishable by the caller
#[derive(Debug, Clone, Error)]
pub enum TokenValidationError {
    /// Signature valid but the token is past `exp`
    #[error("token expired")]
    Expired,
    /// Signature, algorithm, issuer or `token_type` rejected
    #[error("token invalid: {reason}")]
    Invalid {
        /// What was rejected
        reason: String,
    },
    /// Not a parsable JWT at all
    #[error("token malformed: {details}")]
    Malformed {
        /// What failed to parse
        details: String,
    },
}

impl TokenValidationError {
    fn from_jwt_error(e: &jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::Invalid {
                reason: "signature verification failed".to_owned(),
            },
            ErrorKind::InvalidIssuer => Self::Invalid {
                reason: "unknown issuer".to_owned(),
            },
            ErrorKind::InvalidAlgorithm => Self::Invalid {
                reason: "unexpected signing algorithm".to_owned(),
            },
            ErrorKind::InvalidToken => Self::Malformed {
                details: "token format is invalid".to_owned(),
            },
            ErrorKind::Base64(err) => Self::Malformed {
                details: format!("invalid base64: {err}"),
            },
            ErrorKind::Json(err) => Self::Malformed {
                details: format!("invalid JSON payload: {err}"),
            },
            ErrorKind::Utf8(err) => Self::Malformed {
                details: format!("invalid UTF-8: {err}"),
            },
            _ => Self::Invalid {
                reason: format!("validation failed: {e}"),
            },
        }
    }
}

/// Claims carried by both token kinds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject user (v4)
    pub user_uuid: Uuid,
    /// `app_key` string of the audience application, never the numeric id
    pub app_id: String,
    /// Device the token is bound to
    pub device_id: String,
    /// `access_token` or `refresh_token`
    pub token_type: String,
    /// Configured issuer
    pub iss: String,
    /// Issued-at, seconds since epoch
    pub iat: i64,
    /// Not-before, seconds since epoch
    pub nbf: i64,
    /// Expiry, seconds since epoch
    pub exp: i64,
}

/// Mints and validates both token kinds with one RSA keypair
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenCodec {
    /// Build a codec from PEM-encoded RSA keys
    ///
    /// # Errors
    ///
    /// Returns an error if either PEM blob does not contain a usable RSA key.
    pub fn from_pem(
        private_pem: &[u8],
        public_pem: &[u8],
        issuer: impl Into<String>,
        access_ttl_secs: i64,
        refresh_ttl_secs: i64,
    ) -> anyhow::Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(private_pem)?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem)?;
        Ok(Self {
            encoding_key,
            decoding_key,
            issuer: issuer.into(),
            access_ttl: Duration::seconds(access_ttl_secs),
            refresh_ttl: Duration::seconds(refresh_ttl_secs),
        })
    }

    /// Access-token lifetime in seconds, the `expires_in` of token responses
    #[must_use]
    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    /// Refresh-token lifetime in seconds, also the TTL of the revocation handle
    #[must_use]
    pub fn refresh_ttl_secs(&self) -> i64 {
        self.refresh_ttl.num_seconds()
    }

    /// Mint a token of the given kind with the configured TTL
    ///
    /// # Errors
    ///
    /// Returns an error if JWT encoding fails.
    pub fn mint(
        &self,
        kind: TokenKind,
        user_uuid: Uuid,
        app_key: &str,
        device_id: &str,
    ) -> Result<String, TokenValidationError> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        self.mint_with_ttl(kind, user_uuid, app_key, device_id, ttl)
    }

    /// Mint with an explicit TTL (used by tests exercising expiry boundaries)
    ///
    /// # Errors
    ///
    /// Returns an error if JWT encoding fails.
    pub fn mint_with_ttl(
        &self,
        kind: TokenKind,
        user_uuid: Uuid,
        app_key: &str,
        device_id: &str,
        ttl: Duration,
    ) -> Result<String, TokenValidationError> {
        let now = Utc::now();
        let claims = Claims {
            user_uuid,
            app_id: app_key.to_owned(),
            device_id: device_id.to_owned(),
            token_type: kind.claim_value().to_owned(),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key).map_err(|e| {
            TokenValidationError::Invalid {
                reason: format!("encoding failed: {e}"),
            }
        })
    }

    /// Parse and fully validate a token of the given kind
    ///
    /// Rejects wrong algorithms, unknown issuers, expired tokens and
    /// `token_type` mismatches, each distinguishable through
    /// [`TokenValidationError`].
    ///
    /// # Errors
    ///
    /// Returns [`TokenValidationError`] describing the rejection.
    pub fn parse(&self, kind: TokenKind, token: &str) -> Result<Claims, TokenValidationError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.issuer]);
        validation.validate_nbf = true;
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| TokenValidationError::from_jwt_error(&e))?;

        Self::check_kind(kind, data.claims)
    }

    /// Parse with signature verification but without expiry validation
    ///
    /// Used only on the logout path so a just-expired access token still
    /// yields the user and device needed to revoke the refresh side.
    ///
    /// # Errors
    ///
    /// Returns [`TokenValidationError`] for anything other than expiry.
    pub fn parse_ignoring_expiry(
        &self,
        kind: TokenKind,
        token: &str,
    ) -> Result<Claims, TokenValidationError> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.set_required_spec_claims::<&str>(&[]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| TokenValidationError::from_jwt_error(&e))?;

        Self::check_kind(kind, data.claims)
    }

    fn check_kind(kind: TokenKind, claims: Claims) -> Result<Claims, TokenValidationError> {
        if claims.token_type == kind.claim_value() {
            Ok(claims)
        } else {
            Err(TokenValidationError::Invalid {
                reason: format!(
                    "token_type mismatch: expected {}, got {}",
                    kind.claim_value(),
                    claims.token_type
                ),
            })
        }
    }
}
