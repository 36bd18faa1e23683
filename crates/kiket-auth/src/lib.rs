//! # Kiket Auth - Inbound Webhook Authentication
//!
//! Authentication for webhooks delivered by the Kiket extension platform.
//! Two alternative strategies are supported:
//!
//! - **Request signing** - `X-Kiket-Signature` carries a lowercase hex
//!   HMAC-SHA256 over `"{timestamp}.{body}"`, keyed by the shared webhook secret.
//!   Requests outside a 300 second window are rejected as replays.
//! - **Runtime tokens** - the payload carries an ES256 JWT at
//!   `authentication.runtime_token`, verified against the platform's JWKS.
//!
//! ## Architecture
//!
//! - [`signature`] - HMAC signing and verification
//! - [`jwt`] - Runtime token claims, JWKS cache and token verifier
//! - [`context`] - [`AuthContext`] handed to webhook handlers
//! - [`strategy`] - [`Authenticator`], the configured strategy behind one `authenticate` call
//! - [`error`] - [`AuthError`] taxonomy
//!
//! ## Quick Start
//!
//! ```rust
//! use http::HeaderMap;
//! use kiket_auth::signature::{generate_signature, verify_signature, SIGNATURE_HEADER, TIMESTAMP_HEADER};
//!
//! let body = br#"{"issue":{"id":42}}"#;
//! let (signature, timestamp) = generate_signature("whsec", body, None);
//!
//! let mut headers = HeaderMap::new();
//! headers.insert(SIGNATURE_HEADER, signature.parse().unwrap());
//! headers.insert(TIMESTAMP_HEADER, timestamp.parse().unwrap());
//!
//! verify_signature(Some("whsec"), body, &headers).unwrap();
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod context;
pub mod error;
pub mod jwt;
pub mod signature;
pub mod strategy;

#[doc(inline)]
pub use context::{AuthContext, RUNTIME_TOKEN_TYPE, build_auth_context};
#[doc(inline)]
pub use error::{AuthError, AuthResult};
#[doc(inline)]
pub use jwt::{JwksCache, JwtClaims, TokenVerifier, TRUSTED_ISSUER};
#[doc(inline)]
pub use strategy::{AuthOutcome, Authenticator};
