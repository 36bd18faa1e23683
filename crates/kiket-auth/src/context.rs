//! Authentication context handed to webhook handlers

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::jwt::{JwtClaims, extract_runtime_token};

/// Token type tag for platform-issued runtime tokens
pub const RUNTIME_TOKEN_TYPE: &str = "runtime";

/// Identity and permissions of the current delivery
///
/// Only ever built from claims that passed [`crate::TokenVerifier`]; handlers
/// receive it read-only for the lifetime of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    /// The raw runtime token, for forwarding to platform APIs
    pub runtime_token: String,
    /// Always [`RUNTIME_TOKEN_TYPE`]
    pub token_type: String,
    /// When the runtime token stops being valid
    pub expires_at: Option<DateTime<Utc>>,
    /// Granted scopes
    pub scopes: Vec<String>,
    /// Organization id
    pub org_id: Option<i64>,
    /// Extension id
    pub ext_id: Option<i64>,
    /// Project id
    pub proj_id: Option<i64>,
}

impl AuthContext {
    /// Whether the delivery was granted `scope`
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    /// Whether the runtime token has expired as of now
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| exp <= Utc::now())
    }
}

/// Derive an [`AuthContext`] from verified claims.
///
/// Pure transform: the token string is re-read from `raw_payload` for
/// pass-through only, it is not validated again.
pub fn build_auth_context(claims: &JwtClaims, raw_payload: &Value) -> AuthContext {
    AuthContext {
        runtime_token: extract_runtime_token(raw_payload).unwrap_or_default().to_string(),
        token_type: RUNTIME_TOKEN_TYPE.to_string(),
        expires_at: Utc.timestamp_opt(claims.exp, 0).single(),
        scopes: claims.scopes.clone(),
        org_id: claims.org_id,
        ext_id: claims.ext_id,
        proj_id: claims.proj_id,
    }
}
