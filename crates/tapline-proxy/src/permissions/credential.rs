//! Scope extraction from bearer credentials.
//!
//! Only the JWT payload is read; signatures are never checked.

use super::types::PermissionType;
use crate::exchange::Headers;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::Deserialize;
use std::collections::BTreeSet;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("token is not a JWT")]
    NotJwt,
    #[error("token payload is not valid base64url: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("token payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Scopes a request presented, and whether they were delegated or application roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentedCredential {
    pub permission_type: PermissionType,
    pub scopes: BTreeSet<String>,
}

#[derive(Deserialize)]
struct Claims {
    #[serde(default)]
    scp: Option<String>,
    #[serde(default)]
    roles: Option<Vec<String>>,
}

/// Token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &Headers) -> Option<&str> {
    let value = headers.get("authorization")?.trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Decode the scopes carried by a JWT.
///
/// A non-empty `roles` claim makes the credential an application one;
/// otherwise the space-separated `scp` claim gives delegated scopes.
pub fn decode_credential(token: &str) -> Result<PresentedCredential, CredentialError> {
    let mut parts = token.split('.');
    let payload = match (parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(payload), Some(_)) => payload,
        _ => return Err(CredentialError::NotJwt),
    };
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
    let claims: Claims = serde_json::from_slice(&bytes)?;

    if let Some(roles) = claims.roles.filter(|r| !r.is_empty()) {
        return Ok(PresentedCredential {
            permission_type: PermissionType::Application,
            scopes: roles.into_iter().collect(),
        });
    }
    Ok(PresentedCredential {
        permission_type: PermissionType::Delegated,
        scopes: claims
            .scp
            .unwrap_or_default()
            .split_whitespace()
            .map(str::to_string)
            .collect(),
    })
}

#[cfg(test)]
pub(crate) fn test_token(claims: serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.sig")
}
