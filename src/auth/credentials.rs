//! # Credential Extraction
//!
//! Pulls a bearer token out of the inbound `Authorization` header. The gateway never
//! validates tokens itself; the auth backend does that when a protected request arrives.

use axum::http::{header, HeaderMap};
use thiserror::Error;

use crate::core::types::Credential;

const BEARER_SCHEME: &str = "bearer";

/// Why no credential could be extracted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MissingCredential {
    #[error("authorization header is absent")]
    Absent,

    #[error("authorization header is not valid visible ASCII")]
    NotAscii,

    #[error("authorization scheme is not bearer")]
    WrongScheme,

    #[error("bearer token is empty")]
    EmptyToken,
}

/// Extract the bearer credential from request headers
///
/// The scheme is matched case-insensitively, the token is returned verbatim.
pub fn extract(headers: &HeaderMap) -> Result<Credential, MissingCredential> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(MissingCredential::Absent)?
        .to_str()
        .map_err(|_| MissingCredential::NotAscii)?;

    let (scheme, token) = value
        .trim_start()
        .split_once(' ')
        .ok_or(MissingCredential::WrongScheme)?;

    if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
        return Err(MissingCredential::WrongScheme);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(MissingCredential::EmptyToken);
    }

    Ok(Credential::new(token))
}
