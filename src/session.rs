//! Principal resolution
//!
//! Authentication happens upstream (identity provider / auth proxy). The
//! proxy forwards the authenticated user id in a trusted header; this module
//! only reads it back.

use std::convert::Infallible;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::InvalidHeaderName, request::Parts, HeaderMap, HeaderName},
};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

/// Authenticated user id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(String);

impl PrincipalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reads the principal id from the configured request header
#[derive(Debug, Clone)]
pub struct SessionResolver {
    header: HeaderName,
}

impl SessionResolver {
    pub fn new(header: &str) -> Result<Self, InvalidHeaderName> {
        Ok(Self {
            header: HeaderName::from_bytes(header.trim().to_ascii_lowercase().as_bytes())?,
        })
    }

    /// Principal for a request, if any
    pub fn resolve(&self, headers: &HeaderMap) -> Option<PrincipalId> {
        headers
            .get(&self.header)?
            .to_str()
            .ok()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(PrincipalId::new)
    }
}

/// Principal of the current request, absent when unauthenticated
pub struct MaybePrincipal(pub Option<PrincipalId>);

#[async_trait]
impl FromRequestParts<AppState> for MaybePrincipal {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(MaybePrincipal(state.sessions().resolve(&parts.headers)))
    }
}

/// Principal of the current request; rejects with 401 when absent
pub struct Principal(pub PrincipalId);

#[async_trait]
impl FromRequestParts<AppState> for Principal {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        state
            .sessions()
            .resolve(&parts.headers)
            .map(Principal)
            .ok_or_else(|| AppError::Unauthorized("Not signed in".to_string()))
    }
}
