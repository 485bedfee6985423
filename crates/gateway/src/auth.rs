use std::{collections::HashMap, sync::Arc};

use {
    async_trait::async_trait,
    axum::{
        extract::FromRequestParts,
        http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    },
    tracing::debug,
};

use crate::{error::ApiError, state::AppState};

// ── Resolvers ────────────────────────────────────────────────────────────────

/// Maps a presented API key to the tenant it belongs to.
#[async_trait]
pub trait TenantResolver: Send + Sync {
    /// `Ok(None)` means the key is unknown or revoked.
    async fn resolve(&self, api_key: &str) -> anyhow::Result<Option<String>>;
}

/// Keys listed in the config file, held in memory.
#[derive(Default)]
pub struct StaticKeyResolver {
    keys: Vec<(String, String)>,
}

impl StaticKeyResolver {
    pub fn new(keys: &HashMap<String, String>) -> Self {
        Self {
            keys: keys
                .iter()
                .map(|(k, t)| (k.clone(), t.clone()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[async_trait]
impl TenantResolver for StaticKeyResolver {
    async fn resolve(&self, api_key: &str) -> anyhow::Result<Option<String>> {
        // Compare against every entry so timing does not reveal which matched.
        let mut found = None;
        for (key, tenant) in &self.keys {
            if safe_equal(api_key, key) && found.is_none() {
                found = Some(tenant.clone());
            }
        }
        Ok(found)
    }
}

/// Tries each resolver in order; the first hit wins.
pub struct ChainResolver {
    resolvers: Vec<Arc<dyn TenantResolver>>,
}

impl ChainResolver {
    pub fn new(resolvers: Vec<Arc<dyn TenantResolver>>) -> Self {
        Self { resolvers }
    }
}

#[async_trait]
impl TenantResolver for ChainResolver {
    async fn resolve(&self, api_key: &str) -> anyhow::Result<Option<String>> {
        for resolver in &self.resolvers {
            if let Some(tenant) = resolver.resolve(api_key).await? {
                return Ok(Some(tenant));
            }
        }
        Ok(None)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

/// Constant-time string comparison (prevents timing attacks).
pub(crate) fn safe_equal(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let diff = a
        .as_bytes()
        .iter()
        .zip(b.as_bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y));
    diff == 0
}

/// Extract the token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

// ── Extractor ────────────────────────────────────────────────────────────────

/// The authenticated tenant for a request. Every memory route takes one, so
/// a handler can never act outside the caller's tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant(pub String);

impl FromRequestParts<AppState> for Tenant {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let Some(key) = bearer_token(&parts.headers) else {
            return Err(ApiError::Unauthorized);
        };
        match state.resolver.resolve(key).await {
            Ok(Some(tenant)) => {
                debug!(tenant = %tenant, "authenticated request");
                Ok(Self(tenant))
            },
            Ok(None) => Err(ApiError::Forbidden),
            Err(e) => Err(ApiError::Internal(e.context("tenant lookup failed"))),
        }
    }
}
