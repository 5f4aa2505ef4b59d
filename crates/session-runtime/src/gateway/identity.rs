//! Resolving the optional connect token to a user.
//!
//! The user id is informational. Queue membership is always keyed by the
//! connection id.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

/// Who opened a connection, if known.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Option<String>,
}

impl Identity {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("authentication token required")]
    Missing,

    #[error("unknown authentication token")]
    Unknown,
}

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, token: Option<&str>) -> Result<Identity, IdentityError>;
}

/// Accepts every connection as anonymous.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAnonymous;

#[async_trait]
impl IdentityResolver for AllowAnonymous {
    async fn resolve(&self, _token: Option<&str>) -> Result<Identity, IdentityError> {
        Ok(Identity::anonymous())
    }
}

/// Fixed token table loaded from configuration.
#[derive(Debug, Clone)]
pub struct StaticTokens {
    tokens: HashMap<String, String>,
    required: bool,
}

impl StaticTokens {
    /// With `required`, a missing or unknown token refuses the connection.
    /// Without it, such connections are anonymous.
    pub fn new(tokens: HashMap<String, String>, required: bool) -> Self {
        Self { tokens, required }
    }
}

#[async_trait]
impl IdentityResolver for StaticTokens {
    async fn resolve(&self, token: Option<&str>) -> Result<Identity, IdentityError> {
        match token.map(|t| self.tokens.get(t)) {
            Some(Some(user)) => Ok(Identity::user(user.clone())),
            Some(None) if self.required => Err(IdentityError::Unknown),
            None if self.required => Err(IdentityError::Missing),
            _ => Ok(Identity::anonymous()),
        }
    }
}
