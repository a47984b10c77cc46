//! 认证模块：为批量请求提供访问令牌。
//!
//! Access-token sources.
//!
//! The pipeline needs a bearer token once, at client construction. Token
//! refresh is the caller's concern: build a new client when the token rotates.

use crate::{Error, ErrorContext, Result};
use keyring::Entry;
use std::env;

/// Supplies a bearer token for batch requests.
#[async_trait::async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// A token known up front.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(***)")
    }
}

#[async_trait::async_trait]
impl AccessTokenSource for StaticToken {
    async fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Reads the token from a named environment variable.
#[derive(Debug, Clone)]
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

#[async_trait::async_trait]
impl AccessTokenSource for EnvToken {
    async fn access_token(&self) -> Result<String> {
        env::var(&self.var).map_err(|_| {
            Error::authentication_with_context(
                "access token environment variable is not set",
                ErrorContext::new()
                    .with_field_path(self.var.clone())
                    .with_source("env_token"),
            )
        })
    }
}

/// OS keyring first, then `<ACCOUNT>_ACCESS_TOKEN` from the environment.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    service: String,
    account: String,
}

impl CredentialStore {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    fn env_var(&self) -> String {
        format!(
            "{}_ACCESS_TOKEN",
            self.account.to_uppercase().replace(['-', '.', '@'], "_")
        )
    }

    fn lookup(&self) -> Option<String> {
        // 1. Try Keyring
        if let Ok(entry) = Entry::new(&self.service, &self.account) {
            if let Ok(token) = entry.get_password() {
                return Some(token);
            }
        }

        // 2. Try Environment Variable (ACCOUNT_ACCESS_TOKEN)
        env::var(self.env_var()).ok()
    }
}

#[async_trait::async_trait]
impl AccessTokenSource for CredentialStore {
    async fn access_token(&self) -> Result<String> {
        self.lookup().ok_or_else(|| {
            Error::authentication_with_context(
                "no access token in keyring or environment",
                ErrorContext::new()
                    .with_field_path(self.env_var())
                    .with_details(format!("keyring service '{}'", self.service))
                    .with_source("credential_store"),
            )
        })
    }
}

/// Fetch a token and reject empty ones.
pub async fn resolve_token(source: &dyn AccessTokenSource) -> Result<String> {
    let token = source.access_token().await?;
    let token = token.trim();
    if token.is_empty() {
        return Err(Error::authentication_with_context(
            "can't get token from access token source",
            ErrorContext::new().with_source("auth"),
        ));
    }
    Ok(token.to_string())
}
