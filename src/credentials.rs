// ABOUTME: Short-lived cloud credentials obtained from an identity/token provider.
// ABOUTME: Includes the gcloud-backed provider used for workload identity federation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::exec::{ActionError, ActionExecutor, RenderedAction};

/// Identity to exchange for a short-lived access token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IdentityConfig {
    /// Service account to impersonate, if any.
    #[serde(default)]
    pub service_account: Option<String>,

    #[serde(default)]
    pub project: Option<String>,

    /// Lifetime assumed for fetched tokens.
    #[serde(default = "default_token_ttl", with = "humantime_serde")]
    pub token_ttl: Duration,

    /// Tokens closer than this to expiry are re-acquired before use.
    #[serde(default = "default_refresh_skew", with = "humantime_serde")]
    pub refresh_skew: Duration,

    /// Environment variable the token is bound to for actions.
    #[serde(default = "default_env_var")]
    pub env_var: String,

    #[serde(default = "default_program")]
    pub program: String,

    /// Upper bound on a single token exchange.
    #[serde(default = "default_fetch_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_token_ttl() -> Duration {
    Duration::from_secs(55 * 60)
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_refresh_skew() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_env_var() -> String {
    "CLOUDSDK_AUTH_ACCESS_TOKEN".to_string()
}

fn default_program() -> String {
    "gcloud".to_string()
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            service_account: None,
            project: None,
            token_ttl: default_token_ttl(),
            refresh_skew: default_refresh_skew(),
            env_var: default_env_var(),
            program: default_program(),
            timeout: default_fetch_timeout(),
        }
    }
}

/// A short-lived access token. The token value never appears in `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    expires_at: DateTime<Utc>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Credential {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Usable for at least `skew` longer at `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        let Ok(skew) = chrono::Duration::from_std(skew) else {
            return false;
        };
        now.checked_add_signed(skew)
            .is_some_and(|horizon| horizon < self.expires_at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The provider could not be reached or refused the exchange.
    #[error("token exchange failed: {0}")]
    Exchange(String),

    /// The token program is missing or not executable.
    #[error("token program failed to launch: {0}")]
    Launch(String),

    #[error("token provider returned an empty token")]
    EmptyToken,

    #[error("no identity provider configured")]
    NotConfigured,

    #[error("token exchange cancelled")]
    Cancelled,
}

/// Exchanges the configured identity for a short-lived credential.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn fetch(&self, cancel: &CancellationToken) -> Result<Credential, AuthError>;
}

/// Provider used when a workflow declares no identity.
pub struct NoIdentity;

#[async_trait]
impl TokenProvider for NoIdentity {
    async fn fetch(&self, _cancel: &CancellationToken) -> Result<Credential, AuthError> {
        Err(AuthError::NotConfigured)
    }
}

/// Fetches tokens with `gcloud auth print-access-token`.
pub struct GcloudTokenProvider {
    executor: Arc<dyn ActionExecutor>,
    identity: IdentityConfig,
}

impl GcloudTokenProvider {
    pub fn new(executor: Arc<dyn ActionExecutor>, identity: IdentityConfig) -> Self {
        Self { executor, identity }
    }

    fn command(&self) -> RenderedAction {
        let mut args = vec!["auth".to_string(), "print-access-token".to_string()];
        if let Some(ref account) = self.identity.service_account {
            args.push(format!("--impersonate-service-account={account}"));
        }
        if let Some(ref project) = self.identity.project {
            args.push(format!("--project={project}"));
        }
        RenderedAction {
            program: self.identity.program.clone(),
            args,
            env: BTreeMap::new(),
            working_dir: None,
        }
    }
}

#[async_trait]
impl TokenProvider for GcloudTokenProvider {
    async fn fetch(&self, cancel: &CancellationToken) -> Result<Credential, AuthError> {
        let command = self.command();
        let result = match self
            .executor
            .execute(&command, self.identity.timeout, cancel)
            .await
        {
            Ok(result) => result,
            Err(ActionError::Cancelled { .. }) => return Err(AuthError::Cancelled),
            Err(e @ ActionError::Launch { .. }) => return Err(AuthError::Launch(e.to_string())),
            Err(e) => return Err(AuthError::Exchange(e.to_string())),
        };

        if result.exit_code != Some(0) {
            return Err(AuthError::Exchange(format!(
                "{} exited with {:?}: {}",
                self.identity.program,
                result.exit_code,
                result.stderr.trim()
            )));
        }

        let token = result.stdout.trim();
        if token.is_empty() {
            return Err(AuthError::EmptyToken);
        }

        let ttl = chrono::Duration::from_std(self.identity.token_ttl)
            .map_err(|e| AuthError::Exchange(format!("invalid token ttl: {e}")))?;
        tracing::info!(
            service_account = ?self.identity.service_account,
            "acquired access token"
        );
        Ok(Credential::new(token, Utc::now() + ttl))
    }
}
