use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use super::{oauth, service_account};
use crate::credentials::{OAuthClientSecret, ServiceAccountKey};
use crate::errors::{CredentialError, ExportError};

/// Bearer token for one authorized API session
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    secret: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            secret: secret.into(),
            expires_at,
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Convert an authenticator token; `None` when it carries no bearer value
    pub(crate) fn from_grant(token: &yup_oauth2::AccessToken) -> Option<Self> {
        let expires_at = token
            .expiration_time()
            .and_then(|at| DateTime::<Utc>::from_timestamp(at.unix_timestamp(), 0));
        token.token().map(|secret| Self::new(secret, expires_at))
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Produces authorized sessions for the caption and spreadsheet APIs
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// OAuth session for caption access. May run the interactive consent flow.
    async fn caption_session(&self, client: &OAuthClientSecret) -> Result<AccessToken, ExportError>;

    /// Service-account session for spreadsheet writes
    async fn spreadsheet_session(&self, key: &ServiceAccountKey) -> Result<AccessToken, CredentialError>;
}

/// Talks to Google's token endpoints
pub struct GoogleSessions {
    token_path: PathBuf,
    consent_timeout: Duration,
}

impl GoogleSessions {
    pub fn new(token_path: PathBuf, consent_timeout: Duration) -> Self {
        Self {
            token_path,
            consent_timeout,
        }
    }
}

#[async_trait]
impl SessionProvider for GoogleSessions {
    async fn caption_session(&self, client: &OAuthClientSecret) -> Result<AccessToken, ExportError> {
        oauth::caption_token(client, &self.token_path, self.consent_timeout).await
    }

    async fn spreadsheet_session(&self, key: &ServiceAccountKey) -> Result<AccessToken, CredentialError> {
        service_account::fetch_token(key, service_account::SHEETS_SCOPE).await
    }
}

/// Fixed tokens, for tests
#[cfg(test)]
pub struct StaticSessions {
    pub caption: Result<AccessToken, String>,
    pub spreadsheet: Result<AccessToken, CredentialError>,
}

#[cfg(test)]
impl StaticSessions {
    pub fn ok() -> Self {
        Self {
            caption: Ok(AccessToken::new("caption-token", None)),
            spreadsheet: Ok(AccessToken::new("sheets-token", None)),
        }
    }
}

#[cfg(test)]
#[async_trait]
impl SessionProvider for StaticSessions {
    async fn caption_session(&self, _client: &OAuthClientSecret) -> Result<AccessToken, ExportError> {
        self.caption.clone().map_err(ExportError::Auth)
    }

    async fn spreadsheet_session(&self, _key: &ServiceAccountKey) -> Result<AccessToken, CredentialError> {
        self.spreadsheet.clone()
    }
}
