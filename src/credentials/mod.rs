use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::path::Path;

use crate::config::ExportConfig;
use crate::errors::{CredentialError, CredentialSource};

/// YouTube Data API key
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Service account key material used for spreadsheet access
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    pub token_uri: String,
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

/// OAuth client used for the interactive caption consent
#[derive(Clone, Deserialize)]
pub struct OAuthClientSecret {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: String,
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

impl fmt::Debug for OAuthClientSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthClientSecret")
            .field("client_id", &self.client_id)
            .field("auth_uri", &self.auth_uri)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

/// The validated credential set for one run
#[derive(Debug, Clone)]
pub struct ResolvedCredentials {
    pub api_key: ApiKey,
    pub service_account: Option<ServiceAccountKey>,
    pub oauth_client: Option<OAuthClientSecret>,
}

/// Validates the raw credential inputs of an [`ExportConfig`]
pub struct CredentialResolver;

impl CredentialResolver {
    pub fn resolve(config: &ExportConfig) -> Result<ResolvedCredentials, CredentialError> {
        let api_key = Self::api_key(&config.api_key)?;

        if config.spreadsheet_id.is_some() && config.service_account_path.is_none() {
            return Err(CredentialError::missing(
                CredentialSource::ServiceAccount,
                "--service-account is required to write to a spreadsheet",
            ));
        }

        let service_account = config
            .service_account_path
            .as_deref()
            .map(Self::service_account)
            .transpose()?;

        if service_account.is_some() && config.spreadsheet_id.is_none() {
            tracing::warn!("Service account given without --spreadsheet-id; spreadsheet export is disabled");
        }

        let oauth_client = config
            .oauth_client_secret_path
            .as_deref()
            .map(Self::oauth_client)
            .transpose()?;

        Ok(ResolvedCredentials {
            api_key,
            service_account,
            oauth_client,
        })
    }

    pub fn api_key(raw: &str) -> Result<ApiKey, CredentialError> {
        let key = raw.trim();
        if key.is_empty() {
            return Err(CredentialError::missing(CredentialSource::ApiKey, "no API key was provided"));
        }
        if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(CredentialError::malformed(CredentialSource::ApiKey, "API key contains whitespace"));
        }
        Ok(ApiKey(key.to_string()))
    }

    pub fn service_account(path: &Path) -> Result<ServiceAccountKey, CredentialError> {
        let source = CredentialSource::ServiceAccount;
        let value = read_json(path, source)?;

        if value["type"].as_str() != Some("service_account") {
            return Err(CredentialError::malformed(
                source,
                format!("{} is not a service account key (expected \"type\": \"service_account\")", path.display()),
            ));
        }

        let key: ServiceAccountKey = serde_json::from_value(value)
            .map_err(|e| CredentialError::malformed(source, format!("{}: {}", path.display(), e)))?;

        require_non_empty(source, path, &[
            ("client_email", &key.client_email),
            ("private_key", &key.private_key),
            ("token_uri", &key.token_uri),
        ])?;

        if !key.private_key.contains("PRIVATE KEY") {
            return Err(CredentialError::malformed(
                source,
                format!("{}: private_key is not a PEM key", path.display()),
            ));
        }

        Ok(key)
    }

    /// Only desktop ("installed") clients can complete the loopback redirect
    pub fn oauth_client(path: &Path) -> Result<OAuthClientSecret, CredentialError> {
        let source = CredentialSource::OAuthClient;
        let value = read_json(path, source)?;

        if value.get("installed").is_none() && value.get("web").is_some() {
            return Err(CredentialError::malformed(
                source,
                format!(
                    "{} is a web client; caption consent redirects to a local port, which only a Desktop app client allows",
                    path.display()
                ),
            ));
        }

        let section = value.get("installed").cloned().ok_or_else(|| {
            CredentialError::malformed(source, format!("{} has no \"installed\" section", path.display()))
        })?;

        let secret: OAuthClientSecret = serde_json::from_value(section)
            .map_err(|e| CredentialError::malformed(source, format!("{}: {}", path.display(), e)))?;

        require_non_empty(source, path, &[
            ("client_id", &secret.client_id),
            ("client_secret", &secret.client_secret),
            ("auth_uri", &secret.auth_uri),
            ("token_uri", &secret.token_uri),
        ])?;

        Ok(secret)
    }
}

fn read_json(path: &Path, source: CredentialSource) -> Result<Value, CredentialError> {
    let content = fs_err::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => CredentialError::missing(source, format!("{} does not exist", path.display())),
        _ => CredentialError::malformed(source, e.to_string()),
    })?;

    serde_json::from_str(&content)
        .map_err(|e| CredentialError::malformed(source, format!("{} is not valid JSON: {}", path.display(), e)))
}

fn require_non_empty(
    source: CredentialSource,
    path: &Path,
    fields: &[(&str, &String)],
) -> Result<(), CredentialError> {
    for (name, value) in fields {
        if value.trim().is_empty() {
            return Err(CredentialError::malformed(
                source,
                format!("{}: field \"{}\" is empty", path.display(), name),
            ));
        }
    }
    Ok(())
}
