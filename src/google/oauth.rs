//! Installed-app OAuth consent for caption access.
//!
//! Tokens are cached on disk by the authenticator. An expired token is
//! refreshed silently; a missing token starts the browser consent flow over a
//! loopback redirect. A revoked refresh token is never retried: the cache is
//! dropped and the user is asked to re-run and consent again.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

use yup_oauth2::authenticator_delegate::InstalledFlowDelegate;
use yup_oauth2::error::{AuthError, AuthErrorCode};
use yup_oauth2::{ApplicationSecret, InstalledFlowAuthenticator, InstalledFlowReturnMethod};

use super::AccessToken;
use crate::credentials::OAuthClientSecret;
use crate::errors::{CredentialError, CredentialSource, ExportError};

pub const CAPTIONS_SCOPE: &str = "https://www.googleapis.com/auth/youtube.force-ssl";

pub fn application_secret(client: &OAuthClientSecret) -> ApplicationSecret {
    ApplicationSecret {
        client_id: client.client_id.clone(),
        client_secret: client.client_secret.clone(),
        auth_uri: client.auth_uri.clone(),
        token_uri: client.token_uri.clone(),
        redirect_uris: client.redirect_uris.clone(),
        ..Default::default()
    }
}

/// Prints the consent URL to stderr; stdout may carry exported records
struct ConsoleDelegate;

impl InstalledFlowDelegate for ConsoleDelegate {
    fn present_user_url<'a>(
        &'a self,
        url: &'a str,
        _need_code: bool,
    ) -> Pin<Box<dyn Future<Output = Result<String, String>> + Send + 'a>> {
        Box::pin(async move {
            tracing::info!("Waiting for caption consent in the browser");
            eprintln!("Open this URL in your browser to allow caption access:\n\n  {url}\n");
            Ok(String::new())
        })
    }
}

/// Produce a valid caption access token, refreshing or consenting as needed
pub async fn caption_token(
    client: &OAuthClientSecret,
    token_path: &Path,
    consent_timeout: Duration,
) -> Result<AccessToken, ExportError> {
    if let Some(dir) = token_path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs_err::create_dir_all(dir)
            .map_err(|e| ExportError::Auth(format!("cannot create the token cache directory: {e}")))?;
    }

    let auth = InstalledFlowAuthenticator::builder(application_secret(client), InstalledFlowReturnMethod::HTTPRedirect)
        .persist_tokens_to_disk(token_path.to_path_buf())
        .flow_delegate(Box::new(ConsoleDelegate))
        .build()
        .await
        .map_err(|e| ExportError::Auth(format!("cannot start the OAuth consent flow: {e}")))?;

    tracing::debug!("Caption token cache: {}", token_path.display());
    let token = tokio::time::timeout(consent_timeout, auth.token(&[CAPTIONS_SCOPE]))
        .await
        .map_err(|_| ExportError::Auth(format!("no consent received within {}s", consent_timeout.as_secs())))?
        .map_err(|e| token_error(e, token_path))?;

    AccessToken::from_grant(&token)
        .ok_or_else(|| ExportError::Auth("the token endpoint returned no access token".into()))
}

fn token_error(err: yup_oauth2::Error, token_path: &Path) -> ExportError {
    match err {
        yup_oauth2::Error::AuthError(e) => auth_error(&e, token_path),
        yup_oauth2::Error::HttpError(e) => ExportError::Fetch {
            attempts: 1,
            detail: format!("token endpoint unreachable: {e}"),
        },
        other => ExportError::Auth(format!("token endpoint error: {other}")),
    }
}

fn auth_error(err: &AuthError, token_path: &Path) -> ExportError {
    match &err.error {
        AuthErrorCode::InvalidClient | AuthErrorCode::UnauthorizedClient => CredentialError::unauthorized(
            CredentialSource::OAuthClient,
            format!("token endpoint rejected the client: {err}"),
        )
        .into(),
        AuthErrorCode::InvalidGrant => {
            if let Err(e) = fs_err::remove_file(token_path) {
                tracing::warn!("Could not remove revoked token cache: {}", e);
            }
            ExportError::Auth(
                "the saved caption authorization was revoked or has expired; re-run to grant consent again".into(),
            )
        }
        AuthErrorCode::AccessDenied => ExportError::Auth(format!("consent was denied ({err})")),
        _ => ExportError::Auth(format!("token endpoint error: {err}")),
    }
}
