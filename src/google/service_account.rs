use yup_oauth2::ServiceAccountAuthenticator;

use super::AccessToken;
use crate::credentials::ServiceAccountKey;
use crate::errors::{CredentialError, CredentialSource};

pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Key material in the shape the authenticator expects
pub fn grant_key(key: &ServiceAccountKey) -> Result<yup_oauth2::ServiceAccountKey, CredentialError> {
    serde_json::from_value(serde_json::json!({
        "type": "service_account",
        "client_email": key.client_email,
        "private_key": key.private_key,
        "private_key_id": key.private_key_id,
        "token_uri": key.token_uri,
    }))
    .map_err(|e| CredentialError::malformed(CredentialSource::ServiceAccount, e.to_string()))
}

/// Exchange the service-account key for an access token
pub async fn fetch_token(key: &ServiceAccountKey, scope: &str) -> Result<AccessToken, CredentialError> {
    let auth = ServiceAccountAuthenticator::builder(grant_key(key)?)
        .build()
        .await
        .map_err(|e| {
            CredentialError::malformed(CredentialSource::ServiceAccount, format!("private_key is unusable: {e}"))
        })?;

    tracing::debug!("Requesting service account token for {}", key.client_email);
    let token = auth.token(&[scope]).await.map_err(|err| match err {
        yup_oauth2::Error::AuthError(e) => CredentialError::unauthorized(
            CredentialSource::ServiceAccount,
            format!("{} was rejected by the token endpoint: {}", key.client_email, e),
        ),
        other => CredentialError::unauthorized(
            CredentialSource::ServiceAccount,
            format!("token endpoint unreachable: {other}"),
        ),
    })?;

    AccessToken::from_grant(&token).ok_or_else(|| {
        CredentialError::unauthorized(CredentialSource::ServiceAccount, "the token endpoint returned no access token")
    })
}
