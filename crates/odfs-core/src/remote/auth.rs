//! OAuth2 client-credentials exchange.

use crate::config::OdfsConfig;
use crate::error::{OdfsError, OdfsResult};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// Bearer token used for every API request of this process.
#[derive(Debug)]
pub struct AccessToken {
    pub token: SecretString,
    /// Lifetime reported by the token endpoint. The token is never refreshed.
    pub expires_in: Option<Duration>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Exchanges the configured client credentials for an access token.
pub async fn request_access_token(
    client: &reqwest::Client,
    config: &OdfsConfig,
) -> OdfsResult<AccessToken> {
    debug!(endpoint = %config.token_endpoint, client_id = %config.client_id, "Requesting access token");

    let form = [
        ("grant_type", "client_credentials"),
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.expose_secret()),
        ("scope", config.scope.as_str()),
    ];
    let response = client
        .post(&config.token_endpoint)
        .form(&form)
        .send()
        .await
        .map_err(|e| OdfsError::RemoteUnavailable(format!("token endpoint: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(OdfsError::RemoteAuth(format!(
            "token endpoint returned {status}"
        )));
    }

    let body: TokenResponse = response
        .json()
        .await
        .map_err(|e| OdfsError::InvalidResponse(format!("token response: {e}")))?;

    let expires_in = body.expires_in.map(Duration::from_secs);
    if let Some(lifetime) = expires_in {
        info!(
            expires_in_secs = lifetime.as_secs(),
            "Access token acquired; remote calls will fail once it expires"
        );
    } else {
        info!("Access token acquired");
    }

    Ok(AccessToken {
        token: SecretString::from(body.access_token),
        expires_in,
    })
}
