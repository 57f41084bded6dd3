//! OAuth access token for the YouTube Data API.
//!
//! Either runs Google's installed-app console flow (print a consent URL,
//! read the code back from stdin) or mints a token from a stored refresh
//! token. Nothing is cached between runs.

use crate::config::check_endpoint;
use crate::error::{Result, UploadError};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

pub const SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/youtube.upload",
    "https://www.googleapis.com/auth/youtube.force-ssl",
];

/// Out-of-band redirect: Google shows the code for the operator to paste.
const CONSOLE_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";
const TOKEN_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: String,
    pub token_uri: String,
}

/// Layout of the JSON file downloaded from the Google Cloud console.
#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            UploadError::Auth(format!(
                "Failed to read client secrets {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let file: ClientSecretsFile = serde_json::from_str(content)?;
        file.installed
            .or(file.web)
            .ok_or_else(|| UploadError::Auth("client secrets has no 'installed' or 'web' section".into()))
    }

    /// URL the operator opens to grant access.
    pub fn authorization_url(&self) -> Result<reqwest::Url> {
        let scope = SCOPES.join(" ");
        reqwest::Url::parse_with_params(
            &self.auth_uri,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", CONSOLE_REDIRECT_URI),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| UploadError::Auth(format!("Invalid auth_uri {}: {}", self.auth_uri, e)))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Bearer token attached to every API call.
#[derive(Clone)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Obtain an access token, preferring the refresh token when one is configured.
pub async fn authorize(
    secrets: &ClientSecrets,
    refresh_token: Option<&str>,
    insecure_transport: bool,
) -> Result<AccessToken> {
    check_endpoint("token_uri", &secrets.token_uri, insecure_transport)
        .map_err(|e| UploadError::Auth(e.to_string()))?;

    let client = reqwest::Client::builder()
        .timeout(TOKEN_TIMEOUT)
        .build()
        .map_err(|e| UploadError::Auth(format!("Failed to create HTTP client: {}", e)))?;

    match refresh_token {
        Some(refresh_token) => {
            log::info!("Refreshing access token");
            exchange(
                &client,
                secrets,
                &[
                    ("client_id", secrets.client_id.as_str()),
                    ("client_secret", secrets.client_secret.as_str()),
                    ("refresh_token", refresh_token),
                    ("grant_type", "refresh_token"),
                ],
            )
            .await
        }
        None => {
            let code = prompt_for_code(&secrets.authorization_url()?).await?;
            exchange(
                &client,
                secrets,
                &[
                    ("code", code.as_str()),
                    ("client_id", secrets.client_id.as_str()),
                    ("client_secret", secrets.client_secret.as_str()),
                    ("redirect_uri", CONSOLE_REDIRECT_URI),
                    ("grant_type", "authorization_code"),
                ],
            )
            .await
        }
    }
}

async fn prompt_for_code(url: &reqwest::Url) -> Result<String> {
    println!("Please visit this URL to authorize this application: {}", url);
    println!("Enter the authorization code: ");

    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    let code = line.trim().to_string();
    if code.is_empty() {
        return Err(UploadError::Auth("No authorization code entered".into()));
    }
    Ok(code)
}

async fn exchange(
    client: &reqwest::Client,
    secrets: &ClientSecrets,
    form: &[(&str, &str)],
) -> Result<AccessToken> {
    let response = client
        .post(&secrets.token_uri)
        .form(form)
        .send()
        .await
        .map_err(|e| UploadError::Auth(format!("Token request failed: {}", e)))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(UploadError::Auth(format!(
            "Token endpoint returned {}: {}",
            status, body
        )));
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| UploadError::Auth(format!("Failed to parse token response: {}", e)))?;

    log::info!(
        "Access token obtained (expires in {}s)",
        token.expires_in.unwrap_or_default()
    );
    Ok(AccessToken::new(token.access_token))
}

#[cfg(test)]
mod tests {
    use super::*;

    const INSTALLED: &str = r#"{
        "installed": {
            "client_id": "123.apps.googleusercontent.com",
            "project_id": "talks",
            "auth_uri": "https://accounts.google.com/o/oauth2/auth",
            "token_uri": "https://oauth2.googleapis.com/token",
            "client_secret": "s3cret",
            "redirect_uris": ["urn:ietf:wg:oauth:2.0:oob", "http://localhost"]
        }
    }"#;

    #[test]
    fn test_parse_installed_secrets() {
        let secrets = ClientSecrets::from_json(INSTALLED).unwrap();
        assert_eq!(secrets.client_id, "123.apps.googleusercontent.com");
        assert_eq!(secrets.token_uri, "https://oauth2.googleapis.com/token");
    }

    #[test]
    fn test_secrets_without_known_section_rejected() {
        let result = ClientSecrets::from_json(r#"{"other": {}}"#);
        assert!(matches!(result, Err(UploadError::Auth(_))));
    }

    #[test]
    fn test_authorization_url_carries_scopes() {
        let url = ClientSecrets::from_json(INSTALLED)
            .unwrap()
            .authorization_url()
            .unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["client_id"], "123.apps.googleusercontent.com");
        assert_eq!(params["redirect_uri"], CONSOLE_REDIRECT_URI);
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["scope"], SCOPES.join(" "));
    }

    #[tokio::test]
    async fn test_plain_http_token_endpoint_refused_without_toggle() {
        let mut secrets = ClientSecrets::from_json(INSTALLED).unwrap();
        secrets.token_uri = "http://127.0.0.1:9/token".to_string();
        let result = authorize(&secrets, Some("refresh"), false).await;
        assert!(matches!(result, Err(UploadError::Auth(_))));
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = AccessToken::new("ya29.secret");
        assert_eq!(format!("{:?}", token), "AccessToken(***)");
        assert_eq!(token.as_str(), "ya29.secret");
    }
}
