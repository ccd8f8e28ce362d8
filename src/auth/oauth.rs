use std::fmt;
use std::time::Duration;

use reqwest::Url;
use rocket::request::FromParam;
use serde::Deserialize;
use tracing::{error, info, instrument};

use crate::config::{OAuthClientConfig, OAuthConfig};
use crate::error::AppError;

pub const STATE_COOKIE: &str = "oauth_state";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    Google,
    GitHub,
}

impl OAuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "google",
            OAuthProvider::GitHub => "github",
        }
    }

    fn authorize_endpoint(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "https://accounts.google.com/o/oauth2/v2/auth",
            OAuthProvider::GitHub => "https://github.com/login/oauth/authorize",
        }
    }

    fn token_endpoint(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "https://oauth2.googleapis.com/token",
            OAuthProvider::GitHub => "https://github.com/login/oauth/access_token",
        }
    }

    fn scope(&self) -> &'static str {
        match self {
            OAuthProvider::Google => "openid email",
            OAuthProvider::GitHub => "user:email",
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'a> FromParam<'a> for OAuthProvider {
    type Error = &'a str;

    fn from_param(param: &'a str) -> Result<Self, Self::Error> {
        match param {
            "google" => Ok(OAuthProvider::Google),
            "github" => Ok(OAuthProvider::GitHub),
            _ => Err(param),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct GoogleUserInfo {
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
}

#[derive(Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

/// Authorization-code flow against the configured providers. Only the
/// verified email address is taken from the provider; the portal account
/// must already exist.
pub struct OAuthClient {
    http: reqwest::Client,
    config: OAuthConfig,
}

impl OAuthClient {
    pub fn new(config: OAuthConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(concat!("research-portal/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { http, config })
    }

    fn client_config(&self, provider: OAuthProvider) -> Result<&OAuthClientConfig, AppError> {
        let config = match provider {
            OAuthProvider::Google => self.config.google.as_ref(),
            OAuthProvider::GitHub => self.config.github.as_ref(),
        };

        config.ok_or_else(|| {
            AppError::ExternalService(format!("{} sign-in is not configured", provider))
        })
    }

    pub fn redirect_uri(&self, provider: OAuthProvider) -> String {
        format!(
            "{}/api/auth/oauth/{}/callback",
            self.config.redirect_base_url.trim_end_matches('/'),
            provider
        )
    }

    pub fn authorize_url(&self, provider: OAuthProvider, state: &str) -> Result<String, AppError> {
        let client = self.client_config(provider)?;
        let redirect_uri = self.redirect_uri(provider);

        let url = Url::parse_with_params(
            provider.authorize_endpoint(),
            &[
                ("client_id", client.client_id.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", provider.scope()),
                ("state", state),
            ],
        )
        .map_err(|e| AppError::Internal(format!("Invalid authorize URL: {}", e)))?;

        Ok(url.to_string())
    }

    /// Trades an authorization code for the caller's verified email.
    #[instrument(skip(self, code))]
    pub async fn exchange_code(&self, provider: OAuthProvider, code: &str) -> Result<String, AppError> {
        let client = self.client_config(provider)?;
        let redirect_uri = self.redirect_uri(provider);

        let response = self
            .http
            .post(provider.token_endpoint())
            .header("Accept", "application/json")
            .form(&[
                ("client_id", client.client_id.as_str()),
                ("client_secret", client.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", redirect_uri.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            error!(provider = %provider, status = %status, "Token exchange failed");
            return Err(AppError::Authentication(format!(
                "{} rejected the authorization code",
                provider
            )));
        }

        let token: TokenResponse = response.json().await?;
        info!(provider = %provider, "Authorization code exchanged");

        match provider {
            OAuthProvider::Google => self.google_email(&token.access_token).await,
            OAuthProvider::GitHub => self.github_email(&token.access_token).await,
        }
    }

    async fn google_email(&self, access_token: &str) -> Result<String, AppError> {
        let info: GoogleUserInfo = self
            .http
            .get("https://openidconnect.googleapis.com/v1/userinfo")
            .bearer_auth(access_token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match info.email {
            Some(email) if info.email_verified => Ok(email),
            _ => Err(AppError::Authentication(
                "Google account has no verified email".to_string(),
            )),
        }
    }

    async fn github_email(&self, access_token: &str) -> Result<String, AppError> {
        let emails: Vec<GitHubEmail> = self
            .http
            .get("https://api.github.com/user/emails")
            .bearer_auth(access_token)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        emails
            .into_iter()
            .filter(|e| e.verified)
            .max_by_key(|e| e.primary)
            .map(|e| e.email)
            .ok_or_else(|| {
                AppError::Authentication("GitHub account has no verified email".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> OAuthClient {
        OAuthClient::new(OAuthConfig {
            redirect_base_url: "https://portal.example.org/".to_string(),
            google: Some(OAuthClientConfig {
                client_id: "google-id".to_string(),
                client_secret: "google-secret".to_string(),
            }),
            github: None,
        })
        .unwrap()
    }

    #[test]
    fn authorize_url_carries_state_and_callback() {
        let client = configured();
        let url = client
            .authorize_url(OAuthProvider::Google, "abc123")
            .unwrap();

        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("client_id=google-id"));
        assert!(url.contains("state=abc123"));
        assert!(url.contains(
            "redirect_uri=https%3A%2F%2Fportal.example.org%2Fapi%2Fauth%2Foauth%2Fgoogle%2Fcallback"
        ));
    }

    #[test]
    fn unconfigured_provider_is_unavailable() {
        let client = configured();
        let err = client
            .authorize_url(OAuthProvider::GitHub, "state")
            .unwrap_err();

        assert!(matches!(err, AppError::ExternalService(_)));
    }

    #[test]
    fn provider_from_path_segment() {
        assert_eq!(OAuthProvider::from_param("github"), Ok(OAuthProvider::GitHub));
        assert!(OAuthProvider::from_param("twitter").is_err());
    }
}
