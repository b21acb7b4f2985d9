use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::config::Configuration;

use super::{AuthError, AuthSession};

const DEFAULT_USER_AGENT: &str = "backlog-rs/0.1.0";

/// OAuth client configuration registered on the Backlog developer site.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: Url,
}

impl OAuthConfig {
    pub fn new<S: Into<String>>(client_id: S, client_secret: S, redirect_uri: Url) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri,
        }
    }

    pub fn from_configuration(config: &Configuration) -> Result<Self, AuthError> {
        let redirect_uri = Url::parse(&config.redirect_uri)?;
        Ok(Self::new(
            config.client_id.clone(),
            config.client_secret.clone(),
            redirect_uri,
        ))
    }
}

/// OAuth endpoints of a single Backlog space.
#[derive(Debug, Clone)]
pub struct OAuthEndpoints {
    pub authorization_url: Url,
    pub token_url: Url,
}

impl OAuthEndpoints {
    pub fn for_space(config: &Configuration) -> Result<Self, AuthError> {
        let base = config.space_url();
        Ok(Self {
            authorization_url: Url::parse(&format!("{base}/OAuth2AccessRequest.action"))?,
            token_url: Url::parse(&format!("{base}/api/v2/oauth2/token"))?,
        })
    }
}

/// Performs OAuth token exchanges with a Backlog space.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    http: Client,
    config: OAuthConfig,
    endpoints: OAuthEndpoints,
}

impl OAuthClient {
    pub fn for_configuration(config: &Configuration) -> Result<Self, AuthError> {
        Self::with_endpoints(
            OAuthConfig::from_configuration(config)?,
            OAuthEndpoints::for_space(config)?,
        )
    }

    pub fn with_endpoints(
        config: OAuthConfig,
        endpoints: OAuthEndpoints,
    ) -> Result<Self, AuthError> {
        let http = Client::builder().user_agent(DEFAULT_USER_AGENT).build()?;
        Ok(Self {
            http,
            config,
            endpoints,
        })
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    pub fn authorization_url(&self, state: &str) -> Url {
        let mut url = self.endpoints.authorization_url.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", self.config.redirect_uri.as_str())
            .append_pair("state", state);
        url
    }

    /// Exchange an authorization code for access/refresh tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<AuthSession, AuthError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];

        let response = self
            .http
            .post(self.endpoints.token_url.clone())
            .form(&form)
            .send()
            .await?;

        self.handle_token_response(response).await
    }

    /// Refresh an existing session using its refresh token.
    pub async fn refresh_session(
        &self,
        existing: &AuthSession,
    ) -> Result<AuthSession, AuthError> {
        let refresh_token = existing
            .refresh_token
            .as_deref()
            .ok_or(AuthError::RefreshUnavailable)?;

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];

        let response = self
            .http
            .post(self.endpoints.token_url.clone())
            .form(&form)
            .timeout(StdDuration::from_secs(30))
            .send()
            .await?;

        let mut session = self.handle_token_response(response).await?;

        if session.refresh_token.is_none() {
            session.refresh_token = existing.refresh_token.clone();
        }

        Ok(session)
    }

    async fn handle_token_response(
        &self,
        response: reqwest::Response,
    ) -> Result<AuthSession, AuthError> {
        let status = response.status();
        let received_at = Utc::now();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::TokenEndpoint { status, body });
        }

        let payload: TokenResponse = response.json().await?;
        payload.into_session(received_at)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    token_type: String,
    expires_in: Option<i64>,
}

impl TokenResponse {
    fn into_session(self, received_at: DateTime<Utc>) -> Result<AuthSession, AuthError> {
        if !self.token_type.eq_ignore_ascii_case("bearer") {
            return Err(AuthError::InvalidTokenType(self.token_type));
        }

        let expires_at = self
            .expires_in
            .map(|seconds| received_at + Duration::seconds(seconds));

        Ok(AuthSession {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            created_at: received_at,
        })
    }
}
