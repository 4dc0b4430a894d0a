//! Cloudflare user token API client
//!
//! [`UserTokenApi`] is the contract the lifecycle controller talks to.
//! [`CloudflareClient`] implements it against the v4 REST API with either a
//! bearer token or the legacy email + global key pair.

use crate::error::CloudflareError;
use crate::model::{TokenVerification, UserToken, UserTokenPolicy};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

pub type ApiResult<T> = std::result::Result<T, CloudflareError>;

/// Remote operations on user tokens
#[async_trait]
pub trait UserTokenApi: Send + Sync {
    /// `POST /user/tokens`
    async fn create_user_token(
        &self,
        name: &str,
        policies: &[UserTokenPolicy],
    ) -> ApiResult<UserToken>;

    /// `GET /user/tokens/{id}`
    async fn user_token(&self, id: &str) -> ApiResult<UserToken>;

    /// `PUT /user/tokens/{id}`
    async fn update_user_token(&self, token: &UserToken) -> ApiResult<UserToken>;

    /// `DELETE /user/tokens/{id}`
    async fn delete_user_token(&self, id: &str) -> ApiResult<DeletedToken>;

    /// `GET /user/tokens/verify` for the credentials the client uses
    async fn verify_user_token(&self) -> ApiResult<TokenVerification>;
}

/// Credentials for the Cloudflare API
#[derive(Clone)]
pub enum ApiCredentials {
    /// API token sent as `Authorization: Bearer`
    Token(String),
    /// Account email and global API key
    Key { email: String, key: String },
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiCredentials::Token(_) => f.write_str("Token([redacted])"),
            ApiCredentials::Key { email, .. } => f
                .debug_struct("Key")
                .field("email", email)
                .field("key", &"[redacted]")
                .finish(),
        }
    }
}

/// Configuration for the API client
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub credentials: ApiCredentials,
    pub base_url: String,
}

impl ApiConfig {
    pub fn new(credentials: ApiCredentials) -> Self {
        Self {
            credentials,
            base_url: CLOUDFLARE_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Create ApiConfig from environment variables
    ///
    /// `CLOUDFLARE_API_TOKEN` wins over `CLOUDFLARE_EMAIL` + `CLOUDFLARE_API_KEY`.
    /// `CLOUDFLARE_API_BASE_URL` overrides the endpoint.
    pub fn from_env() -> ApiResult<Self> {
        let credentials = match std::env::var("CLOUDFLARE_API_TOKEN") {
            Ok(token) if !token.is_empty() => ApiCredentials::Token(token),
            _ => {
                let key = std::env::var("CLOUDFLARE_API_KEY").map_err(|_| {
                    CloudflareError::MissingEnvVar(
                        "CLOUDFLARE_API_TOKEN (or CLOUDFLARE_API_KEY)".to_string(),
                    )
                })?;
                let email = std::env::var("CLOUDFLARE_EMAIL")
                    .map_err(|_| CloudflareError::MissingEnvVar("CLOUDFLARE_EMAIL".to_string()))?;
                ApiCredentials::Key { email, key }
            }
        };

        let mut config = Self::new(credentials);
        if let Ok(base_url) = std::env::var("CLOUDFLARE_API_BASE_URL") {
            config.base_url = base_url;
        }
        Ok(config)
    }
}

/// reqwest-backed Cloudflare client
pub struct CloudflareClient {
    client: reqwest::Client,
    config: ApiConfig,
}

impl CloudflareClient {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// `/user/tokens/{id}` with `id` escaped as a single path segment
    fn token_url(&self, id: &str) -> ApiResult<reqwest::Url> {
        let base = &self.config.base_url;
        let mut url = reqwest::Url::parse(&self.url("/user/tokens"))
            .map_err(|e| CloudflareError::InvalidUrl(format!("{}: {}", base, e)))?;
        url.path_segments_mut()
            .map_err(|_| CloudflareError::InvalidUrl(base.clone()))?
            .push(id);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.credentials {
            ApiCredentials::Token(token) => request.bearer_auth(token),
            ApiCredentials::Key { email, key } => request
                .header("X-Auth-Email", email)
                .header("X-Auth-Key", key),
        }
    }

    /// Send a request and unwrap the `{success, errors, result}` envelope
    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> ApiResult<T> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiResponse<serde_json::Value>>(&body)
                .ok()
                .and_then(|r| r.first_error())
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown").to_string());
            return Err(CloudflareError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let api_response: ApiResponse<T> = serde_json::from_str(&body)?;
        if !api_response.success {
            let message = api_response
                .first_error()
                .unwrap_or_else(|| "Unknown error".to_string());
            return Err(CloudflareError::Envelope(message));
        }

        api_response
            .result
            .ok_or_else(|| CloudflareError::Envelope("response carried no result".to_string()))
    }
}

#[async_trait]
impl UserTokenApi for CloudflareClient {
    async fn create_user_token(
        &self,
        name: &str,
        policies: &[UserTokenPolicy],
    ) -> ApiResult<UserToken> {
        let url = self.url("/user/tokens");
        tracing::debug!("POST {}", url);

        let body = TokenRequest {
            name,
            policies,
            status: None,
            not_before: None,
            expires_on: None,
        };
        self.send(self.client.post(&url).json(&body)).await
    }

    async fn user_token(&self, id: &str) -> ApiResult<UserToken> {
        let url = self.token_url(id)?;
        tracing::debug!("GET {}", url);
        self.send(self.client.get(url)).await
    }

    async fn update_user_token(&self, token: &UserToken) -> ApiResult<UserToken> {
        let url = self.token_url(&token.id)?;
        tracing::debug!("PUT {}", url);

        let body = TokenRequest {
            name: &token.name,
            policies: &token.policies,
            status: Some(token.status.as_str()).filter(|s| !s.is_empty()),
            not_before: token.not_before,
            expires_on: token.expires_on,
        };
        self.send(self.client.put(url).json(&body)).await
    }

    async fn delete_user_token(&self, id: &str) -> ApiResult<DeletedToken> {
        let url = self.token_url(id)?;
        tracing::debug!("DELETE {}", url);
        self.send(self.client.delete(url)).await
    }

    async fn verify_user_token(&self) -> ApiResult<TokenVerification> {
        let url = self.url("/user/tokens/verify");
        tracing::debug!("GET {}", url);
        self.send(self.client.get(&url)).await
    }
}

/// Result of a delete call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletedToken {
    pub id: String,
}

// ============ API Types ============

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    #[serde(default)]
    success: bool,
    result: Option<T>,
    #[serde(default)]
    errors: Vec<ApiMessage>,
}

impl<T> ApiResponse<T> {
    fn first_error(&self) -> Option<String> {
        self.errors
            .first()
            .map(|e| format!("{} (code {})", e.message, e.code))
    }
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    code: i32,
    message: String,
}

#[derive(Debug, Serialize)]
struct TokenRequest<'a> {
    name: &'a str,
    policies: &'a [UserTokenPolicy],
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    not_before: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_on: Option<DateTime<Utc>>,
}
