//! Remote collaborators: the login endpoint and the identity provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::account::device::DeviceInfo;
use crate::error::{ApiError, IdentityError};

/// Public key material the remote side will verify the challenge
/// signature against.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AccountKeyPayload {
    pub public_key: String,
    pub hash_algo: u32,
    pub sign_algo: u32,
    pub weight: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub signature: String,
    pub account_key: AccountKeyPayload,
    pub device_info: DeviceInfo,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub custom_token: Option<String>,
}

/// Remote login endpoint. One production implementation over HTTP; tests
/// substitute their own.
#[async_trait]
pub trait LoginEndpoint: Send + Sync {
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ApiError>;
}

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl LoginEndpoint for ApiClient {
    async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ApiError> {
        let url = format!("{}/v1/login", self.base_url);
        debug!("submitting login challenge to {url}");

        let response = self.http.post(&url).json(request).send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            // Semantic response: the server does not recognise the public
            // key or the signature failed verification.
            warn!("login endpoint returned 404 for public key {}", request.account_key.public_key);
            return Err(ApiError::LoginRejected);
        }
        if !status.is_success() {
            return Err(ApiError::Status(status.as_u16()));
        }
        Ok(response.json().await?)
    }
}

/// Identity provider session operations: anonymous sign-in, token issue
/// with forced refresh, custom-token redemption.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn is_anonymous(&self) -> bool;
    async fn sign_out(&self);
    async fn sign_in_anonymously(&self) -> Result<(), IdentityError>;
    /// Session token for challenge signing. `force_refresh` bypasses any
    /// cached token so the challenge is always signed over a fresh one.
    async fn id_token(&self, force_refresh: bool) -> Result<String, IdentityError>;
    async fn exchange_custom_token(&self, token: &str) -> Result<(), IdentityError>;
    async fn current_uid(&self) -> Option<String>;
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
    #[serde(default)]
    uid: Option<String>,
}

#[derive(Default)]
struct SessionState {
    uid: Option<String>,
    anonymous: bool,
    cached_token: Option<String>,
}

/// HTTP identity provider client.
pub struct HttpIdentityProvider {
    http: reqwest::Client,
    base_url: String,
    session: tokio::sync::Mutex<SessionState>,
}

impl HttpIdentityProvider {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            session: tokio::sync::Mutex::new(SessionState::default()),
        }
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn is_anonymous(&self) -> bool {
        let session = self.session.lock().await;
        session.anonymous || session.uid.is_none()
    }

    async fn sign_out(&self) {
        let mut session = self.session.lock().await;
        *session = SessionState::default();
    }

    async fn sign_in_anonymously(&self) -> Result<(), IdentityError> {
        let url = format!("{}/auth/anonymous", self.base_url);
        let response = self
            .http
            .post(&url)
            .send()
            .await
            .map_err(|e| IdentityError::AnonymousSignIn(e.to_string()))?;
        if !response.status().is_success() {
            return Err(IdentityError::AnonymousSignIn(format!(
                "status {}",
                response.status()
            )));
        }
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| IdentityError::AnonymousSignIn(e.to_string()))?;

        let mut session = self.session.lock().await;
        session.anonymous = true;
        session.uid = body.uid;
        session.cached_token = Some(body.token);
        Ok(())
    }

    async fn id_token(&self, force_refresh: bool) -> Result<String, IdentityError> {
        if !force_refresh {
            let session = self.session.lock().await;
            if let Some(token) = &session.cached_token {
                return Ok(token.clone());
            }
        }
        let url = format!("{}/auth/token?refresh=true", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| IdentityError::Token(e.to_string()))?;
        if !response.status().is_success() {
            return Err(IdentityError::Token(format!("status {}", response.status())));
        }
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| IdentityError::Token(e.to_string()))?;

        let mut session = self.session.lock().await;
        session.cached_token = Some(body.token.clone());
        Ok(body.token)
    }

    async fn exchange_custom_token(&self, token: &str) -> Result<(), IdentityError> {
        let url = format!("{}/auth/exchange", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "customToken": token }))
            .send()
            .await
            .map_err(|e| IdentityError::Exchange(e.to_string()))?;
        if !response.status().is_success() {
            return Err(IdentityError::Exchange(format!(
                "status {}",
                response.status()
            )));
        }
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| IdentityError::Exchange(e.to_string()))?;

        let mut session = self.session.lock().await;
        session.anonymous = false;
        session.uid = body.uid;
        session.cached_token = Some(body.token);
        Ok(())
    }

    async fn current_uid(&self) -> Option<String> {
        self.session.lock().await.uid.clone()
    }
}
