//! HTTP client for the account API, plus the device-side login surface.

mod login;
mod storage;

pub use login::{LoginError, LoginSurface};
pub use storage::{ClientState, StateFile, StorageError};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

use crate::api::error::ErrorResponse;
use crate::db::{
    AccountResponse, ForgotPasswordRequest, LoginRequest, LoginResponse, MessageResponse,
    SignupRequest, UpdateAccountRequest,
};

/// Default timeout for every API call, login included
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server returned {status}: {message}")]
    Api {
        status: StatusCode,
        code: String,
        message: String,
    },
}

impl ClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Transport(e) => e.status(),
        }
    }
}

/// The single network call the login surface depends on
#[async_trait]
pub trait LoginTransport: Send + Sync {
    /// Exchange credentials for a token
    async fn login(&self, username: &str, password: &str) -> Result<String, ClientError>;
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn signup(&self, request: &SignupRequest) -> Result<AccountResponse, ClientError> {
        send_json(self.http.post(self.url("/signup")).json(request)).await
    }

    pub async fn forgot_password(&self, email: &str) -> Result<MessageResponse, ClientError> {
        let request = ForgotPasswordRequest {
            email: email.to_string(),
        };
        send_json(self.http.post(self.url("/forgot-password")).json(&request)).await
    }

    pub async fn get_user(&self, token: &str) -> Result<AccountResponse, ClientError> {
        send_json(self.http.get(self.url("/user")).bearer_auth(token)).await
    }

    pub async fn update_user(
        &self,
        token: &str,
        username: &str,
        request: &UpdateAccountRequest,
    ) -> Result<AccountResponse, ClientError> {
        let builder = self
            .http
            .put(self.url(&format!("/user/{}", username)))
            .bearer_auth(token)
            .json(request);
        send_json(builder).await
    }

    pub async fn delete_account(&self, token: &str) -> Result<(), ClientError> {
        let response = self
            .http
            .delete(self.url("/userdelete"))
            .bearer_auth(token)
            .send()
            .await?;
        if response.status().is_success() {
            return Ok(());
        }
        Err(api_error(response).await)
    }
}

#[async_trait]
impl LoginTransport for ApiClient {
    async fn login(&self, username: &str, password: &str) -> Result<String, ClientError> {
        let request = LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        };
        let response: LoginResponse =
            send_json(self.http.post(self.url("/login")).json(&request)).await?;
        Ok(response.token)
    }
}

async fn send_json<T: DeserializeOwned>(builder: RequestBuilder) -> Result<T, ClientError> {
    let response = builder.send().await?;
    if !response.status().is_success() {
        return Err(api_error(response).await);
    }
    Ok(response.json().await?)
}

/// Decode the server's error envelope, falling back to the raw body
async fn api_error(response: reqwest::Response) -> ClientError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(envelope) => ClientError::Api {
            status,
            code: envelope.error.code,
            message: envelope.error.message,
        },
        Err(_) => ClientError::Api {
            status,
            code: "unknown".to_string(),
            message: if body.is_empty() {
                status.to_string()
            } else {
                body
            },
        },
    }
}
