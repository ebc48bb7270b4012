use super::{response, ApiRequest, Transport};
use crate::config::Config;
use crate::error::ApiError;
use crate::models::LoginResponse;
use crate::session::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

#[derive(Clone)]
pub struct LmsClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl LmsClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// A copy of this client that sends the session's bearer token.
    pub fn authenticated(&self, session: &Session) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(session.token.clone()),
        }
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Session, ApiError> {
        let request = ApiRequest::post(
            "/auth/login",
            &json!({ "username": username, "password": password }),
        )?;
        let value = self.send(request).await?;
        let login: LoginResponse = serde_json::from_value(value)
            .map_err(|e| ApiError::Malformed(format!("unexpected login response: {}", e)))?;
        Ok(Session::from(login))
    }

    fn build_headers(&self) -> Result<HeaderMap, ApiError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ApiError::Invalid("session token is not a valid header".into()))?;
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("lms-desk"));
        Ok(headers)
    }
}

#[async_trait]
impl Transport for LmsClient {
    async fn send(&self, request: ApiRequest) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.base_url, request.path);
        debug!(method = %request.method, %url, "sending request");

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .headers(self.build_headers()?);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!(%status, %url, "received response");

        response::interpret(status, &text)
    }
}
