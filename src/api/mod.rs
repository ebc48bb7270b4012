mod catalog;
mod client;
pub mod response;

pub use catalog::{contents, courses, lectures, questions, quizzes};
pub use client::LmsClient;

use crate::error::ApiError;
use async_trait::async_trait;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// One call against the LMS, independent of how it is carried.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
        }
    }

    pub fn post<B: Serialize>(path: impl Into<String>, body: &B) -> Result<Self, ApiError> {
        let body = serde_json::to_value(body)
            .map_err(|e| ApiError::Invalid(format!("cannot encode request body: {}", e)))?;
        Ok(Self {
            method: Method::POST,
            path: path.into(),
            body: Some(body),
        })
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::DELETE,
            path: path.into(),
            body: None,
        }
    }
}

/// Everything above the HTTP client talks to the server through this trait.
/// Implementations return the already-normalized body of a successful call.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<Value, ApiError>;
}

/// GET `path` and decode the body as `T`.
pub async fn fetch_json<T: DeserializeOwned>(
    transport: &dyn Transport,
    path: &str,
) -> Result<T, ApiError> {
    let value = transport.send(ApiRequest::get(path)).await?;
    serde_json::from_value(value)
        .map_err(|e| ApiError::Malformed(format!("unexpected shape from {}: {}", path, e)))
}
