use crate::core::{ChatError, Config, Tool};
use crate::providers::llm::{BoxStream, ChatBackend};
use crate::providers::Message;
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use log::debug;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION},
    Client, Response, StatusCode,
};
use std::time::Duration;

use super::stream::{fragments, with_idle_timeout};
use super::types::ChatRequest;

const API_KEY_HEADER: &str = "apikey";
const EVENT_STREAM: &str = "text/event-stream";

/// Client for one of the chat functions hosted on the backend.
///
/// Every call posts the full conversation and streams the reply back. A
/// partially consumed reply is never resumed; callers retry by sending the
/// conversation again.
pub struct FunctionClient {
    api_key: String,
    client: Client,
    url: String,
    idle_timeout: Duration,
}

impl FunctionClient {
    /// Creates a client for `tool` using the endpoint and timeouts in `config`.
    pub fn new(api_key: String, config: &Config, tool: Tool) -> Result<Self, ChatError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| ChatError::ConfigError(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self::from_parts(
            api_key,
            config.endpoint_url(tool),
            client,
            config.idle_timeout(),
        ))
    }

    /// Creates a client around an already configured HTTP client.
    pub fn from_parts(
        api_key: String,
        url: impl Into<String>,
        client: Client,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            api_key,
            client,
            url: url.into(),
            idle_timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn build_headers(&self) -> Result<HeaderMap, ChatError> {
        let key = HeaderValue::from_str(&self.api_key)
            .map_err(|e| ChatError::ConfigError(format!("Invalid API key: {e}")))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {key}", key = self.api_key))
            .map_err(|e| ChatError::ConfigError(format!("Invalid API key: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(API_KEY_HEADER, key);
        headers.insert(ACCEPT, HeaderValue::from_static(EVENT_STREAM));
        Ok(headers)
    }

    /// Posts the conversation and returns the response once a 2xx status says
    /// a stream follows.
    pub async fn request_stream(&self, request: &ChatRequest<'_>) -> Result<Response, ChatError> {
        let response = self
            .client
            .post(&self.url)
            .headers(self.build_headers()?)
            .json(request)
            .send()
            .await
            .map_err(ChatError::from)?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ChatError::Authentication(
                "Invalid API key or unauthorized access".to_string(),
            )),
            StatusCode::TOO_MANY_REQUESTS => Err(ChatError::RateLimited(
                "Too many requests, try again later".to_string(),
            )),
            StatusCode::PAYMENT_REQUIRED => Err(ChatError::ApiError(
                "Payment required, add credits to continue".to_string(),
            )),
            status => {
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                Err(ChatError::ApiError(format!(
                    "Request failed with status {status}: {error_text}"
                )))
            }
        }
    }
}

#[async_trait]
impl ChatBackend for FunctionClient {
    async fn query_streaming(&self, messages: &[Message]) -> Result<BoxStream, ChatError> {
        debug!(
            "[FunctionClient] POST {url} with {count} messages",
            url = self.url,
            count = messages.len()
        );
        let response = self.request_stream(&ChatRequest { messages }).await?;
        let body = response
            .bytes_stream()
            .map_err(|e| ChatError::StreamError(format!("Response body failed: {e}")));
        let body = with_idle_timeout(body, self.idle_timeout);

        Ok(fragments(body).boxed())
    }
}
