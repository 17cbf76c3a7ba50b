use crate::llm::LlmError;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// One round trip to the completion endpoint. The retry loop in
/// [`crate::llm::ModelClient`] lives above this seam so it can be exercised
/// without a network.
#[async_trait]
pub trait ModelTransport: Send + Sync {
    async fn send(&self, body: &Value) -> Result<Value, LlmError>;
}

pub struct HttpTransport {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl HttpTransport {
    pub fn new(api_url: String, api_key: String) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            api_url,
            api_key,
        })
    }
}

#[async_trait]
impl ModelTransport for HttpTransport {
    async fn send(&self, body: &Value) -> Result<Value, LlmError> {
        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(LlmError::ResponseError(format!(
                "API responded with status code: {} {}",
                status, error_body
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| LlmError::ResponseError(e.to_string()))
    }
}
