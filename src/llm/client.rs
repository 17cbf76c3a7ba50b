use crate::config::LlmConfig;
use crate::llm::LlmError;
use crate::llm::transport::{HttpTransport, ModelTransport};
use crate::util::debug_log::DebugLog;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, warn};

/// Reply for an empty or whitespace-only prompt. Returned before any
/// transport call is made.
pub const EMPTY_PROMPT_REPLY: &str = "[error] empty prompt: nothing to send to the model";

/// Reply when the endpoint answered but the parsed content was blank.
pub const EMPTY_CONTENT_REPLY: &str = "[error] the model returned empty content";

/// The distinct ways of shaping the outbound request body. Some upstream
/// gateways accept a chat-style message list, others only a bare prompt
/// field; every retry attempt walks this list in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestVariant {
    Messages,
    BarePrompt,
}

impl RequestVariant {
    pub const ORDERED: [RequestVariant; 2] = [RequestVariant::Messages, RequestVariant::BarePrompt];

    pub fn label(&self) -> &'static str {
        match self {
            RequestVariant::Messages => "messages",
            RequestVariant::BarePrompt => "prompt",
        }
    }

    pub fn request_body(&self, model: &str, temperature: f32, prompt: &str) -> Value {
        match self {
            RequestVariant::Messages => json!({
                "model": model,
                "temperature": temperature,
                "messages": [{ "role": "user", "content": prompt }],
            }),
            RequestVariant::BarePrompt => json!({
                "model": model,
                "temperature": temperature,
                "prompt": prompt,
            }),
        }
    }
}

/// Extracts the completion text from a response of unknown shape.
///
/// Precedence: `output.choices[0].message.content`, then `output.text`,
/// then a top-level `text` field. Anything else counts as no content.
fn extract_content(response: &Value) -> Option<String> {
    for pointer in ["/output/choices/0/message/content", "/output/text", "/text"] {
        if let Some(text) = response.pointer(pointer).and_then(Value::as_str) {
            if !text.is_empty() {
                return Some(text.to_string());
            }
        }
    }
    None
}

fn response_keys(response: &Value) -> Vec<String> {
    response
        .as_object()
        .map(|obj| obj.keys().cloned().collect())
        .unwrap_or_default()
}

/// Client for the remote text-completion endpoint.
///
/// `complete` never returns an error: terminal failures come back as a
/// designated failure string so a broken upstream degrades into a visible
/// chat reply instead of a fault.
pub struct ModelClient {
    transport: Box<dyn ModelTransport>,
    model: String,
    temperature: f32,
    max_retries: u32,
    debug_log: DebugLog,
}

impl ModelClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_url = config.api_url.clone().ok_or_else(|| {
            LlmError::ConfigError("API URL is required for the model client".to_string())
        })?;
        let api_key = config.api_key.clone().ok_or_else(|| {
            LlmError::ConfigError("API key is required for the model client".to_string())
        })?;

        let transport = HttpTransport::new(api_url, api_key.clone())?;
        let client = Self::with_transport(Box::new(transport), config);

        if !api_key.is_ascii() {
            client.debug_log.append(
                "WARNING non-ascii api key detected; authorization header encoding may fail",
            );
        }

        Ok(client)
    }

    /// Builds a client over an arbitrary transport. Production code goes
    /// through [`ModelClient::new`]; tests supply scripted transports.
    pub fn with_transport(transport: Box<dyn ModelTransport>, config: &LlmConfig) -> Self {
        Self {
            transport,
            model: config.model.clone(),
            temperature: config.temperature,
            max_retries: config.max_retries,
            debug_log: DebugLog::new(&config.debug_log),
        }
    }

    /// Sends `prompt` to the completion endpoint, retrying every request
    /// variant up to the configured budget. Total underlying attempts are
    /// `max_retries * RequestVariant::ORDERED.len()`.
    pub async fn complete(&self, prompt: &str) -> String {
        if prompt.trim().is_empty() {
            error!("model call skipped: empty prompt");
            return EMPTY_PROMPT_REPLY.to_string();
        }

        let mut last_error = String::from("no attempt recorded");
        for attempt in 1..=self.max_retries {
            for variant in RequestVariant::ORDERED {
                let body = variant.request_body(&self.model, self.temperature, prompt);
                match self.transport.send(&body).await {
                    Ok(response) => match extract_content(&response) {
                        Some(content) => {
                            let trimmed = content.trim();
                            if trimmed.is_empty() {
                                warn!("model returned blank content");
                                return EMPTY_CONTENT_REPLY.to_string();
                            }
                            return trimmed.to_string();
                        }
                        None => {
                            let keys = response_keys(&response);
                            warn!(
                                "attempt {} variant={} parsed no content; response keys: {:?}",
                                attempt,
                                variant.label(),
                                keys
                            );
                            self.debug_log.append(&format!(
                                "NO_CONTENT variant={} attempt={} resp_keys={:?}",
                                variant.label(),
                                attempt,
                                keys
                            ));
                            last_error = format!("no content parsed (variant={})", variant.label());
                        }
                    },
                    Err(e) => {
                        error!("model call failed (variant={}): {}", variant.label(), e);
                        self.debug_log.append(&format!(
                            "EXCEPTION variant={} attempt={} err={}",
                            variant.label(),
                            attempt,
                            e
                        ));
                        last_error = e.to_string();
                    }
                }
            }
        }

        self.debug_log.append(&format!(
            "FAIL_ALL attempts={} last={}",
            self.max_retries, last_error
        ));
        format!(
            "[failed] no usable model response after {} retries: {} (details in {})",
            self.max_retries,
            last_error,
            self.debug_log.path().display()
        )
    }

    /// Runs `complete` on the runtime without blocking the caller. The
    /// client holds no mutable state, so the spawned task shares it as-is.
    pub fn complete_detached(self: &Arc<Self>, prompt: String) -> JoinHandle<String> {
        let client = Arc::clone(self);
        tokio::spawn(async move { client.complete(&prompt).await })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) fn test_llm_config(dir: &std::path::Path) -> LlmConfig {
        LlmConfig {
            api_url: None,
            api_key: None,
            model: "test-model".to_string(),
            temperature: 0.2,
            max_retries: 3,
            debug_log: dir.join("model_debug.log").to_string_lossy().into_owned(),
        }
    }

    /// Transport that always fails, counting how often it was called.
    pub(crate) struct FailingTransport {
        pub calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ModelTransport for FailingTransport {
        async fn send(&self, _body: &Value) -> Result<Value, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(LlmError::ConnectionError("connection refused".to_string()))
        }
    }

    /// Transport that replays a queue of canned responses.
    pub(crate) struct ScriptedTransport {
        pub calls: Arc<AtomicUsize>,
        pub responses: Mutex<VecDeque<Value>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(responses: Vec<Value>) -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                responses: Mutex::new(responses.into()),
            }
        }
    }

    #[async_trait]
    impl ModelTransport for ScriptedTransport {
        async fn send(&self, _body: &Value) -> Result<Value, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| LlmError::ResponseError("script exhausted".to_string()))
        }
    }

    fn client_with(transport: Box<dyn ModelTransport>, dir: &std::path::Path) -> ModelClient {
        ModelClient::with_transport(transport, &test_llm_config(dir))
    }

    #[tokio::test]
    async fn empty_prompt_is_refused_without_a_call() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let client = client_with(
            Box::new(FailingTransport {
                calls: Arc::clone(&calls),
            }),
            dir.path(),
        );

        assert_eq!(client.complete("").await, EMPTY_PROMPT_REPLY);
        assert_eq!(client.complete("   \n\t").await, EMPTY_PROMPT_REPLY);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn exhaustion_uses_budget_times_variant_count() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let client = client_with(
            Box::new(FailingTransport {
                calls: Arc::clone(&calls),
            }),
            dir.path(),
        );

        let reply = client.complete("how many orders shipped?").await;
        assert_eq!(calls.load(Ordering::SeqCst), 6);
        assert!(reply.starts_with("[failed]"));
        assert!(reply.contains("after 3 retries"));
        assert!(reply.contains("model_debug.log"));
    }

    #[tokio::test]
    async fn parse_precedence_prefers_structured_choice() {
        let nested = json!({
            "output": {
                "choices": [{ "message": { "content": "from choices" } }],
                "text": "from output text",
            },
            "text": "from top level",
        });
        assert_eq!(extract_content(&nested).as_deref(), Some("from choices"));

        let output_text = json!({ "output": { "text": "from output text" }, "text": "x" });
        assert_eq!(
            extract_content(&output_text).as_deref(),
            Some("from output text")
        );

        let bare = json!({ "text": "from top level" });
        assert_eq!(extract_content(&bare).as_deref(), Some("from top level"));

        assert_eq!(extract_content(&json!({ "unrelated": 1 })), None);
        assert_eq!(extract_content(&json!("not an object")), None);
    }

    #[tokio::test]
    async fn blank_content_short_circuits() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new(vec![json!({ "text": "   " })]);
        let calls = Arc::clone(&transport.calls);
        let client = client_with(Box::new(transport), dir.path());

        assert_eq!(client.complete("hello").await, EMPTY_CONTENT_REPLY);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unparseable_then_good_response_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new(vec![
            json!({ "status": "accepted" }),
            json!({ "output": { "text": "recovered" } }),
        ]);
        let client = client_with(Box::new(transport), dir.path());

        assert_eq!(client.complete("hello").await, "recovered");

        let log = std::fs::read_to_string(dir.path().join("model_debug.log")).unwrap();
        assert!(log.contains("NO_CONTENT variant=messages attempt=1"));
    }

    #[tokio::test]
    async fn detached_completion_runs_the_same_logic() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new(vec![json!({ "text": "detached reply" })]);
        let client = Arc::new(client_with(Box::new(transport), dir.path()));

        let handle = client.complete_detached("hello".to_string());
        assert_eq!(handle.await.unwrap(), "detached reply");
    }

    #[test]
    fn variant_bodies_differ_in_shape() {
        let messages = RequestVariant::Messages.request_body("m", 0.2, "p");
        assert!(messages.get("messages").is_some());
        assert!(messages.get("prompt").is_none());

        let bare = RequestVariant::BarePrompt.request_body("m", 0.2, "p");
        assert!(bare.get("prompt").is_some());
        assert!(bare.get("messages").is_none());
    }
}
