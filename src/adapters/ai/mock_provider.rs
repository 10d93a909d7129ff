//! Mock AI provider for testing.
//!
//! Configurable mock implementation of the `AiProvider` port, allowing
//! tests to run without calling a real completion API.
//!
//! # Features
//!
//! - Pre-configured responses, consumed in order
//! - Simulated delays for timeout testing
//! - Error injection for resilience testing
//! - Call tracking for verification
//!
//! # Example
//!
//! ```ignore
//! let provider = MockAiProvider::new()
//!     .with_response(r#"{"intent": "power"}"#)
//!     .with_delay(Duration::from_millis(100));
//! ```

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::ports::{
    AiError, AiProvider, CompletionRequest, CompletionResponse, FinishReason, ProviderInfo,
};

/// A configured mock response.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Return a successful completion.
    Success {
        content: String,
        finish_reason: FinishReason,
    },
    /// Return an error.
    Error(MockError),
}

/// Mock error types for testing error handling.
#[derive(Debug, Clone)]
pub enum MockError {
    RateLimited { retry_after_secs: u32 },
    Unavailable { message: String },
    AuthenticationFailed,
    Network { message: String },
    Timeout { timeout_secs: u32 },
}

impl From<MockError> for AiError {
    fn from(err: MockError) -> Self {
        match err {
            MockError::RateLimited { retry_after_secs } => AiError::RateLimited { retry_after_secs },
            MockError::Unavailable { message } => AiError::unavailable(message),
            MockError::AuthenticationFailed => AiError::AuthenticationFailed,
            MockError::Network { message } => AiError::network(message),
            MockError::Timeout { timeout_secs } => AiError::Timeout { timeout_secs },
        }
    }
}

/// Mock completion provider.
///
/// Responses are consumed in configuration order; an exhausted queue is
/// reported as an unavailability error so a test that under-provisions
/// its fixture fails loudly instead of silently succeeding.
#[derive(Debug, Clone)]
pub struct MockAiProvider {
    responses: Arc<Mutex<VecDeque<MockResponse>>>,
    delay: Duration,
    calls: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl Default for MockAiProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAiProvider {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            delay: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queues a successful completion.
    pub fn with_response(self, content: impl Into<String>) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(MockResponse::Success {
                content: content.into(),
                finish_reason: FinishReason::Stop,
            });
        self
    }

    /// Queues an error.
    pub fn with_error(self, error: MockError) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(MockResponse::Error(error));
        self
    }

    /// Sets a simulated latency applied to every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Handle to the recorded calls, for verification.
    pub fn calls(&self) -> Arc<Mutex<Vec<CompletionRequest>>> {
        Arc::clone(&self.calls)
    }

    /// Number of completions requested so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl AiProvider for MockAiProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, AiError> {
        self.calls.lock().unwrap().push(request);

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        let next = self.responses.lock().unwrap().pop_front();
        match next {
            Some(MockResponse::Success {
                content,
                finish_reason,
            }) => Ok(CompletionResponse {
                content,
                model: "mock".to_string(),
                finish_reason,
            }),
            Some(MockResponse::Error(err)) => Err(err.into()),
            None => Err(AiError::unavailable("mock response queue is empty")),
        }
    }

    fn provider_info(&self) -> ProviderInfo {
        ProviderInfo::new("mock", "mock")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::ConversationId;
    use crate::ports::{MessageRole, RequestMetadata};

    fn test_request() -> CompletionRequest {
        CompletionRequest::new(RequestMetadata::new(
            ConversationId::new("X7K2M9").unwrap(),
            "trace",
        ))
        .with_message(MessageRole::User, "hello")
    }

    #[tokio::test]
    async fn responses_are_consumed_in_order() {
        let provider = MockAiProvider::new()
            .with_response("first")
            .with_response("second");

        assert_eq!(provider.complete(test_request()).await.unwrap().content, "first");
        assert_eq!(provider.complete(test_request()).await.unwrap().content, "second");
    }

    #[tokio::test]
    async fn exhausted_queue_errors_loudly() {
        let provider = MockAiProvider::new();
        let err = provider.complete(test_request()).await.unwrap_err();
        assert!(err.to_string().contains("queue is empty"));
    }

    #[tokio::test]
    async fn errors_are_injected() {
        let provider = MockAiProvider::new().with_error(MockError::AuthenticationFailed);
        let err = provider.complete(test_request()).await.unwrap_err();
        assert!(matches!(err, AiError::AuthenticationFailed));
    }

    #[tokio::test]
    async fn calls_are_recorded() {
        let provider = MockAiProvider::new().with_response("ok");
        provider.complete(test_request()).await.unwrap();

        assert_eq!(provider.call_count(), 1);
        let calls = provider.calls();
        let recorded = calls.lock().unwrap();
        assert_eq!(recorded[0].messages[0].content, "hello");
    }

    #[tokio::test]
    async fn delay_is_applied() {
        let provider = MockAiProvider::new()
            .with_response("slow")
            .with_delay(Duration::from_millis(30));

        let started = std::time::Instant::now();
        provider.complete(test_request()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(30));
    }
}
