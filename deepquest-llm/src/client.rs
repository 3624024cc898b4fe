//! Completion client contract and the rate-limited decorator

use crate::streaming::CompletionChunk;
use async_trait::async_trait;
use deepquest_core::{DeepquestError, RateLimiter};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

/// Error type for the LLM layer
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type LlmResult<T> = Result<T, LlmError>;

impl From<LlmError> for DeepquestError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Config(message) => DeepquestError::config(message, "llm"),
            other => DeepquestError::reasoning(other.to_string(), "llm"),
        }
    }
}

/// Which of the two configured model ids a call should use.
///
/// `Fast` is the low-latency model for classification, decomposition and
/// leaf solves; `Deep` is the high-capability model for aggregation and
/// report expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    Fast,
    Deep,
}

/// Message role within a completion request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
}

/// A single prompt message
#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A completion request
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub model: ModelRole,
}

impl CompletionRequest {
    pub fn new(messages: Vec<Message>, model: ModelRole) -> Self {
        Self { messages, model }
    }

    /// System + user prompt pair, the shape every deepquest call uses
    pub fn prompted(system: impl Into<String>, user: impl Into<String>, model: ModelRole) -> Self {
        Self::new(vec![Message::system(system), Message::user(user)], model)
    }
}

/// A finished completion
#[derive(Debug, Clone)]
pub struct Completion {
    /// Visible answer text
    pub content: String,
    /// Reasoning trace, for models that expose one
    pub reasoning: Option<String>,
}

/// Ordered incremental chunks of an in-flight completion
pub type ChunkStream = BoxStream<'static, LlmResult<CompletionChunk>>;

/// Unified client for chat completions
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Run a completion to the end and return the folded result
    async fn complete(&self, request: CompletionRequest) -> LlmResult<Completion>;

    /// Run a completion as an ordered chunk stream. Dropping the stream
    /// abandons the call; no other state is touched.
    async fn complete_stream(&self, request: CompletionRequest) -> LlmResult<ChunkStream>;
}

/// Turn a finished completion into a chunk stream.
///
/// Used by backends that do not expose incremental deltas and by tests;
/// the reasoning trace arrives before the visible answer, matching how
/// reasoning models stream.
pub fn chunks_from_completion(completion: Completion) -> ChunkStream {
    let mut chunks = Vec::new();
    if let Some(reasoning) = completion.reasoning {
        chunks.push(Ok(CompletionChunk::reasoning(reasoning)));
    }
    chunks.push(Ok(CompletionChunk::answer(completion.content)));
    futures::stream::iter(chunks).boxed()
}

/// Decorator that pushes every call through the run's [`RateLimiter`],
/// capping simultaneous in-flight calls. For streams, the permit is held
/// until the stream is exhausted or dropped.
pub struct ThrottledClient {
    inner: Arc<dyn CompletionClient>,
    limiter: Arc<RateLimiter>,
}

impl ThrottledClient {
    pub fn new(inner: Arc<dyn CompletionClient>, limiter: Arc<RateLimiter>) -> Self {
        Self { inner, limiter }
    }
}

#[async_trait]
impl CompletionClient for ThrottledClient {
    async fn complete(&self, request: CompletionRequest) -> LlmResult<Completion> {
        let _guard = self
            .limiter
            .acquire()
            .await
            .map_err(|e| LlmError::Internal(e.to_string()))?;
        self.inner.complete(request).await
    }

    async fn complete_stream(&self, request: CompletionRequest) -> LlmResult<ChunkStream> {
        let guard = self
            .limiter
            .acquire()
            .await
            .map_err(|e| LlmError::Internal(e.to_string()))?;
        let inner = self.inner.complete_stream(request).await?;
        Ok(GuardedStream {
            inner,
            _guard: guard,
        }
        .boxed())
    }
}

/// Stream wrapper that keeps a rate-limit permit alive for the stream's
/// whole lifetime
struct GuardedStream {
    inner: ChunkStream,
    _guard: deepquest_core::RateLimitGuard,
}

impl futures::Stream for GuardedStream {
    type Item = LlmResult<CompletionChunk>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().inner.poll_next_unpin(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collect_stream;

    struct EchoClient;

    #[async_trait]
    impl CompletionClient for EchoClient {
        async fn complete(&self, request: CompletionRequest) -> LlmResult<Completion> {
            let user = request
                .messages
                .iter()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.clone())
                .unwrap_or_default();
            Ok(Completion {
                content: user,
                reasoning: Some("thinking".to_string()),
            })
        }

        async fn complete_stream(&self, request: CompletionRequest) -> LlmResult<ChunkStream> {
            Ok(chunks_from_completion(self.complete(request).await?))
        }
    }

    #[tokio::test]
    async fn throttled_client_forwards_calls() {
        let limiter = Arc::new(RateLimiter::new(1, 0));
        let client = ThrottledClient::new(Arc::new(EchoClient), limiter);

        let request = CompletionRequest::prompted("sys", "hello", ModelRole::Fast);
        let completion = client.complete(request.clone()).await.unwrap();
        assert_eq!(completion.content, "hello");

        let stream = client.complete_stream(request).await.unwrap();
        let folded = collect_stream(stream, |_| {}).await.unwrap();
        assert_eq!(folded.content, "hello");
        assert_eq!(folded.reasoning.as_deref(), Some("thinking"));
    }
}
