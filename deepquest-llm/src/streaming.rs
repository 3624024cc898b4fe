//! Streaming chunk types and the demultiplex loop
//!
//! A streamed completion interleaves two channels: the visible answer and
//! an optional reasoning trace. [`collect_stream`] folds a chunk stream
//! into the two accumulators while forwarding each chunk to a callback so
//! callers can surface progress as data arrives. The accumulators are
//! owned by the loop, so cancelling a stream (dropping the future) cannot
//! corrupt state used elsewhere.

use crate::client::{ChunkStream, Completion, LlmResult};
use futures::StreamExt;

/// One incremental piece of a streamed completion
#[derive(Debug, Clone, Default)]
pub struct CompletionChunk {
    /// Appended to the visible answer
    pub answer_delta: Option<String>,
    /// Appended to the reasoning trace
    pub reasoning_delta: Option<String>,
}

impl CompletionChunk {
    pub fn answer(delta: impl Into<String>) -> Self {
        Self {
            answer_delta: Some(delta.into()),
            reasoning_delta: None,
        }
    }

    pub fn reasoning(delta: impl Into<String>) -> Self {
        Self {
            answer_delta: None,
            reasoning_delta: Some(delta.into()),
        }
    }
}

/// Consume a chunk stream to completion, demultiplexing answer and
/// reasoning deltas.
///
/// `on_chunk` is invoked for every chunk in arrival order. A stream error
/// aborts the fold and discards the partial accumulators.
pub async fn collect_stream<F>(mut stream: ChunkStream, mut on_chunk: F) -> LlmResult<Completion>
where
    F: FnMut(&CompletionChunk),
{
    let mut content = String::new();
    let mut reasoning = String::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if let Some(delta) = &chunk.answer_delta {
            content.push_str(delta);
        }
        if let Some(delta) = &chunk.reasoning_delta {
            reasoning.push_str(delta);
        }
        on_chunk(&chunk);
    }

    Ok(Completion {
        content,
        reasoning: if reasoning.is_empty() {
            None
        } else {
            Some(reasoning)
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::LlmError;

    #[tokio::test]
    async fn demux_splits_answer_and_reasoning() {
        let chunks = vec![
            Ok(CompletionChunk::reasoning("let me think")),
            Ok(CompletionChunk::answer("the answer ")),
            Ok(CompletionChunk::answer("is 4")),
        ];
        let stream: ChunkStream = futures::stream::iter(chunks).boxed();

        let mut seen = 0;
        let completion = collect_stream(stream, |_| seen += 1).await.unwrap();

        assert_eq!(seen, 3);
        assert_eq!(completion.content, "the answer is 4");
        assert_eq!(completion.reasoning.as_deref(), Some("let me think"));
    }

    #[tokio::test]
    async fn stream_error_aborts_fold() {
        let chunks = vec![
            Ok(CompletionChunk::answer("partial")),
            Err(LlmError::Stream("connection reset".to_string())),
        ];
        let stream: ChunkStream = futures::stream::iter(chunks).boxed();

        let result = collect_stream(stream, |_| {}).await;
        assert!(matches!(result, Err(LlmError::Stream(_))));
    }

    #[tokio::test]
    async fn empty_reasoning_folds_to_none() {
        let chunks = vec![Ok(CompletionChunk::answer("only content"))];
        let stream: ChunkStream = futures::stream::iter(chunks).boxed();

        let completion = collect_stream(stream, |_| {}).await.unwrap();
        assert!(completion.reasoning.is_none());
    }
}
