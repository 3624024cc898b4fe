//! Deepquest LLM - chat-completion client interface
//!
//! The unified chat-completion service is an external collaborator; this
//! crate pins down its contract: a [`CompletionClient`] that answers with
//! separate visible content and reasoning trace, in one shot or as a chunk
//! stream. A siumai-backed default implementation and a rate-limited
//! decorator are provided, plus helpers for digging structured JSON out of
//! model text.

pub mod client;
pub mod json_util;
pub mod siumai_client;
pub mod streaming;

pub use client::{
    chunks_from_completion, ChunkStream, Completion, CompletionClient, CompletionRequest,
    LlmError, LlmResult, Message, ModelRole, Role, ThrottledClient,
};
pub use json_util::{extract_json, parse_json_lenient};
pub use siumai_client::SiumaiClient;
pub use streaming::{collect_stream, CompletionChunk};
