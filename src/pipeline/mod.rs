pub mod extract;
pub mod summarize;

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use futures::StreamExt;
use thiserror::Error;
use tracing::debug;

use crate::catalog::PromptKind;
use crate::llm::{ChatBackend, ChunkStream};

/// One LLM call within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// 1-based analyzer slot.
    Analyzer(usize),
    Consensus,
    Extraction,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Step::Analyzer(slot) => write!(f, "analyzer {}", slot),
            Step::Consensus => write!(f, "consensus"),
            Step::Extraction => write!(f, "extraction"),
        }
    }
}

/// Failures that abort a run. Nothing is retried.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no prompts configured for the {0} slot")]
    NoPrompts(PromptKind),

    #[error("no {kind} prompt named '{name}'")]
    UnknownPrompt { kind: PromptKind, name: String },

    #[error("{step} call failed: {message}")]
    Completion { step: Step, message: String },

    #[error("{step} call timed out after {secs}s")]
    Timeout { step: Step, secs: u64 },

    #[error("could not parse extracted events: {0}")]
    ExtractionParse(String),
}

/// Receives streamed text as it arrives.
pub trait ChunkSink: Send {
    fn on_chunk(&mut self, chunk: &str) -> impl Future<Output = ()> + Send;

    /// Called once the stream has been fully drained.
    fn on_end(&mut self) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// Short content hash used to correlate the log lines of one run.
pub fn fingerprint(report: &str) -> String {
    let hash = blake3::hash(report.as_bytes()).to_hex();
    hash.as_str()[..12].to_string()
}

/// Forward every chunk to `sink` and return the accumulated text.
pub async fn drain<S: ChunkSink>(mut chunks: ChunkStream, sink: &mut S) -> Result<String> {
    let mut text = String::new();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        text.push_str(&chunk);
        sink.on_chunk(&chunk).await;
    }
    sink.on_end().await;
    Ok(text)
}

/// Run one streamed completion into `sink`, bounded by `limit`.
pub async fn stream_step<B: ChatBackend, S: ChunkSink>(
    backend: &B,
    step: Step,
    prompt: &str,
    sink: &mut S,
    limit: Duration,
) -> Result<String, PipelineError> {
    debug!(%step, prompt_len = prompt.len(), "Streaming step started");

    let call = async {
        let chunks = backend.stream(prompt).await?;
        drain(chunks, sink).await
    };

    match tokio::time::timeout(limit, call).await {
        Ok(Ok(text)) => {
            debug!(%step, output_len = text.len(), "Streaming step drained");
            Ok(text)
        }
        Ok(Err(e)) => Err(PipelineError::Completion {
            step,
            message: format!("{:#}", e),
        }),
        Err(_) => Err(PipelineError::Timeout {
            step,
            secs: limit.as_secs(),
        }),
    }
}

/// Run one non-streamed completion, bounded by `limit`.
pub async fn complete_step<B: ChatBackend>(
    backend: &B,
    step: Step,
    prompt: &str,
    temperature: Option<f32>,
    limit: Duration,
) -> Result<String, PipelineError> {
    match tokio::time::timeout(limit, backend.complete(prompt, temperature)).await {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(PipelineError::Completion {
            step,
            message: format!("{:#}", e),
        }),
        Err(_) => Err(PipelineError::Timeout {
            step,
            secs: limit.as_secs(),
        }),
    }
}
