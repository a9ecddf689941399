use std::collections::VecDeque;

use anyhow::anyhow;
use futures::stream::{self, Stream, StreamExt};
use tracing::debug;

use super::ChunkStream;

/// One decoded server-sent event from a streamed chat completion.
#[derive(Debug, PartialEq)]
pub enum StreamEvent {
    Delta(String),
    Done,
    Error(String),
}

/// Line-oriented SSE decoder. Chunks may split lines (and UTF-8 sequences)
/// anywhere; bytes are buffered until a full line is available.
#[derive(Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(event) = parse_line(&String::from_utf8_lossy(&line)) {
                events.push(event);
            }
        }
        events
    }

    /// Decode whatever is left once the byte stream has ended.
    pub fn flush(&mut self) -> Vec<StreamEvent> {
        let rest = std::mem::take(&mut self.buffer);
        parse_line(&String::from_utf8_lossy(&rest))
            .into_iter()
            .collect()
    }
}

fn parse_line(line: &str) -> Option<StreamEvent> {
    let line = line.trim_end_matches(['\r', '\n']);
    // Blank separators, `event:` fields and `:` keep-alive comments carry nothing.
    let payload = line.strip_prefix("data:")?.trim_start();

    if payload == "[DONE]" {
        return Some(StreamEvent::Done);
    }

    let json: serde_json::Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            debug!(error = %e, payload, "Skipping undecodable SSE payload");
            return None;
        }
    };

    if let Some(err) = json.get("error") {
        let msg = err["message"].as_str().unwrap_or("unknown error").to_string();
        return Some(StreamEvent::Error(msg));
    }

    json["choices"]
        .get(0)
        .and_then(|c| c["delta"]["content"].as_str())
        .filter(|s| !s.is_empty())
        .map(|s| StreamEvent::Delta(s.to_string()))
}

/// Turn a raw SSE byte stream into a stream of text deltas.
///
/// Ends at `[DONE]`. A transport error, an in-band error event, or bytes
/// running out before `[DONE]` becomes the final `Err` item.
pub fn text_chunks<S, B, E>(bytes: S) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    let state = (bytes.boxed(), SseDecoder::default(), VecDeque::new(), false);

    stream::unfold(
        state,
        |(mut bytes, mut decoder, mut pending, mut finished)| async move {
            loop {
                if let Some(item) = pending.pop_front() {
                    return Some((item, (bytes, decoder, pending, finished)));
                }
                if finished {
                    return None;
                }

                let (events, exhausted) = match bytes.next().await {
                    Some(Ok(chunk)) => (decoder.feed(chunk.as_ref()), false),
                    Some(Err(e)) => {
                        finished = true;
                        pending.push_back(Err(
                            anyhow::Error::new(e).context("LLM stream interrupted")
                        ));
                        continue;
                    }
                    None => (decoder.flush(), true),
                };

                for event in events {
                    match event {
                        StreamEvent::Delta(text) => pending.push_back(Ok(text)),
                        StreamEvent::Done => {
                            finished = true;
                            break;
                        }
                        StreamEvent::Error(msg) => {
                            finished = true;
                            pending.push_back(Err(anyhow!("LLM stream error: {}", msg)));
                            break;
                        }
                    }
                }

                if exhausted && !finished {
                    finished = true;
                    pending.push_back(Err(anyhow!("LLM stream ended before [DONE]")));
                }
            }
        },
    )
    .boxed()
}
