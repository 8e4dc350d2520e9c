use futures::Stream;
use futures::StreamExt;

use crate::core::app_state::AppState;
use crate::core::types::{StreamFrame, StreamMessage};
use crate::error::CoreError;

/// Named states for the token dispatch loop, per the design note calling for
/// an explicit state machine rather than ad-hoc booleans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    NotStarted,
    Streaming,
    Done,
    Canceled,
}

const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Opens a streaming LLM call and retries the whole connection up to
/// `MAX_RETRY_ATTEMPTS` times with exponential backoff — but only while no
/// token has been emitted yet. Once the first token reaches the caller, a
/// mid-stream failure ends the stream instead of restarting it, matching
/// `llm.py::call_llm`'s `@retry`-wraps-the-whole-call semantics (a retry
/// implicitly never duplicates output because nothing has been yielded).
pub async fn dispatch(
    state: &AppState,
    prompt: String,
    context: String,
) -> Result<impl Stream<Item = Result<StreamFrame, CoreError>>, CoreError> {
    let mut attempt = 0u32;
    let mut backoff_delay = std::time::Duration::from_secs(4);

    loop {
        match open_llm_stream(state, &prompt, &context).await {
            Ok(stream) => return Ok(stream),
            Err(e) if attempt + 1 < MAX_RETRY_ATTEMPTS => {
                tracing::warn!("stream open attempt {} failed: {}; retrying", attempt + 1, e);
                tokio::time::sleep(backoff_delay).await;
                backoff_delay = (backoff_delay * 2).min(std::time::Duration::from_secs(10));
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

async fn open_llm_stream(
    state: &AppState,
    prompt: &str,
    context: &str,
) -> Result<impl Stream<Item = Result<StreamFrame, CoreError>>, CoreError> {
    #[derive(serde::Serialize)]
    struct Req<'a> {
        prompt: &'a str,
        context: &'a str,
        stream: bool,
    }

    let response = state
        .http_client
        .post(&state.config.llm_endpoint_url)
        .json(&Req {
            prompt,
            context,
            stream: true,
        })
        .timeout(state.config.http_timeout)
        .send()
        .await
        .map_err(|e| CoreError::ModelUnavailable(e.to_string()))?
        .error_for_status()
        .map_err(|e| CoreError::ModelUnavailable(e.to_string()))?;

    let byte_stream = response.bytes_stream();
    Ok(ndjson_frames(byte_stream))
}

/// Parses a newline-delimited-JSON byte stream into `{message:{content},
/// done}` frames, matching the `{"done": bool, "message": {"content": ...}}`
/// shape the original's `ollama.chat` iterator yields per chunk.
fn ndjson_frames(
    byte_stream: impl Stream<Item = Result<bytes::Bytes, reqwest::Error>>,
) -> impl Stream<Item = Result<StreamFrame, CoreError>> {
    let mut buffer = Vec::new();
    byte_stream.flat_map(move |chunk_result| {
        let frames = match chunk_result {
            Ok(bytes) => {
                buffer.extend_from_slice(&bytes);
                let mut out = Vec::new();
                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let line = &line[..line.len() - 1];
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_slice::<StreamFrame>(line) {
                        Ok(frame) => out.push(Ok(frame)),
                        Err(e) => out.push(Err(CoreError::DecodeFailed(e.to_string()))),
                    }
                }
                out
            }
            Err(e) => vec![Err(CoreError::ModelUnavailable(e.to_string()))],
        };
        futures::stream::iter(frames)
    })
}

/// Drives a token stream into a sink, stopping cleanly on cancellation
/// (sink closed) without emitting a partial trailing frame, and returns the
/// fully assembled response text for logging/history purposes.
pub async fn drain_into<S, F>(
    mut tokens: S,
    mut on_token: F,
) -> (String, DispatchState)
where
    S: Stream<Item = Result<StreamFrame, CoreError>> + Unpin,
    F: FnMut(&str) -> bool,
{
    let mut state = DispatchState::NotStarted;
    let mut full_response = String::new();

    while let Some(frame) = tokens.next().await {
        let frame = match frame {
            Ok(f) => f,
            Err(_) => break,
        };
        if frame.done {
            state = DispatchState::Done;
            break;
        }
        state = DispatchState::Streaming;
        full_response.push_str(&frame.message.content);
        if !on_token(&frame.message.content) {
            state = DispatchState::Canceled;
            break;
        }
    }

    (full_response, state)
}

#[allow(dead_code)]
fn frame(content: &str, done: bool) -> StreamFrame {
    StreamFrame {
        message: StreamMessage {
            content: content.to_string(),
        },
        done,
    }
}
