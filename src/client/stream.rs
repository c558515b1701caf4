use serde::Deserialize;
use serde_json::Value;

use super::hub::{StreamError, StreamEvent};
use crate::conversation::FunctionCall;

pub(crate) const DATA_PREFIX: &str = "data:";
pub(crate) const DONE_SENTINEL: &str = "[DONE]";

/// Assembles arbitrary byte chunks into complete lines.
///
/// A partial trailing line is kept until the next chunk (or end of stream)
/// completes it.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every line it completed.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, StreamError> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();

        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.ends_with(b"\r") {
                line.pop();
            }
            out.push(decode_line(line)?);
        }

        Ok(out)
    }

    /// The unterminated final line, if the stream ended without a newline.
    pub(crate) fn take_remainder(&mut self) -> Result<Option<String>, StreamError> {
        if self.buf.is_empty() {
            return Ok(None);
        }
        let mut line = std::mem::take(&mut self.buf);
        if line.ends_with(b"\r") {
            line.pop();
        }
        decode_line(line).map(Some)
    }
}

fn decode_line(line: Vec<u8>) -> Result<String, StreamError> {
    String::from_utf8(line).map_err(|e| StreamError::Protocol(format!("line is not valid UTF-8: {e}")))
}

/// What one line of the response contributed.
#[derive(Debug, PartialEq)]
pub(crate) enum LineOutcome {
    /// Keep-alive, event-type or other non-data line.
    Ignored,
    /// The done-sentinel: stop reading, the run completed normally.
    Done,
    Events(Vec<StreamEvent>),
}

/// Parse one line of the SSE body.
///
/// Data payloads are decoded as chat-completion chunks; the first choice's
/// delta yields up to one content event and up to two function-call
/// fragments. Malformed JSON is fatal for the whole stream.
pub(crate) fn parse_line(line: &str) -> Result<LineOutcome, StreamError> {
    let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
        return Ok(LineOutcome::Ignored);
    };
    let payload = payload.trim();

    if payload == DONE_SENTINEL {
        return Ok(LineOutcome::Done);
    }

    let chunk: ChunkPayload = serde_json::from_str(payload)
        .map_err(|e| StreamError::Protocol(format!("malformed data line: {e}")))?;
    let choice = chunk
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| StreamError::Protocol("data line has no choices".to_string()))?;

    let mut events = Vec::new();

    if let Some(text) = choice.delta.content {
        // The upstream encoder renders JSON null as the string "null";
        // such deltas carry no text and are dropped.
        if text != "null" {
            events.push(StreamEvent::Content(text));
        }
    }

    if let Some(call) = choice.delta.function_call {
        if let Some(name) = call.name {
            events.push(StreamEvent::FunctionCall(function_call_preamble(&name)));
        }
        if let Some(arguments) = call.arguments {
            events.push(StreamEvent::FunctionCall(arguments));
        }
    }

    Ok(LineOutcome::Events(events))
}

/// Opening fragment of the function-call JSON, emitted once the name is known.
/// Argument fragments concatenate directly after it.
fn function_call_preamble(name: &str) -> String {
    format!("\"function_call\" : {{ \n \"name\": \"{name}\",\n \"arguments\" :")
}

#[derive(Debug, Deserialize)]
struct ChunkPayload {
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    function_call: Option<FunctionCallDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionCallDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Subscriber-side reconstruction of a fragmented function call.
///
/// Fragments are concatenated in arrival order; nothing is parsed until the
/// stream has completed and [`finish`](FunctionCallAccumulator::finish) is
/// called. The wire fragments never include the closing braces, so `finish`
/// supplies them.
#[derive(Debug, Default)]
pub struct FunctionCallAccumulator {
    raw: String,
}

impl FunctionCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: &str) {
        self.raw.push_str(fragment);
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Parse the accumulated fragments, or None if nothing arrived.
    pub fn finish(self) -> Result<Option<FunctionCall>, StreamError> {
        if self.raw.is_empty() {
            return Ok(None);
        }

        let mut wrapped = String::with_capacity(self.raw.len() + 3);
        wrapped.push('{');
        wrapped.push_str(&self.raw);
        wrapped.push_str("}}");

        let value: Value = serde_json::from_str(&wrapped)
            .map_err(|e| StreamError::Protocol(format!("incomplete function call: {e}")))?;
        let call = value
            .get("function_call")
            .ok_or_else(|| StreamError::Protocol("missing function_call object".to_string()))?;

        let name = call
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| StreamError::Protocol("function call has no name".to_string()))?
            .to_string();
        let arguments = match call.get("arguments") {
            Some(Value::Object(map)) => map.clone(),
            Some(other) => {
                return Err(StreamError::Protocol(format!(
                    "function call arguments are not an object: {other}"
                )))
            }
            None => serde_json::Map::new(),
        };

        Ok(Some(FunctionCall { name, arguments }))
    }
}
