//! Event-tagged line dialect shared by the Anthropic and OpenAI streams.
//!
//! Both providers frame units as `data: <json>` lines. The dialect of each
//! unit is decided by inspecting its discriminator:
//! - `"type"` for Anthropic events (`message_start`, `content_block_delta`, ...)
//! - `"object": "chat.completion.chunk"` for OpenAI chat-completion deltas
//!
//! Each variant of [`StreamUnit`] owns its parse and usage rules, so a new
//! event kind is one more variant.

use crate::error::Error;
use crate::sse::{data_payload, is_done};
use crate::stream::{Step, UnitDecoder};
use crate::types::Usage;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

/// One classified stream unit.
#[derive(Debug)]
pub enum StreamUnit {
    /// OpenAI `chat.completion.chunk`.
    ChatCompletionDelta(ChatChunk),
    /// Anthropic `content_block_delta`.
    ContentBlockDelta(ContentBlockDelta),
    /// Anthropic `message_start`.
    MessageStart(MessageStart),
    /// Anthropic `message_delta`.
    MessageDelta(MessageDelta),
    /// Error object reported in place of a unit.
    Error(VendorError),
    /// Well-formed unit with no text or usage (ping, content_block_start, ...).
    Other,
}

impl StreamUnit {
    /// Classify a `data:` payload. Returns `None` for anything that is not
    /// valid JSON or does not match the shape its tag promises.
    pub fn classify(payload: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(payload).ok()?;

        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .or_else(|| value.get("object").and_then(Value::as_str));

        let unit = match tag {
            Some("chat.completion.chunk") => {
                StreamUnit::ChatCompletionDelta(serde_json::from_value(value).ok()?)
            }
            Some("content_block_delta") => {
                StreamUnit::ContentBlockDelta(serde_json::from_value(value).ok()?)
            }
            Some("message_start") => StreamUnit::MessageStart(serde_json::from_value(value).ok()?),
            Some("message_delta") => StreamUnit::MessageDelta(serde_json::from_value(value).ok()?),
            Some("error") => StreamUnit::Error(serde_json::from_value(value).ok()?),
            // Untagged error envelope
            None if value.get("error").is_some() => {
                StreamUnit::Error(serde_json::from_value(value).ok()?)
            }
            // Some OpenAI-compatible servers omit `object`
            None if value.get("choices").is_some() => {
                StreamUnit::ChatCompletionDelta(serde_json::from_value(value).ok()?)
            }
            _ => StreamUnit::Other,
        };
        Some(unit)
    }

    /// Add this unit's token counts to `usage` and return its text step.
    pub fn apply(self, usage: &mut Usage) -> Result<Step, Error> {
        match self {
            StreamUnit::ChatCompletionDelta(chunk) => {
                if let Some(u) = chunk.usage {
                    usage.add_input(u.prompt_tokens);
                    usage.add_output(u.completion_tokens);
                }
                let text = chunk
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|c| c.delta.content)
                    .unwrap_or_default();
                Ok(Step::text(text))
            }
            StreamUnit::ContentBlockDelta(event) => {
                Ok(Step::text(event.delta.text.unwrap_or_default()))
            }
            StreamUnit::MessageStart(event) => {
                usage.add_input(event.message.usage.input_tokens);
                Ok(Step::Continue)
            }
            StreamUnit::MessageDelta(event) => {
                usage.add_output(event.usage.output_tokens);
                Ok(Step::Continue)
            }
            StreamUnit::Error(err) => Err(Error::Vendor(err.error.to_string())),
            StreamUnit::Other => Ok(Step::Continue),
        }
    }
}

/// Decoder for `data:`-framed event lines.
#[derive(Debug, Default)]
pub struct EventLineDecoder {
    chat_units: usize,
    chat_usage_seen: bool,
}

impl EventLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when chat-completion deltas arrived but none carried usage.
    pub fn usage_missing(&self) -> bool {
        self.chat_units > 0 && !self.chat_usage_seen
    }
}

impl UnitDecoder for EventLineDecoder {
    fn decode_line(&mut self, line: &str, usage: &mut Usage) -> Result<Step, Error> {
        let line = line.trim_end();
        // `event:` lines, comments and blank keep-alives carry nothing
        let Some(payload) = data_payload(line) else {
            return Ok(Step::Continue);
        };
        if is_done(payload) {
            return Ok(Step::Stop);
        }

        let Some(unit) = StreamUnit::classify(payload) else {
            return Ok(Step::Skip);
        };
        if let StreamUnit::ChatCompletionDelta(chunk) = &unit {
            self.chat_units += 1;
            self.chat_usage_seen |= chunk.usage.is_some();
        }
        unit.apply(usage)
    }

    fn finish(&mut self, usage: &Usage) {
        if self.usage_missing() {
            warn!(
                units = self.chat_units,
                output_tokens = usage.output_tokens,
                "chat-completion stream ended without a usage unit; token counts are incomplete"
            );
        }
    }
}

// --- Serde types for the event-line dialect ---

#[derive(Debug, Deserialize)]
pub struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    delta: ChatDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChatDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlockDelta {
    delta: BlockDelta,
}

#[derive(Debug, Deserialize)]
struct BlockDelta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MessageStart {
    message: StartMessage,
}

#[derive(Debug, Deserialize)]
struct StartMessage {
    #[serde(default)]
    usage: InputUsage,
}

#[derive(Debug, Default, Deserialize)]
struct InputUsage {
    #[serde(default)]
    input_tokens: u64,
}

#[derive(Debug, Deserialize)]
pub struct MessageDelta {
    #[serde(default)]
    usage: OutputUsage,
}

#[derive(Debug, Default, Deserialize)]
struct OutputUsage {
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
pub struct VendorError {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl std::fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = self.message.as_deref().unwrap_or("no message");
        match &self.kind {
            Some(kind) => write!(f, "{kind}: {message}"),
            None => f.write_str(message),
        }
    }
}
