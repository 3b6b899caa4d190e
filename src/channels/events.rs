//! Event protocol message types
//!
//! Inbound frames parse into [`ChannelEvent`]; outbound messages are
//! [`OutboundCommand`] values serialized to one JSON object per frame.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event type tag that updates the session transcript
pub const TRANSCRIPT_EVENT_TYPE: &str = "transcript";

/// Commands sent to the remote agent over the event channel
///
/// The wire shape is part of the interoperability contract and must not
/// change: `{"type":"response.create","response":{...}}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum OutboundCommand {
    /// Ask the agent to produce a response
    #[serde(rename = "response.create")]
    ResponseCreate {
        /// Response parameters
        response: ResponseSpec,
    },
}

/// Parameters for a `response.create` command
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseSpec {
    /// Requested response modalities
    pub modalities: Vec<String>,
    /// Instructions for the agent
    pub instructions: String,
}

impl OutboundCommand {
    /// Build a text-modality `response.create` command
    pub fn text_response(instructions: impl Into<String>) -> Self {
        OutboundCommand::ResponseCreate {
            response: ResponseSpec {
                modalities: vec!["text".to_string()],
                instructions: instructions.into(),
            },
        }
    }

    /// Serialize to a single wire frame
    pub fn to_frame(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| Error::SerializationError(format!("failed to encode command: {}", e)))
    }
}

/// A parsed inbound protocol frame
///
/// Ephemeral: dispatched once in arrival order, never stored. The raw JSON
/// is retained so events without a `text` field can be forwarded verbatim.
#[derive(Debug, Clone)]
pub struct ChannelEvent {
    kind: String,
    text: Option<String>,
    raw: Value,
}

impl ChannelEvent {
    /// Parse a wire frame
    ///
    /// A missing `type` is tolerated (the event is forwarded but never
    /// treated as a transcript update); invalid JSON is an error and the
    /// frame is dropped by the dispatcher.
    pub fn parse(frame: &str) -> Result<Self> {
        let raw: Value = serde_json::from_str(frame)
            .map_err(|e| Error::SerializationError(format!("malformed event frame: {}", e)))?;

        let kind = raw
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let text = raw
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_owned);

        Ok(Self { kind, text, raw })
    }

    /// The `type` discriminator (empty when absent)
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// The `text` field, when present
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Check if this event updates the transcript
    pub fn is_transcript(&self) -> bool {
        self.kind == TRANSCRIPT_EVENT_TYPE
    }

    /// Text forwarded to the message callback
    ///
    /// The event's `text` field if present, otherwise the raw serialized
    /// event.
    pub fn display_text(&self) -> String {
        match &self.text {
            Some(text) => text.clone(),
            None => self.raw.to_string(),
        }
    }
}
