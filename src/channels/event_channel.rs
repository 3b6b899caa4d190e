//! Event channel protocol layer
//!
//! Encodes outbound commands and dispatches inbound frames. The protocol is
//! message-oriented and request/response-agnostic: no correlation IDs, no
//! deduplication, FIFO dispatch to the single registered callback.

use super::events::{ChannelEvent, OutboundCommand};
use crate::transport::EventChannelTransport;
use crate::{Error, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Callback slot for textual message forwarding
pub type MessageCallback = Arc<dyn Fn(String) + Send + Sync>;

/// JSON event protocol over one message channel
pub struct EventChannel {
    transport: Arc<dyn EventChannelTransport>,
}

impl EventChannel {
    /// Wire the protocol onto a message channel
    ///
    /// Registers the inbound dispatcher: transcript-tagged events update
    /// `transcript`, and every well-formed event is forwarded to
    /// `on_message` in arrival order. Handlers may fire before the session
    /// finishes starting.
    pub fn attach(
        transport: Arc<dyn EventChannelTransport>,
        transcript: Arc<watch::Sender<String>>,
        on_message: MessageCallback,
    ) -> Self {
        let dispatcher_transcript = Arc::clone(&transcript);
        transport.set_message_handler(Box::new(move |frame| {
            dispatch_frame(&frame, &dispatcher_transcript, on_message.as_ref());
        }));

        Self { transport }
    }

    /// Check if the underlying channel is open
    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    /// Serialize and transmit one command
    ///
    /// # Errors
    ///
    /// [`Error::ChannelNotReady`] if the channel is not open; nothing is
    /// sent or queued in that case.
    pub async fn send(&self, command: &OutboundCommand) -> Result<()> {
        if !self.transport.is_open() {
            return Err(Error::ChannelNotReady);
        }

        let frame = command.to_frame()?;
        debug!("Sending event frame ({} bytes)", frame.len());
        self.transport.send_text(frame).await
    }

    /// Send a text instruction as a `response.create` command
    pub async fn send_text(&self, instructions: &str) -> Result<()> {
        self.send(&OutboundCommand::text_response(instructions)).await
    }

    /// Close the underlying channel
    pub async fn close(&self) -> Result<()> {
        self.transport.close().await
    }
}

/// Dispatch one inbound frame
///
/// Malformed frames are logged and dropped; they touch neither the
/// transcript nor the callback. Transcript events overwrite the transcript
/// with their `text` (empty string when absent). Every parsed event is
/// forwarded as its `text` if present, otherwise its raw serialized JSON.
fn dispatch_frame(
    frame: &str,
    transcript: &watch::Sender<String>,
    on_message: &(dyn Fn(String) + Send + Sync),
) {
    let event = match ChannelEvent::parse(frame) {
        Ok(event) => event,
        Err(e) => {
            warn!("Dropping inbound frame: {}", e);
            return;
        }
    };

    if event.is_transcript() {
        transcript.send_replace(event.text().unwrap_or_default().to_string());
    }

    on_message(event.display_text());
}
