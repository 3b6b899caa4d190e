//! JSON event protocol over the data channel
//!
//! One UTF-8 JSON object per frame, each carrying a `type` discriminator.
//! Inbound frames are dispatched FIFO to a single registered callback;
//! unrecognized types are tolerated and malformed frames are dropped
//! without tearing down the session.

pub mod event_channel;
pub mod events;

pub use event_channel::EventChannel;
pub use events::{ChannelEvent, OutboundCommand, ResponseSpec};
