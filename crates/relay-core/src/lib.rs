//! # relay-core
//!
//! Shared vocabulary for the relay event distribution layer.
//!
//! Every other relay crate depends on the types defined here:
//!
//! - **Branded IDs**: [`StreamId`] for accepted or client-side message streams
//! - **Close handling**: [`close_code`] constants and [`CloseReason`]
//! - **Connection state**: [`ConnectionState`] for the client state machine
//! - **Envelopes**: [`MessageEnvelope`] for topic mode, [`frames`] for command mode
//! - **Push subscriptions**: [`EventStream`], [`Observer`], [`PushSubscription`]
//! - **Event sources**: [`EventSourceRegistry`] behind the [`EventSourceLookup`] seam
//! - **Streams**: the [`MessageStream`] abstraction and [`ChannelStream`]
//! - **Logging**: [`logging::init_subscriber`]

#![deny(unsafe_code)]

pub mod close;
pub mod envelope;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod push;
pub mod source;
pub mod state;
pub mod stream;

pub use close::{CloseReason, CloseSource, close_code};
pub use envelope::{EnvelopeError, EnvelopeType, MessageEnvelope, frames};
pub use errors::{OpenError, SourceError};
pub use ids::StreamId;
pub use push::{EventStream, Observer, PushSubscription, subscribe};
pub use source::{EventSourceLookup, EventSourceRegistry};
pub use state::ConnectionState;
pub use stream::{ChannelStream, MessageStream, Outbound, OutboundQueue};
