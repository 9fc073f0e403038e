//! # relay-pubsub
//!
//! Subscription handling for accepted message streams.
//!
//! - [`topic`]: tokenizing and wildcard matching of `/`-separated topics
//! - [`table`]: the per-stream subscription table
//! - [`command`] + [`session`]: command mode (`sub:<type>[:arg]*`), where
//!   each subscription is a push subscription opened from an event-source
//!   lookup and owned by the stream's [`CommandSession`]
//! - [`dispatcher`]: topic mode, where streams subscribe to patterns and
//!   the application publishes through [`TopicDispatcher::dispatch`]

#![deny(unsafe_code)]

pub mod command;
pub mod dispatcher;
pub mod session;
pub mod table;
pub mod topic;

pub use command::{Command, CommandError, CommandKey};
pub use dispatcher::{
    DispatchError, NoopHooks, SubscribeRejected, TopicDispatcher, TopicDispatcherConfig,
    TopicHooks,
};
pub use session::{CommandSession, CustomCommandHandler};
pub use table::SubscriptionTable;
pub use topic::{TopicError, compare, tokenize};
