//! Command-mode text protocol: `<cmd>:<eventType>[:arg]*`.

use std::fmt;

use thiserror::Error;

/// Reply message for an event type with no registered source.
pub const INVALID_EVENT_TYPE: &str = "Invalid event type";
/// Reply message for a verb other than `sub`/`unsub`.
pub const UNKNOWN_COMMAND_TYPE: &str = "Unknown command type";

/// Event type plus arguments; the key of a command-mode subscription.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommandKey {
    /// Registered event type name.
    pub event_type: String,
    /// Positional arguments passed to the source factory.
    pub args: Vec<String>,
}

impl CommandKey {
    /// Build a key.
    pub fn new(event_type: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            event_type: event_type.into(),
            args,
        }
    }
}

/// `<eventType>:<arg1>:...`, the key echoed in error frames.
impl fmt::Display for CommandKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.event_type)?;
        for arg in &self.args {
            write!(f, ":{arg}")?;
        }
        Ok(())
    }
}

/// A parsed inbound command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// `sub:<type>[:arg]*`
    Subscribe(CommandKey),
    /// `unsub:<type>[:arg]*`
    Unsubscribe(CommandKey),
    /// Any other verb, left to an optional custom handler.
    Unknown {
        /// The verb as received.
        verb: String,
        /// The rest of the command.
        key: CommandKey,
    },
}

/// A command that could not be parsed.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CommandError {
    /// No `:` in the text.
    #[error("Invalid command")]
    Invalid {
        /// Text before the first colon (all of it).
        key: String,
    },
    /// Nothing between the verb and the next `:`.
    #[error("No event type specified")]
    MissingEventType {
        /// The verb.
        key: String,
    },
}

impl CommandError {
    /// Key reported alongside the error message.
    pub fn key(&self) -> &str {
        match self {
            Self::Invalid { key } | Self::MissingEventType { key } => key,
        }
    }
}

impl Command {
    /// Parse one text frame.
    pub fn parse(text: &str) -> Result<Self, CommandError> {
        let Some((verb, rest)) = text.split_once(':') else {
            return Err(CommandError::Invalid {
                key: text.to_owned(),
            });
        };
        let mut parts = rest.split(':');
        let event_type = parts.next().unwrap_or_default();
        if event_type.is_empty() {
            return Err(CommandError::MissingEventType {
                key: verb.to_owned(),
            });
        }
        let key = CommandKey::new(event_type, parts.map(str::to_owned).collect());

        Ok(match verb {
            "sub" => Self::Subscribe(key),
            "unsub" => Self::Unsubscribe(key),
            other => Self::Unknown {
                verb: other.to_owned(),
                key,
            },
        })
    }
}
