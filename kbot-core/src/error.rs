use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KbotError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Keyboard build error: {0}")]
    Build(#[from] BuildError),

    #[error("Handler error: {0}")]
    Handler(String),

    /// The update source stopped on an error it cannot retry.
    #[error("Ingestion error: {0}")]
    Ingestion(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl KbotError {
    /// Wraps an application-level failure message.
    pub fn handler(msg: impl Into<String>) -> Self {
        KbotError::Handler(msg.into())
    }
}

impl From<anyhow::Error> for KbotError {
    fn from(e: anyhow::Error) -> Self {
        KbotError::Handler(format!("{:#}", e))
    }
}

/// Failures reported by a [`crate::Transport`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Edit target was deleted or is too old to edit.
    #[error("message can't be edited")]
    NotEditable,

    /// Edit carried exactly the content the message already has.
    #[error("message is not modified")]
    NotModified,

    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("chat blocked the bot")]
    ChatBlocked,

    #[error("network error: {0}")]
    Network(String),

    #[error("api error: {0}")]
    Api(String),
}

/// Reasons a keyboard build is rejected. Builds never truncate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("columns must be positive")]
    ZeroColumns,

    #[error("{requested} columns requested, at most {max} allowed")]
    TooManyColumns { requested: usize, max: usize },

    #[error("callback token for button {label:?} is {len} bytes, limit is {max}")]
    TokenTooLong { label: String, len: usize, max: usize },

    #[error("button {label:?} serializes to {len} bytes, limit is {max}")]
    ButtonTooLarge { label: String, len: usize, max: usize },

    /// The keyboard's scope was evicted by concurrent builds before it was complete.
    #[error("keyboard scope evicted during build")]
    ScopeEvicted,
}

pub type Result<T> = std::result::Result<T, KbotError>;

pub type TransportResult<T> = std::result::Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anyhow_becomes_handler_error() {
        let err: KbotError = anyhow::anyhow!("inner").context("outer").into();
        match err {
            KbotError::Handler(msg) => assert_eq!(msg, "outer: inner"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_build_error_message() {
        let err = KbotError::from(BuildError::TooManyColumns { requested: 9, max: 8 });
        assert_eq!(
            err.to_string(),
            "Keyboard build error: 9 columns requested, at most 8 allowed"
        );
    }
}
