//! Error types for the IPI transport.

use std::time::Duration;

use thiserror::Error;

use crate::mailbox::ChannelId;

/// Errors a transfer, message or submission can end with.
///
/// Errors travel back to submitters through [`Message::status`](crate::Message::status),
/// so they are cheap to clone and compare.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IpiError {
    /// The request itself is malformed; the mailbox was never touched.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The channel stayed busy for the whole retry budget.
    #[error("channel {channel} busy after {attempts} attempts")]
    Busy {
        /// Outbound channel.
        channel: ChannelId,
        /// Send attempts made.
        attempts: u32,
    },

    /// The mailbox rejected the send with a fatal status.
    #[error("mailbox send on channel {channel} failed with status {status}")]
    Io {
        /// Outbound channel.
        channel: ChannelId,
        /// Raw status returned by the mailbox.
        status: i32,
    },

    /// No acknowledgement arrived before the deadline.
    #[error("no completion for channel {channel} within {timeout:?}")]
    Timeout {
        /// Outbound channel.
        channel: ChannelId,
        /// Deadline that expired.
        timeout: Duration,
    },

    /// The acknowledgement length differs from what the transfer expected.
    #[error("malformed response: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        /// Expected rx length.
        expected: usize,
        /// Realized rx length.
        actual: usize,
    },

    /// The message has not been dispatched yet.
    #[error("message in progress")]
    InProgress,

    /// A mailbox call panicked while the message was running.
    #[error("message aborted by a panic in the mailbox")]
    Aborted,

    /// The transport no longer accepts work.
    #[error("transport is shut down")]
    ShutDown,

    /// A blocking submission was made from inside a completion callback.
    #[error("blocking submission from a completion callback would deadlock")]
    Reentrant,
}

impl IpiError {
    /// Kernel-style negative status code for this error.
    pub fn errno(&self) -> i32 {
        match self {
            IpiError::InvalidArgument(_) => -22, // EINVAL
            IpiError::Busy { .. } => -16, // EBUSY
            IpiError::Io { .. } => -5, // EIO
            IpiError::Timeout { .. } => -110, // ETIMEDOUT
            IpiError::LengthMismatch { .. } => -74, // EBADMSG
            IpiError::InProgress => -115, // EINPROGRESS
            IpiError::Aborted => -125, // ECANCELED
            IpiError::ShutDown => -108, // ESHUTDOWN
            IpiError::Reentrant => -35, // EDEADLK
        }
    }

    /// Whether re-submitting the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, IpiError::Busy { .. } | IpiError::Timeout { .. })
    }
}

/// Result type alias for transport operations.
pub type IpiResult<T> = Result<T, IpiError>;

/// Errors loading or validating a [`TransportConfig`](crate::TransportConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse YAML.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A value is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors starting a [`Transport`](crate::Transport).
#[derive(Error, Debug)]
pub enum StartError {
    /// The configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The dispatch thread could not be spawned.
    #[error("failed to spawn dispatch thread: {0}")]
    Spawn(#[source] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(IpiError::InvalidArgument("tx").errno(), -22);
        assert_eq!(
            IpiError::Busy { channel: ChannelId(1), attempts: 1000 }.errno(),
            -16
        );
        assert_eq!(IpiError::Io { channel: ChannelId(1), status: -3 }.errno(), -5);
        assert_eq!(
            IpiError::LengthMismatch { expected: 4, actual: 2 }.errno(),
            -74
        );
        assert_eq!(IpiError::Aborted.errno(), -125);
    }

    #[test]
    fn test_transient() {
        assert!(IpiError::Busy { channel: ChannelId(1), attempts: 1 }.is_transient());
        assert!(!IpiError::Io { channel: ChannelId(1), status: -1 }.is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = IpiError::LengthMismatch { expected: 4, actual: 2 };
        assert_eq!(err.to_string(), "malformed response: expected 4 bytes, got 2");
    }
}
