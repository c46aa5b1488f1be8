//! Service layer errors.

use shub_ipi::IpiError;
use shub_protocol::{CtrlCommand, ProtocolError};
use thiserror::Error;

/// Errors returned by [`SensorComm`](crate::SensorComm).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommError {
    /// The transport failed to move the frame.
    #[error(transparent)]
    Ipi(#[from] IpiError),

    /// A frame could not be encoded, or the reply could not be decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The co-processor acknowledged the command with a failure code.
    #[error("co-processor rejected {command} with {ret_val}")]
    RemoteFailure {
        /// Command that was rejected.
        command: CtrlCommand,
        /// Negative result carried in the acknowledgement.
        ret_val: i8,
    },
}

impl CommError {
    /// Kernel-style negative status code for this error.
    pub fn errno(&self) -> i32 {
        match self {
            CommError::Ipi(err) => err.errno(),
            CommError::Protocol(_) => -74, // EBADMSG
            CommError::RemoteFailure { ret_val, .. } => i32::from(*ret_val),
        }
    }
}

/// Result type alias for service operations.
pub type CommResult<T> = Result<T, CommError>;

#[cfg(test)]
mod tests {
    use super::*;
    use shub_ipi::ChannelId;

    #[test]
    fn test_errno_passthrough() {
        let err = CommError::from(IpiError::Timeout {
            channel: ChannelId(2),
            timeout: std::time::Duration::from_millis(500),
        });
        assert_eq!(err.errno(), -110);

        let err = CommError::from(ProtocolError::CrcMismatch { expected: 1, actual: 2 });
        assert_eq!(err.errno(), -74);

        let err = CommError::RemoteFailure {
            command: CtrlCommand::Enable,
            ret_val: -22,
        };
        assert_eq!(err.errno(), -22);
        assert_eq!(err.to_string(), "co-processor rejected enable with -22");
    }
}
