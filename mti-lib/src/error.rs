use std::time::Duration;
use thiserror::Error;

/// The primary error type for the `mti-lib` library.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum XbusError {
    #[error("Bus transaction failed: {0}")]
    Transport(String),

    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    #[error("Pipe reports {pending} pending bytes, more than the {max} byte buffer")]
    Oversize { pending: usize, max: usize },

    #[error("Malformed frame at offset {offset}: {message}")]
    MalformedFrame { offset: usize, message: String },

    #[error("Float payload of {len} bytes is not a whole number of 32-bit words")]
    PayloadAlignment { len: usize },

    #[error("Payload of {len} bytes does not fit a single-byte length field")]
    PayloadTooLong { len: usize },

    #[error("Timed out after {waited:?} waiting for {operation}")]
    ProtocolTimeout { operation: &'static str, waited: Duration },

    #[error("Product code has not been received from the device")]
    ProductCodeMissing,

    #[error("Unknown product code family '{0}'")]
    UnknownProductCode(char),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl XbusError {
    pub(crate) fn malformed(offset: usize, message: impl Into<String>) -> Self {
        XbusError::MalformedFrame {
            offset,
            message: message.into(),
        }
    }

    /// Whether this error means the buffer itself could not be decoded.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            XbusError::MalformedFrame { .. } | XbusError::PayloadAlignment { .. } | XbusError::Oversize { .. }
        )
    }

    /// Whether the bus transaction itself failed or came back incomplete.
    pub fn is_transport(&self) -> bool {
        matches!(self, XbusError::Transport(_) | XbusError::ShortRead { .. })
    }
}
