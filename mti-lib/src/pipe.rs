use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum_macros::Display;
use zerocopy::byteorder::little_endian::U16;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::constants::PIPE_STATUS_SIZE;
use crate::error::XbusError;

/// Opcodes selecting one of the four logical pipes multiplexed over the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Pipe {
    /// Outgoing Xbus commands
    Control = 0x03,
    /// 4-byte pending-length record
    Status = 0x04,
    /// Notification messages (acks, errors, device info)
    Notification = 0x05,
    /// MTData2 measurement packets
    Measurement = 0x06,
}

/// Pipe status record as it appears on the wire (4 bytes, little-endian)
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct PipeStatusRaw {
    pub notification_len: U16,
    pub measurement_len: U16,
}

/// Number of bytes waiting in the notification and measurement pipes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PipeStatus {
    pub notification_len: u16,
    pub measurement_len: u16,
}

impl PipeStatus {
    /// Both pipes are empty
    pub fn is_idle(&self) -> bool {
        self.notification_len == 0 && self.measurement_len == 0
    }

    /// Pending length for a readable pipe, zero for the others
    pub fn pending(&self, pipe: Pipe) -> usize {
        match pipe {
            Pipe::Notification => self.notification_len as usize,
            Pipe::Measurement => self.measurement_len as usize,
            Pipe::Control | Pipe::Status => 0,
        }
    }
}

impl From<PipeStatusRaw> for PipeStatus {
    fn from(raw: PipeStatusRaw) -> Self {
        Self {
            notification_len: raw.notification_len.get(),
            measurement_len: raw.measurement_len.get(),
        }
    }
}

impl From<PipeStatus> for PipeStatusRaw {
    fn from(status: PipeStatus) -> Self {
        Self {
            notification_len: U16::new(status.notification_len),
            measurement_len: U16::new(status.measurement_len),
        }
    }
}

impl TryFrom<&[u8]> for PipeStatus {
    type Error = XbusError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let raw = PipeStatusRaw::read_from_bytes(bytes).map_err(|_| XbusError::ShortRead {
            expected: PIPE_STATUS_SIZE,
            actual: bytes.len(),
        })?;
        Ok(PipeStatus::from(raw))
    }
}
