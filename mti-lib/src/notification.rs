//! Notification pipe messages.
//!
//! Notifications are single, flat Xbus messages (`[mid][len][payload][checksum]`)
//! carrying acknowledgements, device information and error reports. Unlike
//! MTData2 they never nest, so a parse is one lookup on the message id.

use std::fmt;

use bytes::Bytes;
use num_enum::FromPrimitive;
use tracing::{debug, info, warn};

use crate::constants::{
    ERROR_CODE_OFFSET, FIRMWARE_REV_OFFSET, FRAME_HEADER_SIZE, PRODUCT_CODE_FAMILY_OFFSET, WARNING_CODE_OFFSET,
};
use crate::error::XbusError;
use crate::frame::MessageId;
use crate::state::DeviceState;

/// Firmware version reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FirmwareRevision {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl fmt::Display for FirmwareRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// A decoded notification message
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    WakeUp,
    Error { code: u8 },
    Warning { code: u16 },
    ProductCode { text: String, family: char },
    FirmwareRevision(FirmwareRevision),
    GoToConfigAck,
    GoToMeasurementAck,
    OutputConfigurationAck,
    /// Any message id without a handler; `raw` is the whole pipe buffer
    Unknown { mid: u8, raw: Bytes },
}

/// Byte at a fixed protocol offset of the full notification
fn byte_at(buf: &[u8], offset: usize, what: &str) -> Result<u8, XbusError> {
    buf.get(offset)
        .copied()
        .ok_or_else(|| XbusError::malformed(offset, format!("{} missing from {} byte notification", what, buf.len())))
}

impl TryFrom<Bytes> for Notification {
    type Error = XbusError;

    fn try_from(buf: Bytes) -> Result<Self, XbusError> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Err(XbusError::malformed(0, format!("notification of {} bytes", buf.len())));
        }
        let mid = MessageId::from_primitive(buf[0]);
        let len = buf[1] as usize;

        let known = !matches!(mid, MessageId::Unknown(_)) && mid != MessageId::MtData2;
        if known && FRAME_HEADER_SIZE + len > buf.len() {
            return Err(XbusError::malformed(
                1,
                format!("{} announces {} payload bytes, {} received", mid, len, buf.len() - FRAME_HEADER_SIZE),
            ));
        }

        // Codes are read from inside the announced payload. The product code
        // family is the exception: its offset is fixed by the protocol and
        // only has to lie within what was transferred.
        let framed = &buf[..(FRAME_HEADER_SIZE + len).min(buf.len())];
        let notification = match mid {
            MessageId::WakeUp => Notification::WakeUp,
            MessageId::Error => Notification::Error {
                code: byte_at(framed, ERROR_CODE_OFFSET, "error code")?,
            },
            MessageId::Warning => Notification::Warning {
                code: u16::from_be_bytes([
                    byte_at(framed, WARNING_CODE_OFFSET, "warning code")?,
                    byte_at(framed, WARNING_CODE_OFFSET + 1, "warning code")?,
                ]),
            },
            MessageId::ProductCode => {
                let family = byte_at(&buf, PRODUCT_CODE_FAMILY_OFFSET, "device family")? as char;
                let text = String::from_utf8_lossy(&framed[FRAME_HEADER_SIZE..])
                    .trim_end_matches([' ', '\0'])
                    .to_string();
                Notification::ProductCode { text, family }
            }
            MessageId::FirmwareRevision => Notification::FirmwareRevision(FirmwareRevision {
                major: byte_at(framed, FIRMWARE_REV_OFFSET, "major version")?,
                minor: byte_at(framed, FIRMWARE_REV_OFFSET + 1, "minor version")?,
                patch: byte_at(framed, FIRMWARE_REV_OFFSET + 2, "patch version")?,
            }),
            MessageId::GoToConfigAck => Notification::GoToConfigAck,
            MessageId::GoToMeasurementAck => Notification::GoToMeasurementAck,
            MessageId::OutputConfiguration => Notification::OutputConfigurationAck,
            other => Notification::Unknown {
                mid: other.into(),
                raw: buf,
            },
        };
        Ok(notification)
    }
}

impl Notification {
    pub fn message_id(&self) -> MessageId {
        match self {
            Notification::WakeUp => MessageId::WakeUp,
            Notification::Error { .. } => MessageId::Error,
            Notification::Warning { .. } => MessageId::Warning,
            Notification::ProductCode { .. } => MessageId::ProductCode,
            Notification::FirmwareRevision(_) => MessageId::FirmwareRevision,
            Notification::GoToConfigAck => MessageId::GoToConfigAck,
            Notification::GoToMeasurementAck => MessageId::GoToMeasurementAck,
            Notification::OutputConfigurationAck => MessageId::OutputConfiguration,
            Notification::Unknown { mid, .. } => MessageId::from_primitive(*mid),
        }
    }
}

/// Decode a notification buffer, log it and fold it into `state`.
pub fn dispatch(buf: Bytes, state: &mut DeviceState) -> Result<Notification, XbusError> {
    let notification = Notification::try_from(buf)?;

    match &notification {
        Notification::WakeUp => info!("Received WakeUp message"),
        Notification::Error { code } => warn!(code, "Device reported an error"),
        Notification::Warning { code } => warn!(code, "Device reported a warning"),
        Notification::ProductCode { text, family } => info!(product = %text, %family, "Product code received"),
        Notification::FirmwareRevision(rev) => info!(firmware = %rev, "Firmware revision received"),
        Notification::GoToConfigAck => debug!("Received GoToConfigAck"),
        Notification::GoToMeasurementAck => debug!("Received GoToMeasurementAck"),
        Notification::OutputConfigurationAck => debug!("Received SetOutputConfiguration ack"),
        Notification::Unknown { mid, raw } => {
            warn!(mid = %format!("{:#04x}", mid), raw = %hex::encode(raw), "Received undefined notification")
        }
    }

    state.apply_notification(&notification);
    Ok(notification)
}
