//! Xbus command framing.
//!
//! Over I2C the preamble (`0xFA`) and bus identifier (`0xFF`) of the classic
//! Xbus frame are dropped, so a command on the control pipe is just
//! `[mid][len][payload..][checksum]`. The checksum still covers the implied
//! bus identifier, which is why it starts from `1` rather than `0`:
//! `0xFF + mid + len + payload + checksum ≡ 0 (mod 256)`.

use bytes::{BufMut, Bytes, BytesMut};
use num_enum::{FromPrimitive, IntoPrimitive};
use strum_macros::Display;

use crate::constants::{BUS_ID, FRAME_HEADER_SIZE, FRAME_OVERHEAD, MAX_PAYLOAD_SIZE};
use crate::error::XbusError;

/// Xbus message identifiers used on the control and notification pipes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum MessageId {
    // host -> device
    GoToMeasurement = 0x10,
    ReqFirmwareRevision = 0x12,
    ReqProductCode = 0x1C,
    GoToConfig = 0x30,
    SetOutputConfiguration = 0xC0,

    // device -> host
    GoToMeasurementAck = 0x11,
    FirmwareRevision = 0x13,
    ProductCode = 0x1D,
    GoToConfigAck = 0x31,
    MtData2 = 0x36,
    WakeUp = 0x3E,
    Error = 0x42,
    Warning = 0x43,
    OutputConfiguration = 0xC1,

    #[num_enum(catch_all)]
    Unknown(u8),
}

/// Sum of `bytes` modulo 256.
fn byte_sum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}

/// Checksum for a frame body (`mid`, `len` and payload, checksum excluded).
pub fn checksum(body: &[u8]) -> u8 {
    0x01u8.wrapping_sub(byte_sum(body))
}

/// Check a received `[mid][len][payload][checksum]` frame.
///
/// Only the bytes announced by the length field plus the trailing checksum are
/// considered; anything the pipe returned beyond that is ignored.
pub fn verify(frame: &[u8]) -> bool {
    let Some(&len) = frame.get(1) else {
        return false;
    };
    let end = FRAME_OVERHEAD + len as usize;
    match frame.get(..end) {
        Some(whole) => BUS_ID.wrapping_add(byte_sum(whole)) == 0,
        None => false,
    }
}

/// Build a wire-ready command frame of `payload.len() + 3` bytes.
pub fn frame(mid: MessageId, payload: &[u8]) -> Result<Bytes, XbusError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(XbusError::PayloadTooLong { len: payload.len() });
    }

    let mut buf = BytesMut::with_capacity(payload.len() + FRAME_OVERHEAD);
    buf.put_u8(mid.into());
    buf.put_u8(payload.len() as u8);
    buf.put_slice(payload);
    let cs = checksum(&buf);
    buf.put_u8(cs);
    Ok(buf.freeze())
}

/// Write a frame into a caller-provided buffer, returning the bytes used.
///
/// `out` must be exactly `payload.len() + 3` bytes long.
pub fn frame_into(mid: MessageId, payload: &[u8], out: &mut [u8]) -> Result<usize, XbusError> {
    let needed = payload.len() + FRAME_OVERHEAD;
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(XbusError::PayloadTooLong { len: payload.len() });
    }
    if out.len() != needed {
        return Err(XbusError::Configuration(format!(
            "frame buffer is {} bytes, {} required",
            out.len(),
            needed
        )));
    }

    out[0] = mid.into();
    out[1] = payload.len() as u8;
    out[FRAME_HEADER_SIZE..needed - 1].copy_from_slice(payload);
    out[needed - 1] = checksum(&out[..needed - 1]);
    Ok(needed)
}
