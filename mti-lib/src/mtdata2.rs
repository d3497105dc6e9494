//! MTData2 measurement packets.
//!
//! A measurement pipe read carries one MTData2 message:
//!
//! ```text
//! [0x36][len] ( [XDI hi][XDI lo][L][payload; L] )* [checksum]
//! ```
//!
//! The grammar is recursive: wherever a record would start, the container id
//! `0x36` opens a nested run of `len` bytes instead. Decoding walks the buffer
//! with an explicit cursor and window end rather than recursing, so the work
//! per buffer is bounded by its length.

use bytes::Bytes;
use modular_bitfield::prelude::*;
use num_enum::{FromPrimitive, IntoPrimitive};
use strum_macros::Display;

use crate::constants::{CONTAINER_HEADER_SIZE, FLOAT_WORD_SIZE, LEAF_HEADER_SIZE};
use crate::error::XbusError;
use crate::frame::MessageId;

/// Bit layout of a 16-bit Xsens data identifier (XDI).
///
/// Built from the big-endian wire value via [`DataId::from`]; fields are
/// listed from the least significant bit up.
#[bitfield(bytes = 2)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataId {
    /// 0 = Float32, 1 = Fp1220, 2 = Fp1632, 3 = Float64
    pub precision: B2,
    /// 0 = ENU, 1 = NED, 2 = NWU
    pub coordinates: B2,
    /// Quantity within the group
    pub kind: B4,
    /// Data group (orientation, acceleration, position, ...)
    pub group: u8,
}

impl From<u16> for DataId {
    fn from(value: u16) -> Self {
        DataId::from_bytes(value.to_le_bytes())
    }
}

impl From<DataId> for u16 {
    fn from(id: DataId) -> Self {
        u16::from_le_bytes(id.into_bytes())
    }
}

impl DataId {
    /// Identifier with the format bits cleared
    pub fn base(&self) -> u16 {
        u16::from(*self) & 0xFFF0
    }

    pub fn is_float32(&self) -> bool {
        self.precision() == 0
    }
}

/// Data identifiers the engine extracts into the state cache.
///
/// All are the 32-bit float, ENU variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoPrimitive, FromPrimitive)]
#[repr(u16)]
pub enum DataIdentifier {
    EulerAngles = 0x2030,
    Acceleration = 0x4020,
    LatLon = 0x5040,
    RateOfTurn = 0x8020,

    #[num_enum(catch_all)]
    Unknown(u16),
}

impl DataIdentifier {
    /// Number of floats the payload must carry, for the known identifiers
    pub fn float_count(&self) -> Option<usize> {
        match self {
            DataIdentifier::EulerAngles | DataIdentifier::Acceleration | DataIdentifier::RateOfTurn => Some(3),
            DataIdentifier::LatLon => Some(2),
            DataIdentifier::Unknown(_) => None,
        }
    }
}

/// One decoded MTData2 leaf with its payload in native representation
#[derive(Debug, Clone, PartialEq)]
pub enum Measurement {
    /// Roll, pitch, yaw in degrees
    EulerAngles([f32; 3]),
    /// Calibrated acceleration in m/s²
    Acceleration([f32; 3]),
    /// Angular velocity in rad/s
    RateOfTurn([f32; 3]),
    /// Latitude, longitude in degrees
    LatLon([f32; 2]),
    /// Any identifier the cache does not track, kept undecoded
    Other { id: DataId, payload: Bytes },
}

impl Measurement {
    /// Normalise a leaf payload according to its identifier.
    pub fn from_leaf(xdi: u16, payload: Bytes) -> Result<Self, XbusError> {
        let measurement = match DataIdentifier::from_primitive(xdi) {
            DataIdentifier::EulerAngles => Measurement::EulerAngles(be_floats(&payload)?),
            DataIdentifier::Acceleration => Measurement::Acceleration(be_floats(&payload)?),
            DataIdentifier::RateOfTurn => Measurement::RateOfTurn(be_floats(&payload)?),
            DataIdentifier::LatLon => Measurement::LatLon(be_floats(&payload)?),
            DataIdentifier::Unknown(_) => Measurement::Other {
                id: DataId::from(xdi),
                payload,
            },
        };
        Ok(measurement)
    }

    pub fn identifier(&self) -> DataIdentifier {
        match self {
            Measurement::EulerAngles(_) => DataIdentifier::EulerAngles,
            Measurement::Acceleration(_) => DataIdentifier::Acceleration,
            Measurement::RateOfTurn(_) => DataIdentifier::RateOfTurn,
            Measurement::LatLon(_) => DataIdentifier::LatLon,
            Measurement::Other { id, .. } => DataIdentifier::Unknown(u16::from(*id)),
        }
    }
}

/// Reverse the byte order of every 32-bit word in `buf`.
///
/// Applying it twice restores the input. Buffers that are not a whole number
/// of words are rejected untouched.
pub fn swap_words(buf: &mut [u8]) -> Result<(), XbusError> {
    if buf.len() % FLOAT_WORD_SIZE != 0 {
        return Err(XbusError::PayloadAlignment { len: buf.len() });
    }
    for word in buf.chunks_exact_mut(FLOAT_WORD_SIZE) {
        word.reverse();
    }
    Ok(())
}

/// Read `N` big-endian IEEE-754 singles from a leaf payload.
pub fn be_floats<const N: usize>(payload: &[u8]) -> Result<[f32; N], XbusError> {
    if payload.len() % FLOAT_WORD_SIZE != 0 {
        return Err(XbusError::PayloadAlignment { len: payload.len() });
    }
    if payload.len() != N * FLOAT_WORD_SIZE {
        return Err(XbusError::malformed(
            0,
            format!("expected {} floats, payload holds {} bytes", N, payload.len()),
        ));
    }

    let mut words = payload.to_vec();
    if cfg!(target_endian = "little") {
        swap_words(&mut words)?;
    }

    let mut values = [0f32; N];
    for (value, word) in values.iter_mut().zip(words.chunks_exact(FLOAT_WORD_SIZE)) {
        let mut raw = [0u8; FLOAT_WORD_SIZE];
        raw.copy_from_slice(word);
        *value = f32::from_ne_bytes(raw);
    }
    Ok(values)
}

/// Structural view of the record starting at the cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Record {
    Container { length: usize },
    Leaf { xdi: u16, length: usize },
}

impl Record {
    /// Parse the header at `buf[offset..end]`; at least two bytes remain.
    fn parse(buf: &[u8], offset: usize, end: usize) -> Result<Self, XbusError> {
        let window = &buf[offset..end];
        if window[0] == u8::from(MessageId::MtData2) {
            let length = window[1] as usize;
            if CONTAINER_HEADER_SIZE + length > window.len() {
                return Err(XbusError::malformed(
                    offset,
                    format!("container announces {} bytes, {} remain", length, window.len() - CONTAINER_HEADER_SIZE),
                ));
            }
            return Ok(Record::Container { length });
        }

        if window.len() < LEAF_HEADER_SIZE {
            return Err(XbusError::malformed(offset, "truncated data element header"));
        }
        let xdi = u16::from_be_bytes([window[0], window[1]]);
        let length = window[2] as usize;
        if LEAF_HEADER_SIZE + length > window.len() {
            return Err(XbusError::malformed(
                offset,
                format!(
                    "data element {:#06x} announces {} bytes, {} remain",
                    xdi,
                    length,
                    window.len() - LEAF_HEADER_SIZE
                ),
            ));
        }
        Ok(Record::Leaf { xdi, length })
    }
}

/// Decode an MTData2 buffer into its data elements.
///
/// Either the whole buffer decodes or an error is returned; callers apply the
/// elements only on success, so a malformed buffer never half-updates state.
pub fn decode(buf: &Bytes) -> Result<Vec<Measurement>, XbusError> {
    let mut elements = Vec::new();
    let mut cursor = 0usize;
    let mut end = buf.len();
    let max_steps = buf.len() / CONTAINER_HEADER_SIZE + 1;

    for _ in 0..max_steps {
        if end - cursor < CONTAINER_HEADER_SIZE {
            return Ok(elements);
        }
        match Record::parse(buf, cursor, end)? {
            Record::Container { length } => {
                // Only the nested run is decoded; whatever follows it at this
                // level (the frame checksum) is not part of the stream.
                cursor += CONTAINER_HEADER_SIZE;
                end = cursor + length;
            }
            Record::Leaf { xdi, length } => {
                let start = cursor + LEAF_HEADER_SIZE;
                let payload = buf.slice(start..start + length);
                elements.push(Measurement::from_leaf(xdi, payload)?);
                cursor = start + length;
            }
        }
    }

    if end - cursor < CONTAINER_HEADER_SIZE {
        Ok(elements)
    } else {
        Err(XbusError::malformed(cursor, "step bound exceeded"))
    }
}
