// Protocol constants for the MTi I2C interface

/// Default 7-bit I2C address of an MTi-1 series module (ADD0..ADD2 unset)
pub const DEFAULT_I2C_ADDRESS: u8 = 0x6B;

/// Implicit bus identifier covered by every Xbus checksum
pub const BUS_ID: u8 = 0xFF;

/// Size of a command/notification header: message id + length (2 bytes)
pub const FRAME_HEADER_SIZE: usize = 2;

/// Framing overhead of a command: header + checksum (3 bytes)
pub const FRAME_OVERHEAD: usize = FRAME_HEADER_SIZE + 1;

/// Largest payload a single-byte length field can announce
pub const MAX_PAYLOAD_SIZE: usize = u8::MAX as usize;

/// Size of the pipe status record (4 bytes)
pub const PIPE_STATUS_SIZE: usize = 4;

/// Default upper bound for a single pipe read
pub const DEFAULT_MAX_PIPE_LEN: usize = 512;

/// Default bound on read cycles spent draining the pipes
pub const DEFAULT_MAX_DRAIN_CYCLES: usize = 32;

/// Size of an MTData2 leaf header: XDI (2) + length (1)
pub const LEAF_HEADER_SIZE: usize = 3;

/// Size of an MTData2 container header: message id (1) + length (1)
pub const CONTAINER_HEADER_SIZE: usize = 2;

/// Width of one IEEE-754 single-precision word on the wire
pub const FLOAT_WORD_SIZE: usize = 4;

/// Offset of the device family character inside a full ProductCode notification.
///
/// The product code reads `MTi-<family>-...`, so the family sits at payload
/// byte 4, i.e. byte 6 once the two header bytes are counted. This is fixed by
/// the protocol and is not derived from the announced string length.
pub const PRODUCT_CODE_FAMILY_OFFSET: usize = 6;

/// Offset of the error code inside a full Error notification
pub const ERROR_CODE_OFFSET: usize = 2;

/// Offset of the 16-bit big-endian code inside a full Warning notification.
///
/// The device sends a 32-bit big-endian warning; only its low half carries a code.
pub const WARNING_CODE_OFFSET: usize = 4;

/// Offset of the major/minor/patch triplet inside a full FirmwareRev notification
pub const FIRMWARE_REV_OFFSET: usize = 2;
