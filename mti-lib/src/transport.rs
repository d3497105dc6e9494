//! Bus transaction primitive.
//!
//! The engine only needs two operations from the bus: an addressed write of
//! an opcode followed by some bytes, and an addressed read from an opcode that
//! reports how many bytes actually arrived. Anything that can do that (a real
//! I2C peripheral, a USB bridge, a test double) plugs in through [`Transport`].

use std::fmt;

use embedded_hal::digital::InputPin;
use embedded_hal::i2c::{I2c, Operation};
use tracing::trace;

use crate::error::XbusError;

/// Addressed pipe read/write on a shared bus.
pub trait Transport {
    type Error: fmt::Debug;

    /// Write `opcode` followed by `bytes` to the device at `address`.
    fn write(&mut self, address: u8, opcode: u8, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Select `opcode` and read up to `buf.len()` bytes into `buf`.
    ///
    /// Returns the number of bytes actually received, which may be fewer than
    /// requested.
    fn read(&mut self, address: u8, opcode: u8, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    type Error = T::Error;

    fn write(&mut self, address: u8, opcode: u8, bytes: &[u8]) -> Result<(), Self::Error> {
        (**self).write(address, opcode, bytes)
    }

    fn read(&mut self, address: u8, opcode: u8, buf: &mut [u8]) -> Result<usize, Self::Error> {
        (**self).read(address, opcode, buf)
    }
}

/// Level-sensitive data-ready signal (the MTi DRDY line)
pub trait DataReady {
    fn is_ready(&mut self) -> Result<bool, XbusError>;
}

impl<P: InputPin> DataReady for P {
    fn is_ready(&mut self) -> Result<bool, XbusError> {
        self.is_high().map_err(transport_error)
    }
}

pub(crate) fn transport_error<E: fmt::Debug>(err: E) -> XbusError {
    XbusError::Transport(format!("{:?}", err))
}

/// [`Transport`] over any `embedded-hal` I2C bus.
///
/// Each pipe access is an opcode write terminated by a STOP, followed by a
/// separate read transaction, which is what the MTi I2C interface expects.
pub struct I2cTransport<I2C> {
    i2c: I2C,
}

impl<I2C: I2c> I2cTransport<I2C> {
    pub fn new(i2c: I2C) -> Self {
        Self { i2c }
    }

    /// Give the bus back
    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C: I2c> Transport for I2cTransport<I2C> {
    type Error = I2C::Error;

    fn write(&mut self, address: u8, opcode: u8, bytes: &[u8]) -> Result<(), Self::Error> {
        trace!(address, opcode, len = bytes.len(), "i2c write");
        // adjacent writes go out as one transfer, no repeated start
        self.i2c
            .transaction(address, &mut [Operation::Write(&[opcode]), Operation::Write(bytes)])
    }

    fn read(&mut self, address: u8, opcode: u8, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.i2c.write(address, &[opcode])?;
        self.i2c.read(address, buf)?;
        trace!(address, opcode, len = buf.len(), "i2c read");
        Ok(buf.len())
    }
}
