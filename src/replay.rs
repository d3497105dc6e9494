use std::collections::VecDeque;

use bytes::Bytes;
use mti_lib::{Pipe, Transport};

use crate::error::CliError;

/// Transport that serves captured pipe dumps back to an [`mti_lib::Xbus`].
///
/// The status record reports the length of the next queued dump on each
/// pipe. Writes are refused.
#[derive(Debug, Default)]
pub struct Replay {
    notifications: VecDeque<Bytes>,
    measurements: VecDeque<Bytes>,
}

impl Replay {
    pub fn push(&mut self, pipe: Pipe, dump: Bytes) {
        match pipe {
            Pipe::Notification => self.notifications.push_back(dump),
            _ => self.measurements.push_back(dump),
        }
    }

    fn pending(queue: &VecDeque<Bytes>) -> u16 {
        queue.front().map_or(0, |d| d.len().min(u16::MAX as usize) as u16)
    }
}

impl Transport for Replay {
    type Error = CliError;

    fn write(&mut self, _address: u8, _opcode: u8, _bytes: &[u8]) -> Result<(), CliError> {
        Err(CliError::ReadOnly)
    }

    fn read(&mut self, _address: u8, opcode: u8, buf: &mut [u8]) -> Result<usize, CliError> {
        let data = match Pipe::try_from(opcode) {
            Ok(Pipe::Status) => {
                let mut status = Self::pending(&self.notifications).to_le_bytes().to_vec();
                status.extend_from_slice(&Self::pending(&self.measurements).to_le_bytes());
                Bytes::from(status)
            }
            Ok(Pipe::Notification) => self.notifications.pop_front().unwrap_or_default(),
            Ok(Pipe::Measurement) => self.measurements.pop_front().unwrap_or_default(),
            _ => Bytes::new(),
        };
        let count = data.len().min(buf.len());
        buf[..count].copy_from_slice(&data[..count]);
        Ok(count)
    }
}
