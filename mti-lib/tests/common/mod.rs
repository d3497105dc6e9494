//! Common test utilities and shared imports

// Allow unused imports and dead code since this is a shared module
// used across multiple test files - not all items are used in every test file
#![allow(dead_code, unused_imports)]

pub use bytes::Bytes;
pub use mti_lib::frame::{self, MessageId};
pub use mti_lib::{
    Clock, DeviceFamily, DeviceState, Measurement, MeasurementOutcome, Mti, Notification, Pipe, PipeStatus,
    SequencerConfig, Transport, Xbus, XbusConfig, XbusError,
};
pub use num_enum::FromPrimitive;

use std::collections::VecDeque;
use std::time::Duration;

pub const ADDRESS: u8 = 0x6B;

/// Decode hex string to bytes for testing
pub fn hex_to_bytes(hex_data: &str) -> Bytes {
    Bytes::from(hex::decode(hex_data).expect("Failed to decode hex"))
}

/// A `[mid][len][payload][checksum]` message as the device would send it
pub fn message(mid: u8, payload: &[u8]) -> Vec<u8> {
    frame::frame(MessageId::from_primitive(mid), payload)
        .expect("payload fits")
        .to_vec()
}

/// MTData2 leaf with big-endian float payload
pub fn float_leaf(xdi: u16, values: &[f32]) -> Vec<u8> {
    let mut out = xdi.to_be_bytes().to_vec();
    out.push((values.len() * 4) as u8);
    for v in values {
        out.extend_from_slice(&v.to_be_bytes());
    }
    out
}

/// Full MTData2 measurement pipe packet around the given leaves
pub fn mtdata2_packet(leaves: &[Vec<u8>]) -> Vec<u8> {
    let body: Vec<u8> = leaves.concat();
    message(0x36, &body)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    Nack,
    Bus,
}

/// In-memory MTi that answers Xbus commands on its pipes.
pub struct SimulatedMti {
    pub address: u8,
    pub product_code: &'static str,
    pub firmware: [u8; 3],
    pub config_mode: bool,
    /// Answer commands at all
    pub responsive: bool,
    pub notifications: VecDeque<Vec<u8>>,
    pub measurements: VecDeque<Vec<u8>>,
    /// Every control pipe write, frame bytes only
    pub commands: Vec<Vec<u8>>,
    /// Every read as (opcode, requested length)
    pub reads: Vec<(u8, usize)>,
    /// Fail this many upcoming reads
    pub failing_reads: usize,
    /// Let this many reads succeed, then fail exactly one
    pub fail_after: Option<usize>,
    /// Deliver only this many bytes of the next measurement read
    pub truncate_next_measurement: Option<usize>,
}

impl SimulatedMti {
    pub fn new(product_code: &'static str) -> Self {
        Self {
            address: ADDRESS,
            product_code,
            firmware: [1, 8, 2],
            config_mode: false,
            responsive: true,
            notifications: VecDeque::new(),
            measurements: VecDeque::new(),
            commands: Vec::new(),
            reads: Vec::new(),
            failing_reads: 0,
            fail_after: None,
            truncate_next_measurement: None,
        }
    }

    pub fn silent() -> Self {
        let mut sim = Self::new("MTi-1-8A7G6");
        sim.responsive = false;
        sim
    }

    pub fn push_notification(&mut self, mid: u8, payload: &[u8]) {
        self.notifications.push_back(message(mid, payload));
    }

    pub fn push_measurement(&mut self, packet: Vec<u8>) {
        self.measurements.push_back(packet);
    }

    pub fn sent_ids(&self) -> Vec<u8> {
        self.commands.iter().map(|c| c[0]).collect()
    }

    pub fn reads_of(&self, pipe: Pipe) -> usize {
        let opcode: u8 = pipe.into();
        self.reads.iter().filter(|(op, _)| *op == opcode).count()
    }

    fn answer(&mut self, command: &[u8]) {
        let payload = &command[2..command.len() - 1];
        match command[0] {
            0x30 => {
                self.config_mode = true;
                self.push_notification(0x31, &[]);
            }
            0x10 => {
                self.config_mode = false;
                self.push_notification(0x11, &[]);
            }
            0x1C => {
                let text = self.product_code.as_bytes().to_vec();
                self.push_notification(0x1D, &text);
            }
            0x12 => {
                let fw = self.firmware;
                self.push_notification(0x13, &[fw[0], fw[1], fw[2], 0, 0, 0, 0x2A, 0, 0, 0, 0]);
            }
            0xC0 => {
                let echo = payload.to_vec();
                self.push_notification(0xC1, &echo);
            }
            _ => {}
        }
    }
}

impl Transport for SimulatedMti {
    type Error = SimError;

    fn write(&mut self, address: u8, opcode: u8, bytes: &[u8]) -> Result<(), SimError> {
        if address != self.address {
            return Err(SimError::Nack);
        }
        if opcode == u8::from(Pipe::Control) {
            self.commands.push(bytes.to_vec());
            if self.responsive && frame::verify(bytes) {
                self.answer(bytes);
            }
        }
        Ok(())
    }

    fn read(&mut self, address: u8, opcode: u8, buf: &mut [u8]) -> Result<usize, SimError> {
        if address != self.address {
            return Err(SimError::Nack);
        }
        self.reads.push((opcode, buf.len()));
        if self.failing_reads > 0 {
            self.failing_reads -= 1;
            return Err(SimError::Bus);
        }
        match self.fail_after {
            Some(0) => {
                self.fail_after = None;
                return Err(SimError::Bus);
            }
            Some(n) => self.fail_after = Some(n - 1),
            None => {}
        }

        let data = match Pipe::try_from(opcode) {
            Ok(Pipe::Status) => {
                let n = self.notifications.front().map_or(0, |m| m.len()) as u16;
                let m = self.measurements.front().map_or(0, |m| m.len()) as u16;
                let mut status = n.to_le_bytes().to_vec();
                status.extend_from_slice(&m.to_le_bytes());
                status
            }
            Ok(Pipe::Notification) => self.notifications.pop_front().unwrap_or_default(),
            Ok(Pipe::Measurement) => {
                let mut packet = self.measurements.pop_front().unwrap_or_default();
                if let Some(len) = self.truncate_next_measurement.take() {
                    packet.truncate(len);
                }
                packet
            }
            _ => Vec::new(),
        };

        let count = data.len().min(buf.len());
        buf[..count].copy_from_slice(&data[..count]);
        Ok(count)
    }
}

/// Clock that only moves when slept on
#[derive(Debug, Default)]
pub struct FakeClock {
    pub now: Duration,
    pub sleeps: usize,
}

impl Clock for FakeClock {
    fn now(&self) -> Duration {
        self.now
    }

    fn sleep(&mut self, duration: Duration) {
        self.now += duration;
        self.sleeps += 1;
    }
}

pub fn engine(sim: SimulatedMti) -> Xbus<SimulatedMti> {
    Xbus::with_config(sim, XbusConfig::default().with_address(ADDRESS))
}

/// Capture log output in test runs (RUST_LOG=debug cargo test)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
