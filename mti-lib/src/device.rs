use bytes::{Bytes, BytesMut};
use embedded_hal::digital::InputPin;
use tracing::{debug, trace, warn};

use crate::constants::{DEFAULT_I2C_ADDRESS, DEFAULT_MAX_DRAIN_CYCLES, DEFAULT_MAX_PIPE_LEN, PIPE_STATUS_SIZE};
use crate::error::XbusError;
use crate::frame::{self, MessageId};
use crate::mtdata2::{self, Measurement};
use crate::notification::{self, Notification};
use crate::pipe::{Pipe, PipeStatus};
use crate::state::DeviceState;
use crate::transport::{DataReady, Transport, transport_error};

/// Bus-level settings for an [`Xbus`] engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct XbusConfig {
    /// 7-bit I2C address of the device
    pub address: u8,
    /// Largest pending length a single pipe read may announce
    pub max_pipe_len: usize,
    /// Read cycles [`Xbus::read_messages`] spends before giving up on draining
    pub max_drain_cycles: usize,
}

impl Default for XbusConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_I2C_ADDRESS,
            max_pipe_len: DEFAULT_MAX_PIPE_LEN,
            max_drain_cycles: DEFAULT_MAX_DRAIN_CYCLES,
        }
    }
}

impl XbusConfig {
    pub fn with_address(mut self, address: u8) -> Self {
        self.address = address;
        self
    }

    pub fn with_max_pipe_len(mut self, max_pipe_len: usize) -> Self {
        self.max_pipe_len = max_pipe_len;
        self
    }

    pub fn with_max_drain_cycles(mut self, max_drain_cycles: usize) -> Self {
        self.max_drain_cycles = max_drain_cycles;
        self
    }
}

/// What became of the measurement pipe during one read cycle
#[derive(Debug, Clone, PartialEq)]
pub enum MeasurementOutcome {
    /// Nothing was pending
    Idle,
    /// The buffer decoded; every tracked element is now in the state cache
    Updated(Vec<Measurement>),
    /// The buffer was dropped and the cache left as it was
    Discarded(XbusError),
}

/// Result of one [`Xbus::read`] cycle
#[derive(Debug, Clone, PartialEq)]
pub struct ReadReport {
    pub status: PipeStatus,
    pub notification: Option<Notification>,
    pub measurement: MeasurementOutcome,
}

impl ReadReport {
    pub fn has_new_measurements(&self) -> bool {
        matches!(self.measurement, MeasurementOutcome::Updated(_))
    }
}

/// Xbus protocol engine for one device.
///
/// Owns the bus handle and the device state cache. Callers read the cache
/// through [`Xbus::state`] and never mutate it directly.
pub struct Xbus<T> {
    transport: T,
    config: XbusConfig,
    status: PipeStatus,
    state: DeviceState,
    data_ready: Option<Box<dyn DataReady>>,
}

impl<T: Transport> Xbus<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, XbusConfig::default())
    }

    pub fn with_config(transport: T, config: XbusConfig) -> Self {
        Self {
            transport,
            config,
            status: PipeStatus::default(),
            state: DeviceState::default(),
            data_ready: None,
        }
    }

    /// Gate [`Xbus::read_messages`] on the device's DRDY line.
    ///
    /// While the pin reads low the drain stops without touching the bus.
    pub fn with_data_ready<P: InputPin + 'static>(mut self, pin: P) -> Self {
        self.data_ready = Some(Box::new(pin));
        self
    }

    pub fn config(&self) -> &XbusConfig {
        &self.config
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    /// Last successfully read pipe status
    pub fn status(&self) -> PipeStatus {
        self.status
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Frame and send a command on the control pipe
    pub fn send(&mut self, mid: MessageId, payload: &[u8]) -> Result<(), XbusError> {
        let message = frame::frame(mid, payload)?;
        debug!(%mid, frame = %hex::encode(&message), "Sending Xbus message");
        self.transport
            .write(self.config.address, Pipe::Control.into(), &message)
            .map_err(transport_error)
    }

    /// Read the 4-byte status record.
    ///
    /// On a failed or short transfer the previous status is kept and the
    /// error returned.
    pub fn poll_status(&mut self) -> Result<PipeStatus, XbusError> {
        let mut raw = [0u8; PIPE_STATUS_SIZE];
        let received = self
            .transport
            .read(self.config.address, Pipe::Status.into(), &mut raw)
            .map_err(transport_error)?;
        let raw = raw.get(..received).unwrap_or(&raw[..]);
        self.status = PipeStatus::try_from(raw)?;
        trace!(
            notification = self.status.notification_len,
            measurement = self.status.measurement_len,
            "Pipe status"
        );
        Ok(self.status)
    }

    /// Read `len` bytes from a pipe in a single transaction.
    ///
    /// A short transfer yields only the bytes that arrived.
    pub fn read_channel(&mut self, pipe: Pipe, len: usize) -> Result<Bytes, XbusError> {
        if len == 0 {
            return Ok(Bytes::new());
        }
        if len > self.config.max_pipe_len {
            return Err(XbusError::Oversize {
                pending: len,
                max: self.config.max_pipe_len,
            });
        }

        let mut buf = BytesMut::zeroed(len);
        let received = self
            .transport
            .read(self.config.address, pipe.into(), &mut buf)
            .map_err(transport_error)?;
        if received < len {
            debug!(%pipe, expected = len, received, "Short pipe read");
        }
        buf.truncate(received.min(len));
        Ok(buf.freeze())
    }

    /// Decode a notification buffer into the state cache.
    ///
    /// Malformed notifications are logged and dropped.
    pub fn handle_notification(&mut self, buf: Bytes) -> Option<Notification> {
        if !frame::verify(&buf) {
            warn!(raw = %hex::encode(&buf), "Notification checksum mismatch");
        }
        match notification::dispatch(buf, &mut self.state) {
            Ok(notification) => Some(notification),
            Err(e) => {
                warn!(error = %e, "Dropping notification");
                None
            }
        }
    }

    /// Decode an MTData2 buffer into the state cache.
    ///
    /// The cache is only touched when the whole buffer decodes.
    pub fn handle_measurement(&mut self, buf: Bytes) -> MeasurementOutcome {
        if !frame::verify(&buf) {
            warn!(raw = %hex::encode(&buf), "Measurement checksum mismatch");
        }
        match mtdata2::decode(&buf) {
            Ok(elements) => {
                for element in &elements {
                    self.state.apply_measurement(element);
                }
                trace!(count = elements.len(), "Decoded MTData2");
                MeasurementOutcome::Updated(elements)
            }
            Err(e) => {
                warn!(error = %e, len = buf.len(), "Dropping MTData2 packet");
                MeasurementOutcome::Discarded(e)
            }
        }
    }

    /// One polling cycle: status, then the notification pipe, then the
    /// measurement pipe, each read only if it has pending bytes.
    pub fn read(&mut self) -> Result<ReadReport, XbusError> {
        let status = self.poll_status()?;

        let mut notification = None;
        if status.notification_len > 0 {
            match self.read_channel(Pipe::Notification, status.pending(Pipe::Notification)) {
                Ok(buf) => notification = self.handle_notification(buf),
                Err(e) if e.is_malformed() => warn!(error = %e, "Skipping notification pipe"),
                Err(e) => return Err(e),
            }
        }

        let mut measurement = MeasurementOutcome::Idle;
        if status.measurement_len > 0 {
            measurement = match self.read_channel(Pipe::Measurement, status.pending(Pipe::Measurement)) {
                Ok(buf) => self.handle_measurement(buf),
                Err(e) if e.is_malformed() => {
                    warn!(error = %e, "Skipping measurement pipe");
                    MeasurementOutcome::Discarded(e)
                }
                Err(e) => return Err(e),
            };
        }

        Ok(ReadReport {
            status,
            notification,
            measurement,
        })
    }

    /// Run read cycles until both pipes report empty.
    ///
    /// Returns the reports of the cycles that found data. Stops after
    /// `max_drain_cycles` even if the device keeps producing. A bus failure
    /// in the first cycle is returned; a later one ends the drain and keeps
    /// the reports already read, whose notifications are applied to the
    /// state either way.
    pub fn read_messages(&mut self) -> Result<Vec<ReadReport>, XbusError> {
        let mut reports = Vec::new();
        for _ in 0..self.config.max_drain_cycles {
            if let Some(pin) = self.data_ready.as_mut() {
                match pin.is_ready() {
                    Ok(false) => return Ok(reports),
                    Ok(true) => {}
                    Err(e) => debug!(error = %e, "DRDY unreadable, polling status"),
                }
            }

            let report = match self.read() {
                Ok(report) => report,
                Err(e) if reports.is_empty() => return Err(e),
                Err(e) => {
                    warn!(error = %e, kept = reports.len(), "Drain interrupted");
                    return Ok(reports);
                }
            };
            if report.status.is_idle() {
                return Ok(reports);
            }
            reports.push(report);
        }
        warn!(cycles = self.config.max_drain_cycles, "Pipes still busy after drain limit");
        Ok(reports)
    }
}
