//! Device control sequences built on the [`Xbus`] engine.
//!
//! Every wait here is a bounded loop against an injected [`Clock`]: send a
//! command, poll the pipes, and give up with [`XbusError::ProtocolTimeout`]
//! once the deadline passes.

use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::device::Xbus;
use crate::error::XbusError;
use crate::frame::{self, MessageId};
use crate::mtdata2::DataIdentifier;
use crate::notification::Notification;
use crate::state::{DeviceFamily, DeviceState};
use crate::transport::Transport;

/// Timing and output settings for [`Mti`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencerConfig {
    /// How long [`Mti::detect`] keeps knocking before giving up
    pub detect_timeout: Duration,
    /// How long to wait for the answer to a single command
    pub ack_timeout: Duration,
    /// Pause between pipe polls while waiting
    pub poll_interval: Duration,
    /// Pause after an output configuration is acknowledged
    pub settle_delay: Duration,
    /// Output rate requested for every configured data identifier
    pub output_rate_hz: u16,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            detect_timeout: Duration::from_secs(5),
            ack_timeout: Duration::from_secs(1),
            poll_interval: Duration::from_millis(250),
            settle_delay: Duration::from_secs(1),
            output_rate_hz: 1,
        }
    }
}

/// SetOutputConfiguration payload: a list of data identifiers and rates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputConfiguration {
    pub entries: Vec<(DataIdentifier, u16)>,
}

impl OutputConfiguration {
    /// The output set used for each product family
    pub fn for_family(family: DeviceFamily, rate_hz: u16) -> Self {
        let ids: &[DataIdentifier] = match family {
            DeviceFamily::Imu => &[DataIdentifier::Acceleration, DataIdentifier::RateOfTurn],
            DeviceFamily::VruAhrs => &[DataIdentifier::EulerAngles],
            DeviceFamily::GnssIns => &[DataIdentifier::LatLon, DataIdentifier::EulerAngles],
        };
        Self {
            entries: ids.iter().map(|id| (*id, rate_hz)).collect(),
        }
    }

    /// Big-endian `[XDI][rate]` pairs
    pub fn to_payload(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.entries.len() * 4);
        for (id, rate) in &self.entries {
            buf.put_u16(u16::from(*id));
            buf.put_u16(*rate);
        }
        buf.freeze()
    }

    pub fn to_frame(&self) -> Result<Bytes, XbusError> {
        frame::frame(MessageId::SetOutputConfiguration, &self.to_payload())
    }
}

/// High-level driver for an MTi device
pub struct Mti<T, C> {
    xbus: Xbus<T>,
    clock: C,
    config: SequencerConfig,
}

impl<T: Transport, C: Clock> Mti<T, C> {
    pub fn new(xbus: Xbus<T>, clock: C) -> Self {
        Self::with_config(xbus, clock, SequencerConfig::default())
    }

    pub fn with_config(xbus: Xbus<T>, clock: C, config: SequencerConfig) -> Self {
        Self { xbus, clock, config }
    }

    pub fn xbus(&self) -> &Xbus<T> {
        &self.xbus
    }

    pub fn xbus_mut(&mut self) -> &mut Xbus<T> {
        &mut self.xbus
    }

    pub fn state(&self) -> &DeviceState {
        self.xbus.state()
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    pub fn into_parts(self) -> (Xbus<T>, C) {
        (self.xbus, self.clock)
    }

    /// Drain both pipes, logging rather than failing on bus errors.
    fn drain(&mut self) -> Vec<Notification> {
        match self.xbus.read_messages() {
            Ok(reports) => reports.into_iter().filter_map(|r| r.notification).collect(),
            Err(e) => {
                debug!(error = %e, "Pipe drain interrupted");
                Vec::new()
            }
        }
    }

    /// Poll until a notification matching `want` arrives, the state
    /// satisfies `settled`, or `timeout` passes.
    fn await_notification<F, S>(
        &mut self,
        operation: &'static str,
        timeout: Duration,
        want: F,
        settled: S,
    ) -> Result<(), XbusError>
    where
        F: Fn(&Notification) -> bool,
        S: Fn(&DeviceState) -> bool,
    {
        let start = self.clock.now();
        loop {
            let found = self.drain().iter().any(&want);
            if found || settled(self.xbus.state()) {
                return Ok(());
            }
            let waited = self.clock.now().saturating_sub(start);
            if waited >= timeout {
                warn!(operation, ?waited, "No answer from device");
                return Err(XbusError::ProtocolTimeout { operation, waited });
            }
            self.clock.sleep(self.config.poll_interval);
        }
    }

    /// Send GoToConfig until the device acknowledges or `timeout` passes.
    pub fn detect(&mut self, timeout: Duration) -> Result<(), XbusError> {
        info!("Scanning for MTi");
        let start = self.clock.now();
        loop {
            if let Err(e) = self.xbus.send(MessageId::GoToConfig, &[]) {
                debug!(error = %e, "GoToConfig not delivered");
            }
            self.clock.sleep(self.config.poll_interval);
            self.drain();
            if self.xbus.state().config_state {
                info!("Device detected");
                return Ok(());
            }

            let waited = self.clock.now().saturating_sub(start);
            if waited >= timeout {
                warn!(?waited, "Failed to detect device");
                return Err(XbusError::ProtocolTimeout {
                    operation: "device detection",
                    waited,
                });
            }
        }
    }

    pub fn go_to_config(&mut self) -> Result<(), XbusError> {
        info!("Entering configuration mode");
        let was_config = self.xbus.state().config_state;
        self.xbus.send(MessageId::GoToConfig, &[])?;
        self.await_notification(
            "GoToConfigAck",
            self.config.ack_timeout,
            |n| *n == Notification::GoToConfigAck,
            |state| !was_config && state.config_state,
        )
    }

    pub fn go_to_measurement(&mut self) -> Result<(), XbusError> {
        info!("Entering measurement mode");
        let was_config = self.xbus.state().config_state;
        self.xbus.send(MessageId::GoToMeasurement, &[])?;
        self.await_notification(
            "GoToMeasurementAck",
            self.config.ack_timeout,
            |n| *n == Notification::GoToMeasurementAck,
            |state| was_config && !state.config_state,
        )
    }

    /// Switch to configuration mode if needed and clear both pipes.
    fn prepare_config(&mut self) -> Result<(), XbusError> {
        if !self.xbus.state().config_state {
            self.go_to_config()?;
        }
        self.drain();
        Ok(())
    }

    /// Ask for the product code and firmware revision.
    pub fn request_device_info(&mut self) -> Result<(), XbusError> {
        self.prepare_config()?;
        info!("Requesting device info");

        self.xbus.send(MessageId::ReqProductCode, &[])?;
        self.await_notification(
            "ProductCode",
            self.config.ack_timeout,
            |n| matches!(n, Notification::ProductCode { .. }),
            |_| false,
        )?;

        self.xbus.send(MessageId::ReqFirmwareRevision, &[])?;
        self.await_notification(
            "FirmwareRev",
            self.config.ack_timeout,
            |n| matches!(n, Notification::FirmwareRevision(_)),
            |_| false,
        )
    }

    /// Configure the outputs that suit the device's product family.
    ///
    /// The product code must already be known, see [`Mti::request_device_info`].
    pub fn configure_outputs(&mut self) -> Result<OutputConfiguration, XbusError> {
        self.prepare_config()?;

        let code = self.xbus.state().product_code.ok_or(XbusError::ProductCodeMissing)?;
        let Some(family) = DeviceFamily::from_product_char(code) else {
            warn!(%code, "Could not configure device, product code is unknown");
            return Err(XbusError::UnknownProductCode(code));
        };

        let outputs = OutputConfiguration::for_family(family, self.config.output_rate_hz);
        info!(%family, rate_hz = self.config.output_rate_hz, "Configuring outputs");
        self.xbus
            .send(MessageId::SetOutputConfiguration, &outputs.to_payload())?;
        self.await_notification(
            "SetOutputConfiguration ack",
            self.config.ack_timeout,
            |n| *n == Notification::OutputConfigurationAck,
            |_| false,
        )?;
        self.clock.sleep(self.config.settle_delay);
        Ok(outputs)
    }

    /// Detect, read device info, configure outputs and start measuring.
    pub fn start(&mut self) -> Result<OutputConfiguration, XbusError> {
        self.detect(self.config.detect_timeout)?;
        self.request_device_info()?;
        let outputs = self.configure_outputs()?;
        self.go_to_measurement()?;
        Ok(outputs)
    }

    /// Poll the pipes once, returning whether new measurements were decoded.
    pub fn update(&mut self) -> Result<bool, XbusError> {
        Ok(self.xbus.read()?.has_new_measurements())
    }
}
