use std::f32::consts::PI;
use std::fmt;

use strum_macros::Display;

use crate::mtdata2::Measurement;
use crate::notification::{FirmwareRevision, Notification};

/// MTi product families, keyed by the digit after `MTi-` in the product code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeviceFamily {
    /// MTi-1 IMU: inertial data only
    #[strum(to_string = "MTi-1 IMU")]
    Imu,
    /// MTi-2 VRU / MTi-3 AHRS: orientation output
    #[strum(to_string = "MTi-2/3 VRU/AHRS")]
    VruAhrs,
    /// MTi-7 / MTi-8 GNSS/INS: orientation and position
    #[strum(to_string = "MTi-7/8 GNSS/INS")]
    GnssIns,
}

impl DeviceFamily {
    pub fn from_product_char(c: char) -> Option<Self> {
        match c {
            '1' => Some(DeviceFamily::Imu),
            '2' | '3' => Some(DeviceFamily::VruAhrs),
            '7' | '8' => Some(DeviceFamily::GnssIns),
            _ => None,
        }
    }
}

/// Last-known device data and lifecycle flags.
///
/// Vectors start out as NaN ("never received") and are overwritten in place
/// whenever a matching data element is decoded. They are never expired.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceState {
    /// m/s²
    pub acceleration: [f32; 3],
    /// rad/s
    pub rate_of_turn: [f32; 3],
    /// roll, pitch, yaw in degrees
    pub euler_angles: [f32; 3],
    /// degrees
    pub lat_lon: [f32; 2],
    /// true while the device is in configuration mode
    pub config_state: bool,
    /// family digit from the product code, once received
    pub product_code: Option<char>,
    pub product_text: Option<String>,
    pub firmware: Option<FirmwareRevision>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            acceleration: [f32::NAN; 3],
            rate_of_turn: [f32::NAN; 3],
            euler_angles: [f32::NAN; 3],
            lat_lon: [f32::NAN; 2],
            config_state: false,
            product_code: None,
            product_text: None,
            firmware: None,
        }
    }
}

fn same_bits(a: &[f32], b: &[f32]) -> bool {
    a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
}

/// Vectors compare bit for bit, so two states that never received a value
/// (NaN) are equal.
impl PartialEq for DeviceState {
    fn eq(&self, other: &Self) -> bool {
        same_bits(&self.acceleration, &other.acceleration)
            && same_bits(&self.rate_of_turn, &other.rate_of_turn)
            && same_bits(&self.euler_angles, &other.euler_angles)
            && same_bits(&self.lat_lon, &other.lat_lon)
            && self.config_state == other.config_state
            && self.product_code == other.product_code
            && self.product_text == other.product_text
            && self.firmware == other.firmware
    }
}

impl DeviceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store one decoded data element. Returns false for untracked identifiers.
    pub fn apply_measurement(&mut self, measurement: &Measurement) -> bool {
        match measurement {
            Measurement::EulerAngles(v) => self.euler_angles = *v,
            Measurement::Acceleration(v) => self.acceleration = *v,
            Measurement::RateOfTurn(v) => self.rate_of_turn = *v,
            Measurement::LatLon(v) => self.lat_lon = *v,
            Measurement::Other { .. } => return false,
        }
        true
    }

    /// Apply the lifecycle side effects of a notification.
    pub fn apply_notification(&mut self, notification: &Notification) {
        match notification {
            Notification::GoToConfigAck => self.config_state = true,
            Notification::GoToMeasurementAck => self.config_state = false,
            Notification::ProductCode { text, family } => {
                self.product_code = Some(*family);
                self.product_text = Some(text.clone());
            }
            Notification::FirmwareRevision(rev) => self.firmware = Some(*rev),
            _ => {}
        }
    }

    pub fn family(&self) -> Option<DeviceFamily> {
        self.product_code.and_then(DeviceFamily::from_product_char)
    }

    pub fn has_acceleration(&self) -> bool {
        !self.acceleration[0].is_nan()
    }

    pub fn has_rate_of_turn(&self) -> bool {
        !self.rate_of_turn[0].is_nan()
    }

    pub fn has_euler_angles(&self) -> bool {
        !self.euler_angles[0].is_nan()
    }

    pub fn has_lat_lon(&self) -> bool {
        !self.lat_lon[0].is_nan()
    }

    /// Rate of turn converted to degrees per second
    pub fn rate_of_turn_deg(&self) -> [f32; 3] {
        self.rate_of_turn.map(|r| r * 180.0 / PI)
    }
}

fn write_vector(f: &mut fmt::Formatter<'_>, label: &str, values: &[f32], precision: usize) -> fmt::Result {
    write!(f, "{}:", label)?;
    for v in values {
        write!(f, " {:.*}", precision, v)?;
    }
    writeln!(f)
}

impl fmt::Display for DeviceState {
    /// Only vectors received at least once are printed. Lat/lon is printed
    /// for GNSS devices even without a fix, where it still reads NaN.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_acceleration() {
            write_vector(f, "Acceleration [m/s^2]", &self.acceleration, 2)?;
        }
        if self.has_rate_of_turn() {
            write_vector(f, "Rate Of Turn [deg/s]", &self.rate_of_turn_deg(), 2)?;
        }
        if self.has_euler_angles() {
            write_vector(f, "Euler angles [deg]", &self.euler_angles, 2)?;
        }
        if self.has_lat_lon() || self.family() == Some(DeviceFamily::GnssIns) {
            write_vector(f, "Lat/Lon [deg]", &self.lat_lon, 5)?;
        }
        Ok(())
    }
}
