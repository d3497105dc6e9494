pub mod clock;
pub mod constants;
pub mod device;
pub mod error;
pub mod frame;
pub mod mtdata2;
pub mod notification;
pub mod pipe;
pub mod sequencer;
pub mod state;
pub mod transport;

// Re-export the engine and driver types for easy access
pub use clock::{Clock, StdClock};
pub use device::{MeasurementOutcome, ReadReport, Xbus, XbusConfig};
pub use error::XbusError;
pub use frame::MessageId;
pub use mtdata2::{DataId, DataIdentifier, Measurement};
pub use notification::{FirmwareRevision, Notification};
pub use pipe::{Pipe, PipeStatus};
pub use sequencer::{Mti, OutputConfiguration, SequencerConfig};
pub use state::{DeviceFamily, DeviceState};
pub use transport::{DataReady, I2cTransport, Transport};
