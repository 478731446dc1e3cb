pub mod drive;
pub mod error;
pub mod hal;
#[cfg(feature = "simulation")]
pub mod hal_sim;
pub mod pulse;
pub mod sampler;
pub mod sweep;
pub mod timebase;

pub use drive::{ServoDrive, StepDirection, StepperDriver, SweepDrive};
pub use error::{EchoEdge, ScanError};
pub use hal::{HalError, PinDirection, PinLevel, ScannerIo};
#[cfg(feature = "simulation")]
pub use hal_sim::{PinEvent, SimulatedRig};
pub use pulse::{distance_from_echo, PulseConfig, PulseTimer, SensorMode};
pub use sampler::SampleAggregator;
pub use sweep::{
    SampleSink, ScanController, ScanStats, SweepConfig, SweepState, Unvalidated, Validated,
};
pub use timebase::TimeBase;
