use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinLevel {
    Low,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinDirection {
    Input,
    Output,
}

/// Errors reported by a GPIO backend
#[derive(Debug, Error)]
pub enum HalError {
    #[error("pin {pin} is not available: {reason}")]
    PinUnavailable { pin: u8, reason: String },

    #[error("gpio access denied: {0}")]
    PermissionDenied(String),

    #[error("gpio i/o failure: {0}")]
    Io(String),
}

/// GPIO capability consumed by the scanner. Pin numbers use BCM-style
/// logical numbering.
///
/// `now_us` is monotonic with microsecond resolution; edge timing and the
/// poll deadlines depend on it, wall-clock time must not leak in here.
pub trait ScannerIo: Send {
    fn configure(&mut self, pin: u8, direction: PinDirection) -> Result<(), HalError>;
    fn write(&mut self, pin: u8, level: PinLevel) -> Result<(), HalError>;
    fn read(&mut self, pin: u8) -> Result<PinLevel, HalError>;
    fn now_us(&self) -> u64;
    fn delay_us(&mut self, us: u64);
}
