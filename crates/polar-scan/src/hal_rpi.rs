//! Raspberry Pi GPIO backend over rppal.
//!
//! Pins are acquired lazily as `IoPin`s so the shared-pin sensor wiring can
//! flip a line between output (trigger) and input (echo) at runtime.

use rppal::gpio::{Error as GpioError, Gpio, IoPin, Mode};
use scan_core::{HalError, PinDirection, PinLevel, ScannerIo, TimeBase};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::thread;
use std::time::Duration;

pub struct RppalRig {
    gpio: Gpio,
    pins: HashMap<u8, IoPin>,
    timebase: TimeBase,
}

impl RppalRig {
    pub fn open() -> Result<Self, HalError> {
        let gpio = Gpio::new().map_err(map_gpio_err)?;
        Ok(Self {
            gpio,
            pins: HashMap::new(),
            timebase: TimeBase::new(),
        })
    }

    fn pin(&mut self, pin: u8) -> Result<&mut IoPin, HalError> {
        match self.pins.entry(pin) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let io_pin = self
                    .gpio
                    .get(pin)
                    .map_err(map_gpio_err)?
                    .into_io(Mode::Input);
                Ok(entry.insert(io_pin))
            }
        }
    }
}

impl ScannerIo for RppalRig {
    fn configure(&mut self, pin: u8, direction: PinDirection) -> Result<(), HalError> {
        let mode = match direction {
            PinDirection::Input => Mode::Input,
            PinDirection::Output => Mode::Output,
        };
        self.pin(pin)?.set_mode(mode);
        Ok(())
    }

    fn write(&mut self, pin: u8, level: PinLevel) -> Result<(), HalError> {
        let io_pin = self.pin(pin)?;
        match level {
            PinLevel::High => io_pin.set_high(),
            PinLevel::Low => io_pin.set_low(),
        }
        Ok(())
    }

    fn read(&mut self, pin: u8) -> Result<PinLevel, HalError> {
        let level = match self.pin(pin)?.read() {
            rppal::gpio::Level::High => PinLevel::High,
            rppal::gpio::Level::Low => PinLevel::Low,
        };
        Ok(level)
    }

    fn now_us(&self) -> u64 {
        self.timebase.now_us()
    }

    fn delay_us(&mut self, us: u64) {
        thread::sleep(Duration::from_micros(us));
    }
}

fn map_gpio_err(err: GpioError) -> HalError {
    match err {
        GpioError::PinNotAvailable(pin) => HalError::PinUnavailable {
            pin,
            reason: "not exposed by this board".into(),
        },
        GpioError::PermissionDenied(detail) => HalError::PermissionDenied(detail),
        other => HalError::Io(other.to_string()),
    }
}
