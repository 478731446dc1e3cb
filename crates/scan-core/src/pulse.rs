//! Ultrasonic pulse timing.
//!
//! Fires a short pulse on the trigger line, then times the echo line's
//! high window with bounded polls on both edges. Elapsed time converts to
//! centimeters through the speed-of-sound constant.

use crate::error::{EchoEdge, ScanError};
use crate::hal::{PinDirection, PinLevel, ScannerIo};
use serde::Serialize;

/// How the sensor is wired up.
///
/// `SharedPin` covers single-wire sensors where the trigger and the echo
/// travel on the same line; the measured time then covers the round trip
/// on that line, hence the extra divisor of 2 in the distance conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SensorMode {
    DualPin { trigger: u8, echo: u8 },
    SharedPin { pin: u8 },
}

impl SensorMode {
    pub fn trigger_pin(&self) -> u8 {
        match *self {
            SensorMode::DualPin { trigger, .. } => trigger,
            SensorMode::SharedPin { pin } => pin,
        }
    }

    pub fn echo_pin(&self) -> u8 {
        match *self {
            SensorMode::DualPin { echo, .. } => echo,
            SensorMode::SharedPin { pin } => pin,
        }
    }

    pub fn round_trip_divisor(&self) -> f64 {
        match self {
            SensorMode::DualPin { .. } => 1.0,
            SensorMode::SharedPin { .. } => 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PulseConfig {
    pub mode: SensorMode,
    /// Width of the high pulse on the trigger line.
    pub trigger_pulse_us: u64,
    /// Quiet period before each trigger so residue from the previous pulse
    /// cannot be misread as the new echo.
    pub settle_us: u64,
    /// Effective speed of sound in cm/s. The default already folds in the
    /// out-and-back travel of the sound wave for a dual-pin sensor.
    pub speed_of_sound_cm_s: f64,
    /// Deadline for each echo edge poll.
    pub echo_timeout_us: u64,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            mode: SensorMode::DualPin {
                trigger: 23,
                echo: 24,
            },
            trigger_pulse_us: 5,
            settle_us: 2_000_000,
            speed_of_sound_cm_s: 17_150.0,
            echo_timeout_us: 250_000,
        }
    }
}

/// Distance in centimeters for an echo of the given high-level duration.
/// A zero duration is a valid zero-distance reading.
pub fn distance_from_echo(duration_us: u64, config: &PulseConfig) -> f64 {
    let duration_s = duration_us as f64 / 1_000_000.0;
    duration_s * config.speed_of_sound_cm_s / config.mode.round_trip_divisor()
}

pub struct PulseTimer {
    config: PulseConfig,
}

impl PulseTimer {
    pub fn new(config: PulseConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PulseConfig {
        &self.config
    }

    /// Fire one pulse and time its echo.
    pub fn measure_once(&mut self, io: &mut dyn ScannerIo) -> Result<f64, ScanError> {
        let trigger = self.config.mode.trigger_pin();
        let echo = self.config.mode.echo_pin();

        io.configure(trigger, PinDirection::Output)?;
        io.write(trigger, PinLevel::Low)?;
        io.delay_us(self.config.settle_us);

        io.write(trigger, PinLevel::High)?;
        io.delay_us(self.config.trigger_pulse_us);
        io.write(trigger, PinLevel::Low)?;

        // In shared-pin mode the line must only flip to input after the
        // trigger pulse has been driven out.
        io.configure(echo, PinDirection::Input)?;

        let t0 = wait_for_level(
            io,
            echo,
            PinLevel::High,
            self.config.echo_timeout_us,
            EchoEdge::Rising,
        )?;
        let t1 = wait_for_level(
            io,
            echo,
            PinLevel::Low,
            self.config.echo_timeout_us,
            EchoEdge::Falling,
        )?;

        let duration_us = t1.saturating_sub(t0);
        let distance_cm = distance_from_echo(duration_us, &self.config);
        log::debug!("echo high for {duration_us}us -> {distance_cm:.2}cm");
        Ok(distance_cm)
    }
}

/// Poll `pin` until it reads `target`, returning the timestamp right after
/// the transition was observed. Gives up once `timeout_us` has elapsed.
fn wait_for_level(
    io: &mut dyn ScannerIo,
    pin: u8,
    target: PinLevel,
    timeout_us: u64,
    edge: EchoEdge,
) -> Result<u64, ScanError> {
    let deadline = io.now_us() + timeout_us;
    loop {
        if io.read(pin)? == target {
            return Ok(io.now_us());
        }
        if io.now_us() >= deadline {
            return Err(ScanError::EchoTimeout {
                edge,
                waited_us: timeout_us,
            });
        }
    }
}
