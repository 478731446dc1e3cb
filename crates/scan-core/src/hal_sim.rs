use crate::hal::{HalError, PinDirection, PinLevel, ScannerIo};
use std::collections::{HashMap, VecDeque};

/// Virtual cost of one level read, so that polling loops make progress
/// against the simulated clock.
const READ_COST_US: u64 = 1;

/// A recorded pin write, timestamped on the virtual clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinEvent {
    pub at_us: u64,
    pub pin: u8,
    pub level: PinLevel,
}

/// Simulated scanner rig behind the `ScannerIo` seam.
///
/// Time is virtual: `delay_us` advances the clock directly and each read
/// costs [`READ_COST_US`]. A high-then-low write on the attached trigger pin
/// arms an echo window on the attached echo pin after a fixed latency; the
/// window duration comes from the scripted queue, falling back to
/// `default_echo_us` when the script is exhausted. A scripted `None` means
/// the echo never arrives and the caller is expected to time out.
#[derive(Debug)]
pub struct SimulatedRig {
    clock_us: u64,
    directions: HashMap<u8, PinDirection>,
    output_levels: HashMap<u8, PinLevel>,
    events: Vec<PinEvent>,
    trigger_pin: Option<u8>,
    echo_pin: Option<u8>,
    echo_latency_us: u64,
    echo_script: VecDeque<Option<u64>>,
    default_echo_us: Option<u64>,
    echo_window: Option<(u64, u64)>,
}

impl SimulatedRig {
    pub fn new() -> Self {
        Self {
            clock_us: 0,
            directions: HashMap::new(),
            output_levels: HashMap::new(),
            events: Vec::new(),
            trigger_pin: None,
            echo_pin: None,
            echo_latency_us: 100,
            echo_script: VecDeque::new(),
            // ~100cm at the default speed-of-sound constant
            default_echo_us: Some(5_831),
            echo_window: None,
        }
    }

    /// Attach the ultrasonic sensor. Pass the same pin twice for the
    /// single-wire wiring mode.
    pub fn with_sensor(mut self, trigger_pin: u8, echo_pin: u8) -> Self {
        self.trigger_pin = Some(trigger_pin);
        self.echo_pin = Some(echo_pin);
        self
    }

    /// Queue an echo of the given high-level duration for the next trigger.
    pub fn push_echo_us(&mut self, duration_us: u64) {
        self.echo_script.push_back(Some(duration_us));
    }

    /// Queue a trigger whose echo never arrives.
    pub fn push_no_echo(&mut self) {
        self.echo_script.push_back(None);
    }

    pub fn set_default_echo_us(&mut self, duration_us: Option<u64>) {
        self.default_echo_us = duration_us;
    }

    pub fn clock_us(&self) -> u64 {
        self.clock_us
    }

    pub fn events(&self) -> &[PinEvent] {
        &self.events
    }

    /// High pulses observed on `pin`, as (rise, fall) timestamp pairs.
    pub fn high_pulses_for(&self, pin: u8) -> Vec<(u64, u64)> {
        let mut pulses = Vec::new();
        let mut rise: Option<u64> = None;
        for ev in self.events.iter().filter(|ev| ev.pin == pin) {
            match ev.level {
                PinLevel::High => rise = Some(ev.at_us),
                PinLevel::Low => {
                    if let Some(r) = rise.take() {
                        pulses.push((r, ev.at_us));
                    }
                }
            }
        }
        pulses
    }

    fn arm_echo(&mut self) {
        let duration = match self.echo_script.pop_front() {
            Some(scripted) => scripted,
            None => self.default_echo_us,
        };
        self.echo_window = duration.map(|d| {
            let rise = self.clock_us + self.echo_latency_us;
            (rise, rise + d)
        });
    }
}

impl Default for SimulatedRig {
    fn default() -> Self {
        Self::new()
    }
}

impl ScannerIo for SimulatedRig {
    fn configure(&mut self, pin: u8, direction: PinDirection) -> Result<(), HalError> {
        self.directions.insert(pin, direction);
        Ok(())
    }

    fn write(&mut self, pin: u8, level: PinLevel) -> Result<(), HalError> {
        match self.directions.get(&pin) {
            Some(PinDirection::Output) => {}
            _ => {
                return Err(HalError::Io(format!(
                    "write to pin {pin} not configured as output"
                )))
            }
        }
        let prev = self.output_levels.insert(pin, level).unwrap_or(PinLevel::Low);
        self.events.push(PinEvent {
            at_us: self.clock_us,
            pin,
            level,
        });
        if Some(pin) == self.trigger_pin && prev == PinLevel::High && level == PinLevel::Low {
            self.arm_echo();
        }
        Ok(())
    }

    fn read(&mut self, pin: u8) -> Result<PinLevel, HalError> {
        let sampled_at = self.clock_us;
        self.clock_us += READ_COST_US;
        if Some(pin) == self.echo_pin {
            if let Some((rise, fall)) = self.echo_window {
                if sampled_at >= rise && sampled_at < fall {
                    return Ok(PinLevel::High);
                }
            }
            return Ok(PinLevel::Low);
        }
        Ok(self
            .output_levels
            .get(&pin)
            .copied()
            .unwrap_or(PinLevel::Low))
    }

    fn now_us(&self) -> u64 {
        self.clock_us
    }

    fn delay_us(&mut self, us: u64) {
        self.clock_us += us;
    }
}
