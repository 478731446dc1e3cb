//! Sweep actuators.
//!
//! The stepper is the primary drive: a unipolar 4-phase motor driven with
//! the two-phase-on half-step pattern. A continuous-rotation servo is the
//! alternative wiring, pulsed with software PWM at the standard 50Hz frame.

use crate::error::ScanError;
use crate::hal::{PinDirection, PinLevel, ScannerIo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDirection {
    Forward,
    Reverse,
}

/// 4-phase stepper on four GPIO lines.
///
/// At loop index `i` the phases `i % 4` and `(i + 1) % 4` are energized
/// together for one dwell, forward; reverse mirrors the mapping to
/// `(4 - i) % 4` and `(3 - i) % 4`. Two adjacent coils on at a time is
/// what doubles the angular resolution over single-phase drive, so the
/// pair tables are load-bearing.
pub struct StepperDriver {
    phase_pins: [u8; 4],
    dwell_us: u64,
    position: i64,
    configured: bool,
}

impl StepperDriver {
    pub fn new(phase_pins: [u8; 4], dwell_us: u64) -> Self {
        Self {
            phase_pins,
            dwell_us,
            position: 0,
            configured: false,
        }
    }

    /// Net half-steps from the starting position (reverse counts negative).
    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn phase_index(&self) -> u8 {
        self.position.rem_euclid(4) as u8
    }

    pub fn step(
        &mut self,
        io: &mut dyn ScannerIo,
        count: u32,
        direction: StepDirection,
    ) -> Result<(), ScanError> {
        if !self.configured {
            for pin in self.phase_pins {
                io.configure(pin, PinDirection::Output)?;
            }
            self.configured = true;
        }
        log::debug!("stepping {count} half-steps {direction:?}");
        for i in 0..i64::from(count) {
            let (a, b) = match direction {
                StepDirection::Forward => (i.rem_euclid(4), (i + 1).rem_euclid(4)),
                StepDirection::Reverse => ((4 - i).rem_euclid(4), (3 - i).rem_euclid(4)),
            };
            let first = self.phase_pins[a as usize];
            let second = self.phase_pins[b as usize];
            io.write(first, PinLevel::High)?;
            io.write(second, PinLevel::High)?;
            io.delay_us(self.dwell_us);
            io.write(first, PinLevel::Low)?;
            io.write(second, PinLevel::Low)?;
            self.position += match direction {
                StepDirection::Forward => 1,
                StepDirection::Reverse => -1,
            };
        }
        Ok(())
    }
}

impl Default for StepperDriver {
    fn default() -> Self {
        Self::new([13, 19, 26, 6], 50_000)
    }
}

/// Continuous-rotation servo on a single control line.
///
/// One "step" is one 20ms PWM frame; the pulse width picks the rotation
/// direction (2.0ms forward, 1.0ms reverse at full speed).
pub struct ServoDrive {
    control_pin: u8,
    frame_us: u64,
    forward_pulse_us: u64,
    reverse_pulse_us: u64,
    position: i64,
    configured: bool,
}

impl ServoDrive {
    pub fn new(control_pin: u8) -> Self {
        Self {
            control_pin,
            frame_us: 20_000,
            forward_pulse_us: 2_000,
            reverse_pulse_us: 1_000,
            position: 0,
            configured: false,
        }
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn step(
        &mut self,
        io: &mut dyn ScannerIo,
        count: u32,
        direction: StepDirection,
    ) -> Result<(), ScanError> {
        if !self.configured {
            io.configure(self.control_pin, PinDirection::Output)?;
            self.configured = true;
        }
        let pulse_us = match direction {
            StepDirection::Forward => self.forward_pulse_us,
            StepDirection::Reverse => self.reverse_pulse_us,
        };
        log::debug!("driving servo {count} frames {direction:?}");
        for _ in 0..count {
            io.write(self.control_pin, PinLevel::High)?;
            io.delay_us(pulse_us);
            io.write(self.control_pin, PinLevel::Low)?;
            io.delay_us(self.frame_us - pulse_us);
            self.position += match direction {
                StepDirection::Forward => 1,
                StepDirection::Reverse => -1,
            };
        }
        Ok(())
    }
}

/// Which actuator sweeps the sensor head.
pub enum SweepDrive {
    Stepper(StepperDriver),
    Servo(ServoDrive),
}

impl SweepDrive {
    pub fn step(
        &mut self,
        io: &mut dyn ScannerIo,
        count: u32,
        direction: StepDirection,
    ) -> Result<(), ScanError> {
        match self {
            Self::Stepper(drive) => drive.step(io, count, direction),
            Self::Servo(drive) => drive.step(io, count, direction),
        }
    }

    pub fn position(&self) -> i64 {
        match self {
            Self::Stepper(drive) => drive.position(),
            Self::Servo(drive) => drive.position(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal_sim::{PinEvent, SimulatedRig};

    const PINS: [u8; 4] = [13, 19, 26, 6];

    /// Pin pairs energized together, in firing order.
    fn energized_pairs(rig: &SimulatedRig) -> Vec<(u8, u8)> {
        let highs: Vec<&PinEvent> = rig
            .events()
            .iter()
            .filter(|ev| ev.level == PinLevel::High)
            .collect();
        highs.chunks(2).map(|pair| (pair[0].pin, pair[1].pin)).collect()
    }

    #[test]
    fn forward_pattern_walks_adjacent_phase_pairs() {
        let mut rig = SimulatedRig::new();
        let mut drive = StepperDriver::new(PINS, 10);
        drive.step(&mut rig, 5, StepDirection::Forward).unwrap();
        assert_eq!(
            energized_pairs(&rig),
            vec![(13, 19), (19, 26), (26, 6), (6, 13), (13, 19)]
        );
        assert_eq!(drive.position(), 5);
    }

    #[test]
    fn reverse_pattern_mirrors_the_phase_pairs() {
        let mut rig = SimulatedRig::new();
        let mut drive = StepperDriver::new(PINS, 10);
        drive.step(&mut rig, 4, StepDirection::Reverse).unwrap();
        assert_eq!(
            energized_pairs(&rig),
            vec![(13, 6), (6, 26), (26, 19), (19, 13)]
        );
        assert_eq!(drive.position(), -4);
    }

    #[test]
    fn forward_then_reverse_restores_the_phase_index() {
        for count in [0u32, 1, 4, 7, 13, 30] {
            let mut rig = SimulatedRig::new();
            let mut drive = StepperDriver::new(PINS, 0);
            drive.step(&mut rig, count, StepDirection::Forward).unwrap();
            drive.step(&mut rig, count, StepDirection::Reverse).unwrap();
            assert_eq!(drive.phase_index(), 0, "count {count}");
            assert_eq!(drive.position(), 0, "count {count}");
        }
    }

    #[test]
    fn each_half_step_holds_the_coils_for_one_dwell() {
        let mut rig = SimulatedRig::new();
        let mut drive = StepperDriver::new(PINS, 10);
        drive.step(&mut rig, 2, StepDirection::Forward).unwrap();
        for (rise, fall) in rig.high_pulses_for(13) {
            assert_eq!(fall - rise, 10);
        }
        assert_eq!(rig.clock_us(), 20);
    }

    #[test]
    fn servo_frames_use_direction_specific_pulse_widths() {
        let mut rig = SimulatedRig::new();
        let mut drive = ServoDrive::new(18);
        drive.step(&mut rig, 3, StepDirection::Forward).unwrap();
        drive.step(&mut rig, 2, StepDirection::Reverse).unwrap();
        let pulses = rig.high_pulses_for(18);
        assert_eq!(pulses.len(), 5);
        assert!(pulses[..3].iter().all(|(rise, fall)| fall - rise == 2_000));
        assert!(pulses[3..].iter().all(|(rise, fall)| fall - rise == 1_000));
        assert_eq!(drive.position(), 1);
    }
}
