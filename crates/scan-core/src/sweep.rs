//! The sweep control loop.
//!
//! One pass: for each angular position, take an aggregated distance sample,
//! hand it to the sink, advance the actuator; after the last angle, unwind
//! the accumulated rotation plus a fixed overshoot so the head lands on a
//! known mechanical zero even if a few steps drifted.

use crate::drive::{StepDirection, SweepDrive};
use crate::error::ScanError;
use crate::hal::ScannerIo;
use crate::sampler::SampleAggregator;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy)]
pub struct Unvalidated;

#[derive(Debug, Clone, Copy)]
pub struct Validated;

/// Sweep geometry. Constructed unvalidated; every consumer takes the
/// `Validated` form, so bad parameters surface before any pin is touched.
#[derive(Debug, Clone, Copy)]
pub struct SweepConfig<State = Unvalidated> {
    pub num_angles: u32,
    pub steps_per_angle: u32,
    pub samples_per_angle: u32,
    pub return_overshoot_steps: u32,
    _state: PhantomData<State>,
}

impl SweepConfig<Unvalidated> {
    pub fn new(
        num_angles: u32,
        steps_per_angle: u32,
        samples_per_angle: u32,
        return_overshoot_steps: u32,
    ) -> Self {
        Self {
            num_angles,
            steps_per_angle,
            samples_per_angle,
            return_overshoot_steps,
            _state: PhantomData,
        }
    }

    pub fn validate(self) -> Result<SweepConfig<Validated>, ScanError> {
        if self.num_angles == 0 {
            return Err(ScanError::InvalidConfig(
                "number of angles must be positive".into(),
            ));
        }
        if self.steps_per_angle == 0 {
            return Err(ScanError::InvalidConfig(
                "steps per angle must be positive".into(),
            ));
        }
        if self.samples_per_angle == 0 {
            return Err(ScanError::InvalidConfig(
                "samples per angle must be positive".into(),
            ));
        }
        if self.num_angles.checked_mul(self.steps_per_angle).is_none() {
            return Err(ScanError::InvalidConfig(
                "sweep geometry overflows the step counter".into(),
            ));
        }
        Ok(SweepConfig {
            num_angles: self.num_angles,
            steps_per_angle: self.steps_per_angle,
            samples_per_angle: self.samples_per_angle,
            return_overshoot_steps: self.return_overshoot_steps,
            _state: PhantomData,
        })
    }
}

impl Default for SweepConfig<Unvalidated> {
    fn default() -> Self {
        Self::new(50, 30, 3, 360 * 5)
    }
}

/// Receives one distance per angular position, in sweep order.
pub trait SampleSink {
    fn emit(&mut self, angle: u32, distance_cm: f64) -> Result<(), ScanError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepState {
    Idle,
    Scanning,
    Returning,
    Done,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanStats {
    pub angles_scanned: u32,
    pub samples_taken: u32,
    pub steps_forward: u64,
    pub steps_reverse: u64,
    pub max_sample_us: u64,
}

pub struct ScanController {
    config: SweepConfig<Validated>,
    sampler: SampleAggregator,
    drive: SweepDrive,
    state: SweepState,
    stats: ScanStats,
}

impl ScanController {
    pub fn new(config: SweepConfig<Validated>, sampler: SampleAggregator, drive: SweepDrive) -> Self {
        Self {
            config,
            sampler,
            drive,
            state: SweepState::Idle,
            stats: ScanStats::default(),
        }
    }

    pub fn state(&self) -> SweepState {
        self.state
    }

    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    pub fn drive(&self) -> &SweepDrive {
        &self.drive
    }

    /// Full sweep: scan every angle, then return to the origin. A raised
    /// `stop` flag ends the run between angles without the return pass.
    pub fn run(
        &mut self,
        io: &mut dyn ScannerIo,
        sink: &mut dyn SampleSink,
        stop: &AtomicBool,
    ) -> Result<ScanStats, ScanError> {
        self.scan(io, sink, stop)?;
        if self.state == SweepState::Returning {
            self.return_to_start(io)?;
        }
        Ok(self.stats.clone())
    }

    /// Scanning phase: sample, emit, advance, once per angle.
    pub fn scan(
        &mut self,
        io: &mut dyn ScannerIo,
        sink: &mut dyn SampleSink,
        stop: &AtomicBool,
    ) -> Result<(), ScanError> {
        self.state = SweepState::Scanning;
        for angle in 0..self.config.num_angles {
            if stop.load(Ordering::Relaxed) {
                log::warn!("stop requested, ending sweep at angle {angle}");
                return Ok(());
            }
            let started_us = io.now_us();
            let distance_cm = self
                .sampler
                .measure_robust(io)
                .map_err(|source| ScanError::SweepAborted {
                    angle,
                    source: Box::new(source),
                })?;
            let elapsed_us = io.now_us().saturating_sub(started_us);
            self.stats.max_sample_us = self.stats.max_sample_us.max(elapsed_us);
            self.stats.samples_taken += self.config.samples_per_angle;

            let rounded = (distance_cm * 100.0).round() / 100.0;
            log::info!("angle {angle}: {rounded}cm");
            sink.emit(angle, rounded)
                .map_err(|source| ScanError::SweepAborted {
                    angle,
                    source: Box::new(source),
                })?;
            self.stats.angles_scanned += 1;

            self.drive
                .step(io, self.config.steps_per_angle, StepDirection::Forward)
                .map_err(|source| ScanError::SweepAborted {
                    angle,
                    source: Box::new(source),
                })?;
            self.stats.steps_forward += u64::from(self.config.steps_per_angle);
        }
        self.state = SweepState::Returning;
        Ok(())
    }

    /// Return phase: unwind the whole sweep, then the overshoot pass.
    pub fn return_to_start(&mut self, io: &mut dyn ScannerIo) -> Result<(), ScanError> {
        // validate() guarantees this product fits in u32
        let unwind = self.config.num_angles * self.config.steps_per_angle;
        self.drive.step(io, unwind, StepDirection::Reverse)?;
        self.stats.steps_reverse += u64::from(unwind);

        self.drive
            .step(io, self.config.return_overshoot_steps, StepDirection::Reverse)?;
        self.stats.steps_reverse += u64::from(self.config.return_overshoot_steps);

        self.state = SweepState::Done;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::StepperDriver;
    use crate::hal_sim::SimulatedRig;
    use crate::pulse::{PulseConfig, PulseTimer, SensorMode};

    struct VecSink(Vec<(u32, f64)>);

    impl SampleSink for VecSink {
        fn emit(&mut self, angle: u32, distance_cm: f64) -> Result<(), ScanError> {
            self.0.push((angle, distance_cm));
            Ok(())
        }
    }

    fn sampler(samples: u32) -> SampleAggregator {
        let config = PulseConfig {
            mode: SensorMode::DualPin {
                trigger: 23,
                echo: 24,
            },
            trigger_pulse_us: 5,
            settle_us: 10,
            speed_of_sound_cm_s: 10_000.0,
            echo_timeout_us: 5_000,
        };
        SampleAggregator::new(PulseTimer::new(config), samples)
    }

    fn controller(angles: u32, steps: u32, samples: u32, overshoot: u32) -> ScanController {
        let config = SweepConfig::new(angles, steps, samples, overshoot)
            .validate()
            .unwrap();
        let drive = SweepDrive::Stepper(StepperDriver::new([13, 19, 26, 6], 0));
        ScanController::new(config, sampler(samples), drive)
    }

    #[test]
    fn zero_angles_is_rejected_before_any_io() {
        let err = SweepConfig::new(0, 30, 3, 1800).validate().unwrap_err();
        assert!(matches!(err, ScanError::InvalidConfig(_)));
    }

    #[test]
    fn zero_samples_is_rejected_before_any_io() {
        let err = SweepConfig::new(50, 30, 0, 1800).validate().unwrap_err();
        assert!(matches!(err, ScanError::InvalidConfig(_)));
    }

    #[test]
    fn geometry_overflowing_the_step_counter_is_rejected() {
        let err = SweepConfig::new(u32::MAX, 2, 3, 1800).validate().unwrap_err();
        assert!(matches!(err, ScanError::InvalidConfig(_)));
    }

    #[test]
    fn sweep_emits_the_profile_then_returns_home_with_overshoot() {
        let mut rig = SimulatedRig::new().with_sensor(23, 24);
        for duration in [1_000, 2_050, 1_525] {
            rig.push_echo_us(duration);
        }
        let mut controller = controller(3, 10, 1, 1800);
        let mut sink = VecSink(Vec::new());
        let stop = AtomicBool::new(false);

        let stats = controller.run(&mut rig, &mut sink, &stop).unwrap();

        assert_eq!(sink.0, vec![(0, 10.0), (1, 20.5), (2, 15.25)]);
        assert_eq!(controller.state(), SweepState::Done);
        assert_eq!(stats.angles_scanned, 3);
        assert_eq!(stats.steps_forward, 30);
        assert_eq!(stats.steps_reverse, 30 + 1800);
        match controller.drive() {
            SweepDrive::Stepper(drive) => {
                assert_eq!(drive.position(), -1800);
                assert_eq!(drive.phase_index(), 0);
            }
            SweepDrive::Servo(_) => unreachable!(),
        }
    }

    #[test]
    fn timeout_aborts_at_the_failing_angle_with_no_further_samples() {
        let mut rig = SimulatedRig::new().with_sensor(23, 24);
        rig.push_echo_us(1_000);
        rig.push_no_echo();
        let mut controller = controller(3, 10, 1, 1800);
        let mut sink = VecSink(Vec::new());
        let stop = AtomicBool::new(false);

        let err = controller.run(&mut rig, &mut sink, &stop).unwrap_err();

        match err {
            ScanError::SweepAborted { angle, source } => {
                assert_eq!(angle, 1);
                assert!(matches!(*source, ScanError::EchoTimeout { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(sink.0, vec![(0, 10.0)]);
        assert_eq!(controller.state(), SweepState::Scanning);
    }

    #[test]
    fn sink_failure_aborts_at_the_failing_angle() {
        struct BrokenSink;

        impl SampleSink for BrokenSink {
            fn emit(&mut self, _angle: u32, _distance_cm: f64) -> Result<(), ScanError> {
                Err(ScanError::Output(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "consumer went away",
                )))
            }
        }

        let mut rig = SimulatedRig::new().with_sensor(23, 24);
        rig.push_echo_us(1_000);
        let mut controller = controller(3, 10, 1, 1800);
        let stop = AtomicBool::new(false);

        let err = controller
            .run(&mut rig, &mut BrokenSink, &stop)
            .unwrap_err();

        match err {
            ScanError::SweepAborted { angle, source } => {
                assert_eq!(angle, 0);
                assert!(matches!(*source, ScanError::Output(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn raised_stop_flag_ends_the_sweep_without_the_return_pass() {
        let mut rig = SimulatedRig::new().with_sensor(23, 24);
        let mut controller = controller(3, 10, 1, 1800);
        let mut sink = VecSink(Vec::new());
        let stop = AtomicBool::new(true);

        let stats = controller.run(&mut rig, &mut sink, &stop).unwrap();

        assert!(sink.0.is_empty());
        assert_eq!(stats.angles_scanned, 0);
        assert_eq!(stats.steps_reverse, 0);
        assert_eq!(controller.state(), SweepState::Scanning);
    }

    #[test]
    fn averaged_samples_feed_a_single_emission_per_angle() {
        let mut rig = SimulatedRig::new().with_sensor(23, 24);
        for duration in [1_000, 3_000] {
            rig.push_echo_us(duration);
        }
        let mut controller = controller(1, 5, 2, 100);
        let mut sink = VecSink(Vec::new());
        let stop = AtomicBool::new(false);

        let stats = controller.run(&mut rig, &mut sink, &stop).unwrap();

        assert_eq!(sink.0, vec![(0, 20.0)]);
        assert_eq!(stats.samples_taken, 2);
    }
}
