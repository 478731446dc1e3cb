use crate::runtime::config::RuntimeConfig;
use crate::runtime::logging::init_tracing;
use scan_core::{
    HalError, PinDirection, PinLevel, PulseConfig, PulseTimer, SampleAggregator, SampleSink,
    ScanController, ScanError, ScannerIo, SensorMode, ServoDrive, SimulatedRig, StepperDriver,
    SweepConfig, SweepDrive, SweepState,
};
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use tracing::{error, info, info_span};

enum Rig {
    Simulated(SimulatedRig),
    #[cfg(feature = "rpi")]
    Rpi(crate::hal_rpi::RppalRig),
}

impl ScannerIo for Rig {
    fn configure(&mut self, pin: u8, direction: PinDirection) -> Result<(), HalError> {
        match self {
            Self::Simulated(rig) => rig.configure(pin, direction),
            #[cfg(feature = "rpi")]
            Self::Rpi(rig) => rig.configure(pin, direction),
        }
    }

    fn write(&mut self, pin: u8, level: PinLevel) -> Result<(), HalError> {
        match self {
            Self::Simulated(rig) => rig.write(pin, level),
            #[cfg(feature = "rpi")]
            Self::Rpi(rig) => rig.write(pin, level),
        }
    }

    fn read(&mut self, pin: u8) -> Result<PinLevel, HalError> {
        match self {
            Self::Simulated(rig) => rig.read(pin),
            #[cfg(feature = "rpi")]
            Self::Rpi(rig) => rig.read(pin),
        }
    }

    fn now_us(&self) -> u64 {
        match self {
            Self::Simulated(rig) => rig.now_us(),
            #[cfg(feature = "rpi")]
            Self::Rpi(rig) => rig.now_us(),
        }
    }

    fn delay_us(&mut self, us: u64) {
        match self {
            Self::Simulated(rig) => rig.delay_us(us),
            #[cfg(feature = "rpi")]
            Self::Rpi(rig) => rig.delay_us(us),
        }
    }
}

/// Writes one distance per line to stdout, flushed per sample so a consumer
/// can render progress live.
struct StdoutSink {
    out: io::Stdout,
}

/// Shortest decimal form that still always carries a fraction ("10.0",
/// "20.5", "15.25"). Values arrive already rounded to 2 decimals.
fn format_distance(distance_cm: f64) -> String {
    if distance_cm.fract() == 0.0 {
        format!("{distance_cm:.1}")
    } else {
        format!("{distance_cm}")
    }
}

impl SampleSink for StdoutSink {
    fn emit(&mut self, _angle: u32, distance_cm: f64) -> Result<(), ScanError> {
        let mut lock = self.out.lock();
        writeln!(lock, "{}", format_distance(distance_cm))?;
        lock.flush()?;
        Ok(())
    }
}

pub fn run_from_args() -> ExitCode {
    let config = match RuntimeConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("polar-scan: {err}");
            return ExitCode::FAILURE;
        }
    };
    if config.show_help {
        RuntimeConfig::print_help();
        return ExitCode::SUCCESS;
    }
    run(config)
}

pub fn run(config: RuntimeConfig) -> ExitCode {
    init_tracing(config.json_logs);

    match sweep_once(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn sweep_once(config: &RuntimeConfig) -> Result<(), ScanError> {
    let mode = match config.shared_pin {
        Some(pin) => SensorMode::SharedPin { pin },
        None => SensorMode::DualPin {
            trigger: config.trigger_pin,
            echo: config.echo_pin,
        },
    };
    let pulse_config = PulseConfig {
        mode,
        trigger_pulse_us: config.pulse_us,
        settle_us: config.settle_ms * 1_000,
        speed_of_sound_cm_s: config.speed_of_sound,
        echo_timeout_us: config.echo_timeout_ms * 1_000,
    };
    info!(
        sensor = %serde_json::to_string(&pulse_config).unwrap_or_default(),
        "sensor configured"
    );

    let sweep_config = SweepConfig::new(
        config.angles,
        config.steps_per_angle,
        config.samples,
        config.overshoot_steps,
    )
    .validate()?;

    let sampler = SampleAggregator::new(PulseTimer::new(pulse_config), config.samples);
    let drive = match config.servo_pin {
        Some(pin) => SweepDrive::Servo(ServoDrive::new(pin)),
        None => SweepDrive::Stepper(StepperDriver::new(
            config.stepper_pins,
            config.dwell_ms * 1_000,
        )),
    };

    let mut rig = open_rig(config, mode)?;
    let mut controller = ScanController::new(sweep_config, sampler, drive);
    let mut sink = StdoutSink { out: io::stdout() };
    let stop = AtomicBool::new(false);

    {
        let _span = info_span!("sweep", angles = config.angles).entered();
        controller.scan(&mut rig, &mut sink, &stop)?;
    }
    if controller.state() == SweepState::Returning {
        let _span = info_span!("return_to_start").entered();
        controller.return_to_start(&mut rig)?;
    }

    info!(
        stats = %serde_json::to_string(controller.stats()).unwrap_or_default(),
        "sweep complete"
    );
    Ok(())
}

fn open_rig(config: &RuntimeConfig, mode: SensorMode) -> Result<Rig, ScanError> {
    if config.simulate {
        let rig = SimulatedRig::new().with_sensor(mode.trigger_pin(), mode.echo_pin());
        return Ok(Rig::Simulated(rig));
    }
    #[cfg(feature = "rpi")]
    {
        let rig = crate::hal_rpi::RppalRig::open()?;
        Ok(Rig::Rpi(rig))
    }
    #[cfg(not(feature = "rpi"))]
    {
        Err(ScanError::InvalidConfig(
            "built without the rpi feature; run on hardware with --features rpi, or pass --simulate"
                .into(),
        ))
    }
}
