use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Runtime configuration. Every timing and geometry constant of the scanner
/// is a flag; the defaults match the deployed rig (BCM pins 23/24 for the
/// sensor, 13/19/26/6 for the stepper coils, 50 angles of 30 half-steps).
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub show_help: bool,
    pub simulate: bool,
    pub json_logs: bool,
    pub trigger_pin: u8,
    pub echo_pin: u8,
    /// Single-wire sensor wiring; overrides trigger/echo pins.
    pub shared_pin: Option<u8>,
    pub stepper_pins: [u8; 4],
    /// Continuous-servo actuator; overrides the stepper.
    pub servo_pin: Option<u8>,
    pub angles: u32,
    pub steps_per_angle: u32,
    pub samples: u32,
    pub dwell_ms: u64,
    pub settle_ms: u64,
    pub pulse_us: u64,
    pub echo_timeout_ms: u64,
    pub speed_of_sound: f64,
    pub overshoot_steps: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            show_help: false,
            simulate: false,
            json_logs: false,
            trigger_pin: 23,
            echo_pin: 24,
            shared_pin: None,
            stepper_pins: [13, 19, 26, 6],
            servo_pin: None,
            angles: 50,
            steps_per_angle: 30,
            samples: 3,
            dwell_ms: 50,
            settle_ms: 2_000,
            pulse_us: 5,
            echo_timeout_ms: 250,
            speed_of_sound: 17_150.0,
            overshoot_steps: 360 * 5,
        }
    }
}

/// Optional JSON config file; any flag given on the command line wins over
/// the file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    simulate: Option<bool>,
    json_logs: Option<bool>,
    trigger_pin: Option<u8>,
    echo_pin: Option<u8>,
    shared_pin: Option<u8>,
    stepper_pins: Option<[u8; 4]>,
    servo_pin: Option<u8>,
    angles: Option<u32>,
    steps_per_angle: Option<u32>,
    samples: Option<u32>,
    dwell_ms: Option<u64>,
    settle_ms: Option<u64>,
    pulse_us: Option<u64>,
    echo_timeout_ms: Option<u64>,
    speed_of_sound: Option<f64>,
    overshoot_steps: Option<u32>,
}

impl FileConfig {
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply(self, cfg: &mut RuntimeConfig) {
        macro_rules! take {
            ($field:ident) => {
                if let Some(value) = self.$field {
                    cfg.$field = value;
                }
            };
        }
        take!(simulate);
        take!(json_logs);
        take!(trigger_pin);
        take!(echo_pin);
        take!(stepper_pins);
        take!(angles);
        take!(steps_per_angle);
        take!(samples);
        take!(dwell_ms);
        take!(settle_ms);
        take!(pulse_us);
        take!(echo_timeout_ms);
        take!(speed_of_sound);
        take!(overshoot_steps);
        if self.shared_pin.is_some() {
            cfg.shared_pin = self.shared_pin;
        }
        if self.servo_pin.is_some() {
            cfg.servo_pin = self.servo_pin;
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let args: Vec<String> = std::env::args().collect();
        Self::from_args(&args)
    }

    pub fn from_args(args: &[String]) -> Result<Self, ConfigError> {
        let mut cfg = RuntimeConfig::default();

        // The file is applied first so that flags can override it.
        let mut i = 1;
        while i < args.len() {
            if args[i] == "--config" && i + 1 < args.len() {
                FileConfig::load(Path::new(&args[i + 1]))?.apply(&mut cfg);
            }
            i += 1;
        }

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--simulate" => {
                    cfg.simulate = true;
                }
                "--json-logs" => {
                    cfg.json_logs = true;
                }
                "--config" => {
                    i += 1;
                }
                "--trigger-pin" => {
                    if i + 1 < args.len() {
                        cfg.trigger_pin = args[i + 1].parse().unwrap_or(cfg.trigger_pin);
                        i += 1;
                    }
                }
                "--echo-pin" => {
                    if i + 1 < args.len() {
                        cfg.echo_pin = args[i + 1].parse().unwrap_or(cfg.echo_pin);
                        i += 1;
                    }
                }
                "--shared-pin" => {
                    if i + 1 < args.len() {
                        cfg.shared_pin = args[i + 1].parse().ok();
                        i += 1;
                    }
                }
                "--stepper-pins" => {
                    if i + 1 < args.len() {
                        if let Some(pins) = parse_pin_list(&args[i + 1]) {
                            cfg.stepper_pins = pins;
                        }
                        i += 1;
                    }
                }
                "--servo-pin" => {
                    if i + 1 < args.len() {
                        cfg.servo_pin = args[i + 1].parse().ok();
                        i += 1;
                    }
                }
                "--angles" => {
                    if i + 1 < args.len() {
                        cfg.angles = args[i + 1].parse().unwrap_or(cfg.angles);
                        i += 1;
                    }
                }
                "--steps-per-angle" => {
                    if i + 1 < args.len() {
                        cfg.steps_per_angle = args[i + 1].parse().unwrap_or(cfg.steps_per_angle);
                        i += 1;
                    }
                }
                "--samples" => {
                    if i + 1 < args.len() {
                        cfg.samples = args[i + 1].parse().unwrap_or(cfg.samples);
                        i += 1;
                    }
                }
                "--dwell-ms" => {
                    if i + 1 < args.len() {
                        cfg.dwell_ms = args[i + 1].parse().unwrap_or(cfg.dwell_ms);
                        i += 1;
                    }
                }
                "--settle-ms" => {
                    if i + 1 < args.len() {
                        cfg.settle_ms = args[i + 1].parse().unwrap_or(cfg.settle_ms);
                        i += 1;
                    }
                }
                "--pulse-us" => {
                    if i + 1 < args.len() {
                        cfg.pulse_us = args[i + 1].parse().unwrap_or(cfg.pulse_us);
                        i += 1;
                    }
                }
                "--echo-timeout-ms" => {
                    if i + 1 < args.len() {
                        cfg.echo_timeout_ms = args[i + 1].parse().unwrap_or(cfg.echo_timeout_ms);
                        i += 1;
                    }
                }
                "--speed-of-sound" => {
                    if i + 1 < args.len() {
                        cfg.speed_of_sound = args[i + 1].parse().unwrap_or(cfg.speed_of_sound);
                        i += 1;
                    }
                }
                "--overshoot-steps" => {
                    if i + 1 < args.len() {
                        cfg.overshoot_steps = args[i + 1].parse().unwrap_or(cfg.overshoot_steps);
                        i += 1;
                    }
                }
                "--help" | "-h" => {
                    cfg.show_help = true;
                    break;
                }
                _ => {}
            }
            i += 1;
        }
        Ok(cfg)
    }

    pub fn print_help() {
        println!(
            r#"polar-scan - rotating ultrasonic range scanner

Sweeps an ultrasonic sensor head through a sequence of angular positions
and prints one distance (cm) per position to stdout. Diagnostics go to
stderr.

USAGE:
    polar-scan [OPTIONS]

OPTIONS:
    --simulate              Run against the simulated rig (no GPIO access)
    --config <PATH>         Load settings from a JSON file (flags override)
    --trigger-pin <BCM>     Ultrasonic trigger pin [default: 23]
    --echo-pin <BCM>        Ultrasonic echo pin [default: 24]
    --shared-pin <BCM>      Single-wire sensor on one pin (overrides the two above)
    --stepper-pins <A,B,C,D> Stepper coil pins [default: 13,19,26,6]
    --servo-pin <BCM>       Drive a continuous servo instead of the stepper
    --angles <N>            Angular positions per sweep [default: 50]
    --steps-per-angle <N>   Half-steps between positions [default: 30]
    --samples <N>           Measurements averaged per position [default: 3]
    --dwell-ms <MS>         Coil dwell per half-step [default: 50]
    --settle-ms <MS>        Quiet period before each trigger [default: 2000]
    --pulse-us <US>         Trigger pulse width [default: 5]
    --echo-timeout-ms <MS>  Deadline per echo edge [default: 250]
    --speed-of-sound <CM_S> Effective speed of sound [default: 17150]
    --overshoot-steps <N>   Extra reverse steps after the unwind [default: 1800]
    --json-logs             Output diagnostics in JSON format
    -h, --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log filter (e.g., RUST_LOG=debug,scan_core=trace)

EXAMPLES:
    # Host run against the simulated rig
    polar-scan --simulate --angles 10

    # Full sweep on hardware (build with --features rpi)
    polar-scan --samples 10 --echo-timeout-ms 100
"#
        );
    }
}

fn parse_pin_list(raw: &str) -> Option<[u8; 4]> {
    let pins: Vec<u8> = raw.split(',').filter_map(|p| p.trim().parse().ok()).collect();
    <[u8; 4]>::try_from(pins).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("polar-scan")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn defaults_match_the_deployed_rig() {
        let cfg = RuntimeConfig::from_args(&args(&[])).unwrap();
        assert_eq!(cfg.trigger_pin, 23);
        assert_eq!(cfg.echo_pin, 24);
        assert_eq!(cfg.stepper_pins, [13, 19, 26, 6]);
        assert_eq!(cfg.angles, 50);
        assert_eq!(cfg.steps_per_angle, 30);
        assert_eq!(cfg.samples, 3);
        assert_eq!(cfg.overshoot_steps, 1800);
        assert!(!cfg.simulate);
    }

    #[test]
    fn flags_override_defaults() {
        let cfg = RuntimeConfig::from_args(&args(&[
            "--simulate",
            "--angles",
            "5",
            "--stepper-pins",
            "5,6,7,8",
            "--shared-pin",
            "17",
        ]))
        .unwrap();
        assert!(cfg.simulate);
        assert_eq!(cfg.angles, 5);
        assert_eq!(cfg.stepper_pins, [5, 6, 7, 8]);
        assert_eq!(cfg.shared_pin, Some(17));
    }

    #[test]
    fn config_file_applies_and_flags_still_win() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"angles": 7, "samples": 10}}"#).unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let cfg =
            RuntimeConfig::from_args(&args(&["--config", &path, "--samples", "2"])).unwrap();
        assert_eq!(cfg.angles, 7);
        assert_eq!(cfg.samples, 2);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let err = RuntimeConfig::from_args(&args(&["--config", "/nonexistent.json"])).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn malformed_pin_list_is_ignored() {
        let cfg = RuntimeConfig::from_args(&args(&["--stepper-pins", "1,2,3"])).unwrap();
        assert_eq!(cfg.stepper_pins, [13, 19, 26, 6]);
    }
}
