mod runtime;

#[cfg(feature = "rpi")]
mod hal_rpi;

use std::process::ExitCode;

fn main() -> ExitCode {
    runtime::run_from_args()
}
