use crate::error::ScanError;
use crate::hal::ScannerIo;
use crate::pulse::PulseTimer;

/// Noise reduction by repeated sampling: the arithmetic mean of a fixed
/// number of pulse measurements.
///
/// A failed measurement fails the whole aggregate. Averaging over a wiring
/// fault would hand the caller a plausible-looking but meaningless value.
pub struct SampleAggregator {
    timer: PulseTimer,
    sample_count: u32,
}

impl SampleAggregator {
    pub fn new(timer: PulseTimer, sample_count: u32) -> Self {
        Self {
            timer,
            sample_count,
        }
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }

    pub fn timer(&self) -> &PulseTimer {
        &self.timer
    }

    pub fn measure_robust(&mut self, io: &mut dyn ScannerIo) -> Result<f64, ScanError> {
        if self.sample_count == 0 {
            return Err(ScanError::InvalidConfig(
                "sample count must be positive".into(),
            ));
        }
        let mut total = 0.0;
        for sample in 0..self.sample_count {
            let cm = self.timer.measure_once(io)?;
            log::trace!("sample {sample}: {cm:.2}cm");
            total += cm;
        }
        Ok(total / self.sample_count as f64)
    }
}
