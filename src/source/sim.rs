use std::f64::consts::TAU;
use std::thread;
use std::time::{Duration, Instant};

use super::{DeviceError, IqSample, SampleBlock, SampleSource, MAX_BLOCK_PAIRS};
use crate::tuning::DEFAULT_SAMPLE_RATE;

const MAX_RATE_HZ: f64 = 80e6;
const MIN_FREQUENCY_HZ: f64 = 100e3;
const MAX_FREQUENCY_HZ: f64 = 3.8e9;

/// Pacing lag beyond which the generator drops behind real time and resets
/// instead of bursting to catch up.
const MAX_LAG: Duration = Duration::from_millis(100);

/// Stand-in for receiver hardware: a complex tone at a fixed offset from the
/// tuned center frequency, delivered in 10 ms blocks paced to wall time.
pub struct SignalGenSource {
    sample_rate: f64,
    tone_offset_hz: f64,
    amplitude: f32,
    phase: f64,
    running: bool,
    next_due: Instant,
}

impl SignalGenSource {
    pub fn new() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            tone_offset_hz: 25_000.0,
            amplitude: 0.5,
            phase: 0.0,
            running: false,
            next_due: Instant::now(),
        }
    }

    fn block_pairs(&self) -> usize {
        ((self.sample_rate / 100.0) as usize).clamp(1, MAX_BLOCK_PAIRS)
    }
}

impl SampleSource for SignalGenSource {
    fn configure_sample_rate(&mut self, rate: f64) -> Result<(), DeviceError> {
        if !rate.is_finite() || rate <= 0.0 || rate > MAX_RATE_HZ {
            return Err(DeviceError::UnsupportedRate(rate));
        }
        self.sample_rate = rate;
        Ok(())
    }

    fn configure_frequency(&mut self, hz: f64) -> Result<(), DeviceError> {
        if !(MIN_FREQUENCY_HZ..=MAX_FREQUENCY_HZ).contains(&hz) {
            return Err(DeviceError::FrequencyOutOfRange(hz));
        }
        // a retune glitches the oscillator
        self.phase = 0.0;
        Ok(())
    }

    fn start_stream(&mut self) -> Result<(), DeviceError> {
        if self.running {
            return Err(DeviceError::StreamSetup("stream already running".into()));
        }
        self.running = true;
        self.next_due = Instant::now();
        Ok(())
    }

    fn stop_stream(&mut self) {
        self.running = false;
    }

    fn read_block(&mut self, max_wait: Duration) -> SampleBlock {
        if !self.running {
            return Vec::new();
        }

        let now = Instant::now();
        if self.next_due > now {
            let wait = self.next_due - now;
            if wait > max_wait {
                thread::sleep(max_wait);
                return Vec::new();
            }
            thread::sleep(wait);
        } else if now - self.next_due > MAX_LAG {
            self.next_due = now;
        }

        let pairs = self.block_pairs();
        let step = TAU * self.tone_offset_hz / self.sample_rate;
        let block: SampleBlock = (0..pairs)
            .map(|n| {
                let ph = self.phase + step * n as f64;
                IqSample::new(
                    self.amplitude * ph.cos() as f32,
                    self.amplitude * ph.sin() as f32,
                )
            })
            .collect();
        self.phase = (self.phase + step * pairs as f64).rem_euclid(TAU);
        self.next_due += Duration::from_secs_f64(pairs as f64 / self.sample_rate);

        block
    }
}
