use crate::source::IqSample;
use rustfft::{num_complex::Complex, FftPlanner};
use std::f32::consts::PI;

/// Generate Blackman window coefficients
/// Better sidelobe suppression (-58 dB) than Hann (-31 dB) at cost of wider main lobe
fn blackman_window(size: usize) -> Vec<f32> {
    if size < 2 {
        return vec![1.0; size];
    }
    let a0 = 0.42;
    let a1 = 0.5;
    let a2 = 0.08;
    (0..size)
        .map(|n| {
            let x = n as f32 / (size - 1) as f32;
            a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
        })
        .collect()
}

/// Signal-level readout for the verbose status line: peak FFT bin power of
/// an outgoing block. Caches the window between blocks of the same length.
pub struct LevelMonitor {
    planner: FftPlanner<f32>,
    window: Vec<f32>,
}

impl LevelMonitor {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
            window: Vec::new(),
        }
    }

    /// Peak FFT bin power in dB, DC bin excluded, Blackman-windowed to
    /// reduce spectral leakage.
    pub fn peak_power_db(&mut self, samples: &[IqSample]) -> f32 {
        if samples.is_empty() {
            return f32::NEG_INFINITY;
        }

        let fft_size = samples.len();
        if self.window.len() != fft_size {
            self.window = blackman_window(fft_size);
        }
        let fft = self.planner.plan_fft_forward(fft_size);

        let mut buffer: Vec<Complex<f32>> = samples
            .iter()
            .zip(self.window.iter())
            .map(|(s, w)| Complex::new(s.i * w, s.q * w))
            .collect();

        fft.process(&mut buffer);

        let peak_power = buffer
            .iter()
            .skip(1)
            .map(|c| c.norm_sqr())
            .fold(0.0f32, f32::max);

        let normalized_power = peak_power / (fft_size * fft_size) as f32;
        10.0 * normalized_power.log10()
    }
}
