use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::source::IqSample;
use crate::tuning::{BitDepth, TuningState};

/// Per-channel error-feedback dither state.
///
/// Holds the previous uniform draw for each channel; subtracting it from the
/// next draw yields triangularly-distributed noise, so quantization error is
/// decorrelated across consecutive samples of the same channel. Owned by one
/// session and re-seeded when the next session starts.
pub struct DitherState {
    prev_i: f32,
    prev_q: f32,
    rounding_acc: f32,
    rng: StdRng,
}

impl DitherState {
    /// Fresh state seeded from OS entropy.
    pub fn from_entropy() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_rng(mut rng: StdRng) -> Self {
        let prev_i = rng.gen::<f32>();
        let prev_q = rng.gen::<f32>();
        Self {
            prev_i,
            prev_q,
            rounding_acc: 0.0,
            rng,
        }
    }

    /// Accumulated rounding residual across all 8-bit samples emitted so
    /// far. Diagnostics only; never feeds back into the output.
    pub fn rounding_acc(&self) -> f32 {
        self.rounding_acc
    }
}

fn dither8(x: f32, gain: f32, prev: &mut f32, acc: &mut f32, rng: &mut StdRng) -> u8 {
    let rnd = rng.gen::<f32>(); // uniform [0,1)
    let y = gain * x + (rnd - *prev);
    let ry = y.round();
    *acc += y - ry;
    *prev = rnd;
    // no clamp: extreme gain/input combinations wrap, matching the
    // int -> u8 narrowing the wire format has always had
    (ry as i32 + 128) as u8
}

/// Quantize one block into wire bytes at the tuned gain and bit depth.
///
/// `out` is cleared and refilled; an empty block yields zero bytes. No I/O,
/// no side effects beyond `dither`.
pub fn quantize(
    block: &[IqSample],
    tuning: &TuningState,
    dither: &mut DitherState,
    out: &mut Vec<u8>,
) {
    out.clear();
    out.reserve(block.len() * tuning.bit_depth.bytes_per_pair());

    match tuning.bit_depth {
        BitDepth::Eight => {
            let g8 = 0.25 * tuning.gain_linear;
            for s in block {
                out.push(dither8(
                    s.i,
                    g8,
                    &mut dither.prev_i,
                    &mut dither.rounding_acc,
                    &mut dither.rng,
                ));
                out.push(dither8(
                    s.q,
                    g8,
                    &mut dither.prev_q,
                    &mut dither.rounding_acc,
                    &mut dither.rng,
                ));
            }
        }
        BitDepth::Sixteen => {
            let g16 = 4.0 * tuning.gain_linear;
            for s in block {
                for x in [s.i, s.q] {
                    let v = ((g16 * x).round() as i32) as i16;
                    out.extend_from_slice(&v.to_le_bytes());
                }
            }
        }
        BitDepth::ThirtyTwo => {
            // bit-exact passthrough, gain not applied
            for s in block {
                out.extend_from_slice(&s.i.to_le_bytes());
                out.extend_from_slice(&s.q.to_le_bytes());
            }
        }
    }
}
