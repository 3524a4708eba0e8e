pub mod sim;

use std::time::Duration;

/// IQ sample pair (In-phase, Quadrature)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IqSample {
    pub i: f32,
    pub q: f32,
}

impl IqSample {
    pub fn new(i: f32, q: f32) -> Self {
        Self { i, q }
    }
}

/// One block of interleaved IQ pairs as delivered by a source read.
pub type SampleBlock = Vec<IqSample>;

/// Upper bound on pairs per block; sources must not exceed it.
pub const MAX_BLOCK_PAIRS: usize = 16384;

/// Errors from the receiver hardware (or its stand-in). All of these are
/// fatal: once a configure or start call fails the device state is assumed
/// unrecoverable without reinitialization.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("unsupported sample rate {0} Hz")]
    UnsupportedRate(f64),

    #[error("frequency {0} Hz outside tunable range")]
    FrequencyOutOfRange(f64),

    #[error("stream setup failed: {0}")]
    StreamSetup(String),
}

/// A continuously-sampling IQ receiver.
///
/// Retuning calls may briefly disrupt the sample stream; callers tolerate
/// short gaps. `stop_stream` is idempotent and safe to call when no stream
/// is running.
pub trait SampleSource {
    fn configure_sample_rate(&mut self, rate: f64) -> Result<(), DeviceError>;

    fn configure_frequency(&mut self, hz: f64) -> Result<(), DeviceError>;

    fn start_stream(&mut self) -> Result<(), DeviceError>;

    fn stop_stream(&mut self);

    /// Read the next block, waiting at most `max_wait`. Returns an empty
    /// block on timeout; never more than [`MAX_BLOCK_PAIRS`] pairs.
    fn read_block(&mut self, max_wait: Duration) -> SampleBlock;
}
