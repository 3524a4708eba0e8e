use crate::source::{DeviceError, SampleSource};
use crate::tuning::{BitDepth, TuningState, GAIN_OFFSET_DB, GAIN_SCALE};

/// Magic tag opening the session header.
pub const MAGIC: [u8; 4] = *b"LMM0";

/// Inbound command frames are fixed-width: opcode + big-endian u32 payload.
pub const CMD_FRAME_LEN: usize = 5;

const TUNER_TYPE: u32 = 1;
const GAIN_STAGE_COUNT: u32 = 2;

/// Build the session header, sent exactly once before any sample data:
/// magic, bit depth, tuner type, gain stage count as big-endian words.
/// The 8-bit form drops the gain-count word (12 bytes instead of 16).
pub fn session_header(depth: BitDepth) -> Vec<u8> {
    let mut header = Vec::with_capacity(16);
    header.extend_from_slice(&MAGIC);
    header.extend_from_slice(&(depth.bits() as u32).to_be_bytes());
    header.extend_from_slice(&TUNER_TYPE.to_be_bytes());
    if depth != BitDepth::Eight {
        header.extend_from_slice(&GAIN_STAGE_COUNT.to_be_bytes());
    }
    header
}

/// What the caller must do with the connection after a decode pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Continue,
    Disconnect,
}

/// Decode and apply every complete command frame in `buf`.
///
/// An empty buffer (client EOF) or a set send-failed flag signals
/// [`Action::Disconnect`]. Trailing bytes short of a full frame are dropped,
/// not carried over to the next read. Device errors from retune calls are
/// fatal and propagate.
pub fn decode<S: SampleSource>(
    buf: &[u8],
    send_failed: bool,
    tuning: &mut TuningState,
    source: &mut S,
    verbose: bool,
) -> Result<Action, DeviceError> {
    if buf.is_empty() || send_failed {
        return Ok(Action::Disconnect);
    }

    for frame in buf.chunks_exact(CMD_FRAME_LEN) {
        let opcode = frame[0];
        let value = u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]);

        if verbose && opcode != 4 {
            let dump: Vec<String> = frame.iter().map(|b| format!("{b:02x}")).collect();
            println!("command frame: {}", dump.join(" "));
        }

        match opcode {
            1 => {
                println!("set frequency: {value} Hz");
                source.configure_frequency(value as f64)?;
                tuning.center_frequency = value as f64;
            }
            2 => {
                // unchanged rate is a no-op; reconfiguring the hardware
                // interrupts the stream
                if value as f64 != tuning.sample_rate {
                    println!("set sample rate: {value} Hz");
                    source.configure_sample_rate(value as f64)?;
                    tuning.sample_rate = value as f64;
                }
            }
            4 => {
                // tenths of dB from the client; float passthrough mode
                // sends samples unscaled, so gain only applies at 8/16 bits
                if matches!(tuning.bit_depth, BitDepth::Eight | BitDepth::Sixteen) {
                    let db = 0.1 * value as f32;
                    let adjusted = db - GAIN_OFFSET_DB;
                    tuning.gain_linear = GAIN_SCALE * 10.0f32.powf(0.1 * adjusted);
                    println!(
                        "set gain: {db:.1} dB (linear multiplier {:.3})",
                        tuning.gain_linear
                    );
                }
            }
            other => {
                println!("ignoring command {other}, value {value}");
            }
        }
    }

    Ok(Action::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::testing::ScriptedSource;

    fn frame(opcode: u8, value: u32) -> Vec<u8> {
        let mut f = vec![opcode];
        f.extend_from_slice(&value.to_be_bytes());
        f
    }

    fn eight_bit() -> TuningState {
        TuningState::new(BitDepth::Eight)
    }

    #[test]
    fn header_for_eight_bit_mode() {
        assert_eq!(
            session_header(BitDepth::Eight),
            [0x4c, 0x4d, 0x4d, 0x30, 0, 0, 0, 0x08, 0, 0, 0, 0x01]
        );
    }

    #[test]
    fn header_for_sixteen_bit_mode() {
        let h = session_header(BitDepth::Sixteen);
        assert_eq!(h.len(), 16);
        assert_eq!(&h[..4], b"LMM0");
        assert_eq!(h[7], 0x10);
        assert_eq!(&h[12..], [0, 0, 0, 0x02]);
    }

    #[test]
    fn header_for_float_mode() {
        let h = session_header(BitDepth::ThirtyTwo);
        assert_eq!(h.len(), 16);
        assert_eq!(h[7], 0x20);
    }

    #[test]
    fn empty_buffer_disconnects() {
        let mut source = ScriptedSource::default();
        let mut tuning = eight_bit();
        let action = decode(&[], false, &mut tuning, &mut source, false).unwrap();
        assert_eq!(action, Action::Disconnect);
    }

    #[test]
    fn send_failure_disconnects_before_parsing() {
        let mut source = ScriptedSource::default();
        let mut tuning = eight_bit();
        let buf = frame(1, 100_000_000);
        let action = decode(&buf, true, &mut tuning, &mut source, false).unwrap();
        assert_eq!(action, Action::Disconnect);
        assert!(source.frequencies.is_empty());
    }

    #[test]
    fn frequency_command_retunes_source() {
        let mut source = ScriptedSource::default();
        let mut tuning = eight_bit();
        let action = decode(&frame(1, 162_550_000), false, &mut tuning, &mut source, false).unwrap();
        assert_eq!(action, Action::Continue);
        assert_eq!(source.frequencies, vec![162_550_000.0]);
        assert_eq!(tuning.center_frequency, 162_550_000.0);
    }

    #[test]
    fn unchanged_sample_rate_is_a_no_op() {
        let mut source = ScriptedSource::default();
        let mut tuning = eight_bit();
        let current = tuning.sample_rate as u32;
        decode(&frame(2, current), false, &mut tuning, &mut source, false).unwrap();
        assert!(source.rates.is_empty());

        decode(&frame(2, 2_400_000), false, &mut tuning, &mut source, false).unwrap();
        assert_eq!(source.rates, vec![2_400_000.0]);
        assert_eq!(tuning.sample_rate, 2_400_000.0);
    }

    #[test]
    fn gain_command_applies_offset_and_scale() {
        let mut source = ScriptedSource::default();
        let mut tuning = eight_bit();
        // 200 tenths = 20.0 dB, minus the 12.0 dB offset = 8.0 dB
        decode(&frame(4, 200), false, &mut tuning, &mut source, false).unwrap();
        let expected = GAIN_SCALE * 10.0f32.powf(0.8);
        assert!((tuning.gain_linear - expected).abs() < 1e-3);
    }

    #[test]
    fn gain_command_ignored_in_float_mode() {
        let mut source = ScriptedSource::default();
        let mut tuning = TuningState::new(BitDepth::ThirtyTwo);
        let before = tuning.gain_linear;
        decode(&frame(4, 200), false, &mut tuning, &mut source, false).unwrap();
        assert_eq!(tuning.gain_linear, before);
    }

    #[test]
    fn unknown_opcodes_change_nothing() {
        let mut source = ScriptedSource::default();
        let mut tuning = eight_bit();
        let before = tuning.clone();
        for op in [3u8, 5, 9, 0xff] {
            decode(&frame(op, 42), false, &mut tuning, &mut source, false).unwrap();
        }
        assert!(source.rates.is_empty() && source.frequencies.is_empty());
        assert_eq!(tuning.sample_rate, before.sample_rate);
        assert_eq!(tuning.gain_linear, before.gain_linear);
    }

    #[test]
    fn trailing_partial_frame_is_dropped() {
        let mut source = ScriptedSource::default();
        let mut tuning = eight_bit();
        let mut buf = frame(1, 433_920_000);
        buf.extend_from_slice(&[2, 0, 0]); // incomplete second frame
        decode(&buf, false, &mut tuning, &mut source, false).unwrap();
        assert_eq!(source.frequencies, vec![433_920_000.0]);
        assert!(source.rates.is_empty());

        // a buffer holding nothing but a partial frame applies nothing
        let action = decode(&[1, 0], false, &mut tuning, &mut source, false).unwrap();
        assert_eq!(action, Action::Continue);
        assert_eq!(source.frequencies.len(), 1);
    }

    #[test]
    fn concatenated_buffers_decode_like_sequential_ones() {
        let mut cat = frame(1, 100_000_000);
        cat.extend(frame(2, 2_048_000));
        cat.extend(frame(4, 150));

        let mut source_a = ScriptedSource::default();
        let mut tuning_a = eight_bit();
        decode(&cat, false, &mut tuning_a, &mut source_a, false).unwrap();

        let mut source_b = ScriptedSource::default();
        let mut tuning_b = eight_bit();
        for chunk in cat.chunks_exact(CMD_FRAME_LEN) {
            decode(chunk, false, &mut tuning_b, &mut source_b, false).unwrap();
        }

        assert_eq!(source_a.frequencies, source_b.frequencies);
        assert_eq!(source_a.rates, source_b.rates);
        assert_eq!(tuning_a.sample_rate, tuning_b.sample_rate);
        assert_eq!(tuning_a.gain_linear, tuning_b.gain_linear);
    }
}
