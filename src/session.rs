use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::monitor::LevelMonitor;
use crate::protocol::{self, Action};
use crate::quantizer::{self, DitherState};
use crate::source::SampleSource;
use crate::source::DeviceError;
use crate::tuning::{BitDepth, TuningState};

/// Bounded wait for one sample block from the source.
const BLOCK_WAIT: Duration = Duration::from_millis(1000);

/// Inbound poll timeout; commands are serviced opportunistically between
/// outbound blocks, so this stays short.
const COMMAND_POLL: Duration = Duration::from_millis(2);

const COMMAND_BUF_LEN: usize = 256;

const STATUS_INTERVAL_BLOCKS: u64 = 1000;

/// One client connection: the socket plus all per-connection state. Exactly
/// one session is live at a time; dropping it closes the socket.
pub struct Session {
    stream: TcpStream,
    peer: SocketAddr,
    tuning: TuningState,
    dither: DitherState,
    wire_buf: Vec<u8>,
    total_pairs: u64,
    block_count: u64,
    send_failed: bool,
    monitor: LevelMonitor,
    verbose: bool,
}

impl Session {
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        bit_depth: BitDepth,
        verbose: bool,
    ) -> std::io::Result<Self> {
        stream.set_read_timeout(Some(COMMAND_POLL))?;
        Ok(Self {
            stream,
            peer,
            tuning: TuningState::new(bit_depth),
            dither: DitherState::from_entropy(),
            wire_buf: Vec::new(),
            total_pairs: 0,
            block_count: 0,
            send_failed: false,
            monitor: LevelMonitor::new(),
            verbose,
        })
    }

    /// Drive the connection to completion: header, then the steady-state
    /// loop interleaving outbound blocks with inbound command polls.
    ///
    /// `Ok` means the client went away or shutdown was requested; `Err` is a
    /// fatal device failure.
    pub fn run<S: SampleSource>(
        &mut self,
        source: &mut S,
        shutdown: &Arc<AtomicBool>,
    ) -> Result<(), DeviceError> {
        if self.stream.write_all(&protocol::session_header(self.tuning.bit_depth)).is_err() {
            self.disconnect(source);
            return Ok(());
        }
        if self.verbose {
            println!(
                "session tuned to {:.3} MHz at {:.3} Msps",
                self.tuning.center_frequency / 1e6,
                self.tuning.sample_rate / 1e6,
            );
        }

        while !shutdown.load(Ordering::SeqCst) {
            let block = source.read_block(BLOCK_WAIT);
            if !block.is_empty() {
                quantizer::quantize(&block, &self.tuning, &mut self.dither, &mut self.wire_buf);
                match self.stream.write(&self.wire_buf) {
                    Ok(0) | Err(_) => self.send_failed = true,
                    // a short write drops the tail of the block and is not
                    // retried
                    Ok(_) => self.total_pairs += block.len() as u64,
                }
                self.block_count += 1;
                if self.verbose && self.block_count % STATUS_INTERVAL_BLOCKS == 0 {
                    println!(
                        "[{} blocks] {} pairs sent, peak {:.1} dB, dither residual {:+.3}",
                        self.block_count,
                        self.total_pairs,
                        self.monitor.peak_power_db(&block),
                        self.dither.rounding_acc(),
                    );
                }
                if self.send_failed {
                    break;
                }
            }

            match self.poll_commands(source)? {
                Action::Continue => {}
                Action::Disconnect => break,
            }
        }

        self.disconnect(source);
        Ok(())
    }

    /// Check the socket for inbound command bytes. Timeout kinds mean no
    /// traffic; a zero-length read is client EOF and decodes as disconnect.
    fn poll_commands<S: SampleSource>(&mut self, source: &mut S) -> Result<Action, DeviceError> {
        let mut buf = [0u8; COMMAND_BUF_LEN];
        match self.stream.read(&mut buf) {
            Ok(n) => protocol::decode(
                &buf[..n],
                self.send_failed,
                &mut self.tuning,
                source,
                self.verbose,
            ),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                Ok(Action::Continue)
            }
            Err(_) => Ok(Action::Disconnect),
        }
    }

    fn disconnect<S: SampleSource>(&mut self, source: &mut S) {
        source.stop_stream();
        println!(
            "client {} disconnected after {} sample pairs",
            self.peer, self.total_pairs
        );
    }
}
