use std::io;
use std::net::{Ipv6Addr, SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::session::Session;
use crate::source::{DeviceError, SampleSource};
use crate::tuning::{BitDepth, DEFAULT_FREQUENCY, DEFAULT_SAMPLE_RATE};

/// How often the accept loop wakes to check the shutdown flag.
const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// Startup- and device-fatal failures; everything else is handled inside the
/// per-connection session and comes back to the accept loop.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind [::]:{port}: {source}")]
    Bind { port: u16, source: io::Error },

    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// Accept one connection at a time and serve it to completion.
///
/// The source is configured with the default rate and frequency up front;
/// its stream is started per connection and stopped on teardown. Accept
/// errors on an individual connection are logged and the loop continues.
pub fn serve<S: SampleSource>(
    port: u16,
    bit_depth: BitDepth,
    verbose: bool,
    source: &mut S,
    shutdown: &Arc<AtomicBool>,
) -> Result<(), ServerError> {
    source.configure_sample_rate(DEFAULT_SAMPLE_RATE)?;
    source.configure_frequency(DEFAULT_FREQUENCY)?;

    let addr = SocketAddr::from((Ipv6Addr::UNSPECIFIED, port));
    let listener = TcpListener::bind(addr).map_err(|e| ServerError::Bind { port, source: e })?;
    listener
        .set_nonblocking(true)
        .map_err(|e| ServerError::Bind { port, source: e })?;

    println!("serving {}-bit samples on port {port}", bit_depth.bits());
    println!("listening for a connection");

    while !shutdown.load(Ordering::SeqCst) {
        let (stream, peer) = match listener.accept() {
            Ok(pair) => pair,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
                continue;
            }
            Err(e) => {
                eprintln!("accept failed: {e}");
                continue;
            }
        };

        // the listener is non-blocking; the accepted socket must not be
        if let Err(e) = stream.set_nonblocking(false) {
            eprintln!("failed to configure client socket: {e}");
            continue;
        }
        stream.set_nodelay(true).ok();
        println!("client connected: {peer}");

        source.start_stream()?;
        let mut session = match Session::new(stream, peer, bit_depth, verbose) {
            Ok(session) => session,
            Err(e) => {
                eprintln!("failed to configure client socket: {e}");
                source.stop_stream();
                continue;
            }
        };
        session.run(source, shutdown)?;
        source.stop_stream();

        println!("listening for the next connection");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenDevice;

    impl SampleSource for BrokenDevice {
        fn configure_sample_rate(&mut self, rate: f64) -> Result<(), DeviceError> {
            Err(DeviceError::UnsupportedRate(rate))
        }

        fn configure_frequency(&mut self, _hz: f64) -> Result<(), DeviceError> {
            Ok(())
        }

        fn start_stream(&mut self) -> Result<(), DeviceError> {
            Ok(())
        }

        fn stop_stream(&mut self) {}

        fn read_block(&mut self, _max_wait: Duration) -> crate::source::SampleBlock {
            Vec::new()
        }
    }

    #[test]
    fn device_failure_at_startup_is_fatal() {
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut source = BrokenDevice;
        let err = serve(0, BitDepth::Eight, false, &mut source, &shutdown).unwrap_err();
        assert!(matches!(err, ServerError::Device(_)));
    }
}
