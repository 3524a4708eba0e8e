use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

mod monitor;
mod protocol;
mod quantizer;
mod server;
mod session;
mod source;
mod tuning;

use source::sim::SignalGenSource;
use source::SampleSource;
use tuning::{BitDepth, DEFAULT_PORT};

/// Serve IQ samples from a continuously-sampling receiver to one client at a
/// time over the rtl_tcp wire protocol
#[derive(Parser, Debug)]
#[command(name = "iq-tcp")]
#[command(version, about, long_about = None)]
struct Args {
    /// Listening port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Wire sample depth: 8 (rtl_tcp clients), 16, or 32 (float passthrough)
    #[arg(short, long, value_enum, default_value = "8")]
    bits: BitDepth,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    println!("iq-tcp {}", env!("CARGO_PKG_VERSION"));

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })?;

    let mut source = SignalGenSource::new();
    let result = server::serve(args.port, args.bits, args.verbose, &mut source, &shutdown);

    // release the source on every exit path; stop is idempotent
    source.stop_stream();
    result?;

    println!("shutdown complete");
    Ok(())
}
