use std::fs;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use rawtcp::config::{LinkConfig, TcpConfig};
use rawtcp::http;
use tracing::{Level, error, info};

/// Downloads one resource over HTTP/1.0 using a user-space TCP stack on a raw
/// packet socket. Requires `CAP_NET_RAW`.
#[derive(Parser, Debug)]
#[command(name = "rawhttpget", version)]
struct Args {
    /// URL to fetch, with or without the `http://` prefix.
    url: String,

    /// Interface to send from instead of the default route's.
    #[arg(short, long)]
    interface: Option<String>,

    /// File the response body is written to.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Seconds to wait for each handshake, teardown, or ACK.
    #[arg(short, long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,

    /// Maximum segment size announced and used for outgoing data.
    #[arg(long, default_value_t = rawtcp::config::MSS, value_parser = clap::value_parser!(u16).range(1..))]
    mss: u16,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt().with_max_level(level).try_init().ok();

    if let Err(err) = run(args) {
        error!("{err:#}");
        process::exit(1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let tcp = TcpConfig {
        mss: args.mss,
        ack_timeout: Duration::from_secs(args.timeout),
        ..Default::default()
    };

    let link = LinkConfig {
        interface: args.interface,
        ..Default::default()
    };

    let body = http::get(&args.url, tcp, &link).with_context(|| format!("failed to fetch {}", args.url))?;

    let path = args
        .output
        .unwrap_or_else(|| PathBuf::from(http::output_file_name(&args.url)));

    fs::write(&path, &body).with_context(|| format!("failed to write {}", path.display()))?;

    info!("saved {} bytes to {}", body.len(), path.display());

    Ok(())
}
