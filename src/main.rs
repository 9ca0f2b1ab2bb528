//! XC Hub server binary.
//!
//! Parses the command line, sets up logging and runs the hub on a
//! current-thread runtime. See the `xc_hub` library for everything else.

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use mimalloc::MiMalloc;
use xc_hub::Config;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[command(name = "xc-hub")]
#[command(version)]
#[command(about = "Command-and-control hub for TCP effect actuators")]
struct Cli {
    /// `1` runs in the foreground with timestamped debug logging.
    #[arg(value_name = "DEBUG")]
    debug: Option<u8>,

    /// TCP port for effects and the button.
    #[arg(long)]
    port: Option<u16>,

    /// Address to listen on.
    #[arg(long)]
    bind: Option<IpAddr>,

    /// JSON configuration file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug.is_some_and(|level| level != 0));

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;
    runtime.block_on(xc_hub::serve(config))
}

/// Verbose mode logs at debug (`RUST_LOG` overrides); quiet mode logs nothing.
fn init_logging(verbose: bool) {
    if verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
            .format_timestamp_millis()
            .init();
    } else {
        env_logger::Builder::new()
            .filter_level(log::LevelFilter::Off)
            .init();
    }
}
