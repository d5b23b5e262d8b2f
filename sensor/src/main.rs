/// Run: sudo env RUST_LOG=info ./target/debug/sensor -c configs/sensor.toml
use shadowhawk_core::config::load_config;
use shadowhawk_core::Runtime;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

// Define command-line arguments.
#[derive(Parser, Debug)]
struct Args {
    #[clap(short, long, parse(from_os_str), value_name = "FILE")]
    config: Option<PathBuf>,
    /// Capture interface override.
    #[clap(short, long, value_name = "IFACE")]
    interface: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => Default::default(),
    };
    if args.interface.is_some() {
        config.capture.interface = args.interface;
    }

    let runtime = Runtime::new(config).await?;
    let stats = runtime.run().await?;

    println!(
        "Done. Captured {} frames ({} dropped).",
        stats.captured(),
        stats.dropped()
    );
    Ok(())
}
