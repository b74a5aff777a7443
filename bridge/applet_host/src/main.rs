mod demo;

use std::process;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

fn main() {
    if let Err(err) = run() {
        eprintln!("applet_host fatal error: {err}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    // stdout carries frames, so logs go to stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    applet_bridge_runtime::host::run(demo::routes())
}
