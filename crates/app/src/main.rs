mod annotation;
mod config;
mod data;
mod encoding;
mod pipeline;
mod server;
mod telemetry;
mod watchdog;

use clap::Parser;

use crate::config::{AppArgs, AppConfig};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let config = AppConfig::try_from(AppArgs::parse())?;
    pipeline::run(config)
}
