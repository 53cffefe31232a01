//! CLI tool for hwcheck

use clap::Parser;
use std::io;

#[derive(Parser)]
#[command(name = "hwcheck")]
#[command(about = "Hardware check: print CPU, memory, disk and GPU diagnostics", long_about = None)]
#[command(version)]
struct Cli {}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _cli = Cli::parse();

    env_logger::init();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    hwcheck::run(&mut out)?;

    Ok(())
}
