//! RDT Sender - reliable file sender
//!
//! Reads a file (or stdin) and delivers it to an `rdt-receiver` over UDP.

use anyhow::Context;
use clap::Parser;
use rdt::UdpChannel;
use rdt_cli::{display_transfer_stats, init_logging, Config, Overrides};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "rdt-sender")]
#[command(about = "Reliable data transfer sender", long_about = None)]
struct Args {
    /// File to send, '-' for stdin
    #[arg(required_unless_present = "print_example_config")]
    file: Option<String>,

    /// TOML configuration file
    #[arg(short, long)]
    config_file: Option<PathBuf>,

    /// Log every frame and ack
    #[arg(short, long)]
    debug: bool,

    /// Periodic progress reports
    #[arg(short, long)]
    verbose: bool,

    /// Receiver port, overrides the configured address's port
    #[arg(short = 'p', long)]
    receiver_port: Option<u16>,

    /// Print an example configuration file and exit
    #[arg(long)]
    print_example_config: bool,
}

fn open_input(path: &str) -> anyhow::Result<Box<dyn Read>> {
    if path == "-" {
        tracing::info!("Reading from stdin");
        Ok(Box::new(io::stdin()))
    } else {
        tracing::info!("Reading from {}", path);
        let file = File::open(path).with_context(|| format!("Failed to open {}", path))?;
        Ok(Box::new(BufReader::new(file)))
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.print_example_config {
        print!("{}", Config::example_sender().to_toml()?);
        return Ok(());
    }

    init_logging(args.debug);

    let mut config = Config::load(args.config_file.as_deref())?;
    config.apply(&Overrides {
        debug: args.debug,
        verbose: args.verbose,
        receiver_port: args.receiver_port,
    })?;

    let sender_config = config.sender_or_default();
    let dest = sender_config.receiver_address;

    let channel = match sender_config.bind {
        Some(addr) => UdpChannel::bind(addr)?,
        None => UdpChannel::bind_for(dest)?,
    };
    tracing::info!(
        "Sender bound to {}, sending to {} using {}",
        channel.local_addr()?,
        dest,
        config.arq.arq_mode
    );

    let input = open_input(args.file.as_deref().unwrap_or("-"))?;
    let stats = rdt::send(input, channel, dest, config.arq.clone())?;

    tracing::info!("Transfer complete");
    display_transfer_stats(config.arq.arq_mode, config.arq.frame_size, &stats);

    Ok(())
}
