//! RDT Receiver - reliable file receiver
//!
//! Listens for an `rdt-sender`, acknowledges its frames and writes the
//! reassembled byte stream to a file (or stdout).

use anyhow::Context;
use clap::Parser;
use rdt::io::Timer;
use rdt::{Receiver, UdpChannel};
use rdt_cli::{display_receiver_stats, format_bytes, init_logging, Config, OutputWriter, Overrides};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::thread;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "rdt-receiver")]
#[command(about = "Reliable data transfer receiver", long_about = None)]
struct Args {
    /// Output file, '-' for stdout
    #[arg(required_unless_present = "print_example_config")]
    output: Option<String>,

    /// TOML configuration file
    #[arg(short, long)]
    config_file: Option<PathBuf>,

    /// Log every frame and ack
    #[arg(short, long)]
    debug: bool,

    /// Periodic progress reports
    #[arg(short, long)]
    verbose: bool,

    /// Port to listen on
    #[arg(short = 'p', long)]
    receiver_port: Option<u16>,

    /// Print an example configuration file and exit
    #[arg(long)]
    print_example_config: bool,
}

fn open_output(path: &str) -> anyhow::Result<Box<dyn Write + Send>> {
    if path == "-" {
        tracing::info!("Writing to stdout");
        Ok(Box::new(io::stdout()))
    } else {
        tracing::info!("Writing to {}", path);
        let file = File::create(path).with_context(|| format!("Failed to create {}", path))?;
        Ok(Box::new(BufWriter::new(file)))
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.print_example_config {
        print!("{}", Config::example_receiver().to_toml()?);
        return Ok(());
    }

    init_logging(args.debug);

    let mut config = Config::load(args.config_file.as_deref())?;
    config.apply(&Overrides {
        debug: args.debug,
        verbose: args.verbose,
        receiver_port: args.receiver_port,
    })?;
    let receiver_config = config.receiver_or_default();

    let channel = UdpChannel::bind(receiver_config.listen)?;
    tracing::info!(
        "Receiver listening on {} using {}",
        channel.local_addr()?,
        config.arq.arq_mode
    );

    let mut receiver = Receiver::new(channel, &config.arq)?;
    let output = open_output(args.output.as_deref().unwrap_or("-"))?;
    let writer = OutputWriter::spawn(output, receiver_config.write_queue)?;

    let idle_timeout = receiver_config.idle_timeout();
    let poll_interval = config.arq.poll_interval();
    let mut report_timer = config
        .arq
        .report_interval()
        .map(|interval| Timer::new(interval, Instant::now()));

    let mut first_data: Option<Instant> = None;
    let mut last_activity = Instant::now();

    loop {
        let report = receiver.poll()?;
        let now = Instant::now();

        if !report.is_empty() {
            last_activity = now;
        }
        if report.data_frames > 0 && first_data.is_none() {
            tracing::info!("Transfer started from {:?}", receiver.peer());
            first_data = Some(now);
        }

        let mut consumed = false;
        if receiver.available() > 0 && writer.has_capacity() {
            let chunk = receiver.consume(receiver_config.app_read_size);
            if writer.try_write(chunk).is_err() {
                anyhow::bail!("Output writer stopped");
            }
            consumed = true;
        }

        if let Some(timer) = report_timer.as_mut() {
            if timer.try_fire(now) {
                let stats = receiver.stats();
                tracing::info!(
                    "Received {} in {} frames, {} duplicates, window {} bytes",
                    format_bytes(stats.bytes_consumed),
                    stats.frames_accepted,
                    stats.duplicate_frames,
                    receiver.advertised_window()
                );
            }
        }

        if first_data.is_some()
            && receiver.available() == 0
            && now.duration_since(last_activity) >= idle_timeout
        {
            tracing::info!(
                "No traffic for {:?}, closing",
                now.duration_since(last_activity)
            );
            break;
        }

        if report.is_empty() && !consumed {
            thread::sleep(poll_interval);
        }
    }

    let (_, written) = writer.finish().context("Failed to write output")?;
    tracing::info!("Wrote {}", format_bytes(written));

    let elapsed = first_data
        .map(|start| last_activity.saturating_duration_since(start))
        .unwrap_or_default();
    display_receiver_stats(receiver.stats(), elapsed);

    Ok(())
}
