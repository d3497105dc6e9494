use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use mti_lib::frame::{self, MessageId};
use mti_lib::{DeviceFamily, MeasurementOutcome, OutputConfiguration, Pipe, Xbus};

mod error;
mod replay;

use error::{CliError, parse_hex};
use replay::Replay;

/// Offline tools for the MTi Xbus protocol engine.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode captured pipe dumps and print the resulting device state
    Decode {
        /// Pipe the dumps were read from
        #[arg(short, long, value_enum, default_value_t = PipeArg::Measurement)]
        pipe: PipeArg,
        /// One hex dump per pipe read, oldest first
        #[arg(required = true)]
        dumps: Vec<String>,
        /// Print the state as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a framed control pipe message
    Frame {
        /// Message ID in hex, e.g. 0x30
        mid: String,
        /// Payload bytes in hex
        payload: Option<String>,
    },
    /// Print the SetOutputConfiguration frame for a product family
    OutputConfig {
        /// Family digit from the product code (1, 2, 3, 7 or 8)
        family: char,
        /// Output rate in Hz
        #[arg(short, long, default_value_t = 1)]
        rate: u16,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum PipeArg {
    Notification,
    Measurement,
}

impl From<PipeArg> for Pipe {
    fn from(arg: PipeArg) -> Self {
        match arg {
            PipeArg::Notification => Pipe::Notification,
            PipeArg::Measurement => Pipe::Measurement,
        }
    }
}

fn setup_logging(verbosity: &Verbosity<InfoLevel>) {
    let filter = EnvFilter::builder()
        .with_default_directive(verbosity.tracing_level_filter().into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time(),
        )
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli.verbose);

    match cli.command {
        Command::Decode { pipe, dumps, json } => decode(pipe.into(), &dumps, json),
        Command::Frame { mid, payload } => print_frame(&mid, payload.as_deref()),
        Command::OutputConfig { family, rate } => print_output_config(family, rate),
    }
}

fn decode(pipe: Pipe, dumps: &[String], json: bool) -> Result<()> {
    let mut replay = Replay::default();
    for dump in dumps {
        replay.push(pipe, Bytes::from(parse_hex(dump)?));
    }

    let mut xbus = Xbus::new(replay);
    let reports = xbus.read_messages().context("Replay failed")?;
    info!(%pipe, reads = reports.len(), "Replayed pipe dumps");

    for report in &reports {
        if let Some(notification) = &report.notification {
            println!("{:?}", notification);
        }
        match &report.measurement {
            MeasurementOutcome::Idle => {}
            MeasurementOutcome::Updated(elements) => {
                for element in elements {
                    debug!(?element, "Decoded data element");
                }
            }
            MeasurementOutcome::Discarded(e) => println!("Discarded: {}", e),
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(xbus.state())?);
    } else {
        print!("{}", xbus.state());
    }
    Ok(())
}

fn print_frame(mid: &str, payload: Option<&str>) -> Result<()> {
    let mid = MessageId::from(error::parse_message_id(mid)?);
    let payload = payload.map(parse_hex).transpose()?.unwrap_or_default();
    let wire = frame::frame(mid, &payload)?;
    info!(%mid, len = payload.len(), "Framed message");
    println!("{}", hex::encode(&wire));
    Ok(())
}

fn print_output_config(family_char: char, rate: u16) -> Result<()> {
    let family = DeviceFamily::from_product_char(family_char).ok_or(CliError::UnknownFamily(family_char))?;
    let outputs = OutputConfiguration::for_family(family, rate);
    for (id, rate) in &outputs.entries {
        info!(%family, %id, rate, "Output");
    }
    println!("{}", hex::encode(outputs.to_frame()?));
    Ok(())
}
