//! Command-line front end for smart-card readers.
//!
//! Lists readers, reads a card's ATR and sends APDUs given as hex strings.

use anyhow::{Context, Result, anyhow, bail};
use cardlink_core::{Backend, ReaderConfig};
use cardlink_hardware::{AnyReader, SmartCardReader};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cardlink")]
#[command(about = "Talk to smart cards over USB CCID or PC/SC")]
#[command(long_about = "
cardlink - smart-card reader utility

EXAMPLES:
    # List attached readers
    cardlink list

    # Print the ATR of the card in the first reader
    cardlink atr

    # SELECT the PIV application on a given reader
    cardlink transmit --reader /dev/bus/usb/001/004 '00 A4 04 00 09 A0 00 00 03 08 00 00 10 00'

ENVIRONMENT VARIABLES:
    RUST_LOG        Logging filter (overrides -v)
")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Reader stack: usb or pcsc (defaults to the platform's usual one)
    #[arg(short, long, global = true)]
    backend: Option<Backend>,

    /// TOML configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Bulk transfer timeout in milliseconds
    #[arg(long, global = true, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Delay after power-on in milliseconds
    #[arg(long, global = true, value_name = "MS")]
    settle_ms: Option<u64>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// List attached smart-card readers
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Power the card and print its ATR
    Atr {
        /// Reader name (defaults to the first reader found)
        #[arg(short, long)]
        reader: Option<String>,
    },

    /// Send APDUs and print the responses
    Transmit {
        /// Reader name (defaults to the first reader found)
        #[arg(short, long)]
        reader: Option<String>,

        /// APDUs as hex; spaces and colons are ignored
        #[arg(value_name = "APDU", required = true)]
        apdus: Vec<String>,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[derive(Serialize)]
struct ReaderList<'a> {
    backend: &'a str,
    readers: &'a [String],
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli)?;
    debug!(?config, "Effective configuration");

    match cli.command {
        Commands::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
        Commands::List { json } => list(&config, json).await,
        Commands::Atr { reader } => atr(&config, reader).await,
        Commands::Transmit { reader, apdus } => transmit(&config, reader, &apdus).await,
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<ReaderConfig> {
    let mut config = match &cli.config {
        Some(path) => ReaderConfig::load(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => ReaderConfig::default(),
    };

    if let Some(backend) = cli.backend {
        config.backend = backend;
    }
    if let Some(timeout) = cli.timeout_ms {
        config.session.io_timeout_ms = timeout;
    }
    if let Some(settle) = cli.settle_ms {
        config.session.settle_delay_ms = settle;
    }
    config.session.validate()?;
    Ok(config)
}

fn open_reader(config: &ReaderConfig) -> Result<AnyReader> {
    let reader = AnyReader::from_config(config).map_err(reader_error)?;
    info!(backend = reader.backend_name(), "Reader backend ready");
    Ok(reader)
}

async fn list(config: &ReaderConfig, json: bool) -> Result<()> {
    let reader = open_reader(config)?;
    let names = reader.list_readers().await.map_err(reader_error)?;

    if json {
        let output = ReaderList {
            backend: reader.backend_name(),
            readers: &names,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if names.is_empty() {
        println!("No readers found");
    } else {
        for name in &names {
            println!("{name}");
        }
    }
    Ok(())
}

async fn atr(config: &ReaderConfig, name: Option<String>) -> Result<()> {
    let mut reader = open_reader(config)?;
    let name = resolve_reader(&reader, name).await?;

    reader.connect(&name).await.map_err(reader_error)?;
    let atr = reader.atr().map(format_hex).unwrap_or_default();
    reader.disconnect().await.map_err(reader_error)?;

    println!("{atr}");
    Ok(())
}

async fn transmit(config: &ReaderConfig, name: Option<String>, apdus: &[String]) -> Result<()> {
    let commands = apdus
        .iter()
        .map(|apdu| parse_apdu(apdu))
        .collect::<Result<Vec<_>>>()?;

    let mut reader = open_reader(config)?;
    let name = resolve_reader(&reader, name).await?;
    reader.connect(&name).await.map_err(reader_error)?;

    let result = exchange_all(&mut reader, &commands).await;
    reader.disconnect().await.map_err(reader_error)?;
    result
}

async fn exchange_all(reader: &mut AnyReader, commands: &[Vec<u8>]) -> Result<()> {
    for command in commands {
        println!(">> {}", format_hex(command));
        let response = reader.transmit(command).await.map_err(reader_error)?;
        println!("<< {}", format_hex(&response));
    }
    Ok(())
}

async fn resolve_reader(reader: &AnyReader, name: Option<String>) -> Result<String> {
    if let Some(name) = name {
        return Ok(name);
    }
    reader
        .list_readers()
        .await
        .map_err(reader_error)?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("no readers found"))
}

/// Parse an APDU written as hex, ignoring spaces and colons.
fn parse_apdu(input: &str) -> Result<Vec<u8>> {
    let digits: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    if digits.is_empty() {
        bail!("empty APDU");
    }
    hex::decode(&digits).with_context(|| format!("invalid APDU hex '{input}'"))
}

fn format_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

fn reader_error(error: cardlink_core::Error) -> anyhow::Error {
    anyhow!("{}: {error}", error.code())
}
