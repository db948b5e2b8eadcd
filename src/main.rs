use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Result, WrapErr};
use daikin_altherma::protocol::{heat_pump_item, Request};
use daikin_altherma::*;
use serde_json::Value;
use std::io::Read;
use tracing::{debug, info, instrument};
use tracing_subscriber::EnvFilter;

/// Offline tools for the Daikin Altherma LAN adapter protocol
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum, Debug)]
enum ScheduleKind {
    /// Space heating program, temperatures in °C
    Heating,
    /// Hot water tank program, off/comfort/eco
    Tank,
}

impl std::fmt::Display for ScheduleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleKind::Heating => write!(f, "heating"),
            ScheduleKind::Tank => write!(f, "tank"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a schedule string into JSON
    Decode {
        /// Schedule kind
        #[arg(short, long, value_enum, default_value_t = ScheduleKind::Heating)]
        kind: ScheduleKind,
        /// Schedule string, e.g. "$NULL|1|0000,180;..."
        wire: String,
    },
    /// Encode a JSON schedule into the unit's string form
    Encode {
        /// Schedule kind
        #[arg(short, long, value_enum, default_value_t = ScheduleKind::Heating)]
        kind: ScheduleKind,
        /// JSON schedule, e.g. '{"Mo": {"0000": 22.0}}', or - to read stdin
        schedule: String,
    },
    /// Print the request envelope for a resource
    Request {
        /// Resource path, e.g. 1/Sensor/OutdoorTemperature/la
        item: String,
        /// Content to write. Sends a read request when absent.
        #[arg(short, long)]
        value: Option<String>,
        /// Address an adapter resource instead of a heat pump one
        #[arg(short, long)]
        adapter: bool,
        /// Originator of the request
        #[arg(long, default_value_t = ClientConfig::default().user_agent)]
        user_agent: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| EnvFilter::new("daikin_altherma=info")),
        )
        .compact()
        .with_writer(std::io::stderr)
        .init();

    color_eyre::install()?;

    let cli = Cli::parse();
    debug!("Parsed command line arguments");

    match cli.command {
        Commands::Decode { kind, wire } => {
            println!("{}", decode_schedule(kind, &wire)?);
        }
        Commands::Encode { kind, schedule } => {
            let json = if schedule == "-" {
                let mut buf = String::new();
                std::io::stdin().read_to_string(&mut buf)?;
                buf
            } else {
                schedule
            };
            println!("{}", encode_schedule(kind, &json)?);
        }
        Commands::Request {
            item,
            value,
            adapter,
            user_agent,
        } => {
            let item = if adapter { item } else { heat_pump_item(&item) };
            let request = match value {
                Some(value) => Request::create(&user_agent, &item, parse_content(&value)),
                None => Request::retrieve(&user_agent, &item),
            };
            info!("Request id {}", request.id());
            println!("{}", request.to_json()?);
        }
    }

    Ok(())
}

/// Decodes a schedule string to pretty JSON
#[instrument]
fn decode_schedule(kind: ScheduleKind, wire: &str) -> Result<String> {
    let json = match kind {
        ScheduleKind::Heating => serde_json::to_string_pretty(&decode(wire, parse_temperature)?)?,
        ScheduleKind::Tank => serde_json::to_string_pretty(&decode(wire, TankState::from_code)?)?,
    };
    Ok(json)
}

/// Encodes a JSON schedule to a schedule string
#[instrument(skip(json))]
fn encode_schedule(kind: ScheduleKind, json: &str) -> Result<String> {
    let wire = match kind {
        ScheduleKind::Heating => {
            let schedule: HeatingSchedule =
                serde_json::from_str(json).wrap_err("invalid heating schedule")?;
            encode(&schedule)?
        }
        ScheduleKind::Tank => {
            let schedule: TankSchedule =
                serde_json::from_str(json).wrap_err("invalid tank schedule")?;
            encode(&schedule)?
        }
    };
    Ok(wire)
}

/// Content given on the command line: JSON when it parses, plain text otherwise
fn parse_content(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
