use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};
use playerlink_client::{AccessMode, Client, ClientConfig, DeliveryMode, DeviceAddr};
use playerlink_transport::{TransportConfig, DEFAULT_PORT};

use crate::exit::{client_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod devices;
pub mod info;
pub mod send;
pub mod version;
pub mod watch;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show version information.
    Version(VersionArgs),
    /// Connect and print the server banner and delivery mode.
    Info(InfoArgs),
    /// List the devices the server offers.
    Devices(DevicesArgs),
    /// Subscribe to a device and print what it sends.
    Watch(WatchArgs),
    /// Send a command or request to a device.
    Send(SendArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Version(args) => version::run(args),
        Command::Info(args) => info::run(args, format),
        Command::Devices(args) => devices::run(args, format),
        Command::Watch(args) => watch::run(args, format),
        Command::Send(args) => send::run(args, format),
    }
}

#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    #[arg(long, short = 'p', default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Connect and reply timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
}

#[derive(Args, Debug)]
pub struct DevicesArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// Device to subscribe to, as TYPE:INDEX.
    #[arg(long, short = 'd', value_parser = parse_device)]
    pub device: DeviceAddr,
    /// Access mode: r, w or a.
    #[arg(long, default_value = "r")]
    pub access: AccessMode,
    /// Exit after N data messages from the device.
    #[arg(long)]
    pub count: Option<usize>,
    /// Delivery mode to request (push-all, pull-all, push-new, pull-new, push-async).
    #[arg(long)]
    pub mode: Option<DeliveryMode>,
    /// Update frequency to request, in Hz.
    #[arg(long)]
    pub frequency: Option<u32>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
    /// Target device, as TYPE:INDEX.
    #[arg(long, short = 'd', value_parser = parse_device)]
    pub device: DeviceAddr,
    /// Message subtype.
    #[arg(long, short = 's')]
    pub subtype: u16,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["hex", "file"])]
    pub data: Option<String>,
    /// Hex-encoded payload (e.g. 0001ff).
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub hex: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["data", "hex"])]
    pub file: Option<PathBuf>,
    /// Send as a request and print the reply instead of a command.
    #[arg(long)]
    pub request: bool,
}

/// Parse a `TYPE:INDEX` device address.
pub fn parse_device(input: &str) -> Result<DeviceAddr, String> {
    let (device_type, index) = input
        .trim()
        .split_once(':')
        .ok_or_else(|| format!("invalid device '{input}' (expected TYPE:INDEX)"))?;
    let device_type = device_type
        .parse()
        .map_err(|_| format!("invalid device type '{device_type}'"))?;
    let index = index
        .parse()
        .map_err(|_| format!("invalid device index '{index}'"))?;
    Ok(DeviceAddr::new(device_type, index))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

/// Open a connection for a one-shot command.
///
/// With `bounded_reads` every socket read is capped by the timeout, so a
/// silent server ends the command instead of hanging it.
pub fn open_client(
    args: &ConnectArgs,
    bounded_reads: bool,
    config: ClientConfig,
) -> CliResult<Client> {
    let timeout = parse_duration(&args.timeout)?;
    let config = ClientConfig {
        transport: TransportConfig {
            connect_timeout: Some(timeout),
            read_timeout: bounded_reads.then_some(timeout),
            ..config.transport
        },
        ..config
    };
    playerlink_client::connect_with_config(&args.host, args.port, config)
        .map_err(|err| client_error("connect failed", err))
}
