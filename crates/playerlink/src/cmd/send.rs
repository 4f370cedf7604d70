use std::fs;

use playerlink_client::{
    AccessMode, Client, ClientConfig, DeviceAddr, HandshakeConfig, RawDevice,
};
use serde::Serialize;

use crate::cmd::{open_client, SendArgs};
use crate::exit::{client_error, io_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{payload_preview, print_json, print_raw, OutputFormat};

#[derive(Serialize)]
struct SendOutput {
    device: String,
    subtype: u16,
    sent: usize,
    reply_size: Option<usize>,
    reply: Option<String>,
}

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = resolve_payload(&args)?;
    let config = ClientConfig {
        handshake: HandshakeConfig {
            initial_mode: None,
            ..HandshakeConfig::default()
        },
        ..ClientConfig::default()
    };
    let mut client = open_client(&args.connect, true, config)?;

    let reply = if args.request {
        Some(request(&mut client, args.device, args.subtype, &payload)?)
    } else {
        command(&mut client, args.device, args.subtype, &payload)?;
        None
    };
    client
        .disconnect()
        .map_err(|err| client_error("disconnect failed", err))?;

    let out = SendOutput {
        device: args.device.to_string(),
        subtype: args.subtype,
        sent: payload.len(),
        reply_size: reply.as_ref().map(Vec::len),
        reply: reply.as_deref().map(payload_preview),
    };
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!(
                "{} subtype={} sent={} bytes",
                out.device, out.subtype, out.sent
            );
            if let (Some(size), Some(preview)) = (out.reply_size, &out.reply) {
                println!("reply ({size} bytes): {preview}");
            }
        }
        OutputFormat::Raw => print_raw(reply.as_deref().unwrap_or_default()),
    }
    Ok(SUCCESS)
}

fn command(client: &mut Client, addr: DeviceAddr, subtype: u16, payload: &[u8]) -> CliResult<()> {
    let handle = client
        .open_device(addr, AccessMode::Write, RawDevice::new())
        .map_err(|err| client_error("subscribe failed", err))?;
    client
        .write(handle, subtype, payload)
        .map_err(|err| client_error("send failed", err))?;
    client
        .close_device(handle)
        .map_err(|err| client_error("unsubscribe failed", err))
}

fn request(
    client: &mut Client,
    addr: DeviceAddr,
    subtype: u16,
    payload: &[u8],
) -> CliResult<Vec<u8>> {
    // Connection-level requests go straight to the server.
    if addr == DeviceAddr::SERVER {
        return client
            .request_addr(addr, subtype, payload)
            .map(|body| body.to_vec())
            .map_err(|err| client_error("request failed", err));
    }

    let handle = client
        .open_device(addr, AccessMode::Read, RawDevice::new())
        .map_err(|err| client_error("subscribe failed", err))?;
    let reply = client
        .request(Some(handle), subtype, payload)
        .map_err(|err| client_error("request failed", err))?;
    client
        .close_device(handle)
        .map_err(|err| client_error("unsubscribe failed", err))?;
    Ok(reply.to_vec())
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(hex) = &args.hex {
        return parse_hex(hex);
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}

/// Decode a hex string. Whitespace and a leading `0x` are ignored.
fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: String = input
        .trim()
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if let Some(bad) = digits.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(CliError::new(
            DATA_INVALID,
            format!("--hex has an invalid digit '{bad}'"),
        ));
    }
    if digits.len() % 2 != 0 {
        return Err(CliError::new(
            DATA_INVALID,
            "--hex needs an even number of digits",
        ));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|err| CliError::new(DATA_INVALID, format!("--hex: {err}")))
        })
        .collect()
}
