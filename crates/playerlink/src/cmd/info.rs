use playerlink_client::{Client, ClientConfig};
use serde::Serialize;

use crate::cmd::{open_client, InfoArgs};
use crate::exit::{client_error, CliResult, SUCCESS};
use crate::output::OutputFormat;

#[derive(Serialize)]
struct InfoOutput {
    host: String,
    port: u16,
    peer: Option<String>,
    banner: String,
    delivery_mode: &'static str,
    delivery_mode_code: u32,
    connected: bool,
}

pub fn run(args: InfoArgs, format: OutputFormat) -> CliResult<i32> {
    let mut client = open_client(&args.connect, true, ClientConfig::default())?;
    let out = describe(&client, &args.connect.host, args.connect.port);
    client
        .disconnect()
        .map_err(|err| client_error("disconnect failed", err))?;

    print_info(&out, format);
    Ok(SUCCESS)
}

fn describe(client: &Client, host: &str, port: u16) -> InfoOutput {
    let mode = client.delivery_mode();
    InfoOutput {
        host: host.to_string(),
        port,
        peer: client
            .transport()
            .map(|transport| transport.peer_addr().to_string()),
        banner: client
            .banner()
            .map(|banner| banner.text())
            .unwrap_or_default(),
        delivery_mode: mode.name(),
        delivery_mode_code: mode.code(),
        connected: client.is_connected(),
    }
}

fn print_info(out: &InfoOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => crate::output::print_json(out),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("Server Info:");
            println!("  Address:        {}:{}", out.host, out.port);
            if let Some(peer) = &out.peer {
                println!("  Peer:           {peer}");
            }
            println!("  Banner:         {}", out.banner);
            println!(
                "  Delivery mode:  {} ({})",
                out.delivery_mode, out.delivery_mode_code
            );
        }
        OutputFormat::Raw => {
            println!("{}", out.banner);
        }
    }
}
