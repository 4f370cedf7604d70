use playerlink_client::{ClientConfig, DeviceInfo, HandshakeConfig};
use serde::Serialize;

use crate::cmd::{open_client, DevicesArgs};
use crate::exit::{client_error, CliResult, SUCCESS};
use crate::output::{print_json, print_table, OutputFormat};

#[derive(Serialize, Debug, PartialEq)]
struct DeviceOutput {
    device: String,
    device_type: u16,
    index: u16,
    driver: String,
}

#[derive(Serialize)]
struct DevicesOutput {
    count: usize,
    devices: Vec<DeviceOutput>,
}

pub fn run(args: DevicesArgs, format: OutputFormat) -> CliResult<i32> {
    // Listing needs no delivery-mode negotiation.
    let config = ClientConfig {
        handshake: HandshakeConfig {
            initial_mode: None,
            ..HandshakeConfig::default()
        },
        ..ClientConfig::default()
    };
    let mut client = open_client(&args.connect, true, config)?;

    let devices: Vec<DeviceOutput> = client
        .get_device_list()
        .map_err(|err| client_error("device list failed", err))?
        .iter()
        .map(to_output)
        .collect();
    client
        .disconnect()
        .map_err(|err| client_error("disconnect failed", err))?;

    print_devices(
        &DevicesOutput {
            count: devices.len(),
            devices,
        },
        format,
    );
    Ok(SUCCESS)
}

fn to_output(info: &DeviceInfo) -> DeviceOutput {
    DeviceOutput {
        device: info.addr.to_string(),
        device_type: info.addr.device_type,
        index: info.addr.index,
        driver: info.driver_name.clone(),
    }
}

fn print_devices(out: &DevicesOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => print_table(
            vec!["DEVICE", "TYPE", "INDEX", "DRIVER"],
            out.devices
                .iter()
                .map(|d| {
                    vec![
                        d.device.clone(),
                        d.device_type.to_string(),
                        d.index.to_string(),
                        d.driver.clone(),
                    ]
                })
                .collect(),
        ),
        OutputFormat::Pretty | OutputFormat::Raw => {
            for device in &out.devices {
                println!("{} {}", device.device, device.driver);
            }
        }
    }
}
