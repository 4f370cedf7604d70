//! Subscribe to one device and print every data message it sends.
//!
//! Run against a Player server:
//!   cargo run --example read-loop -- localhost 6665 4:0

use playerlink::{AccessMode, Client, DeviceAddr, RawDevice, ReadEvent};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "localhost".to_string());
    let port = args.next().map(|p| p.parse()).transpose()?.unwrap_or(6665);
    let device = match args.next() {
        Some(arg) => {
            let (device_type, index) = arg.split_once(':').ok_or("device must be TYPE:INDEX")?;
            DeviceAddr::new(device_type.parse()?, index.parse()?)
        }
        None => DeviceAddr::new(4, 0),
    };

    let mut client = Client::new();
    client.connect(&host, port)?;
    eprintln!("Connected: {}", client.banner().map(|b| b.text()).unwrap_or_default());

    let handle = client.open_device(device, AccessMode::Read, RawDevice::new())?;
    eprintln!(
        "Subscribed to {device} ({})",
        client.device(handle).map(|d| d.driver_name()).unwrap_or("?")
    );

    for _ in 0..100 {
        match client.read()? {
            ReadEvent::Data { handle: h } if h == handle => {
                if let Some(raw) = client.handler::<RawDevice>(handle) {
                    println!("{} bytes (message #{})", raw.data().len(), raw.data_count());
                }
            }
            ReadEvent::Synch { sample_time } => {
                println!("round complete at {:.3}", sample_time.as_secs_f64());
            }
            _ => {}
        }
    }

    client.close_device(handle)?;
    client.disconnect()?;
    Ok(())
}
