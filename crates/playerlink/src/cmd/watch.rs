use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use playerlink_client::{
    Client, ClientConfig, ClientError, DeliveryMode, DeviceHandle, HandshakeConfig, RawDevice,
    ReadEvent,
};
use playerlink_transport::ShutdownHandle;
use tracing::{debug, info};

use crate::cmd::{open_client, WatchArgs};
use crate::exit::{client_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{format_time, payload_preview, print_event, EventOutput, OutputFormat};

pub fn run(args: WatchArgs, format: OutputFormat) -> CliResult<i32> {
    let config = ClientConfig {
        handshake: HandshakeConfig {
            initial_mode: Some(args.mode.unwrap_or(DeliveryMode::PushAsync)),
            ..HandshakeConfig::default()
        },
        ..ClientConfig::default()
    };
    // Reads block until data arrives or Ctrl-C closes the socket.
    let mut client = open_client(&args.connect, false, config)?;

    if let Some(hz) = args.frequency {
        client
            .set_update_frequency(hz)
            .map_err(|err| client_error("set frequency failed", err))?;
    }

    let handle = client
        .open_device(args.device, args.access, RawDevice::new())
        .map_err(|err| client_error("subscribe failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    let shutdown = client
        .shutdown_handle()
        .map_err(|err| client_error("shutdown handle failed", err))?;
    install_ctrlc_handler(running.clone(), shutdown)?;

    let mut received = 0usize;
    while running.load(Ordering::SeqCst) {
        // In pull modes `read` asks for the next round itself.
        let event = match client.read() {
            Ok(event) => event,
            Err(err) => return stopped_or(err, &running, "read failed"),
        };

        print_event(&describe(&client, event), format);

        if event == (ReadEvent::Data { handle }) {
            received = received.saturating_add(1);
            if args.count.is_some_and(|count| received >= count) {
                break;
            }
        }
    }

    if client.is_connected() && running.load(Ordering::SeqCst) {
        client
            .close_device(handle)
            .map_err(|err| client_error("unsubscribe failed", err))?;
        client
            .disconnect()
            .map_err(|err| client_error("disconnect failed", err))?;
    }
    info!(received, "watch finished");
    Ok(SUCCESS)
}

/// A read failing because Ctrl-C closed the socket is a clean stop.
fn stopped_or(
    err: ClientError,
    running: &AtomicBool,
    context: &str,
) -> CliResult<i32> {
    if !running.load(Ordering::SeqCst) {
        debug!(error = %err, "read interrupted by shutdown");
        return Ok(SUCCESS);
    }
    Err(client_error(context, err))
}

fn describe(client: &Client, event: ReadEvent) -> EventOutput {
    match event {
        ReadEvent::Synch { sample_time } => EventOutput {
            sample_time: Some(format_time(sample_time)),
            ..EventOutput::new("synch")
        },
        ReadEvent::Data { handle } => data_output(client, handle),
        ReadEvent::Unrouted { addr } => EventOutput {
            device: Some(addr.to_string()),
            ..EventOutput::new("unrouted")
        },
        ReadEvent::Discarded { kind } => EventOutput {
            kind: Some(kind.to_string()),
            ..EventOutput::new("discarded")
        },
    }
}

fn data_output(client: &Client, handle: DeviceHandle) -> EventOutput {
    let mut out = EventOutput::new("data");
    if let Some(record) = client.device(handle) {
        out.device = Some(record.addr().to_string());
        out.sample_time = Some(format_time(record.data_time()));
    }
    if let Some(raw) = client.handler::<RawDevice>(handle) {
        out.subtype = raw.last_header().map(|header| header.subtype);
        out.size = Some(raw.data().len());
        out.payload = Some(payload_preview(raw.data()));
        out.raw = raw.data().to_vec();
    }
    out
}

fn install_ctrlc_handler(running: Arc<AtomicBool>, shutdown: ShutdownHandle) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
        let _ = shutdown.shutdown();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
