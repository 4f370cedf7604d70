use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use playerlink_client::Timestamp;
use serde::Serialize;

/// Longest payload prefix rendered as hex before truncating.
const HEX_PREVIEW_BYTES: usize = 32;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One line of `watch` output.
#[derive(Serialize, Debug)]
pub struct EventOutput {
    pub event: &'static str,
    pub device: Option<String>,
    pub kind: Option<String>,
    pub subtype: Option<u16>,
    pub size: Option<usize>,
    pub payload: Option<String>,
    pub sample_time: Option<String>,
    #[serde(skip)]
    pub raw: Vec<u8>,
}

impl EventOutput {
    pub fn new(event: &'static str) -> Self {
        Self {
            event,
            device: None,
            kind: None,
            subtype: None,
            size: None,
            payload: None,
            sample_time: None,
            raw: Vec::new(),
        }
    }
}

pub fn print_event(out: &EventOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["EVENT", "DEVICE", "SUBTYPE", "SIZE", "TIME", "PAYLOAD"])
                .add_row(vec![
                    out.event.to_string(),
                    cell(&out.device),
                    cell(&out.subtype),
                    cell(&out.size),
                    cell(&out.sample_time),
                    cell(&out.payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let mut line = format!("event={}", out.event);
            if let Some(device) = &out.device {
                line.push_str(&format!(" device={device}"));
            }
            if let Some(kind) = &out.kind {
                line.push_str(&format!(" kind={kind}"));
            }
            if let Some(subtype) = out.subtype {
                line.push_str(&format!(" subtype={subtype}"));
            }
            if let Some(size) = out.size {
                line.push_str(&format!(" size={size}"));
            }
            if let Some(time) = &out.sample_time {
                line.push_str(&format!(" time={time}"));
            }
            if let Some(payload) = &out.payload {
                line.push_str(&format!(" payload={payload}"));
            }
            println!("{line}");
        }
        OutputFormat::Raw => print_raw(&out.raw),
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_table(header: Vec<&str>, rows: Vec<Vec<String>>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    for row in rows {
        table.add_row(row);
    }
    println!("{table}");
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

/// Printable UTF-8 is shown as text, anything else as (truncated) hex.
pub fn payload_preview(payload: &[u8]) -> String {
    if let Ok(text) = std::str::from_utf8(payload) {
        if !text.chars().any(|c| c.is_control() && c != '\n' && c != '\t') {
            return text.to_string();
        }
    }
    let shown = &payload[..payload.len().min(HEX_PREVIEW_BYTES)];
    let mut hex: String = shown.iter().map(|byte| format!("{byte:02x}")).collect();
    if payload.len() > HEX_PREVIEW_BYTES {
        hex.push_str(&format!("... ({} bytes)", payload.len()));
    }
    hex
}

pub fn format_time(time: Timestamp) -> String {
    format!("{}.{:06}", time.sec, time.usec)
}

fn cell<T: ToString>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "-".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_payloads_are_shown_verbatim() {
        assert_eq!(payload_preview(b"forward"), "forward");
    }

    #[test]
    fn binary_payloads_are_hex() {
        assert_eq!(payload_preview(&[0x00, 0x05, 0xff]), "0005ff");
    }

    #[test]
    fn long_binary_payloads_are_truncated() {
        let preview = payload_preview(&[0u8; 40]);
        assert!(preview.starts_with(&"00".repeat(HEX_PREVIEW_BYTES)));
        assert!(preview.ends_with("... (40 bytes)"));
    }

    #[test]
    fn times_pad_microseconds() {
        assert_eq!(format_time(Timestamp::new(100, 2_500)), "100.002500");
    }

    #[test]
    fn json_skips_raw_bytes() {
        let mut out = EventOutput::new("data");
        out.raw = b"abc".to_vec();
        let json = serde_json::to_string(&out).unwrap();
        assert!(!json.contains("raw"));
        assert!(json.contains("\"event\":\"data\""));
    }
}
