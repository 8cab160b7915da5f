use std::io::{IsTerminal, Write};
use std::net::SocketAddr;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

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

/// What one node of a probe observed.
#[derive(Serialize, Debug)]
pub struct NodeReport {
    pub node: String,
    pub role: &'static str,
    pub pipe_id: Option<u32>,
    pub outcome: String,
    pub ready: Option<bool>,
    pub reply_size: usize,
    pub reply: String,
    pub peer_address: Option<String>,
    pub peer_port: Option<u16>,
    pub matches_master: bool,
}

#[derive(Serialize)]
struct ProbeOutput<'a> {
    schema_id: &'a str,
    host: &'a str,
    port: u16,
    consistent: bool,
    nodes: &'a [NodeReport],
}

pub fn print_probe(host: &str, port: u16, reports: &[NodeReport], format: OutputFormat) {
    let consistent = reports.iter().all(|report| report.matches_master);
    match format {
        OutputFormat::Json => {
            let out = ProbeOutput {
                schema_id: "https://schemas.3leaps.dev/clusterpipe/cli/v1/probe-report.schema.json",
                host,
                port,
                consistent,
                nodes: reports,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    "NODE", "PIPE", "OUTCOME", "READY", "REPLY", "PEER", "MATCH",
                ]);
            for report in reports {
                table.add_row(vec![
                    report.node.clone(),
                    optional(report.pipe_id),
                    report.outcome.clone(),
                    optional(report.ready),
                    report.reply.clone(),
                    peer(report),
                    report.matches_master.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for report in reports {
                println!(
                    "node={} pipe={} outcome={} ready={} size={} reply={} peer={} match={}",
                    report.node,
                    optional(report.pipe_id),
                    report.outcome,
                    optional(report.ready),
                    report.reply_size,
                    report.reply,
                    peer(report),
                    report.matches_master
                );
            }
        }
        OutputFormat::Raw => {
            if let Some(master) = reports.first() {
                print_raw(master.reply.as_bytes());
            }
        }
    }
}

#[derive(Serialize)]
struct ListeningOutput<'a> {
    schema_id: &'a str,
    listening: String,
}

/// Announce the bound address of the echo server.
pub fn print_listening(addr: SocketAddr, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ListeningOutput {
                schema_id: "https://schemas.3leaps.dev/clusterpipe/cli/v1/echo-listening.schema.json",
                listening: addr.to_string(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => println!("listening on {addr}"),
        OutputFormat::Raw => println!("{addr}"),
    }
    let _ = std::io::stdout().flush();
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |value| value.to_string())
}

fn peer(report: &NodeReport) -> String {
    match (&report.peer_address, report.peer_port) {
        (Some(address), Some(port)) => format!("{address}:{port}"),
        (Some(address), None) => address.clone(),
        (None, Some(port)) => format!("?:{port}"),
        (None, None) => "unknown".to_string(),
    }
}
