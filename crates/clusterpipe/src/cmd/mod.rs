use clap::{Args, Subcommand, ValueEnum};

use clusterpipe_packet::DEFAULT_PACKET_CAPACITY;
use clusterpipe_pipe::Coupling;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod echo;
pub mod probe;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start a TCP echo server.
    Echo(EchoArgs),
    /// Run an in-process cluster against a server and compare every node's view.
    Probe(ProbeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Echo(args) => echo::run(args, format),
        Command::Probe(args) => probe::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Address to bind (e.g. 127.0.0.1:7000; port 0 picks a free port).
    pub addr: String,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Host to connect to.
    pub host: String,
    /// Port to connect to.
    pub port: u16,
    /// Number of slave nodes to replay the master's results.
    #[arg(long, default_value_t = 2)]
    pub slaves: usize,
    /// Payload each node writes.
    #[arg(long, default_value = "PING")]
    pub data: String,
    /// How long the master waits for a reply (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
    /// Packet payload capacity in bytes.
    #[arg(long, default_value_t = DEFAULT_PACKET_CAPACITY)]
    pub packet_capacity: usize,
    /// Which directions are replicated.
    #[arg(long, value_enum, default_value = "full")]
    pub coupling: CouplingArg,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum CouplingArg {
    /// Reads and writes.
    Full,
    /// Reads, waits and metadata only.
    Read,
    /// Write outcomes only.
    Write,
    /// Nothing; slaves see end of stream.
    #[value(name = "none")]
    Neither,
}

impl From<CouplingArg> for Coupling {
    fn from(arg: CouplingArg) -> Self {
        match arg {
            CouplingArg::Full => Coupling::FULL,
            CouplingArg::Read => Coupling::new(true, false),
            CouplingArg::Write => Coupling::new(false, true),
            CouplingArg::Neither => Coupling::NONE,
        }
    }
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
