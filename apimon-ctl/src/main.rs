//! Controller CLI for the monitor agent.
//!
//! Opens one TCP connection per command, sends the command token, prints
//! the response rows, and exits. The agent's protocol is strictly one
//! request per connection, so there is nothing to keep open.

use anyhow::{Context, Result, bail};
use apimon_common::portfile::read_port_file;
use apimon_common::{Command, ResponseBatch, codec};
use clap::{Parser, Subcommand};
use std::net::TcpStream;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "apimon-ctl")]
#[command(author, version, about = "Controller for the API monitor agent")]
struct Cli {
    /// Agent host.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Agent port.
    #[arg(short, long, conflicts_with = "port_file")]
    port: Option<u16>,

    /// File holding the agent's decimal port number.
    #[arg(long)]
    port_file: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: CtlCommand,
}

#[derive(Subcommand)]
enum CtlCommand {
    /// Liveness probe: print the agent's pid and host identity.
    Check,
    /// Drain and print the agent's buffered log entries.
    Logs,
    /// Print the agent's current time.
    Time,
    /// Ask the agent to close its listening socket.
    Close,
}

impl CtlCommand {
    fn wire_command(&self) -> Command {
        match self {
            Self::Check => Command::ConnCheck,
            Self::Logs => Command::GetLogs,
            Self::Time => Command::GetTime,
            Self::Close => Command::Close,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let port = resolve_port(&cli)?;
    let command = cli.command.wire_command();
    debug!("sending {command} to {}:{port}", cli.host);

    let mut stream = TcpStream::connect((cli.host.as_str(), port))
        .with_context(|| format!("agent not reachable at {}:{port}", cli.host))?;
    codec::encode(&mut stream, command.token()).context("failed to send command")?;
    let rows: ResponseBatch = codec::decode(&mut stream).context("failed to read response")?;

    for row in &rows {
        let fields: Vec<&str> = (0..3).map(|i| row.field(i).unwrap_or("-")).collect();
        println!("{}", fields.join("\t"));
    }
    if rows.is_empty() {
        debug!("agent returned an empty response");
    }
    Ok(())
}

fn resolve_port(cli: &Cli) -> Result<u16> {
    if let Some(port) = cli.port {
        return Ok(port);
    }
    if let Some(ref path) = cli.port_file {
        return read_port_file(path)
            .with_context(|| format!("failed to read port file {}", path.display()));
    }
    bail!("either --port or --port-file is required");
}
