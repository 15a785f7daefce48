//! rvgs - GDB server for simulated RISC-V cores.

mod cli;

use std::process::exit;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rvgs::{cores, GdbServer, KillBehaviour};
use rvgs_rsp::{StdioTransport, TcpTransport, TraceFlags, Transport};

use cli::{Cli, EXIT_FAILURE};

fn main() {
    let cli = Cli::parse();

    // Diagnostics go to stderr so they never mix with RSP bytes in
    // --stdin mode. RUST_LOG=debug turns on the packet-level dumps the
    // trace flags gate.
    let default_level = if cli.silent { "rvgs=error" } else { "rvgs=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(default_level.parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let flags = Arc::new(TraceFlags::new());
    for name in &cli.trace {
        if !flags.set(name, true) {
            error!(flag = %name, "unknown trace flag");
            exit(EXIT_FAILURE);
        }
    }
    if cli.silent {
        flags.set("silent", true);
    }

    let Some(target) = cores::create(&cli.core, cli.memory_bytes) else {
        error!(
            core = %cli.core,
            known = ?cores::names(),
            "unknown core"
        );
        exit(EXIT_FAILURE);
    };

    // A TCP server outlives its clients and keeps the target across kill
    // requests; a stdio server belongs to the single GDB that spawned it.
    let (transport, kill): (Box<dyn Transport>, KillBehaviour) = if cli.stdin {
        (
            Box::new(StdioTransport::new()),
            KillBehaviour::ExitOnKill,
        )
    } else {
        let port = cli.port.expect("clap requires a port without --stdin");
        (
            Box::new(TcpTransport::new(port)),
            KillBehaviour::ResetOnKill,
        )
    };

    let mut server = GdbServer::new(transport, target, flags, kill);
    match server.serve() {
        Ok(code) => {
            info!(code, "server finished");
            exit(code);
        }
        Err(e) => {
            error!(error = %e, "server failed");
            exit(EXIT_FAILURE);
        }
    }
}
