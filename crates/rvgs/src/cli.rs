//! CLI definitions.

use clap::Parser;

pub use rvgs::server::{EXIT_FAILURE, EXIT_SUCCESS};

#[derive(Parser)]
#[command(name = "rvgs")]
#[command(about = "GDB Remote Serial Protocol server for simulated RISC-V cores")]
#[command(version)]
pub struct Cli {
    /// TCP port to listen on for the GDB client
    #[arg(value_name = "PORT", required_unless_present = "stdin")]
    pub port: Option<u16>,

    /// Simulator core to serve
    #[arg(long, default_value = "sim")]
    pub core: String,

    /// Enable a named trace flag (repeatable)
    #[arg(long, value_name = "FLAG", action = clap::ArgAction::Append)]
    pub trace: Vec<String>,

    /// Reduce diagnostic output
    #[arg(long)]
    pub silent: bool,

    /// Speak RSP over stdin/stdout instead of TCP
    #[arg(long, conflicts_with = "port")]
    pub stdin: bool,

    /// Guest memory size in bytes for the built-in core
    #[arg(long, default_value_t = 1 << 24)]
    pub memory_bytes: usize,
}
