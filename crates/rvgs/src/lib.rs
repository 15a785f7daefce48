//! rvgs - GDB Remote Serial Protocol server for simulated RISC-V cores.
//!
//! The server owns an RSP connection and a [`rvgs_target::Target`], and
//! translates client packets into register/memory accesses, breakpoint
//! bookkeeping and run control on the target. Bare-metal syscalls made by
//! the running program are forwarded back to the client as File-I/O
//! requests.
//!
//! # Example
//!
//! ```ignore
//! use rvgs::{GdbServer, KillBehaviour};
//! use rvgs_rsp::{TcpTransport, TraceFlags};
//!
//! let flags = std::sync::Arc::new(TraceFlags::new());
//! let target = rvgs::cores::create("sim", 1 << 24).unwrap();
//! let mut server = GdbServer::new(
//!     Box::new(TcpTransport::new(3333)),
//!     target,
//!     flags,
//!     KillBehaviour::ResetOnKill,
//! );
//! let exit_code = server.serve()?; // Blocks for the life of the session.
//! ```

pub mod cores;
pub mod matchpoint;
pub mod server;
pub mod signal;

use thiserror::Error;

pub use matchpoint::MatchpointTable;
pub use server::{GdbServer, KillBehaviour, PKT_SIZE};
pub use signal::Signal;

/// Server-fatal failures. Per-packet protocol problems never surface
/// here; they are answered on the wire with `E<nn>` packets.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("unable to connect to RSP client: {0}")]
    Connect(#[source] rvgs_rsp::RspError),
}

pub type Result<T> = std::result::Result<T, ServerError>;
