//! GDB Remote Serial Protocol plumbing.
//!
//! Everything below the command dispatcher: hex codecs, the packet buffer,
//! `$…#cs` framing with acknowledgement and BREAK detection, the TCP and
//! stdio transports, and the File-I/O reply parser. The server crate sits
//! on top and gives the packets meaning.

pub mod connection;
pub mod flags;
pub mod hex;
pub mod packet;
pub mod syscall_reply;
pub mod transport;

use thiserror::Error;

pub use connection::{Connection, BREAK_CHAR};
pub use flags::TraceFlags;
pub use packet::Packet;
pub use syscall_reply::SyscallReply;
pub use transport::{StdioTransport, TcpTransport, Transport};

/// Transport-level failures. Protocol-level problems are not errors: they
/// are `E<nn>` replies composed by the dispatcher.
#[derive(Debug, Error)]
pub enum RspError {
    #[error("connection closed by client")]
    Disconnected,

    #[error("transport is not connected")]
    NotConnected,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RspError>;
