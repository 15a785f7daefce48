//! Byte-oriented duplex transports.
//!
//! The connection layer is transport-agnostic; the two bindings are a TCP
//! listener accepting a single GDB client at a time, and a proxy over the
//! process's own standard streams (for `target remote |`-style use).

use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::os::fd::{AsFd, AsRawFd};

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use tracing::{debug, info, warn};

use crate::{Result, RspError};

/// A duplex byte channel the RSP connection runs over.
///
/// `get_byte(false)` must never block: it returns `Ok(None)` when no byte
/// is available, which is what lets the server poll for BREAK while the
/// target runs.
pub trait Transport {
    /// Wait for a client. Blocking; an error here is fatal to the server.
    fn connect(&mut self) -> Result<()>;

    /// Drop the current client, keeping the transport ready to reconnect.
    fn close(&mut self);

    fn is_connected(&self) -> bool;

    fn put_byte(&mut self, b: u8) -> Result<()>;

    /// Read one byte. `Ok(None)` only in non-blocking mode; end-of-stream
    /// and I/O failures surface as [`RspError::Disconnected`].
    fn get_byte(&mut self, blocking: bool) -> Result<Option<u8>>;

    /// Push any buffered output bytes to the peer.
    fn flush(&mut self) -> Result<()>;
}

/// TCP binding: listen on a port, serve one client at a time.
pub struct TcpTransport {
    port: u16,
    listener: Option<TcpListener>,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            listener: None,
            stream: None,
        }
    }

    fn stream(&mut self) -> Result<&mut TcpStream> {
        self.stream.as_mut().ok_or(RspError::NotConnected)
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self) -> Result<()> {
        if self.listener.is_none() {
            let listener = TcpListener::bind(("0.0.0.0", self.port))?;
            info!(port = self.port, "listening for GDB connection");
            self.listener = Some(listener);
        }
        let listener = self.listener.as_ref().expect("listener bound above");
        let (stream, peer) = listener.accept()?;
        // RSP is a chatty request/reply protocol; don't batch small writes.
        stream.set_nodelay(true)?;
        info!(%peer, "GDB client connected");
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            debug!("closing GDB client connection");
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn put_byte(&mut self, b: u8) -> Result<()> {
        self.stream()?.write_all(&[b]).map_err(|e| {
            warn!(error = %e, "failed to write to RSP client");
            RspError::Disconnected
        })
    }

    fn get_byte(&mut self, blocking: bool) -> Result<Option<u8>> {
        let stream = self.stream()?;
        let mut buf = [0u8; 1];
        if blocking {
            loop {
                match stream.read(&mut buf) {
                    Ok(0) => return Err(RspError::Disconnected),
                    Ok(_) => return Ok(Some(buf[0])),
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        warn!(error = %e, "failed to read from RSP client");
                        return Err(RspError::Disconnected);
                    }
                }
            }
        }
        stream.set_nonblocking(true)?;
        let res = stream.read(&mut buf);
        stream.set_nonblocking(false)?;
        match res {
            Ok(0) => Err(RspError::Disconnected),
            Ok(_) => Ok(Some(buf[0])),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Ok(None),
            Err(e) => {
                warn!(error = %e, "failed to read from RSP client");
                Err(RspError::Disconnected)
            }
        }
    }

    fn flush(&mut self) -> Result<()> {
        Ok(self.stream()?.flush()?)
    }
}

/// Standard-stream binding: RSP over stdin/stdout.
///
/// Reads go straight to the file descriptor (not through the std library's
/// buffered handle) so the zero-timeout poll in `get_byte(false)` agrees
/// with what has actually been consumed.
pub struct StdioTransport {
    connected: bool,
    finished: bool,
    out: io::Stdout,
}

impl StdioTransport {
    pub fn new() -> Self {
        Self {
            connected: false,
            finished: false,
            out: io::stdout(),
        }
    }

    fn read_raw(&self) -> Result<Option<u8>> {
        let stdin = io::stdin();
        let mut buf = [0u8; 1];
        loop {
            match nix::unistd::read(stdin.as_raw_fd(), &mut buf) {
                Ok(0) => return Err(RspError::Disconnected),
                Ok(_) => return Ok(Some(buf[0])),
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => {
                    warn!(error = %e, "failed to read from stdin");
                    return Err(RspError::Disconnected);
                }
            }
        }
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for StdioTransport {
    fn connect(&mut self) -> Result<()> {
        // There is exactly one client on the other end of the standard
        // streams; once that session ends there is nobody to reconnect.
        if self.finished {
            return Err(RspError::Disconnected);
        }
        self.connected = true;
        Ok(())
    }

    fn close(&mut self) {
        self.connected = false;
        self.finished = true;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn put_byte(&mut self, b: u8) -> Result<()> {
        Ok(self.out.write_all(&[b])?)
    }

    fn get_byte(&mut self, blocking: bool) -> Result<Option<u8>> {
        if !blocking {
            let stdin = io::stdin();
            let fd = stdin.as_fd();
            let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
            match poll(&mut fds, PollTimeout::ZERO) {
                Ok(0) => return Ok(None),
                Ok(_) => {}
                Err(nix::errno::Errno::EINTR) => return Ok(None),
                Err(e) => {
                    warn!(error = %e, "stdin poll failed");
                    return Err(RspError::Disconnected);
                }
            }
        }
        self.read_raw()
    }

    fn flush(&mut self) -> Result<()> {
        Ok(self.out.flush()?)
    }
}
