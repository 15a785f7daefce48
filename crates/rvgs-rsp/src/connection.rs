//! RSP framing over a transport.
//!
//! Wire format is `$<payload>#<csum>` with `$`, `#`, `*` and `}` escaped
//! inside the payload as `}` followed by the byte XOR 0x20, and a one-byte
//! checksum (sum of the on-wire payload, mod 256) in two lowercase hex
//! characters. `+`/`-` acknowledge each frame; the bare byte 0x03 outside
//! any frame is a BREAK request.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::flags::TraceFlags;
use crate::hex::{char2hex, hex2char};
use crate::packet::Packet;
use crate::transport::Transport;
use crate::Result;

/// The out-of-band interrupt byte (ctrl-C).
pub const BREAK_CHAR: u8 = 0x03;

/// An RSP connection: framing, checksums and acknowledgement over a
/// transport, with a single byte of look-ahead for BREAK detection.
pub struct Connection {
    transport: Box<dyn Transport>,
    flags: Arc<TraceFlags>,
    lookahead: Option<u8>,
    pending_break: bool,
}

impl Connection {
    pub fn new(transport: Box<dyn Transport>, flags: Arc<TraceFlags>) -> Self {
        Self {
            transport,
            flags,
            lookahead: None,
            pending_break: false,
        }
    }

    pub fn connect(&mut self) -> Result<()> {
        self.transport.connect()?;
        if self.flags.conn() {
            debug!("RSP connection established");
        }
        Ok(())
    }

    pub fn close(&mut self) {
        self.lookahead = None;
        self.pending_break = false;
        self.transport.close();
        if self.flags.conn() {
            debug!("RSP connection closed");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Blocking read of one byte, honouring the look-ahead buffer first.
    fn get_byte(&mut self) -> Result<u8> {
        if let Some(b) = self.lookahead.take() {
            return Ok(b);
        }
        match self.transport.get_byte(true)? {
            Some(b) => Ok(b),
            None => Err(crate::RspError::Disconnected),
        }
    }

    /// Read the next packet into `pkt`, validating the checksum and
    /// acknowledging it. Loops until a well-formed packet arrives; any
    /// transport failure means the connection is dead.
    pub fn get_pkt(&mut self, pkt: &mut Packet) -> Result<()> {
        'packet: loop {
            // Wait for the start character, discarding everything else.
            while self.get_byte()? != b'$' {}

            // Collect payload until '#', restarting on a stray '$'.
            let mut checksum: u8 = 0;
            let mut count: usize = 0;
            let mut overrun = false;
            let ch = loop {
                let ch = self.get_byte()?;
                match ch {
                    b'$' => {
                        checksum = 0;
                        count = 0;
                        overrun = false;
                    }
                    b'#' => break ch,
                    _ => {
                        checksum = checksum.wrapping_add(ch);
                        if count < pkt.capacity() - 1 {
                            pkt.buf_mut()[count] = ch;
                            count += 1;
                        } else {
                            overrun = true;
                        }
                    }
                }
            };
            debug_assert_eq!(ch, b'#');
            pkt.set_len(count);

            let mut xmit_csum = char2hex(self.get_byte()?).unwrap_or(0) << 4;
            xmit_csum |= char2hex(self.get_byte()?).unwrap_or(0);

            if overrun {
                warn!(capacity = pkt.capacity(), "RSP packet overran buffer");
                continue 'packet;
            }

            if checksum != xmit_csum {
                warn!(
                    computed = format_args!("{checksum:#04x}"),
                    received = format_args!("{xmit_csum:#04x}"),
                    "bad RSP checksum"
                );
                self.transport.put_byte(b'-')?;
                self.transport.flush()?;
                continue 'packet;
            }

            self.transport.put_byte(b'+')?;
            self.transport.flush()?;
            if self.flags.rsp() {
                debug!(len = pkt.len(), payload = pkt.as_str(), "getPkt");
            }
            return Ok(());
        }
    }

    /// Frame and send `pkt`, retransmitting until the client acks with `+`.
    pub fn put_pkt(&mut self, pkt: &mut Packet) -> Result<()> {
        loop {
            let mut checksum: u8 = 0;
            self.transport.put_byte(b'$')?;
            for i in 0..pkt.len() {
                let mut ch = pkt.data()[i];
                if matches!(ch, b'$' | b'#' | b'*' | b'}') {
                    ch ^= 0x20;
                    checksum = checksum.wrapping_add(b'}');
                    self.transport.put_byte(b'}')?;
                }
                checksum = checksum.wrapping_add(ch);
                self.transport.put_byte(ch)?;
            }
            self.transport.put_byte(b'#')?;
            self.transport.put_byte(hex2char(checksum >> 4))?;
            self.transport.put_byte(hex2char(checksum & 0xf))?;
            self.transport.flush()?;

            if self.get_byte()? == b'+' {
                break;
            }
        }
        if self.flags.rsp() {
            debug!(len = pkt.len(), payload = pkt.as_str(), "putPkt");
        }
        Ok(())
    }

    /// Has a BREAK (ctrl-C) arrived?
    ///
    /// Peeks at most one byte without blocking. A non-BREAK byte goes into
    /// the look-ahead slot for the next blocking read; a BREAK is latched
    /// and reported exactly once.
    pub fn have_break(&mut self) -> bool {
        if !self.pending_break && self.lookahead.is_none() {
            if let Ok(Some(b)) = self.transport.get_byte(false) {
                if b == BREAK_CHAR {
                    if self.flags.brk() {
                        debug!("BREAK received from client");
                    }
                    self.pending_break = true;
                } else if self.lookahead.replace(b).is_some() {
                    warn!("RSP look-ahead already held a character");
                }
            }
        }
        std::mem::take(&mut self.pending_break)
    }
}
