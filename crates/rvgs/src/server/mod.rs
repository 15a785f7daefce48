//! The RSP command dispatcher.
//!
//! One packet in, one (or more) packets out: the server reads a client
//! request, switches on its first byte, and drives the target and the
//! matchpoint table accordingly. Unsupported features are answered with
//! the empty packet so the client negotiates them away; malformed
//! requests get `E01`.

mod monitor;
mod run;
mod syscall;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use rvgs_rsp::hex;
use rvgs_rsp::{Connection, Packet, RspError, TraceFlags, Transport};
use rvgs_target::{regs, MatchKind, Target};

use crate::signal::Signal;
use crate::{MatchpointTable, ServerError};

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;

/// Thread id reported for our single thread of execution.
const DUMMY_TID: u32 = 1;

/// Packet buffer capacity: room for a `G` packet (command byte plus every
/// register as hex) and a terminating NUL, and never less than 256.
pub const PKT_SIZE: usize = {
    let greg = 1 + regs::NUM_REGS * regs::REG_BYTES * 2 + 1;
    if greg > 256 {
        greg
    } else {
        256
    }
};

type RspResult<T> = std::result::Result<T, RspError>;

/// What should happen after a packet has been handled.
pub(crate) enum Flow {
    /// Keep serving.
    Continue,
    /// Tear down and exit the process with this code.
    Exit(i32),
}

/// Which kind of resume a run request (or a pending syscall) stands for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RunMode {
    Step,
    Continue,
}

/// Behaviour on a GDB kill (`k`) request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KillBehaviour {
    /// Stay alive and keep serving.
    ResetOnKill,
    /// Exit the server with success.
    ExitOnKill,
}

/// The GDB RSP server.
pub struct GdbServer {
    conn: Connection,
    target: Box<dyn Target>,
    flags: Arc<TraceFlags>,
    pkt: Packet,
    matchpoints: MatchpointTable,
    /// User run timeout set by `monitor timeout`; `None` is unbounded.
    timeout: Option<Duration>,
    kill_behaviour: KillBehaviour,
    /// Set while an `F` request is outstanding: how to resume once the
    /// client's reply arrives.
    pending_syscall: Option<RunMode>,
}

impl GdbServer {
    pub fn new(
        transport: Box<dyn Transport>,
        target: Box<dyn Target>,
        flags: Arc<TraceFlags>,
        kill_behaviour: KillBehaviour,
    ) -> Self {
        Self {
            conn: Connection::new(transport, flags.clone()),
            target,
            flags,
            pkt: Packet::new(PKT_SIZE),
            matchpoints: MatchpointTable::new(),
            timeout: None,
            kill_behaviour,
            pending_syscall: None,
        }
    }

    /// Serve RSP requests until the client asks us to exit or the
    /// transport can no longer produce a connection.
    ///
    /// Returns the process exit code. A dropped connection is not an
    /// error: the server closes it and waits for the next client.
    pub fn serve(&mut self) -> crate::Result<i32> {
        let outcome = self.serve_loop();
        self.target.terminate();
        outcome
    }

    fn serve_loop(&mut self) -> crate::Result<i32> {
        loop {
            while !self.conn.is_connected() {
                if let Err(e) = self.conn.connect() {
                    return Err(ServerError::Connect(e));
                }
            }
            match self.handle_packet() {
                Ok(Flow::Continue) => {}
                Ok(Flow::Exit(code)) => return Ok(code),
                Err(_) => self.conn.close(),
            }
        }
    }

    /// Read and act on one client request.
    fn handle_packet(&mut self) -> RspResult<Flow> {
        self.conn.get_pkt(&mut self.pkt)?;

        let payload = self.pkt.data().to_vec();
        let text = String::from_utf8_lossy(&payload).into_owned();

        match payload.first().copied().unwrap_or(0) {
            // Extended remote mode: fine, we serve it the same way.
            b'!' => self.reply("OK")?,
            b'?' => self.report_signal(Signal::Trap)?,
            b'A' => {
                warn!("RSP 'A' packet not supported: ignored");
                self.reply("E01")?;
            }
            b'b' | b'B' | b'd' | b'r' | b't' => {
                warn!(packet = %text, "deprecated RSP packet: ignored");
            }
            b'c' | b'C' => return self.run(RunMode::Continue),
            b'D' => {
                self.reply("OK")?;
                self.conn.close();
            }
            b'F' => return self.syscall_reply(&text),
            b'g' => self.read_all_regs()?,
            b'G' => self.write_all_regs(&text)?,
            b'H' => self.reply("OK")?,
            // Single cycle step: report a trap straight away.
            b'i' | b'I' => self.report_signal(Signal::Trap)?,
            b'k' => return Ok(self.kill()),
            b'm' => self.read_mem(&text)?,
            b'M' => self.write_mem(&text)?,
            b'p' => self.read_reg(&text)?,
            b'P' => self.write_reg(&text)?,
            b'q' => return self.query(&text),
            b'Q' => self.reply("")?,
            b'R' => {}
            b's' | b'S' => return self.run(RunMode::Step),
            b'T' => self.reply("OK")?,
            b'v' => self.v_packet(&text)?,
            b'X' => self.write_mem_bin(&payload)?,
            b'z' => self.remove_matchpoint(&text)?,
            b'Z' => self.insert_matchpoint(&text)?,
            _ => warn!(packet = %text, "unknown RSP request: ignored"),
        }
        Ok(Flow::Continue)
    }

    // ------------------------------------------------------------------
    // Reply helpers
    // ------------------------------------------------------------------

    fn reply(&mut self, s: &str) -> RspResult<()> {
        self.pkt.pack_str(s);
        self.conn.put_pkt(&mut self.pkt)
    }

    /// Send an `O`-prefixed hex-encoded console line.
    fn reply_console(&mut self, s: &str) -> RspResult<()> {
        self.pkt.pack_hexstr(s);
        self.conn.put_pkt(&mut self.pkt)
    }

    fn report_signal(&mut self, sig: Signal) -> RspResult<()> {
        self.reply(&format!("S{:02x}", sig.code()))
    }

    fn kill(&mut self) -> Flow {
        match self.kill_behaviour {
            KillBehaviour::ExitOnKill => Flow::Exit(EXIT_SUCCESS),
            // Keep going; the target state is left as the client set it.
            KillBehaviour::ResetOnKill => Flow::Continue,
        }
    }

    // ------------------------------------------------------------------
    // Register access
    // ------------------------------------------------------------------

    fn read_all_regs(&mut self) -> RspResult<()> {
        let mut out = String::with_capacity(regs::NUM_REGS * regs::REG_BYTES * 2);
        for reg in 0..regs::NUM_REGS {
            let (val, size) = self.target.read_register(reg);
            if size == 0 {
                warn!(reg, "failed to read register");
                return self.reply("E01");
            }
            out.push_str(&hex::val2hex(val, size, true));
        }
        self.reply(&out)
    }

    fn write_all_regs(&mut self, text: &str) -> RspResult<()> {
        let stream = text[1..].as_bytes();
        let mut offset = 0;
        for reg in 0..regs::NUM_REGS {
            let (_, size) = self.target.read_register(reg);
            if size == 0 || stream.len() < offset + size * 2 {
                warn!(reg, "malformed RSP write-all-registers command");
                return self.reply("E01");
            }
            let val = hex::hex2val(&stream[offset..offset + size * 2], size, true);
            let written = self.target.write_register(reg, val);
            if written != size {
                warn!(reg, size, written, "short register write");
            }
            offset += size * 2;
        }
        self.reply("OK")
    }

    fn read_reg(&mut self, text: &str) -> RspResult<()> {
        let Some((reg, _)) = parse_hex(&text[1..]) else {
            warn!(packet = %text, "failed to recognize RSP read register command");
            return self.reply("E01");
        };
        let (val, size) = self.target.read_register(reg as usize);
        if size == 0 {
            warn!(reg, "failed to read register");
            return self.reply("E01");
        }
        self.reply(&hex::val2hex(val, size, true))
    }

    fn write_reg(&mut self, text: &str) -> RspResult<()> {
        let parsed = (|| {
            let (reg, rest) = parse_hex(&text[1..])?;
            let valstr = rest.strip_prefix('=')?;
            Some((reg as usize, valstr))
        })();
        let Some((reg, valstr)) = parsed else {
            warn!(packet = %text, "failed to recognize RSP write register command");
            return self.reply("E01");
        };
        let (_, size) = self.target.read_register(reg);
        if size == 0 {
            warn!(reg, "failed to write register");
            return self.reply("E01");
        }
        let val = hex::hex2val(valstr.as_bytes(), size, true);
        let written = self.target.write_register(reg, val);
        if written != size {
            warn!(reg, size, written, "short register write");
        }
        self.reply("OK")
    }

    // ------------------------------------------------------------------
    // Memory access
    // ------------------------------------------------------------------

    fn read_mem(&mut self, text: &str) -> RspResult<()> {
        let parsed = (|| {
            let (addr, rest) = parse_hex(&text[1..])?;
            let (len, _) = parse_hex(rest.strip_prefix(',')?)?;
            Some((addr, len as usize))
        })();
        let Some((addr, mut len)) = parsed else {
            warn!(packet = %text, "failed to recognize RSP read memory command");
            return self.reply("E01");
        };

        // Two hex chars per byte must fit in the reply buffer.
        if len * 2 >= self.pkt.capacity() {
            warn!(len, "memory read too large for RSP packet: truncated");
            len = (self.pkt.capacity() - 1) / 2;
        }

        let mut buf = vec![0u8; len];
        let n = self.target.read_mem(addr, &mut buf);
        if n != len {
            warn!(addr, len, read = n, "failed to read memory");
            return self.reply("E01");
        }
        let mut out = String::with_capacity(len * 2);
        for b in buf {
            out.push(hex::hex2char(b >> 4) as char);
            out.push(hex::hex2char(b & 0xf) as char);
        }
        self.reply(&out)
    }

    fn write_mem(&mut self, text: &str) -> RspResult<()> {
        let parsed = (|| {
            let (head, data) = text.split_once(':')?;
            let (addr, rest) = parse_hex(&head[1..])?;
            let (len, _) = parse_hex(rest.strip_prefix(',')?)?;
            Some((addr, len as usize, data))
        })();
        let Some((addr, len, data)) = parsed else {
            warn!(packet = %text, "failed to recognize RSP write memory command");
            return self.reply("E01");
        };

        if data.len() != len * 2 {
            warn!(
                expected = len * 2,
                supplied = data.len(),
                "write memory digit count mismatch: packet ignored"
            );
            return self.reply("E01");
        }

        let mut bytes = Vec::with_capacity(len);
        for pair in data.as_bytes().chunks_exact(2) {
            match (hex::char2hex(pair[0]), hex::char2hex(pair[1])) {
                (Some(hi), Some(lo)) => bytes.push((hi << 4) | lo),
                _ => {
                    warn!(packet = %text, "bad hex digit in write memory command");
                    return self.reply("E01");
                }
            }
        }
        if self.target.write_mem(addr, &bytes) != len {
            warn!(addr, len, "failed to write memory");
            return self.reply("E01");
        }
        self.reply("OK")
    }

    fn write_mem_bin(&mut self, payload: &[u8]) -> RspResult<()> {
        let parsed = (|| {
            let colon = payload.iter().position(|&b| b == b':')?;
            let head = std::str::from_utf8(&payload[1..colon]).ok()?;
            let (addr, rest) = parse_hex(head)?;
            let (len, _) = parse_hex(rest.strip_prefix(',')?)?;
            Some((addr, len as usize, colon))
        })();
        let Some((addr, mut len, colon)) = parsed else {
            warn!("failed to recognize RSP binary write memory command");
            return self.reply("E01");
        };

        let mut data = payload[colon + 1..].to_vec();
        let supplied = hex::unescape(&mut data);
        if supplied != len {
            let min = len.min(supplied);
            warn!(
                requested = len,
                supplied, writing = min,
                "binary write length mismatch"
            );
            len = min;
        }
        if self.target.write_mem(addr, &data[..len]) != len {
            warn!(addr, len, "failed to write memory");
            return self.reply("E01");
        }
        self.reply("OK")
    }

    // ------------------------------------------------------------------
    // Matchpoints
    // ------------------------------------------------------------------

    fn insert_matchpoint(&mut self, text: &str) -> RspResult<()> {
        let Some((kind, addr, len)) = parse_matchpoint(text) else {
            warn!(packet = %text, "RSP matchpoint insertion request not recognized: ignored");
            return self.reply("E01");
        };

        match kind {
            MatchKind::SwBreak => {
                // Save the instruction being displaced, then plant EBREAK.
                let mut orig = [0u8; 4];
                if self.target.read_mem(addr, &mut orig[..len]) != len {
                    warn!(addr, "failed to read memory when inserting breakpoint");
                }
                let instr = u32::from_le_bytes(orig);
                self.matchpoints.add(kind, addr, instr);
                if self.flags.brk() {
                    debug!(
                        addr = format_args!("{addr:#x}"),
                        instr = format_args!("{instr:#010x}"),
                        "inserting breakpoint over instruction"
                    );
                }
                let ebreak = regs::EBREAK.to_le_bytes();
                if self.target.write_mem(addr, &ebreak) != ebreak.len() {
                    warn!(addr, "failed to write EBREAK instruction");
                }
                if self.flags.rsp() {
                    debug!(addr = format_args!("{addr:#x}"), "software breakpoint inserted");
                }
                self.reply("OK")
            }
            _ => {
                if self.target.insert_matchpoint(addr, kind) {
                    self.matchpoints.add(kind, addr, 0);
                    if self.flags.rsp() {
                        debug!(%kind, addr = format_args!("{addr:#x}"), "matchpoint set");
                    }
                    self.reply("OK")
                } else {
                    // Unsupported by this core; the client falls back to
                    // software breakpoints.
                    self.reply("")
                }
            }
        }
    }

    fn remove_matchpoint(&mut self, text: &str) -> RspResult<()> {
        let Some((kind, addr, len)) = parse_matchpoint(text) else {
            warn!(packet = %text, "RSP matchpoint deletion request not recognized: ignored");
            return self.reply("E01");
        };

        let Some(instr) = self.matchpoints.remove(kind, addr) else {
            warn!(%kind, addr = format_args!("{addr:#x}"), "failed to remove matchpoint");
            return self.reply("E01");
        };

        match kind {
            MatchKind::SwBreak => {
                if self.flags.brk() {
                    debug!(
                        addr = format_args!("{addr:#x}"),
                        instr = format_args!("{instr:#010x}"),
                        "putting back the displaced instruction"
                    );
                }
                let bytes = instr.to_le_bytes();
                if self.target.write_mem(addr, &bytes[..len]) != len {
                    warn!(addr, "failed to write memory removing breakpoint");
                }
                if self.flags.rsp() {
                    debug!(addr = format_args!("{addr:#x}"), "software breakpoint removed");
                }
                self.reply("OK")
            }
            _ => {
                if self.target.remove_matchpoint(addr, kind) {
                    if self.flags.rsp() {
                        debug!(%kind, addr = format_args!("{addr:#x}"), "matchpoint removed");
                    }
                    self.reply("OK")
                } else {
                    self.reply("")
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Queries, sets and v-packets
    // ------------------------------------------------------------------

    fn query(&mut self, text: &str) -> RspResult<Flow> {
        if text == "qC" {
            self.reply(&format!("QC{DUMMY_TID:x}"))?;
        } else if text.starts_with("qCRC") {
            warn!("RSP CRC query not supported");
            self.reply("E01")?;
        } else if text == "qfThreadInfo" {
            self.reply(&format!("m{DUMMY_TID:x}"))?;
        } else if text == "qsThreadInfo" {
            // No more threads: end-of-list marker.
            self.reply("l")?;
        } else if text.starts_with("qL") {
            warn!("RSP qL deprecated: no info returned");
            self.reply("")?;
        } else if let Some(hex_args) = text.strip_prefix("qRcmd,") {
            return self.monitor(hex_args);
        } else if text.starts_with("qSupported") {
            self.reply(&format!("PacketSize={:x}", self.pkt.capacity()))?;
        } else if text.starts_with("qSymbol:") {
            // No symbols we want looked up.
            self.reply("OK")?;
        } else if text.starts_with("qThreadExtraInfo,") {
            let mut info = hex::ascii2hex("Runnable");
            info.push_str("00");
            self.reply(&info)?;
        } else {
            self.reply("")?;
        }
        Ok(Flow::Continue)
    }

    fn v_packet(&mut self, text: &str) -> RspResult<()> {
        if text.starts_with("vAttach") || text.starts_with("vRun") {
            // The program is considered just-stopped.
            return self.report_signal(Signal::Trap);
        }
        if text != "vMustReplyEmpty" {
            debug!(packet = %text, "unsupported v packet");
        }
        self.reply("")
    }
}

/// Parse a leading run of hex digits, returning the value and the tail.
fn parse_hex(s: &str) -> Option<(u64, &str)> {
    let end = s
        .find(|c: char| !c.is_ascii_hexdigit())
        .unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    let val = u64::from_str_radix(&s[..end], 16).ok()?;
    Some((val, &s[end..]))
}

/// Parse `Z<kind>,<addr>,<len>` / `z<kind>,<addr>,<len>`, validating the
/// kind and the instruction length.
fn parse_matchpoint(text: &str) -> Option<(MatchKind, u64, usize)> {
    let (kind, rest) = parse_hex(&text[1..])?;
    let (addr, rest) = parse_hex(rest.strip_prefix(',')?)?;
    let (len, _) = parse_hex(rest.strip_prefix(',')?)?;
    if len > 4 {
        warn!(len, "matchpoint instruction length exceeds maximum of 4");
        return None;
    }
    let kind = u32::try_from(kind).ok().and_then(MatchKind::from_wire);
    if kind.is_none() {
        warn!(packet = %text, "RSP matchpoint type not recognized");
    }
    Some((kind?, addr, len as usize))
}
