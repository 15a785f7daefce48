//! Shared harness for session tests: a scripted transport and wire
//! framing helpers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use rvgs_rsp::transport::Transport;
use rvgs_rsp::{Result as RspResult, RspError};

/// Transport fed from a canned byte script, capturing everything written.
pub struct ScriptTransport {
    pub input: VecDeque<u8>,
    /// Bytes that "arrive later": only visible after `delay_polls`
    /// non-blocking reads have come up empty.
    pub delayed: VecDeque<u8>,
    pub delay_polls: usize,
    pub output: Arc<Mutex<Vec<u8>>>,
    pub connected: bool,
    pub finished: bool,
}

impl ScriptTransport {
    pub fn new(input: Vec<u8>, output: Arc<Mutex<Vec<u8>>>) -> Self {
        Self {
            input: input.into(),
            delayed: VecDeque::new(),
            delay_polls: 0,
            output,
            connected: false,
            finished: false,
        }
    }
}

impl Transport for ScriptTransport {
    fn connect(&mut self) -> RspResult<()> {
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

    fn put_byte(&mut self, b: u8) -> RspResult<()> {
        self.output.lock().unwrap().push(b);
        Ok(())
    }

    fn get_byte(&mut self, blocking: bool) -> RspResult<Option<u8>> {
        if let Some(b) = self.input.pop_front() {
            return Ok(Some(b));
        }
        if !self.delayed.is_empty() {
            if !blocking && self.delay_polls > 0 {
                self.delay_polls -= 1;
                return Ok(None);
            }
            return Ok(self.delayed.pop_front());
        }
        if blocking {
            Err(RspError::Disconnected)
        } else {
            Ok(None)
        }
    }

    fn flush(&mut self) -> RspResult<()> {
        Ok(())
    }
}

/// Frame a request the way the GDB client would (payload already escaped).
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let csum = payload.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    let mut out = vec![b'$'];
    out.extend_from_slice(payload);
    out.extend_from_slice(format!("#{csum:02x}").as_bytes());
    out
}

/// Build a client byte script: each request followed by the `+` acks for
/// the replies it will provoke.
pub fn script(requests: &[(&[u8], usize)]) -> Vec<u8> {
    let mut out = Vec::new();
    for &(req, replies) in requests {
        out.extend_from_slice(&frame(req));
        out.extend(std::iter::repeat(b'+').take(replies));
    }
    out
}

/// Extract the reply payloads (unescaped) from the server's output bytes.
pub fn replies(wire: &[u8]) -> Vec<Vec<u8>> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < wire.len() {
        if wire[i] != b'$' {
            i += 1;
            continue;
        }
        i += 1;
        let mut payload = Vec::new();
        while i < wire.len() && wire[i] != b'#' {
            if wire[i] == b'}' {
                i += 1;
                payload.push(wire[i] ^ 0x20);
            } else {
                payload.push(wire[i]);
            }
            i += 1;
        }
        i += 3; // '#' and two checksum chars
        out.push(payload);
    }
    out
}
