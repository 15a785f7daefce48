//! File-I/O syscall forwarding.
//!
//! When a resume reports `Syscall`, the target's program has executed a
//! bare-metal system call it wants the host to service. The argument
//! registers are read out and turned into an RSP `F` request; execution
//! resumes when the client's `F` reply comes back with the result.

use tracing::warn;

use rvgs_rsp::SyscallReply;
use rvgs_target::regs::{REG_A0, REG_A1, REG_A2, REG_A7};
use rvgs_target::syscalls::{
    SYS_CLOSE, SYS_FSTAT, SYS_GETTIMEOFDAY, SYS_LSEEK, SYS_OPEN, SYS_READ, SYS_STAT, SYS_UNLINK,
    SYS_WRITE,
};

use super::{Flow, GdbServer, RspResult, RunMode};
use crate::signal::Signal;

impl GdbServer {
    /// Format and send the `F` request for the syscall the target is
    /// waiting on. `mode` is remembered so the eventual reply resumes
    /// execution the same way it was started.
    pub(super) fn syscall_request(&mut self, mode: RunMode) -> RspResult<Flow> {
        let a0 = self.target.read_register(REG_A0).0;
        let a1 = self.target.read_register(REG_A1).0;
        let a2 = self.target.read_register(REG_A2).0;
        let a7 = self.target.read_register(REG_A7).0;

        let req = match a7 {
            SYS_CLOSE => format!("Fclose,{a0:x}"),
            SYS_LSEEK => format!("Flseek,{a0:x},{a1:x},{a2:x}"),
            SYS_READ => format!("Fread,{a0:x},{a1:x},{a2:x}"),
            SYS_WRITE => format!("Fwrite,{a0:x},{a1:x},{a2:x}"),
            SYS_FSTAT => format!("Ffstat,{a0:x},{a1:x}"),
            SYS_GETTIMEOFDAY => format!("Fgettimeofday,{a0:x},{a1:x}"),
            SYS_OPEN => {
                let len = self.string_length(a0);
                format!("Fopen,{a0:x}/{len:x},{a1:x},{a2:x}")
            }
            SYS_UNLINK => {
                let len = self.string_length(a0);
                format!("Funlink,{a0:x}/{len:x}")
            }
            SYS_STAT => {
                let len = self.string_length(a0);
                format!("Fstat,{a0:x}/{len:x},{a1:x}")
            }
            _ => {
                warn!(nr = a7, "unsupported syscall from target");
                self.report_signal(Signal::Trap)?;
                return Ok(Flow::Continue);
            }
        };

        self.pending_syscall = Some(mode);
        self.reply(&req)?;
        Ok(Flow::Continue)
    }

    /// Length of the NUL-terminated string at `addr` in target memory,
    /// including the terminator.
    fn string_length(&mut self, addr: u64) -> u64 {
        let mut count = 0u64;
        let mut byte = [0u8; 1];
        while self.target.read_mem(addr + count, &mut byte) == 1 {
            count += 1;
            if byte[0] == 0 {
                break;
            }
        }
        count
    }

    /// Handle the client's `F` reply: put the result in `a0` and resume
    /// with the kind that raised the syscall, or stop on ctrl-C.
    pub(super) fn syscall_reply(&mut self, text: &str) -> RspResult<Flow> {
        let Some(mode) = self.pending_syscall.take() else {
            warn!("F reply received with no syscall outstanding: ignored");
            return Ok(Flow::Continue);
        };

        match SyscallReply::parse(text) {
            Some(reply) => {
                if self.target.write_register(REG_A0, reply.retcode as u64) == 0 {
                    warn!("failed to write syscall result register");
                }
                if reply.ctrl_c {
                    return self.stop_with(Signal::Int);
                }
            }
            // The result register is left untouched and execution
            // resumes with the pending kind.
            None => warn!(reply = %text, "malformed F reply"),
        }

        self.run(mode)
    }
}
