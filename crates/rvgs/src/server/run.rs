//! Run control: the continue/step loop.
//!
//! A continue is a sequence of short resume slices so the server can poll
//! the transport for BREAK while the target runs:
//!
//! ```text
//! IDLE -> RUNNING_SLICE -> DONE            (trap/step: reply S05)
//!                       -> INTERRUPTED     (breakpoint: reply S05)
//!                       -> SYSCALL         (send F request, stay stopped)
//!                       -> TIMED_OUT_SLICE (BREAK? -> S02, else run again)
//!                       -> TIMED_OUT_USER  (stop target, reply S18)
//! ```
//!
//! Two timeouts compose: the fixed slice timeout bounds one resume call,
//! the user timeout (`monitor timeout`) bounds the whole run.

use std::time::{Duration, Instant};

use tracing::{error, warn};

use rvgs_target::{ResumeKind, ResumeOutcome};

use super::{Flow, GdbServer, RspResult, RunMode, EXIT_FAILURE};
use crate::signal::Signal;

/// How long one resume slice may run before we look for a BREAK.
const SLICE_TIMEOUT: Duration = Duration::from_millis(100);

impl GdbServer {
    /// Handle a `c`/`s` request (or resume one after a serviced syscall).
    pub(super) fn run(&mut self, mode: RunMode) -> RspResult<Flow> {
        // A BREAK may already be queued from before the request.
        if self.conn.have_break() {
            return self.stop_with(Signal::Int);
        }
        match mode {
            RunMode::Step => self.run_step(),
            RunMode::Continue => self.run_continue(),
        }
    }

    fn run_continue(&mut self) -> RspResult<Flow> {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        loop {
            let outcome = self
                .target
                .resume(ResumeKind::Continue, Some(SLICE_TIMEOUT));
            match outcome {
                ResumeOutcome::Syscall => return self.syscall_request(RunMode::Continue),
                ResumeOutcome::Interrupted => {
                    self.report_signal(Signal::Trap)?;
                    return Ok(Flow::Continue);
                }
                ResumeOutcome::Timeout => {
                    if deadline.is_some_and(|d| Instant::now() > d) {
                        return self.stop_with(Signal::Xcpu);
                    }
                    if self.conn.have_break() {
                        return self.stop_with(Signal::Int);
                    }
                    // Slice expired with nothing to report: run another.
                }
                ResumeOutcome::Failure => {
                    error!("cannot continue target: terminating");
                    return Ok(Flow::Exit(EXIT_FAILURE));
                }
                _ => {
                    self.report_signal(Signal::Trap)?;
                    return Ok(Flow::Continue);
                }
            }
        }
    }

    fn run_step(&mut self) -> RspResult<Flow> {
        match self.target.resume(ResumeKind::Step, None) {
            ResumeOutcome::Syscall => self.syscall_request(RunMode::Step),
            ResumeOutcome::Failure => {
                error!("cannot step target: terminating");
                Ok(Flow::Exit(EXIT_FAILURE))
            }
            _ => {
                // The step has retired; a BREAK that arrived meanwhile
                // outranks the trap report.
                if self.conn.have_break() {
                    return self.stop_with(Signal::Int);
                }
                self.report_signal(Signal::Trap)?;
                Ok(Flow::Continue)
            }
        }
    }

    /// Force the target to halt and report `sig` to the client.
    pub(super) fn stop_with(&mut self, sig: Signal) -> RspResult<Flow> {
        if self.target.resume(ResumeKind::Stop, None) != ResumeOutcome::Success {
            warn!("target did not acknowledge stop request");
        }
        self.report_signal(sig)?;
        Ok(Flow::Continue)
    }
}
