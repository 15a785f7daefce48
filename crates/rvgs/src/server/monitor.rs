//! The `monitor` (qRcmd) sub-protocol.
//!
//! The command arrives hex-encoded after `qRcmd,`. Replies that produce
//! console output send zero or more `O`-prefixed hex packets followed by
//! a single final status packet.

use std::io::Write;
use std::time::Duration;

use tracing::{debug, error, warn};

use rvgs_rsp::hex;
use rvgs_rsp::TraceFlags;
use rvgs_target::ResetKind;

use super::{Flow, GdbServer, RspResult, EXIT_FAILURE, EXIT_SUCCESS};

const HELP: &[&str] = &[
    "The following generic monitor commands are supported:\n",
    "  help\n",
    "    Produce this message\n",
    "  reset [cold | warm]\n",
    "    Reset the simulator (default warm)\n",
    "  exit\n",
    "    Exit the GDB server\n",
    "  timeout <interval>\n",
    "    Maximum time in seconds taken by continue packet\n",
    "  cyclecount\n",
    "    Report cycles executed since reset\n",
    "  instrcount\n",
    "    Report instructions executed since reset\n",
    "  timestamp\n",
    "    Report the current simulation time\n",
    "  echo <message>\n",
    "    Echo <message> on stdout of the gdbserver\n",
    "  set debug <flag> <0|1|on|off|true|false>\n",
    "    Turn a debug flag on or off\n",
    "  show debug [<flag>]\n",
    "    Show debug flag settings\n",
];

impl GdbServer {
    pub(super) fn monitor(&mut self, hex_args: &str) -> RspResult<Flow> {
        let cmd = hex::hex2ascii(hex_args.as_bytes());
        if self.flags.rsp() {
            debug!(cmd = %cmd, "qRcmd");
        }

        if cmd == "help" {
            return self.monitor_help();
        }
        if cmd == "reset" || cmd == "reset warm" {
            return self.monitor_reset(ResetKind::Warm);
        }
        if cmd == "reset cold" {
            return self.monitor_reset(ResetKind::Cold);
        }
        if cmd == "exit" {
            return Ok(Flow::Exit(EXIT_SUCCESS));
        }
        if let Some(rest) = cmd.strip_prefix("timeout ") {
            if let Ok(secs) = rest.trim().parse::<u64>() {
                // Zero clears the bound.
                self.timeout = (secs != 0).then(|| Duration::from_secs(secs));
                self.reply("OK")?;
                return Ok(Flow::Continue);
            }
        }
        if cmd == "timestamp" {
            let line = format!("{}\n", self.target.time_stamp());
            return self.monitor_report(&line);
        }
        if cmd == "cyclecount" {
            let line = format!("{}\n", self.target.cycle_count());
            return self.monitor_report(&line);
        }
        if cmd == "instrcount" {
            let line = format!("{}\n", self.target.instr_count());
            return self.monitor_report(&line);
        }
        if let Some(rest) = cmd.strip_prefix("echo") {
            println!("{}", rest.trim_start());
            let _ = std::io::stdout().flush();
            self.reply("OK")?;
            return Ok(Flow::Continue);
        }
        if let Some(rest) = cmd.strip_prefix("set ") {
            return self.monitor_set(rest.trim_start());
        }
        if let Some(rest) = cmd.strip_prefix("show ") {
            return self.monitor_show(rest.trim_start());
        }

        self.monitor_target(&cmd, "E01")
    }

    fn monitor_help(&mut self) -> RspResult<Flow> {
        for line in HELP {
            self.reply_console(line)?;
        }

        let mut out = String::new();
        if self.target.command("help", &mut out) {
            self.reply_console("The following target specific monitor commands are supported:\n")?;
            for line in out.lines() {
                self.reply_console(&format!("{line}\n"))?;
            }
        } else {
            self.reply_console("There are no target specific monitor commands")?;
        }

        self.reply("OK")?;
        Ok(Flow::Continue)
    }

    fn monitor_reset(&mut self, kind: ResetKind) -> RspResult<Flow> {
        if !self.target.reset(kind) {
            error!(?kind, "failed to reset target: terminating");
            return Ok(Flow::Exit(EXIT_FAILURE));
        }
        self.reply("OK")?;
        Ok(Flow::Continue)
    }

    /// Emit one console line followed by the final OK.
    fn monitor_report(&mut self, line: &str) -> RspResult<Flow> {
        self.reply_console(line)?;
        self.reply("OK")?;
        Ok(Flow::Continue)
    }

    /// `monitor set debug <flag> <value>`; anything else is offered to
    /// the target.
    fn monitor_set(&mut self, args: &str) -> RspResult<Flow> {
        let tokens = hex::split(args, " ");
        if tokens.len() == 3 && tokens[0] == "debug" {
            if !self.flags.is_flag(tokens[1]) {
                self.reply("E01")?;
                return Ok(Flow::Continue);
            }
            let Some(value) = parse_flag_value(tokens[2]) else {
                self.reply("E02")?;
                return Ok(Flow::Continue);
            };
            self.flags.set(tokens[1], value);
            self.reply("OK")?;
            return Ok(Flow::Continue);
        }
        self.monitor_target(&format!("set {args}"), "E04")
    }

    /// `monitor show debug [<flag>]`; anything else is offered to the
    /// target.
    fn monitor_show(&mut self, args: &str) -> RspResult<Flow> {
        let tokens = hex::split(args, " ");
        if tokens.len() == 1 && tokens[0] == "debug" {
            let mut out = String::new();
            for name in TraceFlags::names() {
                let state = if self.flags.get(name).unwrap_or(false) {
                    "ON"
                } else {
                    "OFF"
                };
                out.push_str(&format!("{name}: {state}\n"));
            }
            return self.monitor_report(&out);
        }
        if tokens.len() == 2 && tokens[0] == "debug" {
            let Some(state) = self.flags.get(tokens[1]) else {
                self.reply("E01")?;
                return Ok(Flow::Continue);
            };
            let line = format!("{}: {}\n", tokens[1], if state { "ON" } else { "OFF" });
            return self.monitor_report(&line);
        }
        self.monitor_target(&format!("show {args}"), "E04")
    }

    /// Pass a command through to the target, replying `failure` if it
    /// does not recognize it.
    fn monitor_target(&mut self, cmd: &str, failure: &str) -> RspResult<Flow> {
        let mut out = String::new();
        if self.target.command(cmd, &mut out) {
            self.reply_console(&out)?;
            self.reply("OK")?;
        } else {
            warn!(cmd = %cmd, "monitor command not recognized");
            self.reply(failure)?;
        }
        Ok(Flow::Continue)
    }
}

fn parse_flag_value(s: &str) -> Option<bool> {
    if ["0", "off", "false"].iter().any(|v| s.eq_ignore_ascii_case(v)) {
        return Some(false);
    }
    if ["1", "on", "true"].iter().any(|v| s.eq_ignore_ascii_case(v)) {
        return Some(true);
    }
    None
}
