//! Whole-stack sessions: a scripted GDB client driving the built-in
//! `sim` core through the real dispatcher, the way a debug session does.

mod common;

use std::sync::{Arc, Mutex};

use common::{replies, script, ScriptTransport};
use rvgs::cores::SimCore;
use rvgs::{GdbServer, KillBehaviour};
use rvgs_rsp::hex::ascii2hex;
use rvgs_rsp::TraceFlags;

fn run_session(input: Vec<u8>) -> Vec<Vec<u8>> {
    let output = Arc::new(Mutex::new(Vec::new()));
    let transport = ScriptTransport::new(input, output.clone());
    let mut server = GdbServer::new(
        Box::new(transport),
        Box::new(SimCore::new(0x1000)),
        Arc::new(TraceFlags::new()),
        KillBehaviour::ResetOnKill,
    );
    let _ = server.serve();
    let wire = output.lock().unwrap().clone();
    replies(&wire)
}

fn rcmd(cmd: &str) -> Vec<u8> {
    format!("qRcmd,{}", ascii2hex(cmd)).into_bytes()
}

#[test]
fn load_break_continue_step() {
    // addi x1, x0, 5 ; addi x2, x0, 7 ; add x3, x1, x2 ; j .
    // (little-endian bytes of 0x00500093 0x00700113 0x002081b3 0x0000006f)
    let session = script(&[
        (b"M0,10:9300500013017000b38120006f000000", 1),
        (b"Z0,8,4", 1),
        (b"c", 1),
        (b"p20", 1),
        (b"m8,4", 1),
        (b"z0,8,4", 1),
        (b"m8,4", 1),
        (b"s", 1),
        (b"p3", 1),
        (b"p1", 1),
    ]);
    let replies = run_session(session);
    let expect: Vec<&[u8]> = vec![
        b"OK",
        b"OK",
        // Ran the first two instructions and stopped at the planted
        // EBREAK at 0x8.
        b"S05",
        b"08000000",
        // The EBREAK pattern sits in memory while the breakpoint is set,
        // the original add comes back once it is removed.
        b"73001000",
        b"OK",
        b"b3812000",
        // Stepping the restored add: x3 = 5 + 7.
        b"S05",
        b"0c000000",
        b"05000000",
    ];
    assert_eq!(replies, expect);
}

#[test]
fn syscall_forwarding_round_trip() {
    // addi a0, x0, 1 ; addi a7, x0, 64 ; ecall ; ebreak
    let session = script(&[
        (b"M0,10:13051000930800047300000073001000", 1),
        (b"c", 1),
        (b"F5", 1),
        (b"p10", 1),
    ]);
    let replies = run_session(session);
    let expect: Vec<&[u8]> = vec![
        b"OK",
        // a7=64 (write), a0=1, a1/a2 still zero.
        b"Fwrite,1,0,0",
        // Resumed after the reply and stopped at the ebreak; a0 now
        // carries the host's result.
        b"S05",
        b"05000000",
    ];
    assert_eq!(replies, expect);
}

#[test]
fn monitor_reset_cold_clears_state() {
    let session = script(&[
        (b"P2=00100000", 1),
        (b"p2", 1),
        (&rcmd("reset cold"), 1),
        (b"p2", 1),
        (&rcmd("instrcount"), 2),
    ]);
    let replies = run_session(session);
    let expect: Vec<Vec<u8>> = vec![
        b"OK".to_vec(),
        b"00100000".to_vec(),
        b"OK".to_vec(),
        b"00000000".to_vec(),
        format!("O{}", ascii2hex("0\n")).into_bytes(),
        b"OK".to_vec(),
    ];
    assert_eq!(replies, expect);
}

#[test]
fn instrcount_tracks_steps() {
    // addi x1, x0, 5 ; ebreak
    let session = script(&[
        (b"M0,8:9300500073001000", 1),
        (b"s", 1),
        (&rcmd("instrcount"), 2),
    ]);
    let replies = run_session(session);
    let expect: Vec<Vec<u8>> = vec![
        b"OK".to_vec(),
        b"S05".to_vec(),
        format!("O{}", ascii2hex("1\n")).into_bytes(),
        b"OK".to_vec(),
    ];
    assert_eq!(replies, expect);
}

#[test]
fn target_monitor_command_passthrough() {
    let session = script(&[(&rcmd("regs"), 2)]);
    let replies = run_session(session);
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0][0], b'O');
    assert_eq!(replies[1], b"OK");
}
