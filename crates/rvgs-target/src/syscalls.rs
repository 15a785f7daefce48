//! Bare-metal syscall numbers forwarded over GDB File-I/O.
//!
//! These are the newlib/libgloss numbers a bare-metal RISC-V program
//! places in `a7` before its `ecall`; each maps to one `F` request kind.

pub const SYS_CLOSE: u64 = 57;
pub const SYS_LSEEK: u64 = 62;
pub const SYS_READ: u64 = 63;
pub const SYS_WRITE: u64 = 64;
pub const SYS_FSTAT: u64 = 80;
pub const SYS_GETTIMEOFDAY: u64 = 169;
pub const SYS_OPEN: u64 = 1024;
pub const SYS_UNLINK: u64 = 1026;
pub const SYS_STAT: u64 = 1038;
