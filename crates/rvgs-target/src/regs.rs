//! GDB's RISC-V register numbering.
//!
//! Registers 0..31 are the general-purpose file, 32 is the PC; CSRs live
//! above that but are not exposed by the built-in cores.

/// Registers visible to the `g`/`G` packets: x0..x31 plus the PC.
pub const NUM_REGS: usize = 33;

/// Width of every exposed register, in bytes (RV32).
pub const REG_BYTES: usize = 4;

pub const REG_ZERO: usize = 0;
pub const REG_SP: usize = 2;
pub const REG_A0: usize = 10;
pub const REG_A1: usize = 11;
pub const REG_A2: usize = 12;
pub const REG_A3: usize = 13;
pub const REG_A7: usize = 17;
pub const REG_PC: usize = 32;

/// The RISC-V EBREAK instruction, planted over software breakpoints.
/// Stored little-endian in target memory.
pub const EBREAK: u32 = 0x0010_0073;
