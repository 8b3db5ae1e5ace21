//! CPU core
//!
//! One [`Cpu::step`] performs a fetch/decode/execute cycle through a
//! [`Bus`]. All ALU results live in an unsigned 32-bit lane and are
//! reinterpreted as signed only where the operation demands it (`div`,
//! `mod`, `asr`, `slt` and the signed branch predicates). R0 is
//! hard-wired to zero by a write mask in the register file; the PC is
//! R15 and auto-increments unless an instruction writes it directly.

use thiserror::Error;

use crate::bus::Bus;
use crate::isa::{self, nibble};
use crate::utils::{imm16, interpret_i32_as_unsigned, interpret_u32_as_signed};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SimError {
    #[error("CPU error: illegal instruction: 0x{0:08x}")]
    IllegalInstruction(u32),
    #[error("CPU error: division by zero")]
    DivisionByZero,
    #[error("CPU error: illegal negative shift count: '{0}'")]
    NegativeShiftCount(i32),
    #[error("Memory error: read from invalid address 0x{0:08x}")]
    InvalidRead(u32),
    #[error("Memory error: write to invalid address 0x{0:08x}")]
    InvalidWrite(u32),
    #[error("Memory error: unaligned framebuffer access 0x{0:08x}")]
    UnalignedFramebuffer(u32),
}

/// The 16-register file. Writes to R0 are dropped so it always reads
/// as zero.
#[derive(Debug, Default)]
pub struct Registers {
    regs: [u32; 16],
}

impl Registers {
    pub fn get(&self, n: u8) -> u32 {
        self.regs[usize::from(n)]
    }

    pub fn set(&mut self, n: u8, value: u32) {
        if n != 0 {
            self.regs[usize::from(n)] = value;
        }
    }
}

#[derive(Debug, Default)]
pub struct Cpu {
    pub regs: Registers,
}

/// Floored signed division (quotient rounds toward negative infinity).
/// `i32::MIN / -1` wraps.
fn floor_div(x: i32, y: i32) -> i32 {
    let q = x.wrapping_div(y);
    let r = x.wrapping_rem(y);
    if r != 0 && (r < 0) != (y < 0) {
        q - 1
    } else {
        q
    }
}

/// Floored signed remainder: the result takes the sign of the divisor
fn floor_mod(x: i32, y: i32) -> i32 {
    let r = x.wrapping_rem(y);
    if r != 0 && (r < 0) != (y < 0) {
        r.wrapping_add(y)
    } else {
        r
    }
}

/// Apply a type 1/2 ALU operation. `y` is a register value or the
/// sign-extended immediate reinterpreted as unsigned; both views agree
/// modulo 2^32. Division by zero and negative immediate shift counts
/// are rejected before this is called.
fn alu(op: u8, x: u32, y: u32) -> u32 {
    match op {
        0 => x.wrapping_add(y),
        1 => x.wrapping_sub(y),
        2 => x.wrapping_mul(y),
        3 => interpret_i32_as_unsigned(floor_div(
            interpret_u32_as_signed(x),
            interpret_u32_as_signed(y),
        )),
        4 => interpret_i32_as_unsigned(floor_mod(
            interpret_u32_as_signed(x),
            interpret_u32_as_signed(y),
        )),
        5 => x | y,
        6 => x & y,
        7 => x ^ y,
        // shifting by 32 or more shifts everything out
        8 => {
            if y < 32 {
                x << y
            } else {
                0
            }
        }
        9 => {
            if y < 32 {
                x >> y
            } else {
                0
            }
        }
        10 => {
            let x = interpret_u32_as_signed(x);
            if y < 32 {
                interpret_i32_as_unsigned(x >> y)
            } else if x < 0 {
                u32::MAX
            } else {
                0
            }
        }
        11 => {
            u32::from(interpret_u32_as_signed(x) < interpret_u32_as_signed(y))
        }
        12 => u32::from(x < y),
        _ => unreachable!("opcode was validated during decode"),
    }
}

fn branch_taken(op: u8, x: u32, y: u32) -> bool {
    match op {
        0 => x == y,
        1 => x != y,
        2 => interpret_u32_as_signed(x) < interpret_u32_as_signed(y),
        3 => interpret_u32_as_signed(x) >= interpret_u32_as_signed(y),
        4 => x < y,
        5 => x >= y,
        _ => unreachable!("opcode was validated during decode"),
    }
}

impl Cpu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pc(&self) -> u32 {
        self.regs.get(isa::PC)
    }

    /// Execute a single instruction
    pub fn step<B: Bus>(&mut self, bus: &mut B) -> Result<(), SimError> {
        // fetch
        let ir = bus.read(self.pc(), 4)?;

        // decode
        let ty = nibble(ir, 28);
        let op = nibble(ir, 24);
        let rd = nibble(ir, 20);
        let rs = nibble(ir, 16);
        let imm = imm16(ir);
        if isa::mnemonic(ty, op).is_none() {
            return Err(SimError::IllegalInstruction(ir));
        }

        // execute
        match ty {
            1 => {
                let rs2 = nibble(ir, 12);
                let y = self.regs.get(rs2);
                if (op == 3 || op == 4) && y == 0 {
                    return Err(SimError::DivisionByZero);
                }
                let result = alu(op, self.regs.get(rs), y);
                self.write_and_advance(rd, result);
            }
            2 => {
                if (8..=10).contains(&op) && imm < 0 {
                    return Err(SimError::NegativeShiftCount(imm));
                }
                if (op == 3 || op == 4) && imm == 0 {
                    return Err(SimError::DivisionByZero);
                }
                let result = alu(op, self.regs.get(rs), imm as u32);
                self.write_and_advance(rd, result);
            }
            3 => {
                // note the convention: rd is the first comparand
                let pc = self.pc();
                if branch_taken(op, self.regs.get(rd), self.regs.get(rs)) {
                    self.regs.set(isa::PC, pc.wrapping_add(imm as u32));
                } else {
                    self.regs.set(isa::PC, pc.wrapping_add(4));
                }
            }
            4 => {
                if op == 0 {
                    let addr = self.regs.get(rs).wrapping_add(imm as u32);
                    let value = bus.read(addr, 4)?;
                    self.write_and_advance(rd, value);
                } else {
                    let addr = self.regs.get(rd).wrapping_add(imm as u32);
                    bus.write(addr, self.regs.get(rs))?;
                    self.regs.set(isa::PC, self.pc().wrapping_add(4));
                }
            }
            5 => {
                // the link register is written before the base is read,
                // so `jal pc, pc, +x` behaves as a plain jump
                let pc = self.pc();
                self.regs.set(rd, pc.wrapping_add(4));
                let dest = self.regs.get(rs).wrapping_add(imm as u32);
                self.regs.set(isa::PC, dest);
            }
            _ => unreachable!("type was validated during decode"),
        }
        Ok(())
    }

    /// Write an ALU or load result, then advance the PC unless the
    /// instruction itself wrote it
    fn write_and_advance(&mut self, rd: u8, value: u32) {
        self.regs.set(rd, value);
        if rd != isa::PC {
            self.regs.set(isa::PC, self.pc().wrapping_add(4));
        }
    }

    /// Render all registers as two columns of name/hex/decimal
    pub fn dump_regs(&self) -> String {
        let signed = |v: u32| v as i32;
        let dec_width = |range: std::ops::Range<u8>| {
            range
                .map(|i| signed(self.regs.get(i)).to_string().len())
                .max()
                .expect("range is not empty")
                .max(3)
                + 1
        };
        let width_lo = dec_width(0..8);
        let width_hi = dec_width(8..16);

        let mut out = format!(
            "name      hex {:>width_lo$}       name      hex {:>width_hi$}",
            "dec", "dec"
        );
        for i in 0..8u8 {
            let lo = self.regs.get(i);
            let hi = self.regs.get(i + 8);
            out += &format!(
                "\n{:>4} {lo:08x} {:>width_lo$}       ",
                format!("R{i}"),
                signed(lo)
            );
            if i < 7 {
                out += &format!(
                    "{:>4} {hi:08x} {:>width_hi$}",
                    format!("R{}", i + 8),
                    signed(hi)
                );
            } else {
                out += &format!("  PC {hi:08x}");
            }
        }
        out
    }
}
