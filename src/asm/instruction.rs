//! Typed builders for the five instruction layouts
//!
//! An [`Instruction`] holds decoded fields rather than a raw word, so a
//! symbolic target can stay unresolved until every label address is
//! known. [`Instruction::resolve`] fills in the PC-relative immediate
//! during the second pass; [`Instruction::encode`] then produces the
//! final 32-bit word.

use std::collections::BTreeMap;

use crate::isa;
use crate::parse::{
    self, jump_distance, label, memory_operand, register, MemOperand,
    ParseError,
};

use super::AsmError;

/// A branch/jump destination operand: an explicit `±offset` or a label
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Offset(i32),
    Label(String),
}

pub fn branch_target(text: &str) -> Result<Target, ParseError> {
    if text.starts_with(['+', '-']) {
        Ok(Target::Offset(jump_distance(text)?))
    } else {
        Ok(Target::Label(label(text)?))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Source line that produced this word; 0 for the trailing words of
    /// a pseudo-instruction expansion (the listing shows no source for
    /// them)
    pub line: usize,
    /// Address this word was emitted at, the base for PC-relative
    /// resolution
    pub addr: u32,
    ty: u8,
    op: u8,
    rd: u8,
    rs1: u8,
    rs2: u8,
    imm: i32,
    target: Option<String>,
    /// Extra displacement for `[label±k]` memory operands, added after
    /// the label distance check
    extra: i32,
}

impl Instruction {
    fn new(ty: u8, op: u8, rd: u8, rs1: u8) -> Self {
        Self {
            line: 0,
            addr: 0,
            ty,
            op,
            rd,
            rs1,
            rs2: 0,
            imm: 0,
            target: None,
            extra: 0,
        }
    }

    /// Build a type 1 instruction from register numbers
    pub fn op1(verb: &str, rd: u8, rs1: u8, rs2: u8) -> Self {
        let op = isa::opcode(&isa::TYPE1, verb).expect("verb is in type 1");
        let mut instr = Self::new(1, op, rd, rs1);
        instr.rs2 = rs2;
        instr
    }

    /// Build a type 2 instruction from register numbers and an immediate
    pub fn op2(verb: &str, rd: u8, rs1: u8, imm: i32) -> Self {
        let op = isa::opcode(&isa::TYPE2, verb).expect("verb is in type 2");
        let mut instr = Self::new(2, op, rd, rs1);
        instr.imm = imm;
        instr
    }

    /// Build a type 3 instruction from register numbers and a target
    pub fn op3(verb: &str, rd: u8, rs1: u8, target: Target) -> Self {
        let op = isa::opcode(&isa::TYPE3, verb).expect("verb is in type 3");
        let mut instr = Self::new(3, op, rd, rs1);
        instr.set_target(target);
        instr
    }

    pub fn op4_load(rd: u8, base: u8, imm: i32) -> Self {
        let mut instr = Self::new(4, 0, rd, base);
        instr.imm = imm;
        instr
    }

    pub fn op4_store(base: u8, src: u8, imm: i32) -> Self {
        let mut instr = Self::new(4, 1, base, src);
        instr.imm = imm;
        instr
    }

    pub fn jal_to(rd: u8, rs1: u8, target: Target) -> Self {
        let mut instr = Self::new(5, 0, rd, rs1);
        instr.set_target(target);
        instr
    }

    fn set_target(&mut self, target: Target) {
        match target {
            Target::Offset(imm) => self.imm = imm,
            Target::Label(name) => self.target = Some(name),
        }
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line = line;
        self
    }

    /// Parse a reg-reg ALU instruction, e.g. `add r1, r2, r3`
    pub fn reg_reg(verb: &str, args: &[String]) -> Result<Self, AsmError> {
        let args = super::check_args(verb, args, 3)?;
        Ok(Self::op1(
            verb,
            register(&args[0])?,
            register(&args[1])?,
            register(&args[2])?,
        ))
    }

    /// Parse a reg-imm ALU instruction, e.g. `addi r1, r2, -7`.
    ///
    /// Hex and binary immediates are unsigned 16-bit values; decimal
    /// immediates are signed. A hex immediate longer than 4 digits is
    /// rejected even when its value would fit.
    pub fn reg_imm(verb: &str, args: &[String]) -> Result<Self, AsmError> {
        let args = super::check_args(verb, args, 3)?;
        let rd = register(&args[0])?;
        let rs1 = register(&args[1])?;
        let text = &args[2];
        let value = parse::integer_literal(text)?;
        if text.starts_with("0x") || text.starts_with("0b") {
            if value >= 1 << 16 {
                return Err(AsmError::Imm16Range(text.clone()));
            }
            if text.starts_with("0x") && text.len() > 6 {
                return Err(AsmError::Imm16TooLong(text.clone()));
            }
        } else if !(-(1 << 15)..1 << 15).contains(&value) {
            return Err(AsmError::Imm16Range(text.clone()));
        }
        if ["lsli", "lsri", "asri"].contains(&verb) && value < 0 {
            return Err(AsmError::NegativeShiftCount(text.clone()));
        }
        Ok(Self::op2(verb, rd, rs1, value as i32))
    }

    /// Parse a conditional branch, e.g. `beq r1, r2, loop`
    pub fn branch(verb: &str, args: &[String]) -> Result<Self, AsmError> {
        let args = super::check_args(verb, args, 3)?;
        Ok(Self::op3(
            verb,
            register(&args[0])?,
            register(&args[1])?,
            branch_target(&args[2])?,
        ))
    }

    /// Parse `bra target` into `addi pc, pc, offset`
    pub fn bra(args: &[String]) -> Result<Self, AsmError> {
        let args = super::check_args("bra", args, 1)?;
        let mut instr = Self::op2("addi", isa::PC, isa::PC, 0);
        instr.set_target(branch_target(&args[0])?);
        Ok(instr)
    }

    /// Parse `load rd, [operand]`
    pub fn load(args: &[String]) -> Result<Self, AsmError> {
        let args = super::check_args("load", args, 2)?;
        if args[0].contains('[') && !args[1].contains('[') {
            return Err(AsmError::MemopMustBeSecond);
        }
        let rd = register(&args[0])?;
        Ok(match memory_operand(&args[1])? {
            // symbolic labels are always referenced through PC
            MemOperand::Label { name, offset } => {
                let mut instr = Self::op4_load(rd, isa::PC, 0);
                instr.target = Some(name);
                instr.extra = offset;
                instr
            }
            MemOperand::Reg { reg, offset } => Self::op4_load(rd, reg, offset),
        })
    }

    /// Parse `store [operand], rs`
    pub fn store(args: &[String]) -> Result<Self, AsmError> {
        let args = super::check_args("store", args, 2)?;
        if args[1].contains('[') && !args[0].contains('[') {
            return Err(AsmError::MemopMustBeFirst);
        }
        let src = register(&args[1])?;
        Ok(match memory_operand(&args[0])? {
            MemOperand::Label { name, offset } => {
                let mut instr = Self::op4_store(isa::PC, src, 0);
                instr.target = Some(name);
                instr.extra = offset;
                instr
            }
            MemOperand::Reg { reg, offset } => {
                Self::op4_store(reg, src, offset)
            }
        })
    }

    /// Parse `jal rd, rs` (offset +0) or `jal rd, rs, target`. A
    /// symbolic target requires the base register to be the PC.
    pub fn jal(args: &[String]) -> Result<Self, AsmError> {
        let dest = match args.len() {
            2 => "+0",
            3 => args[2].as_str(),
            n if n < 2 => {
                return Err(AsmError::NotEnoughOperands("jal".to_string()))
            }
            _ => return Err(AsmError::TooManyOperands("jal".to_string())),
        };
        let rd = register(&args[0])?;
        let rs1 = register(&args[1])?;
        if dest.starts_with(['+', '-']) {
            Ok(Self::jal_to(rd, rs1, Target::Offset(jump_distance(dest)?)))
        } else {
            if rs1 != isa::PC {
                return Err(AsmError::BadJalBase(args[1].clone()));
            }
            Ok(Self::jal_to(rd, rs1, Target::Label(label(dest)?)))
        }
    }

    /// Parse `leti rd, somelabel` into `addi rd, pc, offset`
    pub fn leti_label(args: &[String]) -> Result<Self, AsmError> {
        let args = super::check_args("leti", args, 2)?;
        let mut instr = Self::op2("addi", register(&args[0])?, isa::PC, 0);
        instr.target = Some(label(&args[1])?);
        Ok(instr)
    }

    /// Fill in the PC-relative immediate for a symbolic target. The
    /// label distance must fit in signed 16 bits; the extra `[label±k]`
    /// displacement is added afterwards without a second range check.
    pub fn resolve(
        &mut self,
        symbols: &BTreeMap<String, u32>,
    ) -> Result<(), AsmError> {
        let Some(name) = self.target.take() else {
            return Ok(());
        };
        let target_addr = *symbols
            .get(&name)
            .ok_or_else(|| AsmError::UnresolvedSymbol(name.clone()))?;
        let offset = i64::from(target_addr) - i64::from(self.addr);
        if !(-(1 << 15)..1 << 15).contains(&offset) {
            return Err(AsmError::LabelDistance {
                from: self.addr,
                label: name,
                to: target_addr,
            });
        }
        self.imm = offset as i32 + self.extra;
        Ok(())
    }

    pub fn is_resolved(&self) -> bool {
        self.target.is_none()
    }

    /// Encode into the final 32-bit word. All symbolic targets must be
    /// resolved first.
    pub fn encode(&self) -> u32 {
        debug_assert!(self.is_resolved(), "encode called before resolve");
        u32::from(self.ty) << 28
            | u32::from(self.op) << 24
            | u32::from(self.rd) << 20
            | u32::from(self.rs1) << 16
            | u32::from(self.rs2) << 12
            | (self.imm as u32 & 0xffff)
    }
}
