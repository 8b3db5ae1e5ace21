//! Two-pass assembler
//!
//! The first pass walks the source line by line: labels are recorded at
//! the cursor, directives move the cursor, and instructions are encoded
//! immediately except for their label-dependent immediates. The second
//! pass ([`Executable::resolve`]) turns every symbolic target into a
//! 16-bit PC-relative offset.

use thiserror::Error;

use crate::isa;
use crate::parse::{self, label, register, ParseError};

pub mod executable;
pub mod instruction;

pub use executable::{Executable, Item};
pub use instruction::{branch_target, Instruction, Target};

#[derive(Debug, Error, PartialEq)]
pub enum AsmError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("Operand number {index} of '{verb}' is empty")]
    EmptyOperand { verb: String, index: usize },
    #[error("Not enough operands for '{0}'")]
    NotEnoughOperands(String),
    #[error("Too many operands for '{0}'")]
    TooManyOperands(String),
    #[error("Integer constant does not fit in 16-bits: '{0}'")]
    Imm16Range(String),
    #[error("Integer constant is too long: '{0}'")]
    Imm16TooLong(String),
    #[error("Shift count cannot be negative: '{0}'")]
    NegativeShiftCount(String),
    #[error("Memory operand must be the second argument")]
    MemopMustBeSecond,
    #[error("Memory operand must be the first argument")]
    MemopMustBeFirst,
    #[error("Invalid base register '{0}'. You should use r15.")]
    BadJalBase(String),
    #[error("Label '{0}' is already defined")]
    DuplicateLabel(String),
    #[error("Cannot resolve symbol: '{0}'")]
    UnresolvedSymbol(String),
    #[error(
        "Distance from 0x{from:x} to '{label}' at 0x{to:x} \
         does not fit on 16-bits"
    )]
    LabelDistance { from: u32, label: String, to: u32 },
    #[error("Integer constant larger than 32-bits: '{0}'")]
    Imm32Range(String),
    #[error("Value does not fit on 32 bits: '{0}'")]
    WordRange(String),
    #[error("Missing literal value in .word directive")]
    MissingWordValue,
    #[error("Incorrect size in .space directive: {0}")]
    SpaceSize(i64),
    #[error("Incorrect argument in .align directive: {0}")]
    AlignSize(i64),
    #[error("duplicate address 0x{0:x} in program")]
    DuplicateAddress(u32),
    #[error("unsupported syntax")]
    UnsupportedSyntax,
}

/// An assembly error paired with the source line it refers to
#[derive(Debug, PartialEq)]
pub struct Diagnostic {
    pub line: usize,
    pub error: AsmError,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.error)
    }
}

/// Assemble a complete source file
pub fn assemble(source: &str) -> Result<Executable, Diagnostic> {
    let mut exe = Executable::new();
    for (index, raw) in source.lines().enumerate() {
        let line = index + 1;
        process_line(&mut exe, raw, line)
            .map_err(|error| Diagnostic { line, error })?;
    }
    exe.resolve()?;
    Ok(exe)
}

fn process_line(
    exe: &mut Executable,
    raw: &str,
    line: usize,
) -> Result<(), AsmError> {
    // ignore comments, fix whitespace and case
    let text = raw.split(';').next().unwrap_or("");
    let text = text.trim().to_lowercase();

    let mut rest = text.as_str();
    if let Some(pos) = rest.find(':') {
        exe.add_label(label(rest[..pos].trim())?)?;
        rest = &rest[pos + 1..];
    }
    let text = rest.trim();
    if text.is_empty() {
        return Ok(());
    }

    let (verb, rest) = split_verb(text);
    match verb {
        ".word" => return word_directive(exe, rest),
        ".space" => return space_directive(exe, rest),
        ".align" => return align_directive(exe, rest),
        _ => {}
    }

    let args = split_operands(verb, rest)?;
    let add = |exe: &mut Executable, instr: Instruction| {
        exe.add(Item::Instr(instr.with_line(line)))
    };
    let add_pseudo = |exe: &mut Executable, instr: Instruction| {
        exe.add(Item::Instr(instr.with_line(0)))
    };

    if isa::TYPE1.contains(&verb) {
        add(exe, Instruction::reg_reg(verb, &args)?)
    } else if isa::TYPE2.contains(&verb) {
        add(exe, Instruction::reg_imm(verb, &args)?)
    } else if isa::TYPE3.contains(&verb) {
        add(exe, Instruction::branch(verb, &args)?)
    } else if verb == "load" {
        add(exe, Instruction::load(&args)?)
    } else if verb == "store" {
        add(exe, Instruction::store(&args)?)
    } else if verb == "jal" {
        add(exe, Instruction::jal(&args)?)
    } else if verb == "leti" {
        return leti(exe, &args, line);
    } else if verb == "push" {
        let args = check_args(verb, &args, 1)?;
        let reg = register(&args[0])?;
        add(exe, Instruction::op2("subi", isa::SP, isa::SP, 4))?;
        add_pseudo(exe, Instruction::op4_store(isa::SP, reg, 0))
    } else if verb == "pop" {
        let args = check_args(verb, &args, 1)?;
        let reg = register(&args[0])?;
        add(exe, Instruction::op4_load(reg, isa::SP, 0))?;
        add_pseudo(exe, Instruction::op2("addi", isa::SP, isa::SP, 4))
    } else if verb == "inc" {
        let args = check_args(verb, &args, 1)?;
        let reg = register(&args[0])?;
        add(exe, Instruction::op2("addi", reg, reg, 1))
    } else if verb == "dec" {
        let args = check_args(verb, &args, 1)?;
        let reg = register(&args[0])?;
        add(exe, Instruction::op2("subi", reg, reg, 1))
    } else if verb == "mov" {
        let (rd, rs) = two_registers(verb, &args)?;
        add(exe, Instruction::op2("addi", rd, rs, 0))
    } else if verb == "not" {
        let (rd, rs) = two_registers(verb, &args)?;
        add(exe, Instruction::op2("xori", rd, rs, -1))
    } else if verb == "neg" {
        let (rd, rs) = two_registers(verb, &args)?;
        add(exe, Instruction::op1("sub", rd, isa::ZERO, rs))
    } else if verb == "seqz" {
        let (rd, rs) = two_registers(verb, &args)?;
        add(exe, Instruction::op2("sltiu", rd, rs, 0))
    } else if verb == "snez" || verb == "sgtz" {
        let (rd, rs) = two_registers(verb, &args)?;
        add(exe, Instruction::op1("slt", rd, isa::ZERO, rs))
    } else if verb == "sltz" {
        let (rd, rs) = two_registers(verb, &args)?;
        add(exe, Instruction::op1("slt", rd, rs, isa::ZERO))
    } else if verb == "nop" {
        check_args(verb, &args, 0)?;
        add(exe, Instruction::op2("addi", 0, 0, 0))
    } else if verb == "bra" {
        add(exe, Instruction::bra(&args)?)
    } else if isa::PSEUDO_JUMPS.contains(&verb) {
        add(exe, pseudo_jump(verb, &args)?)
    } else if verb == "jmp" {
        let args = check_args(verb, &args, 1)?;
        let target = branch_target(&args[0])?;
        add(exe, Instruction::jal_to(isa::ZERO, isa::PC, target))
    } else if verb == "call" {
        let args = check_args(verb, &args, 1)?;
        let target = branch_target(&args[0])?;
        add(exe, Instruction::jal_to(isa::LR, isa::PC, target))
    } else if verb == "ret" {
        check_args(verb, &args, 0)?;
        add(exe, Instruction::jal_to(isa::ZERO, isa::LR, Target::Offset(0)))
    } else {
        return Err(AsmError::UnsupportedSyntax);
    }
}

fn split_verb(line: &str) -> (&str, &str) {
    match line.find(' ') {
        Some(pos) => (&line[..pos], line[pos + 1..].trim()),
        None => (line, ""),
    }
}

fn split_operands(verb: &str, rest: &str) -> Result<Vec<String>, AsmError> {
    if rest.is_empty() {
        return Ok(Vec::new());
    }
    let args: Vec<String> =
        rest.split(',').map(|w| w.trim().to_string()).collect();
    for (index, arg) in args.iter().enumerate() {
        if arg.is_empty() {
            return Err(AsmError::EmptyOperand {
                verb: verb.to_string(),
                index: index + 1,
            });
        }
    }
    Ok(args)
}

pub(crate) fn check_args<'a>(
    verb: &str,
    args: &'a [String],
    expected: usize,
) -> Result<&'a [String], AsmError> {
    if args.len() < expected {
        Err(AsmError::NotEnoughOperands(verb.to_string()))
    } else if args.len() > expected {
        Err(AsmError::TooManyOperands(verb.to_string()))
    } else {
        Ok(args)
    }
}

fn two_registers(verb: &str, args: &[String]) -> Result<(u8, u8), AsmError> {
    let args = check_args(verb, args, 2)?;
    Ok((register(&args[0])?, register(&args[1])?))
}

/// Conditional-branch pseudos rewrite into a type 3 instruction, either
/// by naming r0 explicitly or by swapping the comparands
fn pseudo_jump(verb: &str, args: &[String]) -> Result<Instruction, AsmError> {
    if verb.ends_with('z') {
        let args = check_args(verb, args, 2)?;
        let reg = register(&args[0])?;
        let dest = branch_target(&args[1])?;
        Ok(match verb {
            "beqz" => Instruction::op3("beq", reg, isa::ZERO, dest),
            "bnez" => Instruction::op3("bne", reg, isa::ZERO, dest),
            "blez" => Instruction::op3("bge", isa::ZERO, reg, dest),
            "bgez" => Instruction::op3("bge", reg, isa::ZERO, dest),
            "bltz" => Instruction::op3("blt", reg, isa::ZERO, dest),
            "bgtz" => Instruction::op3("blt", isa::ZERO, reg, dest),
            _ => unreachable!("pseudo jump table covers every -z verb"),
        })
    } else {
        let args = check_args(verb, args, 3)?;
        let r1 = register(&args[0])?;
        let r2 = register(&args[1])?;
        let dest = branch_target(&args[2])?;
        Ok(match verb {
            "bgt" => Instruction::op3("blt", r2, r1, dest),
            "ble" => Instruction::op3("bge", r2, r1, dest),
            "bgtu" => Instruction::op3("bltu", r2, r1, dest),
            "bleu" => Instruction::op3("bgeu", r2, r1, dest),
            _ => unreachable!("pseudo jump table covers every swap verb"),
        })
    }
}

/// Expand `leti rd, value`, the only variable-length pseudo-instruction.
/// Small values load with a single addi; anything wider becomes a
/// shift-and-add sequence of up to five instructions.
fn leti(
    exe: &mut Executable,
    args: &[String],
    line: usize,
) -> Result<(), AsmError> {
    let args = check_args("leti", args, 2)?;
    let rd = register(&args[0])?;
    let cst = &args[1];

    if !cst.starts_with(|c: char| "0123456789-+".contains(c)) {
        // then the operand must be a label name
        return exe
            .add(Item::Instr(Instruction::leti_label(args)?.with_line(line)));
    }

    // hex constants wider than 16 bits (e.g. RGB triplets like
    // 0x0000ff00) always take the shift-and-add path, even when the
    // value itself is small, to sidestep sign-extension of bit 15
    let wide_hex = cst.len() > 6 && cst.starts_with("0x");

    let value = parse::integer_literal(cst)?;
    if !(-(1i64 << 31)..1i64 << 32).contains(&value) {
        return Err(AsmError::Imm32Range(cst.clone()));
    }
    let signed =
        if value >= 1i64 << 31 { value - (1i64 << 32) } else { value };

    if signed == 0 {
        // a wide-hex zero (e.g. 0x00000000) has no set bit to anchor
        // the shift strategy on
        return exe
            .add(Item::Instr(Instruction::op2("addi", rd, isa::ZERO, 0)
                .with_line(line)));
    }

    let add = |exe: &mut Executable, instr: Instruction| {
        exe.add(Item::Instr(instr.with_line(line)))
    };
    let add_pseudo = |exe: &mut Executable, instr: Instruction| {
        exe.add(Item::Instr(instr.with_line(0)))
    };

    if (-(1i64 << 15)..1i64 << 16).contains(&signed) && !wide_hex {
        // small literal, a single addi does it
        let low16 = (signed.rem_euclid(1 << 16)) as i32;
        return add(exe, Instruction::op2("addi", rd, isa::ZERO, low16));
    }

    let value = signed.rem_euclid(1i64 << 32) as u32;
    let msb = 31 - value.leading_zeros();
    let lsb = value.trailing_zeros();
    if msb - lsb + 1 < 16 || (msb - lsb + 1 == 16 && msb == 31) {
        // narrow run of bits: load shifted right, then shift into place.
        // when msb==31 the addi leaves noise above bit 15, but the
        // shift-left pushes it all beyond the left end.
        add(
            exe,
            Instruction::op2("addi", rd, isa::ZERO, (value >> lsb) as i32),
        )?;
        return add_pseudo(exe, Instruction::op2("lsli", rd, rd, lsb as i32));
    }

    // more than 16 bits of actual data: load the upper half first
    add(exe, Instruction::op2("addi", rd, isa::ZERO, (value >> 16) as i32))?;
    if value & 0x8000 == 0 {
        // no sign-bit problem, load both halves verbatim
        add_pseudo(exe, Instruction::op2("lsli", rd, rd, 16))?;
        return add_pseudo(
            exe,
            Instruction::op2("addi", rd, rd, (value & 0xffff) as i32),
        );
    }

    // bit 15 of the low half is set, so a 16-bit addi would sign-extend;
    // feed the low half in as a 4-bit and a 12-bit piece instead
    add_pseudo(exe, Instruction::op2("lsli", rd, rd, 4))?;
    add_pseudo(
        exe,
        Instruction::op2("addi", rd, rd, ((value & 0xffff) >> 12) as i32),
    )?;
    add_pseudo(exe, Instruction::op2("lsli", rd, rd, 12))?;
    add_pseudo(exe, Instruction::op2("addi", rd, rd, (value & 0x0fff) as i32))
}

fn word_directive(exe: &mut Executable, rest: &str) -> Result<(), AsmError> {
    for text in rest.split(',') {
        let text = text.trim();
        if text.is_empty() {
            return Err(AsmError::MissingWordValue);
        }
        let value = parse::integer_literal(text)?;
        if value >= 1i64 << 32 {
            return Err(AsmError::WordRange(text.to_string()));
        }
        let value = (value & 0xffff_ffff) as u32;
        exe.add(Item::Word { value, line: 0 })?;
    }
    Ok(())
}

fn space_directive(exe: &mut Executable, rest: &str) -> Result<(), AsmError> {
    let size = parse::integer_literal(rest)?;
    if size <= 0 {
        return Err(AsmError::SpaceSize(size));
    }
    exe.advance(size as u32);
    Ok(())
}

fn align_directive(exe: &mut Executable, rest: &str) -> Result<(), AsmError> {
    let size = parse::integer_literal(rest)?;
    if size <= 0 {
        return Err(AsmError::AlignSize(size));
    }
    exe.align(size as u32);
    Ok(())
}
