//! Heuristic disassembly of an executable image
//!
//! Two passes over the word map: the first collects every address named
//! by a PC-relative operand (branches, `bra`, PC-relative loads and
//! stores, jumps) so targets can be marked; the second renders each
//! word. Words that do not decode to an instruction are shown as data.
//! A few idioms are rewritten for readability: `addi pc, pc` as `bra`,
//! `jal` through the PC as `jmp`/`call`, `jal zero, lr, +0` as `ret`,
//! and stack accesses adjacent to the push/pop signature words get a
//! `push`/`pop` annotation.

use std::collections::BTreeSet;

use crate::exe::Image;
use crate::isa::{self, nibble, POP_ADDI, PUSH_SUBI};
use crate::utils::imm16;

/// Replace raw register names that have a conventional alias
fn pretty(text: &str) -> String {
    text.replace("r0", "zero")
        .replace("r15", "pc")
        .replace("r14", "lr")
        .replace("r13", "sp")
}

/// Addresses referenced by PC-relative operands
fn discover_symbols(image: &Image) -> BTreeSet<u32> {
    let mut symbols = BTreeSet::new();
    for (&addr, &word) in &image.words {
        let ty = nibble(word, 28);
        let op = nibble(word, 24);
        if isa::mnemonic(ty, op).is_none() {
            continue; // not a valid instruction, nothing to do
        }
        let rd = nibble(word, 20);
        let rs = nibble(word, 16);
        let target = addr.wrapping_add(imm16(word) as u32);
        let pc_relative = match ty {
            2 => op == 0 && rd == isa::PC && rs == isa::PC, // branch always
            3 => true,                                      // cond. jump
            4 if op == 0 => rs == isa::PC,                  // load
            4 => rd == isa::PC,                             // store
            5 => rs == isa::PC,                             // jal (call, jmp)
            _ => false,
        };
        if pc_relative {
            symbols.insert(target);
        }
    }
    symbols
}

pub fn disassemble(image: &Image) -> String {
    let addr_width = image.addr_width();
    let symbols = discover_symbols(image);
    let label_width = if symbols.is_empty() { 0 } else { 4 };

    let mut out = String::new();
    for (&addr, &word) in &image.words {
        if symbols.contains(&addr) {
            out += &format!("<{addr:04x}>\n");
        }

        let bytes = format!("{word:08x}");
        out += &" ".repeat(label_width);
        out += &format!(
            "{addr:0addr_width$x}: {} {} {} {}    ",
            &bytes[0..2],
            &bytes[2..4],
            &bytes[4..6],
            &bytes[6..8]
        );
        out += &render(image, addr, word, label_width);
        out += "\n";
    }
    out
}

fn render(image: &Image, addr: u32, word: u32, label_width: usize) -> String {
    let ty = nibble(word, 28);
    let op = nibble(word, 24);
    let Some(verb) = isa::mnemonic(ty, op) else {
        // not an instruction, show the raw value
        let mut comment = String::new();
        if word > 1 << 31 {
            comment = format!(" or {}", i64::from(word) - (1i64 << 32));
        }
        return format!("; 0x{word:08x} = {word}{comment}");
    };
    let rd = nibble(word, 20);
    let rs = nibble(word, 16);
    let imm = imm16(word);
    let target = addr.wrapping_add(imm as u32);
    let marker = format!("<{target:0label_width$x}>");

    match ty {
        1 => {
            let rs2 = nibble(word, 12);
            pretty(&format!("{verb:<5} r{rd}, r{rs}, r{rs2}"))
        }
        2 => {
            if rd == isa::PC && rs == isa::PC {
                pretty(&format!("bra {imm} ; {marker}"))
            } else {
                pretty(&format!("{verb:<5} r{rd}, r{rs}, {imm}"))
            }
        }
        3 => pretty(&format!("{verb:<5} r{rd}, r{rs}, {imm:+} ; {marker}")),
        4 if op == 0 => {
            let mut comment = String::new();
            if rs == isa::PC {
                comment = format!(" ; {marker}");
            }
            if rs == isa::SP
                && imm == 0
                && image.words.get(&addr.wrapping_add(4)) == Some(&POP_ADDI)
            {
                comment = format!(" ; pop r{rd}");
            }
            pretty(&format!("{verb:<5} r{rd}, [r{rs}{imm:+}]{comment}"))
        }
        4 => {
            let mut comment = String::new();
            if rd == isa::SP
                && imm == 0
                && addr >= 4
                && image.words.get(&(addr - 4)) == Some(&PUSH_SUBI)
            {
                comment = format!(" ; push r{rs}");
            }
            if rd == isa::PC {
                comment = format!(" ; {marker}");
            }
            pretty(&format!("{verb:<5} [r{rd}{imm:+}], r{rs}{comment}"))
        }
        5 => {
            if rd == isa::ZERO && rs == isa::LR && imm == 0 {
                "ret".to_string()
            } else if rd == isa::LR && rs == isa::PC {
                format!("call {imm:+} ; {marker}")
            } else if rd == isa::ZERO && rs == isa::PC {
                format!("jmp {imm:+} ; {marker}")
            } else {
                let mut comment = String::new();
                if rs == isa::PC {
                    comment = format!(" ; {marker}");
                }
                pretty(&format!("{verb:<5} r{rd}, r{rs}, {imm:+}{comment}"))
            }
        }
        _ => unreachable!("mnemonic lookup validated the type"),
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::asm::assemble;

    fn dump(source: &str) -> String {
        let text = assemble(source).unwrap().encode_text();
        disassemble(&Image::parse(&text).unwrap())
    }

    #[test]
    fn check_plain_alu_rendering() {
        let out = dump("add r1, r2, r3\naddi r4, r5, -7");
        assert!(out.contains("add   r1, r2, r3"));
        assert!(out.contains("addi  r4, r5, -7"));
    }

    #[test]
    fn check_register_aliases() {
        let out = dump("add r1, sp, lr\nmov r2, zero");
        assert!(out.contains("add   r1, sp, lr"));
        assert!(out.contains("addi  r2, zero, 0"));
    }

    #[test]
    fn check_bra_and_target_marker() {
        let out = dump("l: bra l");
        assert!(out.contains("<0000>"));
        assert!(out.contains("bra 0 ; <0000>"));
    }

    #[test]
    fn check_branch_marker() {
        let out = dump("loop: nop\nbnez r1, loop");
        assert!(out.contains("bne   r1, zero, -4 ; <0000>"));
    }

    #[test]
    fn check_jmp_call_ret_rewriting() {
        let out = dump("f: call f\njmp f\nret");
        assert!(out.contains("call +0 ; <0000>"));
        assert!(out.contains("jmp -4 ; <0000>"));
        assert!(out.contains("ret"));
    }

    #[test]
    fn check_push_pop_annotations() {
        let out = dump("push r5\npop r6");
        assert!(out.contains("; push r5"));
        assert!(out.contains("; pop r6"));
    }

    #[test]
    fn check_stack_access_at_image_boundary() {
        // a qualifying store as the first word has no word before it,
        // and a qualifying load as the last word has no word after it;
        // neither pairs into a push/pop annotation
        let out = dump("store [sp], r2\nload r1, [sp]");
        assert!(out.contains("store [sp+0], r2"));
        assert!(out.contains("load  r1, [sp+0]"));
        assert!(!out.contains("; push"));
        assert!(!out.contains("; pop"));
    }

    #[test]
    fn check_data_words() {
        let out = dump(".word 7, 0xffffffff");
        assert!(out.contains("; 0x00000007 = 7"));
        assert!(out.contains("; 0xffffffff = 4294967295 or -1"));
    }

    #[test]
    fn check_pc_relative_load_marker() {
        let out = dump("load r1, [tab]\nbra +8\ntab: .word 1");
        assert!(out.contains("load  r1, [pc+8] ; <0008>"));
    }
}
