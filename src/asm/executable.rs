//! The in-memory executable being assembled
//!
//! An address-indexed map of 32-bit items plus the symbol table and the
//! emission cursor. Items are appended at the cursor during the first
//! pass; [`Executable::resolve`] performs the second pass once every
//! label address is known. The two output formats (`.exe` and `.lst`)
//! are rendered from here.

use std::collections::BTreeMap;

use itertools::Itertools;

use super::instruction::Instruction;
use super::{AsmError, Diagnostic};

#[derive(Debug, Clone)]
pub enum Item {
    /// A literal 32-bit word (`.word` directive)
    Word { value: u32, line: usize },
    Instr(Instruction),
}

impl Item {
    pub fn line(&self) -> usize {
        match self {
            Item::Word { line, .. } => *line,
            Item::Instr(instr) => instr.line,
        }
    }

    pub fn encode(&self) -> u32 {
        match self {
            Item::Word { value, .. } => *value,
            Item::Instr(instr) => instr.encode(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Executable {
    contents: BTreeMap<u32, Item>,
    symbols: BTreeMap<String, u32>,
    cursor: u32,
}

impl Executable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item at the cursor and advance by one word
    pub fn add(&mut self, item: Item) -> Result<(), AsmError> {
        let address = self.cursor;
        if self.contents.contains_key(&address) {
            return Err(AsmError::DuplicateAddress(address));
        }
        let item = match item {
            Item::Instr(mut instr) => {
                instr.addr = address;
                Item::Instr(instr)
            }
            word => word,
        };
        self.contents.insert(address, item);
        self.cursor = self.cursor.wrapping_add(4);
        Ok(())
    }

    pub fn add_label(&mut self, name: String) -> Result<(), AsmError> {
        if self.symbols.contains_key(&name) {
            return Err(AsmError::DuplicateLabel(name));
        }
        self.symbols.insert(name, self.cursor);
        Ok(())
    }

    /// Advance the cursor without emitting anything (`.space`)
    pub fn advance(&mut self, bytes: u32) {
        self.cursor = self.cursor.wrapping_add(bytes);
    }

    /// Advance the cursor to the next multiple of `n` (`.align`)
    pub fn align(&mut self, n: u32) {
        let rem = self.cursor % n;
        if rem != 0 {
            self.cursor = self.cursor.wrapping_add(n - rem);
        }
    }

    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    pub fn symbols(&self) -> &BTreeMap<String, u32> {
        &self.symbols
    }

    /// Second pass: fill in every deferred PC-relative immediate.
    /// Errors point at the source line of the referring instruction.
    pub fn resolve(&mut self) -> Result<(), Diagnostic> {
        let Self { contents, symbols, .. } = self;
        for item in contents.values_mut() {
            if let Item::Instr(instr) = item {
                instr
                    .resolve(symbols)
                    .map_err(|error| Diagnostic { line: instr.line, error })?;
            }
        }
        Ok(())
    }

    /// Hex width of the largest address, rounded up to an even number
    /// of digits
    pub fn addr_width(&self) -> usize {
        let max = self.contents.keys().next_back().copied().unwrap_or(0);
        let w = format!("{max:x}").len();
        w + w % 2
    }

    /// Render the `.exe` text. A contiguous image starting at zero is
    /// written as bare words; a hollow image (`.space`/`.align` gaps)
    /// prefixes each word with its address.
    pub fn encode_text(&self) -> String {
        let Some(first) = self.contents.keys().next().copied() else {
            return String::new();
        };
        let contiguous = first == 0
            && self
                .contents
                .keys()
                .tuple_windows()
                .all(|(a, b)| b - a == 4);
        let width = self.addr_width();

        let mut out = String::new();
        for (addr, item) in &self.contents {
            if !contiguous {
                out += &format!("{addr:0width$x}: ");
            }
            out += &format!("{:08x}\n", item.encode());
        }
        out.pop();
        out
    }

    /// Render the `.lst` listing: label headers, then one line per word
    /// with its address, bytes and originating source text
    pub fn listing(&self, source_lines: &[&str]) -> String {
        let addr_width = self.addr_width();
        let label_width = if self.symbols.is_empty() {
            0
        } else {
            self.symbols
                .keys()
                .map(|name| name.len())
                .max()
                .expect("symbols is not empty")
                .max(addr_width.saturating_sub(2))
        };

        let mut by_addr: BTreeMap<u32, Vec<&str>> = BTreeMap::new();
        for (name, &addr) in &self.symbols {
            by_addr.entry(addr).or_default().push(name);
        }

        let mut out = String::new();
        for (&pos, item) in &self.contents {
            if let Some(names) = by_addr.get(&pos) {
                for name in names {
                    let header = format!("<{name}>:");
                    out += &format!("{header:>w$}\n", w = label_width + 3);
                }
            }
            let addr = format!("{pos:0addr_width$x}: ");
            out += &format!("{addr:>w$}", w = label_width + 4);
            let bytes = format!("{:08x}", item.encode());
            out += &format!(
                "{} {} {} {}",
                &bytes[0..2],
                &bytes[2..4],
                &bytes[4..6],
                &bytes[6..8]
            );
            out += "    ";
            // original comments don't make much sense in this view
            let line = item.line();
            if line > 0 {
                if let Some(src) = source_lines.get(line - 1) {
                    out += src.split(';').next().unwrap_or("").trim();
                }
            }
            out += "\n";
        }
        out.pop();
        out
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    fn word(value: u32) -> Item {
        Item::Word { value, line: 0 }
    }

    #[test]
    fn check_cursor_advances_by_word() {
        let mut exe = Executable::new();
        exe.add(word(1)).unwrap();
        exe.add(word(2)).unwrap();
        assert_eq!(exe.cursor(), 8);
    }

    #[test]
    fn check_duplicate_label_rejected() {
        let mut exe = Executable::new();
        exe.add_label("a".to_string()).unwrap();
        assert!(matches!(
            exe.add_label("a".to_string()),
            Err(AsmError::DuplicateLabel(_))
        ));
    }

    #[test]
    fn check_align() {
        let mut exe = Executable::new();
        exe.add(word(1)).unwrap();
        exe.align(16);
        assert_eq!(exe.cursor(), 16);
        exe.align(16);
        assert_eq!(exe.cursor(), 16);
    }

    #[test]
    fn check_contiguous_exe_has_no_addresses() {
        let mut exe = Executable::new();
        exe.add(word(0xdead_beef)).unwrap();
        exe.add(word(0x0000_0001)).unwrap();
        assert_eq!(exe.encode_text(), "deadbeef\n00000001");
    }

    #[test]
    fn check_hollow_exe_has_addresses() {
        let mut exe = Executable::new();
        exe.add(word(0xdead_beef)).unwrap();
        exe.advance(8);
        exe.add(word(0x0000_0001)).unwrap();
        assert_eq!(exe.encode_text(), "00: deadbeef\n0c: 00000001");
    }

    #[test]
    fn check_empty_exe() {
        let exe = Executable::new();
        assert_eq!(exe.encode_text(), "");
    }

    #[test]
    fn check_listing_layout() {
        let mut exe = Executable::new();
        exe.add_label("start".to_string()).unwrap();
        let instr = crate::asm::instruction::Instruction::op2(
            "addi",
            0,
            0,
            0,
        )
        .with_line(1);
        exe.add(Item::Instr(instr)).unwrap();
        let listing = exe.listing(&["nop ; do nothing"]);
        let mut lines = listing.lines();
        assert_eq!(lines.next(), Some("<start>:"));
        assert_eq!(lines.next(), Some("     00: 20 00 00 00    nop"));
    }
}
