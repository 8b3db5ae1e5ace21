//! Listing index
//!
//! Built from the `.lst` file at simulator startup. Label header lines
//! (`<name>:`) become symbol entries; address lines (`addr: ...`) map
//! addresses to listing lines. The index answers three questions for
//! the debugger: where is a symbol, what source surrounds an address,
//! and which symbol is nearest below an address. Stores into mapped
//! addresses patch the hex column of the affected line so disassembly
//! views stay truthful.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

#[derive(Debug, Default)]
pub struct Listing {
    /// Raw listing lines; index 0 is a sentinel so line numbers count
    /// from one
    lines: Vec<String>,
    symbols: BTreeMap<String, u32>,
    /// Address of each word -> its line number
    disass: BTreeMap<u32, usize>,
}

fn parse_label_header(line: &str) -> Option<&str> {
    let text = line.trim_start();
    let name = text.strip_prefix('<')?.strip_suffix(">:")?;
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return None,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_').then_some(name)
}

fn parse_address(line: &str) -> Option<u32> {
    let text = line.trim_start();
    let end = text.find(|c: char| !c.is_ascii_hexdigit())?;
    if end == 0 || text.as_bytes()[end] != b':' {
        return None;
    }
    u32::from_str_radix(&text[..end], 16).ok()
}

impl Listing {
    /// A listing that knows nothing (no `.lst` file was found)
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_file(path: &Path) -> io::Result<Self> {
        Ok(Self::from_text(&fs::read_to_string(path)?))
    }

    pub fn from_text(text: &str) -> Self {
        let mut lines = vec![String::new()];
        lines.extend(text.lines().map(str::to_string));

        let mut symbols = BTreeMap::new();
        let mut disass = BTreeMap::new();
        // label names come before their address line, so accumulate
        // them until an address shows where they live
        let mut pending: Vec<String> = Vec::new();
        for (number, line) in lines.iter().enumerate() {
            if let Some(name) = parse_label_header(line) {
                pending.push(name.to_string());
            } else if let Some(address) = parse_address(line) {
                for name in pending.drain(..) {
                    symbols.insert(name, address);
                }
                disass.insert(address, number);
            }
        }
        Self { lines, symbols, disass }
    }

    /// True when no listing was loaded at all
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn symbols(&self) -> &BTreeMap<String, u32> {
        &self.symbols
    }

    pub fn lookup(&self, name: &str) -> Option<u32> {
        self.symbols.get(name).copied()
    }

    /// The listing line showing the word at `addr`
    pub fn line_at(&self, addr: u32) -> Option<&str> {
        let &number = self.disass.get(&addr)?;
        self.lines.get(number).map(String::as_str)
    }

    /// The symbol with the largest address not beyond `addr`
    pub fn nearest_symbol(&self, addr: u32) -> Option<(&str, u32)> {
        self.symbols
            .iter()
            .filter(|&(_, &sym_addr)| sym_addr <= addr)
            .max_by_key(|&(_, &sym_addr)| sym_addr)
            .map(|(name, &sym_addr)| (name.as_str(), sym_addr))
    }

    /// A short text block showing the nearest symbol and up to five
    /// listing lines starting at `addr`, or None if the address has no
    /// listing line
    pub fn near(&self, addr: u32) -> Option<String> {
        let &current = self.disass.get(&addr)?;
        let last = (current + 5).min(self.lines.len());

        let (name, sym_addr) =
            self.nearest_symbol(addr).unwrap_or(("0000", 0));
        let mut out = if sym_addr == addr {
            format!("<{name}>")
        } else {
            format!("<{name}+{}>", addr - sym_addr)
        };
        for line in &self.lines[current..last] {
            out += "\n    ";
            out += line;
        }
        Some(out)
    }

    /// Rewrite the hex column of the line at `addr` after a store. The
    /// label and source columns are preserved.
    pub fn patch(&mut self, addr: u32, value: u32) {
        let Some(&number) = self.disass.get(&addr) else {
            return;
        };
        let line = &mut self.lines[number];
        let Some(colon) = line.find(':') else {
            return;
        };
        let start = colon + 2;
        let bytes = format!("{value:08x}");
        let hex = format!(
            "{} {} {} {}",
            &bytes[0..2],
            &bytes[2..4],
            &bytes[4..6],
            &bytes[6..8]
        );
        if line.len() >= start + hex.len() {
            line.replace_range(start..start + hex.len(), &hex);
        } else {
            line.truncate(start);
            line.push_str(&hex);
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    const LISTING: &str = "\
<main>:
  00: 20 10 00 05    leti r1, 5
  04: 21 dd 00 04    push r1
  08: 41 d1 00 00
<loop>:
<spin>:
  0c: 2f f0 00 00    bra loop";

    #[test]
    fn check_symbols() {
        let listing = Listing::from_text(LISTING);
        assert_eq!(listing.lookup("main"), Some(0));
        assert_eq!(listing.lookup("loop"), Some(0xc));
        assert_eq!(listing.lookup("spin"), Some(0xc));
        assert_eq!(listing.lookup("nowhere"), None);
    }

    #[test]
    fn check_line_lookup() {
        let listing = Listing::from_text(LISTING);
        assert!(listing.line_at(0).unwrap().contains("leti r1, 5"));
        assert!(listing.line_at(0xc).unwrap().contains("bra loop"));
        assert_eq!(listing.line_at(0x10), None);
    }

    #[test]
    fn check_nearest_symbol() {
        let listing = Listing::from_text(LISTING);
        assert_eq!(listing.nearest_symbol(0), Some(("main", 0)));
        assert_eq!(listing.nearest_symbol(8), Some(("main", 0)));
        // co-located labels: either name is acceptable, the address
        // must be exact
        let (_, addr) = listing.nearest_symbol(0xc).unwrap();
        assert_eq!(addr, 0xc);
    }

    #[test]
    fn check_near_block() {
        let listing = Listing::from_text(LISTING);
        let block = listing.near(8).unwrap();
        let mut lines = block.lines();
        assert_eq!(lines.next(), Some("<main+8>"));
        assert!(lines.next().unwrap().contains("41 d1 00 00"));
        assert_eq!(listing.near(0x100), None);
    }

    #[test]
    fn check_patch_preserves_source_column() {
        let mut listing = Listing::from_text(LISTING);
        listing.patch(4, 0xcafe_f00d);
        let line = listing.line_at(4).unwrap();
        assert!(line.contains("ca fe f0 0d"));
        assert!(line.ends_with("push r1"));
        // unknown addresses are ignored
        listing.patch(0x100, 0);
    }

    #[test]
    fn check_empty_listing() {
        let listing = Listing::empty();
        assert!(listing.is_empty());
        assert_eq!(listing.near(0), None);
        assert_eq!(listing.lookup("main"), None);
    }
}
