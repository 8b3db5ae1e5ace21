//! Executable file parsing
//!
//! A `.exe` file is ASCII, one 32-bit word per line as 8 hex digits. A
//! contiguous image starts at address 0 with bare words; a hollow image
//! prefixes every word with `address:`. The two styles cannot be mixed.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("{0}")]
    Io(String),
    #[error("format error at line {line}: '{text}'")]
    Format { line: usize, text: String },
    #[error("duplicate address 0x{addr:x} at line {line}")]
    DuplicateAddress { addr: u32, line: usize },
    #[error("either all lines must have an address field, or none of them")]
    MixedFormat,
}

impl From<io::Error> for ImageError {
    fn from(e: io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// A loaded executable image: word values keyed by byte address
#[derive(Debug, Default)]
pub struct Image {
    pub words: BTreeMap<u32, u32>,
}

fn is_hex(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_hexdigit())
}

impl Image {
    pub fn load(path: &Path) -> Result<Self, ImageError> {
        Self::parse(&fs::read_to_string(path)?)
    }

    pub fn parse(text: &str) -> Result<Self, ImageError> {
        let lines: Vec<&str> =
            text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        if lines.iter().any(|l| l.contains(':'))
            && lines.iter().any(|l| !l.contains(':'))
        {
            return Err(ImageError::MixedFormat);
        }

        let mut words = BTreeMap::new();
        let mut addr = 0u32;
        for (index, &line) in lines.iter().enumerate() {
            let lnum = index + 1;
            let format_error = || ImageError::Format {
                line: lnum,
                text: line.to_string(),
            };

            let word = match line.split_once(':') {
                Some((addr_text, word_text)) => {
                    let addr_text = addr_text.trim();
                    if !is_hex(addr_text) {
                        return Err(format_error());
                    }
                    addr = u32::from_str_radix(addr_text, 16)
                        .map_err(|_| format_error())?;
                    word_text.trim()
                }
                None => line,
            };
            if word.len() != 8 || !is_hex(word) {
                return Err(format_error());
            }
            let value = u32::from_str_radix(word, 16)
                .expect("an 8-digit hex string fits in u32");

            // words are 4 bytes wide, so a colliding word starts within
            // 3 bytes on either side
            let low = addr.saturating_sub(3);
            if words.range(low..=addr.saturating_add(3)).next().is_some() {
                return Err(ImageError::DuplicateAddress { addr, line: lnum });
            }
            words.insert(addr, value);
            addr = addr.wrapping_add(4);
        }
        Ok(Self { words })
    }

    /// Hex width of the largest address, rounded up to an even number
    /// of digits
    pub fn addr_width(&self) -> usize {
        let max = self.words.keys().next_back().copied().unwrap_or(0);
        let w = format!("{max:x}").len();
        w + w % 2
    }
}
