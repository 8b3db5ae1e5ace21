//! Byte-addressed RAM
//!
//! Backed by a byte map so hollow images stay cheap. Words are stored
//! big-endian. Uninitialized bytes materialize on first read with
//! pseudo-random values from a generator seeded by the executable path,
//! so a given program always sees the same garbage.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::exe::Image;

/// Derive the RNG seed from the executable file name
pub fn seed_from_name(name: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    hasher.finish()
}

#[derive(Debug)]
pub struct Ram {
    bytes: HashMap<u32, u8>,
    rng: StdRng,
}

impl Ram {
    pub fn new(seed: u64) -> Self {
        Self { bytes: HashMap::new(), rng: StdRng::seed_from_u64(seed) }
    }

    pub fn from_image(image: &Image, seed: u64) -> Self {
        let mut ram = Self::new(seed);
        for (&addr, &word) in &image.words {
            ram.write(addr, word);
        }
        ram
    }

    /// Read `size` bytes (1 or 4) big-endian starting at `addr`
    pub fn read(&mut self, addr: u32, size: u32) -> u32 {
        let Self { bytes, rng } = self;
        let mut result = 0u32;
        for i in 0..size {
            let byte = *bytes
                .entry(addr.wrapping_add(i))
                .or_insert_with(|| rng.gen());
            result = result << 8 | u32::from(byte);
        }
        result
    }

    /// Write a 32-bit word big-endian at `addr`
    pub fn write(&mut self, addr: u32, data: u32) {
        for (i, byte) in data.to_be_bytes().into_iter().enumerate() {
            self.bytes.insert(addr.wrapping_add(i as u32), byte);
        }
    }

    /// Hex width of the largest touched address, rounded up to an even
    /// number of digits
    pub fn addr_width(&self) -> usize {
        let max = self.bytes.keys().max().copied().unwrap_or(0);
        let w = format!("{max:x}").len();
        w + w % 2
    }

    /// Format an address with the current best-guess width
    pub fn aas(&self, addr: u32) -> String {
        format!("{addr:0width$x}", width = self.addr_width())
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn check_word_roundtrip() {
        let mut ram = Ram::new(0);
        ram.write(0x100, 0xcafe_f00d);
        assert_eq!(ram.read(0x100, 4), 0xcafe_f00d);
    }

    #[test]
    fn check_big_endian_byte_order() {
        let mut ram = Ram::new(0);
        ram.write(0, 0x0102_0304);
        assert_eq!(ram.read(0, 1), 1);
        assert_eq!(ram.read(1, 1), 2);
        assert_eq!(ram.read(2, 1), 3);
        assert_eq!(ram.read(3, 1), 4);
    }

    #[test]
    fn check_image_load() {
        let image = Image::parse("20100005\n2ff00000").unwrap();
        let mut ram = Ram::from_image(&image, 0);
        assert_eq!(ram.read(0, 4), 0x2010_0005);
        assert_eq!(ram.read(4, 4), 0x2ff0_0000);
        assert_eq!(ram.read(0, 1), 0x20);
    }

    #[test]
    fn check_uninitialized_reads_are_reproducible() {
        let seed = seed_from_name("demo.exe");
        let mut a = Ram::new(seed);
        let mut b = Ram::new(seed);
        let values: Vec<u32> = (0..16).map(|i| a.read(4 * i, 4)).collect();
        let again: Vec<u32> = (0..16).map(|i| b.read(4 * i, 4)).collect();
        assert_eq!(values, again);
    }

    #[test]
    fn check_uninitialized_read_is_sticky() {
        let mut ram = Ram::new(1);
        let first = ram.read(0x40, 4);
        assert_eq!(ram.read(0x40, 4), first);
    }

    #[test]
    fn check_addr_width_grows() {
        let mut ram = Ram::new(0);
        ram.write(0x10, 0);
        assert_eq!(ram.addr_width(), 2);
        ram.write(0x1234, 0);
        assert_eq!(ram.addr_width(), 4);
        assert_eq!(ram.aas(0x10), "0010");
    }
}
