//! Memory-mapped framebuffer
//!
//! The pixel store is a shared byte buffer of `XRES*YRES` RGB triplets,
//! written by the CPU through the bus and repainted by a window running
//! on its own thread with its own event loop (compiled behind the
//! `display` feature). Pixel words have the byte layout `RR GG BB 00`;
//! the low byte is ignored on write and reads back as zero.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use thiserror::Error;

#[cfg(feature = "display")]
mod window;

pub const XRES: usize = 80;
pub const YRES: usize = 60;

#[derive(Debug, Error)]
pub enum ScreenError {
    #[error(
        "display support was not compiled in \
         (rebuild with --features display)"
    )]
    NotCompiled,
    #[error("cannot open display: {0}")]
    Unavailable(String),
}

pub struct Screen {
    /// Three bytes per pixel, row-major
    frame: Arc<Mutex<Vec<u8>>>,
    closing: Arc<AtomicBool>,
    painter: Option<JoinHandle<()>>,
}

impl Default for Screen {
    fn default() -> Self {
        Self::new()
    }
}

impl Screen {
    pub fn new() -> Self {
        Self {
            frame: Arc::new(Mutex::new(vec![0; XRES * YRES * 3])),
            closing: Arc::new(AtomicBool::new(false)),
            painter: None,
        }
    }

    /// Read the pixel word at a (word-aligned) framebuffer offset
    pub fn read(&self, offset: u32) -> u32 {
        debug_assert!(offset % 4 == 0 && (offset as usize) < XRES * YRES * 4);
        let voffset = (offset / 4 * 3) as usize;
        let frame = self.frame.lock().expect("pixel buffer lock");
        u32::from(frame[voffset]) << 24
            | u32::from(frame[voffset + 1]) << 16
            | u32::from(frame[voffset + 2]) << 8
    }

    /// Write the pixel word at a (word-aligned) framebuffer offset
    pub fn write(&self, offset: u32, data: u32) {
        debug_assert!(offset % 4 == 0 && (offset as usize) < XRES * YRES * 4);
        let voffset = (offset / 4 * 3) as usize;
        let mut frame = self.frame.lock().expect("pixel buffer lock");
        frame[voffset] = (data >> 24) as u8;
        frame[voffset + 1] = (data >> 16) as u8;
        frame[voffset + 2] = (data >> 8) as u8;
    }

    /// Reveal the framebuffer window. Does nothing if it is already
    /// open; reopens it if the user closed it.
    #[cfg(feature = "display")]
    pub fn show(&mut self) -> Result<(), ScreenError> {
        if let Some(painter) = &self.painter {
            if !painter.is_finished() {
                return Ok(());
            }
            if let Some(painter) = self.painter.take() {
                let _ = painter.join();
            }
        }
        self.closing.store(false, Ordering::SeqCst);
        let painter =
            window::spawn(Arc::clone(&self.frame), Arc::clone(&self.closing))
                .map_err(ScreenError::Unavailable)?;
        self.painter = Some(painter);
        Ok(())
    }

    #[cfg(not(feature = "display"))]
    pub fn show(&mut self) -> Result<(), ScreenError> {
        Err(ScreenError::NotCompiled)
    }

    /// Close the window, if any
    pub fn close(&mut self) {
        self.closing.store(true, Ordering::SeqCst);
        if let Some(painter) = self.painter.take() {
            let _ = painter.join();
        }
    }
}

impl Drop for Screen {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn check_pixel_byte_layout() {
        let screen = Screen::new();
        screen.write(0, 0xff00_0000);
        let frame = screen.frame.lock().unwrap();
        assert_eq!(&frame[0..3], &[0xff, 0, 0]);
    }

    #[test]
    fn check_readback_ignores_low_byte() {
        let screen = Screen::new();
        screen.write(8, 0x1234_56ff);
        assert_eq!(screen.read(8), 0x1234_5600);
    }

    #[test]
    fn check_pixel_offsets_do_not_overlap() {
        let screen = Screen::new();
        screen.write(0, 0xffff_ff00);
        screen.write(4, 0x0102_0300);
        assert_eq!(screen.read(0), 0xffff_ff00);
        assert_eq!(screen.read(4), 0x0102_0300);
        let frame = screen.frame.lock().unwrap();
        assert_eq!(&frame[0..6], &[0xff, 0xff, 0xff, 1, 2, 3]);
    }

    #[test]
    fn check_last_pixel() {
        let screen = Screen::new();
        let last = (XRES * YRES * 4 - 4) as u32;
        screen.write(last, 0xabcd_ef00);
        assert_eq!(screen.read(last), 0xabcd_ef00);
    }
}
