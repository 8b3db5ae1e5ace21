//! Framebuffer painter window
//!
//! Runs on a dedicated thread with its own event loop, polling the
//! shared pixel buffer every ~30 ms and repainting. The simulated CPU
//! writes pixels without any synchronization with the repaint cadence;
//! a frame may briefly mix old and new pixels, which is acceptable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::debug;
use pixels::{Pixels, SurfaceTexture};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use super::{XRES, YRES};

/// Repaint cadence
const FRAME_TIME: Duration = Duration::from_millis(30);

/// Initial zoom factor for the window size
const ZOOM: usize = 8;

struct Painter {
    frame: Arc<Mutex<Vec<u8>>>,
    closing: Arc<AtomicBool>,
    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
}

impl Painter {
    fn repaint(&mut self) {
        let Some(pixels) = &mut self.pixels else {
            return;
        };
        {
            let source = self.frame.lock().expect("pixel buffer lock");
            for (rgba, rgb) in
                pixels.frame_mut().chunks_exact_mut(4).zip(source.chunks(3))
            {
                rgba[0] = rgb[0];
                rgba[1] = rgb[1];
                rgba[2] = rgb[2];
                rgba[3] = 0xff;
            }
        }
        if let Err(e) = pixels.render() {
            debug!("screen render failed: {e}");
        }
    }
}

impl ApplicationHandler for Painter {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let size =
            LogicalSize::new((XRES * ZOOM) as f64, (YRES * ZOOM) as f64);
        let attributes = Window::default_attributes()
            .with_title("scat")
            .with_inner_size(size)
            .with_min_inner_size(LogicalSize::new(XRES as f64, YRES as f64));
        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                eprintln!("screen error: cannot create window: {e}");
                event_loop.exit();
                return;
            }
        };
        let inner = window.inner_size();
        let surface =
            SurfaceTexture::new(inner.width, inner.height, window.clone());
        match Pixels::new(XRES as u32, YRES as u32, surface) {
            Ok(pixels) => self.pixels = Some(pixels),
            Err(e) => {
                eprintln!("screen error: cannot create pixel surface: {e}");
                event_loop.exit();
                return;
            }
        }
        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                if let Some(pixels) = &mut self.pixels {
                    if let Err(e) =
                        pixels.resize_surface(size.width, size.height)
                    {
                        debug!("screen resize failed: {e}");
                    }
                }
            }
            WindowEvent::RedrawRequested => self.repaint(),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.closing.load(Ordering::SeqCst) {
            event_loop.exit();
            return;
        }
        if let Some(window) = &self.window {
            window.request_redraw();
        }
        event_loop
            .set_control_flow(ControlFlow::WaitUntil(Instant::now() + FRAME_TIME));
    }
}

fn build_event_loop() -> Result<EventLoop<()>, String> {
    let mut builder = EventLoop::builder();
    // the painter does not run on the main thread
    #[cfg(target_os = "linux")]
    {
        use winit::platform::x11::EventLoopBuilderExtX11;
        builder.with_any_thread(true);
    }
    #[cfg(target_os = "windows")]
    {
        use winit::platform::windows::EventLoopBuilderExtWindows;
        builder.with_any_thread(true);
    }
    builder.build().map_err(|e| e.to_string())
}

/// Spawn the painter thread. The handshake reports whether the event
/// loop could be created, so a headless host fails cleanly here rather
/// than killing the simulator later.
pub fn spawn(
    frame: Arc<Mutex<Vec<u8>>>,
    closing: Arc<AtomicBool>,
) -> Result<JoinHandle<()>, String> {
    let (ready_tx, ready_rx) = mpsc::channel();
    let handle = thread::Builder::new()
        .name("scat-screen".to_string())
        .spawn(move || {
            let event_loop = match build_event_loop() {
                Ok(event_loop) => {
                    let _ = ready_tx.send(Ok(()));
                    event_loop
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let mut painter =
                Painter { frame, closing, window: None, pixels: None };
            if let Err(e) = event_loop.run_app(&mut painter) {
                debug!("screen event loop ended: {e}");
            }
        })
        .map_err(|e| e.to_string())?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(handle),
        Ok(Err(e)) => {
            let _ = handle.join();
            Err(e)
        }
        Err(_) => {
            let _ = handle.join();
            Err("screen thread died during startup".to_string())
        }
    }
}
