use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use clap_num::maybe_hex;

use scat::bus::Machine;
use scat::debugger::{Debugger, INTERRUPT};
use scat::exe::Image;
use scat::listing::Listing;
use scat::ram::{seed_from_name, Ram};

/// Simulate a SCAT executable
///
/// Loads EXEFILE into memory and starts the interactive debugger.
/// Type 'help' at the prompt for the list of commands. The simulated
/// machine has 256 MiB of RAM at address 0, a real-time clock at
/// 0xA0000000 and an 80x60 framebuffer at 0xB0000000.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Args {
    /// Program to execute
    #[arg(value_name = "EXEFILE")]
    exefile: String,

    /// Don't start in verbose mode
    #[arg(short, long)]
    quiet: bool,

    /// Place a breakpoint before execution starts (use 0x prefix for
    /// hexadecimal)
    #[arg(short, long, value_parser = maybe_hex::<u32>)]
    breakpoint: Option<u32>,
}

/// Route Ctrl+C to an interrupt flag so a running `continue` unwinds
/// to the prompt instead of killing the process
#[cfg(unix)]
fn install_sigint_flag() {
    extern "C" fn on_sigint(_: libc::c_int) {
        INTERRUPT.store(true, std::sync::atomic::Ordering::SeqCst);
    }
    let handler = on_sigint as extern "C" fn(libc::c_int);
    unsafe {
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
    }
}

#[cfg(not(unix))]
fn install_sigint_flag() {}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    if !Path::new(&args.exefile).exists() {
        eprintln!("sim: cannot find file '{}'", args.exefile);
        return ExitCode::FAILURE;
    }
    let Some(stem) = args.exefile.strip_suffix(".exe") else {
        eprintln!(
            "sim: incorrect filename suffix '{}' (expected .exe)",
            args.exefile
        );
        return ExitCode::FAILURE;
    };

    // refuse to run an executable older than its source
    let asmfile = format!("{stem}.s");
    if let (Ok(asm_meta), Ok(exe_meta)) =
        (std::fs::metadata(&asmfile), std::fs::metadata(&args.exefile))
    {
        if let (Ok(asm_time), Ok(exe_time)) =
            (asm_meta.modified(), exe_meta.modified())
        {
            if asm_time > exe_time {
                eprintln!("sim: executable is out of date !");
                eprintln!("please rebuild it with the following command:");
                eprintln!("    asm {asmfile}");
                return ExitCode::FAILURE;
            }
        }
    }

    let image = match Image::load(Path::new(&args.exefile)) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("{}: {e}", args.exefile);
            return ExitCode::FAILURE;
        }
    };
    let ram = Ram::from_image(&image, seed_from_name(&args.exefile));

    let lstfile = format!("{stem}.lst");
    let listing = match Listing::from_file(Path::new(&lstfile)) {
        Ok(listing) => listing,
        Err(_) => {
            println!("warning: could not load symbols (no .lst listing)");
            Listing::empty()
        }
    };

    install_sigint_flag();

    let machine = Machine::new(ram, listing);
    let mut debugger = Debugger::new(machine, !args.quiet);
    if let Some(addr) = args.breakpoint {
        if let Err(e) = debugger.add_breakpoint(addr) {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    }
    debugger.repl();
    ExitCode::SUCCESS
}
