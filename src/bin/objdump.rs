use std::path::Path;
use std::process::ExitCode;

use clap::Parser;

use scat::exe::Image;
use scat::objdump::disassemble;

/// Disassemble a SCAT executable
///
/// Prints the contents of EXEFILE in the same layout as an assembler
/// listing, reconstructing labels from PC-relative operands and
/// recognizing common pseudo-instruction idioms (bra, jmp, call, ret,
/// push, pop). Words that do not decode to an instruction are shown as
/// data.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Args {
    /// Path to the executable file
    #[arg(value_name = "EXEFILE")]
    exefile: String,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    if !Path::new(&args.exefile).exists() {
        eprintln!("objdump: cannot find file '{}'", args.exefile);
        return ExitCode::FAILURE;
    }
    if !args.exefile.ends_with(".exe") {
        eprintln!("objdump: incorrect filename '{}'", args.exefile);
        return ExitCode::FAILURE;
    }

    match Image::load(Path::new(&args.exefile)) {
        Ok(image) => {
            print!("{}", disassemble(&image));
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {e}", args.exefile);
            ExitCode::FAILURE
        }
    }
}
