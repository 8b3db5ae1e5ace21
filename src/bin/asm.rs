use std::fs;
use std::path::Path;
use std::process::ExitCode;

use clap::Parser;

use scat::asm::assemble;

/// Assemble a SCAT source file
///
/// Compiles ASMFILE into two sibling files: `<name>.exe`, the flat
/// executable image loaded by the simulator, and `<name>.lst`, a
/// human-readable listing mapping addresses back to source lines.
/// Any previous copies are removed first so a failed build does not
/// leave stale outputs behind.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Args {
    /// Path to input file
    #[arg(value_name = "ASMFILE")]
    asmfile: String,

    /// Write output to files but not to the screen
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    if !Path::new(&args.asmfile).exists() {
        eprintln!("asm: cannot find file '{}'", args.asmfile);
        return ExitCode::FAILURE;
    }
    let Some(stem) = args.asmfile.strip_suffix(".s") else {
        eprintln!(
            "asm: incorrect filename suffix '{}' (expected .s)",
            args.asmfile
        );
        return ExitCode::FAILURE;
    };
    let exefile = format!("{stem}.exe");
    let lstfile = format!("{stem}.lst");

    // remove old files to reduce confusion in case of a syntax error
    let _ = fs::remove_file(&exefile);
    let _ = fs::remove_file(&lstfile);

    let source = match fs::read_to_string(&args.asmfile) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("asm: cannot read '{}': {e}", args.asmfile);
            return ExitCode::FAILURE;
        }
    };

    let exe = match assemble(&source) {
        Ok(exe) => exe,
        Err(diagnostic) => {
            println!(
                "{}:{}: {}",
                args.asmfile, diagnostic.line, diagnostic.error
            );
            let source_line = source
                .lines()
                .nth(diagnostic.line.saturating_sub(1))
                .unwrap_or("");
            println!("line {}: {}", diagnostic.line, source_line);
            return ExitCode::FAILURE;
        }
    };

    let source_lines: Vec<&str> = source.lines().collect();
    let listing = exe.listing(&source_lines);

    if let Err(e) = fs::write(&exefile, exe.encode_text() + "\n") {
        eprintln!("asm: cannot write '{exefile}': {e}");
        return ExitCode::FAILURE;
    }
    if let Err(e) = fs::write(&lstfile, listing.clone() + "\n") {
        eprintln!("asm: cannot write '{lstfile}': {e}");
        return ExitCode::FAILURE;
    }

    if !args.quiet {
        println!("{listing}");
    }
    ExitCode::SUCCESS
}
