//! Interactive debugger
//!
//! A line-oriented REPL driving the machine: breakpoints, stepping,
//! continuing until something interesting happens, and state
//! inspection. Commands are dispatched through a table so `help` can
//! enumerate names, aliases and documentation in one place.
//!
//! Two error kinds reach the loop and both return to the prompt:
//! simulation errors from the CPU or bus (printed with the faulting
//! PC), and user-input errors (printed as-is).

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use itertools::Itertools;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use thiserror::Error;

use crate::bus::Machine;
use crate::cpu::SimError;
use crate::utils::{eng, time2s};

/// Set by the SIGINT handler; checked between instruction steps so
/// Ctrl+C interrupts a `continue` without killing the simulator
pub static INTERRUPT: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct UserError(pub String);

#[derive(Debug, Error)]
enum CmdError {
    #[error(transparent)]
    Sim(#[from] SimError),
    #[error(transparent)]
    User(#[from] UserError),
}

type CmdResult = Result<(), CmdError>;

struct Command {
    /// First name is the canonical one, the rest are aliases
    names: &'static [&'static str],
    run: fn(&mut Debugger, &[&str]) -> CmdResult,
    /// First line is the summary shown by the help menu
    help: &'static str,
}

const COMMANDS: &[Command] = &[
    Command {
        names: &["breakpoint", "break", "b"],
        run: Debugger::cmd_breakpoint,
        help: "Pause execution at certain points in the program.\n\
               \n\
               Usage: 'breakpoint <labelname>' or 'breakpoint <0x1234>'\n\
               Place a breakpoint at specified location (label name or \
               numeric address)",
    },
    Command {
        names: &["continue", "cont", "run", "c"],
        run: Debugger::cmd_continue,
        help: "Resume execution.\n\
               \n\
               Execute the simulated program until either:\n\
               - the PC register reaches a breakpoint\n\
               - the cpu halts (defined as: loops on a single instruction)\n\
               - the user presses Ctrl+C",
    },
    Command {
        names: &["help", "h"],
        run: Debugger::cmd_help,
        help: "Print help screen.\n\
               \n\
               Without arguments, print the list of available commands.\n\
               With a command name, print help text about that command.",
    },
    Command {
        names: &["info", "i", "where", "w", "list", "l"],
        run: Debugger::cmd_info,
        help: "Get info about program state.\n\
               \n\
               This command will print:\n\
               - values in all CPU registers (as hexadecimal and decimal)\n\
               - contents of memory around the address pointed to by PC\n\
               - active breakpoints (if any)",
    },
    Command {
        names: &["memdump", "md", "memory", "mem"],
        run: Debugger::cmd_memdump,
        help: "Show contents of memory.\n\
               \n\
               Usage: 'memdump <location>' or 'memdump <location> <length>'\n\
               Read <length> bytes from memory starting at <location> \
               (label name\nor numeric address) and display their values.",
    },
    Command {
        names: &["perf"],
        run: Debugger::cmd_perf,
        help: "Show simulator performance.\n\
               \n\
               Usage: 'perf on' or 'perf off'\n\
               When the profiler is enabled, the simulator measures and \
               displays execution speed.",
    },
    Command {
        names: &["quit"],
        run: Debugger::cmd_quit,
        help: "Exit the simulator.\n\
               \n\
               Stop execution and return to the shell.\n\
               You can also press Ctrl+D.",
    },
    Command {
        names: &["registers", "reg", "regs"],
        run: Debugger::cmd_regs,
        help: "Display contents of the CPU registers.",
    },
    Command {
        names: &["screen"],
        run: Debugger::cmd_screen,
        help: "Display the simulated screen.\n\
               \n\
               Video memory is mapped from 0xB0000000 to 0xB0004AFF \
               (19200 bytes).\n\
               The screen size (in pixels) is 80 columns by 60 lines.\n\
               Each pixel is accessible as a 32-bit word: RRGGBBxx \
               (the last byte is ignored)",
    },
    Command {
        names: &["step", "s"],
        run: Debugger::cmd_step,
        help: "Execute one program instruction.\n\
               \n\
               Usage: 'step' or 'step N'\n\
               Execute just one, or N, instructions.\n\
               \n\
               Note: Press RETURN (on a blank line) after a 'step' to \
               repeat the command.",
    },
    Command {
        names: &["verbose", "v"],
        run: Debugger::cmd_verbose,
        help: "Always display program info.\n\
               \n\
               Usage: 'verbose on' or 'verbose off' or just 'verbose' \
               to toggle.\n\
               When in verbose mode, program state is displayed after \
               each step/run.",
    },
];

fn find_command(name: &str) -> Option<&'static Command> {
    COMMANDS.iter().find(|cmd| cmd.names.contains(&name))
}

/// Parse a plain number: hex with `0x`, or decimal without leading
/// zeros
fn parse_number(text: &str) -> Result<u32, UserError> {
    if let Some(digits) = text.strip_prefix("0x") {
        if !digits.is_empty()
            && digits.chars().all(|c| c.is_ascii_hexdigit())
        {
            return u32::from_str_radix(digits, 16).map_err(|_| {
                UserError(format!("error: number is too large '{text}'"))
            });
        }
    } else if text == "0" {
        return Ok(0);
    } else if text.chars().all(|c| c.is_ascii_digit())
        && !text.is_empty()
    {
        if text.starts_with('0') {
            return Err(UserError(
                "error: leading zeroes not allowed in decimal notation"
                    .to_string(),
            ));
        }
        return text.parse().map_err(|_| {
            UserError(format!("error: number is too large '{text}'"))
        });
    }
    Err(UserError(format!("error: cannot understand number '{text}'")))
}

pub struct Debugger {
    machine: Machine,
    breakpoints: Vec<u32>,
    verbose: bool,
    perf_enabled: bool,
}

impl Debugger {
    pub fn new(machine: Machine, verbose: bool) -> Self {
        Self { machine, breakpoints: Vec::new(), verbose, perf_enabled: false }
    }

    /// A location argument: label name or numeric address
    fn parse_location(&self, text: &str) -> Result<u32, UserError> {
        if text
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        {
            return self
                .machine
                .devices
                .listing
                .lookup(text)
                .ok_or_else(|| {
                    UserError(format!("error: cannot find symbol '{text}'"))
                });
        }
        parse_number(text)
    }

    fn aas(&self, addr: u32) -> String {
        self.machine.devices.ram.aas(addr)
    }

    /// Place a breakpoint before the session starts (the `-b` command
    /// line option)
    pub fn add_breakpoint(&mut self, addr: u32) -> Result<(), UserError> {
        self.insert_breakpoint(addr).map(|msg| println!("{msg}"))
    }

    fn insert_breakpoint(&mut self, target: u32) -> Result<String, UserError> {
        if target % 4 != 0 {
            return Err(UserError(format!(
                "error: target address is not a multiple of 4: 0x{}",
                self.aas(target)
            )));
        }
        if self.breakpoints.contains(&target) {
            return Err(UserError(format!(
                "error: a breakpoint was already defined at address 0x{}",
                self.aas(target)
            )));
        }
        self.breakpoints.push(target);
        Ok(format!(
            "new breakpoint placed at address 0x{}",
            self.aas(target)
        ))
    }

    fn cmd_breakpoint(&mut self, words: &[&str]) -> CmdResult {
        if words.len() != 2 {
            return Err(UserError(
                "error: no target. usage: 'break labelname' or 'break 0x1234'"
                    .to_string(),
            )
            .into());
        }
        let target = self.parse_location(words[1])?;
        let message = self.insert_breakpoint(target)?;
        println!("{message}");
        Ok(())
    }

    fn cmd_continue(&mut self, _words: &[&str]) -> CmdResult {
        INTERRUPT.store(false, Ordering::SeqCst);
        let started = Instant::now();
        let mut executed = 0u64;
        let mut hinted = false;
        loop {
            if INTERRUPT.swap(false, Ordering::SeqCst) {
                println!();
                self.perf_report(executed, started);
                if !self.verbose {
                    // prevent info from being displayed twice
                    self.cmd_info(&[])?;
                }
                break;
            }
            let old_pc = self.machine.pc();
            self.machine.step()?;
            executed += 1;
            let new_pc = self.machine.pc();
            if self.breakpoints.contains(&new_pc) {
                self.perf_report(executed, started);
                println!(
                    "0x{}: CPU reached a breakpoint",
                    self.aas(new_pc)
                );
                break;
            }
            if new_pc == old_pc {
                self.perf_report(executed, started);
                println!("0x{}: CPU halted", self.aas(new_pc));
                break;
            }
            if !hinted && started.elapsed() > Duration::from_millis(500) {
                hinted = true;
                println!("Running. Press Ctrl+C to interrupt...");
            }
        }
        Ok(())
    }

    fn perf_report(&self, executed: u64, started: Instant) {
        if !self.perf_enabled {
            return;
        }
        let elapsed = started.elapsed().as_secs_f64().max(1e-9);
        println!(
            "executed {} instructions in {} i.e. {} instructions per second",
            eng(executed as f64),
            time2s(elapsed),
            eng(executed as f64 / elapsed)
        );
    }

    fn cmd_help(&mut self, words: &[&str]) -> CmdResult {
        if words.len() == 1 {
            println!("Available commands:");
            let width = COMMANDS
                .iter()
                .map(|cmd| cmd.names[0].len())
                .max()
                .expect("the command table is not empty");
            let mut sorted: Vec<&Command> = COMMANDS.iter().collect();
            sorted.sort_by_key(|cmd| cmd.names[0]);
            for cmd in sorted {
                let summary = cmd.help.lines().next().unwrap_or("");
                println!("  {:width$}: {summary}", cmd.names[0]);
            }
            println!("Type 'help <cmdname>' for more details about a command");
            return Ok(());
        }

        let Some(cmd) = find_command(words[1]) else {
            println!("help: unknown command: '{}'.", words[1]);
            println!("Type 'help' with no arguments for the help menu");
            return Ok(());
        };
        if cmd.names.len() == 1 {
            println!("Command: '{}'", cmd.names[0]);
        } else {
            println!(
                "Command: '{}' (other names: {})",
                cmd.names[0],
                cmd.names[1..].join(", ")
            );
        }
        println!("{}", cmd.help);
        Ok(())
    }

    fn cmd_info(&mut self, _words: &[&str]) -> CmdResult {
        println!("{}", self.machine.cpu.dump_regs());
        let pc = self.machine.pc();
        if !self.machine.devices.listing.is_empty() {
            if let Some(block) = self.machine.devices.listing.near(pc) {
                println!("{block}");
            }
        } else {
            println!("memory view near PC:");
            self.memdump(pc, 16);
        }

        if !self.breakpoints.is_empty() {
            if self.machine.devices.listing.is_empty() {
                let addresses = self
                    .breakpoints
                    .iter()
                    .map(|&b| format!("0x{}", self.aas(b)))
                    .join(", ");
                println!("Active breakpoints: {addresses}");
            } else {
                println!("Active breakpoints:");
                for &b in &self.breakpoints {
                    match self.machine.devices.listing.line_at(b) {
                        Some(line) => println!("{line}"),
                        None => println!("0x{}", self.aas(b)),
                    }
                }
            }
        }
        Ok(())
    }

    fn memdump(&mut self, base: u32, length: u32) {
        let end = base.saturating_add(length);
        let mut line_addr = base;
        while line_addr < end {
            print!("{}: ", self.aas(line_addr));
            for addr in line_addr..line_addr.saturating_add(4).min(end) {
                print!("{:02x} ", self.machine.devices.ram.read(addr, 1));
            }
            println!();
            line_addr = line_addr.saturating_add(4);
            if line_addr == u32::MAX {
                break;
            }
        }
    }

    fn cmd_memdump(&mut self, words: &[&str]) -> CmdResult {
        if words.len() == 1 {
            return Err(UserError(
                "error: no target address. usage: 'memdump labelname' or \
                 'memdump 0x1234'"
                    .to_string(),
            )
            .into());
        }
        if words.len() > 3 {
            return Err(
                UserError("error: too many arguments".to_string()).into()
            );
        }
        let base = self.parse_location(words[1])?;
        let mut length = 16;
        if words.len() == 3 {
            length = parse_number(words[2])?;
            if length == 0 {
                return Err(
                    UserError("error: size too small".to_string()).into()
                );
            }
        }
        self.memdump(base, length);
        Ok(())
    }

    fn cmd_perf(&mut self, words: &[&str]) -> CmdResult {
        let wanted = match words.get(1) {
            None => !self.perf_enabled,
            Some(&"on") => true,
            Some(&"off") => false,
            Some(_) => {
                return Err(UserError(
                    "error: usage 'perf on' or 'perf off'".to_string(),
                )
                .into())
            }
        };
        self.perf_enabled = wanted;
        println!(
            "performance profiler: {}",
            if wanted { "on" } else { "off" }
        );
        Ok(())
    }

    fn cmd_quit(&mut self, _words: &[&str]) -> CmdResult {
        self.machine.devices.screen.close();
        std::process::exit(0);
    }

    fn cmd_regs(&mut self, _words: &[&str]) -> CmdResult {
        println!("{}", self.machine.cpu.dump_regs());
        Ok(())
    }

    fn cmd_screen(&mut self, _words: &[&str]) -> CmdResult {
        if let Err(e) = self.machine.devices.screen.show() {
            println!("{e}");
        }
        Ok(())
    }

    fn cmd_step(&mut self, words: &[&str]) -> CmdResult {
        match words.len() {
            1 => {
                self.machine.step()?;
            }
            2 => {
                let count = parse_number(words[1])?;
                for _ in 0..count {
                    self.machine.step()?;
                    let pc = self.machine.pc();
                    if self.breakpoints.contains(&pc) {
                        println!(
                            "0x{}: CPU reached a breakpoint",
                            self.aas(pc)
                        );
                        break;
                    }
                }
            }
            _ => {
                return Err(UserError(
                    "error: too many arguments".to_string(),
                )
                .into())
            }
        }
        Ok(())
    }

    fn cmd_verbose(&mut self, words: &[&str]) -> CmdResult {
        let wanted = match words.get(1) {
            None => !self.verbose,
            Some(&"on") => true,
            Some(&"off") => false,
            Some(_) => {
                return Err(UserError(
                    "error: usage 'verbose on' or 'verbose off'".to_string(),
                )
                .into())
            }
        };
        self.verbose = wanted;
        println!("verbose mode: {}", if wanted { "on" } else { "off" });
        Ok(())
    }

    /// The main debugger loop. Returns when the user quits.
    pub fn repl(&mut self) {
        let mut editor = match DefaultEditor::new() {
            Ok(editor) => editor,
            Err(e) => {
                eprintln!("cannot initialize line editor: {e}");
                return;
            }
        };

        if self.verbose {
            let _ = self.cmd_info(&[]);
        }

        // a blank line repeats the previous step or continue, nothing
        // else
        let mut previous_step: Option<String> = None;
        let mut previous_continue: Option<String> = None;

        loop {
            let line = match editor.readline("(sim) ") {
                Ok(line) => line.trim().to_lowercase(),
                Err(ReadlineError::Eof) => {
                    println!();
                    "quit".to_string()
                }
                Err(ReadlineError::Interrupted) => {
                    println!();
                    continue;
                }
                Err(e) => {
                    eprintln!("input error: {e}");
                    return;
                }
            };

            let line = if line.is_empty() {
                match (&previous_step, &previous_continue) {
                    (Some(prev), _) => prev.clone(),
                    (None, Some(prev)) => prev.clone(),
                    (None, None) => continue,
                }
            } else {
                let _ = editor.add_history_entry(&line);
                line
            };

            let words: Vec<&str> = line.split_whitespace().collect();
            let Some(cmd) = find_command(words[0]) else {
                println!("Unknown command: {}", words[0]);
                println!("Type 'help' to know about available commands");
                continue;
            };

            let outcome = (cmd.run)(self, &words);
            let succeeded = match outcome {
                Ok(()) => true,
                Err(CmdError::Sim(e)) => {
                    println!("0x{}: {e}", self.aas(self.machine.pc()));
                    false
                }
                Err(CmdError::User(e)) => {
                    println!("{e}");
                    false
                }
            };

            let name = cmd.names[0];
            previous_step = (succeeded && name == "step")
                .then(|| line.clone());
            previous_continue = (succeeded && name == "continue")
                .then(|| line.clone());
            if succeeded
                && self.verbose
                && (name == "step" || name == "continue")
            {
                let _ = self.cmd_info(&[]);
            }
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::exe::Image;
    use crate::listing::Listing;
    use crate::ram::Ram;

    fn debugger(exe_text: &str, lst_text: &str) -> Debugger {
        let image = Image::parse(exe_text).unwrap();
        let listing = if lst_text.is_empty() {
            Listing::empty()
        } else {
            Listing::from_text(lst_text)
        };
        let machine = Machine::new(Ram::from_image(&image, 0), listing);
        Debugger::new(machine, false)
    }

    #[test]
    fn check_parse_number() {
        assert_eq!(parse_number("0"), Ok(0));
        assert_eq!(parse_number("42"), Ok(42));
        assert_eq!(parse_number("0x10"), Ok(16));
        assert!(parse_number("007").is_err());
        assert!(parse_number("nope").is_err());
        assert!(parse_number("0x").is_err());
        assert!(parse_number("-4").is_err());
    }

    #[test]
    fn check_parse_location() {
        let dbg = debugger(
            "20100005",
            "<main>:\n  00: 20 10 00 05    leti r1, 5",
        );
        assert_eq!(dbg.parse_location("main"), Ok(0));
        assert_eq!(dbg.parse_location("0x4"), Ok(4));
        assert!(dbg.parse_location("missing").is_err());
    }

    #[test]
    fn check_breakpoint_rules() {
        let mut dbg = debugger("20100005", "");
        dbg.insert_breakpoint(4).unwrap();
        // duplicates are rejected
        assert!(dbg.insert_breakpoint(4).is_err());
        // unaligned addresses are rejected
        assert!(dbg.insert_breakpoint(6).is_err());
        assert_eq!(dbg.breakpoints, vec![4]);
    }

    #[test]
    fn check_step_and_breakpoint_stop() {
        // leti r1,5 / leti r2,7 / bra -8
        let mut dbg = debugger("20100005\n20200007\n2ff0fff8", "");
        dbg.insert_breakpoint(4).unwrap();
        dbg.cmd_step(&["step", "10"]).unwrap();
        // stepping stopped at the breakpoint after one instruction
        assert_eq!(dbg.machine.pc(), 4);
        assert_eq!(dbg.machine.cpu.regs.get(1), 5);
        assert_eq!(dbg.machine.cpu.regs.get(2), 0);
    }

    #[test]
    fn check_continue_halts_on_tight_loop() {
        // leti r1,5 then bra +0 (loop on itself)
        let mut dbg = debugger("20100005\n2ff00000", "");
        dbg.cmd_continue(&["continue"]).unwrap();
        assert_eq!(dbg.machine.pc(), 4);
        assert_eq!(dbg.machine.cpu.regs.get(1), 5);
    }

    #[test]
    fn check_continue_stops_at_breakpoint() {
        let mut dbg = debugger("20100005\n20200007\n2ff00000", "");
        dbg.insert_breakpoint(8).unwrap();
        dbg.cmd_continue(&["continue"]).unwrap();
        assert_eq!(dbg.machine.pc(), 8);
    }

    #[test]
    fn check_simulation_error_is_reported_not_fatal() {
        // div r1, r2, r3 with r3 == 0
        let mut dbg = debugger("13123000", "");
        let err = dbg.cmd_step(&["step"]).unwrap_err();
        assert!(matches!(
            err,
            CmdError::Sim(SimError::DivisionByZero)
        ));
        // the machine is still usable
        assert_eq!(dbg.machine.pc(), 0);
    }
}
