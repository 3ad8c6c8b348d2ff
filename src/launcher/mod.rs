pub mod config;
mod errors;

use std::{ffi::OsString, io::Write};

use clap::{error::ErrorKind, Parser};
use log::debug;

pub use config::{Configuration, USAGE};
pub use errors::{LaunchError, UsageError, USAGE_EXIT_CODE};

use crate::server::Serve;

/// Port pair handed to the server once the command line is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ports {
    pub input: u16,
    pub output: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Help,
    Serve(Ports),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Help,
    Served,
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        0
    }
}

/// Parses the arguments that follow the program name.
///
/// A value that does not fit a port (`-i abc`, `-o 70000`) is rejected the
/// same way an unknown flag is. Repeated options keep the last value. `-h`
/// anywhere among the options wins over any other error.
pub fn parse_args<I, T>(argv: I) -> Result<Invocation, UsageError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let argv: Vec<OsString> = argv.into_iter().map(Into::into).collect();

    let command_line = std::iter::once(OsString::from("ipcamera")).chain(argv.iter().cloned());

    let config = match Configuration::try_parse_from(command_line) {
        Ok(config) => config,
        Err(err) if err.kind() == ErrorKind::DisplayHelp => return Ok(Invocation::Help),
        Err(_) if help_requested(&argv) => return Ok(Invocation::Help),
        Err(err) => return Err(err.into()),
    };

    if !config.operands.is_empty() {
        debug!("Ignoring operands {:?}", config.operands);
    }

    Ok(Invocation::Serve(Ports {
        input: config.input_port,
        output: config.output_port,
    }))
}

/// Looks for `-h` in the option part of `argv`, the way getopt would walk it.
///
/// Scanning ends at `--` or the first operand. The token following a bare
/// `-i`/`-o`/`--iport`/`--oport` is their value and is skipped.
fn help_requested(argv: &[OsString]) -> bool {
    let mut tokens = argv.iter().map(|token| token.to_string_lossy());

    while let Some(token) = tokens.next() {
        if token == "--" || token == "-" || !token.starts_with('-') {
            return false;
        }

        if let Some(long) = token.strip_prefix("--") {
            if long == "iport" || long == "oport" {
                tokens.next();
            }
            continue;
        }

        for (position, flag) in token.char_indices().skip(1) {
            match flag {
                'h' => return true,
                'i' | 'o' => {
                    if position + flag.len_utf8() == token.len() {
                        tokens.next();
                    }
                    break;
                }
                _ => {}
            }
        }
    }

    false
}

/// Parses `argv` and hands the ports to `server`.
///
/// The usage line goes to `out` both for `-h` and for a rejected command
/// line; the server is only called when parsing succeeds.
pub fn launch<I, T, S, W>(argv: I, server: &S, out: &mut W) -> Result<Outcome, LaunchError>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    S: Serve + ?Sized,
    W: Write,
{
    let ports = match parse_args(argv) {
        Ok(Invocation::Serve(ports)) => ports,
        Ok(Invocation::Help) => {
            writeln!(out, "{USAGE}")?;
            return Ok(Outcome::Help);
        }
        Err(err) => {
            writeln!(out, "{USAGE}")?;
            return Err(err.into());
        }
    };

    debug!(
        "Starting camera server, input port {}, output port {}",
        ports.input, ports.output
    );

    server.serve(ports.input, ports.output)?;

    Ok(Outcome::Served)
}
