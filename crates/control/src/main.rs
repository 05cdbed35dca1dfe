//! launcher-control
//!
//! Sends one command to a Dream Cheeky launcher, waits, then sends STOP.

mod args;
mod node;
mod sequence;

use anyhow::{Context, Result};
use args::{Args, usage};
use node::DeviceNode;
use sequence::{ThreadSleep, run_sequence};
use std::ffi::OsString;
use std::process::ExitCode;
use tracing::warn;

fn main() -> ExitCode {
    let argv: Vec<OsString> = std::env::args_os().collect();
    let name = argv
        .first()
        .map(|arg| arg.to_string_lossy().into_owned())
        .unwrap_or_else(|| "launcher-control".to_string());

    if argv.len() < 2 {
        eprint!("{}", usage(&name));
        return ExitCode::FAILURE;
    }

    let args = match Args::try_parse_ordered(&argv) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{}: {}", name, e.kind());
            eprint!("{}", usage(&name));
            return ExitCode::FAILURE;
        }
    };

    if args.help {
        eprint!("{}", usage(&name));
        return ExitCode::FAILURE;
    }

    if let Err(e) = common::setup_logging("warn") {
        warn!("{}", e);
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    if let Some(duration) = args.duration {
        println!("Duration set to {}", duration);
    }

    let mut node = DeviceNode::open(&args.node)
        .with_context(|| format!("Couldn't open {}", args.node.display()))?;

    run_sequence(
        &mut node,
        &mut ThreadSleep,
        args.command(),
        args.stop_delay(),
        |command, e| {
            eprintln!(
                "Could not send command {} to {} ({})",
                command,
                args.node.display(),
                e
            )
        },
    );

    Ok(())
}
