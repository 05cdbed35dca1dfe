//! Command, wait, STOP

use protocol::Command;
use std::io::{self, Write};
use std::time::Duration;
use tracing::debug;

/// Extra wait after a successful FIRE so the shot completes before STOP
pub const FIRE_WAIT: Duration = Duration::from_secs(5);

/// Something that can wait
pub trait Pause {
    fn pause(&mut self, duration: Duration);
}

/// Waits by sleeping the current thread
pub struct ThreadSleep;

impl Pause for ThreadSleep {
    fn pause(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Write `command` as a single byte
pub fn send_command<W: Write>(node: &mut W, command: Command) -> io::Result<()> {
    debug!("sending {}", command);
    node.write_all(&[command.bits()])?;
    node.flush()
}

/// Send `command`, wait `delay`, send STOP.
///
/// A failed write is reported through `on_error` and does not stop the
/// sequence. FIRE waits an extra [`FIRE_WAIT`] only if its write went through.
pub fn run_sequence<W, P, E>(node: &mut W, pause: &mut P, command: Command, delay: Duration, mut on_error: E)
where
    W: Write,
    P: Pause,
    E: FnMut(Command, &io::Error),
{
    match send_command(node, command) {
        Ok(()) if command == Command::FIRE => pause.pause(FIRE_WAIT),
        Ok(()) => {}
        Err(e) => on_error(command, &e),
    }

    pause.pause(delay);

    if let Err(e) = send_command(node, Command::STOP) {
        on_error(Command::STOP, &e);
    }
}
