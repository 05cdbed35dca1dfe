//! Command bitmask
//!
//! A command is a single byte. Direction bits may be combined freely,
//! including opposite directions; the device decides what to do with them.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Desired motion/fire/stop bits sent in byte 1 of a [`crate::CommandFrame`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Command(u8);

impl Command {
    pub const DOWN: Command = Command(0x01);
    pub const UP: Command = Command(0x02);
    pub const LEFT: Command = Command(0x04);
    pub const RIGHT: Command = Command(0x08);
    pub const FIRE: Command = Command(0x10);
    pub const STOP: Command = Command(0x20);

    pub const UP_LEFT: Command = Command(0x02 | 0x04);
    pub const DOWN_LEFT: Command = Command(0x01 | 0x04);
    pub const UP_RIGHT: Command = Command(0x02 | 0x08);
    pub const DOWN_RIGHT: Command = Command(0x01 | 0x08);

    /// Bits that request movement or firing
    const ACTIVE: u8 = 0x01 | 0x02 | 0x04 | 0x08 | 0x10;

    /// Wrap a raw byte. No combination of bits is rejected.
    pub const fn from_bits(bits: u8) -> Self {
        Command(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    /// True if every bit of `other` is set in `self`
    pub const fn contains(self, other: Command) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    /// Clear the bits of `other`
    pub fn remove(&mut self, other: Command) {
        self.0 &= !other.0;
    }
}

impl Default for Command {
    fn default() -> Self {
        Command::STOP
    }
}

impl BitOr for Command {
    type Output = Command;

    fn bitor(self, rhs: Command) -> Command {
        Command(self.0 | rhs.0)
    }
}

impl BitOrAssign for Command {
    fn bitor_assign(&mut self, rhs: Command) {
        self.0 |= rhs.0;
    }
}

impl From<u8> for Command {
    fn from(bits: u8) -> Self {
        Command(bits)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(Command, &str); 6] = [
            (Command::UP, "up"),
            (Command::DOWN, "down"),
            (Command::LEFT, "left"),
            (Command::RIGHT, "right"),
            (Command::FIRE, "fire"),
            (Command::STOP, "stop"),
        ];

        let mut first = true;
        for (bit, name) in NAMES {
            if self.contains(bit) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }

        let unknown = self.0 & !(Self::ACTIVE | Command::STOP.0);
        if unknown != 0 || first {
            if !first {
                f.write_str("|")?;
            }
            write!(f, "{:#04x}", unknown)?;
        }
        Ok(())
    }
}
