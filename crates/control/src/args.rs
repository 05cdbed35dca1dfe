//! Command-line flags

use clap::parser::ValueSource;
use clap::{CommandFactory, FromArgMatches, Parser};
use protocol::Command;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

/// Command flags and the command each selects
const MNEMONICS: [(&str, Command); 6] = [
    ("fire", Command::FIRE),
    ("stop", Command::STOP),
    ("left", Command::LEFT),
    ("right", Command::RIGHT),
    ("up", Command::UP),
    ("down", Command::DOWN),
];

#[derive(Parser, Debug)]
#[command(name = "launcher-control", disable_help_flag = true, args_override_self = true)]
pub struct Args {
    /// Missile launcher node
    #[arg(short = 'm', value_name = "NODE", default_value = protocol::DEFAULT_NODE)]
    pub node: PathBuf,

    /// Fire
    #[arg(short = 'f')]
    pub fire: bool,

    /// Stop
    #[arg(short = 's')]
    pub stop: bool,

    /// Turn left
    #[arg(short = 'l')]
    pub left: bool,

    /// Turn right
    #[arg(short = 'r')]
    pub right: bool,

    /// Turn up
    #[arg(short = 'u')]
    pub up: bool,

    /// Turn down
    #[arg(short = 'd')]
    pub down: bool,

    /// Milliseconds to wait before sending STOP
    #[arg(short = 't', value_name = "MSECS")]
    pub duration: Option<u64>,

    /// Display help
    #[arg(short = 'h')]
    pub help: bool,

    /// Command flags in command-line order
    #[arg(skip)]
    pub mnemonics: Vec<Command>,
}

impl Args {
    /// Default stop delay
    pub const DEFAULT_DURATION: Duration = Duration::from_millis(500);

    /// Parse `argv`, keeping the order the command flags were given in
    pub fn try_parse_ordered<I, T>(argv: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = <Self as CommandFactory>::command().try_get_matches_from(argv)?;
        let mut args = Self::from_arg_matches(&matches)?;

        let mut given: Vec<(usize, Command)> = MNEMONICS
            .iter()
            .filter(|(id, _)| matches.value_source(id) == Some(ValueSource::CommandLine))
            .filter_map(|(id, command)| Some((matches.index_of(id)?, *command)))
            .collect();
        given.sort_by_key(|(index, _)| *index);
        args.mnemonics = given.into_iter().map(|(_, command)| command).collect();

        Ok(args)
    }

    /// Command selected by the flags; STOP if none.
    ///
    /// Fire and stop replace everything before them. Directions combine with
    /// each other, and a direction after fire or stop starts over.
    pub fn command(&self) -> Command {
        let mut command = Command::STOP;
        let mut moving = false;

        for &flag in &self.mnemonics {
            if flag == Command::FIRE || flag == Command::STOP {
                command = flag;
                moving = false;
            } else if moving {
                command |= flag;
            } else {
                command = flag;
                moving = true;
            }
        }
        command
    }

    pub fn stop_delay(&self) -> Duration {
        self.duration
            .map(Duration::from_millis)
            .unwrap_or(Self::DEFAULT_DURATION)
    }
}

/// Usage text printed on every usage error
pub fn usage(name: &str) -> String {
    format!(
        "Usage: {name} [-mfslrudh] [-t <msecs>]\n\
         \t-m\tmissile launcher [{node}]\n\
         \t-f\tfire\n\
         \t-s\tstop\n\
         \t-l\tturn left\n\
         \t-r\tturn right\n\
         \t-u\tturn up\n\
         \t-d\tturn down\n\
         \t-t\tspecify duration to wait before sending STOP in milliseconds\n\
         \t-h\tdisplay this help\n\n\
         Notes:\n\
         \tDirections of the two axes can be combined, e.g. '-lu' moves\n\
         \tthe missile launcher up and left at the same time.\n",
        node = protocol::DEFAULT_NODE
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_ordered(std::iter::once("launcher-control").chain(args.iter().copied()))
    }

    #[test]
    fn test_single_mnemonics() {
        assert_eq!(parse(&["-f"]).unwrap().command(), Command::FIRE);
        assert_eq!(parse(&["-s"]).unwrap().command(), Command::STOP);
        assert_eq!(parse(&["-l"]).unwrap().command(), Command::LEFT);
        assert_eq!(parse(&["-r"]).unwrap().command(), Command::RIGHT);
        assert_eq!(parse(&["-u"]).unwrap().command(), Command::UP);
        assert_eq!(parse(&["-d"]).unwrap().command(), Command::DOWN);
    }

    #[test]
    fn test_axes_combine() {
        assert_eq!(parse(&["-lu"]).unwrap().command(), Command::UP_LEFT);
        assert_eq!(parse(&["-r", "-d"]).unwrap().command(), Command::DOWN_RIGHT);
    }

    #[test]
    fn test_no_command_flag_is_stop() {
        let args = parse(&["-t", "100"]).unwrap();
        assert_eq!(args.command(), Command::STOP);
        assert_eq!(args.stop_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["-s"]).unwrap();
        assert_eq!(args.node, PathBuf::from("/dev/launcher0"));
        assert_eq!(args.duration, None);
        assert_eq!(args.stop_delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_node_flag() {
        let args = parse(&["-m", "/run/launcher/launcher1", "-f"]).unwrap();
        assert_eq!(args.node, PathBuf::from("/run/launcher/launcher1"));
    }

    #[test]
    fn test_last_mnemonic_wins() {
        assert_eq!(parse(&["-f", "-s"]).unwrap().command(), Command::STOP);
        assert_eq!(parse(&["-s", "-f"]).unwrap().command(), Command::FIRE);
        assert_eq!(parse(&["-l", "-f"]).unwrap().command(), Command::FIRE);
        assert_eq!(parse(&["-f", "-l"]).unwrap().command(), Command::LEFT);
        assert_eq!(parse(&["-u", "-s", "-r"]).unwrap().command(), Command::RIGHT);
        assert_eq!(parse(&["-fs"]).unwrap().command(), Command::STOP);
    }

    #[test]
    fn test_repeated_flag_accepted() {
        assert_eq!(parse(&["-l", "-l"]).unwrap().command(), Command::LEFT);
        assert_eq!(parse(&["-f", "-s", "-f"]).unwrap().command(), Command::FIRE);
    }

    #[test]
    fn test_bad_duration_rejected() {
        assert!(parse(&["-t", "soon"]).is_err());
        assert!(parse(&["-x"]).is_err());
    }

    #[test]
    fn test_usage_lists_flags() {
        let text = usage("launcher-control");
        assert!(text.starts_with("Usage: launcher-control [-mfslrudh] [-t <msecs>]"));
        assert!(text.contains("[/dev/launcher0]"));
    }
}
