//! Line grammar for the interactive sequencer console.
//!
//! Commands are a case-insensitive keyword followed by whitespace separated
//! arguments. Durations are decimal integers with an optional `us`, `ms` or
//! `s` suffix; a bare number is read as microseconds to match the virtual
//! clock resolution.

use core::fmt;
use core::time::Duration;

use winnow::ascii::{dec_uint, space0, space1};
use winnow::combinator::{alt, delimited, eof, opt, preceded};
use winnow::token::take_while;
use winnow::{ModalResult, Parser};

/// Spacing between toggles when `bounce` omits its gap.
pub const DEFAULT_BOUNCE_GAP: Duration = Duration::from_micros(50);

/// Command keywords, also used as `help` topics.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CommandKeyword {
    Press,
    Release,
    Bounce,
    Advance,
    Run,
    Status,
    History,
    Reset,
    Help,
}

impl CommandKeyword {
    /// Every keyword in the order `help` lists them.
    pub const ALL: [CommandKeyword; 9] = [
        CommandKeyword::Press,
        CommandKeyword::Release,
        CommandKeyword::Bounce,
        CommandKeyword::Advance,
        CommandKeyword::Run,
        CommandKeyword::Status,
        CommandKeyword::History,
        CommandKeyword::Reset,
        CommandKeyword::Help,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            CommandKeyword::Press => "press",
            CommandKeyword::Release => "release",
            CommandKeyword::Bounce => "bounce",
            CommandKeyword::Advance => "advance",
            CommandKeyword::Run => "run",
            CommandKeyword::Status => "status",
            CommandKeyword::History => "history",
            CommandKeyword::Reset => "reset",
            CommandKeyword::Help => "help",
        }
    }

    /// Usage line and one-sentence description.
    #[must_use]
    pub const fn summary(self) -> (&'static str, &'static str) {
        match self {
            CommandKeyword::Press => ("press", "pull the button low"),
            CommandKeyword::Release => ("release", "let the button float high"),
            CommandKeyword::Bounce => (
                "bounce <count> [<gap>]",
                "toggle the button <count> times, <gap> apart (default 50us)",
            ),
            CommandKeyword::Advance => (
                "advance <duration>",
                "move the virtual clock, firing any dwell that expires",
            ),
            CommandKeyword::Run => ("run", "fire armed dwells until the timer is idle"),
            CommandKeyword::Status => ("status", "show state, drive level, button and timer"),
            CommandKeyword::History => ("history", "dump the telemetry ring"),
            CommandKeyword::Reset => ("reset", "power-cycle the simulated board"),
            CommandKeyword::Help => ("help [topic]", "list commands or describe one"),
        }
    }

    /// Case-insensitive keyword lookup.
    #[must_use]
    pub fn from_word(word: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|keyword| keyword.name().eq_ignore_ascii_case(word))
    }
}

impl fmt::Display for CommandKeyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parsed console command.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConsoleCommand {
    Press,
    Release,
    Bounce { transitions: u8, gap: Duration },
    Advance(Duration),
    Run,
    Status,
    History,
    Reset,
    Help(Option<CommandKeyword>),
}

/// Rejected console line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ParseError {
    /// Byte offset where parsing stopped.
    pub offset: usize,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecognised input at column {}", self.offset + 1)
    }
}

/// Parses one console line.
pub fn parse(line: &str) -> Result<ConsoleCommand, ParseError> {
    command_line.parse(line).map_err(|err| ParseError {
        offset: err.offset(),
    })
}

fn command_line(input: &mut &str) -> ModalResult<ConsoleCommand> {
    delimited(space0, command, (space0, eof)).parse_next(input)
}

fn command(input: &mut &str) -> ModalResult<ConsoleCommand> {
    match keyword.parse_next(input)? {
        CommandKeyword::Press => Ok(ConsoleCommand::Press),
        CommandKeyword::Release => Ok(ConsoleCommand::Release),
        CommandKeyword::Bounce => (
            preceded(space1, dec_uint),
            opt(preceded(space1, duration)),
        )
            .map(|(transitions, gap): (u8, Option<Duration>)| ConsoleCommand::Bounce {
                transitions,
                gap: gap.unwrap_or(DEFAULT_BOUNCE_GAP),
            })
            .parse_next(input),
        CommandKeyword::Advance => preceded(space1, duration)
            .map(ConsoleCommand::Advance)
            .parse_next(input),
        CommandKeyword::Run => Ok(ConsoleCommand::Run),
        CommandKeyword::Status => Ok(ConsoleCommand::Status),
        CommandKeyword::History => Ok(ConsoleCommand::History),
        CommandKeyword::Reset => Ok(ConsoleCommand::Reset),
        CommandKeyword::Help => opt(preceded(space1, keyword))
            .map(ConsoleCommand::Help)
            .parse_next(input),
    }
}

fn keyword(input: &mut &str) -> ModalResult<CommandKeyword> {
    take_while(1.., |c: char| c.is_ascii_alphabetic())
        .verify_map(CommandKeyword::from_word)
        .parse_next(input)
}

fn duration(input: &mut &str) -> ModalResult<Duration> {
    (dec_uint::<_, u64, _>, opt(alt(("us", "ms", "s"))))
        .map(|(value, unit)| match unit {
            Some("s") => Duration::from_secs(value),
            Some("ms") => Duration::from_millis(value),
            _ => Duration::from_micros(value),
        })
        .parse_next(input)
}
