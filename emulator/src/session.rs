use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use crossterm::style::Stylize;
use sequencer_core::console::{self, CommandKeyword, ConsoleCommand};
use sequencer_core::ports::Level;
use sequencer_core::sequencer::{Dispatch, IgnoreReason, SequencerConfig, TransitionCause};
use sequencer_core::sim::{SimBoard, SimInstant, TimedDispatch};
use sequencer_core::telemetry::{TelemetryPayload, TelemetryRecord, TelemetryRecorder};

/// Telemetry records kept by the session for `history`.
pub const HISTORY_CAPACITY: usize = 128;

/// Longest span `run` lets the virtual clock advance.
const RUN_LIMIT: Duration = Duration::from_secs(1);

/// Dwell table loaded into the simulated board.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TableChoice {
    Calibrated,
    Nominal,
}

impl TableChoice {
    pub fn from_tag(tag: &str) -> Result<Self, String> {
        if tag.eq_ignore_ascii_case("calibrated") {
            Ok(Self::Calibrated)
        } else if tag.eq_ignore_ascii_case("nominal") {
            Ok(Self::Nominal)
        } else {
            Err(format!("Unknown dwell table `{tag}`"))
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TableChoice::Calibrated => "calibrated",
            TableChoice::Nominal => "nominal",
        }
    }

    pub fn config(self) -> SequencerConfig {
        match self {
            TableChoice::Calibrated => SequencerConfig::calibrated(),
            TableChoice::Nominal => SequencerConfig::nominal(),
        }
    }
}

pub struct Session {
    table: TableChoice,
    board: SimBoard,
    telemetry: TelemetryRecorder<SimInstant, HISTORY_CAPACITY>,
    transcript: Option<TranscriptLogger>,
    color: bool,
}

impl Session {
    pub fn new(table: TableChoice) -> Self {
        let mut session = Self {
            table,
            board: SimBoard::powered(table.config()),
            telemetry: TelemetryRecorder::new(),
            transcript: None,
            color: false,
        };
        session.drain_dispatches();
        session
    }

    /// Session that mirrors every exchange into a transcript file.
    pub fn with_transcript(table: TableChoice, path: &Path) -> io::Result<Self> {
        let mut session = Self::new(table);
        session.transcript = Some(TranscriptLogger::new(path, table)?);
        Ok(session)
    }

    /// Enables ANSI colouring of drive levels.
    pub fn set_color(&mut self, color: bool) {
        self.color = color;
    }

    pub fn table(&self) -> TableChoice {
        self.table
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let now = self.board.now();
        if let Some(transcript) = self.transcript.as_mut() {
            transcript.append_line(now, TranscriptRole::Host, trimmed)?;
        }

        let lines = match console::parse(trimmed) {
            Ok(command) => self.execute(command),
            Err(err) => vec![format!("ERR syntax {err}")],
        };

        if let Some(transcript) = self.transcript.as_mut() {
            for line in &lines {
                transcript.append_line(now, TranscriptRole::Emulator, &strip_ansi(line))?;
            }
            transcript.flush()?;
        }
        Ok(lines)
    }

    fn execute(&mut self, command: ConsoleCommand) -> Vec<String> {
        match command {
            ConsoleCommand::Press => self.move_button(Level::Low),
            ConsoleCommand::Release => self.move_button(Level::High),
            ConsoleCommand::Bounce { transitions, gap } => {
                let mut lines = vec![format!(
                    "OK bounce {transitions}x gap={}",
                    format_duration_short(gap)
                )];
                // Drained per toggle; a long bounce outgrows the board's dispatch queue.
                for index in 0..transitions {
                    if index > 0 {
                        self.board.advance(gap);
                        lines.extend(self.drain_dispatches());
                    }
                    let next = self.board.button_level().toggled();
                    self.board.set_button(next);
                    lines.extend(self.drain_dispatches());
                }
                lines
            }
            ConsoleCommand::Advance(span) => {
                self.board.advance(span);
                let mut lines = self.drain_dispatches();
                lines.push(format!("OK now={}", self.board.now()));
                lines
            }
            ConsoleCommand::Run => {
                let settled = self.board.run_until_quiet(RUN_LIMIT);
                let mut lines = self.drain_dispatches();
                if settled {
                    lines.push(format!("OK quiet now={}", self.board.now()));
                } else {
                    lines.push(format!(
                        "ERR timer still armed after {}",
                        format_duration_short(RUN_LIMIT)
                    ));
                }
                lines
            }
            ConsoleCommand::Status => vec![self.describe_status()],
            ConsoleCommand::History => self.describe_history(),
            ConsoleCommand::Reset => {
                self.board = SimBoard::powered(self.table.config());
                self.telemetry.clear();
                let mut lines = vec![format!("OK reset table={}", self.table.label())];
                lines.extend(self.drain_dispatches());
                lines
            }
            ConsoleCommand::Help(topic) => describe_help(topic),
        }
    }

    fn move_button(&mut self, level: Level) -> Vec<String> {
        if self.board.button_level() == level {
            return vec![format!("OK button already {level}")];
        }
        self.board.set_button(level);
        self.drain_dispatches()
    }

    fn drain_dispatches(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(TimedDispatch { at, dispatch }) = self.board.pop_dispatch() {
            self.telemetry.record_dispatch(&dispatch, at);
            lines.push(self.describe_dispatch(at, &dispatch));
        }
        let dropped = self.board.take_dropped();
        if dropped > 0 {
            lines.push(format!("WARN {dropped} dispatches dropped before narration"));
        }
        lines
    }

    fn describe_dispatch(&self, at: SimInstant, dispatch: &Dispatch) -> String {
        match dispatch {
            Dispatch::Entered(transition) => {
                let dwell = transition
                    .dwell
                    .map_or_else(|| "-".to_string(), format_micros);
                format!(
                    "[{}] {} -> {} drive={} dwell={} ({})",
                    stamp(at),
                    transition.from,
                    transition.to,
                    self.paint(transition.drive),
                    dwell,
                    cause_label(transition.cause)
                )
            }
            Dispatch::Ignored { state, reason } => format!(
                "[{}] {} ignored {}",
                stamp(at),
                state,
                reason_label(*reason)
            ),
        }
    }

    fn describe_status(&self) -> String {
        let deadline = self
            .board
            .deadline()
            .map_or_else(|| "-".to_string(), |deadline| deadline.to_string());
        format!(
            "state={} drive={} button={} now={} deadline={} table={}",
            self.board.state(),
            self.paint(self.board.drive_level()),
            self.board.button_level(),
            self.board.now(),
            deadline,
            self.table.label()
        )
    }

    fn describe_history(&self) -> Vec<String> {
        if self.telemetry.is_empty() {
            return vec!["history empty".to_string()];
        }
        let mut lines = vec![format!("history ({} records)", self.telemetry.len())];
        lines.extend(self.telemetry.oldest_first().map(describe_record));
        lines
    }

    fn paint(&self, level: Level) -> String {
        match (self.color, level) {
            (false, _) => level.to_string(),
            (true, Level::Low) => "low".red().bold().to_string(),
            (true, Level::High) => "high".green().to_string(),
        }
    }
}

fn describe_record(record: &TelemetryRecord<SimInstant>) -> String {
    let detail = match record.details {
        TelemetryPayload::Transition(details) => {
            let elapsed = details
                .elapsed_since_previous
                .map_or_else(|| "-".to_string(), format_micros);
            format!(
                "from={} drive={} elapsed={}",
                details.from, details.drive, elapsed
            )
        }
        TelemetryPayload::Ignored(reason) => format!("reason={}", reason_label(reason)),
        TelemetryPayload::None => String::new(),
    };
    format!(
        "  #{:<3} {} {} code=0x{:02x} {}",
        record.id,
        stamp(record.timestamp),
        record.event,
        record.event.to_raw(),
        detail
    )
}

fn describe_help(topic: Option<CommandKeyword>) -> Vec<String> {
    match topic {
        Some(keyword) => {
            let (usage, summary) = keyword.summary();
            vec![format!("{usage}  - {summary}")]
        }
        None => {
            let mut lines = vec!["Available commands:".to_string()];
            for keyword in CommandKeyword::ALL {
                let (usage, summary) = keyword.summary();
                lines.push(format!("  {usage:<24} - {summary}"));
            }
            lines.push("Durations take us, ms or s suffixes; bare numbers are us.".to_string());
            lines.push("Type `help <topic>` for a specific command.".to_string());
            lines
        }
    }
}

fn cause_label(cause: TransitionCause) -> &'static str {
    match cause {
        TransitionCause::PowerOn => "power-on",
        TransitionCause::Press => "press",
        TransitionCause::Release => "release",
        TransitionCause::DwellExpired => "dwell-expired",
    }
}

fn reason_label(reason: IgnoreReason) -> String {
    match reason {
        IgnoreReason::ForeignEdge => "foreign-edge".to_string(),
        IgnoreReason::UnexpectedEdge(level) => format!("edge button={level}"),
        IgnoreReason::StaleExpiry => "stale-expiry".to_string(),
    }
}

fn stamp(at: SimInstant) -> String {
    format!("{:>7}us", at.as_micros())
}

fn format_micros(duration: Duration) -> String {
    format!("{}us", duration.as_micros())
}

fn format_duration_short(duration: Duration) -> String {
    if duration.as_millis() == 0 {
        format!("{}us", duration.as_micros())
    } else if duration.as_secs() == 0 {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{:.3}s", duration.as_secs_f64())
    }
}

fn strip_ansi(line: &str) -> String {
    let mut plain = String::with_capacity(line.len());
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            for terminator in chars.by_ref() {
                if terminator.is_ascii_alphabetic() {
                    break;
                }
            }
        } else {
            plain.push(c);
        }
    }
    plain
}

enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(&self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(path: &Path, table: TableChoice) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };
        writeln!(
            logger.writer,
            "# Power sequencer emulator transcript (table={})",
            table.label()
        )?;
        Ok(logger)
    }

    fn append_line(&mut self, at: SimInstant, role: TranscriptRole, line: &str) -> io::Result<()> {
        writeln!(self.writer, "[{}] {} {line}", stamp(at), role.prefix())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(session: &mut Session, line: &str) -> Vec<String> {
        session.handle_command(line).expect("command handled")
    }

    #[test]
    fn press_and_run_narrate_the_train() {
        let mut session = Session::new(TableChoice::Calibrated);

        let pressed = run(&mut session, "press");
        assert_eq!(pressed.len(), 1);
        assert!(pressed[0].contains("idle -> down1 drive=low dwell=972us (press)"));

        run(&mut session, "advance 20ms");
        run(&mut session, "release");
        let lines = run(&mut session, "run");
        assert!(lines[0].contains("down15 -> idle drive=high"));
        assert_eq!(lines.last().map(String::as_str), Some("OK quiet now=31260us"));
    }

    #[test]
    fn status_reports_board_snapshot() {
        let mut session = Session::new(TableChoice::Nominal);
        run(&mut session, "press");

        let status = run(&mut session, "status");
        assert_eq!(
            status,
            vec!["state=down1 drive=low button=low now=0us deadline=1000us table=nominal"]
        );
    }

    #[test]
    fn history_lists_power_on_and_ignored_edges() {
        let mut session = Session::new(TableChoice::Calibrated);
        run(&mut session, "bounce 3");

        let history = run(&mut session, "history");
        assert_eq!(history[0], "history (4 records)");
        assert!(history[1].contains("state-entered idle"));
        assert!(history[3].contains("edge-ignored down1"));
    }

    #[test]
    fn reset_restores_idle_and_clears_history() {
        let mut session = Session::new(TableChoice::Calibrated);
        run(&mut session, "press");
        run(&mut session, "advance 5ms");

        let lines = run(&mut session, "reset");
        assert_eq!(lines[0], "OK reset table=calibrated");
        assert!(run(&mut session, "status")[0].starts_with("state=idle drive=high"));
        assert_eq!(run(&mut session, "history")[0], "history (1 records)");
    }

    #[test]
    fn syntax_errors_are_reported_not_fatal() {
        let mut session = Session::new(TableChoice::Calibrated);
        let lines = run(&mut session, "advance soon");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("ERR syntax unrecognised input at column"));
    }

    #[test]
    fn repeated_press_is_a_no_op() {
        let mut session = Session::new(TableChoice::Calibrated);
        run(&mut session, "press");
        assert_eq!(run(&mut session, "press"), vec!["OK button already low"]);
    }

    #[test]
    fn help_topic_prints_usage() {
        let mut session = Session::new(TableChoice::Calibrated);
        let lines = run(&mut session, "help bounce");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("bounce <count> [<gap>]"));
    }

    #[test]
    fn long_bounce_keeps_every_dispatch() {
        let mut session = Session::new(TableChoice::Calibrated);

        let lines = run(&mut session, "bounce 100 5us");
        assert_eq!(lines.len(), 101);
        assert!(lines.iter().all(|line| !line.starts_with("WARN")));

        let history = run(&mut session, "history");
        assert_eq!(history[0], "history (101 records)");
        assert_eq!(history.len(), 102);
    }

    #[test]
    fn strip_ansi_removes_colour_codes() {
        let painted = "low".red().bold().to_string();
        assert_eq!(strip_ansi(&format!("drive={painted}")), "drive=low");
    }
}
