mod session;

use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

use crossterm::tty::IsTty;
use session::{Session, TableChoice};

const USAGE: &str =
    "Usage: sequencer-emulator [--table <calibrated|nominal>] [--transcript <path>]";

struct Options {
    table: TableChoice,
    transcript: Option<PathBuf>,
}

fn main() -> io::Result<()> {
    let options = parse_options().unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let color = stdout.is_tty();
    let mut writer = stdout.lock();

    let mut session = match options.transcript {
        Some(path) => Session::with_transcript(options.table, &path)?,
        None => Session::new(options.table),
    };
    session.set_color(color);
    let mut line = String::new();

    writeln!(
        writer,
        "Power sequencer emulator ready (table={}). Type `help` for commands or `exit` to quit.",
        session.table().label()
    )?;

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if should_terminate(trimmed) {
            writeln!(writer, "Session closed.")?;
            break;
        }

        let responses = session.handle_command(trimmed)?;
        for response in responses {
            writeln!(writer, "{response}")?;
        }
    }

    Ok(())
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

fn parse_options() -> Result<Options, String> {
    let mut options = Options {
        table: TableChoice::Calibrated,
        transcript: None,
    };

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if let Some(value) = arg.strip_prefix("--table=") {
            options.table = TableChoice::from_tag(value)?;
        } else if arg == "--table" {
            let value = args.next().ok_or("Expected value after --table")?;
            options.table = TableChoice::from_tag(&value)?;
        } else if let Some(value) = arg.strip_prefix("--transcript=") {
            options.transcript = Some(PathBuf::from(value));
        } else if arg == "--transcript" {
            let value = args.next().ok_or("Expected value after --transcript")?;
            options.transcript = Some(PathBuf::from(value));
        } else {
            return Err(format!("Unexpected argument `{arg}`"));
        }
    }

    Ok(options)
}
