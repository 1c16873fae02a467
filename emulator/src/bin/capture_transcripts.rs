use std::io;
use std::path::Path;

#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use session::{Session, TableChoice};

const TRANSCRIPT_DIR: &str = "transcripts";

fn main() -> io::Result<()> {
    record(
        "short-press.log",
        TableChoice::Calibrated,
        &["press", "advance 5ms", "release", "run", "status", "history"],
    )?;
    record(
        "long-hold.log",
        TableChoice::Calibrated,
        &["press", "run", "status", "advance 2s", "release", "run", "history"],
    )?;
    record(
        "bounce.log",
        TableChoice::Calibrated,
        &["bounce 6 120us", "status", "run", "press", "release", "status"],
    )?;
    record(
        "nominal.log",
        TableChoice::Nominal,
        &["press", "release", "run", "history"],
    )?;
    Ok(())
}

fn record(name: &str, table: TableChoice, script: &[&str]) -> io::Result<()> {
    let path = Path::new(TRANSCRIPT_DIR).join(name);
    let mut session = Session::with_transcript(table, &path)?;
    for line in script {
        session.handle_command(line)?;
    }
    println!("wrote {}", path.display());
    Ok(())
}
