// Binwatch console dashboard
// Prints alert banners, keeps per-area JPEG snapshots on disk and
// accepts stream commands typed while the watch runs

use binwatch_eye::dashboard::{DisplaySink, NO_STREAMS_NOTICE};
use binwatch_eye::error::EyeError;
use binwatch_eye::frame::Frame;
use binwatch_eye::registry::StreamRegistry;
use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const SNAPSHOT_QUALITY: u8 = 85;

pub struct ConsoleSink {
    snapshot_dir: Option<PathBuf>,
    snapshot_interval: Duration,
    last_snapshot: HashMap<String, Instant>,
    empty_notice_shown: bool,
}

impl ConsoleSink {
    pub fn new(snapshot_dir: Option<PathBuf>, snapshot_interval: Duration) -> Self {
        Self {
            snapshot_dir,
            snapshot_interval,
            last_snapshot: HashMap::new(),
            empty_notice_shown: false,
        }
    }

    /// Snapshot path for an area inside `dir`
    pub fn snapshot_path(dir: &Path, area: &str) -> PathBuf {
        let name: String = area
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        dir.join(format!("{}.jpg", name))
    }

    fn snapshot_due(&self, area: &str, now: Instant) -> bool {
        self.last_snapshot
            .get(area)
            .map(|last| now.duration_since(*last) >= self.snapshot_interval)
            .unwrap_or(true)
    }

    fn write_snapshot(dir: &Path, area: &str, frame: &Frame) -> anyhow::Result<()> {
        std::fs::create_dir_all(dir)?;
        let jpeg = frame.encode_jpeg(SNAPSHOT_QUALITY)?;
        std::fs::write(Self::snapshot_path(dir, area), jpeg)?;
        Ok(())
    }
}

impl DisplaySink for ConsoleSink {
    fn show_frame(&mut self, area: &str, frame: &Frame) {
        self.empty_notice_shown = false;

        let Some(dir) = self.snapshot_dir.clone() else {
            return;
        };
        let now = Instant::now();
        if !self.snapshot_due(area, now) {
            return;
        }
        self.last_snapshot.insert(area.to_string(), now);

        match Self::write_snapshot(&dir, area, frame) {
            Ok(()) => debug!("Snapshot written for {}", area),
            Err(e) => warn!("Failed to write snapshot for {}: {}", area, e),
        }
    }

    fn show_banner(&mut self, area: &str, message: &str) {
        println!("✅ [{}] {}", area, message);
    }

    fn show_empty(&mut self) {
        if !self.empty_notice_shown {
            println!("ℹ️  {}", NO_STREAMS_NOTICE);
            self.empty_notice_shown = true;
        }
    }
}

#[derive(Debug, PartialEq)]
pub enum CommandResult {
    Continue,
    Exit,
    Success(String),
    Error(String),
    Output(String),
}

pub const HELP: &str = "\
📚 Available Commands:
  AREA=SOURCE       - Watch SOURCE (device index, URL or image path) as AREA
  remove <area>     - Stop watching an area
  list              - List watched areas
  help, ?           - Show this help message
  exit, quit, q     - Stop binwatch";

/// Execute one console line against the registry
pub fn handle_command(registry: &StreamRegistry, line: &str) -> CommandResult {
    let line = line.trim();
    if line.is_empty() {
        return CommandResult::Continue;
    }

    if let Some((area, source)) = line.split_once('=') {
        let area = area.trim();
        return match registry.register(source, area) {
            Ok(_) => CommandResult::Success(format!("Added stream for {}", area)),
            Err(EyeError::Registration(msg)) => CommandResult::Error(msg),
            Err(e) => CommandResult::Error(e.to_string()),
        };
    }

    let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    match command.to_lowercase().as_str() {
        "exit" | "quit" | "q" => CommandResult::Exit,
        "help" | "?" => CommandResult::Output(HELP.to_string()),
        "list" | "ls" => {
            let areas = registry.areas();
            if areas.is_empty() {
                CommandResult::Output(NO_STREAMS_NOTICE.to_string())
            } else {
                CommandResult::Output(areas.join("\n"))
            }
        }
        "remove" | "rm" => {
            let area = rest.trim();
            if area.is_empty() {
                CommandResult::Error("Usage: remove <area>".to_string())
            } else if registry.remove(area) {
                CommandResult::Success(format!("Removed stream for {}", area))
            } else {
                CommandResult::Error(format!("No stream for {}", area))
            }
        }
        other => CommandResult::Error(format!(
            "Unknown command: {}. Use AREA=SOURCE to add a stream, or 'help'.",
            other
        )),
    }
}

/// Read commands until `exit` or end of input. Returns true when `exit` was typed.
pub fn run_commands<R: BufRead, W: Write>(
    registry: &StreamRegistry,
    input: R,
    out: &mut W,
) -> io::Result<bool> {
    for line in input.lines() {
        match handle_command(registry, &line?) {
            CommandResult::Continue => {}
            CommandResult::Exit => return Ok(true),
            CommandResult::Success(msg) => writeln!(out, "✅ {}", msg)?,
            CommandResult::Error(msg) => writeln!(out, "❌ {}", msg)?,
            CommandResult::Output(text) => writeln!(out, "{}", text)?,
        }
        out.flush()?;
    }
    Ok(false)
}
