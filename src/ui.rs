//! Terminal output — the logger the orchestrators talk to, plus spinners.
//!
//! # Design goals
//!
//! - **One interface, many sinks.** Backup and restore emit log events through
//!   the [`Log`] trait; the binary installs [`ConsoleLog`], tests install
//!   [`NullLog`]. Nothing below the orchestrators ever prints.
//! - **Quiet means quiet.** `--quiet` suppresses titles, steps, infos and the
//!   final success line. Warnings and errors still reach stderr — a silent
//!   failed backup is worse than a noisy one.
//! - **Clean while running.** Long transfers run behind an indicatif spinner
//!   that is cleared before the next log line, so the terminal always shows a
//!   static summary afterwards.

use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

// ─── Logger interface ─────────────────────────────────────────────────────────

/// Log events emitted by the orchestrators.
///
/// The glyph per level is fixed by the implementation; callers only choose
/// the level and the message.
pub trait Log {
    /// Headline for a whole operation, e.g. `Restoring staging@2024-01-02T09:30:00`.
    fn title(&self, message: &str);
    /// One step inside an operation, e.g. `Backing up uploads`.
    fn step(&self, message: &str);
    /// Neutral detail worth knowing, e.g. a directory being created.
    fn info(&self, message: &str);
    /// Something went wrong but the operation continues.
    fn warn(&self, message: &str);
    /// Something went wrong and the current step is abandoned.
    fn error(&self, message: &str);
    /// Final confirmation line.
    fn success(&self, message: &str);
}

// ─── Console implementation ───────────────────────────────────────────────────

/// Styled console logger.
pub struct ConsoleLog {
    pub quiet: bool,
}

impl ConsoleLog {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl Log for ConsoleLog {
    fn title(&self, message: &str) {
        if !self.quiet {
            println!("{} {}", style("➙").blue(), style(message).bold());
        }
    }

    fn step(&self, message: &str) {
        if !self.quiet {
            println!("• {message}");
        }
    }

    fn info(&self, message: &str) {
        if !self.quiet {
            println!("ℹ {message}");
        }
    }

    fn warn(&self, message: &str) {
        eprintln!("{} {}", style("⚠").yellow(), message);
    }

    fn error(&self, message: &str) {
        eprintln!("{} {}", style("✗").red(), style(message).red().bold());
    }

    fn success(&self, message: &str) {
        if !self.quiet {
            println!("{} {}", style("✔").green(), style(message).bold());
        }
    }
}

/// Logger that swallows everything. Used by unit tests.
#[cfg(test)]
pub struct NullLog;

#[cfg(test)]
impl Log for NullLog {
    fn title(&self, _message: &str) {}
    fn step(&self, _message: &str) {}
    fn info(&self, _message: &str) {}
    fn warn(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
    fn success(&self, _message: &str) {}
}

// ─── Spinner ──────────────────────────────────────────────────────────────────

/// Braille spinner frames — same style as indicatif's default.
static SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// Create and start an indeterminate spinner for `label`.
///
/// Returns a hidden bar when `enabled` is false (quiet mode, tests) so call
/// sites never need to branch. The spinner ticks at ~80 ms; callers clear it
/// with [`ProgressBar::finish_and_clear`] before logging the step outcome.
pub fn spinner(enabled: bool, label: &str) -> ProgressBar {
    if !enabled {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("  {spinner:.cyan}  {msg}")
            .unwrap()
            .tick_chars(SPINNER_CHARS),
    );
    pb.set_message(format!("{}", style(label).dim()));
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

// ─── Tests ────────────────────────────────────────────────────────────────────
