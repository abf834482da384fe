// UI layer: spinners, progress bars and prompts.
// Prompts go through the `Prompter` trait so command flows can be driven by
// a script in tests; `TerminalPrompter` is the `dialoguer` implementation.

use crate::error::{PinpointError, Result};
use crossterm::style::Stylize;
use dialoguer::{Confirm, Input, Select};
use indicatif::{ProgressBar, ProgressStyle};
use std::cell::RefCell;
use std::io;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of a single prompt. Cancelling (Esc, `q`, or an interrupted
/// read) is not an error: it ends the command cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer<T> {
    Value(T),
    Cancelled,
}

impl<T> Answer<T> {
    /// Turn a cancelled prompt into `PinpointError::Cancelled` so it can be
    /// propagated with `?` up to `main`, which exits with 0.
    pub fn or_cancel(self) -> Result<T> {
        match self {
            Answer::Value(v) => Ok(v),
            Answer::Cancelled => Err(PinpointError::Cancelled),
        }
    }
}

/// Validation callback for text prompts: `Some(message)` rejects the input
/// and re-prompts.
pub type Validator<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Interactive questions asked by the command flows.
pub trait Prompter {
    fn confirm(&self, message: &str, default: bool) -> Result<Answer<bool>>;

    fn text(&self, message: &str, initial: Option<&str>, validate: Validator<'_>) -> Result<Answer<String>>;

    /// Pick one of `items`; returns the index.
    fn select(&self, message: &str, items: &[String]) -> Result<Answer<usize>>;
}

/// `Prompter` backed by the terminal.
pub struct TerminalPrompter;

fn interrupted<T>(err: io::Error) -> Result<Answer<T>> {
    if err.kind() == io::ErrorKind::Interrupted {
        Ok(Answer::Cancelled)
    } else {
        Err(err.into())
    }
}

impl Prompter for TerminalPrompter {
    fn confirm(&self, message: &str, default: bool) -> Result<Answer<bool>> {
        match Confirm::new().with_prompt(message).default(default).interact_opt() {
            Ok(Some(v)) => Ok(Answer::Value(v)),
            Ok(None) => Ok(Answer::Cancelled),
            Err(e) => interrupted(e),
        }
    }

    fn text(&self, message: &str, initial: Option<&str>, validate: Validator<'_>) -> Result<Answer<String>> {
        let mut input = Input::<String>::new();
        input.with_prompt(message).validate_with(|value: &String| -> std::result::Result<(), String> {
            match validate(value) {
                Some(msg) => Err(msg),
                None => Ok(()),
            }
        });
        if let Some(initial) = initial.filter(|s| !s.is_empty()) {
            input.with_initial_text(initial);
        }
        match input.interact_text() {
            Ok(v) => Ok(Answer::Value(v.trim().to_string())),
            Err(e) => interrupted(e),
        }
    }

    fn select(&self, message: &str, items: &[String]) -> Result<Answer<usize>> {
        match Select::new().with_prompt(message).items(items).default(0).interact_opt() {
            Ok(Some(i)) => Ok(Answer::Value(i)),
            Ok(None) => Ok(Answer::Cancelled),
            Err(e) => interrupted(e),
        }
    }
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn glyph_ok() -> &'static str {
    if cfg!(windows) {
        "√"
    } else {
        "✔"
    }
}

fn glyph_fail() -> &'static str {
    if cfg!(windows) {
        "×"
    } else {
        "✖"
    }
}

/// A spinner that always ends with a success or failure line. Dropping an
/// unfinished spinner clears it so nothing is left animating.
pub struct Spinner {
    bar: ProgressBar,
    quiet: bool,
    // The resolution line, recorded even when quiet.
    outcome: RefCell<Option<String>>,
}

impl Spinner {
    pub fn start(message: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(style("{spinner:.magenta} {msg}"));
        bar.set_message(message.magenta().to_string());
        bar.enable_steady_tick(Duration::from_millis(80));
        Spinner {
            bar,
            quiet: false,
            outcome: RefCell::new(None),
        }
    }

    /// A spinner that never draws and prints nothing when resolved.
    pub fn quiet() -> Self {
        Spinner {
            bar: ProgressBar::hidden(),
            quiet: true,
            outcome: RefCell::new(None),
        }
    }

    pub fn set_message(&self, message: &str) {
        self.bar.set_message(message.magenta().to_string());
    }

    pub fn succeed(&self, message: &str) {
        self.resolve(format!("{} {}", glyph_ok().green(), message.bold()));
    }

    pub fn fail(&self, message: &str) {
        self.resolve(format!("{} {}", glyph_fail().red(), message));
    }

    /// Stop without a status line, for failures someone else reports.
    pub fn clear(&self) {
        self.bar.finish_and_clear();
    }

    /// The line the spinner ended with, if it printed one.
    pub fn outcome(&self) -> Option<String> {
        self.outcome.borrow().clone()
    }

    fn resolve(&self, line: String) {
        self.bar.finish_and_clear();
        if !self.quiet {
            eprintln!("{line}");
        }
        *self.outcome.borrow_mut() = Some(line);
    }
}

impl Drop for Spinner {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

/// Progress sink for uploads: receives the completed fraction in `0.0..=1.0`.
pub type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;

/// Percentage bar used for large uploads.
pub struct UploadBar {
    bar: ProgressBar,
}

impl UploadBar {
    pub fn start(message: &str) -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(style("{bar:40.green} {percent}% || {msg}").progress_chars("█░"));
        bar.set_message(message.to_string());
        UploadBar { bar }
    }

    /// Callback to hand to the API client.
    pub fn sink(&self) -> ProgressFn {
        let bar = self.bar.clone();
        Arc::new(move |fraction: f64| {
            bar.set_position((fraction.clamp(0.0, 1.0) * 100.0).round() as u64);
        })
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Drop for UploadBar {
    fn drop(&mut self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

/// Print a green check mark followed by a bold message.
pub fn tick(message: &str) {
    println!("{} {}", glyph_ok().green(), message.bold());
}

/// Print a highlighted informational line.
pub fn notice(message: &str) {
    println!("{}", message.magenta());
}

/// Print the single `Error: ` line shown for every fatal failure.
pub fn error(message: &str) {
    eprintln!("{}{}", "Error: ".red().bold(), message.bold());
}

/// Human-readable byte size for prompts and summaries.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
