// ============================================================================
// mediapress-cli/src/terminal.rs
// ============================================================================
//
// TERMINAL OUTPUT: Sections, status lines and the y/N prompt
//
// Informational output goes to stdout through console::Term; progress bars
// and warnings live on stderr. Every printed line is mirrored to the log file
// at debug level.
//
// KEY COMPONENTS:
// - print_section / print_status / print_warning: the visual hierarchy
// - TermConfirm: answers scheduler prompts from the keyboard and tells the
//   Ctrl-C handler whether a prompt is currently open

use console::{Term, style};
use mediapress_core::Confirm;

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

pub mod styling {
    pub const SECTION_PREFIX: &str = "===== ";
    pub const SECTION_SUFFIX: &str = " =====";
    pub const STATUS_INDENT: &str = "  ";
    pub const LABEL_WIDTH: usize = 15;
}

fn write_out(line: &str) {
    log::debug!("{}", console::strip_ansi_codes(line));
    if let Err(e) = Term::stdout().write_line(line) {
        log::warn!("Failed to write to stdout: {}", e);
    }
}

/// Section header for a major phase, preceded by a blank line.
pub fn print_section(title: &str) {
    write_out("");
    write_out(&format!(
        "{}{}{}",
        styling::SECTION_PREFIX,
        style(title.to_uppercase()).cyan().bold(),
        styling::SECTION_SUFFIX
    ));
}

/// Formats an aligned `label: value` line.
pub fn format_status(label: &str, value: &str) -> String {
    let padding = styling::LABEL_WIDTH.saturating_sub(label.len()).max(1);
    format!(
        "{}{}:{}{}",
        styling::STATUS_INDENT,
        label,
        " ".repeat(padding),
        value
    )
}

pub fn print_status(label: &str, value: &str, highlight: bool) {
    if highlight {
        write_out(&format_status(label, &style(value).bold().to_string()));
    } else {
        write_out(&format_status(label, value));
    }
}

pub fn print_line(message: &str) {
    write_out(message);
}

pub fn print_warning(message: &str) {
    log::debug!("{}", message);
    let _ = Term::stderr().write_line(&style(message).yellow().bold().to_string());
}

/// Parses a y/N answer; anything unrecognised yields `default`.
pub fn parse_answer(answer: &str, default: bool) -> bool {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => true,
        "n" | "no" => false,
        _ => default,
    }
}

/// Keyboard-backed confirmation prompt on stderr.
pub struct TermConfirm {
    term: Term,
    prompt_open: Arc<AtomicBool>,
}

impl TermConfirm {
    pub fn new() -> Self {
        Self {
            term: Term::stderr(),
            prompt_open: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that is set while a prompt is waiting for an answer.
    pub fn prompt_open(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.prompt_open)
    }
}

impl Default for TermConfirm {
    fn default() -> Self {
        Self::new()
    }
}

impl Confirm for TermConfirm {
    fn confirm(&self, prompt: &str, default: bool) -> bool {
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        let mut term = self.term.clone();
        if write!(term, "{} {} ", style(prompt).bold(), hint).is_err() {
            return default;
        }
        let _ = term.flush();

        self.prompt_open.store(true, Ordering::SeqCst);
        let answer = term.read_line();
        self.prompt_open.store(false, Ordering::SeqCst);

        let answer = match answer {
            Ok(answer) => parse_answer(&answer, default),
            Err(e) => {
                log::debug!("Could not read an answer ({}), using default", e);
                default
            }
        };
        log::debug!("{} -> {}", prompt, if answer { "yes" } else { "no" });
        answer
    }
}
