//! Terminal output for the `chatlens` CLI
//!
//! Results go to stdout, diagnostics to stderr so `serve` and piped output
//! stay clean.

use colored::*;
use std::fmt::Display;

const FIELD_WIDTH: usize = 18;

fn header_text(title: &str) -> String {
    let rule = "-".repeat(title.chars().count().max(8));
    format!("\n{}\n{}", title.bold().bright_cyan(), rule.dimmed())
}

fn field_text(label: &str, value: impl Display) -> String {
    let label = format!("{}:", label);
    format!("  {:<width$} {}", label.dimmed(), value, width = FIELD_WIDTH)
}

/// Section title followed by a dimmed rule
pub fn print_header(title: &str) {
    println!("{}", header_text(title));
}

pub fn print_success(text: &str) {
    println!("{} {}", "✓".green().bold(), text);
}

/// `error: ...` on stderr
pub fn print_error(text: &str) {
    eprintln!("{} {}", "error:".red().bold(), text);
}

/// Progress notes, on stderr
pub fn print_info(text: &str) {
    eprintln!("{}", text.dimmed());
}

pub fn print_warning(text: &str) {
    eprintln!("{} {}", "warning:".yellow().bold(), text);
}

/// Aligned `label: value` line used by the stats, tone and cleanup views
pub fn print_field(label: &str, value: impl Display) {
    println!("{}", field_text(label, value));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_rendering() {
        colored::control::set_override(false);

        assert_eq!(header_text("Tone"), "\nTone\n--------");
        assert_eq!(header_text("Cache Statistics"), "\nCache Statistics\n----------------");
        assert_eq!(field_text("Chats", 3), "  Chats:             3");
    }
}
