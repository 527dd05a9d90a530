//! Output helpers for consistent CLI output.

use owo_colors::OwoColorize;

/// Standard output helper for consistent CLI formatting.
pub struct Output;

impl Output {
    /// Example: `✓ com.example.Foo`
    pub fn success(msg: impl AsRef<str>) {
        println!("{} {}", "✓".green().bold(), msg.as_ref());
    }

    /// Print an error message with a red X to stderr.
    pub fn error(msg: impl AsRef<str>) {
        eprintln!("{} {}", "✗".red().bold(), msg.as_ref().red());
    }

    pub fn warning(msg: impl AsRef<str>) {
        println!("{} {}", "⚠".yellow(), msg.as_ref());
    }

    /// Example: `→ Hosting 3 services`
    pub fn info(msg: impl AsRef<str>) {
        println!("{} {}", "→".cyan(), msg.as_ref().dimmed());
    }

    /// Print a key-value pair with alignment.
    ///
    /// Example: `  Bus:           session`
    pub fn kv(key: impl AsRef<str>, value: impl AsRef<str>) {
        println!("  {:<14} {}", format!("{}:", key.as_ref()).cyan(), value.as_ref());
    }
}
