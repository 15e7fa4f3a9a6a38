//! Result and message printing shared by all commands.

use colored::Colorize;
use serde::Serialize;

use crate::OutputFormat;

/// Print a serializable result on stdout: pretty JSON in JSON mode, one
/// line otherwise.
pub fn print<T: Serialize>(value: &T, format: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    let rendered = match format {
        OutputFormat::Json => serde_json::to_string_pretty(value),
        OutputFormat::Text => serde_json::to_string(value),
    };
    match rendered {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("{}: failed to serialize result: {}", "Error".red().bold(), e),
    }
}

/// Informational message. Suppressed in JSON mode so stdout stays parseable.
pub fn info(message: &str, format: OutputFormat, quiet: bool) {
    if quiet || matches!(format, OutputFormat::Json) {
        return;
    }
    println!("{}", message);
}

pub fn success(message: &str, format: OutputFormat, quiet: bool) {
    if quiet || matches!(format, OutputFormat::Json) {
        return;
    }
    println!("{} {}", "✓".green().bold(), message);
}

/// Warnings go to stderr in both formats.
pub fn warn(message: &str, quiet: bool) {
    if quiet {
        return;
    }
    eprintln!("{}: {}", "Warning".yellow().bold(), message);
}
