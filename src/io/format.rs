//! Layout of the human-readable QSQD output.
//!
//! Everything meant for the output file is logged under the `qsqd-output` target, which the
//! binary routes to its own appender. Diagnostics go to the default target instead.

use std::fmt;

use log;

#[cfg(test)]
#[path = "format_tests.rs"]
mod format_tests;

/// Width of the title banners and section delimiters.
const BANNER_WIDTH: usize = 103;

/// Width of the rules framing the batch table of the configuration-recovery rounds.
pub(crate) const BATCH_TABLE_WIDTH: usize = 74;

/// Width of the rules framing the orbital-optimisation table.
pub(crate) const ORBITAL_TABLE_WIDTH: usize = 86;

/// Logs an error both to the default logger and to the `qsqd-output` logger.
macro_rules! qsqd_error {
    ($fmt:expr $(, $($arg:tt)*)?) => {{
        log::error!($fmt, $($($arg)*)?);
        log::error!(target: "qsqd-output", $fmt, $($($arg)*)?);
    }}
}

/// Logs a warning to the `qsqd-output` logger.
macro_rules! qsqd_warn {
    ($fmt:expr $(, $($arg:tt)*)?) => {{ log::warn!(target: "qsqd-output", $fmt, $($($arg)*)?); }}
}

/// Logs a line of output to the `qsqd-output` logger.
macro_rules! qsqd_output {
    ($fmt:expr $(, $($arg:tt)*)?) => {{ log::info!(target: "qsqd-output", $fmt, $($($arg)*)?); }}
}

pub(crate) use {qsqd_error, qsqd_output, qsqd_warn};

/// Nesting level of a delimited output section.
///
/// Macro-sections enclose whole stages of a calculation, such as input loading or orbital
/// optimisation. Micro-sections enclose steps within a stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Section {
    Macro,
    Micro,
}

impl Section {
    fn mark(self, opening: bool) -> char {
        match (self, opening) {
            (Section::Macro, true) => '❬',
            (Section::Macro, false) => '❭',
            (Section::Micro, true) => '‹',
            (Section::Micro, false) => '›',
        }
    }

    /// The delimiter line opening or closing a section, padded with the section mark up to the
    /// banner width.
    fn delimiter(self, title: &str, opening: bool) -> String {
        let mark = self.mark(opening);
        let tag = if opening { "[Begin]" } else { "[ End ]" };
        let head = format!("{} {tag} {title} ", mark.to_string().repeat(5));
        let fill = BANNER_WIDTH.saturating_sub(head.chars().count());
        format!("{head}{}", mark.to_string().repeat(fill))
    }

    /// Logs the line opening a section.
    pub(crate) fn begin(self, title: &str) {
        qsqd_output!("{}", self.delimiter(title, true));
    }

    /// Logs the line closing a section.
    pub(crate) fn end(self, title: &str) {
        qsqd_output!("{}", self.delimiter(title, false));
    }
}

/// The three lines of a boxed title banner.
fn banner(title: &str) -> [String; 3] {
    let inner = title.chars().count().max(BANNER_WIDTH - 6);
    let bar = "─".repeat(inner + 4);
    [
        format!("┌{bar}┐"),
        format!("│§ {title:^inner$} §│"),
        format!("└{bar}┘"),
    ]
}

/// Logs a boxed title banner to the `qsqd-output` logger.
pub(crate) fn log_banner(title: &str) {
    banner(title)
        .iter()
        .for_each(|line| qsqd_output!("{line}"));
}

fn underline(heading: &str) -> String {
    "═".repeat(heading.chars().count())
}

/// Writes an underlined heading.
pub(crate) fn write_heading(f: &mut fmt::Formatter<'_>, heading: &str) -> fmt::Result {
    writeln!(f, "{heading}")?;
    writeln!(f, "{}", underline(heading))
}

/// Logs an underlined heading to the `qsqd-output` logger.
pub(crate) fn log_heading(heading: &str) {
    qsqd_output!("{heading}");
    qsqd_output!("{}", underline(heading));
}

/// A dotted horizontal rule of the given width.
pub(crate) fn rule(width: usize) -> String {
    "┈".repeat(width)
}

pub(crate) fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}

/// Logs the [`fmt::Display`] rendition of a value line by line to the `qsqd-output` logger.
pub(crate) trait LogLines: fmt::Display {
    fn log_lines(&self) {
        self.to_string()
            .lines()
            .for_each(|line| qsqd_output!("{line}"));
    }
}

impl<T> LogLines for T where T: fmt::Display + ?Sized {}
