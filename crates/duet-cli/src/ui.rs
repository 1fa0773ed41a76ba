//! UI utilities for Duet CLI.

use std::time::Duration;

use duet_core::file::format_size;
use duet_core::transfer::TransferProgress;

const BOX_WIDTH: usize = 33;

/// A formatted box for displaying a pairing code and link.
pub struct CodeBox<'a> {
    code: &'a str,
    link: Option<&'a str>,
}

impl<'a> CodeBox<'a> {
    /// Create a new code box.
    #[must_use]
    pub const fn new(code: &'a str) -> Self {
        Self { code, link: None }
    }

    /// Print the full pairing link under the box.
    #[must_use]
    pub const fn with_link(mut self, link: &'a str) -> Self {
        self.link = Some(link);
        self
    }

    /// Display the code box to stdout.
    pub fn display(&self) {
        let code_line = format!("Code:  {}", format_code_spaced(self.code));

        println!("  ┌{}┐", "─".repeat(BOX_WIDTH));
        println!("  │{}│", " ".repeat(BOX_WIDTH));
        println!("  │{}│", center_in_box(&code_line, BOX_WIDTH));
        println!("  │{}│", " ".repeat(BOX_WIDTH));
        println!("  └{}┘", "─".repeat(BOX_WIDTH));

        if let Some(link) = self.link {
            println!();
            println!("  Link: {}", link);
        }
    }
}

fn format_code_spaced(code: &str) -> String {
    code.chars()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn center_in_box(content: &str, width: usize) -> String {
    let content_len = content.chars().count();
    let padding = width.saturating_sub(content_len);
    let left = padding / 2;
    let right = padding - left;
    format!("{}{}{}", " ".repeat(left), content, " ".repeat(right))
}

/// Parse a duration string like "50ms", "2s" or "1m".
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Some(num_str) = s.strip_suffix("ms") {
        num_str.parse().ok().map(Duration::from_millis)
    } else if let Some(num_str) = s.strip_suffix('s') {
        num_str.parse().ok().map(Duration::from_secs)
    } else if let Some(num_str) = s.strip_suffix('m') {
        let num: u64 = num_str.parse().ok()?;
        num.checked_mul(60).map(Duration::from_secs)
    } else {
        None
    }
}

/// Format a duration the way [`parse_duration`] reads it.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis > 0 && millis % 1000 == 0 {
        format!("{}s", millis / 1000)
    } else {
        format!("{}ms", millis)
    }
}

/// Format remaining duration as "M:SS".
pub fn format_remaining(remaining: Duration) -> String {
    let total_secs = remaining.as_secs();
    format!("{}:{:02}", total_secs / 60, total_secs % 60)
}

/// One-line progress summary, e.g. `upload report.pdf 42% 1.2 MB/s ETA 0:05`.
pub fn format_progress(progress: &TransferProgress) -> String {
    let mut line = format!(
        "{} {} {:>3}% {}/s",
        progress.direction,
        progress.file_name,
        progress.percent,
        format_size(progress.throughput_bps)
    );
    if let Some(eta) = progress.eta {
        line.push_str(" ETA ");
        line.push_str(&format_remaining(eta));
    }
    line
}
