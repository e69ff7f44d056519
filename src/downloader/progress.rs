// yt-dlp progress line parsing

use regex::Regex;

lazy_static::lazy_static! {
    /// [download]   6.2% of ~ 343.72MiB at  420.30KiB/s ETA 12:32 (frag 29/454)
    static ref PERCENT_RE: Regex = Regex::new(r"\[download\]\s+(\d+(?:\.\d+)?)%").unwrap();
    static ref DEST_RE: Regex = Regex::new(r"\[download\]\s+Destination:\s+(.+)").unwrap();
}

/// Extract the percentage from a `[download] NN.N%` line
pub fn parse_percent(line: &str) -> Option<f32> {
    let caps = PERCENT_RE.captures(line)?;
    let percent: f32 = caps.get(1)?.as_str().parse().ok()?;
    Some(percent.clamp(0.0, 100.0))
}

/// Extract the destination path announced before a download starts
pub fn parse_destination(line: &str) -> Option<&str> {
    DEST_RE
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

/// Debounces progress: only a value different from the last reported one passes
#[derive(Debug, Default)]
pub struct ProgressTracker {
    last: Option<f32>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the new percentage when `line` carries one that was not just reported
    pub fn observe(&mut self, line: &str) -> Option<f32> {
        let percent = parse_percent(line)?;
        if self.last == Some(percent) {
            return None;
        }
        self.last = Some(percent);
        Some(percent)
    }

    pub fn last(&self) -> Option<f32> {
        self.last
    }
}
