//! Caption track parsing
//!
//! Cue blocks are separated by blank lines. The timing line of a block is the
//! first line containing `-->`; anything before it (a cue identifier) is
//! ignored, and blocks without one (`WEBVTT` header, `NOTE`) are skipped.

use regex::Regex;
use std::sync::LazyLock;

/// Minimum characters a cue needs to survive noise suppression
pub const MIN_CUE_CHARS: usize = 5;

static COLLAPSE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"[\s\p{Cc}\u{FFFD}]+").expect("static regex")
});

/// One timed caption cue
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubtitleCue {
    /// Start offset in milliseconds
    pub start_ms: u64,
    /// End offset in milliseconds
    pub end_ms: u64,
    /// Whitespace-collapsed text
    pub text: String,
}

impl SubtitleCue {
    /// Number of whitespace-separated words
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    /// Midpoint between start and end
    pub fn midpoint_ms(&self) -> u64 {
        self.start_ms + (self.end_ms - self.start_ms) / 2
    }
}

/// Parse `HH:MM:SS.mmm` (or `MM:SS.mmm`, `,` separator allowed) into milliseconds
///
/// ```
/// use harvest_dl::segment::parse_timestamp;
/// assert_eq!(parse_timestamp("01:02:03.004"), Some(3_723_004));
/// ```
pub fn parse_timestamp(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    let (clock, frac) = match raw.rfind(['.', ',']) {
        Some(idx) => (&raw[..idx], &raw[idx + 1..]),
        None => (raw, ""),
    };

    let fields: Vec<&str> = clock.split(':').collect();
    let (h, m, s) = match fields.as_slice() {
        [h, m, s] => (*h, *m, *s),
        [m, s] => ("0", *m, *s),
        _ => return None,
    };
    let h: u64 = parse_digits(h)?;
    let m: u64 = parse_digits(m)?;
    let s: u64 = parse_digits(s)?;

    let millis = if frac.is_empty() {
        0
    } else {
        // Fractions are milliseconds; shorter fractions are right-padded
        let digits: String = frac.chars().chain("000".chars()).take(3).collect();
        parse_digits(&digits)?
    };

    h.checked_mul(3_600_000)?
        .checked_add(m.checked_mul(60_000)?)?
        .checked_add(s.checked_mul(1_000)?)?
        .checked_add(millis)
}

fn parse_digits(field: &str) -> Option<u64> {
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    field.parse().ok()
}

/// Parse the `start --> end [settings]` timing line
fn parse_timing(line: &str) -> Option<(u64, u64)> {
    let (start, rest) = line.split_once("-->")?;
    let end = rest.split_whitespace().next()?;
    Some((parse_timestamp(start)?, parse_timestamp(end)?))
}

/// Collapse whitespace, control characters and replacement characters to single spaces
pub fn collapse_text(text: &str) -> String {
    COLLAPSE.replace_all(text, " ").trim().to_string()
}

fn starts_lowercase(text: &str) -> bool {
    text.chars().next().is_some_and(char::is_lowercase)
}

/// Parse a caption track into retained cues
///
/// A cue whose text starts with a lowercase letter continues the previous
/// retained cue: the previous cue takes its end time and the texts are joined
/// with a space. Any other cue shorter than [`MIN_CUE_CHARS`] is dropped.
/// Blocks with an unparseable or inverted timing line are skipped.
pub fn parse_captions(track: &str) -> Vec<SubtitleCue> {
    let track = track.replace("\r\n", "\n");
    let mut cues: Vec<SubtitleCue> = Vec::new();

    for block in split_blocks(&track) {
        let Some(timing_idx) = block.iter().position(|line| line.contains("-->")) else {
            continue;
        };
        let Some((start_ms, end_ms)) = parse_timing(block[timing_idx]) else {
            tracing::debug!(line = %block[timing_idx], "skipping malformed timing line");
            continue;
        };
        if end_ms <= start_ms {
            continue;
        }

        let text = collapse_text(&block[timing_idx + 1..].join(" "));
        match cues.last_mut() {
            Some(previous) if starts_lowercase(&text) => {
                previous.end_ms = end_ms;
                previous.text.push(' ');
                previous.text.push_str(&text);
            }
            _ if text.chars().count() < MIN_CUE_CHARS => {}
            _ => cues.push(SubtitleCue {
                start_ms,
                end_ms,
                text,
            }),
        }
    }

    cues
}

fn split_blocks(track: &str) -> Vec<Vec<&str>> {
    let mut blocks = Vec::new();
    let mut current = Vec::new();
    for line in track.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}
