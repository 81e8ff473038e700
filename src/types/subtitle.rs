use std::{fmt::Display, sync::OnceLock, time::Duration};

use miette::{miette, Result};
use regex::Regex;

/// One timed SubRip block. `text` holds the message lines joined with `\n`,
/// without a trailing newline; the blank separator line is emitted by
/// [`Display`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subtitle {
    pub index: usize,
    pub start: Duration,
    pub stop: Duration,
    pub text: String,
}

impl Display for Subtitle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", self.index)?;
        writeln!(
            f,
            "{} --> {}",
            format_srt_time(self.start),
            format_srt_time(self.stop)
        )?;
        writeln!(f, "{}", self.text)?;
        writeln!(f)
    }
}

fn time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d\d):(\d\d):(\d\d),(\d\d\d)$").unwrap())
}

/// Format a duration as a SubRip time field, `HH:MM:SS,mmm`.
pub fn format_srt_time(d: Duration) -> String {
    let ms = d.as_millis();
    let hours = ms / 3_600_000;
    let minutes = ms % 3_600_000 / 60_000;
    let seconds = ms % 60_000 / 1000;
    let millis = ms % 1000;
    format!("{hours:02}:{minutes:02}:{seconds:02},{millis:03}")
}

/// Parse a SubRip time field, `HH:MM:SS,mmm`.
pub fn parse_srt_time(s: &str) -> Result<Duration> {
    let cap = time_re()
        .captures(s)
        .ok_or_else(|| miette!("malformed SubRip time: {s:?}"))?;
    // The regex only lets bounded digit runs through
    let field = |i: usize| cap[i].parse::<u64>().unwrap();

    let seconds = field(1) * 3600 + field(2) * 60 + field(3);
    Ok(Duration::from_millis(seconds * 1000 + field(4)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_zero_padded_fields() {
        assert_eq!(format_srt_time(Duration::ZERO), "00:00:00,000");
        assert_eq!(format_srt_time(Duration::from_secs(2)), "00:00:02,000");
        assert_eq!(format_srt_time(Duration::from_millis(3_661_500)), "01:01:01,500");
    }

    #[test]
    fn parses_what_it_formats() {
        for ms in [0u64, 2000, 6500, 3_661_500] {
            let d = Duration::from_millis(ms);
            assert_eq!(parse_srt_time(&format_srt_time(d)).unwrap(), d);
        }
    }

    #[test]
    fn rejects_malformed_times() {
        for s in ["0:00:00,000", "00:00:00.000", "00:00:00,00", "junk"] {
            assert!(parse_srt_time(s).is_err(), "{s:?} should not parse");
        }
    }

    #[test]
    fn display_emits_a_block_with_a_separator() {
        let sub = Subtitle {
            index: 3,
            start: Duration::from_secs(6),
            stop: Duration::from_secs(8),
            text: "line1\nline2".to_string(),
        };
        assert_eq!(
            sub.to_string(),
            "3\n00:00:06,000 --> 00:00:08,000\nline1\nline2\n\n"
        );
    }
}
