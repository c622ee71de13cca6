//! SRT reading and writing.
//!
//! Indexed cues with `HH:MM:SS,mmm` timestamps. The reader tolerates a
//! leading BOM, CRLF line endings, and `.` as the millisecond separator;
//! the writer re-numbers cues from 1 and always emits `,`.

use std::path::Path;

use crate::cue::Cue;
use crate::error::{Error, Result};

/// Parse SRT text into cues.
pub fn parse_srt(content: &str) -> Result<Vec<Cue>> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let content = content.replace("\r\n", "\n");
    let mut cues = Vec::new();

    for block in content.split("\n\n").map(str::trim) {
        if block.is_empty() {
            continue;
        }
        let mut lines = block.lines().map(str::trim_end);
        let first = match lines.next() {
            Some(l) => l,
            None => continue,
        };
        // The index line is optional in the wild; the timing line is not.
        let timing = if first.contains("-->") {
            first
        } else {
            match lines.next() {
                Some(l) if l.contains("-->") => l,
                _ => {
                    return Err(Error::InvalidInput(format!(
                        "subtitle block without timing line: {:?}",
                        first
                    )))
                }
            }
        };
        let (start, end) = parse_timing_line(timing)?;
        let text = lines.collect::<Vec<_>>().join("\n");
        cues.push(Cue::new(start, end, text));
    }

    if cues.is_empty() {
        return Err(Error::InvalidInput("no cues in subtitle input".into()));
    }
    Ok(cues)
}

/// Compose cues into SRT text, re-numbered from 1.
pub fn compose_srt(cues: &[Cue]) -> String {
    let mut out = String::new();
    for (i, cue) in cues.iter().enumerate() {
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            format_timestamp(cue.start_ms),
            format_timestamp(cue.end_ms),
            cue.text
        ));
    }
    out
}

/// Load cues from an SRT file.
pub fn load(path: &Path) -> Result<Vec<Cue>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::InvalidInput(format!("cannot read subtitle {}: {}", path.display(), e))
    })?;
    parse_srt(&content)
}

/// Save cues to an SRT file.
pub fn save(path: &Path, cues: &[Cue]) -> Result<()> {
    std::fs::write(path, compose_srt(cues))?;
    Ok(())
}

fn parse_timing_line(line: &str) -> Result<(u32, u32)> {
    let mut parts = line.splitn(2, "-->");
    let start = parts
        .next()
        .ok_or_else(|| Error::InvalidInput(format!("bad timing line: {:?}", line)))?;
    let end = parts
        .next()
        .ok_or_else(|| Error::InvalidInput(format!("bad timing line: {:?}", line)))?;
    Ok((parse_timestamp(start.trim())?, parse_timestamp(end.trim())?))
}

fn parse_timestamp(ts: &str) -> Result<u32> {
    // HH:MM:SS,mmm (or '.' before the milliseconds)
    let bad = || Error::InvalidInput(format!("bad timestamp: {:?}", ts));
    let (hms, millis) = ts
        .rsplit_once(|c| c == ',' || c == '.')
        .ok_or_else(bad)?;
    let millis: u32 = millis.trim().parse().map_err(|_| bad())?;
    let mut fields = hms.split(':');
    let hours: u32 = fields.next().ok_or_else(bad)?.trim().parse().map_err(|_| bad())?;
    let minutes: u32 = fields.next().ok_or_else(bad)?.trim().parse().map_err(|_| bad())?;
    let seconds: u32 = fields.next().ok_or_else(bad)?.trim().parse().map_err(|_| bad())?;
    if fields.next().is_some() || minutes > 59 || seconds > 59 || millis > 999 {
        return Err(bad());
    }
    Ok(((hours * 60 + minutes) * 60 + seconds) * 1000 + millis)
}

fn format_timestamp(ms: u32) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms / 60_000) % 60;
    let seconds = (ms / 1000) % 60;
    let millis = ms % 1000;
    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "1\n00:00:01,000 --> 00:00:03,000\nHello world\n\n2\n00:00:03,500 --> 00:00:05,250\nSecond line\ncontinues\n";

    #[test]
    fn test_parse_basic() {
        let cues = parse_srt(SAMPLE).unwrap();
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[0].start_ms, 1000);
        assert_eq!(cues[0].end_ms, 3000);
        assert_eq!(cues[1].text, "Second line\ncontinues");
        assert_eq!(cues[1].end_ms, 5250);
    }

    #[test]
    fn test_parse_tolerates_bom_and_dot_millis() {
        let with_bom = format!("\u{feff}1\n00:00:00.500 --> 00:00:02.000\nx\n");
        let cues = parse_srt(&with_bom).unwrap();
        assert_eq!(cues[0].start_ms, 500);
        assert_eq!(cues[0].end_ms, 2000);
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert!(parse_srt("").is_err());
        assert!(parse_srt("\n\n\n").is_err());
    }

    #[test]
    fn test_roundtrip() {
        let cues = parse_srt(SAMPLE).unwrap();
        let reparsed = parse_srt(&compose_srt(&cues)).unwrap();
        assert_eq!(cues, reparsed);
    }

    #[test]
    fn test_writer_renumbers_from_one() {
        let cues = vec![Cue::new(0, 1000, "a"), Cue::new(1000, 2000, "b")];
        let text = compose_srt(&cues);
        assert!(text.starts_with("1\n00:00:00,000 --> 00:00:01,000"));
        assert!(text.contains("\n2\n00:00:01,000"));
    }

    #[test]
    fn test_hour_timestamps() {
        let cues = parse_srt("1\n01:02:03,004 --> 01:02:04,005\nx\n").unwrap();
        assert_eq!(cues[0].start_ms, 3_723_004);
        assert_eq!(compose_srt(&cues).lines().nth(1).unwrap(), "01:02:03,004 --> 01:02:04,005");
    }
}
