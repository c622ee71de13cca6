//! Content-stage dual-subtitle restructure.
//!
//! Merges fragment cues into full sentences for a TTS-oriented subtitle
//! while the display subtitle keeps the original cue structure. This is a
//! content transform: it rewrites the text vector on purpose and is never
//! run behind the text-immutability gate.

use redub_core::Cue;

use crate::cluster::{ends_terminal, starts_with_dialogue_dash};

const PAUSES: [char; 6] = [',', '，', ';', '；', ':', '：'];

/// Merge consecutive cues into sentence-shaped cues. A merged cue that
/// exceeds `max_chars` or `max_duration_ms` is split once more at the last
/// pause mark inside it.
pub fn semantic_restructure(cues: &[Cue], max_chars: usize, max_duration_ms: u32) -> Vec<Cue> {
    let mut out: Vec<Cue> = Vec::new();
    let mut buf: Vec<&Cue> = Vec::new();

    for cue in cues {
        if buf.is_empty() {
            buf.push(cue);
            continue;
        }
        let prev_text = &buf[buf.len() - 1].text;
        if starts_with_dialogue_dash(&cue.text) || ends_terminal(prev_text) {
            flush(&mut out, &buf, max_chars, max_duration_ms);
            buf.clear();
        }
        buf.push(cue);
    }
    if !buf.is_empty() {
        flush(&mut out, &buf, max_chars, max_duration_ms);
    }
    out
}

fn flush(out: &mut Vec<Cue>, buf: &[&Cue], max_chars: usize, max_duration_ms: u32) {
    let start = buf[0].start_ms;
    let end = buf[buf.len() - 1].end_ms;
    let text = joined_text(buf);

    let oversized = text.chars().count() > max_chars || end.saturating_sub(start) > max_duration_ms;
    if oversized {
        if let Some(split_idx) = last_pause_index(buf) {
            let (left, right) = buf.split_at(split_idx + 1);
            if !right.is_empty() {
                out.push(Cue::new(
                    left[0].start_ms,
                    left[left.len() - 1].end_ms,
                    joined_text(left),
                ));
                out.push(Cue::new(
                    right[0].start_ms,
                    right[right.len() - 1].end_ms,
                    joined_text(right),
                ));
                return;
            }
        }
    }
    out.push(Cue::new(start, end, text));
}

fn joined_text(buf: &[&Cue]) -> String {
    buf.iter()
        .map(|c| c.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn last_pause_index(buf: &[&Cue]) -> Option<usize> {
    buf.iter().rposition(|c| {
        c.text
            .trim()
            .chars()
            .last()
            .map(|ch| PAUSES.contains(&ch))
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cue(start: u32, end: u32, text: &str) -> Cue {
        Cue::new(start, end, text)
    }

    #[test]
    fn test_merges_up_to_terminal() {
        let cues = vec![
            cue(0, 1000, "第一段，"),
            cue(1000, 2000, "继续。"),
            cue(2000, 3000, "新句子"),
        ];
        let out = semantic_restructure(&cues, 250, 15_000);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].text, "第一段， 继续。");
        assert_eq!(out[0].start_ms, 0);
        assert_eq!(out[0].end_ms, 2000);
        assert_eq!(out[1].text, "新句子");
    }

    #[test]
    fn test_dialogue_dash_forces_break() {
        let cues = vec![cue(0, 1000, "question"), cue(1000, 2000, "- answer")];
        let out = semantic_restructure(&cues, 250, 15_000);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_oversized_merge_splits_at_pause() {
        let cues = vec![
            cue(0, 1000, "很长的片段，"),
            cue(1000, 2000, "另一个片段"),
            cue(2000, 3000, "结尾。"),
        ];
        // max_chars tiny, so the merged cue must split at the pause after
        // the first fragment.
        let out = semantic_restructure(&cues, 6, 15_000);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].text, "很长的片段，");
        assert_eq!(out[1].text, "另一个片段 结尾。");
        assert_eq!(out[1].start_ms, 1000);
    }

    #[test]
    fn test_duration_cap_triggers_split() {
        let cues = vec![
            cue(0, 9000, "开头，"),
            cue(9000, 20_000, "然后结束。"),
        ];
        let out = semantic_restructure(&cues, 250, 15_000);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_blank_fragments_drop_from_joined_text() {
        let cues = vec![cue(0, 1000, "  "), cue(1000, 2000, "words。")];
        let out = semantic_restructure(&cues, 250, 15_000);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "words。");
    }
}
