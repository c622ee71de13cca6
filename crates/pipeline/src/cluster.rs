//! Utterance clustering for Mode A.
//!
//! Consecutive cues that read as one utterance are synthesised in a single
//! TTS call, which removes the choppiness of per-cue prosody. Clustering
//! is an optimisation only; a run with one cue per cluster is just as
//! valid.

use redub_core::{extract_speaker, Cue};

/// Terminal punctuation that closes an utterance.
const TERMINALS: [char; 6] = ['.', '?', '!', '。', '？', '！'];

/// Groups of consecutive cue indices forming one utterance each. Order is
/// preserved within and across clusters.
pub fn cluster_cues(cues: &[Cue]) -> Vec<Vec<usize>> {
    let mut clusters: Vec<Vec<usize>> = Vec::new();
    let mut buf: Vec<usize> = Vec::new();
    let mut prev_speaker: Option<String> = None;

    for (idx, cue) in cues.iter().enumerate() {
        let (speaker, _) = extract_speaker(&cue.text);
        if buf.is_empty() {
            buf.push(idx);
            prev_speaker = speaker;
            continue;
        }
        let speaker_changed = speaker.is_some() && speaker != prev_speaker;
        let last_text = &cues[buf[buf.len() - 1]].text;
        if speaker_changed || starts_with_dialogue_dash(&cue.text) || ends_terminal(last_text) {
            clusters.push(std::mem::take(&mut buf));
            buf.push(idx);
            prev_speaker = speaker;
        } else {
            buf.push(idx);
        }
    }
    if !buf.is_empty() {
        clusters.push(buf);
    }
    clusters
}

pub fn ends_terminal(text: &str) -> bool {
    text.trim()
        .chars()
        .last()
        .map(|c| TERMINALS.contains(&c))
        .unwrap_or(false)
}

pub fn starts_with_dialogue_dash(text: &str) -> bool {
    let s = text.trim_start();
    s.starts_with('-') || s.starts_with('—')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cues(texts: &[&str]) -> Vec<Cue> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| Cue::new(i as u32 * 1000, i as u32 * 1000 + 1000, *t))
            .collect()
    }

    #[test]
    fn test_terminal_punctuation_splits() {
        let cues = cues(&["First part", "continues here.", "New sentence", "goes on"]);
        let clusters = cluster_cues(&cues);
        assert_eq!(clusters, vec![vec![0, 1], vec![2, 3]]);
    }

    #[test]
    fn test_fullwidth_terminal_splits() {
        let cues = cues(&["第一句。", "第二句开始", "继续"]);
        let clusters = cluster_cues(&cues);
        assert_eq!(clusters, vec![vec![0], vec![1, 2]]);
    }

    #[test]
    fn test_dialogue_dash_starts_cluster() {
        let cues = cues(&["someone talking", "- a reply", "still replying"]);
        let clusters = cluster_cues(&cues);
        assert_eq!(clusters, vec![vec![0], vec![1, 2]]);
    }

    #[test]
    fn test_speaker_change_starts_cluster() {
        let cues = cues(&[
            "[Speaker: Alice] hello and",
            "more from alice",
            "[Speaker: Bob] bob now",
        ]);
        let clusters = cluster_cues(&cues);
        assert_eq!(clusters, vec![vec![0, 1], vec![2]]);
    }

    #[test]
    fn test_same_speaker_tag_does_not_split() {
        let cues = cues(&["[Speaker: Alice] hello and", "[Speaker: Alice] more words"]);
        assert_eq!(cluster_cues(&cues), vec![vec![0, 1]]);
    }

    #[test]
    fn test_empty_input() {
        assert!(cluster_cues(&[]).is_empty());
    }
}
