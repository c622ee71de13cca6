//! Timeline redistribution: borrow visual time from under-dense
//! neighbours to relieve over-dense cues.
//!
//! Interval-only transform. Text never moves, the overall span never
//! moves, and iteration stops at a fixed point or after three sweeps.

use redub_config::RebalanceConfig;
use redub_core::{assert_text_equal, cpm, span, Cue, Error, Result};

const MAX_SWEEPS: usize = 3;

/// Rebalance cue intervals toward `target_cpm`. Returns a new list; the
/// input is untouched.
pub fn rebalance(cues: &[Cue], cfg: &RebalanceConfig) -> Result<Vec<Cue>> {
    if cues.is_empty() {
        return Ok(Vec::new());
    }

    let ideal_ms: Vec<i64> = cues
        .iter()
        .map(|c| ((c.char_count() as f64 / cfg.target_cpm as f64) * 60_000.0).round() as i64)
        .collect();

    let mut items: Vec<Cue> = cues.to_vec();
    let n = items.len();

    for sweep in 0..MAX_SWEEPS {
        let mut changed = false;
        for i in 0..n {
            let actual = i64::from(items[i].duration_ms());
            let deficit = ideal_ms[i] - actual;
            if deficit <= 0 {
                continue;
            }

            let left_surplus = if i > 0 {
                (i64::from(items[i - 1].duration_ms()) - ideal_ms[i - 1]).max(0)
            } else {
                0
            };
            let right_surplus = if i + 1 < n {
                (i64::from(items[i + 1].duration_ms()) - ideal_ms[i + 1]).max(0)
            } else {
                0
            };

            let mut borrow_left = (deficit / 2).min(left_surplus);
            let mut borrow_right = (deficit - borrow_left).min(right_surplus);

            let panic = cpm(&items[i].text, u64::from(items[i].duration_ms()))
                > f64::from(cfg.panic_cpm);
            let cap = if panic {
                i64::from(cfg.max_shift_ms) * 2
            } else {
                i64::from(cfg.max_shift_ms)
            };
            borrow_left = borrow_left.min(cap);
            borrow_right = borrow_right.min(cap);

            if borrow_left > 0 && i > 0 {
                let shift = borrow_left as u32;
                items[i - 1].end_ms =
                    items[i - 1].end_ms.saturating_sub(shift).max(items[i - 1].start_ms);
                items[i].start_ms = items[i].start_ms.saturating_sub(shift);
                changed = true;
            }
            if borrow_right > 0 && i + 1 < n {
                let shift = borrow_right as u32;
                items[i].end_ms += shift;
                items[i + 1].start_ms += shift;
                changed = true;
            }
        }
        if !changed {
            tracing::debug!(sweeps = sweep, "rebalance reached fixed point");
            break;
        }
    }

    assert_text_equal(cues, &items)?;
    if span(cues) != span(&items) {
        return Err(Error::Invariant("rebalance moved the overall span".into()));
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(target_cpm: u32, max_shift_ms: u32, panic_cpm: u32) -> RebalanceConfig {
        RebalanceConfig {
            enabled: true,
            target_cpm,
            max_shift_ms,
            panic_cpm,
        }
    }

    fn cue(start: u32, end: u32, text: &str) -> Cue {
        Cue::new(start, end, text)
    }

    #[test]
    fn test_dense_middle_cue_grows_bidirectionally() {
        let cues = vec![
            cue(0, 4000, "短文本"),
            cue(4000, 6000, "这是一个很长很长的中文句子，用来模拟高密度片段"),
            cue(6000, 9000, "短文"),
        ];
        let before_mid = cues[1].duration_ms();
        let out = rebalance(&cues, &cfg(260, 1000, 350)).unwrap();

        assert!(out[1].duration_ms() > before_mid);
        assert!(out[0].end_ms <= 4000);
        assert!(out[2].start_ms >= 6000);
        // Text vector element-wise identical.
        for (a, b) in cues.iter().zip(&out) {
            assert_eq!(a.text, b.text);
        }
    }

    #[test]
    fn test_span_preserved_exactly() {
        let cues = vec![
            cue(500, 4000, "ab"),
            cue(4000, 5000, &"字".repeat(40)),
            cue(5000, 8800, "cd"),
        ];
        let out = rebalance(&cues, &cfg(200, 1000, 300)).unwrap();
        assert_eq!(out.first().unwrap().start_ms, 500);
        assert_eq!(out.last().unwrap().end_ms, 8800);
    }

    #[test]
    fn test_idempotent() {
        let cues = vec![
            cue(0, 4000, "短文本"),
            cue(4000, 6000, "这是一个很长很长的中文句子，用来模拟高密度片段"),
            cue(6000, 9000, "短文"),
        ];
        let c = cfg(260, 1000, 350);
        let once = rebalance(&cues, &c).unwrap();
        let twice = rebalance(&once, &c).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_no_overlap_after_rebalance() {
        let cues = vec![
            cue(0, 3000, "a"),
            cue(3000, 3500, &"长".repeat(30)),
            cue(3500, 7000, "b"),
        ];
        let out = rebalance(&cues, &cfg(180, 1000, 300)).unwrap();
        for pair in out.windows(2) {
            assert!(pair[0].end_ms <= pair[1].start_ms);
            assert!(pair[0].start_ms < pair[0].end_ms);
        }
    }

    #[test]
    fn test_satisfied_cues_untouched() {
        let cues = vec![cue(0, 5000, "hi"), cue(5000, 10_000, "there")];
        let out = rebalance(&cues, &cfg(180, 1000, 300)).unwrap();
        assert_eq!(out, cues);
    }

    #[test]
    fn test_panic_cue_borrows_past_normal_cap() {
        // Middle cue at ~3600 cpm, way past panic. Neighbours have huge
        // surplus; the doubled cap is what limits the borrow.
        let cues = vec![
            cue(0, 10_000, "a"),
            cue(10_000, 10_500, &"字".repeat(30)),
            cue(10_500, 20_000, "b"),
        ];
        let normal = rebalance(&cues, &cfg(180, 500, 300)).unwrap();
        let grown = normal[1].duration_ms();
        // cap 500 doubled to 1000 per side per sweep
        assert!(grown > 500 + 500, "grew to {grown}");
    }

    #[test]
    fn test_empty_and_single() {
        assert!(rebalance(&[], &cfg(180, 1000, 300)).unwrap().is_empty());
        let single = vec![cue(100, 900, &"字".repeat(20))];
        // Nowhere to borrow from; intervals stay put.
        assert_eq!(rebalance(&single, &cfg(180, 1000, 300)).unwrap(), single);
    }
}
