use crate::fetch::MediaSnapshot;
use crate::model::PollState;
use crate::monitor::ledger::ErrorType;

use super::{Check, CheckFinding, HealthCounter};

/// Detects forward media-sequence jumps past the tolerated gap.
///
/// Gaps of 1 or 2 stay silent: with a 7 s poll period over ~6 s segments
/// the sequence routinely advances by two between polls.
pub struct SequenceJumpCheck {
    gap_threshold: i64,
}

impl SequenceJumpCheck {
    pub fn new(gap_threshold: i64) -> Self {
        Self { gap_threshold }
    }
}

impl Default for SequenceJumpCheck {
    fn default() -> Self {
        Self::new(3)
    }
}

impl Check for SequenceJumpCheck {
    fn name(&self) -> &'static str {
        "SequenceJump"
    }

    fn check(&self, prev: &PollState, curr: &MediaSnapshot) -> Vec<CheckFinding> {
        if prev.last_media_sequence == -1 {
            return vec![];
        }
        let expected = prev.last_media_sequence + 1;
        if curr.media_sequence > expected {
            let gap = curr.media_sequence - expected;
            if gap >= self.gap_threshold {
                return vec![CheckFinding {
                    error_type: ErrorType::MediaSequence,
                    details: format!(
                        "Sequence jumped from {} to {} (gap: {})",
                        prev.last_media_sequence, curr.media_sequence, gap
                    ),
                    counter: Some(HealthCounter::SequenceJumps),
                }];
            }
        }
        vec![]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::SegmentInfo;

    fn seen(mseq: i64) -> PollState {
        PollState {
            last_poll_time: None,
            last_media_sequence: mseq,
            consecutive_stales: 0,
        }
    }

    fn playlist(mseq: i64) -> MediaSnapshot {
        MediaSnapshot {
            media_sequence: mseq,
            target_duration: 6.0,
            discontinuity_sequence: 0,
            playlist_type: None,
            segments: vec![SegmentInfo {
                uri: format!("seg_{}.ts", mseq),
                duration: 6.0,
                discontinuity: false,
            }],
        }
    }

    #[test]
    fn flags_gap_at_threshold() {
        let findings = SequenceJumpCheck::default().check(&seen(100), &playlist(105));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].error_type, ErrorType::MediaSequence);
        assert_eq!(findings[0].details, "Sequence jumped from 100 to 105 (gap: 4)");
        assert_eq!(findings[0].counter, Some(HealthCounter::SequenceJumps));
    }

    #[test]
    fn tolerates_small_gaps() {
        let check = SequenceJumpCheck::default();
        assert!(check.check(&seen(100), &playlist(101)).is_empty());
        assert!(check.check(&seen(100), &playlist(102)).is_empty());
        assert!(check.check(&seen(100), &playlist(103)).is_empty());
    }

    #[test]
    fn smallest_flagged_gap() {
        let findings = SequenceJumpCheck::default().check(&seen(100), &playlist(104));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].details, "Sequence jumped from 100 to 104 (gap: 3)");
    }

    #[test]
    fn silent_without_baseline() {
        let findings = SequenceJumpCheck::default().check(&seen(-1), &playlist(500));
        assert!(findings.is_empty());
    }

    #[test]
    fn silent_on_regression() {
        let findings = SequenceJumpCheck::default().check(&seen(100), &playlist(50));
        assert!(findings.is_empty());
    }

    #[test]
    fn custom_threshold() {
        let findings = SequenceJumpCheck::new(10).check(&seen(100), &playlist(105));
        assert!(findings.is_empty());
    }
}
