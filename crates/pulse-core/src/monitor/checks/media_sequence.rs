use crate::fetch::MediaSnapshot;
use crate::model::PollState;
use crate::monitor::ledger::ErrorType;

use super::{Check, CheckFinding, HealthCounter};

/// Detects media sequence regressions (current mseq < previous mseq),
/// typically an encoder restart. The regressed sequence is adopted as the
/// new baseline by the engine after the finding is recorded.
pub struct MediaSequenceCheck;

impl Check for MediaSequenceCheck {
    fn name(&self) -> &'static str {
        "MediaSequence"
    }

    fn check(&self, prev: &PollState, curr: &MediaSnapshot) -> Vec<CheckFinding> {
        if prev.last_media_sequence == -1 {
            return vec![];
        }
        if curr.media_sequence < prev.last_media_sequence {
            vec![CheckFinding {
                error_type: ErrorType::MediaSequence,
                details: format!(
                    "Sequence reset from {} to {}",
                    prev.last_media_sequence, curr.media_sequence
                ),
                counter: Some(HealthCounter::SequenceResets),
            }]
        } else {
            vec![]
        }
    }
}
