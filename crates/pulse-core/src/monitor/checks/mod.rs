pub mod media_sequence;
pub mod playlist_content;
pub mod sequence_jump;
pub mod stale_manifest;

use crate::fetch::MediaSnapshot;
use crate::model::PollState;
use crate::monitor::ledger::ErrorType;

/// Health counter a finding advances when it is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthCounter {
    SequenceJumps,
    SequenceResets,
}

/// A violation detected by a check, ready to become a ledger entry.
#[derive(Debug, Clone)]
pub struct CheckFinding {
    pub error_type: ErrorType,
    pub details: String,
    pub counter: Option<HealthCounter>,
}

/// Trait for a composable playlist validation check.
///
/// Each check receives the cached poll state and the freshly-fetched
/// media playlist, and returns zero or more findings. Checks that gate
/// the evaluator itself (content, staleness) live in this module as free
/// functions the engine applies directly.
pub trait Check: Send + Sync {
    /// Human-readable name of this check.
    fn name(&self) -> &'static str;

    /// Run the check and return any findings.
    fn check(&self, prev: &PollState, curr: &MediaSnapshot) -> Vec<CheckFinding>;
}

/// Build the default set of sequence checks.
pub fn default_checks() -> Vec<Box<dyn Check>> {
    vec![
        Box::new(sequence_jump::SequenceJumpCheck::default()),
        Box::new(media_sequence::MediaSequenceCheck),
    ]
}
