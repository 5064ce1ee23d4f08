use crate::monitor::ledger::ErrorType;

use super::CheckFinding;

/// Flags a manifest whose media sequence has not advanced within the
/// stream's staleness threshold. The engine only consults this when the
/// sequence is unchanged from the previous poll; crossing the threshold
/// also flips the stream to stale.
pub fn check_stale(elapsed_ms: i64, threshold_ms: i64) -> Option<CheckFinding> {
    if elapsed_ms > threshold_ms {
        Some(CheckFinding {
            error_type: ErrorType::StaleManifest,
            details: format!(
                "Manifest unchanged for {}ms (threshold: {}ms)",
                elapsed_ms, threshold_ms
            ),
            counter: None,
        })
    } else {
        None
    }
}
