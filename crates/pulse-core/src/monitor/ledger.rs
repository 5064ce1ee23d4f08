use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::model::StreamRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorType {
    #[serde(rename = "Manifest Retrieval")]
    ManifestRetrieval,
    #[serde(rename = "Media Sequence")]
    MediaSequence,
    #[serde(rename = "Playlist Size")]
    PlaylistSize,
    #[serde(rename = "Playlist Content")]
    PlaylistContent,
    #[serde(rename = "Segment Continuity")]
    SegmentContinuity,
    #[serde(rename = "Discontinuity Sequence")]
    DiscontinuitySequence,
    #[serde(rename = "Stale Manifest")]
    StaleManifest,
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ManifestRetrieval => write!(f, "Manifest Retrieval"),
            Self::MediaSequence => write!(f, "Media Sequence"),
            Self::PlaylistSize => write!(f, "Playlist Size"),
            Self::PlaylistContent => write!(f, "Playlist Content"),
            Self::SegmentContinuity => write!(f, "Segment Continuity"),
            Self::DiscontinuitySequence => write!(f, "Discontinuity Sequence"),
            Self::StaleManifest => write!(f, "Stale Manifest"),
        }
    }
}

/// One ledger entry on a stream record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamError {
    pub eid: String,
    pub date: DateTime<Utc>,
    pub error_type: ErrorType,
    pub media_type: String,
    pub variant: String,
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Unique ledger entry id: `eid-<unix-ms>-<9-char-base36>`.
pub fn make_eid(now: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("eid-{}-{}", now.timestamp_millis(), suffix)
}

/// Append an entry to the stream's ledger and update the error counters:
/// bumps `totalErrors`, zeroes `timeSinceLastError`, stamps `lastErrorTime`.
/// The variant is the stream's current bandwidth, or "unknown" before the
/// first master-playlist poll.
pub fn append(
    record: &mut StreamRecord,
    error_type: ErrorType,
    details: impl Into<String>,
    media_type: &str,
    code: Option<u16>,
) {
    let now = Utc::now();
    let variant = if record.stats.bandwidth > 0 {
        record.stats.bandwidth.to_string()
    } else {
        "unknown".to_string()
    };

    record.stream_errors.push(StreamError {
        eid: make_eid(now),
        date: now,
        error_type,
        media_type: media_type.to_string(),
        variant,
        details: details.into(),
        code,
    });
    record.health.total_errors += 1;
    record.health.time_since_last_error = 0;
    record.health.last_error_time = Some(now);
}

/// Drop ledger entries older than the retention horizon. Runs on every
/// persist and never fails; entries carry typed dates so there is nothing
/// malformed to repair.
pub fn age_out(errors: &mut Vec<StreamError>, retention: Duration, now: DateTime<Utc>) {
    let cutoff = now - chrono::Duration::milliseconds(retention.as_millis() as i64);
    errors.retain(|e| e.date >= cutoff);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> StreamRecord {
        StreamRecord::new("s1", "Channel 1", "https://example.com/master.m3u8")
    }

    #[test]
    fn eid_format() {
        let now = Utc::now();
        let eid = make_eid(now);
        let parts: Vec<&str> = eid.splitn(3, '-').collect();
        assert_eq!(parts[0], "eid");
        assert_eq!(parts[1], now.timestamp_millis().to_string());
        assert_eq!(parts[2].len(), 9);
        assert!(parts[2].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn eids_are_unique() {
        let now = Utc::now();
        let a = make_eid(now);
        let b = make_eid(now);
        assert_ne!(a, b);
    }

    #[test]
    fn append_updates_counters() {
        let mut r = record();
        append(
            &mut r,
            ErrorType::ManifestRetrieval,
            "Failed to fetch manifest",
            "VIDEO",
            Some(503),
        );
        assert_eq!(r.stream_errors.len(), 1);
        assert_eq!(r.health.total_errors, 1);
        assert_eq!(r.health.time_since_last_error, 0);
        assert!(r.health.last_error_time.is_some());

        let e = &r.stream_errors[0];
        assert_eq!(e.error_type, ErrorType::ManifestRetrieval);
        assert_eq!(e.variant, "unknown");
        assert_eq!(e.code, Some(503));
    }

    #[test]
    fn append_uses_bandwidth_as_variant() {
        let mut r = record();
        r.stats.bandwidth = 1212000;
        append(&mut r, ErrorType::MediaSequence, "Sequence reset from 100 to 50", "VIDEO", None);
        assert_eq!(r.stream_errors[0].variant, "1212000");
    }

    #[test]
    fn age_out_drops_old_entries() {
        let mut r = record();
        append(&mut r, ErrorType::StaleManifest, "old", "VIDEO", None);
        append(&mut r, ErrorType::StaleManifest, "fresh", "VIDEO", None);
        r.stream_errors[0].date = Utc::now() - chrono::Duration::days(8);

        age_out(
            &mut r.stream_errors,
            Duration::from_secs(7 * 24 * 3600),
            Utc::now(),
        );
        assert_eq!(r.stream_errors.len(), 1);
        assert_eq!(r.stream_errors[0].details, "fresh");
        // totalErrors keeps counting aged-out entries.
        assert_eq!(r.health.total_errors, 2);
    }

    #[test]
    fn error_type_serializes_display_names() {
        let json = serde_json::to_string(&ErrorType::ManifestRetrieval).unwrap();
        assert_eq!(json, "\"Manifest Retrieval\"");
        let json = serde_json::to_string(&ErrorType::StaleManifest).unwrap();
        assert_eq!(json, "\"Stale Manifest\"");
    }

    #[test]
    fn entry_serializes_camel_case() {
        let mut r = record();
        append(&mut r, ErrorType::MediaSequence, "Sequence jumped from 100 to 105 (gap: 4)", "VIDEO", None);
        let json = serde_json::to_value(&r.stream_errors[0]).unwrap();
        assert_eq!(json["errorType"], "Media Sequence");
        assert_eq!(json["mediaType"], "VIDEO");
        assert!(json["eid"].as_str().unwrap().starts_with("eid-"));
        assert!(json.get("code").is_none());
    }
}
