use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::monitor::ledger::StreamError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Online,
    Offline,
    Error,
    Stale,
}

impl std::fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
            Self::Error => write!(f, "error"),
            Self::Stale => write!(f, "stale"),
        }
    }
}

/// Durable record for one monitored stream. Field names serialize in
/// camelCase for compatibility with existing store documents and event
/// consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamRecord {
    pub id: String,
    pub name: String,
    pub url: String,
    pub status: StreamStatus,
    pub health: HealthBlock,
    pub stats: StatsBlock,
    pub stream_errors: Vec<StreamError>,
    /// `data:image/jpeg;base64,...` URL, or empty before the first capture.
    pub thumbnail: String,
    pub last_checked: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Monotonic counter checked on save for optimistic concurrency.
    pub version: u64,
}

impl StreamRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            url: url.into(),
            status: StreamStatus::Offline,
            health: HealthBlock::default(),
            stats: StatsBlock::default(),
            stream_errors: Vec::new(),
            thumbnail: String::new(),
            last_checked: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthBlock {
    pub is_stale: bool,
    pub last_manifest_update: Option<DateTime<Utc>>,
    /// Milliseconds since the manifest last advanced, measured at poll time.
    pub time_since_last_update: i64,
    /// Per-stream staleness threshold in milliseconds.
    pub stale_threshold: i64,
    /// −1 until the first successful poll.
    pub media_sequence: i64,
    pub previous_media_sequence: i64,
    pub sequence_jumps: u64,
    pub sequence_resets: u64,
    pub discontinuity_sequence: i64,
    /// Recomputed from the segment list on every poll; not monotonic.
    pub discontinuity_count: u64,
    pub segment_count: u64,
    pub target_duration: f64,
    pub playlist_type: String,
    pub total_errors: u64,
    /// Informational only: zeroed on each ledger append, never advanced.
    pub time_since_last_error: i64,
    pub last_error_time: Option<DateTime<Utc>>,
    pub recent_errors: u64,
    pub recent_sequence_jumps: u64,
    pub recent_sequence_resets: u64,
}

impl Default for HealthBlock {
    fn default() -> Self {
        Self {
            is_stale: false,
            last_manifest_update: None,
            time_since_last_update: 0,
            stale_threshold: 7000,
            media_sequence: -1,
            previous_media_sequence: -1,
            sequence_jumps: 0,
            sequence_resets: 0,
            discontinuity_sequence: 0,
            discontinuity_count: 0,
            segment_count: 0,
            target_duration: 0.0,
            playlist_type: "LIVE".to_string(),
            total_errors: 0,
            time_since_last_error: 0,
            last_error_time: None,
            recent_errors: 0,
            recent_sequence_jumps: 0,
            recent_sequence_resets: 0,
        }
    }
}

/// Media characteristics filled in by the analysis pipeline. Absent
/// sub-records mean "not yet probed", which the scorer treats as unknown.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsBlock {
    pub bandwidth: u64,
    pub resolution: String,
    pub fps: f64,
    pub video: Option<VideoStats>,
    pub audio: Option<AudioStats>,
    pub container: Option<ContainerStats>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStats {
    pub codec: Option<String>,
    pub profile: String,
    pub level: String,
    pub width: u32,
    pub height: u32,
    pub pixel_format: String,
    pub color_space: String,
    pub bit_rate: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioStats {
    pub codec: Option<String>,
    pub channels: u32,
    pub sample_rate: u32,
    pub bit_rate: u64,
    pub peak_db: Option<f64>,
    pub avg_db: Option<f64>,
    pub channel_layout: String,
    pub is_silent: bool,
}

impl Default for AudioStats {
    fn default() -> Self {
        Self {
            codec: None,
            channels: 0,
            sample_rate: 0,
            bit_rate: 0,
            peak_db: None,
            avg_db: None,
            channel_layout: "Unknown".to_string(),
            is_silent: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStats {
    pub format_name: String,
    pub duration: f64,
    pub size: u64,
    pub bit_rate: u64,
}

/// One score sample per stream per poll. Retention is enforced by the
/// store's TTL on `timestamp`; the monitor only appends.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSample {
    pub stream_id: String,
    pub health_score: f64,
    pub video_score: f64,
    pub audio_score: f64,
    pub video_bitrate: u64,
    pub audio_bitrate: u64,
    pub video_level: f64,
    pub audio_level: f64,
    pub fps: f64,
    pub status: StreamStatus,
    pub media_sequence: i64,
    pub segment_count: u64,
    pub error_count: u64,
    pub timestamp: DateTime<Utc>,
}

/// In-memory poll state for one stream. Created lazily on the first
/// observation and discarded on restart.
#[derive(Debug, Clone, Copy)]
pub struct PollState {
    pub last_poll_time: Option<DateTime<Utc>>,
    pub last_media_sequence: i64,
    pub consecutive_stales: u32,
}

impl Default for PollState {
    fn default() -> Self {
        Self {
            last_poll_time: None,
            last_media_sequence: -1,
            consecutive_stales: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_defaults() {
        let r = StreamRecord::new("s1", "Channel 1", "https://example.com/master.m3u8");
        assert_eq!(r.status, StreamStatus::Offline);
        assert_eq!(r.health.media_sequence, -1);
        assert_eq!(r.health.previous_media_sequence, -1);
        assert_eq!(r.health.stale_threshold, 7000);
        assert_eq!(r.health.playlist_type, "LIVE");
        assert!(r.stream_errors.is_empty());
        assert!(r.thumbnail.is_empty());
        assert_eq!(r.version, 0);
    }

    #[test]
    fn record_serializes_camel_case() {
        let r = StreamRecord::new("s1", "Channel 1", "https://example.com/master.m3u8");
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["status"], "offline");
        assert_eq!(json["health"]["isStale"], false);
        assert_eq!(json["health"]["mediaSequence"], -1);
        assert_eq!(json["health"]["staleThreshold"], 7000);
        assert!(json["streamErrors"].as_array().unwrap().is_empty());
        assert!(json.get("stream_errors").is_none());
    }

    #[test]
    fn poll_state_default_is_unseen() {
        let s = PollState::default();
        assert_eq!(s.last_media_sequence, -1);
        assert!(s.last_poll_time.is_none());
        assert_eq!(s.consecutive_stales, 0);
    }
}
