//! Sliding-window issue counts, time-decayed forgiveness, and the
//! health/video/audio scoring arithmetic.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::model::{StreamRecord, StreamStatus};
use crate::monitor::ledger::StreamError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecentIssues {
    pub jumps: u64,
    pub resets: u64,
    pub errors: u64,
}

/// Classify ledger entries inside the sliding window.
///
/// The `SEQUENCE_JUMP`/`SEQUENCE_RESET` type tokens are retained for
/// forward compatibility; current ledger entries only match the substring
/// checks.
pub fn recent_issues(errors: &[StreamError], window: Duration, now: DateTime<Utc>) -> RecentIssues {
    let cutoff = now - chrono::Duration::milliseconds(window.as_millis() as i64);
    let mut out = RecentIssues::default();
    for e in errors.iter().filter(|e| e.date >= cutoff) {
        let ty = e.error_type.to_string();
        if ty == "SEQUENCE_RESET" || e.details.contains("reset") {
            out.resets += 1;
        }
        if ty == "SEQUENCE_JUMP" || e.details.contains("Sequence jumped") {
            out.jumps += 1;
        }
        out.errors += 1;
    }
    out
}

/// Forgiveness factor in [0, 1] as a function of hours since the last
/// error. No error ever recorded means full forgiveness.
pub fn decay_factor(last_error_time: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(t) = last_error_time else {
        return 1.0;
    };
    let hours = (now - t).num_milliseconds() as f64 / 3_600_000.0;
    if !hours.is_finite() || hours < 0.0 {
        return 0.0;
    }
    match hours {
        h if h < 1.0 => 0.0,
        h if h < 6.0 => 0.25,
        h if h < 24.0 => 0.5,
        h if h < 72.0 => 0.75,
        _ => 0.9,
    }
}

/// Overall health score in [0, 100].
///
/// Status penalties are additive. Recent-issue penalties are scaled by
/// `1 − decay`; without a window snapshot the all-time counters apply with
/// no decay.
pub fn health_score(record: &StreamRecord, recent: Option<&RecentIssues>, decay: f64) -> f64 {
    let mut score = 100.0;
    if record.health.is_stale {
        score -= 30.0;
    }
    if record.status == StreamStatus::Error {
        score -= 40.0;
    }
    if record.status == StreamStatus::Offline {
        score -= 50.0;
    }

    let (jumps, resets, errors, pen) = match recent {
        Some(r) => (r.jumps, r.resets, r.errors, 1.0 - decay),
        None => (
            record.health.sequence_jumps,
            record.health.sequence_resets,
            record.health.total_errors,
            1.0,
        ),
    };

    score -= (jumps as f64 * 5.0).min(20.0) * pen;
    score -= (resets as f64 * 10.0).min(30.0) * pen;
    score -= (errors as f64 * 2.0).min(20.0) * pen;

    score.clamp(0.0, 100.0)
}

/// Video quality score in [0, 100]; 50 when nothing has been probed yet.
pub fn video_score(record: &StreamRecord) -> f64 {
    let Some(video) = &record.stats.video else {
        return 50.0;
    };
    let mut score: f64 = 100.0;
    if video.codec.is_none() {
        score -= 20.0;
    }
    if video.width < 720 {
        score -= 10.0;
    }
    score.clamp(0.0, 100.0)
}

/// Audio quality score in [0, 100]; 50 when nothing has been probed yet.
pub fn audio_score(record: &StreamRecord) -> f64 {
    let Some(audio) = &record.stats.audio else {
        return 50.0;
    };
    let mut score: f64 = 100.0;
    if audio.codec.is_none() {
        score -= 20.0;
    }
    if audio.sample_rate < 44100 {
        score -= 10.0;
    }
    if audio.is_silent {
        score -= 15.0;
    }
    score.clamp(0.0, 100.0)
}

/// Video signal level: 100 at 5 Mbps.
pub fn video_level(video_bitrate: u64) -> f64 {
    ((video_bitrate as f64 / 5_000_000.0) * 100.0).clamp(0.0, 100.0)
}

/// Audio signal level: 100 at 320 kbps.
pub fn audio_level(audio_bitrate: u64) -> f64 {
    ((audio_bitrate as f64 / 320_000.0) * 100.0).clamp(0.0, 100.0)
}

/// Live-signal jitter: ±5 around the level, re-clamped.
pub fn jittered(level: f64) -> f64 {
    let jitter = rand::thread_rng().gen_range(-5.0..=5.0);
    (level + jitter).clamp(0.0, 100.0)
}
