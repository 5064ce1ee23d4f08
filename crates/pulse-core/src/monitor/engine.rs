use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::analysis::Analyzer;
use crate::config::MonitorConfig;
use crate::event::{publish, EventSender, StreamEvent};
use crate::fetch::{self, FetchError, Manifest, ManifestFetcher, MediaSnapshot};
use crate::model::{MetricsSample, PollState, StreamRecord, StreamStatus};
use crate::monitor::checks::{self, Check, CheckFinding, HealthCounter};
use crate::monitor::ledger::{self, ErrorType};
use crate::monitor::scoring::{self, RecentIssues};
use crate::store::{MetricsStore, StreamStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    Idle,
    Active,
    Stopping,
    Stopped,
}

impl MonitorState {
    /// Whether the sweep loop should keep scheduling polls.
    pub fn is_active(self) -> bool {
        self == MonitorState::Active
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for MonitorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone)]
struct SweepDeps {
    config: MonitorConfig,
    fetcher: Arc<dyn ManifestFetcher>,
    store: Arc<dyn StreamStore>,
    metrics: Arc<dyn MetricsStore>,
    checks: Arc<Vec<Box<dyn Check>>>,
    analyzer: Option<Arc<Analyzer>>,
    events: EventSender,
}

/// The monitor engine: a singleton scheduler that sweeps all stream
/// records sequentially, runs the playlist evaluator on each, and spaces
/// sweeps by a fixed delay after completion.
pub struct Monitor {
    deps: SweepDeps,
    // Holding this lock for the duration of a sweep is the reentry guard;
    // the map is only ever touched under it.
    poll_state: Arc<Mutex<HashMap<String, PollState>>>,
    state: Arc<RwLock<MonitorState>>,
    created_at: DateTime<Utc>,
}

impl Monitor {
    pub fn new(
        config: MonitorConfig,
        fetcher: Arc<dyn ManifestFetcher>,
        store: Arc<dyn StreamStore>,
        metrics: Arc<dyn MetricsStore>,
        analyzer: Option<Arc<Analyzer>>,
        events: EventSender,
    ) -> Self {
        Self {
            deps: SweepDeps {
                config,
                fetcher,
                store,
                metrics,
                checks: Arc::new(checks::default_checks()),
                analyzer,
                events,
            },
            poll_state: Arc::new(Mutex::new(HashMap::new())),
            state: Arc::new(RwLock::new(MonitorState::Idle)),
            created_at: Utc::now(),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.deps.config
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub async fn state(&self) -> MonitorState {
        *self.state.read().await
    }

    /// Start the sweep loop. Idempotent: a second call while active is a
    /// no-op.
    pub async fn start(&self) {
        {
            let mut state = self.state.write().await;
            if state.is_active() {
                return;
            }
            *state = MonitorState::Active;
        }

        info!("Starting monitor");

        let state = Arc::clone(&self.state);
        let poll_state = Arc::clone(&self.poll_state);
        let deps = self.deps.clone();

        tokio::spawn(async move {
            loop {
                {
                    let current = *state.read().await;
                    if !current.is_active() {
                        let mut s = state.write().await;
                        *s = MonitorState::Stopped;
                        info!("Monitor stopped");
                        break;
                    }
                }

                run_sweep(&deps, &poll_state).await;

                // Fixed delay from the end of one sweep to the start of
                // the next; sweeps never overlap or queue up.
                tokio::time::sleep(deps.config.poll_interval).await;
            }
        });
    }

    pub async fn stop(&self) {
        let mut state = self.state.write().await;
        if state.is_active() {
            *state = MonitorState::Stopping;
            info!("Stopping monitor");
        }
    }

    /// Run a single sweep. Used by tests and the one-shot CLI path.
    pub async fn poll_once(&self) {
        run_sweep(&self.deps, &self.poll_state).await;
    }
}

async fn run_sweep(deps: &SweepDeps, poll_state: &Mutex<HashMap<String, PollState>>) {
    let mut cache = match poll_state.try_lock() {
        Ok(guard) => guard,
        Err(_) => {
            warn!("Sweep already in flight, skipping");
            return;
        }
    };

    let records = match deps.store.find_all().await {
        Ok(records) => records,
        Err(e) => {
            error!(error = %e, "Failed to load stream records");
            return;
        }
    };

    for mut record in records {
        poll_stream(deps, &mut cache, &mut record).await;
    }
}

/// Record a check finding on the stream: advance the counter it names and
/// append the ledger entry.
fn record_finding(record: &mut StreamRecord, finding: CheckFinding) {
    match finding.counter {
        Some(HealthCounter::SequenceJumps) => record.health.sequence_jumps += 1,
        Some(HealthCounter::SequenceResets) => record.health.sequence_resets += 1,
        None => {}
    }
    ledger::append(record, finding.error_type, finding.details, "VIDEO", None);
}

async fn poll_stream(
    deps: &SweepDeps,
    cache: &mut HashMap<String, PollState>,
    record: &mut StreamRecord,
) {
    let now = Utc::now();
    let cached = cache.get(&record.id).copied().unwrap_or_default();

    let (media, media_url) = match resolve_media_playlist(deps, record).await {
        Ok(resolved) => resolved,
        Err(e) => {
            debug!(stream_id = %record.id, error = %e, "Manifest retrieval failed");
            ledger::append(
                record,
                ErrorType::ManifestRetrieval,
                e.to_string(),
                "VIDEO",
                e.status_code(),
            );
            record.status = StreamStatus::Error;
            persist(deps, record).await;
            publish(&deps.events, StreamEvent::Update(Box::new(record.clone())));
            return;
        }
    };

    if let Some(finding) = checks::playlist_content::check_content(&media, &media_url) {
        record_finding(record, finding);
        record.status = StreamStatus::Error;
        persist(deps, record).await;
        publish(&deps.events, StreamEvent::Update(Box::new(record.clone())));
        return;
    }

    let seq = media.media_sequence;
    let mut consecutive_stales = cached.consecutive_stales;

    // Freshness: an unchanged media sequence past the stale threshold
    // flips the stream to stale; any advance clears it.
    if seq == cached.last_media_sequence {
        consecutive_stales += 1;
        let elapsed_ms = cached
            .last_poll_time
            .map(|t| (now - t).num_milliseconds())
            .unwrap_or(0)
            .max(0);
        record.health.time_since_last_update = elapsed_ms;
        if let Some(finding) =
            checks::stale_manifest::check_stale(elapsed_ms, record.health.stale_threshold)
        {
            record.health.is_stale = true;
            record.status = StreamStatus::Stale;
            record_finding(record, finding);
        }
    } else {
        record.health.is_stale = false;
        record.health.last_manifest_update = Some(now);
        record.health.time_since_last_update = 0;
        consecutive_stales = 0;
        record.status = StreamStatus::Online;
    }

    // Sequence semantics: each check compares the cached baseline against
    // the fresh playlist and reports its findings.
    for check in deps.checks.iter() {
        for finding in check.check(&cached, &media) {
            record_finding(record, finding);
        }
    }

    // Discontinuity accounting: recomputed each poll, adopted on change.
    record.health.discontinuity_count =
        media.segments.iter().filter(|s| s.discontinuity).count() as u64;
    if media.discontinuity_sequence != record.health.discontinuity_sequence {
        record.health.discontinuity_sequence = media.discontinuity_sequence;
    }

    record.health.previous_media_sequence = cached.last_media_sequence;
    record.health.media_sequence = seq;
    record.health.segment_count = media.segments.len() as u64;
    record.health.target_duration = media.target_duration;
    record.health.playlist_type = media
        .playlist_type
        .clone()
        .unwrap_or_else(|| "LIVE".to_string());

    cache.insert(
        record.id.clone(),
        PollState {
            last_poll_time: Some(now),
            last_media_sequence: seq,
            consecutive_stales,
        },
    );

    // Hand the newest segment to the analysis pipeline; the jobs run
    // orthogonally and are not awaited.
    if let (Some(analyzer), Some(last)) = (&deps.analyzer, media.segments.last()) {
        let segment_url = fetch::resolve_uri(&media_url, &last.uri);
        analyzer.analyze_segment(&record.id, &segment_url);
    }

    record.last_checked = Some(now);
    persist(deps, record).await;

    let recent = scoring::recent_issues(&record.stream_errors, deps.config.window_span, now);
    let decay = scoring::decay_factor(record.health.last_error_time, now);
    record.health.recent_errors = recent.errors;
    record.health.recent_sequence_jumps = recent.jumps;
    record.health.recent_sequence_resets = recent.resets;

    let sample = build_sample(record, &recent, decay, now);
    if let Err(e) = deps.metrics.append(sample).await {
        warn!(stream_id = %record.id, error = %e, "Failed to record metrics sample");
    }

    persist(deps, record).await;
    publish(&deps.events, StreamEvent::Update(Box::new(record.clone())));
}

/// Fetch the record's URL and reduce it to a media playlist. A master
/// playlist selects variant 0, captures its bandwidth and resolution, and
/// re-fetches the variant URI.
async fn resolve_media_playlist(
    deps: &SweepDeps,
    record: &mut StreamRecord,
) -> Result<(MediaSnapshot, String), FetchError> {
    let body = deps.fetcher.fetch(&record.url).await?;
    match fetch::parse_manifest(&record.url, &body)? {
        Manifest::Media(media) => Ok((media, record.url.clone())),
        Manifest::Master(master) => {
            let variant = master.variants.first().ok_or_else(|| FetchError::Parse {
                url: record.url.clone(),
                message: "master playlist lists no variants".to_string(),
            })?;

            record.stats.bandwidth = variant.bandwidth;
            if let Some((w, h)) = variant.resolution {
                record.stats.resolution = format!("{}x{}", w, h);
            }

            let variant_url = fetch::resolve_uri(&record.url, &variant.uri);
            let body = deps.fetcher.fetch(&variant_url).await?;
            let media = fetch::parse_media_manifest(&variant_url, &body)?;
            Ok((media, variant_url))
        }
    }
}

/// Persist with the ledger aged out first. Version conflicts are dropped
/// silently per policy; other store errors are logged and the sweep moves
/// on.
async fn persist(deps: &SweepDeps, record: &mut StreamRecord) {
    ledger::age_out(
        &mut record.stream_errors,
        deps.config.error_retention,
        Utc::now(),
    );
    match deps.store.save(record).await {
        Ok(()) => {}
        Err(e) if e.is_conflict() => {
            debug!(stream_id = %record.id, "Dropped save on version conflict");
        }
        Err(e) => {
            warn!(stream_id = %record.id, error = %e, "Failed to persist stream record");
        }
    }
}

fn build_sample(
    record: &StreamRecord,
    recent: &RecentIssues,
    decay: f64,
    now: DateTime<Utc>,
) -> MetricsSample {
    let video_bitrate = record.stats.video.as_ref().map(|v| v.bit_rate).unwrap_or(0);
    let audio_bitrate = record.stats.audio.as_ref().map(|a| a.bit_rate).unwrap_or(0);

    MetricsSample {
        stream_id: record.id.clone(),
        health_score: scoring::health_score(record, Some(recent), decay),
        video_score: scoring::video_score(record),
        audio_score: scoring::audio_score(record),
        video_bitrate,
        audio_bitrate,
        video_level: scoring::video_level(video_bitrate),
        audio_level: scoring::audio_level(audio_bitrate),
        fps: record.stats.fps,
        status: record.status,
        media_sequence: record.health.media_sequence,
        segment_count: record.health.segment_count,
        error_count: record.stream_errors.len() as u64,
        timestamp: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_active_keeps_sweeping() {
        assert!(MonitorState::Active.is_active());
        assert!(!MonitorState::Idle.is_active());
        assert!(!MonitorState::Stopping.is_active());
        assert!(!MonitorState::Stopped.is_active());
    }

    #[test]
    fn lifecycle_labels() {
        assert_eq!(MonitorState::Idle.as_str(), "idle");
        assert_eq!(MonitorState::Active.to_string(), "active");
        assert_eq!(
            serde_json::to_string(&MonitorState::Stopping).unwrap(),
            "\"stopping\""
        );
    }

    #[test]
    fn finding_with_counter_advances_health() {
        let mut record = StreamRecord::new("s1", "Test", "https://example.com/master.m3u8");
        record_finding(
            &mut record,
            CheckFinding {
                error_type: ErrorType::MediaSequence,
                details: "Sequence jumped from 10 to 20 (gap: 9)".to_string(),
                counter: Some(HealthCounter::SequenceJumps),
            },
        );
        assert_eq!(record.health.sequence_jumps, 1);
        assert_eq!(record.health.sequence_resets, 0);
        assert_eq!(record.health.total_errors, 1);
        assert_eq!(record.stream_errors.len(), 1);
    }

    #[test]
    fn finding_without_counter_only_appends() {
        let mut record = StreamRecord::new("s1", "Test", "https://example.com/master.m3u8");
        record_finding(
            &mut record,
            CheckFinding {
                error_type: ErrorType::StaleManifest,
                details: "Manifest unchanged for 9000ms (threshold: 7000ms)".to_string(),
                counter: None,
            },
        );
        assert_eq!(record.health.sequence_jumps, 0);
        assert_eq!(record.health.sequence_resets, 0);
        assert_eq!(record.stream_errors.len(), 1);
    }
}
