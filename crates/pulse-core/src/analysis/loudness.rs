use tracing::debug;

use super::{save_best_effort, AnalysisError, TaskContext};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Loudness {
    pub avg_db: Option<f64>,
    pub peak_db: Option<f64>,
}

/// Peak levels below this are treated as silence.
const SILENCE_FLOOR_DB: f64 = -50.0;

pub(super) async fn run(ctx: TaskContext, url: String) -> Result<(), AnalysisError> {
    let report = match ctx.toolkit.volume_detect(&url).await {
        Ok(stderr) => stderr,
        // Expected warnings from the null sink are not failures.
        Err(e) if e.to_string().contains("null") => {
            debug!(stream_id = %ctx.stream_id, "Ignoring null-sink loudness warning");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    let loudness = parse_volume_detect(&report);

    let Some(mut record) = ctx.store.find_by_id(&ctx.stream_id).await? else {
        return Ok(());
    };
    let audio = record.stats.audio.get_or_insert_with(Default::default);
    audio.avg_db = loudness.avg_db;
    audio.peak_db = loudness.peak_db;
    audio.is_silent = matches!(loudness.peak_db, Some(p) if p < SILENCE_FLOOR_DB);

    save_best_effort(&ctx.store, &mut record).await;
    Ok(())
}

/// Extract `mean_volume: <N> dB` and `max_volume: <N> dB` from the
/// volumedetect report. Matching is case-sensitive; unparseable or
/// non-finite values become None.
pub fn parse_volume_detect(report: &str) -> Loudness {
    Loudness {
        avg_db: extract_db(report, "mean_volume:"),
        peak_db: extract_db(report, "max_volume:"),
    }
}

fn extract_db(report: &str, key: &str) -> Option<f64> {
    let start = report.find(key)? + key.len();
    let rest = &report[start..];
    let end = rest.find(" dB")?;
    let value: f64 = rest[..end].trim().parse().ok()?;
    value.is_finite().then_some(value)
}
