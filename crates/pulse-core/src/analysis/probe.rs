use chrono::Utc;
use serde_json::Value;

use crate::event::{publish, SignalPayload, StreamEvent};
use crate::model::{AudioStats, ContainerStats, StatsBlock, VideoStats};
use crate::monitor::scoring;

use super::{save_best_effort, AnalysisError, TaskContext};

#[derive(Debug, Clone, Default)]
pub struct ProbeReport {
    pub container: ContainerStats,
    pub video: Option<VideoStats>,
    pub audio: Option<AudioStats>,
    pub fps: f64,
}

pub(super) async fn run(ctx: TaskContext, url: String) -> Result<(), AnalysisError> {
    let data = ctx.toolkit.probe(&url).await?;
    let report = parse_probe(&data);

    let Some(mut record) = ctx.store.find_by_id(&ctx.stream_id).await? else {
        return Ok(());
    };
    apply_report(&mut record.stats, &report);

    let video_bitrate = record.stats.video.as_ref().map(|v| v.bit_rate).unwrap_or(0);
    let audio_bitrate = record.stats.audio.as_ref().map(|a| a.bit_rate).unwrap_or(0);
    let (peak_db, avg_db, is_silent) = record
        .stats
        .audio
        .as_ref()
        .map(|a| (a.peak_db, a.avg_db, a.is_silent))
        .unwrap_or((None, None, false));

    publish(
        &ctx.events,
        StreamEvent::Signal(SignalPayload {
            id: record.id.clone(),
            timestamp: Utc::now(),
            video: scoring::jittered(scoring::video_level(video_bitrate)),
            audio: scoring::jittered(scoring::audio_level(audio_bitrate)),
            video_bitrate,
            audio_bitrate,
            fps: record.stats.fps,
            peak_db,
            avg_db,
            is_silent,
        }),
    );

    save_best_effort(&ctx.store, &mut record).await;
    Ok(())
}

/// Map the probe JSON into stats blocks. Missing fields degrade to
/// unknowns rather than failing the task.
pub fn parse_probe(data: &Value) -> ProbeReport {
    let format = &data["format"];
    let container = ContainerStats {
        format_name: str_field(format, "format_name").unwrap_or_default(),
        duration: num_str_field(format, "duration").unwrap_or(0.0),
        size: num_str_field(format, "size").unwrap_or(0.0) as u64,
        bit_rate: num_str_field(format, "bit_rate").unwrap_or(0.0) as u64,
    };

    let empty = Vec::new();
    let streams = data["streams"].as_array().unwrap_or(&empty);
    let video_stream = streams.iter().find(|s| s["codec_type"] == "video");
    let audio_stream = streams.iter().find(|s| s["codec_type"] == "audio");

    let video = video_stream.map(|s| {
        let bit_rate = num_str_field(s, "bit_rate")
            .map(|b| b as u64)
            // Segments often omit the per-stream rate; assume video carries
            // most of the container bit rate.
            .unwrap_or((container.bit_rate as f64 * 0.85) as u64);
        VideoStats {
            codec: str_field(s, "codec_name"),
            profile: str_field(s, "profile").unwrap_or_default(),
            level: s["level"].as_i64().map(|l| l.to_string()).unwrap_or_default(),
            width: s["width"].as_u64().unwrap_or(0) as u32,
            height: s["height"].as_u64().unwrap_or(0) as u32,
            pixel_format: str_field(s, "pix_fmt").unwrap_or_else(|| "unknown".to_string()),
            color_space: str_field(s, "color_space")
                .or_else(|| str_field(s, "color_primaries"))
                .unwrap_or_else(|| "unknown".to_string()),
            bit_rate,
        }
    });

    let audio = audio_stream.map(|s| {
        let channels = s["channels"].as_u64();
        AudioStats {
            codec: str_field(s, "codec_name"),
            channels: channels.unwrap_or(0) as u32,
            sample_rate: num_str_field(s, "sample_rate").unwrap_or(0.0) as u32,
            bit_rate: num_str_field(s, "bit_rate").map(|b| b as u64).unwrap_or(128_000),
            peak_db: None,
            avg_db: None,
            channel_layout: channel_layout_name(channels),
            is_silent: false,
        }
    });

    let fps = video_stream
        .map(|s| parse_frame_rate(str_field(s, "r_frame_rate").as_deref()))
        .unwrap_or(0.0);

    ProbeReport {
        container,
        video,
        audio,
        fps,
    }
}

/// Merge a probe report into the stats block, preserving loudness readings
/// already attached to the audio stats.
pub fn apply_report(stats: &mut StatsBlock, report: &ProbeReport) {
    let loudness = stats
        .audio
        .as_ref()
        .map(|a| (a.peak_db, a.avg_db, a.is_silent));

    stats.container = Some(report.container.clone());
    stats.video = report.video.clone();
    stats.audio = report.audio.clone();
    stats.fps = report.fps;

    if let (Some(audio), Some((peak, avg, silent))) = (stats.audio.as_mut(), loudness) {
        audio.peak_db = peak;
        audio.avg_db = avg;
        audio.is_silent = silent;
    }
}

/// Human channel-layout name from the channel count.
pub fn channel_layout_name(channels: Option<u64>) -> String {
    match channels {
        Some(1) => "Mono".to_string(),
        Some(2) => "Stereo".to_string(),
        Some(6) => "5.1 Surround".to_string(),
        Some(8) => "7.1 Surround".to_string(),
        Some(n) => format!("{} channels", n),
        None => "Unknown".to_string(),
    }
}

/// Evaluate a `"num/den"` rate string as a division; a zero or absent
/// denominator falls back to the numeric value.
pub fn parse_frame_rate(rate: Option<&str>) -> f64 {
    let Some(rate) = rate else {
        return 0.0;
    };
    let mut parts = rate.splitn(2, '/');
    let num: f64 = parts
        .next()
        .and_then(|n| n.trim().parse().ok())
        .unwrap_or(0.0);
    match parts.next().and_then(|d| d.trim().parse::<f64>().ok()) {
        Some(den) if den != 0.0 => num / den,
        _ => num,
    }
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value[key].as_str().map(|s| s.to_string())
}

/// ffprobe emits most numerics as strings; accept either form.
fn num_str_field(value: &Value, key: &str) -> Option<f64> {
    match &value[key] {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn probe_json() -> Value {
        json!({
            "format": {
                "format_name": "mpegts",
                "duration": "6.006000",
                "size": "1880064",
                "bit_rate": "2504412"
            },
            "streams": [
                {
                    "codec_type": "video",
                    "codec_name": "h264",
                    "profile": "Main",
                    "level": 31,
                    "width": 1280,
                    "height": 720,
                    "pix_fmt": "yuv420p",
                    "color_space": "bt709",
                    "r_frame_rate": "30000/1001"
                },
                {
                    "codec_type": "audio",
                    "codec_name": "aac",
                    "channels": 2,
                    "sample_rate": "48000",
                    "bit_rate": "96000"
                }
            ]
        })
    }

    #[test]
    fn parses_full_probe() {
        let report = parse_probe(&probe_json());
        assert_eq!(report.container.format_name, "mpegts");
        assert_eq!(report.container.bit_rate, 2_504_412);

        let video = report.video.unwrap();
        assert_eq!(video.codec.as_deref(), Some("h264"));
        assert_eq!(video.profile, "Main");
        assert_eq!(video.level, "31");
        assert_eq!(video.width, 1280);
        assert_eq!(video.color_space, "bt709");
        // No per-stream rate: 85% of the container bit rate.
        assert_eq!(video.bit_rate, (2_504_412.0_f64 * 0.85) as u64);

        let audio = report.audio.unwrap();
        assert_eq!(audio.codec.as_deref(), Some("aac"));
        assert_eq!(audio.sample_rate, 48000);
        assert_eq!(audio.bit_rate, 96000);
        assert_eq!(audio.channel_layout, "Stereo");

        assert!((report.fps - 29.97).abs() < 0.01);
    }

    #[test]
    fn audio_bitrate_defaults_when_missing() {
        let mut data = probe_json();
        data["streams"][1].as_object_mut().unwrap().remove("bit_rate");
        let report = parse_probe(&data);
        assert_eq!(report.audio.unwrap().bit_rate, 128_000);
    }

    #[test]
    fn color_space_falls_back_to_primaries() {
        let mut data = probe_json();
        let video = data["streams"][0].as_object_mut().unwrap();
        video.remove("color_space");
        video.insert("color_primaries".into(), json!("bt2020"));
        let report = parse_probe(&data);
        assert_eq!(report.video.unwrap().color_space, "bt2020");

        let mut data = probe_json();
        data["streams"][0].as_object_mut().unwrap().remove("color_space");
        let report = parse_probe(&data);
        assert_eq!(report.video.unwrap().color_space, "unknown");
    }

    #[test]
    fn empty_probe_degrades_to_unknowns() {
        let report = parse_probe(&json!({}));
        assert!(report.video.is_none());
        assert!(report.audio.is_none());
        assert_eq!(report.fps, 0.0);
        assert_eq!(report.container.bit_rate, 0);
    }

    #[test]
    fn channel_layout_names() {
        assert_eq!(channel_layout_name(Some(1)), "Mono");
        assert_eq!(channel_layout_name(Some(2)), "Stereo");
        assert_eq!(channel_layout_name(Some(6)), "5.1 Surround");
        assert_eq!(channel_layout_name(Some(8)), "7.1 Surround");
        assert_eq!(channel_layout_name(Some(3)), "3 channels");
        assert_eq!(channel_layout_name(None), "Unknown");
    }

    #[test]
    fn frame_rate_parsing() {
        assert!((parse_frame_rate(Some("30000/1001")) - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate(Some("25/1")), 25.0);
        assert_eq!(parse_frame_rate(Some("30/0")), 30.0);
        assert_eq!(parse_frame_rate(Some("24")), 24.0);
        assert_eq!(parse_frame_rate(Some("garbage")), 0.0);
        assert_eq!(parse_frame_rate(None), 0.0);
    }

    #[test]
    fn apply_report_preserves_loudness() {
        let mut stats = StatsBlock::default();
        stats.audio = Some(AudioStats {
            peak_db: Some(-12.0),
            avg_db: Some(-20.0),
            is_silent: false,
            ..Default::default()
        });

        let report = parse_probe(&probe_json());
        apply_report(&mut stats, &report);

        let audio = stats.audio.unwrap();
        assert_eq!(audio.codec.as_deref(), Some("aac"));
        assert_eq!(audio.peak_db, Some(-12.0));
        assert_eq!(audio.avg_db, Some(-20.0));
    }
}
