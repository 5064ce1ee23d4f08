//! TOML configuration file schema and parsing.
//!
//! Example config file:
//!
//! ```toml
//! [defaults]
//! poll_interval_ms = 7000
//! stale_threshold_ms = 7000
//!
//! [analysis]
//! enabled = true
//! ffprobe = "ffprobe"
//! ffmpeg = "ffmpeg"
//!
//! [[stream]]
//! id = "live-1"
//! name = "Main channel"
//! url = "https://cdn.example.com/live/master.m3u8"
//!
//! [[stream]]
//! url = "https://cdn.example.com/backup/master.m3u8"
//! ```

use std::path::Path;

use serde::Deserialize;

use pulse_core::MonitorConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub defaults: DefaultsConfig,

    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub stream: Vec<StreamDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_stale_threshold_ms")]
    pub stale_threshold_ms: u64,

    #[serde(default)]
    pub window_span_ms: Option<u64>,

    #[serde(default)]
    pub max_concurrent_jobs: Option<usize>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            stale_threshold_ms: default_stale_threshold_ms(),
            window_span_ms: None,
            max_concurrent_jobs: None,
        }
    }
}

fn default_poll_interval_ms() -> u64 {
    7000
}

fn default_stale_threshold_ms() -> u64 {
    7000
}

impl DefaultsConfig {
    pub fn to_monitor_config(&self) -> MonitorConfig {
        let mut c = MonitorConfig::default()
            .with_poll_interval(self.poll_interval_ms)
            .with_stale_threshold(self.stale_threshold_ms);
        if let Some(ms) = self.window_span_ms {
            c = c.with_window_span(ms);
        }
        if let Some(jobs) = self.max_concurrent_jobs {
            c = c.with_max_concurrent_jobs(jobs);
        }
        c
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_ffprobe")]
    pub ffprobe: String,

    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ffprobe: default_ffprobe(),
            ffmpeg: default_ffmpeg(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_ffprobe() -> String {
    "ffprobe".into()
}

fn default_ffmpeg() -> String {
    "ffmpeg".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamDef {
    pub id: Option<String>,
    pub name: Option<String>,
    pub url: String,
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;

        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file {}: {}", path.display(), e))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.stream.is_empty() {
            return Err("Config defines no streams".into());
        }

        let mut seen_ids = std::collections::HashSet::new();
        let mut seen_urls = std::collections::HashSet::new();
        for (i, s) in self.stream.iter().enumerate() {
            let parsed = url::Url::parse(&s.url)
                .map_err(|e| format!("Invalid stream URL at index {}: {} ({})", i, s.url, e))?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                return Err(format!("Stream URL must use http or https: {}", s.url));
            }
            if !seen_urls.insert(s.url.as_str()) {
                return Err(format!("Duplicate stream URL: {}", s.url));
            }
            if let Some(ref id) = s.id {
                if id.is_empty() {
                    return Err(format!("Stream ID at index {} must not be empty", i));
                }
                if !seen_ids.insert(id.as_str()) {
                    return Err(format!("Duplicate stream ID: {}", id));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let toml = r#"
[[stream]]
url = "https://example.com/master.m3u8"
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.stream.len(), 1);
        assert_eq!(config.defaults.poll_interval_ms, 7000);
        assert_eq!(config.defaults.stale_threshold_ms, 7000);
        assert!(config.analysis.enabled);
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[defaults]
poll_interval_ms = 5000
stale_threshold_ms = 9000
window_span_ms = 600000
max_concurrent_jobs = 2

[analysis]
enabled = false
ffprobe = "/opt/ffmpeg/bin/ffprobe"
ffmpeg = "/opt/ffmpeg/bin/ffmpeg"

[[stream]]
id = "live-1"
name = "Main channel"
url = "https://cdn1.example.com/master.m3u8"

[[stream]]
url = "https://cdn2.example.com/master.m3u8"
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        config.validate().unwrap();

        let mc = config.defaults.to_monitor_config();
        assert_eq!(mc.poll_interval.as_millis(), 5000);
        assert_eq!(mc.stale_threshold.as_millis(), 9000);
        assert_eq!(mc.window_span.as_millis(), 600000);
        assert_eq!(mc.max_concurrent_jobs, 2);
        assert!(!config.analysis.enabled);
        assert_eq!(config.analysis.ffprobe, "/opt/ffmpeg/bin/ffprobe");
        assert_eq!(config.stream[0].id.as_deref(), Some("live-1"));
    }

    #[test]
    fn validate_rejects_empty_streams() {
        let config: AppConfig = toml::from_str("").unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.contains("no streams"), "{}", err);
    }

    #[test]
    fn validate_rejects_invalid_url() {
        let toml = r#"
[[stream]]
url = "not-a-url"
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.contains("Invalid stream URL"), "{}", err);
    }

    #[test]
    fn validate_rejects_duplicate_urls() {
        let toml = r#"
[[stream]]
url = "https://a.com/m.m3u8"

[[stream]]
url = "https://a.com/m.m3u8"
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.contains("Duplicate stream URL"), "{}", err);
    }

    #[test]
    fn validate_rejects_duplicate_ids() {
        let toml = r#"
[[stream]]
id = "same"
url = "https://a.com/m.m3u8"

[[stream]]
id = "same"
url = "https://b.com/m.m3u8"
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.contains("Duplicate stream ID"), "{}", err);
    }
}
