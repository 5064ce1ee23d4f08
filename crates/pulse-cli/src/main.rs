#![forbid(unsafe_code)]

mod config;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing_subscriber::{fmt, EnvFilter};
use uuid::Uuid;

use pulse_core::monitor::scoring;
use pulse_core::{
    event_channel, Analyzer, FfmpegToolkit, HttpFetcher, MediaToolkit, MemoryMetricsStore,
    MemoryStreamStore, Monitor, MonitorConfig, RecentIssues, StreamEvent, StreamRecord,
    StreamStatus, StreamStore,
};

fn version_string() -> &'static str {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const GIT_HASH: &str = env!("GIT_HASH");

    if GIT_HASH.is_empty() {
        // Leak is fine — called once, lives for the program's lifetime.
        Box::leak(VERSION.to_string().into_boxed_str())
    } else {
        Box::leak(format!("{VERSION} ({GIT_HASH})").into_boxed_str())
    }
}

/// HLS stream-fleet health monitor — rolling scores and per-segment media analysis.
#[derive(Parser)]
#[command(name = "hls-pulse", version = version_string(), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct AnalysisArgs {
    /// Disable the probe/loudness/thumbnail pipeline.
    #[arg(long, default_value_t = false)]
    no_analysis: bool,

    /// ffprobe command [default: ffprobe].
    #[arg(long)]
    ffprobe: Option<String>,

    /// ffmpeg command [default: ffmpeg].
    #[arg(long)]
    ffmpeg: Option<String>,

    /// Max concurrent analysis jobs [default: 4].
    #[arg(long)]
    max_jobs: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Monitor a single stream from the command line.
    Watch {
        /// Master playlist URL to monitor.
        url: String,

        /// Human-readable stream name.
        #[arg(long)]
        name: Option<String>,

        /// Poll interval in milliseconds.
        #[arg(long, default_value_t = 7000)]
        poll_interval: u64,

        /// Stale threshold in milliseconds.
        #[arg(long, default_value_t = 7000)]
        stale_threshold: u64,

        #[command(flatten)]
        analysis: AnalysisArgs,
    },
    /// Monitor a fleet of streams defined in a TOML config file.
    Run {
        /// Path to TOML config file.
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing();

    match cli.command {
        Commands::Watch {
            url,
            name,
            poll_interval,
            stale_threshold,
            analysis,
        } => {
            run_watch(url, name, poll_interval, stale_threshold, analysis).await;
        }
        Commands::Run { config } => {
            run_fleet(config).await;
        }
    }
}

fn init_tracing() {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

struct Deployment {
    monitor: Monitor,
    events: pulse_core::EventReceiver,
}

fn deploy(
    config: MonitorConfig,
    store: Arc<MemoryStreamStore>,
    analysis: Option<(String, String, usize)>,
) -> Deployment {
    let fetcher = Arc::new(HttpFetcher::from_config(&config));
    let metrics = Arc::new(MemoryMetricsStore::new(config.error_retention));
    let (tx, rx) = event_channel(256);

    let analyzer = analysis.map(|(ffprobe, ffmpeg, max_jobs)| {
        let toolkit: Arc<dyn MediaToolkit> = Arc::new(FfmpegToolkit::with_commands(ffprobe, ffmpeg));
        Arc::new(Analyzer::new(
            max_jobs,
            toolkit,
            Arc::clone(&store) as Arc<dyn StreamStore>,
            tx.clone(),
        ))
    });

    let monitor = Monitor::new(
        config,
        fetcher,
        store as Arc<dyn StreamStore>,
        metrics,
        analyzer,
        tx,
    );

    Deployment {
        monitor,
        events: rx,
    }
}

fn health_of(record: &StreamRecord) -> f64 {
    let recent = RecentIssues {
        jumps: record.health.recent_sequence_jumps,
        resets: record.health.recent_sequence_resets,
        errors: record.health.recent_errors,
    };
    let decay = scoring::decay_factor(record.health.last_error_time, Utc::now());
    scoring::health_score(record, Some(&recent), decay)
}

fn styled_status(status: StreamStatus) -> console::StyledObject<String> {
    let label = status.to_string();
    match status {
        StreamStatus::Online => style(label).green(),
        StreamStatus::Stale => style(label).yellow().bold(),
        StreamStatus::Error => style(label).red().bold(),
        StreamStatus::Offline => style(label).dim(),
    }
}

async fn run_watch(
    url: String,
    name: Option<String>,
    poll_interval: u64,
    stale_threshold: u64,
    analysis: AnalysisArgs,
) {
    let config = MonitorConfig::default()
        .with_poll_interval(poll_interval)
        .with_stale_threshold(stale_threshold);

    let store = Arc::new(MemoryStreamStore::new());
    let id = Uuid::new_v4().to_string();
    let mut record = StreamRecord::new(
        &id,
        name.unwrap_or_else(|| "stream".to_string()),
        &url,
    );
    record.health.stale_threshold = stale_threshold as i64;
    store.insert(record).await;

    let analysis_setup = (!analysis.no_analysis).then(|| {
        (
            analysis.ffprobe.clone().unwrap_or_else(|| "ffprobe".into()),
            analysis.ffmpeg.clone().unwrap_or_else(|| "ffmpeg".into()),
            analysis.max_jobs.unwrap_or(config.max_concurrent_jobs),
        )
    });

    let Deployment {
        monitor,
        mut events,
    } = deploy(config, store, analysis_setup);

    let multi = MultiProgress::new();
    let msg_style = ProgressStyle::with_template("{msg}").expect("valid template");

    multi
        .println(format!(
            "{} {}",
            style("hls-pulse").bold(),
            style(env!("CARGO_PKG_VERSION")).dim()
        ))
        .ok();
    multi
        .println(format!("  {} {}", style("url:  ").dim(), style(&url).bold()))
        .ok();
    multi
        .println(format!("  {} {}ms", style("poll: ").dim(), poll_interval))
        .ok();
    multi
        .println(format!("  {} {}ms", style("stale:").dim(), stale_threshold))
        .ok();
    multi.println("").ok();
    multi
        .println(format!("{}", style("Press Ctrl+C to stop").dim()))
        .ok();
    multi.println("").ok();

    monitor.start().await;

    let status_bar = multi.add(ProgressBar::new_spinner().with_style(msg_style));
    status_bar.set_message(format!(
        "  {}",
        style("Waiting for first poll...").dim()
    ));

    let mut seen_errors = 0usize;
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                status_bar.finish_and_clear();
                multi.println(format!("\n{}", style("Monitor stopped.").dim())).ok();
                monitor.stop().await;
                return;
            }
            event = events.recv() => {
                let Ok(event) = event else { continue };
                render_event(&multi, &status_bar, &event, &mut seen_errors);
            }
        }
    }
}

fn render_event(
    multi: &MultiProgress,
    status_bar: &ProgressBar,
    event: &StreamEvent,
    seen_errors: &mut usize,
) {
    match event {
        StreamEvent::Update(record) => {
            if record.stream_errors.len() > *seen_errors {
                for e in &record.stream_errors[*seen_errors..] {
                    let ts = e.date.format("%H:%M:%S");
                    multi
                        .println(format!(
                            "  {}  {} {:<20} {}  {}",
                            style(ts).dim(),
                            style("ERROR").red().bold(),
                            style(format!("{}", e.error_type)).red(),
                            e.variant,
                            e.details
                        ))
                        .ok();
                }
            }
            *seen_errors = record.stream_errors.len();

            status_bar.set_message(format!(
                "  {:<8} mseq={:<10} segs={:<4} td={:.0}s  health={:.0}",
                styled_status(record.status),
                record.health.media_sequence,
                record.health.segment_count,
                record.health.target_duration,
                health_of(record),
            ));
        }
        StreamEvent::Signal(signal) => {
            multi
                .println(format!(
                    "  {}  {} video={:.0} audio={:.0} fps={:.1} peak={}dB",
                    style(signal.timestamp.format("%H:%M:%S")).dim(),
                    style("SIGNAL").cyan(),
                    signal.video,
                    signal.audio,
                    signal.fps,
                    signal
                        .peak_db
                        .map(|p| format!("{:.1}", p))
                        .unwrap_or_else(|| "?".into()),
                ))
                .ok();
        }
        StreamEvent::Sprite(sprite) => {
            multi
                .println(format!(
                    "  {}  {} {} bytes",
                    style(Utc::now().format("%H:%M:%S")).dim(),
                    style("SPRITE").magenta(),
                    sprite.url.len(),
                ))
                .ok();
        }
    }
}

async fn run_fleet(config_path: PathBuf) {
    let app_config = match config::AppConfig::load(&config_path) {
        Ok(c) => {
            tracing::info!(path = %config_path.display(), "Loaded config file");
            c
        }
        Err(e) => {
            eprintln!("{}", style(&e).red());
            std::process::exit(1);
        }
    };

    let monitor_config = app_config.defaults.to_monitor_config();
    let store = Arc::new(MemoryStreamStore::new());

    for (i, def) in app_config.stream.iter().enumerate() {
        let id = def
            .id
            .clone()
            .unwrap_or_else(|| format!("stream_{}", i + 1));
        let name = def.name.clone().unwrap_or_else(|| id.clone());
        let mut record = StreamRecord::new(&id, &name, &def.url);
        record.health.stale_threshold = monitor_config.stale_threshold.as_millis() as i64;
        store.insert(record).await;
        tracing::info!(stream_id = %id, url = %def.url, "Registered stream");
    }

    let analysis_setup = app_config.analysis.enabled.then(|| {
        (
            app_config.analysis.ffprobe.clone(),
            app_config.analysis.ffmpeg.clone(),
            monitor_config.max_concurrent_jobs,
        )
    });

    let Deployment {
        monitor,
        mut events,
    } = deploy(monitor_config, store, analysis_setup);

    monitor.start().await;
    println!(
        "{} monitoring {} stream(s), Ctrl+C to stop",
        style("hls-pulse").bold(),
        app_config.stream.len()
    );

    let mut seen_errors: HashMap<String, usize> = HashMap::new();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            event = events.recv() => {
                let Ok(event) = event else { continue };
                print_fleet_event(&event, &mut seen_errors);
            }
        }
    }

    println!("\n{}", style("Shutting down...").dim());
    monitor.stop().await;
}

fn print_fleet_event(event: &StreamEvent, seen_errors: &mut HashMap<String, usize>) {
    match event {
        StreamEvent::Update(record) => {
            let seen = seen_errors.entry(record.id.clone()).or_insert(0);
            if record.stream_errors.len() > *seen {
                for e in &record.stream_errors[*seen..] {
                    println!(
                        "  {}  {:<14} {} {:<20} {}",
                        style(e.date.format("%H:%M:%S")).dim(),
                        style(&record.id).bold(),
                        style("ERROR").red().bold(),
                        style(format!("{}", e.error_type)).red(),
                        e.details
                    );
                }
            }
            *seen = record.stream_errors.len();

            println!(
                "  {}  {:<14} {:<8} mseq={:<10} segs={:<4} health={:.0}",
                style(Utc::now().format("%H:%M:%S")).dim(),
                style(&record.id).bold(),
                styled_status(record.status),
                record.health.media_sequence,
                record.health.segment_count,
                health_of(record),
            );
        }
        StreamEvent::Signal(signal) => {
            println!(
                "  {}  {:<14} {} video={:.0} audio={:.0}",
                style(signal.timestamp.format("%H:%M:%S")).dim(),
                style(&signal.id).bold(),
                style("SIGNAL").cyan(),
                signal.video,
                signal.audio,
            );
        }
        StreamEvent::Sprite(sprite) => {
            println!(
                "  {}  {:<14} {} thumbnail updated",
                style(Utc::now().format("%H:%M:%S")).dim(),
                style(&sprite.id).bold(),
                style("SPRITE").magenta(),
            );
        }
    }
}
