#![forbid(unsafe_code)]

pub mod analysis;
pub mod config;
pub mod event;
pub mod fetch;
pub mod model;
pub mod monitor;
pub mod store;

pub use analysis::{AnalysisError, AnalysisPipeline, Analyzer, FfmpegToolkit, MediaToolkit};
pub use config::MonitorConfig;
pub use event::{event_channel, EventReceiver, EventSender, SignalPayload, SpritePayload, StreamEvent};
pub use fetch::{FetchError, HttpFetcher, ManifestFetcher};
pub use model::{MetricsSample, PollState, StreamRecord, StreamStatus};
pub use monitor::{ErrorType, Monitor, MonitorState, RecentIssues, StreamError};
pub use store::{MemoryMetricsStore, MemoryStreamStore, MetricsStore, StoreError, StreamStore};
