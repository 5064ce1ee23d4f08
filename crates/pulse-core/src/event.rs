//! Topic-style fan-out of live monitor updates.
//!
//! Observers subscribe through a broadcast receiver; publishing never
//! blocks, and a publish with no subscribers is a no-op. Payloads are
//! bit-compatible with existing consumers of the named topics.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::model::StreamRecord;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalPayload {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Jittered video signal level in [0, 100].
    pub video: f64,
    /// Jittered audio signal level in [0, 100].
    pub audio: f64,
    pub video_bitrate: u64,
    pub audio_bitrate: u64,
    pub fps: f64,
    pub peak_db: Option<f64>,
    pub avg_db: Option<f64>,
    pub is_silent: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpritePayload {
    pub id: String,
    /// `data:image/jpeg;base64,...` URL.
    pub url: String,
}

#[derive(Debug, Clone)]
pub enum StreamEvent {
    Update(Box<StreamRecord>),
    Signal(SignalPayload),
    Sprite(SpritePayload),
}

impl StreamEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            Self::Update(_) => "stream:update",
            Self::Signal(_) => "stream:signal",
            Self::Sprite(_) => "stream:sprite",
        }
    }

    pub fn stream_id(&self) -> &str {
        match self {
            Self::Update(record) => &record.id,
            Self::Signal(signal) => &signal.id,
            Self::Sprite(sprite) => &sprite.id,
        }
    }
}

pub type EventSender = broadcast::Sender<StreamEvent>;
pub type EventReceiver = broadcast::Receiver<StreamEvent>;

pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    broadcast::channel(capacity)
}

/// Publish an event, ignoring the no-subscribers case.
pub fn publish(tx: &EventSender, event: StreamEvent) {
    let _ = tx.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_match_consumer_names() {
        let record = StreamRecord::new("s1", "Channel 1", "https://example.com/master.m3u8");
        assert_eq!(StreamEvent::Update(Box::new(record)).topic(), "stream:update");
        assert_eq!(
            StreamEvent::Sprite(SpritePayload {
                id: "s1".into(),
                url: "data:image/jpeg;base64,".into(),
            })
            .topic(),
            "stream:sprite"
        );
    }

    #[test]
    fn signal_payload_serializes_camel_case() {
        let payload = SignalPayload {
            id: "s1".into(),
            timestamp: Utc::now(),
            video: 48.0,
            audio: 40.0,
            video_bitrate: 2_400_000,
            audio_bitrate: 128_000,
            fps: 30.0,
            peak_db: Some(-12.5),
            avg_db: Some(-24.0),
            is_silent: false,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["videoBitrate"], 2_400_000);
        assert_eq!(json["peakDb"], -12.5);
        assert_eq!(json["isSilent"], false);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_silent() {
        let (tx, rx) = event_channel(8);
        drop(rx);
        publish(
            &tx,
            StreamEvent::Sprite(SpritePayload {
                id: "s1".into(),
                url: String::new(),
            }),
        );
    }

    #[tokio::test]
    async fn subscribers_receive_events() {
        let (tx, mut rx) = event_channel(8);
        publish(
            &tx,
            StreamEvent::Sprite(SpritePayload {
                id: "s1".into(),
                url: "data:image/jpeg;base64,abc".into(),
            }),
        );
        let event = rx.recv().await.unwrap();
        assert_eq!(event.topic(), "stream:sprite");
        assert_eq!(event.stream_id(), "s1");
    }
}
