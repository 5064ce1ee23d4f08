mod http;

pub use http::HttpFetcher;

use async_trait::async_trait;
use m3u8_rs::Playlist;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error {status} fetching {url}: {message}")]
    Http {
        url: String,
        status: u16,
        message: String,
    },
    #[error("Network error fetching {url}: {reason}")]
    Network { url: String, reason: String },
    #[error("Timeout fetching {url}")]
    Timeout { url: String },
    #[error("Parse error for {url}: {message}")]
    Parse { url: String, message: String },
}

impl FetchError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Trait for retrieving HLS manifest bodies from a URI.
///
/// Implementations handle transport only; parsing happens in this module.
/// The trait is object-safe and Send + Sync for use across async tasks.
#[async_trait]
pub trait ManifestFetcher: Send + Sync {
    async fn fetch(&self, uri: &str) -> Result<String, FetchError>;
}

#[derive(Debug, Clone)]
pub struct VariantInfo {
    pub uri: String,
    pub bandwidth: u64,
    pub resolution: Option<(u64, u64)>,
}

#[derive(Debug, Clone)]
pub struct MasterSnapshot {
    pub variants: Vec<VariantInfo>,
}

#[derive(Debug, Clone)]
pub struct SegmentInfo {
    pub uri: String,
    pub duration: f64,
    pub discontinuity: bool,
}

#[derive(Debug, Clone)]
pub struct MediaSnapshot {
    pub media_sequence: i64,
    pub target_duration: f64,
    pub discontinuity_sequence: i64,
    pub playlist_type: Option<String>,
    pub segments: Vec<SegmentInfo>,
}

#[derive(Debug, Clone)]
pub enum Manifest {
    Master(MasterSnapshot),
    Media(MediaSnapshot),
}

/// Parse a manifest body as either a master or a media playlist.
pub fn parse_manifest(url: &str, body: &str) -> Result<Manifest, FetchError> {
    match m3u8_rs::parse_playlist(body.as_bytes()) {
        Ok((_, Playlist::MasterPlaylist(pl))) => Ok(Manifest::Master(master_snapshot(&pl))),
        Ok((_, Playlist::MediaPlaylist(pl))) => Ok(Manifest::Media(media_snapshot(&pl))),
        Err(e) => Err(FetchError::Parse {
            url: url.to_string(),
            message: e.to_string(),
        }),
    }
}

/// Parse a manifest body that must be a media playlist.
pub fn parse_media_manifest(url: &str, body: &str) -> Result<MediaSnapshot, FetchError> {
    match m3u8_rs::parse_media_playlist_res(body.as_bytes()) {
        Ok(pl) => Ok(media_snapshot(&pl)),
        Err(e) => Err(FetchError::Parse {
            url: url.to_string(),
            message: e.to_string(),
        }),
    }
}

fn master_snapshot(pl: &m3u8_rs::MasterPlaylist) -> MasterSnapshot {
    let variants = pl
        .variants
        .iter()
        .filter(|v| !v.is_i_frame)
        .map(|v| VariantInfo {
            uri: v.uri.clone(),
            bandwidth: v.bandwidth,
            resolution: v.resolution.as_ref().map(|r| (r.width, r.height)),
        })
        .collect();
    MasterSnapshot { variants }
}

fn media_snapshot(pl: &m3u8_rs::MediaPlaylist) -> MediaSnapshot {
    MediaSnapshot {
        media_sequence: pl.media_sequence as i64,
        target_duration: pl.target_duration as f64,
        discontinuity_sequence: pl.discontinuity_sequence as i64,
        playlist_type: pl.playlist_type.as_ref().map(|t| t.to_string()),
        segments: pl
            .segments
            .iter()
            .map(|s| SegmentInfo {
                uri: s.uri.clone(),
                duration: s.duration as f64,
                discontinuity: s.discontinuity,
            })
            .collect(),
    }
}

/// Resolve a playlist or segment URI against the URL it was listed in.
/// Relative URIs replace the basename of the requesting URL; absolute URIs
/// are kept verbatim.
pub fn resolve_uri(base_url: &str, target: &str) -> String {
    if target.starts_with("http") {
        return target.to_string();
    }
    match base_url.rfind('/') {
        Some(idx) => format!("{}/{}", &base_url[..idx], target),
        None => target.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MASTER: &str = "\
#EXTM3U
#EXT-X-VERSION:3
#EXT-X-STREAM-INF:BANDWIDTH=1212000,RESOLUTION=1280x720,FRAME-RATE=30.000
level_0.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=2424000,RESOLUTION=1920x1080,FRAME-RATE=30.000
level_1.m3u8
";

    const MEDIA: &str = "\
#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:6
#EXT-X-MEDIA-SEQUENCE:100
#EXT-X-DISCONTINUITY-SEQUENCE:2
#EXTINF:6.000,
seg_100.ts
#EXT-X-DISCONTINUITY
#EXTINF:6.000,
seg_101.ts
";

    #[test]
    fn parses_master_playlist() {
        let manifest = parse_manifest("https://a.com/master.m3u8", MASTER).unwrap();
        let Manifest::Master(master) = manifest else {
            panic!("expected master playlist");
        };
        assert_eq!(master.variants.len(), 2);
        assert_eq!(master.variants[0].uri, "level_0.m3u8");
        assert_eq!(master.variants[0].bandwidth, 1212000);
        assert_eq!(master.variants[0].resolution, Some((1280, 720)));
    }

    #[test]
    fn parses_media_playlist() {
        let manifest = parse_manifest("https://a.com/level_0.m3u8", MEDIA).unwrap();
        let Manifest::Media(media) = manifest else {
            panic!("expected media playlist");
        };
        assert_eq!(media.media_sequence, 100);
        assert_eq!(media.target_duration, 6.0);
        assert_eq!(media.discontinuity_sequence, 2);
        assert_eq!(media.segments.len(), 2);
        assert!(!media.segments[0].discontinuity);
        assert!(media.segments[1].discontinuity);
    }

    #[test]
    fn parse_media_manifest_rejects_garbage() {
        let err = parse_media_manifest("https://a.com/x.m3u8", "not a playlist").unwrap_err();
        assert!(matches!(err, FetchError::Parse { .. }));
        assert!(err.status_code().is_none());
    }

    #[test]
    fn resolve_uri_replaces_basename() {
        assert_eq!(
            resolve_uri("https://a.com/path/to/master.m3u8", "level_0.m3u8"),
            "https://a.com/path/to/level_0.m3u8"
        );
    }

    #[test]
    fn resolve_uri_keeps_absolute() {
        assert_eq!(
            resolve_uri("https://a.com/master.m3u8", "https://b.com/foo.m3u8"),
            "https://b.com/foo.m3u8"
        );
    }

    #[test]
    fn resolve_uri_at_root() {
        assert_eq!(
            resolve_uri("https://a.com/master.m3u8", "seg_1.ts"),
            "https://a.com/seg_1.ts"
        );
    }
}
