use crate::fetch::MediaSnapshot;
use crate::monitor::ledger::ErrorType;

use super::CheckFinding;

/// Flags a media playlist that lists no segments. The engine treats this
/// as fatal for the poll: the stream goes to error and evaluation stops.
pub fn check_content(media: &MediaSnapshot, playlist_url: &str) -> Option<CheckFinding> {
    if media.segments.is_empty() {
        Some(CheckFinding {
            error_type: ErrorType::PlaylistContent,
            details: format!("Playlist at {} contains no segments", playlist_url),
            counter: None,
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::SegmentInfo;

    fn playlist(segments: Vec<SegmentInfo>) -> MediaSnapshot {
        MediaSnapshot {
            media_sequence: 100,
            target_duration: 6.0,
            discontinuity_sequence: 0,
            playlist_type: None,
            segments,
        }
    }

    #[test]
    fn flags_empty_playlist() {
        let finding = check_content(&playlist(vec![]), "https://a.com/level_0.m3u8").unwrap();
        assert_eq!(finding.error_type, ErrorType::PlaylistContent);
        assert_eq!(
            finding.details,
            "Playlist at https://a.com/level_0.m3u8 contains no segments"
        );
        assert!(finding.counter.is_none());
    }

    #[test]
    fn silent_with_segments() {
        let segments = vec![SegmentInfo {
            uri: "seg_100.ts".into(),
            duration: 6.0,
            discontinuity: false,
        }];
        assert!(check_content(&playlist(segments), "https://a.com/level_0.m3u8").is_none());
    }
}
