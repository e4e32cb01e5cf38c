//! Minimal reader for HLS media playlists produced by the transcoder.

use std::path::Path;

/// One media segment referenced by a playlist.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub duration_secs: f64,
    pub uri: String,
}

/// Parsed media playlist.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaPlaylist {
    pub target_duration: Option<u32>,
    pub media_sequence: u64,
    pub segments: Vec<Segment>,
    pub ended: bool,
}

impl MediaPlaylist {
    /// Parses playlist text. Returns `None` when the `#EXTM3U` header is absent.
    pub fn parse(text: &str) -> Option<Self> {
        let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
        if lines.next()? != "#EXTM3U" {
            return None;
        }

        let mut playlist = MediaPlaylist::default();
        let mut pending_duration: Option<f64> = None;

        for line in lines {
            if let Some(value) = line.strip_prefix("#EXT-X-TARGETDURATION:") {
                playlist.target_duration = value.parse().ok();
            } else if let Some(value) = line.strip_prefix("#EXT-X-MEDIA-SEQUENCE:") {
                playlist.media_sequence = value.parse().unwrap_or(0);
            } else if let Some(value) = line.strip_prefix("#EXTINF:") {
                let duration = value.split(',').next().unwrap_or_default();
                pending_duration = Some(duration.parse().unwrap_or(0.0));
            } else if line == "#EXT-X-ENDLIST" {
                playlist.ended = true;
            } else if line.starts_with('#') {
                continue;
            } else if let Some(duration_secs) = pending_duration.take() {
                playlist.segments.push(Segment {
                    duration_secs,
                    uri: line.to_string(),
                });
            }
        }

        Some(playlist)
    }

    pub async fn read(path: &Path) -> std::io::Result<Option<Self>> {
        let text = tokio::fs::read_to_string(path).await?;
        Ok(Self::parse(&text))
    }

    pub fn total_duration_secs(&self) -> f64 {
        self.segments.iter().map(|s| s.duration_secs).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FFMPEG_OUTPUT: &str = "#EXTM3U
#EXT-X-VERSION:3
#EXT-X-TARGETDURATION:10
#EXT-X-MEDIA-SEQUENCE:0
#EXTINF:10.000000,
output0.ts
#EXTINF:10.000000,
output1.ts
#EXTINF:3.520000,
output2.ts
#EXT-X-ENDLIST
";

    #[test]
    fn parses_ffmpeg_vod_playlist() {
        let playlist = MediaPlaylist::parse(FFMPEG_OUTPUT).unwrap();
        assert_eq!(playlist.target_duration, Some(10));
        assert_eq!(playlist.segments.len(), 3);
        assert_eq!(playlist.segments[2].uri, "output2.ts");
        assert!(playlist.ended);
        assert!((playlist.total_duration_secs() - 23.52).abs() < 1e-6);
    }

    #[test]
    fn rejects_text_without_header() {
        assert!(MediaPlaylist::parse("output0.ts\n").is_none());
        assert!(MediaPlaylist::parse("").is_none());
    }

    #[test]
    fn uri_without_extinf_is_not_a_segment() {
        let playlist = MediaPlaylist::parse("#EXTM3U\nstray.ts\n").unwrap();
        assert!(playlist.segments.is_empty());
    }
}
