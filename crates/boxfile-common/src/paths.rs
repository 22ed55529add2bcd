//! Shared request-path parsing for the fMP4/HLS/DASH URL grammar (§6) and
//! the ISO-BMFF handler-type labels used in SDP and DASH `mimeType` text.

/// What a request path under a stream name resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaRequest {
    /// `<name>.m3u8` — HLS media playlist.
    Playlist,
    /// `<name>.mpd` — DASH MPD manifest.
    Mpd,
    /// `<name>_init.mp4` — fMP4 initialization segment.
    Init,
    /// `<name>_sn<N>.m4s` — fMP4 media segment number `N`.
    Segment(u32),
}

/// Parses `path` as a request under stream `name`, returning `None` if it
/// doesn't belong to that name or doesn't match any recognized suffix.
pub fn parse_media_request(name: &str, path: &str) -> Option<MediaRequest> {
    let rest = path.strip_prefix(name)?;
    match rest {
        ".m3u8" | ".m3u" => Some(MediaRequest::Playlist),
        ".mpd" => Some(MediaRequest::Mpd),
        "_init.mp4" => Some(MediaRequest::Init),
        _ => {
            let digits = rest.strip_prefix("_sn")?.strip_suffix(".m4s")?;
            digits.parse().ok().map(MediaRequest::Segment)
        }
    }
}

/// Maps an ISO-BMFF `hdlr` handler type to the label used in SDP `m=` lines
/// and DASH `AdaptationSet` `mimeType`/`contentType` attributes.
pub fn handler_type_label(handler_type: &[u8; 4]) -> &'static str {
    match handler_type {
        b"vide" => "video",
        b"soun" => "audio",
        b"text" | b"sbtl" | b"subt" => "text",
        _ => "application",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_playlist_and_mpd_suffixes() {
        assert_eq!(
            parse_media_request("cam1", "cam1.m3u8"),
            Some(MediaRequest::Playlist)
        );
        assert_eq!(
            parse_media_request("cam1", "cam1.mpd"),
            Some(MediaRequest::Mpd)
        );
    }

    #[test]
    fn parses_init_and_segment_suffixes() {
        assert_eq!(
            parse_media_request("cam1", "cam1_init.mp4"),
            Some(MediaRequest::Init)
        );
        assert_eq!(
            parse_media_request("cam1", "cam1_sn42.m4s"),
            Some(MediaRequest::Segment(42))
        );
    }

    #[test]
    fn rejects_unrelated_or_malformed_paths() {
        assert_eq!(parse_media_request("cam1", "cam2.m3u8"), None);
        assert_eq!(parse_media_request("cam1", "cam1_sn.m4s"), None);
        assert_eq!(parse_media_request("cam1", "cam1_snX.m4s"), None);
        assert_eq!(parse_media_request("cam1", "cam1.txt"), None);
    }

    #[test]
    fn handler_type_labels_match_known_fourccs() {
        assert_eq!(handler_type_label(b"vide"), "video");
        assert_eq!(handler_type_label(b"soun"), "audio");
        assert_eq!(handler_type_label(b"text"), "text");
        assert_eq!(handler_type_label(b"meta"), "application");
    }
}
