//! Segment-map caching and on-demand fMP4 segment assembly (§5 Concurrency
//! & Resource Model): the Segment-maker cache is a process-wide map keyed by
//! source path, immutable once an entry lands, realized with the same
//! `dashmap::DashMap` the teacher's dependency stack already carries.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncSeekExt};

use boxfile_media::{AdaptationTrack, Result, Segment, SegmentMap};
use dashmap::DashMap;

/// One media file's segment map plus the per-track metadata the DASH MPD
/// emitter needs (handler type, language) that a `SegmentMap` alone doesn't
/// carry.
pub struct CachedStream {
    pub segment_map: Arc<SegmentMap>,
    pub adaptation_tracks: Vec<AdaptationTrack>,
}

/// Process-wide cache of built segment maps. Lookups take a shared borrow
/// on the map; a miss builds the `SegmentMap` outside any lock and inserts
/// it once, so the exclusive section never performs file I/O.
#[derive(Default)]
pub struct SegmentCache {
    entries: DashMap<PathBuf, Arc<CachedStream>>,
}

impl SegmentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached stream for `path`, building (and optionally
    /// persisting, per `use_disk_cache`) it on a miss.
    pub fn get_or_build(&self, path: &Path, segment_seconds: f64, use_disk_cache: bool) -> Result<Arc<CachedStream>> {
        if let Some(entry) = self.entries.get(path) {
            return Ok(entry.clone());
        }

        let segment_map = load_or_precompute(path, segment_seconds, use_disk_cache)?;
        let adaptation_tracks = adaptation_tracks_for(path)?;

        let cached = Arc::new(CachedStream {
            segment_map: Arc::new(segment_map),
            adaptation_tracks,
        });
        self.entries.insert(path.to_path_buf(), cached.clone());
        Ok(cached)
    }
}

/// Derives the DASH `AdaptationTrack` list, which needs each track's
/// handler type and language but not its sample geometry, so this reopens
/// the file independently of whatever built the segment map.
fn adaptation_tracks_for(path: &Path) -> Result<Vec<AdaptationTrack>> {
    let file = boxfile_media::Mp4File::open(path)?;
    Ok(file
        .tracks
        .iter()
        .map(|t| {
            if t.is_video() {
                AdaptationTrack::video(t.track_id, t.timescale, t.duration)
            } else if t.is_audio() {
                AdaptationTrack::audio(t.track_id, t.timescale, t.duration, "und")
            } else {
                AdaptationTrack::text(t.track_id, t.timescale, t.duration, "und")
            }
        })
        .collect())
}

fn cache_file_path(source: &Path) -> PathBuf {
    let mut cache_path = source.as_os_str().to_owned();
    cache_path.push(".cache");
    PathBuf::from(cache_path)
}

/// Reads a persisted `<file>.cache` if `use_disk_cache` and one exists,
/// otherwise precomputes the segment map from the source file; writes a
/// fresh cache file afterward when `use_disk_cache` is set and none was
/// read. The cache holds the same `SegmentMap` a fresh build produces
/// (init segment plus each fragment's pre-built `moof`), letting startup
/// skip keyframe scanning and cut-point computation entirely.
fn load_or_precompute(path: &Path, segment_seconds: f64, use_disk_cache: bool) -> Result<SegmentMap> {
    let cache_path = cache_file_path(path);
    if use_disk_cache {
        if let Ok(bytes) = std::fs::read(&cache_path) {
            if let Ok(segment_map) = bincode::deserialize::<SegmentMap>(&bytes) {
                tracing::debug!(path = %cache_path.display(), "loaded segment map from cache");
                return Ok(segment_map);
            }
            tracing::warn!(path = %cache_path.display(), "failed to parse cache file, rebuilding");
        }
    }

    let segment_map = boxfile_media::precompute(path, segment_seconds)?;

    if use_disk_cache {
        match bincode::serialize(&segment_map) {
            Ok(bytes) => {
                if let Err(err) = std::fs::write(&cache_path, bytes) {
                    tracing::warn!(path = %cache_path.display(), error = %err, "failed to write cache file");
                }
            }
            Err(err) => tracing::warn!(error = %err, "failed to serialize segment map for cache"),
        }
    }

    Ok(segment_map)
}

/// Materializes one segment's full bytes: each fragment's pre-built `moof`
/// plus `mdat` header, followed immediately by that fragment's own sample
/// bytes read fresh from the source file (video track first, matching the
/// order `trun.data_offset` assumes), in fragment order.
pub async fn assemble_segment(path: &Path, segment: &Segment) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut file = tokio::fs::File::open(path).await?;
    for fragment in &segment.fragments {
        out.extend_from_slice(&fragment.moof_data);
        for track in &fragment.tracks {
            for &(offset, size) in &track.byte_ranges {
                file.seek(std::io::SeekFrom::Start(offset)).await?;
                let mut buf = vec![0u8; size as usize];
                file.read_exact(&mut buf).await?;
                out.extend_from_slice(&buf);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_path_appends_suffix() {
        assert_eq!(
            cache_file_path(Path::new("/media/simple.mp4")),
            PathBuf::from("/media/simple.mp4.cache")
        );
    }
}
