//! The high-level MP4 reader: opens a file, builds a box tree, and exposes
//! one [`SampleCursor`]-driven timeline per track.

pub mod body;
pub mod boxtype;
pub mod sample_table;
pub mod tree;

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use body::{CttsEntry, SttsEntry, StszBox};
pub use boxtype::BoxType;
pub use tree::{BoxArena, BoxBody, BoxId, BoxNode};

use sample_table::{SampleCursor, SampleInfo, SampleTable};

use crate::error::{Error, Result};

/// One track's static description plus its live read cursor.
pub struct TrackInfo {
    pub track_id: u32,
    pub handler_type: [u8; 4],
    pub timescale: u32,
    pub duration: u64,
    pub stsd: body::StsdBox,
    table: SampleTable,
    cursor: SampleCursor,
}

impl TrackInfo {
    pub fn is_video(&self) -> bool {
        &self.handler_type == b"vide"
    }

    pub fn is_audio(&self) -> bool {
        &self.handler_type == b"soun"
    }

    pub fn is_text(&self) -> bool {
        &self.handler_type == b"text" || &self.handler_type == b"sbtl"
    }

    pub fn sample_count(&self) -> u64 {
        self.table.sample_count
    }

    pub fn sample_info(&self, index: u64) -> Result<SampleInfo> {
        self.table.sample(index)
    }

    pub fn cursor_index(&self) -> u64 {
        self.cursor.index
    }

    pub fn seek_to(&mut self, index: u64) {
        self.cursor.move_to(index);
    }

    pub fn is_depleted(&self) -> bool {
        self.cursor.is_depleted(&self.table)
    }

    /// `avcC`/`hvcC`'s length-field width, used to walk NAL units inside a
    /// sample without a start-code scan.
    fn nal_length_size(&self) -> u8 {
        for entry in &self.stsd.entries {
            if let body::StsdEntry::Visual(v) = entry {
                match &v.config {
                    body::CodecConfig::Avc(a) => return a.length_size_minus_one + 1,
                    body::CodecConfig::Hvc(h) => return h.length_size_minus_one + 1,
                    _ => {}
                }
            }
        }
        4
    }

    fn codec(&self) -> TrackCodec {
        for entry in &self.stsd.entries {
            if let body::StsdEntry::Visual(v) = entry {
                return match v.common.format {
                    BoxType::AVC1 | BoxType::AVC3 => TrackCodec::Avc,
                    BoxType::HEV1 | BoxType::HVC1 => TrackCodec::Hevc,
                    _ => TrackCodec::Other,
                };
            }
        }
        TrackCodec::Other
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TrackCodec {
    Avc,
    Hevc,
    Other,
}

/// Reads a NAL's length prefix, `length_size` bytes wide (1, 2, or 4).
fn nal_length_at(data: &[u8], pos: usize, length_size: u8) -> Option<usize> {
    match length_size {
        1 => data.get(pos).map(|b| *b as usize),
        2 => {
            let b = data.get(pos..pos + 2)?;
            Some(u16::from_be_bytes(b.try_into().ok()?) as usize)
        }
        4 => {
            let b = data.get(pos..pos + 4)?;
            Some(u32::from_be_bytes(b.try_into().ok()?) as usize)
        }
        _ => None,
    }
}

/// A sample is a keyframe if it carries an AVC IDR slice (`nal_unit_type ==
/// 5`, exclusively — no reliance on `stss`) or an HEVC IRAP slice
/// (`nal_unit_type` in `16..=23`).
pub fn sample_is_keyframe(codec_is_hevc: bool, data: &[u8], length_size: u8) -> bool {
    let mut pos = 0usize;
    let length_size = length_size as usize;
    while pos + length_size <= data.len() {
        let Some(len) = nal_length_at(data, pos, length_size as u8) else {
            break;
        };
        pos += length_size;
        if pos + len > data.len() || len == 0 {
            break;
        }
        let header = data[pos];
        let is_key = if codec_is_hevc {
            let nal_type = (header >> 1) & 0x3f;
            (16..=23).contains(&nal_type)
        } else {
            header & 0x1f == 5
        };
        if is_key {
            return true;
        }
        pos += len;
    }
    false
}

pub struct Mp4File {
    file: File,
    pub ftyp_brand: [u8; 4],
    pub movie_timescale: u32,
    pub movie_duration: u64,
    pub tracks: Vec<TrackInfo>,
}

impl Mp4File {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = File::open(path)?;
        let len = file.metadata()?.len();
        let arena = BoxArena::parse(&mut file, len)?;
        Self::from_arena(&arena, file)
    }

    fn from_arena(arena: &BoxArena, file: File) -> Result<Self> {
        let ftyp_brand = arena
            .roots
            .iter()
            .copied()
            .find(|&id| arena.get(id).box_type == BoxType::FTYP)
            .and_then(|id| match &arena.get(id).body {
                BoxBody::Ftyp(f) => Some(f.major_brand),
                _ => None,
            })
            .unwrap_or(*b"isom");

        let moov_id = arena
            .roots
            .iter()
            .copied()
            .find(|&id| arena.get(id).box_type == BoxType::MOOV)
            .ok_or(Error::MissingBox("moov"))?;

        let mvhd_id = arena
            .find_child(moov_id, BoxType::MVHD)
            .ok_or(Error::MissingBox("mvhd"))?;
        let (movie_timescale, movie_duration) = match &arena.get(mvhd_id).body {
            BoxBody::Mvhd(m) => (m.timescale, m.duration),
            _ => unreachable!("mvhd decoded as non-Mvhd body"),
        };

        let mut tracks = Vec::new();
        for trak_id in arena.find_children(moov_id, BoxType::TRAK) {
            tracks.push(Self::parse_track(arena, trak_id)?);
        }

        Ok(Self {
            file,
            ftyp_brand,
            movie_timescale,
            movie_duration,
            tracks,
        })
    }

    fn parse_track(arena: &BoxArena, trak_id: BoxId) -> Result<TrackInfo> {
        let tkhd_id = arena
            .find_child(trak_id, BoxType::TKHD)
            .ok_or(Error::MissingBox("tkhd"))?;
        let track_id = match &arena.get(tkhd_id).body {
            BoxBody::Tkhd(t) => t.track_id,
            _ => unreachable!(),
        };

        let mdia_id = arena
            .find_child(trak_id, BoxType::MDIA)
            .ok_or(Error::MissingBox("mdia"))?;
        let mdhd_id = arena
            .find_child(mdia_id, BoxType::MDHD)
            .ok_or(Error::MissingBox("mdhd"))?;
        let (timescale, duration) = match &arena.get(mdhd_id).body {
            BoxBody::Mdhd(m) => (m.timescale, m.duration),
            _ => unreachable!(),
        };

        let hdlr_id = arena
            .find_child(mdia_id, BoxType::HDLR)
            .ok_or(Error::MissingBox("hdlr"))?;
        let handler_type = match &arena.get(hdlr_id).body {
            BoxBody::Hdlr(h) => h.handler_type,
            _ => unreachable!(),
        };

        let minf_id = arena
            .find_child(mdia_id, BoxType::MINF)
            .ok_or(Error::MissingBox("minf"))?;
        let stbl_id = arena
            .find_child(minf_id, BoxType::STBL)
            .ok_or(Error::MissingBox("stbl"))?;

        let stsd_id = arena
            .find_child(stbl_id, BoxType::STSD)
            .ok_or(Error::MissingBox("stsd"))?;
        let stsd = match &arena.get(stsd_id).body {
            BoxBody::Stsd(s) => s.clone(),
            _ => unreachable!(),
        };

        let stsc_id = arena
            .find_child(stbl_id, BoxType::STSC)
            .ok_or(Error::MissingBox("stsc"))?;
        let stsc: Vec<(u32, u32)> = match &arena.get(stsc_id).body {
            BoxBody::Stsc(s) => s
                .entries
                .iter()
                .map(|e| (e.first_chunk, e.samples_per_chunk))
                .collect(),
            _ => unreachable!(),
        };

        let chunk_offsets: Vec<u64> = if let Some(id) = arena.find_child(stbl_id, BoxType::CO64) {
            match &arena.get(id).body {
                BoxBody::Co64(v) => v.clone(),
                _ => unreachable!(),
            }
        } else if let Some(id) = arena.find_child(stbl_id, BoxType::STCO) {
            match &arena.get(id).body {
                BoxBody::Stco(v) => v.iter().map(|&o| o as u64).collect(),
                _ => unreachable!(),
            }
        } else {
            return Err(Error::MissingBox("stco/co64"));
        };

        let stsz_id = arena
            .find_child(stbl_id, BoxType::STSZ)
            .ok_or(Error::MissingBox("stsz"))?;
        let stsz: StszBox = match &arena.get(stsz_id).body {
            BoxBody::Stsz(s) => s.clone(),
            _ => unreachable!(),
        };

        let stts_id = arena
            .find_child(stbl_id, BoxType::STTS)
            .ok_or(Error::MissingBox("stts"))?;
        let stts: Vec<SttsEntry> = match &arena.get(stts_id).body {
            BoxBody::Stts(s) => s.entries.clone(),
            _ => unreachable!(),
        };

        let ctts: Vec<CttsEntry> = arena
            .find_child(stbl_id, BoxType::CTTS)
            .map(|id| match &arena.get(id).body {
                BoxBody::Ctts(c) => c.entries.clone(),
                _ => unreachable!(),
            })
            .unwrap_or_default();

        let table = SampleTable::new(&stsc, chunk_offsets, stsz, &stts, &ctts)?;

        Ok(TrackInfo {
            track_id,
            handler_type,
            timescale,
            duration,
            stsd,
            table,
            cursor: SampleCursor::new(),
        })
    }

    pub fn media_duration_sec(&self) -> f64 {
        if self.movie_timescale == 0 {
            return 0.0;
        }
        self.movie_duration as f64 / self.movie_timescale as f64
    }

    /// Ratio to convert a duration in `track`'s timescale into the movie's.
    pub fn timescale_multiplier(&self, track: &TrackInfo) -> f64 {
        if track.timescale == 0 {
            return 1.0;
        }
        self.movie_timescale as f64 / track.timescale as f64
    }

    pub fn track_by_id(&self, track_id: u32) -> Option<&TrackInfo> {
        self.tracks.iter().find(|t| t.track_id == track_id)
    }

    fn read_at(&mut self, offset: u64, size: u32) -> Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; size as usize];
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads `size` bytes at `offset`, for callers re-materializing sample
    /// data from a [`crate::segment_map::TrackRange`]'s byte ranges outside
    /// the cursor-driven `next_sample` path.
    pub fn read_range(&mut self, offset: u64, size: u32) -> Result<Vec<u8>> {
        self.read_at(offset, size)
    }

    /// Reads the sample at `track.cursor_index()` and advances the cursor.
    pub fn next_sample(&mut self, track_index: usize) -> Result<(SampleInfo, Vec<u8>)> {
        let track = self
            .tracks
            .get_mut(track_index)
            .ok_or_else(|| Error::malformed(format!("no track at index {track_index}")))?;
        let info = track.cursor.next_sample(&track.table)?;
        let bytes = self.read_at(info.offset, info.size)?;
        Ok((info, bytes))
    }

    pub fn move_back(&mut self, track_index: usize) -> Result<(SampleInfo, Vec<u8>)> {
        let track = self
            .tracks
            .get_mut(track_index)
            .ok_or_else(|| Error::malformed(format!("no track at index {track_index}")))?;
        let info = track.cursor.move_back(&track.table)?;
        let bytes = self.read_at(info.offset, info.size)?;
        Ok((info, bytes))
    }

    pub fn move_to(&mut self, track_index: usize, sample_index: u64) -> Result<()> {
        let track = self
            .tracks
            .get_mut(track_index)
            .ok_or_else(|| Error::malformed(format!("no track at index {track_index}")))?;
        track.seek_to(sample_index);
        Ok(())
    }

    /// Whether the sample at `sample_index` on `track_index` is a keyframe.
    /// Reads and discards the sample bytes; callers on the hot fragmenting
    /// path should prefer inspecting bytes they already read via
    /// `next_sample` instead of calling this redundantly.
    pub fn is_keyframe(&mut self, track_index: usize, sample_index: u64) -> Result<bool> {
        let track = self
            .tracks
            .get(track_index)
            .ok_or_else(|| Error::malformed(format!("no track at index {track_index}")))?;
        if !track.is_video() {
            return Ok(false);
        }
        let codec = track.codec();
        if codec == TrackCodec::Other {
            return Ok(false);
        }
        let length_size = track.nal_length_size();
        let info = track.sample_info(sample_index)?;
        let bytes = self.read_at(info.offset, info.size)?;
        Ok(sample_is_keyframe(codec == TrackCodec::Hevc, &bytes, length_size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avc_keyframe_detection_matches_nal_type_five_only() {
        // length(4)=1 byte NAL, type 5 (IDR) -> keyframe
        let mut sample = vec![0, 0, 0, 1];
        sample.push(0x65); // forbidden=0, ref_idc=3, type=5
        assert!(sample_is_keyframe(false, &sample, 4));

        // type 1 (non-IDR) -> not a keyframe
        let mut sample = vec![0, 0, 0, 1];
        sample.push(0x61);
        assert!(!sample_is_keyframe(false, &sample, 4));
    }

    #[test]
    fn hevc_keyframe_detection_covers_irap_range() {
        // nal_unit_type packed into top 6 bits of byte 0 (after forbidden bit)
        let mk = |nal_type: u8| {
            let mut s = vec![0, 0, 0, 1];
            s.push(nal_type << 1);
            s.push(0);
            s
        };
        assert!(sample_is_keyframe(true, &mk(19), 4)); // IDR_W_RADL
        assert!(sample_is_keyframe(true, &mk(16), 4)); // BLA_W_LP
        assert!(sample_is_keyframe(true, &mk(23), 4)); // CRA boundary
        assert!(!sample_is_keyframe(true, &mk(1), 4)); // TRAIL_R
        assert!(!sample_is_keyframe(true, &mk(24), 4)); // just past IRAP range
    }
}
