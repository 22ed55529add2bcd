//! Scan-time precomputation entry point: open a file once, build its full
//! segment map (init segment, keyframe-aligned fragments, pre-built `moof`
//! bytes), so serving later is just byte-range reads plus the cached bytes.

use std::path::Path;

use crate::mp4::Mp4File;
use crate::segment_map::{SegmentMap, SegmentMapBuilder};
use crate::Result;

pub fn precompute(path: &Path, target_duration_secs: f64) -> Result<SegmentMap> {
    let mut file = Mp4File::open(path)?;
    SegmentMapBuilder::new()
        .target_duration(target_duration_secs)
        .build(&mut file)
}
