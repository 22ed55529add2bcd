//! The per-track sample table: resolves an absolute sample index to a byte
//! range, decode timestamp, and composition offset, and supports stepping
//! both forward and backward, per the timeline model in §4.2.

use crate::error::{Error, Result};

use super::body::{CttsEntry, SttsEntry, StszBox};

/// One `stsc` run, resolved against a known chunk count so the final run's
/// span is always known (the box format leaves it implicit).
#[derive(Debug, Clone, Copy)]
struct ChunkRun {
    first_chunk: u64,   // 1-based, as stored in stsc
    chunk_count: u64,   // number of chunks this run actually spans
    samples_per_chunk: u64,
    start_sample: u64,  // absolute sample index of this run's first sample
    start_chunk_index: u64, // 0-based
}

#[derive(Debug, Clone, Copy)]
struct TimeRun {
    start_sample: u64,
    sample_count: u64,
    delta: u64,
    start_time: u64,
}

#[derive(Debug, Clone, Copy)]
struct OffsetRun {
    start_sample: u64,
    sample_count: u64,
    offset: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct SampleInfo {
    pub offset: u64,
    pub size: u32,
    pub decode_time: u64,
    pub composition_offset: i64,
}

#[derive(Debug, Clone)]
pub struct SampleTable {
    chunk_runs: Vec<ChunkRun>,
    chunk_offsets: Vec<u64>,
    sizes: StszBox,
    time_runs: Vec<TimeRun>,
    offset_runs: Vec<OffsetRun>,
    pub sample_count: u64,
}

impl SampleTable {
    pub fn new(
        stsc: &[(u32, u32)],
        chunk_offsets: Vec<u64>,
        sizes: StszBox,
        stts: &[SttsEntry],
        ctts: &[CttsEntry],
    ) -> Result<Self> {
        let total_chunks = chunk_offsets.len() as u64;
        let mut chunk_runs = Vec::with_capacity(stsc.len());
        let mut start_sample = 0u64;
        for (i, &(first_chunk, samples_per_chunk)) in stsc.iter().enumerate() {
            let first_chunk = first_chunk as u64;
            let samples_per_chunk = samples_per_chunk as u64;
            let chunk_count = if i + 1 < stsc.len() {
                let next_first = stsc[i + 1].0 as u64;
                next_first.saturating_sub(first_chunk)
            } else {
                // Last run's span is never stored explicitly: it always
                // extends through the final chunk index.
                total_chunks.saturating_sub(first_chunk - 1)
            };
            chunk_runs.push(ChunkRun {
                first_chunk,
                chunk_count,
                samples_per_chunk,
                start_sample,
                start_chunk_index: first_chunk - 1,
            });
            start_sample += chunk_count * samples_per_chunk;
        }

        let sample_count = sizes.sample_count as u64;

        let mut time_runs = Vec::with_capacity(stts.len());
        let mut ts = 0u64;
        let mut tn = 0u64;
        for e in stts {
            time_runs.push(TimeRun {
                start_sample: tn,
                sample_count: e.sample_count as u64,
                delta: e.sample_delta as u64,
                start_time: ts,
            });
            tn += e.sample_count as u64;
            ts += e.sample_count as u64 * e.sample_delta as u64;
        }

        let mut offset_runs = Vec::with_capacity(ctts.len());
        let mut on = 0u64;
        for e in ctts {
            offset_runs.push(OffsetRun {
                start_sample: on,
                sample_count: e.sample_count as u64,
                offset: e.sample_offset as i64,
            });
            on += e.sample_count as u64;
        }

        Ok(Self {
            chunk_runs,
            chunk_offsets,
            sizes,
            time_runs,
            offset_runs,
            sample_count,
        })
    }

    fn chunk_run_for(&self, sample_index: u64) -> Result<&ChunkRun> {
        self.chunk_runs
            .iter()
            .rev()
            .find(|r| sample_index >= r.start_sample)
            .ok_or_else(|| Error::malformed("sample index has no stsc run".into()))
    }

    fn time_run_for(&self, sample_index: u64) -> Option<&TimeRun> {
        self.time_runs.iter().rev().find(|r| sample_index >= r.start_sample)
    }

    fn offset_run_for(&self, sample_index: u64) -> Option<&OffsetRun> {
        self.offset_runs.iter().rev().find(|r| sample_index >= r.start_sample)
    }

    fn decode_time(&self, sample_index: u64) -> u64 {
        match self.time_run_for(sample_index) {
            Some(r) => r.start_time + (sample_index - r.start_sample) * r.delta,
            None => 0,
        }
    }

    fn composition_offset(&self, sample_index: u64) -> i64 {
        match self.offset_run_for(sample_index) {
            Some(r) => r.offset,
            None => 0,
        }
    }

    /// Resolves a sample's byte offset, summing sizes of earlier samples in
    /// the same chunk. Chunks are small in practice (often one sample per
    /// chunk once interleaved for streaming), so this linear scan is cheap.
    pub fn sample(&self, sample_index: u64) -> Result<SampleInfo> {
        if sample_index >= self.sample_count {
            return Err(Error::end_of_stream(format!(
                "sample {sample_index} past end ({})",
                self.sample_count
            )));
        }
        let run = self.chunk_run_for(sample_index)?;
        let samples_into_run = sample_index - run.start_sample;
        let chunk_offset_in_run = samples_into_run / run.samples_per_chunk;
        let sample_offset_in_chunk = samples_into_run % run.samples_per_chunk;
        let chunk_index = run.start_chunk_index + chunk_offset_in_run;
        let chunk_base = *self
            .chunk_offsets
            .get(chunk_index as usize)
            .ok_or_else(|| Error::malformed(format!("stsc references missing chunk {chunk_index}")))?;

        let first_sample_in_chunk = sample_index - sample_offset_in_chunk;
        let mut offset = chunk_base;
        for i in first_sample_in_chunk..sample_index {
            offset += self.sizes.size_of(i as usize) as u64;
        }

        Ok(SampleInfo {
            offset,
            size: self.sizes.size_of(sample_index as usize),
            decode_time: self.decode_time(sample_index),
            composition_offset: self.composition_offset(sample_index),
        })
    }
}

/// A forward-and-backward cursor over a track's samples, per §4.2. Holds no
/// extra state beyond the current index: every lookup re-derives from the
/// table, so `move_to`/`move_back` are as cheap as `next_sample`.
#[derive(Debug, Clone)]
pub struct SampleCursor {
    pub index: u64,
}

impl SampleCursor {
    pub fn new() -> Self {
        Self { index: 0 }
    }

    pub fn next_sample(&mut self, table: &SampleTable) -> Result<SampleInfo> {
        let info = table.sample(self.index)?;
        self.index += 1;
        Ok(info)
    }

    pub fn move_back(&mut self, table: &SampleTable) -> Result<SampleInfo> {
        if self.index == 0 {
            return Err(Error::end_of_stream("already at first sample".into()));
        }
        self.index -= 1;
        table.sample(self.index)
    }

    pub fn move_to(&mut self, index: u64) {
        self.index = index;
    }

    pub fn is_depleted(&self, table: &SampleTable) -> bool {
        self.index >= table.sample_count
    }
}

impl Default for SampleCursor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> SampleTable {
        // 4 chunks, stsc run: chunk 1 has 2 samples/chunk, chunk 3 onward
        // (the "last run extended through the final chunk" case) has 1.
        let stsc = vec![(1u32, 2u32), (3u32, 1u32)];
        let chunk_offsets = vec![1000, 2000, 3000, 3500];
        let sizes = StszBox {
            sample_size: 0,
            sample_count: 6,
            sizes: vec![10, 20, 10, 20, 30, 40],
        };
        let stts = vec![SttsEntry {
            sample_count: 6,
            sample_delta: 1000,
        }];
        SampleTable::new(&stsc, chunk_offsets, sizes, &stts, &[]).unwrap()
    }

    #[test]
    fn last_stsc_run_covers_remaining_chunks() {
        let t = table();
        // samples 0,1 in chunk 0; samples 2,3 in chunk 1; sample 4 in chunk 2; sample 5 in chunk 3
        assert_eq!(t.sample(0).unwrap().offset, 1000);
        assert_eq!(t.sample(1).unwrap().offset, 1010);
        assert_eq!(t.sample(2).unwrap().offset, 2000);
        assert_eq!(t.sample(4).unwrap().offset, 3000);
        assert_eq!(t.sample(5).unwrap().offset, 3500);
    }

    #[test]
    fn decode_times_accumulate_from_stts() {
        let t = table();
        assert_eq!(t.sample(0).unwrap().decode_time, 0);
        assert_eq!(t.sample(3).unwrap().decode_time, 3000);
    }

    #[test]
    fn cursor_steps_forward_and_backward() {
        let t = table();
        let mut c = SampleCursor::new();
        let a = c.next_sample(&t).unwrap();
        let b = c.next_sample(&t).unwrap();
        assert_ne!(a.offset, b.offset);
        let back = c.move_back(&t).unwrap();
        assert_eq!(back.offset, b.offset);
    }

    #[test]
    fn depleted_past_last_sample() {
        let t = table();
        let mut c = SampleCursor::new();
        c.move_to(6);
        assert!(c.is_depleted(&t));
        assert!(c.next_sample(&t).is_err());
    }
}
