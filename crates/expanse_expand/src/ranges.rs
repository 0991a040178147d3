//! Byte-range mapping between a macro call body and its expansion.

use serde::{Deserialize, Serialize};

/// `length` bytes starting at `src_offset` in the call body appear verbatim
/// at `dst_offset` in the expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedTextRange {
    /// Offset in the call body.
    pub src_offset: u32,
    /// Offset in the expansion text.
    pub dst_offset: u32,
    /// Length in bytes.
    pub length: u32,
}

impl MappedTextRange {
    fn src_end(&self) -> u32 {
        self.src_offset + self.length
    }

    fn dst_end(&self) -> u32 {
        self.dst_offset + self.length
    }
}

/// Ordered, non-overlapping (in the expansion) list of mapped ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeMap {
    ranges: Vec<MappedTextRange>,
}

impl RangeMap {
    /// An empty map: nothing in the expansion comes from the call body.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a map from ranges sorted by `dst_offset`. Zero-length ranges
    /// are dropped and adjacent ranges that continue each other are merged.
    pub fn from_ranges(ranges: impl IntoIterator<Item = MappedTextRange>) -> Self {
        let mut merged: Vec<MappedTextRange> = Vec::new();
        for range in ranges.into_iter().filter(|r| r.length > 0) {
            match merged.last_mut() {
                Some(last)
                    if last.dst_end() == range.dst_offset && last.src_end() == range.src_offset =>
                {
                    last.length += range.length;
                }
                _ => merged.push(range),
            }
        }
        Self { ranges: merged }
    }

    /// The mapped ranges, ordered by expansion offset.
    pub fn ranges(&self) -> &[MappedTextRange] {
        &self.ranges
    }

    /// Returns `true` if nothing is mapped.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Maps an expansion offset back to the call body.
    pub fn map_offset_from_expansion_to_call_body(&self, offset: u32) -> Option<u32> {
        let idx = self
            .ranges
            .partition_point(|r| r.dst_end() <= offset);
        let range = self.ranges.get(idx)?;
        (range.dst_offset <= offset).then(|| range.src_offset + (offset - range.dst_offset))
    }

    /// Maps a call body offset to every expansion offset it was copied to.
    /// A fragment used twice in a transcriber yields two offsets.
    pub fn map_offset_from_call_body_to_expansion(&self, offset: u32) -> Vec<u32> {
        self.ranges
            .iter()
            .filter(|r| r.src_offset <= offset && offset < r.src_end())
            .map(|r| r.dst_offset + (offset - r.src_offset))
            .collect()
    }
}
