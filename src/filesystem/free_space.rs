use log::warn;

/// A maximal run of consecutive free blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start: u32,
    pub count: u32,
}

impl Segment {
    fn end(&self) -> u32 {
        self.start + self.count - 1
    }
}

/// Tracks free block segments, sorted by start and fully coalesced.
/// Block 0 is reserved and never enters the free list.
#[derive(Debug)]
pub struct FreeSpaceManager {
    segments: Vec<Segment>,
    total_blocks: u32,
    free_blocks: u32,
}

impl FreeSpaceManager {
    pub fn new(total_blocks: u32) -> Self {
        let mut manager = Self {
            segments: Vec::new(),
            total_blocks,
            free_blocks: 0,
        };
        manager.clear();
        manager
    }

    /// Reset to a single segment covering every block but block 0
    pub fn clear(&mut self) {
        self.segments.clear();
        if self.total_blocks > 1 {
            self.segments.push(Segment {
                start: 1,
                count: self.total_blocks - 1,
            });
            self.free_blocks = self.total_blocks - 1;
        } else {
            self.free_blocks = 0;
        }
    }

    fn find_segment(&self, blocks_needed: u32) -> Option<usize> {
        self.segments.iter().position(|s| s.count >= blocks_needed)
    }

    fn merge_adjacent(&mut self) {
        if self.segments.len() <= 1 {
            return;
        }
        self.segments.sort_by_key(|s| s.start);
        let mut merged: Vec<Segment> = Vec::with_capacity(self.segments.len());
        for segment in self.segments.drain(..) {
            match merged.last_mut() {
                Some(last) if last.end() + 1 == segment.start => last.count += segment.count,
                _ => merged.push(segment),
            }
        }
        self.segments = merged;
    }

    /// First-fit allocation of `count` consecutive blocks. Coalesces and
    /// retries once before giving up with an empty vector.
    pub fn allocate(&mut self, count: u32) -> Vec<u32> {
        if count == 0 || count > self.free_blocks {
            return Vec::new();
        }
        let index = match self.find_segment(count) {
            Some(i) => Some(i),
            None => {
                self.merge_adjacent();
                self.find_segment(count)
            }
        };
        let Some(index) = index else {
            return Vec::new();
        };
        let segment = self.segments[index];
        if segment.start == 0 {
            warn!("Free list contained reserved block 0, refusing allocation");
            return Vec::new();
        }
        let allocated: Vec<u32> = (segment.start..segment.start + count).collect();
        if segment.count == count {
            self.segments.remove(index);
        } else {
            self.segments[index].start += count;
            self.segments[index].count -= count;
        }
        self.free_blocks -= count;
        allocated
    }

    /// Allocate `count` blocks, contiguously when possible, one at a time
    /// otherwise. Rolls back on partial failure.
    pub fn allocate_scattered(&mut self, count: u32) -> Vec<u32> {
        if count == 0 {
            return Vec::new();
        }
        let contiguous = self.allocate(count);
        if !contiguous.is_empty() {
            return contiguous;
        }
        let mut blocks = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let single = self.allocate(1);
            match single.first() {
                Some(&block) => blocks.push(block),
                None => {
                    if !blocks.is_empty() {
                        self.free_segments(&blocks);
                    }
                    return Vec::new();
                }
            }
        }
        blocks
    }

    pub fn free_block(&mut self, block: u32) {
        self.free_segments(&[block]);
    }

    /// Return blocks to the free list, coalescing runs into segments
    pub fn free_segments(&mut self, blocks: &[u32]) {
        if blocks.is_empty() {
            return;
        }
        let mut sorted = blocks.to_vec();
        sorted.sort_unstable();
        if sorted[0] == 0 {
            warn!("Dropping reserved block 0 from free request");
            sorted.retain(|&b| b != 0);
        }
        if sorted.is_empty() {
            return;
        }
        let mut start = sorted[0];
        let mut count = 1;
        for window in sorted.windows(2) {
            if window[1] == window[0] + 1 {
                count += 1;
            } else {
                self.segments.push(Segment { start, count });
                start = window[1];
                count = 1;
            }
        }
        self.segments.push(Segment { start, count });
        self.free_blocks += sorted.len() as u32;
        self.merge_adjacent();
    }

    pub fn is_free(&self, block: u32) -> bool {
        if block == 0 {
            return false;
        }
        self.segments
            .iter()
            .any(|s| block >= s.start && block <= s.end())
    }

    pub fn total_blocks(&self) -> u32 {
        self.total_blocks
    }

    pub fn free_blocks(&self) -> u32 {
        self.free_blocks
    }

    pub fn used_blocks(&self) -> u32 {
        self.total_blocks - self.free_blocks
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn largest_contiguous(&self) -> u32 {
        self.segments.iter().map(|s| s.count).max().unwrap_or(0)
    }

    /// Percentage of free space split across extra segments
    pub fn fragmentation(&self) -> f64 {
        if self.free_blocks == 0 || self.free_blocks == self.total_blocks - 1 {
            return 0.0;
        }
        let segments = self.segment_count();
        if segments <= 1 {
            return 0.0;
        }
        (segments - 1) as f64 / self.free_blocks as f64 * 100.0
    }

    /// Snapshot wire format: totals, segment count, then (start, count)
    /// pairs, all big-endian u32
    pub fn serialize(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(12 + self.segments.len() * 8);
        data.extend_from_slice(&self.total_blocks.to_be_bytes());
        data.extend_from_slice(&self.free_blocks.to_be_bytes());
        data.extend_from_slice(&(self.segments.len() as u32).to_be_bytes());
        for segment in &self.segments {
            data.extend_from_slice(&segment.start.to_be_bytes());
            data.extend_from_slice(&segment.count.to_be_bytes());
        }
        data
    }

    pub fn deserialize(data: &[u8]) -> Option<Self> {
        if data.len() < 12 {
            return None;
        }
        let read_u32 = |offset: usize| {
            let mut raw = [0u8; 4];
            raw.copy_from_slice(&data[offset..offset + 4]);
            u32::from_be_bytes(raw)
        };
        let total_blocks = read_u32(0);
        let free_blocks = read_u32(4);
        let segment_count = read_u32(8) as usize;
        let mut manager = Self::new(total_blocks);
        manager.free_blocks = free_blocks;
        manager.segments.clear();
        let mut offset = 12;
        for _ in 0..segment_count {
            if offset + 8 > data.len() {
                break;
            }
            manager.segments.push(Segment {
                start: read_u32(offset),
                count: read_u32(offset + 4),
            });
            offset += 8;
        }
        Some(manager)
    }

    #[cfg(test)]
    pub(crate) fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

#[cfg(test)]
mod tests {
    use super::{FreeSpaceManager, Segment};

    fn assert_invariants(fsm: &FreeSpaceManager) {
        let segments = fsm.segments();
        let mut total = 0u32;
        for pair in segments.windows(2) {
            assert!(pair[0].start + pair[0].count < pair[1].start, "uncoalesced");
        }
        for segment in segments {
            assert!(segment.start >= 1);
            total += segment.count;
        }
        assert_eq!(total, fsm.free_blocks());
    }

    #[test]
    fn fresh_manager_excludes_block_zero() {
        let fsm = FreeSpaceManager::new(100);
        assert_eq!(fsm.total_blocks(), 100);
        assert_eq!(fsm.free_blocks(), 99);
        assert_eq!(fsm.used_blocks(), 1);
        assert!(!fsm.is_free(0));
        assert!(fsm.is_free(1));
        assert!(fsm.is_free(99));
        assert_invariants(&fsm);
    }

    #[test]
    fn first_fit_allocation() {
        let mut fsm = FreeSpaceManager::new(100);
        assert_eq!(fsm.allocate(3), vec![1, 2, 3]);
        assert_eq!(fsm.allocate(2), vec![4, 5]);
        assert_eq!(fsm.free_blocks(), 94);
        assert!(!fsm.is_free(3));
        assert!(fsm.is_free(6));
        assert_invariants(&fsm);
    }

    #[test]
    fn allocation_refuses_oversize() {
        let mut fsm = FreeSpaceManager::new(10);
        assert!(fsm.allocate(0).is_empty());
        assert!(fsm.allocate(10).is_empty());
        assert_eq!(fsm.allocate(9).len(), 9);
        assert!(fsm.allocate(1).is_empty());
        assert_eq!(fsm.free_blocks(), 0);
        assert_invariants(&fsm);
    }

    #[test]
    fn free_coalesces_neighbours() {
        let mut fsm = FreeSpaceManager::new(100);
        let blocks = fsm.allocate(10);
        assert_eq!(blocks.len(), 10);
        fsm.free_segments(&[2, 3]);
        fsm.free_segments(&[5]);
        assert_eq!(fsm.segment_count(), 3);
        fsm.free_segments(&[4]);
        assert_eq!(fsm.segment_count(), 2);
        fsm.free_segments(&[1, 6, 7, 8, 9, 10]);
        assert_eq!(fsm.segment_count(), 1);
        assert_eq!(fsm.free_blocks(), 99);
        assert_eq!(fsm.largest_contiguous(), 99);
        assert_invariants(&fsm);
    }

    #[test]
    fn free_drops_reserved_block() {
        let mut fsm = FreeSpaceManager::new(50);
        let before = fsm.free_blocks();
        fsm.free_segments(&[0]);
        assert_eq!(fsm.free_blocks(), before);
        assert!(!fsm.is_free(0));
        assert_invariants(&fsm);
    }

    #[test]
    fn scattered_allocation_rolls_back() {
        let mut fsm = FreeSpaceManager::new(11);
        let held = fsm.allocate(10);
        fsm.free_segments(&[held[1], held[4], held[8]]);
        // no contiguous run of 3, but three scattered singles exist
        assert!(fsm.allocate(3).is_empty());
        let scattered = fsm.allocate_scattered(3);
        assert_eq!(scattered, vec![held[1], held[4], held[8]]);
        fsm.free_segments(&scattered);
        // asking for more than exists must leave the free list untouched
        let before = fsm.free_blocks();
        assert!(fsm.allocate_scattered(4).is_empty());
        assert_eq!(fsm.free_blocks(), before);
        assert_invariants(&fsm);
    }

    #[test]
    fn fragmentation_metric() {
        let mut fsm = FreeSpaceManager::new(101);
        assert_eq!(fsm.fragmentation(), 0.0);
        let held = fsm.allocate(100);
        fsm.free_segments(&[held[9], held[29], held[49], held[69], held[89]]);
        assert_eq!(fsm.segment_count(), 5);
        assert_eq!(fsm.fragmentation(), 4.0 / 5.0 * 100.0);
        assert_invariants(&fsm);
    }

    #[test]
    fn snapshot_roundtrip() {
        let mut fsm = FreeSpaceManager::new(64);
        let held = fsm.allocate(20);
        fsm.free_segments(&held[4..8]);
        let data = fsm.serialize();
        // big-endian totals at fixed offsets
        assert_eq!(&data[0..4], &64u32.to_be_bytes());
        assert_eq!(&data[4..8], &fsm.free_blocks().to_be_bytes());
        let restored = FreeSpaceManager::deserialize(&data).unwrap();
        assert_eq!(restored.total_blocks(), 64);
        assert_eq!(restored.free_blocks(), fsm.free_blocks());
        assert_eq!(restored.segments(), fsm.segments());
        assert_invariants(&restored);
    }

    #[test]
    fn snapshot_rejects_short_input() {
        assert!(FreeSpaceManager::deserialize(&[0u8; 11]).is_none());
    }

    #[test]
    fn snapshot_tolerates_truncated_segments() {
        let mut fsm = FreeSpaceManager::new(64);
        let held = fsm.allocate(10);
        fsm.free_segments(&[held[2], held[6]]);
        let mut data = fsm.serialize();
        data.truncate(data.len() - 3);
        let restored = FreeSpaceManager::deserialize(&data).unwrap();
        assert_eq!(restored.segments().len(), fsm.segments().len() - 1);
    }

    #[test]
    fn segment_end() {
        let segment = Segment { start: 5, count: 3 };
        assert_eq!(segment.end(), 7);
    }
}
