//! Chunked, lazily allocated storage for the mapper's caches.
//!
//! All arrays hand out a configurable gap value for slots that were never
//! written, grow by whole chunks, and report their memory to a
//! [`MemoryVisitor`]. None of them lock: the prepare phases write disjoint
//! ranges and readers only run after the prepare barrier.

/// Sentinel for "no internal id": tracker gap value and the miss return of
/// lookups.
pub const ID_NOT_FOUND: i64 = -1;

/// Default entries per chunk (8 MB per chunk for the 64-bit cache).
pub const DEFAULT_CHUNK_SIZE: usize = 1_000_000;

/// Highest internal id that still fits the 4-byte tracker variant.
pub const HIGHEST_ID_FOR_INT_TRACKER: u64 = i32::MAX as u64;

const BIG_ENTRY_BYTES: usize = 5;
const BIG_NOT_FOUND: u64 = (1 << 40) - 1;

/// Receives one call per live array with its label and byte counts.
pub trait MemoryVisitor {
    fn record(&mut self, label: &'static str, used_bytes: u64, reserved_bytes: u64);
}

/// Visitor that just sums everything it sees.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryTotals {
    pub used: u64,
    pub reserved: u64,
}

impl MemoryVisitor for MemoryTotals {
    fn record(&mut self, _label: &'static str, used_bytes: u64, reserved_bytes: u64) {
        self.used += used_bytes;
        self.reserved += reserved_bytes;
    }
}

/// Growable array of u64 values in fixed-size chunks.
#[derive(Debug)]
pub struct LongCache {
    chunks: Vec<Option<Box<[u64]>>>,
    chunk_size: usize,
    gap: u64,
    size: u64,
}

impl LongCache {
    pub fn new(chunk_size: usize, gap: u64) -> Self {
        assert!(chunk_size > 0);
        Self {
            chunks: Vec::new(),
            chunk_size,
            gap,
            size: 0,
        }
    }

    /// Highest written index + 1.
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    pub fn get(&self, index: u64) -> u64 {
        let chunk = (index / self.chunk_size as u64) as usize;
        match self.chunks.get(chunk) {
            Some(Some(data)) => data[(index % self.chunk_size as u64) as usize],
            _ => self.gap,
        }
    }

    pub fn set(&mut self, index: u64, value: u64) {
        let chunk = (index / self.chunk_size as u64) as usize;
        if chunk >= self.chunks.len() {
            self.chunks.resize_with(chunk + 1, || None);
        }
        let gap = self.gap;
        let size = self.chunk_size;
        let data = self.chunks[chunk].get_or_insert_with(|| vec![gap; size].into_boxed_slice());
        data[(index % self.chunk_size as u64) as usize] = value;
        self.size = self.size.max(index + 1);
    }

    /// Overwrites a slot that already lives in an allocated chunk. Never
    /// grows or allocates, so callers holding disjoint slot ranges may run
    /// concurrently.
    pub fn update(&mut self, index: u64, value: u64) {
        let chunk = (index / self.chunk_size as u64) as usize;
        match self.chunks.get_mut(chunk) {
            Some(Some(data)) => data[(index % self.chunk_size as u64) as usize] = value,
            _ => debug_assert!(false, "update of an unallocated slot {index}"),
        }
    }

    pub fn swap(&mut self, a: u64, b: u64) {
        let va = self.get(a);
        let vb = self.get(b);
        self.set(a, vb);
        self.set(b, va);
    }

    pub fn accept(&self, visitor: &mut dyn MemoryVisitor) {
        let (used, reserved) = chunk_bytes(&self.chunks, self.chunk_size, self.size, 8);
        visitor.record("long array", used, reserved);
    }

    /// Releases all chunk storage. Reads afterwards see only gaps.
    pub fn close(&mut self) {
        self.chunks = Vec::new();
        self.size = 0;
    }
}

/// Growable array of u16 group ids, chunked like [`LongCache`].
#[derive(Debug)]
pub struct GroupCache {
    chunks: Vec<Option<Box<[u16]>>>,
    chunk_size: usize,
    gap: u16,
    size: u64,
}

impl GroupCache {
    pub fn new(chunk_size: usize, gap: u16) -> Self {
        assert!(chunk_size > 0);
        Self {
            chunks: Vec::new(),
            chunk_size,
            gap,
            size: 0,
        }
    }

    #[inline]
    pub fn get(&self, index: u64) -> u16 {
        let chunk = (index / self.chunk_size as u64) as usize;
        match self.chunks.get(chunk) {
            Some(Some(data)) => data[(index % self.chunk_size as u64) as usize],
            _ => self.gap,
        }
    }

    pub fn set(&mut self, index: u64, value: u16) {
        let chunk = (index / self.chunk_size as u64) as usize;
        if chunk >= self.chunks.len() {
            self.chunks.resize_with(chunk + 1, || None);
        }
        let gap = self.gap;
        let size = self.chunk_size;
        let data = self.chunks[chunk].get_or_insert_with(|| vec![gap; size].into_boxed_slice());
        data[(index % self.chunk_size as u64) as usize] = value;
        self.size = self.size.max(index + 1);
    }

    pub fn accept(&self, visitor: &mut dyn MemoryVisitor) {
        let (used, reserved) = chunk_bytes(&self.chunks, self.chunk_size, self.size, 2);
        visitor.record("group array", used, reserved);
    }

    pub fn close(&mut self) {
        self.chunks = Vec::new();
        self.size = 0;
    }
}

/// Permutation array over the data cache. The 4-byte variant covers
/// populations whose highest internal id fits an i32; everything larger uses
/// 5-byte entries.
#[derive(Debug)]
pub enum Tracker {
    Int(IntTracker),
    Big(BigTracker),
}

impl Tracker {
    /// Picks the narrowest variant that can address `length` internal ids.
    pub fn for_length(length: u64, chunk_size: usize) -> Self {
        if length == 0 || length - 1 <= HIGHEST_ID_FOR_INT_TRACKER {
            Tracker::Int(IntTracker::new(chunk_size))
        } else {
            Tracker::Big(BigTracker::new(chunk_size))
        }
    }

    #[inline]
    pub fn get(&self, index: u64) -> i64 {
        match self {
            Tracker::Int(t) => t.get(index),
            Tracker::Big(t) => t.get(index),
        }
    }

    #[inline]
    pub fn set(&mut self, index: u64, value: i64) {
        match self {
            Tracker::Int(t) => t.set(index, value),
            Tracker::Big(t) => t.set(index, value),
        }
    }

    pub fn swap(&mut self, a: u64, b: u64) {
        let va = self.get(a);
        let vb = self.get(b);
        self.set(a, vb);
        self.set(b, va);
    }

    /// Bytes per entry, the tracker term of the memory formula.
    pub fn id_size(&self) -> u64 {
        match self {
            Tracker::Int(_) => 4,
            Tracker::Big(_) => BIG_ENTRY_BYTES as u64,
        }
    }

    pub fn accept(&self, visitor: &mut dyn MemoryVisitor) {
        match self {
            Tracker::Int(t) => {
                let (used, reserved) = chunk_bytes(&t.chunks, t.chunk_size, t.size, 4);
                visitor.record("tracker", used, reserved);
            }
            Tracker::Big(t) => {
                let (used, reserved) = chunk_bytes(
                    &t.chunks,
                    t.chunk_size * BIG_ENTRY_BYTES,
                    t.size * BIG_ENTRY_BYTES as u64,
                    1,
                );
                visitor.record("tracker", used, reserved);
            }
        }
    }

    pub fn close(&mut self) {
        match self {
            Tracker::Int(t) => {
                t.chunks = Vec::new();
                t.size = 0;
            }
            Tracker::Big(t) => {
                t.chunks = Vec::new();
                t.size = 0;
            }
        }
    }
}

#[derive(Debug)]
pub struct IntTracker {
    chunks: Vec<Option<Box<[i32]>>>,
    chunk_size: usize,
    size: u64,
}

impl IntTracker {
    fn new(chunk_size: usize) -> Self {
        assert!(chunk_size > 0);
        Self {
            chunks: Vec::new(),
            chunk_size,
            size: 0,
        }
    }

    #[inline]
    fn get(&self, index: u64) -> i64 {
        let chunk = (index / self.chunk_size as u64) as usize;
        match self.chunks.get(chunk) {
            Some(Some(data)) => data[(index % self.chunk_size as u64) as usize] as i64,
            _ => ID_NOT_FOUND,
        }
    }

    fn set(&mut self, index: u64, value: i64) {
        debug_assert!(value >= ID_NOT_FOUND && value <= i32::MAX as i64);
        let chunk = (index / self.chunk_size as u64) as usize;
        if chunk >= self.chunks.len() {
            self.chunks.resize_with(chunk + 1, || None);
        }
        let size = self.chunk_size;
        let data = self.chunks[chunk]
            .get_or_insert_with(|| vec![ID_NOT_FOUND as i32; size].into_boxed_slice());
        data[(index % self.chunk_size as u64) as usize] = value as i32;
        self.size = self.size.max(index + 1);
    }
}

/// 40-bit entries packed five bytes apiece; all-ones is the gap.
#[derive(Debug)]
pub struct BigTracker {
    chunks: Vec<Option<Box<[u8]>>>,
    chunk_size: usize,
    size: u64,
}

impl BigTracker {
    fn new(chunk_size: usize) -> Self {
        assert!(chunk_size > 0);
        Self {
            chunks: Vec::new(),
            chunk_size,
            size: 0,
        }
    }

    #[inline]
    fn get(&self, index: u64) -> i64 {
        let chunk = (index / self.chunk_size as u64) as usize;
        let data = match self.chunks.get(chunk) {
            Some(Some(data)) => data,
            _ => return ID_NOT_FOUND,
        };
        let at = (index % self.chunk_size as u64) as usize * BIG_ENTRY_BYTES;
        let mut value = 0u64;
        for (shift, byte) in data[at..at + BIG_ENTRY_BYTES].iter().enumerate() {
            value |= (*byte as u64) << (shift * 8);
        }
        if value == BIG_NOT_FOUND {
            ID_NOT_FOUND
        } else {
            value as i64
        }
    }

    fn set(&mut self, index: u64, value: i64) {
        debug_assert!(value == ID_NOT_FOUND || (0..BIG_NOT_FOUND as i64).contains(&value));
        let encoded = if value == ID_NOT_FOUND {
            BIG_NOT_FOUND
        } else {
            value as u64
        };
        let chunk = (index / self.chunk_size as u64) as usize;
        if chunk >= self.chunks.len() {
            self.chunks.resize_with(chunk + 1, || None);
        }
        let bytes = self.chunk_size * BIG_ENTRY_BYTES;
        let data = self.chunks[chunk].get_or_insert_with(|| vec![0xFF; bytes].into_boxed_slice());
        let at = (index % self.chunk_size as u64) as usize * BIG_ENTRY_BYTES;
        for (shift, byte) in data[at..at + BIG_ENTRY_BYTES].iter_mut().enumerate() {
            *byte = (encoded >> (shift * 8)) as u8;
        }
        self.size = self.size.max(index + 1);
    }
}

/// Flat byte arena for the original input ids kept by the collision
/// side-store: one offsets vector, one bytes vector, zero per-id allocation.
#[derive(Debug, Default)]
pub struct IdArena {
    bytes: Vec<u8>,
    offsets: Vec<u64>,
}

impl IdArena {
    pub fn new() -> Self {
        Self {
            bytes: Vec::new(),
            offsets: vec![0],
        }
    }

    pub fn push(&mut self, id: &[u8]) -> usize {
        self.bytes.extend_from_slice(id);
        self.offsets.push(self.bytes.len() as u64);
        self.offsets.len() - 2
    }

    #[inline]
    pub fn get(&self, index: usize) -> &[u8] {
        let start = self.offsets[index] as usize;
        let end = self.offsets[index + 1] as usize;
        &self.bytes[start..end]
    }

    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn accept(&self, visitor: &mut dyn MemoryVisitor) {
        let used = self.bytes.len() as u64 + self.len() as u64 * 8;
        let reserved = self.bytes.capacity() as u64 + self.offsets.capacity() as u64 * 8;
        visitor.record("id arena", used, reserved);
    }
}

fn chunk_bytes<T>(
    chunks: &[Option<Box<[T]>>],
    entries_per_chunk: usize,
    size: u64,
    entry_bytes: u64,
) -> (u64, u64) {
    let allocated = chunks.iter().filter(|c| c.is_some()).count() as u64;
    let reserved = allocated * entries_per_chunk as u64 * entry_bytes;
    let mut used = 0;
    for (i, chunk) in chunks.iter().enumerate() {
        if chunk.is_some() {
            let chunk_start = i as u64 * entries_per_chunk as u64;
            let live = size.saturating_sub(chunk_start).min(entries_per_chunk as u64);
            used += live * entry_bytes;
        }
    }
    (used, reserved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_cache_gaps_and_cross_chunk() {
        let mut cache = LongCache::new(4, 0);
        cache.set(1, 11);
        cache.set(9, 99);
        assert_eq!(cache.get(1), 11);
        assert_eq!(cache.get(9), 99);
        // Unwritten slot in an allocated chunk, slot in a hole chunk, slot
        // past the end: all gaps.
        assert_eq!(cache.get(0), 0);
        assert_eq!(cache.get(5), 0);
        assert_eq!(cache.get(100), 0);
        assert_eq!(cache.size(), 10);
    }

    #[test]
    fn long_cache_swap() {
        let mut cache = LongCache::new(4, 0);
        cache.set(0, 7);
        cache.set(6, 8);
        cache.swap(0, 6);
        assert_eq!(cache.get(0), 8);
        assert_eq!(cache.get(6), 7);
    }

    #[test]
    fn group_cache_holds_u16() {
        let mut cache = GroupCache::new(3, 0);
        cache.set(7, u16::MAX);
        assert_eq!(cache.get(7), u16::MAX);
        assert_eq!(cache.get(2), 0);
    }

    #[test]
    fn tracker_picks_width_from_length() {
        assert_eq!(Tracker::for_length(100, 10).id_size(), 4);
        assert_eq!(
            Tracker::for_length(HIGHEST_ID_FOR_INT_TRACKER + 1, 10).id_size(),
            4
        );
        assert_eq!(
            Tracker::for_length(HIGHEST_ID_FOR_INT_TRACKER + 2, 10).id_size(),
            5
        );
    }

    #[test]
    fn int_tracker_sentinel_and_swap() {
        let mut t = Tracker::Int(IntTracker::new(4));
        assert_eq!(t.get(3), ID_NOT_FOUND);
        t.set(0, 42);
        t.set(5, 17);
        t.swap(0, 5);
        assert_eq!(t.get(0), 17);
        assert_eq!(t.get(5), 42);
        // A written chunk still defaults its untouched slots.
        assert_eq!(t.get(1), ID_NOT_FOUND);
    }

    #[test]
    fn big_tracker_roundtrips_40_bit_values() {
        let mut t = Tracker::Big(BigTracker::new(4));
        let large = (1u64 << 39) + 12345;
        t.set(2, large as i64);
        t.set(3, 0);
        t.set(7, ID_NOT_FOUND);
        assert_eq!(t.get(2), large as i64);
        assert_eq!(t.get(3), 0);
        assert_eq!(t.get(7), ID_NOT_FOUND);
        assert_eq!(t.get(0), ID_NOT_FOUND);
    }

    #[test]
    fn arena_returns_pushed_slices() {
        let mut arena = IdArena::new();
        let a = arena.push(b"alice");
        let b = arena.push(b"");
        let c = arena.push(b"bob");
        assert_eq!(arena.get(a), b"alice");
        assert_eq!(arena.get(b), b"");
        assert_eq!(arena.get(c), b"bob");
        assert_eq!(arena.len(), 3);
    }

    #[test]
    fn memory_visitor_sees_only_allocated_chunks() {
        let mut cache = LongCache::new(1000, 0);
        cache.set(0, 1);
        cache.set(2500, 1);
        let mut totals = MemoryTotals::default();
        cache.accept(&mut totals);
        // Chunks 0 and 2 allocated, chunk 1 is a hole.
        assert_eq!(totals.reserved, 2 * 1000 * 8);
        assert_eq!(totals.used, (1000 + 501) * 8);
    }
}
