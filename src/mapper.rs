//! The encoding id mapper.
//!
//! Maps arbitrary input identifiers to the dense internal node ids of a bulk
//! import. Ids are [`put`](EncodingIdMapper::put) in any order, the mapper is
//! [`prepare`](EncodingIdMapper::prepare)d once, and from then on
//! [`get`](EncodingIdMapper::get) answers lookups with a radix-zoomed binary
//! search. Space is the whole point: one encoded 64-bit word plus a 4- or
//! 5-byte tracker entry per node instead of a hash map over the original ids.
//!
//! Terminology follows the wider crate: an *eId* is the encoder's 64-bit
//! image of an input id (bit 56 reserved as the collision mark, 0 reserved
//! as the gap); the *data cache* holds eIds indexed by internal id and is
//! never reordered; the *tracker* is the permutation that sorting mutates
//! instead.

use crate::bits::COLLISION_MARK;
use crate::cache::{
    GroupCache, IdArena, LongCache, MemoryVisitor, Tracker, DEFAULT_CHUNK_SIZE,
    HIGHEST_ID_FOR_INT_TRACKER, ID_NOT_FOUND,
};
use crate::collector::Collector;
use crate::encoder::Encoder;
use crate::group::{Group, MAX_GROUPS};
use crate::progress::Progress;
use crate::radix::{radix_of, RadixIndex};
use crate::sort::{DefaultComparator, ParallelSorter, SortBucket, SortComparator};
use crate::workers::{self, WorkerFailure};
use thiserror::Error;

/// Encoded value meaning "no node at this internal id". Safe because no
/// conforming encoder produces 0 for a real id: non-empty ids carry length
/// metadata in the high bits and the empty id has its own reserved word.
pub const GAP_VALUE: u64 = 0;

const PROGRESS_BATCH: u64 = 1000;

#[inline]
fn set_collision(eid: u64) -> u64 {
    COLLISION_MARK.set(eid, 1)
}

#[inline]
pub(crate) fn clear_collision(eid: u64) -> u64 {
    COLLISION_MARK.clear(eid, false)
}

#[inline]
fn is_collision(eid: u64) -> bool {
    COLLISION_MARK.is_set(eid)
}

#[derive(Debug, Error)]
pub enum MapperError {
    /// The encoder emitted the reserved gap value for a real input id.
    #[error("encoder produced the reserved gap value 0 for an input id")]
    IllegalEncoding,
    /// The collision pass saw a descending pair, meaning the sort is broken.
    #[error(
        "unsorted data at tracker index {index}: {a:#018x} > {b:#018x} (radix {radix_a}:{radix_b})"
    )]
    UnsortedData {
        index: u64,
        a: u64,
        b: u64,
        radix_a: usize,
        radix_b: usize,
    },
    #[error("too many collisions: {0}")]
    TooManyCollisions(u64),
    /// A prepare worker died; the mapper is poisoned and only `close` is
    /// legal.
    #[error("interrupted while preparing the mapper")]
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct MapperConfig {
    /// Entries per chunk of every backing array.
    pub chunk_size: usize,
    /// Worker threads for the prepare phases.
    pub processors: usize,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            processors: workers::default_processors(),
        }
    }
}

impl MapperConfig {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_processors(mut self, processors: usize) -> Self {
        self.processors = processors.max(1);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Prepared,
    Closed,
    Poisoned,
}

pub struct EncodingIdMapper<E: Encoder> {
    config: MapperConfig,
    encoder: E,
    /// eIds indexed by internal id; written by `put`, marked during detect,
    /// never reordered.
    data: LongCache,
    group_of: GroupCache,
    highest_set_index: i64,
    tracker: Option<Tracker>,
    radix: RadixIndex,
    sort_buckets: Vec<SortBucket>,
    /// Original input ids of marked nodes, in ascending internal-id order.
    collision_input_ids: IdArena,
    /// Internal ids matching `collision_input_ids`, ascending, so lookups
    /// can binary-search them.
    collision_node_ids: LongCache,
    num_collisions: u64,
    groups: Vec<Option<Group>>,
    state: State,
}

impl<E: Encoder> EncodingIdMapper<E> {
    pub fn new(encoder: E) -> Self {
        Self::with_config(encoder, MapperConfig::default())
    }

    pub fn with_config(encoder: E, config: MapperConfig) -> Self {
        let chunk_size = config.chunk_size;
        Self {
            config,
            encoder,
            data: LongCache::new(chunk_size, GAP_VALUE),
            group_of: GroupCache::new(chunk_size, 0),
            highest_set_index: -1,
            tracker: None,
            radix: RadixIndex::new(),
            sort_buckets: Vec::new(),
            collision_input_ids: IdArena::new(),
            collision_node_ids: LongCache::new(chunk_size, ID_NOT_FOUND as u64),
            num_collisions: 0,
            groups: vec![None; MAX_GROUPS],
            state: State::Open,
        }
    }

    /// Records `input_id` as the identity of `internal_id` within `group`.
    /// Caller-serialized; legal only before `prepare`.
    pub fn put(&mut self, input_id: &[u8], internal_id: u64, group: &Group) -> Result<(), MapperError> {
        debug_assert_eq!(self.state, State::Open, "put after prepare");
        let eid = self.encode(input_id)?;
        self.data.set(internal_id, eid);
        self.group_of.set(internal_id, group.id());
        self.highest_set_index = self.highest_set_index.max(internal_id as i64);

        // Remember the group for duplicate reporting by name.
        let slot = group.id() as usize;
        if self.groups[slot].is_none() {
            self.groups[slot] = Some(group.clone());
        }
        Ok(())
    }

    pub fn needs_preparation(&self) -> bool {
        true
    }

    /// Number of eIds marked as collisions by the last `prepare`.
    pub fn collision_count(&self) -> u64 {
        self.num_collisions
    }

    fn encode(&self, input_id: &[u8]) -> Result<u64, MapperError> {
        let eid = self.encoder.encode(input_id);
        if eid == GAP_VALUE {
            return Err(MapperError::IllegalEncoding);
        }
        Ok(eid)
    }

    /// Sorts the tracker, marks collisions and resolves them against the
    /// original input ids. One-shot; a failure poisons the mapper.
    ///
    /// `input_id_lookup` must return the input id that was `put` at the
    /// given internal id; it is consulted only for collision-marked ids.
    /// Duplicate `(input id, group)` pairs go to `collector` and are not
    /// errors. Progress stages arrive in order: `SPLIT`, `SORT`, `DETECT`,
    /// `RESOLVE (n collisions)`, `DEDUPLICATE` (the latter two only when
    /// there are collisions).
    pub fn prepare<F>(
        &mut self,
        input_id_lookup: F,
        collector: &mut dyn Collector,
        progress: &dyn Progress,
    ) -> Result<(), MapperError>
    where
        F: Fn(u64) -> Vec<u8>,
    {
        debug_assert_eq!(self.state, State::Open, "prepare called twice");
        match self.do_prepare(input_id_lookup, collector, progress) {
            Ok(()) => {
                self.state = State::Prepared;
                Ok(())
            }
            Err(e) => {
                self.state = State::Poisoned;
                Err(e)
            }
        }
    }

    fn do_prepare<F>(
        &mut self,
        input_id_lookup: F,
        collector: &mut dyn Collector,
        progress: &dyn Progress,
    ) -> Result<(), MapperError>
    where
        F: Fn(u64) -> Vec<u8>,
    {
        let count = (self.highest_set_index + 1) as u64;
        for index in 0..count {
            self.radix.register(self.data.get(index));
        }

        let mut tracker = Tracker::for_length(count, self.config.chunk_size);
        self.sort_buckets = ParallelSorter::new(
            &self.data,
            count,
            &self.radix,
            &mut tracker,
            self.config.processors,
            progress,
            &DefaultComparator,
        )
        .run()
        .map_err(|_| MapperError::Interrupted)?;

        let collisions = self.detect_and_mark_collisions(&mut tracker, progress)?;
        if collisions > i32::MAX as u64 {
            return Err(MapperError::TooManyCollisions(collisions));
        }
        self.num_collisions = collisions;
        self.tracker = Some(tracker);
        tracing::debug!(collisions, "collision detection complete");

        if collisions > 0 {
            self.build_collision_info(&input_id_lookup, collector, progress)?;
        }
        Ok(())
    }

    /// Walks every adjacent tracker pair, marking eIds that repeat within a
    /// group. Workers own disjoint pair ranges; the single pair straddling
    /// each range boundary runs after the join, resuming that worker's own
    /// detector state so run context is not lost at the boundary.
    fn detect_and_mark_collisions(
        &mut self,
        tracker: &mut Tracker,
        progress: &dyn Progress,
    ) -> Result<u64, MapperError> {
        progress.started("DETECT");
        let count = (self.highest_set_index + 1) as u64;
        let ranges = workers::partition(count, self.config.processors);

        let shared = DetectShared {
            tracker,
            data: &mut self.data,
            groups: &self.group_of,
        };
        let outcomes = workers::run_partitioned(&ranges, |range| {
            let mut detector = SameGroupDetector::new();
            let mut marked = 0u64;
            let mut pending = 0u64;
            let end = range.to.saturating_sub(1);
            for pair in range.from..end {
                marked += shared.detect_pair(pair, &mut detector)? as u64;
                pending += 1;
                if pending == PROGRESS_BATCH {
                    progress.add(pending);
                    pending = 0;
                }
            }
            progress.add(pending);
            Ok((marked, detector))
        });
        let mut outcomes = match outcomes {
            Ok(outcomes) => outcomes,
            Err(WorkerFailure::Failed(e)) => return Err(e),
            Err(WorkerFailure::Panicked) => return Err(MapperError::Interrupted),
        };
        let mut total: u64 = outcomes.iter().map(|(marked, _)| *marked).sum();

        // Seam pairs between neighbouring ranges. Each continues with the
        // detector state its worker carried up to the boundary, so a run
        // head remembered just before the seam still gets retro-marked.
        for (range, (_, detector)) in ranges.iter().zip(outcomes.iter_mut()) {
            if !range.last && range.to > 0 {
                total += shared.detect_pair(range.to - 1, detector)? as u64;
                progress.add(1);
            }
        }

        progress.done();
        Ok(total)
    }

    /// Phase C: collect the original input ids of every marked internal id,
    /// sort them `(eId, internal id)`-wise and report duplicates within each
    /// `(eId, group)` run.
    fn build_collision_info<F>(
        &mut self,
        input_id_lookup: &F,
        collector: &mut dyn Collector,
        progress: &dyn Progress,
    ) -> Result<(), MapperError>
    where
        F: Fn(u64) -> Vec<u8>,
    {
        progress.started(&format!("RESOLVE ({} collisions)", self.num_collisions));
        let mut radix = RadixIndex::new();
        let count = (self.highest_set_index + 1) as u64;
        let mut pending = 0u64;
        for node_id in 0..count {
            let eid = self.data.get(node_id);
            if is_collision(eid) {
                let input_id = input_id_lookup(node_id);
                debug_assert_eq!(
                    self.encoder.encode(&input_id),
                    clear_collision(eid),
                    "input id lookup disagrees with the data cache at {node_id}"
                );
                let index = self.collision_input_ids.push(&input_id);
                self.collision_node_ids.set(index as u64, node_id);
                radix.register(clear_collision(eid));
            }
            pending += 1;
            if pending == PROGRESS_BATCH {
                progress.add(pending);
                pending = 0;
            }
        }
        progress.add(pending);
        progress.done();

        self.detect_duplicate_input_ids(&radix, collector, progress)
    }

    fn detect_duplicate_input_ids(
        &mut self,
        radix: &RadixIndex,
        collector: &mut dyn Collector,
        progress: &dyn Progress,
    ) -> Result<(), MapperError> {
        let count = self.num_collisions;
        let mut collision_tracker = Tracker::for_length(count, self.config.chunk_size);
        let comparator = DuplicateComparator { data: &self.data };
        ParallelSorter::new(
            &self.collision_node_ids,
            count,
            radix,
            &mut collision_tracker,
            self.config.processors,
            progress,
            &comparator,
        )
        .run()
        .map_err(|_| MapperError::Interrupted)?;

        progress.started("DEDUPLICATE");
        let mut previous_eid = GAP_VALUE;
        let mut previous_group = -1i64;
        // Arena indices of the input ids seen in the current (eId, group)
        // run. Linear membership is fine: runs are collision-sized.
        let mut seen: Vec<usize> = Vec::new();
        let mut duplicates = 0u64;
        for i in 0..count {
            let collision_index = collision_tracker.get(i) as usize;
            let node_id = self.collision_node_ids.get(collision_index as u64);
            let eid = self.data.get(node_id);
            let group_id = self.group_of.get(node_id);
            if eid != previous_eid || previous_group != group_id as i64 {
                seen.clear();
            }

            let input_id = self.collision_input_ids.get(collision_index);
            let duplicate = seen
                .iter()
                .any(|&s| self.collision_input_ids.get(s) == input_id);
            if duplicate {
                let group_name = self.groups[group_id as usize]
                    .as_ref()
                    .map(Group::name)
                    .unwrap_or_default();
                collector.duplicate(input_id, node_id, group_name);
                duplicates += 1;
            } else {
                seen.push(collision_index);
            }

            previous_eid = eid;
            previous_group = group_id as i64;
            progress.add(1);
        }
        progress.done();
        tracing::debug!(duplicates, "duplicate scan complete");
        Ok(())
    }

    /// Returns the lowest internal id `input_id` maps to within `group`, or
    /// [`ID_NOT_FOUND`]. Legal only after `prepare`; read-only and safe to
    /// call from many threads at once.
    pub fn get(&self, input_id: &[u8], group: &Group) -> i64 {
        debug_assert_eq!(self.state, State::Prepared, "get before prepare");
        if self.state != State::Prepared || self.highest_set_index < 0 {
            return ID_NOT_FOUND;
        }
        let tracker = match &self.tracker {
            Some(tracker) => tracker,
            None => return ID_NOT_FOUND,
        };
        let x = self.encoder.encode(input_id);
        if x == GAP_VALUE {
            // put() rejects such ids, so nothing stored can match.
            return ID_NOT_FOUND;
        }

        let highest = self.highest_set_index as u64;
        let mut low = 0;
        let mut high = highest;
        let rx = radix_of(x);
        for (k, bucket) in self.sort_buckets.iter().enumerate() {
            if rx <= bucket.radix {
                low = bucket.start;
                high = match self.sort_buckets.get(k + 1) {
                    Some(next) => next.start - 1,
                    None => highest,
                };
                break;
            }
        }

        let found = self.binary_search_range(tracker, x, input_id, low, high, group.id());
        if found != ID_NOT_FOUND {
            return found;
        }
        // Safety net for lookups straddling a bucket boundary: one full-range
        // retry before giving up.
        self.binary_search_range(tracker, x, input_id, 0, highest, group.id())
    }

    fn binary_search_range(
        &self,
        tracker: &Tracker,
        x: u64,
        input_id: &[u8],
        mut low: u64,
        mut high: u64,
        group_id: u16,
    ) -> i64 {
        let highest = self.highest_set_index as u64;
        while low <= high {
            let mid = low + (high - low) / 2;
            let node_id = tracker.get(mid);
            if node_id == ID_NOT_FOUND {
                return ID_NOT_FOUND;
            }
            let mid_value = clear_collision(self.data.get(node_id as u64));
            if mid_value == x {
                // Not every duplicated value is a collision (equal eIds in
                // different groups stay unmarked), so always check whether
                // the run extends past mid.
                if (mid > 0 && self.data_value_at(tracker, mid - 1) == x)
                    || (mid < highest && self.data_value_at(tracker, mid + 1) == x)
                {
                    return self.find_from_eid_range(tracker, mid, x, input_id, group_id);
                }
                return if self.group_of.get(node_id as u64) == group_id {
                    node_id
                } else {
                    ID_NOT_FOUND
                };
            }
            if mid_value < x {
                low = mid + 1;
            } else if mid == 0 {
                break;
            } else {
                high = mid - 1;
            }
        }
        ID_NOT_FOUND
    }

    #[inline]
    fn data_value_at(&self, tracker: &Tracker, index: u64) -> u64 {
        clear_collision(self.data.get(tracker.get(index) as u64))
    }

    /// Scans the full equal-eId run around `mid` for the lowest internal id
    /// whose group and original input id match.
    fn find_from_eid_range(
        &self,
        tracker: &Tracker,
        mid: u64,
        x: u64,
        input_id: &[u8],
        group_id: u16,
    ) -> i64 {
        let highest = self.highest_set_index as u64;
        let mut from = mid;
        while from > 0 && self.data_value_at(tracker, from - 1) == x {
            from -= 1;
        }
        let mut to = mid;
        while to < highest && self.data_value_at(tracker, to + 1) == x {
            to += 1;
        }

        let mut lowest = ID_NOT_FOUND;
        for index in from..=to {
            let node_id = tracker.get(index);
            if node_id == ID_NOT_FOUND || self.group_of.get(node_id as u64) != group_id {
                continue;
            }
            let eid = self.data.get(node_id as u64);
            if !is_collision(eid) {
                // Unmarked means unique within its group; done.
                return node_id;
            }
            // Marked: the eId alone is ambiguous, consult the original
            // input id and keep the lowest internal id that matches.
            if let Some(collision_index) = self.find_collision_index(node_id as u64) {
                if self.collision_input_ids.get(collision_index) == input_id {
                    lowest = if lowest == ID_NOT_FOUND {
                        node_id
                    } else {
                        lowest.min(node_id)
                    };
                }
            }
        }
        lowest
    }

    /// Binary search over the side-store's internal ids, which were appended
    /// in ascending order during phase C.
    fn find_collision_index(&self, node_id: u64) -> Option<usize> {
        let mut low = 0i64;
        let mut high = self.num_collisions as i64 - 1;
        while low <= high {
            let mid = low + (high - low) / 2;
            let mid_value = self.collision_node_ids.get(mid as u64);
            if mid_value == node_id {
                return Some(mid as usize);
            }
            if mid_value < node_id {
                low = mid + 1;
            } else {
                high = mid - 1;
            }
        }
        None
    }

    /// Planning figure: bytes per node for the data cache plus the tracker
    /// width the population would get.
    pub fn calculate_memory_usage(num_nodes: u64) -> u64 {
        let tracker_bytes = if num_nodes > HIGHEST_ID_FOR_INT_TRACKER + 1 {
            5
        } else {
            4
        };
        num_nodes * (8 + tracker_bytes)
    }

    pub fn accept_memory_stats(&self, visitor: &mut dyn MemoryVisitor) {
        self.data.accept(visitor);
        self.group_of.accept(visitor);
        if let Some(tracker) = &self.tracker {
            tracker.accept(visitor);
        }
        self.collision_node_ids.accept(visitor);
        self.collision_input_ids.accept(visitor);
    }

    /// Releases all backing arrays. Legal from any state.
    pub fn close(&mut self) {
        self.data.close();
        self.group_of.close();
        if let Some(tracker) = &mut self.tracker {
            tracker.close();
        }
        self.collision_node_ids.close();
        self.collision_input_ids = IdArena::new();
        self.sort_buckets = Vec::new();
        self.state = State::Closed;
    }
}

/// Handles shared by the detect workers. Sound because every worker owns a
/// disjoint set of tracker slots (its pair range) and, through the tracker
/// permutation, a disjoint set of data-cache slots; marks go through
/// [`LongCache::update`], which never reallocates.
#[derive(Clone, Copy)]
struct DetectShared {
    tracker: *mut Tracker,
    data: *mut LongCache,
    groups: *const GroupCache,
}

unsafe impl Send for DetectShared {}
unsafe impl Sync for DetectShared {}

impl DetectShared {
    /// Examines the adjacent tracker pair `(i, i + 1)`.
    fn detect_pair(&self, i: u64, detector: &mut SameGroupDetector) -> Result<u32, MapperError> {
        let (node_a, node_b) = unsafe { ((*self.tracker).get(i), (*self.tracker).get(i + 1)) };
        if node_a == ID_NOT_FOUND || node_b == ID_NOT_FOUND {
            detector.reset();
            return Ok(0);
        }
        let eid_a = clear_collision(unsafe { (*self.data).get(node_a as u64) });
        let eid_b = clear_collision(unsafe { (*self.data).get(node_b as u64) });
        if eid_a == GAP_VALUE || eid_b == GAP_VALUE {
            detector.reset();
            return Ok(0);
        }
        if eid_a > eid_b {
            return Err(MapperError::UnsortedData {
                index: i,
                a: eid_a,
                b: eid_b,
                radix_a: radix_of(eid_a),
                radix_b: radix_of(eid_b),
            });
        }
        if eid_a < eid_b {
            detector.reset();
            return Ok(0);
        }

        let group_a = unsafe { (*self.groups).get(node_a as u64) };
        let group_b = unsafe { (*self.groups).get(node_b as u64) };
        let collision = detector.collision_within_same_group(node_a, group_a, node_b, group_b);

        if node_a > node_b {
            // Keep runs of equal eIds in ascending internal-id order.
            unsafe { (*self.tracker).swap(i, i + 1) };
        }

        let mut marked = 0;
        if collision != ID_NOT_FOUND {
            if self.mark(collision as u64) {
                marked += 1;
            }
            if self.mark(node_b as u64) {
                marked += 1;
            }
        }
        Ok(marked)
    }

    /// Returns true if this call set the mark, false if it was already set.
    fn mark(&self, node_id: u64) -> bool {
        let eid = unsafe { (*self.data).get(node_id) };
        if is_collision(eid) {
            return false;
        }
        unsafe { (*self.data).update(node_id, set_collision(eid)) };
        true
    }
}

/// Per-worker state tracking the head of the current equal-eId run, so a
/// later member of the head's group can retro-mark it even when another
/// group's ids sit in between.
struct SameGroupDetector {
    first_index: i64,
    first_group: i64,
}

impl SameGroupDetector {
    fn new() -> Self {
        Self {
            first_index: ID_NOT_FOUND,
            first_group: -1,
        }
    }

    fn reset(&mut self) {
        self.first_index = ID_NOT_FOUND;
        self.first_group = -1;
    }

    /// Called for each adjacent pair of equal eIds; returns the internal id
    /// to mark together with `node_b`, or [`ID_NOT_FOUND`] when the pair
    /// spans groups.
    fn collision_within_same_group(
        &mut self,
        node_a: i64,
        group_a: u16,
        node_b: i64,
        group_b: u16,
    ) -> i64 {
        if self.first_index == ID_NOT_FOUND {
            self.first_index = node_a;
            self.first_group = group_a as i64;
        }
        if group_a == group_b {
            return node_a;
        }
        if self.first_group == group_b as i64 {
            return self.first_index;
        }
        ID_NOT_FOUND
    }
}

/// Orders collision entries by mark-cleared eId, ties broken by internal id,
/// which makes `(eId, group)` runs contiguous and deterministic for the
/// duplicate scan. Values under sort here are internal ids, hence the
/// indirection in `data_value`.
struct DuplicateComparator<'a> {
    data: &'a LongCache,
}

impl SortComparator for DuplicateComparator<'_> {
    fn lt(&self, left: u64, right: u64) -> bool {
        let left_eid = clear_collision(self.data.get(left));
        let right_eid = clear_collision(self.data.get(right));
        left_eid < right_eid || (left_eid == right_eid && left < right)
    }

    fn data_value(&self, value: u64) -> u64 {
        self.data.get(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::RecordingCollector;
    use crate::encoder::StringEncoder;
    use crate::progress::NoProgress;

    struct GapEncoder;
    impl Encoder for GapEncoder {
        fn encode(&self, input_id: &[u8]) -> u64 {
            if input_id == b"poison" {
                0
            } else {
                StringEncoder.encode(input_id)
            }
        }
    }

    #[test]
    fn put_rejects_a_gap_encoding() {
        let mut mapper = EncodingIdMapper::new(GapEncoder);
        let group = Group::new(0, "g0");
        assert!(mapper.put(b"fine", 0, &group).is_ok());
        assert!(matches!(
            mapper.put(b"poison", 1, &group),
            Err(MapperError::IllegalEncoding)
        ));
    }

    #[test]
    fn memory_formula_follows_tracker_width() {
        let small = HIGHEST_ID_FOR_INT_TRACKER + 1;
        assert_eq!(
            EncodingIdMapper::<StringEncoder>::calculate_memory_usage(small),
            small * 12
        );
        assert_eq!(
            EncodingIdMapper::<StringEncoder>::calculate_memory_usage(small + 1),
            (small + 1) * 13
        );
    }

    #[test]
    fn same_group_detector_retro_marks_the_run_head() {
        let mut detector = SameGroupDetector::new();
        // Run of equal eIds: node 5 (g0), node 9 (g1), node 12 (g0).
        assert_eq!(detector.collision_within_same_group(5, 0, 9, 1), ID_NOT_FOUND);
        assert_eq!(detector.collision_within_same_group(9, 1, 12, 0), 5);
        detector.reset();
        // Adjacent same-group pair marks itself.
        assert_eq!(detector.collision_within_same_group(3, 2, 4, 2), 3);
    }

    #[test]
    fn empty_mapper_prepares_and_misses() {
        let mut mapper = EncodingIdMapper::new(StringEncoder);
        let group = Group::new(0, "g0");
        let mut collector = RecordingCollector::default();
        mapper
            .prepare(|_| unreachable!("no ids were put"), &mut collector, &NoProgress)
            .unwrap();
        assert_eq!(mapper.get(b"anything", &group), ID_NOT_FOUND);
    }
}
