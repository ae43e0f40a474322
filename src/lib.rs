//! idmap_engine — encoding id mapper for bulk graph imports.
//!
//! - `put` every `(input id, internal id, group)` triple, in any order.
//! - `prepare` once: parallel radix-partitioned sort, collision marking,
//!   duplicate reporting.
//! - O(log n) `get`: input id + group -> lowest matching internal id.
//! - ~9 bytes per node: one encoded 64-bit word plus a 4- or 5-byte tracker
//!   entry, instead of a hash map over the original ids.

pub mod bits;
pub mod cache;
pub mod collector;
pub mod encoder;
pub mod group;
pub mod mapper;
pub mod progress;
pub mod radix;
pub mod sort;
pub mod workers;

pub use cache::{MemoryTotals, MemoryVisitor, ID_NOT_FOUND};
pub use collector::{Collector, DevNullCollector, DuplicateReport, RecordingCollector};
pub use encoder::{Encoder, HashEncoder, StringEncoder};
pub use group::{Group, Groups, MAX_GROUPS};
pub use mapper::{EncodingIdMapper, MapperConfig, MapperError, GAP_VALUE};
pub use progress::{LogProgress, NoProgress, Progress};
