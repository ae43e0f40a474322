//! Bulk demo: one million input ids through put -> prepare -> get.

use idmap_engine::{
    EncodingIdMapper, Group, HashEncoder, MemoryTotals, Progress, RecordingCollector,
    ID_NOT_FOUND,
};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

const N_IDS: u64 = 1_000_000;
const SAMPLE: usize = 10_000;
const SEED: u64 = 42;

struct StdoutProgress {
    stage: Mutex<(String, Instant)>,
    items: AtomicU64,
}

impl StdoutProgress {
    fn new() -> Self {
        Self {
            stage: Mutex::new((String::new(), Instant::now())),
            items: AtomicU64::new(0),
        }
    }
}

impl Progress for StdoutProgress {
    fn started(&self, stage: &str) {
        self.items.store(0, Ordering::Relaxed);
        if let Ok(mut current) = self.stage.lock() {
            *current = (stage.to_string(), Instant::now());
        }
    }

    fn add(&self, n: u64) {
        self.items.fetch_add(n, Ordering::Relaxed);
    }

    fn done(&self) {
        if let Ok(current) = self.stage.lock() {
            println!(
                "  {:<28} {:>10} items {:>9.1} ms",
                current.0,
                self.items.load(Ordering::Relaxed),
                current.1.elapsed().as_secs_f64() * 1000.0
            );
        }
    }
}

fn input_id(internal_id: u64) -> Vec<u8> {
    format!("node-{internal_id:07}").into_bytes()
}

fn main() {
    println!("idmap_engine bulk demo");
    println!("n = {N_IDS} ids");
    println!("{}", "=".repeat(60));

    let mut mapper = EncodingIdMapper::new(HashEncoder::default());
    let group = Group::new(0, "nodes");

    let t_put = Instant::now();
    for internal_id in 0..N_IDS {
        mapper
            .put(&input_id(internal_id), internal_id, &group)
            .expect("encoder never produces the gap value");
    }
    let put_s = t_put.elapsed().as_secs_f64();
    println!(
        "put      {:>10.1} ms  ({:.0} ids/s)",
        put_s * 1000.0,
        N_IDS as f64 / put_s
    );

    let mut collector = RecordingCollector::default();
    let progress = StdoutProgress::new();
    let t_prepare = Instant::now();
    mapper
        .prepare(input_id, &mut collector, &progress)
        .expect("prepare failed");
    let prepare_s = t_prepare.elapsed().as_secs_f64();
    println!(
        "prepare  {:>10.1} ms  ({} collisions, {} duplicates)",
        prepare_s * 1000.0,
        mapper.collision_count(),
        collector.reports.len()
    );

    let queries: Vec<u64> = (0..SAMPLE as u64)
        .map(|k| splitmix64(SEED ^ k) % N_IDS)
        .collect();
    let t_get = Instant::now();
    let mut misses = 0u64;
    for &internal_id in &queries {
        if mapper.get(&input_id(internal_id), &group) != internal_id as i64 {
            misses += 1;
        }
    }
    let get_s = t_get.elapsed().as_secs_f64();
    println!(
        "get      {:>10.1} ns/op ({} of {} wrong)",
        get_s * 1e9 / SAMPLE as f64,
        misses,
        SAMPLE
    );
    assert_eq!(misses, 0);
    assert_eq!(mapper.get(b"node-missing", &group), ID_NOT_FOUND);

    let mut totals = MemoryTotals::default();
    mapper.accept_memory_stats(&mut totals);
    let planned = EncodingIdMapper::<HashEncoder>::calculate_memory_usage(N_IDS);
    println!(
        "memory   {:>10.2} MB live ({:.2} B/id, planned {:.2} B/id)",
        totals.used as f64 / 1_048_576.0,
        totals.used as f64 / N_IDS as f64,
        planned as f64 / N_IDS as f64
    );

    mapper.close();
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
