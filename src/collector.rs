//! Sink for duplicate input ids found during prepare. Duplicates are
//! reported, never raised: the import keeps going and the mapper keeps the
//! first-seen internal id.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateReport {
    pub input_id: Vec<u8>,
    pub internal_id: u64,
    pub group_name: String,
}

pub trait Collector {
    fn duplicate(&mut self, input_id: &[u8], internal_id: u64, group_name: &str);
}

/// Swallows reports, counting them.
#[derive(Debug, Default)]
pub struct DevNullCollector {
    count: u64,
}

impl DevNullCollector {
    pub fn count(&self) -> u64 {
        self.count
    }
}

impl Collector for DevNullCollector {
    fn duplicate(&mut self, _input_id: &[u8], _internal_id: u64, _group_name: &str) {
        self.count += 1;
    }
}

/// Keeps every report; what tests and the demo binary use.
#[derive(Debug, Default)]
pub struct RecordingCollector {
    pub reports: Vec<DuplicateReport>,
}

impl Collector for RecordingCollector {
    fn duplicate(&mut self, input_id: &[u8], internal_id: u64, group_name: &str) {
        tracing::debug!(
            input_id = %String::from_utf8_lossy(input_id),
            internal_id,
            group = group_name,
            "duplicate input id"
        );
        self.reports.push(DuplicateReport {
            input_id: input_id.to_vec(),
            internal_id,
            group_name: group_name.to_string(),
        });
    }
}
