use crate::*;
use log::debug;
use std::collections::VecDeque;

pub const DEFAULT_LOG_CAPACITY: usize = 50;

/// One protocol step, as recorded by the operation log.
///
/// Records carry ids and sizes only, never key material or choices.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OperationRecord {
    pub sequence: u64,
    pub timestamp: u64,
    pub operation: String,
    pub subject: Option<String>,
    pub detail: String,
}

/// Bounded ring buffer of recent protocol operations
///
/// Owned by whoever drives the protocol and handed by `&mut` to each operation
/// that records into it. When full, the oldest record is dropped.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct OperationLog {
    capacity: usize,
    next_sequence: u64,
    records: VecDeque<OperationRecord>,
}

impl OperationLog {
    pub fn with_capacity(capacity: usize) -> Self {
        OperationLog {
            capacity,
            next_sequence: 1,
            records: VecDeque::with_capacity(capacity),
        }
    }

    pub fn record(&mut self, operation: &str, subject: Option<&str>, detail: impl Into<String>) {
        let record = OperationRecord {
            sequence: self.next_sequence,
            timestamp: unix_timestamp(),
            operation: operation.to_owned(),
            subject: subject.map(|s| s.to_owned()),
            detail: detail.into(),
        };
        self.next_sequence += 1;

        debug!(
            "#{} {} {} {}",
            record.sequence,
            record.operation,
            record.subject.as_deref().unwrap_or("-"),
            record.detail
        );

        if self.capacity == 0 {
            return;
        }
        while self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Oldest first
    pub fn records(&self) -> Vec<OperationRecord> {
        self.records.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every record. Sequence numbers keep increasing.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}

impl Default for OperationLog {
    fn default() -> Self {
        OperationLog::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}
