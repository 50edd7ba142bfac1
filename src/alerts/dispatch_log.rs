//! Bounded in-memory history of dispatch attempts.

use std::{
    collections::VecDeque,
    fmt,
    sync::{Mutex, PoisonError},
};

use crate::alerts::{DispatchRecord, Outcome};

/// Counts of dispatch outcomes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    pub sent: usize,
    pub failed: usize,
    pub suppressed: usize,
}

impl DispatchSummary {
    /// Counts the outcomes of `records`.
    pub fn from_records(records: &[DispatchRecord]) -> Self {
        records
            .iter()
            .fold(DispatchSummary::default(), |mut summary, record| {
                match record.outcome {
                    Outcome::Sent => summary.sent += 1,
                    Outcome::Failed => summary.failed += 1,
                    Outcome::Suppressed => summary.suppressed += 1,
                }
                summary
            })
    }
}

impl fmt::Display for DispatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "sent={}, failed={}, suppressed={}",
            self.sent, self.failed, self.suppressed
        )
    }
}

/// Keeps the most recent dispatch records, evicting the oldest first.
pub struct DispatchLog {
    records: Mutex<VecDeque<DispatchRecord>>,
    capacity: usize,
}

impl DispatchLog {
    /// Create a new, empty [DispatchLog].
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of records kept. Zero keeps nothing.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// let log = DispatchLog::new(10_000);
    /// log.append(&records);
    /// info!("dispatch history: {}", log.summary());
    /// ```
    pub fn new(capacity: usize) -> Self {
        DispatchLog {
            records: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Appends `records` in order, evicting the oldest ones past capacity.
    pub fn append(&self, records: &[DispatchRecord]) {
        let mut log = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        for record in records {
            if log.len() == self.capacity {
                log.pop_front();
            }
            if self.capacity > 0 {
                log.push_back(record.clone());
            }
        }
    }

    /// Records kept so far, oldest first.
    #[cfg(test)]
    pub fn records(&self) -> Vec<DispatchRecord> {
        let log = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        log.iter().cloned().collect()
    }

    /// Outcome counts over the records still kept.
    pub fn summary(&self) -> DispatchSummary {
        let mut log = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        DispatchSummary::from_records(log.make_contiguous())
    }
}
