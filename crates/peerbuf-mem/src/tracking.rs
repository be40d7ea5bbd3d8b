//! Byte counters for buffers given out and returned, plus the in-use peak.

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct UsageCounters {
    given: AtomicUsize,
    returned: AtomicUsize,
    peak_in_use: AtomicUsize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct UsageSnapshot {
    pub given: usize,
    pub returned: usize,
    pub in_use: usize,
    pub peak_in_use: usize,
}

impl UsageCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_given(&self, bytes: usize) {
        let given = self.given.fetch_add(bytes, Ordering::AcqRel) + bytes;
        let in_use = given.saturating_sub(self.returned.load(Ordering::Acquire));
        self.record_peak(in_use);
    }

    pub fn record_returned(&self, bytes: usize) {
        self.returned.fetch_add(bytes, Ordering::AcqRel);
    }

    fn record_peak(&self, in_use: usize) {
        let mut cur = self.peak_in_use.load(Ordering::Relaxed);
        while in_use > cur {
            match self.peak_in_use.compare_exchange(
                cur,
                in_use,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(observed) => cur = observed,
            }
        }
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        let given = self.given.load(Ordering::Acquire);
        let returned = self.returned.load(Ordering::Acquire);
        UsageSnapshot {
            given,
            returned,
            in_use: given.saturating_sub(returned),
            peak_in_use: self.peak_in_use.load(Ordering::Relaxed),
        }
    }
}
