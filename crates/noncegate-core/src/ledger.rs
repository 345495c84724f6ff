//! Redemption ledger.
//!
//! Bookkeeping for strict redemption, keyed by expiry second:
//!
//! - `max_issued[b]`: largest counter issued with expiry in bucket `b`.
//! - `redeemed[b]`: counters in bucket `b` redeemed out of order and not yet
//!   absorbed into the watermark.
//!
//! The watermark (`min_counter`) itself lives in an atomic owned by the
//! service so redemptions can reject below it without taking the lock. Every
//! method here takes the current watermark and returns the possibly advanced
//! one; callers hold the issue lock across the whole exchange.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

/// Snapshot of ledger occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LedgerStats {
    pub min_counter: u64,
    pub next_counter: u64,
    pub issued_buckets: usize,
    pub redeemed_buckets: usize,
    pub redeemed_entries: usize,
}

#[derive(Debug, Default)]
pub struct Ledger {
    max_issued: BTreeMap<i64, u64>,
    redeemed: BTreeMap<i64, BTreeSet<u64>>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Note that `counter` was issued with expiry in `bucket`.
    pub fn record_issue(&mut self, bucket: i64, counter: u64) {
        let max = self.max_issued.entry(bucket).or_insert(counter);
        if *max < counter {
            *max = counter;
        }
    }

    /// Whether `counter` sits in the out-of-order set for `bucket`.
    pub fn is_redeemed(&self, bucket: i64, counter: u64) -> bool {
        self.redeemed
            .get(&bucket)
            .is_some_and(|set| set.contains(&counter))
    }

    /// Admit `counter`. In-order redemptions move the watermark; anything
    /// else is parked in its bucket's set.
    pub fn admit(&mut self, bucket: i64, counter: u64, min_counter: u64) -> u64 {
        if min_counter.checked_add(1) == Some(counter) {
            return counter;
        }
        self.redeemed.entry(bucket).or_default().insert(counter);
        min_counter
    }

    /// Run both reclamation passes for the current second.
    pub fn reclaim(&mut self, now_bucket: i64, min_counter: u64) -> u64 {
        let min_counter = self.sweep_expired(now_bucket, min_counter);
        self.compact(min_counter)
    }

    /// Drop every bucket whose expiry has passed.
    ///
    /// Counters issued into an expired bucket can no longer pass the
    /// freshness check, so the watermark may rise to the bucket's maximum.
    pub fn sweep_expired(&mut self, now_bucket: i64, min_counter: u64) -> u64 {
        let live_redeemed = self.redeemed.split_off(&now_bucket);
        self.redeemed = live_redeemed;

        let live_issued = self.max_issued.split_off(&now_bucket);
        let expired = std::mem::replace(&mut self.max_issued, live_issued);

        expired.into_values().fold(min_counter, u64::max)
    }

    /// Absorb the contiguous run above the watermark.
    ///
    /// Walks buckets in ascending order and stops at the first bucket left
    /// non-empty: a gap there cannot be filled by a later bucket.
    pub fn compact(&mut self, mut min_counter: u64) -> u64 {
        let mut emptied = Vec::new();

        for (bucket, set) in self.redeemed.iter_mut() {
            *set = set.split_off(&min_counter.saturating_add(1));

            while let Some(next) = min_counter.checked_add(1) {
                if !set.remove(&next) {
                    break;
                }
                min_counter = next;
            }

            if set.is_empty() {
                emptied.push(*bucket);
            } else {
                break;
            }
        }

        for bucket in emptied {
            self.redeemed.remove(&bucket);
        }

        min_counter
    }

    pub fn issued_buckets(&self) -> usize {
        self.max_issued.len()
    }

    pub fn redeemed_buckets(&self) -> usize {
        self.redeemed.len()
    }

    pub fn redeemed_entries(&self) -> usize {
        self.redeemed.values().map(BTreeSet::len).sum()
    }

    pub fn stats(&self, min_counter: u64, next_counter: u64) -> LedgerStats {
        LedgerStats {
            min_counter,
            next_counter,
            issued_buckets: self.issued_buckets(),
            redeemed_buckets: self.redeemed_buckets(),
            redeemed_entries: self.redeemed_entries(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const B: i64 = 1_700_000_090;

    #[test]
    fn test_record_issue_keeps_maximum() {
        let mut ledger = Ledger::new();
        ledger.record_issue(B, 5);
        ledger.record_issue(B, 3);
        ledger.record_issue(B, 9);
        assert_eq!(ledger.max_issued.get(&B), Some(&9));
        assert_eq!(ledger.issued_buckets(), 1);
    }

    #[test]
    fn test_in_order_admission_only_moves_watermark() {
        let mut ledger = Ledger::new();
        let mut min = 0;
        for counter in 1..=10 {
            min = ledger.admit(B, counter, min);
        }
        assert_eq!(min, 10);
        assert_eq!(ledger.redeemed_entries(), 0);
    }

    #[test]
    fn test_out_of_order_admission_is_parked_then_compacted() {
        let mut ledger = Ledger::new();
        let mut min = 0;
        for counter in [3, 2] {
            min = ledger.admit(B, counter, min);
        }
        assert_eq!(min, 0);
        assert!(ledger.is_redeemed(B, 3));
        assert!(ledger.is_redeemed(B, 2));

        min = ledger.admit(B, 1, min);
        assert_eq!(min, 1);

        min = ledger.compact(min);
        assert_eq!(min, 3);
        assert_eq!(ledger.redeemed_buckets(), 0);
    }

    #[test]
    fn test_compaction_stops_at_gap() {
        let mut ledger = Ledger::new();
        ledger.admit(B, 2, 0);
        ledger.admit(B, 4, 0);
        ledger.admit(B + 1, 5, 0);

        let min = ledger.compact(1);
        assert_eq!(min, 2);
        assert!(ledger.is_redeemed(B, 4));
        assert!(ledger.is_redeemed(B + 1, 5));
        assert_eq!(ledger.redeemed_entries(), 2);
    }

    #[test]
    fn test_compaction_crosses_buckets() {
        let mut ledger = Ledger::new();
        ledger.admit(B, 2, 0);
        ledger.admit(B + 1, 3, 0);
        ledger.admit(B + 2, 4, 0);

        let min = ledger.compact(1);
        assert_eq!(min, 4);
        assert_eq!(ledger.redeemed_buckets(), 0);
    }

    #[test]
    fn test_compaction_drops_entries_under_watermark() {
        let mut ledger = Ledger::new();
        ledger.admit(B, 3, 0);
        ledger.admit(B, 7, 0);

        let min = ledger.compact(5);
        assert_eq!(min, 5);
        assert!(!ledger.is_redeemed(B, 3));
        assert!(ledger.is_redeemed(B, 7));
    }

    #[test]
    fn test_expired_sweep_raises_watermark_and_drops_buckets() {
        let mut ledger = Ledger::new();
        ledger.record_issue(B, 4);
        ledger.record_issue(B + 1, 8);
        ledger.record_issue(B + 5, 12);
        ledger.admit(B, 3, 0);
        ledger.admit(B + 5, 11, 0);

        let min = ledger.sweep_expired(B + 2, 0);
        assert_eq!(min, 8);
        assert_eq!(ledger.issued_buckets(), 1);
        assert_eq!(ledger.redeemed_buckets(), 1);
        assert!(ledger.is_redeemed(B + 5, 11));
    }

    #[test]
    fn test_expired_sweep_never_lowers_watermark() {
        let mut ledger = Ledger::new();
        ledger.record_issue(B, 4);
        assert_eq!(ledger.sweep_expired(B + 1, 20), 20);
    }

    #[test]
    fn test_bucket_equal_to_now_survives() {
        let mut ledger = Ledger::new();
        ledger.record_issue(B, 4);
        ledger.admit(B, 4, 0);
        assert_eq!(ledger.sweep_expired(B, 0), 0);
        assert_eq!(ledger.issued_buckets(), 1);
        assert_eq!(ledger.redeemed_buckets(), 1);
    }

    #[test]
    fn test_reclaim_is_idempotent() {
        let mut ledger = Ledger::new();
        for counter in 1..=6 {
            ledger.record_issue(B + counter as i64 / 3, counter);
        }
        ledger.admit(B, 2, 0);
        ledger.admit(B + 1, 4, 0);

        let first = ledger.reclaim(B, 1);
        let stats = ledger.stats(first, 6);
        let second = ledger.reclaim(B, first);
        assert_eq!(first, second);
        assert_eq!(ledger.stats(second, 6), stats);
    }
}
