// SPDX-License-Identifier: MIT OR Apache-2.0
//! Recompute gating for consumer nodes.
//!
//! Every notification a consumer receives goes through its [`TriggerGate`],
//! which decides whether the payload warrants a new computation:
//! - a payload that already completed successfully is not processed again
//! - the payload currently being processed is dropped, along with anything
//!   waiting behind it
//! - a different payload arriving mid-run waits and runs once the current
//!   run finishes; a newer arrival replaces an older waiting one
//! - a failed run clears its marker so the same payload can be retried

use crate::payload::PayloadKey;

/// What the gate decided for an offered payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerDecision {
    /// Start computing now
    Start,
    /// Already processed successfully; nothing to do
    AlreadyProcessed,
    /// Identical to the payload being processed; dropped
    InFlight,
    /// Another run is active; this payload runs after it
    Queued,
}

impl TriggerDecision {
    /// Whether the caller should start a computation
    pub fn should_start(self) -> bool {
        self == Self::Start
    }
}

/// Dedup and concurrency gate for one logical trigger of one node
#[derive(Debug, Clone)]
pub struct TriggerGate<T> {
    last_processed: Option<PayloadKey>,
    in_flight: Option<PayloadKey>,
    queued: Option<(PayloadKey, T)>,
}

impl<T> TriggerGate<T> {
    /// Create an idle gate
    pub fn new() -> Self {
        Self {
            last_processed: None,
            in_flight: None,
            queued: None,
        }
    }

    /// Offer a payload delivered by a notification
    pub fn offer(&mut self, key: PayloadKey, payload: T) -> TriggerDecision {
        self.admit(key, payload, false)
    }

    /// Offer a payload on explicit user request.
    ///
    /// Unlike [`TriggerGate::offer`] this re-runs a payload that already
    /// completed; the in-flight rules still apply.
    pub fn offer_manual(&mut self, key: PayloadKey, payload: T) -> TriggerDecision {
        self.admit(key, payload, true)
    }

    fn admit(&mut self, key: PayloadKey, payload: T, force: bool) -> TriggerDecision {
        match self.in_flight {
            Some(running) if running == key => {
                // The newest value is already running; anything waiting is obsolete
                self.queued = None;
                TriggerDecision::InFlight
            }
            Some(_) => {
                self.queued = Some((key, payload));
                TriggerDecision::Queued
            }
            None if !force && self.last_processed == Some(key) => TriggerDecision::AlreadyProcessed,
            None => {
                self.in_flight = Some(key);
                TriggerDecision::Start
            }
        }
    }

    /// Whether a result for `key` is still wanted
    pub fn is_current(&self, key: PayloadKey) -> bool {
        self.in_flight == Some(key)
    }

    /// Whether a computation is running
    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Record the end of the run for `key`.
    ///
    /// Returns the queued payload that should start next, if any. A stale
    /// `key` (not the one in flight) leaves the gate untouched.
    pub fn finish(&mut self, key: PayloadKey, success: bool) -> Option<(PayloadKey, T)> {
        if self.in_flight != Some(key) {
            return None;
        }
        self.in_flight = None;

        if success {
            self.last_processed = Some(key);
        } else if self.last_processed == Some(key) {
            self.last_processed = None;
        }

        let (next_key, next) = self.queued.take()?;
        if self.last_processed == Some(next_key) {
            return None;
        }
        self.in_flight = Some(next_key);
        Some((next_key, next))
    }
}

impl<T> Default for TriggerGate<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: PayloadKey = PayloadKey(1);
    const B: PayloadKey = PayloadKey(2);
    const C: PayloadKey = PayloadKey(3);

    #[test]
    fn test_duplicate_payload_not_reprocessed() {
        let mut gate = TriggerGate::new();
        assert_eq!(gate.offer(A, "a"), TriggerDecision::Start);
        assert_eq!(gate.finish(A, true), None);

        assert_eq!(gate.offer(A, "a"), TriggerDecision::AlreadyProcessed);
        assert_eq!(gate.offer(B, "b"), TriggerDecision::Start);
    }

    #[test]
    fn test_same_payload_in_flight_dropped() {
        let mut gate = TriggerGate::new();
        assert!(gate.offer(A, "a").should_start());
        assert_eq!(gate.offer(A, "a"), TriggerDecision::InFlight);
        assert_eq!(gate.finish(A, true), None);
    }

    #[test]
    fn test_new_payload_waits_for_current_run() {
        let mut gate = TriggerGate::new();
        gate.offer(A, "a");
        assert_eq!(gate.offer(B, "b"), TriggerDecision::Queued);
        assert_eq!(gate.offer(C, "c"), TriggerDecision::Queued);

        // Only the newest waiting payload survives
        assert_eq!(gate.finish(A, true), Some((C, "c")));
        assert!(gate.is_current(C));
        assert_eq!(gate.finish(C, true), None);
        assert!(!gate.is_busy());
    }

    #[test]
    fn test_failure_clears_marker() {
        let mut gate = TriggerGate::new();
        gate.offer(A, "a");
        gate.finish(A, false);
        assert_eq!(gate.offer(A, "a"), TriggerDecision::Start);
    }

    #[test]
    fn test_stale_finish_ignored() {
        let mut gate = TriggerGate::new();
        gate.offer(A, "a");
        assert_eq!(gate.finish(B, true), None);
        assert!(gate.is_current(A));
        assert!(!gate.is_current(B));
    }

    #[test]
    fn test_manual_offer_reruns_processed_payload() {
        let mut gate = TriggerGate::new();
        gate.offer(A, "a");
        gate.finish(A, true);
        assert_eq!(gate.offer_manual(A, "a"), TriggerDecision::Start);
        assert_eq!(gate.offer_manual(A, "a"), TriggerDecision::InFlight);
    }

    #[test]
    fn test_rebroadcast_of_running_value_discards_waiting() {
        let mut gate = TriggerGate::new();
        gate.offer(A, "a");
        gate.offer(B, "b");
        gate.offer(A, "a-again");
        assert_eq!(gate.finish(A, true), None);
        assert!(!gate.is_busy());
    }
}
