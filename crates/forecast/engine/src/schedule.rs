//! Epoch-aligned slot arithmetic.
//!
//! Slots sit at `epoch_start + k * horizon`. The next batch targets the
//! first slot that can still be prepared one horizon ahead given the worst
//! processing time seen so far; slots that would be missed are skipped.

use std::time::Duration;

use serde::Serialize;

use crate::error::{EngineError, EngineResult};

/// Source of wall-clock time, in fractional epoch seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

/// The system wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
    }
}

/// Wall clock advanced by tokio's monotonic clock from a fixed origin.
///
/// Follows paused and auto-advanced tokio time, so scheduler loops can be
/// driven deterministically in tests.
#[derive(Debug, Clone, Copy)]
pub struct AnchoredClock {
    origin_secs: f64,
    anchor: tokio::time::Instant,
}

impl AnchoredClock {
    pub fn starting_at(origin_secs: f64) -> Self {
        Self {
            origin_secs,
            anchor: tokio::time::Instant::now(),
        }
    }
}

impl Clock for AnchoredClock {
    fn now(&self) -> f64 {
        self.origin_secs + self.anchor.elapsed().as_secs_f64()
    }
}

/// Result of planning the next batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotPlan {
    /// First slot after `now`.
    pub earliest_due: i64,
    /// First slot the next batch targets.
    pub next_due: i64,
    /// Set when the estimated finish overran `earliest_due`.
    pub catch_up_factor: Option<i64>,
}

/// Compute the next due slot.
///
/// `horizon` must be non-zero. Slots beyond the `i64` range saturate.
pub fn next_due_slot(now: f64, epoch_start: i64, horizon: u64, max_processing_secs: f64) -> SlotPlan {
    let horizon_secs = horizon as f64;
    let step = i64::try_from(horizon).unwrap_or(i64::MAX);

    let intervals_elapsed = ((now - epoch_start as f64) / horizon_secs).floor() as i64;
    let earliest_due =
        epoch_start.saturating_add(intervals_elapsed.saturating_add(1).saturating_mul(step));
    let estimated_finish = now + max_processing_secs;

    if estimated_finish > earliest_due as f64 {
        let overrun = ((estimated_finish - earliest_due as f64) / horizon_secs).floor() as i64;
        let factor = overrun.saturating_add(1);
        SlotPlan {
            earliest_due,
            next_due: earliest_due.saturating_add(factor.saturating_mul(step)),
            catch_up_factor: Some(factor),
        }
    } else {
        SlotPlan {
            earliest_due,
            next_due: earliest_due.saturating_add(step),
            catch_up_factor: None,
        }
    }
}

/// Schedule owned by one scheduler loop.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleState {
    epoch_start: i64,
    horizon: u64,
    max_processing_secs: f64,
    next_due: Option<i64>,
}

impl ScheduleState {
    pub fn new(epoch_start: i64, horizon: u64, initial_estimate_secs: f64) -> EngineResult<Self> {
        if horizon == 0 {
            return Err(EngineError::InvalidSchedule(
                "prediction horizon must be at least one second".to_string(),
            ));
        }

        Ok(Self {
            epoch_start,
            horizon,
            max_processing_secs: initial_estimate_secs.max(0.0),
            next_due: None,
        })
    }

    pub fn epoch_start(&self) -> i64 {
        self.epoch_start
    }

    pub fn horizon(&self) -> u64 {
        self.horizon
    }

    pub fn max_processing_secs(&self) -> f64 {
        self.max_processing_secs
    }

    pub fn next_due(&self) -> Option<i64> {
        self.next_due
    }

    /// Adopt new schedule parameters from a later start request.
    pub fn realign(&mut self, epoch_start: i64, horizon: u64) -> EngineResult<()> {
        if horizon == 0 {
            return Err(EngineError::InvalidSchedule(
                "prediction horizon must be at least one second".to_string(),
            ));
        }
        self.epoch_start = epoch_start;
        self.horizon = horizon;
        Ok(())
    }

    /// Plan the next batch and remember its first slot.
    pub fn plan(&mut self, now: f64) -> SlotPlan {
        let plan = next_due_slot(now, self.epoch_start, self.horizon, self.max_processing_secs);
        self.next_due = Some(plan.next_due);
        plan
    }

    /// When the loop should wake for `plan`: one horizon before its first slot.
    pub fn wake_at(&self, plan: &SlotPlan) -> i64 {
        plan.next_due.saturating_sub(self.horizon as i64)
    }

    /// Slots of a batch of `depth`, starting at `plan.next_due`.
    pub fn batch_slots(&self, plan: &SlotPlan, depth: usize) -> Vec<i64> {
        (0..depth as i64)
            .map(|index| plan.next_due.saturating_add(index.saturating_mul(self.horizon as i64)))
            .collect()
    }

    /// Feed back an observed processing time. The estimate only grows.
    ///
    /// Returns the previous estimate when it was raised.
    pub fn observe(&mut self, elapsed: Duration) -> Option<f64> {
        let observed = elapsed.as_secs_f64();
        if observed > self.max_processing_secs {
            let previous = self.max_processing_secs;
            self.max_processing_secs = observed;
            Some(previous)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fast_processing_targets_slot_after_next() {
        let plan = next_due_slot(1025.0, 1000, 60, 10.0);
        assert_eq!(plan.earliest_due, 1060);
        assert_eq!(plan.next_due, 1120);
        assert_eq!(plan.catch_up_factor, None);
    }

    #[test]
    fn test_slow_processing_skips_missed_slots() {
        let plan = next_due_slot(1025.0, 1000, 60, 100.0);
        assert_eq!(plan.earliest_due, 1060);
        assert_eq!(plan.catch_up_factor, Some(2));
        assert_eq!(plan.next_due, 1180);
    }

    #[test]
    fn test_now_before_epoch() {
        let plan = next_due_slot(900.0, 1000, 60, 0.0);
        assert_eq!(plan.earliest_due, 940);
        assert_eq!(plan.next_due, 1000);
    }

    #[test]
    fn test_extreme_epoch_saturates() {
        let plan = next_due_slot(1025.0, i64::MIN, 7, 0.0);
        assert!(plan.next_due > plan.earliest_due);

        let plan = next_due_slot(1025.0, i64::MAX, 7, f64::MAX);
        assert_eq!(plan.catch_up_factor, Some(i64::MAX));
        assert!(plan.next_due >= plan.earliest_due);
    }

    #[test]
    fn test_zero_horizon_rejected() {
        assert!(ScheduleState::new(0, 0, 1.0).is_err());
    }

    #[test]
    fn test_estimate_never_decreases() {
        let mut state = ScheduleState::new(1000, 60, 10.0).unwrap();
        assert_eq!(state.observe(Duration::from_secs(4)), None);
        assert_eq!(state.max_processing_secs(), 10.0);
        assert_eq!(state.observe(Duration::from_secs(25)), Some(10.0));
        assert_eq!(state.max_processing_secs(), 25.0);
    }

    #[test]
    fn test_batch_slots_and_wake_time() {
        let mut state = ScheduleState::new(1000, 60, 10.0).unwrap();
        let plan = state.plan(1025.0);
        assert_eq!(state.next_due(), Some(1120));
        assert_eq!(state.wake_at(&plan), 1060);
        assert_eq!(state.batch_slots(&plan, 3), vec![1120, 1180, 1240]);
    }

    proptest! {
        #[test]
        fn prop_next_due_is_future_and_aligned(
            now in 0f64..4e9,
            epoch_start in 0i64..4_000_000_000,
            horizon in 1u64..100_000,
            max_processing in 0f64..1e6,
        ) {
            let plan = next_due_slot(now, epoch_start, horizon, max_processing);
            prop_assert!(plan.next_due as f64 > now);
            prop_assert_eq!((plan.next_due - epoch_start).rem_euclid(horizon as i64), 0);
        }

        #[test]
        fn prop_catch_up_skips_exactly_missed_slots(
            epoch_start in 0i64..1_000_000,
            horizon in 1u64..10_000,
            intervals in 0i64..1000,
            offset_fraction in 0f64..1.0,
            k in 0i64..50,
        ) {
            let step = horizon as i64;
            let earliest_due = epoch_start + (intervals + 1) * step;
            let now = (earliest_due - step) as f64 + (offset_fraction * step as f64).floor();
            let max_processing = (earliest_due as f64 - now) + (k * step) as f64;

            let plan = next_due_slot(now, epoch_start, horizon, max_processing);
            prop_assert_eq!(plan.earliest_due, earliest_due);
            prop_assert_eq!(plan.next_due, earliest_due + (k + 1) * step);
        }
    }
}
