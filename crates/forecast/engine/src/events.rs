//! Events emitted by scheduler loops.

use std::time::Duration;

use forecast_types::ApplicationName;

/// Scheduler lifecycle and round events.
#[derive(Debug, Clone, PartialEq)]
pub enum ForecastEvent {
    /// A batch was planned.
    SlotPlanned {
        application: ApplicationName,
        next_due: i64,
        wake_at: i64,
    },

    /// The processing estimate overran the earliest slot.
    SlotsSkipped {
        application: ApplicationName,
        earliest_due: i64,
        next_due: i64,
        factor: i64,
    },

    /// One slot of a batch finished.
    RoundCompleted {
        application: ApplicationName,
        slot: i64,
        valid: usize,
        invalid: usize,
        max_elapsed: Duration,
    },

    /// A batch stopped early after a round failure.
    BatchAborted {
        application: ApplicationName,
        slot: i64,
        produced: usize,
        reason: String,
    },

    /// The processing-time estimate grew.
    EstimateRaised {
        application: ApplicationName,
        from_secs: f64,
        to_secs: f64,
    },

    /// The loop observed deactivation and exited.
    SchedulerStopped(ApplicationName),
}
