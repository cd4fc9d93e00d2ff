use chrono::{DateTime, Duration, Utc};

use courier_core::trigger::Trigger;

/// Compute the first fire time for a freshly added (or resumed) trigger.
///
/// Intervals fire one full period after registration — never immediately on
/// add, so editing a task does not burst-send. A one-time instant already in
/// the past stays as-is: it is due, and the engine will fire it exactly once
/// on its next tick.
pub fn initial_fire(trigger: &Trigger, now: DateTime<Utc>) -> DateTime<Utc> {
    match trigger {
        Trigger::Interval { every_secs } => now + Duration::seconds(*every_secs as i64),
        Trigger::OneTime { at } => *at,
    }
}

/// Compute the fire time that follows `scheduled_fire`, or `None` when the
/// trigger is exhausted.
///
/// The next time is anchored on the *scheduled* fire, not on completion, so
/// execution duration does not drift the grid. When the scheduled time is
/// further than one period in the past (the process was down), the result is
/// fast-forwarded to the first on-grid instant after `now`: the overdue fire
/// that triggered this call was the single catch-up, and skipped periods are
/// not replayed.
pub fn advance_after_fire(
    trigger: &Trigger,
    scheduled_fire: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match trigger {
        Trigger::OneTime { .. } => None,
        Trigger::Interval { every_secs } => {
            let period = Duration::seconds(*every_secs as i64);
            let mut next = scheduled_fire + period;
            if next <= now {
                // Overdue by more than one period: jump to the grid point
                // after `now` in one arithmetic step.
                let behind = (now - scheduled_fire).num_seconds();
                let periods = behind / *every_secs as i64 + 1;
                next = scheduled_fire + Duration::seconds(periods * *every_secs as i64);
            }
            Some(next)
        }
    }
}
