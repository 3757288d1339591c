use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{load_checkpoint_lenient, Checkpoint, CheckpointStore};

/// True when `interval` has passed since `last_run`, or there is no last run.
pub fn interval_elapsed(last_run: Option<DateTime<Utc>>, interval: Duration, now: DateTime<Utc>) -> bool {
    let Some(last_run) = last_run else {
        return true;
    };
    let elapsed = now.signed_duration_since(last_run);
    // A clock that moved backwards yields a negative elapsed time; wait for it.
    match chrono::Duration::from_std(interval) {
        Ok(interval) => elapsed >= interval,
        Err(_) => false,
    }
}

/// Whether `stanza` should be polled at `now`.
///
/// An unreadable checkpoint counts as no prior run.
pub async fn is_due(
    store: &dyn CheckpointStore,
    stanza: &str,
    interval: Duration,
    now: DateTime<Utc>,
) -> bool {
    let prior = load_checkpoint_lenient(store, stanza).await;
    interval_elapsed(prior.map(|c| c.last_run), interval, now)
}

/// Snap `now` back onto the grid `prior + k * interval`.
///
/// Returns the largest grid point not after `now`, so execution jitter never
/// accumulates into schedule drift. Falls back to `now` when there is no
/// prior run, the interval is zero, or `now` is before `prior`.
pub fn non_deviated_last_run(
    prior_last_run: Option<DateTime<Utc>>,
    interval: Duration,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    let Some(prior) = prior_last_run else {
        return now;
    };
    if interval.is_zero() || now < prior {
        return now;
    }

    let elapsed = match now.signed_duration_since(prior).to_std() {
        Ok(elapsed) => elapsed,
        Err(_) => return now,
    };
    let steps = elapsed.as_nanos() / interval.as_nanos();
    let offset = interval
        .as_nanos()
        .checked_mul(steps)
        .and_then(|nanos| u64::try_from(nanos).ok())
        .map(Duration::from_nanos)
        .and_then(|offset| chrono::Duration::from_std(offset).ok());

    match offset.and_then(|offset| prior.checked_add_signed(offset)) {
        Some(anchor) => anchor,
        None => now,
    }
}

/// The checkpoint to persist after a poll that executed.
///
/// `latest` is the newest entry date seen in the fetch (selected or not) and
/// `result_count` the number of entries emitted.
pub fn compute_next_checkpoint(
    prior: Option<&Checkpoint>,
    interval: Duration,
    stanza: &str,
    latest: Option<DateTime<Utc>>,
    result_count: usize,
    now: DateTime<Utc>,
) -> Checkpoint {
    let last_run = non_deviated_last_run(prior.map(|c| c.last_run), interval, now);
    let prior_date = prior.and_then(|c| c.last_entry_date);

    let last_entry_date = match (prior_date, latest) {
        (Some(prior_date), Some(latest)) if latest > prior_date => {
            if result_count == 0 {
                tracing::warn!(
                    stanza = %stanza,
                    prior = %prior_date,
                    latest = %latest,
                    "No entries emitted but the newest entry date advanced"
                );
            }
            Some(latest)
        }
        (Some(prior_date), _) => Some(prior_date),
        (None, Some(latest)) => Some(latest),
        (None, None) => Some(now),
    };

    tracing::debug!(
        stanza = %stanza,
        last_run = %last_run,
        last_entry_date = ?last_entry_date,
        "Computed next checkpoint"
    );

    Checkpoint {
        last_run,
        last_entry_date,
    }
}
