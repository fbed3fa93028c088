//! Time-bucket aggregation of a session's votes.
//!
//! The fold is a pure function of the vote list and the session start, so it
//! can be recomputed on every flush and always yields the same series.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::events::{Polarity, VoteEvent, VOTE_WEIGHT};

/// OHLC-style statistics for one minute of a session.
///
/// `open`, `high`, `low` and `close` are values of the cumulative score;
/// `total_positive`, `total_negative` and `volume` only count this bucket's
/// votes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalBucket {
    /// Whole minutes since session start
    pub interval: i64,
    pub open: i64,
    pub high: i64,
    pub low: i64,
    pub close: i64,
    /// Sum of positive contributions (+2 each)
    pub total_positive: i64,
    /// Sum of negative contributions (-2 each)
    pub total_negative: i64,
    /// Number of votes
    pub volume: u64,
}

impl IntervalBucket {
    fn open_at(interval: i64, running_total: i64, polarity: Polarity) -> Self {
        let mut bucket = Self {
            interval,
            open: running_total,
            high: running_total,
            low: running_total,
            close: running_total,
            total_positive: 0,
            total_negative: 0,
            volume: 1,
        };
        bucket.count(polarity);
        bucket
    }

    fn update(&mut self, running_total: i64, polarity: Polarity) {
        self.close = running_total;
        self.high = self.high.max(running_total);
        self.low = self.low.min(running_total);
        self.volume += 1;
        self.count(polarity);
    }

    fn count(&mut self, polarity: Polarity) {
        match polarity {
            Polarity::Positive => self.total_positive += VOTE_WEIGHT,
            Polarity::Negative => self.total_negative -= VOTE_WEIGHT,
        }
    }
}

/// Scalar score summaries for a whole session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSummary {
    /// Final cumulative score
    pub total: i64,
    /// Sum of all negative contributions
    pub running_min: i64,
    /// Sum of all positive contributions
    pub running_max: i64,
    /// Highest cumulative score ever reached (never below 0)
    pub all_time_high: i64,
    /// Lowest cumulative score ever reached (never above 0)
    pub all_time_low: i64,
}

/// Output of one aggregation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSeries {
    pub buckets: Vec<IntervalBucket>,
    pub summary: ScoreSummary,
}

/// Minute offset of `at` from `started_at`, clamped at 0.
pub fn interval_of(started_at: DateTime<Utc>, at: DateTime<Utc>) -> i64 {
    (at - started_at).num_minutes().max(0)
}

/// Folds every vote of a session into its time series.
///
/// Votes are sorted by send time first (stable, so equal timestamps keep
/// arrival order). All votes must belong to `session_id`; a foreign vote is a
/// bug in the caller and panics in debug builds.
pub fn aggregate(
    session_id: &str,
    started_at: DateTime<Utc>,
    events: &[VoteEvent],
) -> Result<ScoreSeries> {
    if let Some(foreign) = events.iter().find(|e| e.session_id != session_id) {
        debug_assert!(
            false,
            "vote {} belongs to session {}, not {}",
            foreign.id, foreign.session_id, session_id
        );
        return Err(Error::invariant(format!(
            "vote {} belongs to session {}, not {}",
            foreign.id, foreign.session_id, session_id
        )));
    }

    let mut ordered: Vec<&VoteEvent> = events.iter().collect();
    ordered.sort_by_key(|e| e.sent_at);

    let mut summary = ScoreSummary::default();
    let mut buckets: Vec<IntervalBucket> = Vec::new();

    for event in ordered {
        summary.total += event.delta();
        summary.all_time_high = summary.all_time_high.max(summary.total);
        summary.all_time_low = summary.all_time_low.min(summary.total);
        match event.polarity {
            Polarity::Positive => summary.running_max += VOTE_WEIGHT,
            Polarity::Negative => summary.running_min -= VOTE_WEIGHT,
        }

        let interval = interval_of(started_at, event.sent_at);

        // Sorted input means intervals never decrease, so only the newest
        // bucket can match.
        match buckets.last_mut() {
            Some(bucket) if bucket.interval == interval => {
                bucket.update(summary.total, event.polarity);
            }
            _ => buckets.push(IntervalBucket::open_at(
                interval,
                summary.total,
                event.polarity,
            )),
        }
    }

    Ok(ScoreSeries { buckets, summary })
}
