use chrono::{DateTime, Duration, Utc};

use crate::error::RetryFamily;

/// `invalid_response` backoff ladder: five attempts, doubling from one
/// second. Once exhausted the job is marked failed outright.
const INVALID_RESPONSE_DELAYS_SECS: [i64; 5] = [1, 2, 4, 8, 16];

/// `unavailable` jobs are retried until this many days after the job was
/// first enqueued, regardless of attempt count — they rely on the stream's
/// own redelivery rather than an in-process sleep.
const UNAVAILABLE_HORIZON_DAYS: i64 = 14;

/// What the worker loop should do after a handler returns an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for this long, then retry in-process.
    RetryAfter { delay_secs: i64 },
    /// Leave the message unacked; the stream's redelivery will bring it
    /// back around on a later consume cycle.
    RetryOnRedelivery,
    /// Exhausted: ack the message and mark the job failed.
    GiveUp,
}

/// Decide what to do with a failed job attempt.
///
/// `attempt` is 1-based (the attempt that just failed). `enqueued_at` is
/// the job's original creation time, used to compute the 14-day horizon
/// for `unavailable` failures.
pub fn classify(family: RetryFamily, attempt: u32, enqueued_at: DateTime<Utc>, now: DateTime<Utc>) -> RetryDecision {
    match family {
        RetryFamily::InvalidResponse => {
            match INVALID_RESPONSE_DELAYS_SECS.get((attempt - 1) as usize) {
                Some(&delay_secs) => RetryDecision::RetryAfter { delay_secs },
                None => RetryDecision::GiveUp,
            }
        }
        RetryFamily::Unavailable => {
            let horizon = enqueued_at + Duration::days(UNAVAILABLE_HORIZON_DAYS);
            if now < horizon {
                RetryDecision::RetryOnRedelivery
            } else {
                RetryDecision::GiveUp
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(offset_days: i64) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z").unwrap().with_timezone(&Utc) + Duration::days(offset_days)
    }

    #[test]
    fn invalid_response_backs_off_through_five_attempts() {
        let enqueued = at(0);
        let now = at(0);
        assert_eq!(classify(RetryFamily::InvalidResponse, 1, enqueued, now), RetryDecision::RetryAfter { delay_secs: 1 });
        assert_eq!(classify(RetryFamily::InvalidResponse, 2, enqueued, now), RetryDecision::RetryAfter { delay_secs: 2 });
        assert_eq!(classify(RetryFamily::InvalidResponse, 5, enqueued, now), RetryDecision::RetryAfter { delay_secs: 16 });
    }

    #[test]
    fn invalid_response_gives_up_after_five_attempts() {
        let enqueued = at(0);
        assert_eq!(classify(RetryFamily::InvalidResponse, 6, enqueued, enqueued), RetryDecision::GiveUp);
    }

    #[test]
    fn unavailable_retries_on_redelivery_within_horizon() {
        let enqueued = at(0);
        assert_eq!(classify(RetryFamily::Unavailable, 40, enqueued, at(13)), RetryDecision::RetryOnRedelivery);
    }

    #[test]
    fn unavailable_gives_up_past_fourteen_day_horizon() {
        let enqueued = at(0);
        assert_eq!(classify(RetryFamily::Unavailable, 1000, enqueued, at(14)), RetryDecision::GiveUp);
    }
}
