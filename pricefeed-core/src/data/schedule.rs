//! Target-instant enumeration for a backfill.
//!
//! A window is a range of calendar days in a reference timezone. Each day
//! contributes one instant per configured local hour; instants after the
//! optional cutoff are dropped. The result is strictly increasing.

use chrono::{DateTime, Days, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Calendar range of a backfill, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// Instants later than this are never targeted.
    pub not_after: Option<DateTime<Utc>>,
}

impl BackfillWindow {
    /// Every configured hour of every day in `start..=end`.
    pub fn days(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start,
            end,
            not_after: None,
        }
    }

    /// From local midnight `lookback_days` ago up to today's local midnight.
    ///
    /// Today's hours lie after the cutoff, so the window covers exactly
    /// `lookback_days` full days.
    pub fn trailing(tz: Tz, now: DateTime<Utc>, lookback_days: u32) -> Self {
        let today = now.with_timezone(&tz).date_naive();
        let start = today
            .checked_sub_days(Days::new(u64::from(lookback_days)))
            .unwrap_or(NaiveDate::MIN);
        Self {
            start,
            end: today,
            not_after: start_of_day(tz, today),
        }
    }

    /// Target instants in ascending order.
    pub fn targets(&self, tz: Tz, hours: &[u32]) -> Vec<DateTime<Utc>> {
        let mut hours: Vec<u32> = hours.iter().copied().filter(|h| *h < 24).collect();
        hours.sort_unstable();
        hours.dedup();

        let mut targets = Vec::new();
        let mut day = self.start;
        while day <= self.end {
            for &hour in &hours {
                let Some(at) = local_instant(tz, day, hour) else {
                    continue;
                };
                if self.not_after.is_some_and(|cutoff| at > cutoff) {
                    continue;
                }
                targets.push(at);
            }
            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }
        targets
    }
}

/// `hour:00:00` local time on `day`, or `None` if it falls in a DST gap.
fn local_instant(tz: Tz, day: NaiveDate, hour: u32) -> Option<DateTime<Utc>> {
    let time = NaiveTime::from_hms_opt(hour, 0, 0)?;
    tz.from_local_datetime(&day.and_time(time))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

fn start_of_day(tz: Tz, day: NaiveDate) -> Option<DateTime<Utc>> {
    // Some zones skip midnight on DST changes; the day then starts at 01:00.
    local_instant(tz, day, 0).or_else(|| local_instant(tz, day, 1))
}
