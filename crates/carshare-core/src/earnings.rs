//! Owner earnings aggregation.
//!
//! Completed trips are attributed to the moment they ended and summed into
//! calendar buckets (today, this month, this year), a rolling week, and a
//! six-month series ending with the current month. Calendar boundaries are
//! evaluated in the configured time zone.
//!
//! The rolling week is an exact duration, `|now - completed_at| <= 7 days`,
//! not a whole-day difference: a trip completed 7 days and 1 second before
//! `now` is outside it.

use std::path::Path;

use chrono::{DateTime, Datelike, Duration, Utc};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::booking::{Booking, BookingStatus};
use crate::config::{EarningsConfig, EngineConfig};
use crate::error::Result;

/// Number of entries in [`EarningsSummary::monthly_series`].
pub const MONTHLY_SERIES_LEN: usize = 6;

const MONTH_ABBREVIATIONS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Earnings for one calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlyEarnings {
    /// Three-letter month name, e.g. `"Mar"`.
    pub label: String,
    /// Calendar year of the month.
    pub year: i32,
    /// Month number, 1–12.
    pub month: u32,
    /// Sum of completed trip amounts.
    pub amount: Decimal,
}

/// An owner's earnings at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarningsSummary {
    /// Completed on the same calendar day as now.
    pub today: Decimal,
    /// Completed within the rolling week around now.
    pub week: Decimal,
    /// Completed in the current calendar month.
    pub month: Decimal,
    /// Completed in the current calendar year.
    pub year: Decimal,
    /// Sum over every completed trip.
    pub lifetime: Decimal,
    /// Trips currently `ACTIVE`.
    pub active_trips: usize,
    /// Trips `COMPLETED`.
    pub total_trips: usize,
    /// Six months, oldest first, ending with the current month.
    pub monthly_series: Vec<MonthlyEarnings>,
}

impl EarningsSummary {
    /// Mean amount per completed trip, `None` without completed trips.
    #[must_use]
    pub fn average_trip_value(&self) -> Option<Decimal> {
        (self.total_trips > 0).then(|| self.lifetime / Decimal::from(self.total_trips))
    }
}

/// Buckets trips into an [`EarningsSummary`].
#[derive(Debug, Clone, Default)]
pub struct EarningsAggregator {
    config: EarningsConfig,
}

impl EarningsAggregator {
    /// Create an aggregator with the given calendar settings.
    #[must_use]
    pub const fn new(config: EarningsConfig) -> Self {
        Self { config }
    }

    /// Create an aggregator from the `[earnings]` table of a configuration file.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file is missing, unparsable, or
    /// fails validation.
    pub fn from_config_file(path: &Path) -> Result<Self> {
        Ok(Self::new(EngineConfig::load_required(path)?.earnings))
    }

    /// Summarize `owner_id`'s trips as of `now`.
    ///
    /// Never fails; an owner without trips gets an all-zero summary with a
    /// full six-month series.
    #[must_use]
    pub fn summarize(&self, trips: &[Booking], owner_id: &str, now: DateTime<Utc>) -> EarningsSummary {
        let tz = self.config.timezone;
        let week = Duration::days(i64::from(self.config.rolling_week_days));
        let local_now = now.with_timezone(&tz);

        let mut summary = EarningsSummary {
            today: Decimal::ZERO,
            week: Decimal::ZERO,
            month: Decimal::ZERO,
            year: Decimal::ZERO,
            lifetime: Decimal::ZERO,
            active_trips: 0,
            total_trips: 0,
            monthly_series: month_window(local_now.year(), local_now.month()),
        };

        for trip in trips.iter().filter(|t| t.owner_id == owner_id) {
            match trip.status {
                BookingStatus::Active => summary.active_trips += 1,
                BookingStatus::Completed => {}
                BookingStatus::PendingPayment
                | BookingStatus::Confirmed
                | BookingStatus::Cancelled => continue,
            }
            let Some(completed_at) = trip.completed_at() else {
                continue;
            };
            let local = completed_at.with_timezone(&tz);
            let amount = trip.total_amount;

            summary.total_trips += 1;
            summary.lifetime += amount;
            if local.date_naive() == local_now.date_naive() {
                summary.today += amount;
            }
            if (now - completed_at).abs() <= week {
                summary.week += amount;
            }
            if local.year() == local_now.year() {
                summary.year += amount;
                if local.month() == local_now.month() {
                    summary.month += amount;
                }
            }
            if let Some(entry) = summary
                .monthly_series
                .iter_mut()
                .find(|m| m.year == local.year() && m.month == local.month())
            {
                entry.amount += amount;
            }
        }

        debug!(
            owner_id,
            completed = summary.total_trips,
            active = summary.active_trips,
            "Aggregated owner earnings"
        );
        summary
    }
}

/// Summarize with UTC calendar boundaries and a seven-day rolling week.
#[must_use]
pub fn aggregate_earnings(trips: &[Booking], owner_id: &str, now: DateTime<Utc>) -> EarningsSummary {
    EarningsAggregator::default().summarize(trips, owner_id, now)
}

/// Aggregate in a specific time zone with the default rolling week.
#[must_use]
pub fn aggregate_earnings_in(
    trips: &[Booking],
    owner_id: &str,
    now: DateTime<Utc>,
    timezone: Tz,
) -> EarningsSummary {
    EarningsAggregator::new(EarningsConfig {
        timezone,
        ..EarningsConfig::default()
    })
    .summarize(trips, owner_id, now)
}

/// Zeroed entries for the six months ending at `year`/`month`, oldest first.
fn month_window(year: i32, month: u32) -> Vec<MonthlyEarnings> {
    let (mut y, mut m) = (year, month);
    let mut window = Vec::with_capacity(MONTHLY_SERIES_LEN);
    for _ in 0..MONTHLY_SERIES_LEN {
        window.push(MonthlyEarnings {
            label: MONTH_ABBREVIATIONS[(m - 1) as usize].to_string(),
            year: y,
            month: m,
            amount: Decimal::ZERO,
        });
        if m == 1 {
            m = 12;
            y -= 1;
        } else {
            m -= 1;
        }
    }
    window.reverse();
    window
}
