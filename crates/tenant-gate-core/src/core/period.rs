// crates/tenant-gate-core/src/core/period.rs
// ============================================================================
// Module: Tenant Gate Usage Periods
// Description: UTC calendar periods used to bucket usage events.
// Purpose: Format, parse, and bound month/day/hour usage windows.
// Dependencies: serde, thiserror, time
// ============================================================================

//! ## Overview
//! Usage is accounted per calendar period in UTC. Labels are `YYYY-MM` for
//! months, `YYYY-MM-DD` for days, and `YYYY-MM-DD-HH` for hours. A period is a
//! pure function of wall-clock time; [`UsagePeriod::bounds`] yields the
//! half-open `[start, end)` millisecond window a store sums over.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::Date;
use time::Month;
use time::OffsetDateTime;
use time::PrimitiveDateTime;
use time::Time;

use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when building or parsing usage periods.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeriodError {
    /// Period label is malformed.
    #[error("invalid period label: {0}")]
    InvalidLabel(String),
    /// Timestamp or calendar component is out of range.
    #[error("period out of range: {0}")]
    OutOfRange(String),
}

// ============================================================================
// SECTION: Granularity
// ============================================================================

/// Quota period granularity for API keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaPeriod {
    /// Hourly window.
    Hour,
    /// Daily window.
    Day,
    /// Calendar month window.
    #[default]
    Month,
}

impl QuotaPeriod {
    /// Returns the stable label for the granularity.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Month => "month",
        }
    }

    /// Parses a granularity label.
    ///
    /// # Errors
    ///
    /// Returns [`PeriodError::InvalidLabel`] for unknown labels.
    pub fn parse(label: &str) -> Result<Self, PeriodError> {
        match label {
            "hour" => Ok(Self::Hour),
            "day" => Ok(Self::Day),
            "month" => Ok(Self::Month),
            other => Err(PeriodError::InvalidLabel(other.to_string())),
        }
    }
}

// ============================================================================
// SECTION: Usage Period
// ============================================================================

/// A concrete UTC calendar period.
///
/// # Invariants
/// - Components always describe a real calendar date (and hour < 24).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum UsagePeriod {
    /// Calendar month.
    Month {
        /// Year.
        year: i32,
        /// Month (1-12).
        month: u8,
    },
    /// Calendar day.
    Day {
        /// Year.
        year: i32,
        /// Month (1-12).
        month: u8,
        /// Day of month.
        day: u8,
    },
    /// Hour of a calendar day.
    Hour {
        /// Year.
        year: i32,
        /// Month (1-12).
        month: u8,
        /// Day of month.
        day: u8,
        /// Hour (0-23).
        hour: u8,
    },
}

impl UsagePeriod {
    /// Returns the period of `granularity` that contains `now`.
    ///
    /// # Errors
    ///
    /// Returns [`PeriodError::OutOfRange`] when `now` cannot be represented.
    pub fn current(granularity: QuotaPeriod, now: Timestamp) -> Result<Self, PeriodError> {
        let nanos = i128::from(now.as_unix_millis()) * 1_000_000;
        let at = OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .map_err(|err| PeriodError::OutOfRange(err.to_string()))?;
        let year = at.year();
        let month = u8::from(at.month());
        let day = at.day();
        Ok(match granularity {
            QuotaPeriod::Month => Self::Month {
                year,
                month,
            },
            QuotaPeriod::Day => Self::Day {
                year,
                month,
                day,
            },
            QuotaPeriod::Hour => Self::Hour {
                year,
                month,
                day,
                hour: at.hour(),
            },
        })
    }

    /// Returns the calendar month containing `now`.
    ///
    /// # Errors
    ///
    /// Returns [`PeriodError::OutOfRange`] when `now` cannot be represented.
    pub fn current_month(now: Timestamp) -> Result<Self, PeriodError> {
        Self::current(QuotaPeriod::Month, now)
    }

    /// Returns the granularity of this period.
    #[must_use]
    pub const fn granularity(&self) -> QuotaPeriod {
        match self {
            Self::Month {
                ..
            } => QuotaPeriod::Month,
            Self::Day {
                ..
            } => QuotaPeriod::Day,
            Self::Hour {
                ..
            } => QuotaPeriod::Hour,
        }
    }

    /// Returns the canonical label (`YYYY-MM`, `YYYY-MM-DD`, `YYYY-MM-DD-HH`).
    #[must_use]
    pub fn label(&self) -> String {
        match *self {
            Self::Month {
                year,
                month,
            } => format!("{year:04}-{month:02}"),
            Self::Day {
                year,
                month,
                day,
            } => format!("{year:04}-{month:02}-{day:02}"),
            Self::Hour {
                year,
                month,
                day,
                hour,
            } => format!("{year:04}-{month:02}-{day:02}-{hour:02}"),
        }
    }

    /// Parses a period label.
    ///
    /// # Errors
    ///
    /// Returns [`PeriodError::InvalidLabel`] when the label is malformed or
    /// names a date that does not exist.
    pub fn parse(label: &str) -> Result<Self, PeriodError> {
        let invalid = || PeriodError::InvalidLabel(label.to_string());
        let parts: Vec<&str> = label.split('-').collect();
        let expected_widths: &[usize] = match parts.len() {
            2 => &[4, 2],
            3 => &[4, 2, 2],
            4 => &[4, 2, 2, 2],
            _ => return Err(invalid()),
        };
        for (part, width) in parts.iter().zip(expected_widths) {
            if part.len() != *width || !part.bytes().all(|byte| byte.is_ascii_digit()) {
                return Err(invalid());
            }
        }
        let year: i32 = parts[0].parse().map_err(|_| invalid())?;
        let month: u8 = parts[1].parse().map_err(|_| invalid())?;
        let period = match parts.len() {
            2 => Self::Month {
                year,
                month,
            },
            3 => Self::Day {
                year,
                month,
                day: parts[2].parse().map_err(|_| invalid())?,
            },
            _ => Self::Hour {
                year,
                month,
                day: parts[2].parse().map_err(|_| invalid())?,
                hour: parts[3].parse().map_err(|_| invalid())?,
            },
        };
        period.bounds().map_err(|_| invalid())?;
        Ok(period)
    }

    /// Returns the half-open `[start, end)` window covered by the period.
    ///
    /// # Errors
    ///
    /// Returns [`PeriodError::OutOfRange`] when a component is not a valid
    /// calendar value.
    pub fn bounds(&self) -> Result<(Timestamp, Timestamp), PeriodError> {
        match *self {
            Self::Month {
                year,
                month,
            } => {
                let start = calendar_date(year, month, 1)?;
                let (next_year, next_month) =
                    if month == 12 { (year + 1, 1) } else { (year, month + 1) };
                let end = calendar_date(next_year, next_month, 1)?;
                Ok((midnight_millis(start), midnight_millis(end)))
            }
            Self::Day {
                year,
                month,
                day,
            } => {
                let start = calendar_date(year, month, day)?;
                let start_ms = midnight_millis(start);
                Ok((start_ms, start_ms.plus_seconds(SECONDS_PER_DAY)))
            }
            Self::Hour {
                year,
                month,
                day,
                hour,
            } => {
                if hour >= 24 {
                    return Err(PeriodError::OutOfRange(format!("hour {hour}")));
                }
                let date = calendar_date(year, month, day)?;
                let start = midnight_millis(date).plus_seconds(i64::from(hour) * SECONDS_PER_HOUR);
                Ok((start, start.plus_seconds(SECONDS_PER_HOUR)))
            }
        }
    }

    /// Returns true when `at` falls inside the period.
    #[must_use]
    pub fn contains(&self, at: Timestamp) -> bool {
        self.bounds().is_ok_and(|(start, end)| at >= start && at < end)
    }
}

impl fmt::Display for UsagePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl From<UsagePeriod> for String {
    fn from(value: UsagePeriod) -> Self {
        value.label()
    }
}

impl TryFrom<String> for UsagePeriod {
    type Error = PeriodError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Seconds per hour.
const SECONDS_PER_HOUR: i64 = 3_600;
/// Seconds per day.
const SECONDS_PER_DAY: i64 = 86_400;

/// Builds a calendar date, mapping component errors to [`PeriodError`].
fn calendar_date(year: i32, month: u8, day: u8) -> Result<Date, PeriodError> {
    let month = Month::try_from(month).map_err(|err| PeriodError::OutOfRange(err.to_string()))?;
    Date::from_calendar_date(year, month, day)
        .map_err(|err| PeriodError::OutOfRange(err.to_string()))
}

/// Returns UTC midnight of `date` as a timestamp.
fn midnight_millis(date: Date) -> Timestamp {
    let seconds = PrimitiveDateTime::new(date, Time::MIDNIGHT).assume_utc().unix_timestamp();
    Timestamp::from_unix_millis(seconds.saturating_mul(1_000))
}
