//! Forecast cycle identifiers.
//!
//! A cycle is one hourly forecast timestep, written as a 10-digit
//! `YYYYMMDDHH` string in file names and configuration. [`Cycle`] can only
//! be built from a string that satisfies that format and names a real
//! calendar hour, so the rest of the crate can do hour arithmetic on it
//! without further checks.
use std::{fmt::Display, str::FromStr};

use chrono::{Duration, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::CycleError;

/// One hourly forecast cycle.
///
/// Ordering is chronological, so the maximum of a set of cycles is the
/// most recent one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cycle(NaiveDateTime);

impl Cycle {
    /// The cycle one hour before this one.
    pub fn previous_hour(&self) -> Self {
        self.hours_before(1)
    }

    /// The cycle `n` hours before this one.
    pub fn hours_before(&self, n: u32) -> Self {
        Self(self.0 - Duration::hours(i64::from(n)))
    }

    /// Whole hours elapsed from `earlier` to `self`. Negative if `earlier`
    /// is actually after `self`.
    pub fn hours_since(&self, earlier: &Cycle) -> i64 {
        (self.0 - earlier.0).num_hours()
    }

    /// The `YYYYMMDD` part of the identifier.
    pub fn date_str(&self) -> String {
        self.0.format("%Y%m%d").to_string()
    }

    /// The two-digit hour part of the identifier.
    pub fn hour_str(&self) -> String {
        format!("{:02}", self.0.hour())
    }

    /// The `n_hours` cycles immediately preceding `current`, oldest first.
    /// `current` itself is not included.
    pub fn preceding_window(current: Cycle, n_hours: u32) -> Vec<Cycle> {
        (1..=n_hours).rev().map(|h| current.hours_before(h)).collect()
    }
}

impl FromStr for Cycle {
    type Err = CycleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 10 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CycleError::BadFormat(s.to_string()));
        }

        // chrono needs a minute field to build a full datetime
        let dt = NaiveDateTime::parse_from_str(&format!("{s}00"), "%Y%m%d%H%M")
            .map_err(|_| CycleError::InvalidDateHour(s.to_string()))?;
        Ok(Self(dt))
    }
}

impl TryFrom<String> for Cycle {
    type Error = CycleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Cycle> for String {
    fn from(value: Cycle) -> Self {
        value.to_string()
    }
}

impl Display for Cycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y%m%d%H"))
    }
}
