//! Time windows: the temporal half of the join key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Annual,
    Quarter,
    Month,
}

/// A bounded period: a year, a quarter of a year, or a month of a year.
///
/// Windows of the same granularity are totally ordered in calendar order.
/// Comparisons across granularities are well-defined but meaningless; the
/// joiner rejects mixed inputs before anything depends on that order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeWindow {
    granularity: Granularity,
    year: i32,
    index: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid time window '{input}': expected YYYY, YYYY-Qn, or YYYY-MM")]
pub struct ParseWindowError {
    pub input: String,
}

impl TimeWindow {
    pub fn annual(year: i32) -> Self {
        Self {
            granularity: Granularity::Annual,
            year,
            index: 0,
        }
    }

    pub fn quarter(year: i32, quarter: u8) -> Option<Self> {
        (1..=4).contains(&quarter).then_some(Self {
            granularity: Granularity::Quarter,
            year,
            index: quarter,
        })
    }

    pub fn month(year: i32, month: u8) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self {
            granularity: Granularity::Month,
            year,
            index: month,
        })
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    /// Position on a continuous period axis, used as the regressor for
    /// pre-period trend slopes.
    pub fn ordinal(&self) -> i64 {
        let year = i64::from(self.year);
        match self.granularity {
            Granularity::Annual => year,
            Granularity::Quarter => year * 4 + i64::from(self.index) - 1,
            Granularity::Month => year * 12 + i64::from(self.index) - 1,
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.granularity {
            Granularity::Annual => write!(f, "{}", self.year),
            Granularity::Quarter => write!(f, "{}-Q{}", self.year, self.index),
            Granularity::Month => write!(f, "{}-{:02}", self.year, self.index),
        }
    }
}

impl FromStr for TimeWindow {
    type Err = ParseWindowError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let err = || ParseWindowError {
            input: raw.to_string(),
        };
        let s = raw.trim();

        let (year_part, rest) = match s.split_once('-') {
            Some((y, r)) => (y, Some(r)),
            None => (s, None),
        };
        if year_part.len() != 4 || !year_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(err());
        }
        let year: i32 = year_part.parse().map_err(|_| err())?;

        match rest {
            None => Ok(Self::annual(year)),
            Some(r) => {
                if let Some(q) = r.strip_prefix('Q').or_else(|| r.strip_prefix('q')) {
                    let quarter: u8 = q.parse().map_err(|_| err())?;
                    Self::quarter(year, quarter).ok_or_else(err)
                } else if r.len() == 2 && r.bytes().all(|b| b.is_ascii_digit()) {
                    let month: u8 = r.parse().map_err(|_| err())?;
                    Self::month(year, month).ok_or_else(err)
                } else {
                    Err(err())
                }
            }
        }
    }
}

impl TryFrom<String> for TimeWindow {
    type Error = ParseWindowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeWindow> for String {
    fn from(value: TimeWindow) -> Self {
        value.to_string()
    }
}
