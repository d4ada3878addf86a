use chrono::{Datelike, NaiveDate};
use clap::ValueEnum;

use crate::error::{Result, SyncError};

/// When a new season starts within the calendar year.
///
/// Two boundaries are in use: the first of September, and the fixed kickoff
/// date of September 4th. Both are kept so the caller can pick one explicitly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SeasonPolicy {
    #[default]
    September,
    Kickoff,
    Custom { month: u32, day: u32 },
}

impl SeasonPolicy {
    pub fn boundary(&self) -> (u32, u32) {
        match self {
            SeasonPolicy::September => (9, 1),
            SeasonPolicy::Kickoff => (9, 4),
            SeasonPolicy::Custom { month, day } => (*month, *day),
        }
    }
}

/// CLI spelling of the built-in policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SeasonPolicyArg {
    September,
    Kickoff,
}

impl From<SeasonPolicyArg> for SeasonPolicy {
    fn from(arg: SeasonPolicyArg) -> Self {
        match arg {
            SeasonPolicyArg::September => SeasonPolicy::September,
            SeasonPolicyArg::Kickoff => SeasonPolicy::Kickoff,
        }
    }
}

/// Parses a `MM-DD` season boundary such as `08-15` into a custom policy.
pub fn parse_boundary(raw: &str) -> Result<SeasonPolicy> {
    let invalid = || SyncError::config(format!("season boundary '{}' is not a MM-DD date", raw));

    let (month, day) = raw.trim().split_once('-').ok_or_else(invalid)?;
    let month: u32 = month.parse().map_err(|_| invalid())?;
    let day: u32 = day.parse().map_err(|_| invalid())?;

    // 2000 is a leap year, so 02-29 is accepted.
    NaiveDate::from_ymd_opt(2000, month, day).ok_or_else(invalid)?;
    Ok(SeasonPolicy::Custom { month, day })
}

/// An explicit `--season-boundary` wins over the named policy.
pub fn resolve_policy(arg: SeasonPolicyArg, boundary: Option<&str>) -> Result<SeasonPolicy> {
    match boundary {
        Some(raw) => parse_boundary(raw),
        None => Ok(arg.into()),
    }
}

/// Season a date belongs to: on or after the boundary it is this year's
/// season, before it the previous year's.
pub fn current_season(date: NaiveDate, policy: SeasonPolicy) -> i32 {
    let (month, day) = policy.boundary();
    if (date.month(), date.day()) >= (month, day) {
        date.year()
    } else {
        date.year() - 1
    }
}

/// Season for today's local date.
pub fn season_today(policy: SeasonPolicy) -> i32 {
    current_season(chrono::Local::now().date_naive(), policy)
}

/// Round to one decimal place
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
