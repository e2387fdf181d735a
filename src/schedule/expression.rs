// src/schedule/expression.rs

//! Schedule expressions.
//!
//! Accepted forms:
//! - six fields: `sec min hour day-of-month month day-of-week`
//! - five fields: `min hour day-of-month month day-of-week` (second = 0)
//! - descriptors: `@yearly`, `@annually`, `@monthly`, `@weekly`, `@daily`,
//!   `@midnight`, `@hourly`
//! - fixed intervals: `@every 90s`, `@every 1h30m`
//!
//! Field matching and the occurrence search come from the `cron` crate. This
//! module only rewrites what that crate reads differently from classic cron:
//! weekday numbers (`0` and `7` are Sunday), `?` as a wildcard, and two
//! restricted day fields, where a day matches if *either* field matches.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone};

use crate::errors::{Result, WardenError};
use crate::types::parse_duration;

const FIELD_NAMES: [&str; 6] = ["second", "minute", "hour", "day-of-month", "month", "day-of-week"];
const MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const DAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

#[derive(Debug, Clone)]
pub struct Schedule {
    source: String,
    plan: Plan,
}

#[derive(Debug, Clone)]
enum Plan {
    /// One schedule, or one per day field when either of them may match.
    Cron(Vec<cron::Schedule>),
    Every(Duration),
}

impl Schedule {
    pub fn parse(expr: &str) -> Result<Self> {
        let source = expr.trim().to_string();
        if source.is_empty() {
            return Err(invalid(expr, "expression is empty"));
        }

        let plan = if let Some(rest) = source.strip_prefix("@every") {
            let interval = parse_duration(rest).map_err(|e| invalid(expr, &e))?;
            if interval.is_zero() {
                return Err(invalid(expr, "@every interval must be positive"));
            }
            Plan::Every(interval)
        } else if source.starts_with('@') {
            let fields = match source.to_lowercase().as_str() {
                "@yearly" | "@annually" => "0 0 0 1 1 *",
                "@monthly" => "0 0 0 1 * *",
                "@weekly" => "0 0 0 * * 0",
                "@daily" | "@midnight" => "0 0 0 * * *",
                "@hourly" => "0 0 * * * *",
                _ => return Err(invalid(expr, "unknown descriptor")),
            };
            Plan::Cron(compile(expr, fields)?)
        } else {
            Plan::Cron(compile(expr, &source)?)
        };

        Ok(Self { source, plan })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Fixed interval for `@every` schedules.
    pub fn interval(&self) -> Option<Duration> {
        match &self.plan {
            Plan::Every(d) => Some(*d),
            Plan::Cron(_) => None,
        }
    }

    /// First occurrence strictly after `after`, evaluated in `after`'s zone.
    /// `None` if the expression never fires again.
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        match &self.plan {
            Plan::Every(interval) => {
                let step = TimeDelta::from_std(*interval).ok()?;
                after.clone().checked_add_signed(step)
            }
            Plan::Cron(schedules) => schedules
                .iter()
                .filter_map(|schedule| schedule.after(after).next())
                .min(),
        }
    }

    /// The next `count` occurrences after `after`.
    pub fn upcoming<Tz: TimeZone>(&self, after: &DateTime<Tz>, count: usize) -> Vec<DateTime<Tz>> {
        let mut out = Vec::with_capacity(count);
        let mut cursor = after.clone();
        while out.len() < count {
            let Some(next) = self.next_after(&cursor) else {
                break;
            };
            cursor = next.clone();
            out.push(next);
        }
        out
    }
}

impl PartialEq for Schedule {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Schedule {}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for Schedule {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self> {
        Schedule::parse(s)
    }
}

fn compile(expr: &str, text: &str) -> Result<Vec<cron::Schedule>> {
    let mut fields: Vec<String> = text.split_whitespace().map(|f| f.replace('?', "*")).collect();
    match fields.len() {
        6 => {}
        5 => fields.insert(0, "0".to_string()),
        n => return Err(invalid(expr, &format!("expected 5 or 6 fields, found {n}"))),
    }

    for (field, name) in fields.iter().zip(FIELD_NAMES) {
        let zero_step = field
            .split(',')
            .filter_map(|part| part.split_once('/'))
            .any(|(_, step)| step.parse::<u32>() == Ok(0));
        if zero_step {
            return Err(invalid(expr, &format!("{name} field '{field}': step must be positive")));
        }
    }

    let months = month_numbers(expr, &fields[4])?;
    let weekdays = weekday_names(expr, &fields[5])?;
    let head = fields[..3].join(" ");

    let build = |days: &str, weekdays: &str| {
        // The crate wants a trailing year field.
        let text = format!("{head} {days} {months} {weekdays} *");
        cron::Schedule::from_str(&text).map_err(|e| invalid(expr, &e.to_string()))
    };

    if fields[3].starts_with('*') || fields[5].starts_with('*') {
        Ok(vec![build(&fields[3], &weekdays)?])
    } else {
        Ok(vec![build(&fields[3], "*")?, build("*", &weekdays)?])
    }
}

/// Replace month names with their numbers; everything else passes through.
fn month_numbers(expr: &str, field: &str) -> Result<String> {
    let convert = |token: &str| -> Result<String> {
        if token.is_empty() || !token.chars().all(|c| c.is_ascii_alphabetic()) {
            return Ok(token.to_string());
        }
        let lower = token.to_ascii_lowercase();
        MONTH_NAMES
            .iter()
            .position(|name| *name == lower)
            .map(|idx| (idx + 1).to_string())
            .ok_or_else(|| invalid(expr, &format!("month field: unknown month '{token}'")))
    };

    let parts = field
        .split(',')
        .map(|part| {
            let (range, step) = match part.split_once('/') {
                Some((range, step)) => (range, Some(step)),
                None => (part, None),
            };
            let range = match range.split_once('-') {
                Some((lo, hi)) => format!("{}-{}", convert(lo)?, convert(hi)?),
                None => convert(range)?,
            };
            Ok(match step {
                Some(step) => format!("{range}/{step}"),
                None => range,
            })
        })
        .collect::<Result<Vec<String>>>()?;
    Ok(parts.join(","))
}

/// Expand a classic day-of-week field into the day names the crate reads
/// unambiguously.
fn weekday_names(expr: &str, field: &str) -> Result<String> {
    if field == "*" {
        return Ok("*".to_string());
    }

    let mut days = [false; 7];
    for part in field.split(',') {
        let bad = |why: &str| invalid(expr, &format!("day-of-week field '{part}': {why}"));

        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step: usize = step.parse().map_err(|_| bad("step is not a number"))?;
                (range, Some(step))
            }
            None => (part, None),
        };

        let (start, end) = if range == "*" {
            (0, 6)
        } else if let Some((lo, hi)) = range.split_once('-') {
            let lo = weekday(lo).ok_or_else(|| bad("bad range start"))?;
            let hi = weekday(hi).ok_or_else(|| bad("bad range end"))?;
            (lo, hi)
        } else {
            let day = weekday(range).ok_or_else(|| bad("bad value"))?;
            // `2/2` means "from 2 to the end, every 2".
            match step {
                Some(_) => (day, 6),
                None => (day, day),
            }
        };
        if start > end {
            return Err(bad("range start is after range end"));
        }

        for day in (start..=end).step_by(step.unwrap_or(1)) {
            days[day % 7] = true;
        }
    }

    let names: Vec<&str> = DAY_NAMES
        .iter()
        .zip(days)
        .filter(|(_, on)| *on)
        .map(|(name, _)| *name)
        .collect();
    Ok(names.join(","))
}

fn weekday(text: &str) -> Option<usize> {
    if let Ok(n) = text.parse::<usize>() {
        return (n <= 7).then_some(n);
    }
    DAY_NAMES
        .iter()
        .position(|name| name.eq_ignore_ascii_case(text))
}

fn invalid(expr: &str, why: &str) -> WardenError {
    WardenError::InvalidSchedule(format!("'{}': {why}", expr.trim()))
}
