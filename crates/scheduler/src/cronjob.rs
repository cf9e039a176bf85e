//! Cron expressions, jobs and delay computation.

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::timer::Timer;
use crate::{Error, Result};

/// A unique identifier for a scheduled job.
///
/// Generated at schedule time, unrelated to the permission id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Day names in classic cron order, Sunday = 0.
const WEEKDAYS: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// Position of the day-of-week field once seconds are present.
const WEEKDAY_FIELD: usize = 5;

/// A parsed cron expression.
///
/// Accepts the classic five-field form (minute resolution) as well as the
/// six- and seven-field forms with seconds and years. Numeric weekdays
/// follow classic cron in every form: 0-7 with Sunday as 0 or 7.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    schedule: cron::Schedule,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self> {
        let invalid = |reason: String| Error::InvalidCronExpression {
            expression: expression.to_string(),
            reason,
        };

        let mut fields: Vec<String> =
            expression.split_whitespace().map(str::to_string).collect();
        if fields.len() == 5 {
            fields.insert(0, "0".to_string());
        }
        if let Some(weekday) = fields.get_mut(WEEKDAY_FIELD) {
            *weekday = weekday_names(weekday).map_err(invalid)?;
        }

        let schedule = cron::Schedule::from_str(&fields.join(" "))
            .map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            expression: expression.to_string(),
            schedule,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The first occurrence strictly after `after`, if the schedule has one.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }

    /// Up to `count` occurrences strictly after `after`.
    pub fn upcoming(&self, after: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule.after(&after).take(count).collect()
    }
}

/// Rewrite a numeric day-of-week field as day names.
///
/// The cron crate counts weekdays from 1 = Sunday; names are unambiguous.
/// Fields already using names, `*` or `?` pass through untouched.
fn weekday_names(field: &str) -> std::result::Result<String, String> {
    if field == "*" || field == "?" || field.chars().any(|c| c.is_ascii_alphabetic()) {
        return Ok(field.to_string());
    }

    let mut days = [false; 7];
    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => match step.parse::<usize>() {
                Ok(step) if step > 0 => (range, step),
                _ => return Err(format!("invalid weekday step '{step}'")),
            },
            None => (item, 1),
        };

        let (start, end) = match (range, range.split_once('-')) {
            ("*", _) => (0, 6),
            (_, Some((start, end))) => (weekday(start)?, weekday(end)?),
            (_, None) if step > 1 => (weekday(range)?, 7),
            (_, None) => {
                let day = weekday(range)?;
                (day, day)
            }
        };
        if start > end {
            return Err(format!("invalid weekday range '{range}'"));
        }

        for day in (start..=end).step_by(step) {
            days[day % 7] = true;
        }
    }

    let names: Vec<&str> = WEEKDAYS
        .iter()
        .zip(days)
        .filter_map(|(name, on)| on.then_some(*name))
        .collect();
    Ok(names.join(","))
}

fn weekday(value: &str) -> std::result::Result<usize, String> {
    value
        .parse::<usize>()
        .ok()
        .filter(|day| *day <= 7)
        .ok_or_else(|| format!("invalid weekday '{value}'"))
}

/// Time to wait from `now` until `next`, zero if `next` is not in the future.
pub fn delay_until(now: DateTime<Utc>, next: DateTime<Utc>) -> Duration {
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

/// A job owned by the scheduler.
#[derive(Debug)]
pub(crate) struct Cronjob {
    pub id: JobId,
    pub plugin: String,
    pub request: Map<String, Value>,
    pub schedule: CronSchedule,
    pub cancel: CancellationToken,
    /// Armed timer for `next`. `None` while firing or once exhausted.
    pub timer: Option<Timer>,
    pub next: Option<DateTime<Utc>>,
    /// The occurrence served by the most recent firing.
    pub last: Option<DateTime<Utc>>,
}

impl Cronjob {
    pub fn new(plugin: &str, schedule: CronSchedule, request: Map<String, Value>) -> Self {
        Self {
            id: JobId::new(),
            plugin: plugin.to_string(),
            request,
            schedule,
            cancel: CancellationToken::new(),
            timer: None,
            next: None,
            last: None,
        }
    }

    /// Stop the job for good.
    pub fn cancel(&mut self) {
        self.cancel.cancel();
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        self.next = None;
    }
}

/// Public view of a scheduled job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobInfo {
    pub id: JobId,
    pub plugin: String,
    pub expression: String,
    /// Next firing time; `None` when the schedule is exhausted.
    pub next: Option<DateTime<Utc>>,
    pub armed: bool,
}

impl From<&Cronjob> for JobInfo {
    fn from(job: &Cronjob) -> Self {
        Self {
            id: job.id,
            plugin: job.plugin.clone(),
            expression: job.schedule.expression().to_string(),
            next: job.next,
            armed: job.timer.is_some(),
        }
    }
}
