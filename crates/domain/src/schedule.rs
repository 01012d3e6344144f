use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use runloom_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Options accepted by the workflow scheduling tool.
///
/// Exactly one of `run_at`, `delay_seconds`, or `cron` must be provided.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ScheduleOptions {
    /// Absolute UTC instant to run at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_at: Option<DateTime<Utc>>,
    /// Relative delay in seconds from submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_seconds: Option<u64>,
    /// Five-field cron expression, interpreted in UTC at minute granularity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
    /// Attempt ceiling for the scheduled job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
    /// Objective prompt for the scheduled workflow.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective_prompt: Option<String>,
    /// Conversation thread to attach the scheduled workflow to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

impl ScheduleOptions {
    /// Resolves the exactly-one timing selector into a schedule spec.
    pub fn into_spec(self) -> AppResult<ScheduleSpec> {
        let provided = usize::from(self.run_at.is_some())
            + usize::from(self.delay_seconds.is_some())
            + usize::from(self.cron.is_some());

        if provided != 1 {
            return Err(AppError::Validation(
                "exactly one of runAt, delaySeconds, or cron must be provided".to_owned(),
            ));
        }

        if let Some(run_at) = self.run_at {
            return Ok(ScheduleSpec::RunAt(run_at));
        }

        if let Some(delay_seconds) = self.delay_seconds {
            return Ok(ScheduleSpec::Delay(delay_seconds));
        }

        let cron = self.cron.unwrap_or_default();
        Ok(ScheduleSpec::Cron(CronSchedule::parse(cron.as_str())?))
    }
}

/// Resolved timing selector for one scheduled workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleSpec {
    /// Run once at an absolute instant.
    RunAt(DateTime<Utc>),
    /// Run once after a relative delay.
    Delay(u64),
    /// Recurring cron schedule; each run schedules the next.
    Cron(CronSchedule),
}

impl ScheduleSpec {
    /// Returns the next instant the schedule fires after `now`.
    pub fn next_occurrence(&self, now: DateTime<Utc>) -> AppResult<DateTime<Utc>> {
        match self {
            Self::RunAt(run_at) => Ok(*run_at),
            Self::Delay(seconds) => {
                let seconds = i64::try_from(*seconds).map_err(|_| {
                    AppError::Validation("delaySeconds is out of range".to_owned())
                })?;
                Ok(now + Duration::seconds(seconds))
            }
            Self::Cron(schedule) => schedule.next_after(now).ok_or_else(|| {
                AppError::Validation(
                    "cron expression has no occurrence within one year".to_owned(),
                )
            }),
        }
    }

    /// Returns whether the schedule recurs.
    #[must_use]
    pub fn is_recurring(&self) -> bool {
        matches!(self, Self::Cron(_))
    }
}

/// Parsed five-field cron expression (`minute hour day-of-month month
/// day-of-week`), evaluated in UTC at minute granularity.
///
/// Fields support `*`, values, ranges `a-b`, lists `a,b`, and steps `/n`.
/// When both day fields are restricted the standard either-matches rule
/// applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    minute: u64,
    hour: u64,
    day_of_month: u64,
    month: u64,
    day_of_week: u64,
    day_of_month_is_wildcard: bool,
    day_of_week_is_wildcard: bool,
}

impl CronSchedule {
    /// Parses a five-field cron expression.
    pub fn parse(expression: &str) -> AppResult<Self> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(AppError::Validation(format!(
                "cron expression must have 5 fields, got {} in '{expression}'",
                fields.len()
            )));
        }

        let minute = parse_field(fields[0], 0, 59, "minute")?;
        let hour = parse_field(fields[1], 0, 23, "hour")?;
        let day_of_month = parse_field(fields[2], 1, 31, "day-of-month")?;
        let month = parse_field(fields[3], 1, 12, "month")?;
        let raw_day_of_week = parse_field(fields[4], 0, 7, "day-of-week")?;

        // Fold cron's alternative Sunday encoding (7) onto 0.
        let mut day_of_week = raw_day_of_week.mask & !(1 << 7);
        if raw_day_of_week.mask & (1 << 7) != 0 {
            day_of_week |= 1;
        }

        Ok(Self {
            minute: minute.mask,
            hour: hour.mask,
            day_of_month: day_of_month.mask,
            month: month.mask,
            day_of_week,
            day_of_month_is_wildcard: day_of_month.is_wildcard,
            day_of_week_is_wildcard: raw_day_of_week.is_wildcard,
        })
    }

    /// Returns the next matching minute strictly after `now`, searching at
    /// most one year ahead.
    #[must_use]
    pub fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let first_minute = now.timestamp().div_euclid(60) * 60 + 60;
        let mut candidate = DateTime::<Utc>::from_timestamp(first_minute, 0)?;
        let bound = now + Duration::days(366);

        while candidate <= bound {
            if !self.matches_day(&candidate) {
                let next_day = candidate.timestamp().div_euclid(86_400) * 86_400 + 86_400;
                candidate = DateTime::<Utc>::from_timestamp(next_day, 0)?;
                continue;
            }

            if !mask_contains(self.hour, candidate.hour()) {
                let next_hour = candidate.timestamp().div_euclid(3_600) * 3_600 + 3_600;
                candidate = DateTime::<Utc>::from_timestamp(next_hour, 0)?;
                continue;
            }

            if !mask_contains(self.minute, candidate.minute()) {
                candidate += Duration::minutes(1);
                continue;
            }

            return Some(candidate);
        }

        None
    }

    fn matches_day(&self, candidate: &DateTime<Utc>) -> bool {
        if !mask_contains(self.month, candidate.month()) {
            return false;
        }

        let day_of_month_matches = mask_contains(self.day_of_month, candidate.day());
        let day_of_week_matches = mask_contains(
            self.day_of_week,
            candidate.weekday().num_days_from_sunday(),
        );

        match (
            self.day_of_month_is_wildcard,
            self.day_of_week_is_wildcard,
        ) {
            (true, true) => true,
            (false, true) => day_of_month_matches,
            (true, false) => day_of_week_matches,
            (false, false) => day_of_month_matches || day_of_week_matches,
        }
    }
}

struct ParsedField {
    mask: u64,
    is_wildcard: bool,
}

fn mask_contains(mask: u64, value: u32) -> bool {
    value < 64 && mask & (1 << value) != 0
}

fn parse_field(text: &str, min: u32, max: u32, name: &str) -> AppResult<ParsedField> {
    let mut mask = 0_u64;
    let mut is_wildcard = true;

    for part in text.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step = step.parse::<u32>().map_err(|_| {
                    AppError::Validation(format!(
                        "invalid cron {name} step '{step}' in '{text}'"
                    ))
                })?;
                if step == 0 {
                    return Err(AppError::Validation(format!(
                        "cron {name} step must be greater than zero in '{text}'"
                    )));
                }
                (range, step)
            }
            None => (part, 1),
        };

        let (start, end) = if range == "*" {
            (min, max)
        } else if let Some((low, high)) = range.split_once('-') {
            is_wildcard = false;
            (
                parse_value(low, min, max, name)?,
                parse_value(high, min, max, name)?,
            )
        } else {
            is_wildcard = false;
            let value = parse_value(range, min, max, name)?;
            // A bare value with a step means "from value to max".
            if part.contains('/') {
                (value, max)
            } else {
                (value, value)
            }
        };

        if start > end {
            return Err(AppError::Validation(format!(
                "cron {name} range '{range}' is inverted in '{text}'"
            )));
        }

        let mut value = start;
        while value <= end {
            mask |= 1 << value;
            value += step;
        }
    }

    if mask == 0 {
        return Err(AppError::Validation(format!(
            "cron {name} field '{text}' selects no values"
        )));
    }

    Ok(ParsedField { mask, is_wildcard })
}

fn parse_value(text: &str, min: u32, max: u32, name: &str) -> AppResult<u32> {
    let value = text.parse::<u32>().map_err(|_| {
        AppError::Validation(format!("invalid cron {name} value '{text}'"))
    })?;

    if value < min || value > max {
        return Err(AppError::Validation(format!(
            "cron {name} value {value} is outside {min}..={max}"
        )));
    }

    Ok(value)
}
