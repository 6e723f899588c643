//! Time-relative macro rendering for job assets.
//!
//! Supports macros like:
//! - `${execution_time}` - Scheduled time (`2024-01-02T02:00:00Z`)
//! - `${dstart}` / `${dend}` - Start and end of the job's data window
//! - `${date}` - Scheduled date (`YYYY-MM-DD`)
//! - `${start_of_day}` - Scheduled date at midnight
//! - `${days_before.N}` - Scheduled time minus N days
//! - `${hours_before.N}` - Scheduled time minus N hours
//! - `${job.name}` - Job name
//! - `${job.owner}` - Job owner
//!
//! Unknown macros are left in place so later stages may substitute them.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeDelta, Timelike, Utc};
use dagforge_core::job::{JobSpec, TruncateTo, Window};
use dagforge_core::render::{AssetRenderer, RenderedAssetSet};
use dagforge_core::{Error, Result};
use regex::Regex;
use std::sync::LazyLock;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

// Regex for matching ${...} macros
static MACRO_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z0-9_]+)?)\}").unwrap()
});

/// Values available to macros for one (job, scheduled time).
#[derive(Debug, Clone)]
pub struct MacroContext {
    pub job_name: String,
    pub job_owner: String,
    pub scheduled_at: DateTime<Utc>,
    pub window: Window,
}

impl MacroContext {
    pub fn for_job(job: &JobSpec, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            job_name: job.name.clone(),
            job_owner: job.owner.clone(),
            scheduled_at,
            window: job.window.clone(),
        }
    }

    /// End of the data window: the truncated scheduled time shifted by the offset.
    pub fn window_end(&self) -> Option<DateTime<Utc>> {
        truncate(self.scheduled_at, self.window.truncate_to)?
            .checked_add_signed(self.window.offset.as_delta()?)
    }

    pub fn window_start(&self) -> Option<DateTime<Utc>> {
        self.window_end()?
            .checked_sub_signed(self.window.size.as_delta()?)
    }

    /// Resolve a macro name to its value. `Ok(None)` means the macro is not
    /// known here; a known macro whose time leaves the representable range
    /// is an error.
    pub fn resolve(&self, name: &str) -> Result<Option<String>> {
        let parts: Vec<&str> = name.split('.').collect();
        let out_of_range = || {
            Error::InvalidInput(format!(
                "macro ${{{}}} of job '{}' is out of range at {}",
                name,
                self.job_name,
                format_time(self.scheduled_at)
            ))
        };
        let time = |t: Option<DateTime<Utc>>| t.map(format_time).ok_or_else(out_of_range);

        let value = match parts.as_slice() {
            ["execution_time"] => format_time(self.scheduled_at),
            ["dstart"] => time(self.window_start())?,
            ["dend"] => time(self.window_end())?,
            ["date"] => self.scheduled_at.format("%Y-%m-%d").to_string(),
            ["start_of_day"] => time(truncate(self.scheduled_at, TruncateTo::Day))?,
            ["days_before", n] => {
                let Ok(days) = n.parse::<i64>() else {
                    return Ok(None);
                };
                time(
                    TimeDelta::try_days(days)
                        .and_then(|d| self.scheduled_at.checked_sub_signed(d)),
                )?
            }
            ["hours_before", n] => {
                let Ok(hours) = n.parse::<i64>() else {
                    return Ok(None);
                };
                time(
                    TimeDelta::try_hours(hours)
                        .and_then(|d| self.scheduled_at.checked_sub_signed(d)),
                )?
            }
            ["job", "name"] => self.job_name.clone(),
            ["job", "owner"] => self.job_owner.clone(),
            _ => return Ok(None),
        };
        Ok(Some(value))
    }

    /// Interpolate all macros in a string.
    pub fn interpolate(&self, input: &str) -> Result<String> {
        let mut out = String::with_capacity(input.len());
        let mut last = 0;
        for caps in MACRO_REGEX.captures_iter(input) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            out.push_str(&input[last..whole.start()]);
            match self.resolve(&caps[1])? {
                Some(value) => out.push_str(&value),
                None => out.push_str(whole.as_str()),
            }
            last = whole.end();
        }
        out.push_str(&input[last..]);
        Ok(out)
    }
}

/// [`AssetRenderer`] that expands time-relative macros in every asset.
#[derive(Debug, Clone, Copy, Default)]
pub struct MacroRenderer;

impl MacroRenderer {
    pub fn new() -> Self {
        Self
    }
}

impl AssetRenderer for MacroRenderer {
    fn render(
        &self,
        job: &JobSpec,
        scheduled_at: DateTime<Utc>,
    ) -> Result<RenderedAssetSet> {
        let ctx = MacroContext::for_job(job, scheduled_at);
        job.assets
            .iter()
            .map(|(name, text)| Ok((name.clone(), ctx.interpolate(text)?)))
            .collect()
    }
}

fn format_time(t: DateTime<Utc>) -> String {
    t.format(TIMESTAMP_FORMAT).to_string()
}

fn truncate(t: DateTime<Utc>, unit: TruncateTo) -> Option<DateTime<Utc>> {
    let date = t.date_naive();
    let midnight = |d: NaiveDate| d.and_time(NaiveTime::MIN).and_utc();
    match unit {
        TruncateTo::None => Some(t),
        TruncateTo::Hour => t.with_minute(0)?.with_second(0)?.with_nanosecond(0),
        TruncateTo::Day => Some(midnight(date)),
        TruncateTo::Week => {
            let back = TimeDelta::try_days(i64::from(date.weekday().num_days_from_monday()))?;
            midnight(date).checked_sub_signed(back)
        }
        TruncateTo::Month => Some(midnight(date.with_day(1)?)),
    }
}
