//! Job specifications.
//!
//! A job is the unit a tenant registers: a task unit with its config, optional
//! hooks, a schedule, and the other jobs it depends on.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::{Error, Result};

static JOB_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9_.-]*$").unwrap());

/// Check that a job or project name is usable as an identifier and a file name.
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    if JOB_NAME_REGEX.is_match(name) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "invalid {} name '{}': expected lowercase letters, digits, '_', '.', '-'",
            kind, name
        )))
    }
}

/// A declared job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Unique within the project.
    pub name: String,
    pub owner: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub schedule: JobSchedule,
    #[serde(default)]
    pub behavior: JobBehavior,
    #[serde(default)]
    pub window: Window,
    pub task: JobTask,
    #[serde(default)]
    pub hooks: Vec<JobHook>,
    /// Explicit dependencies, `job` or `project/job`.
    #[serde(default)]
    pub dependencies: Vec<JobRef>,
    /// Raw asset templates keyed by asset name.
    #[serde(default)]
    pub assets: BTreeMap<String, String>,
}

impl JobSpec {
    /// The fixed instant assets are rendered at for inference and compilation:
    /// midnight UTC of the schedule's start date.
    pub fn anchor_time(&self) -> DateTime<Utc> {
        self.schedule.start_date.and_time(NaiveTime::MIN).and_utc()
    }

    /// Structural validation applied at registration time.
    pub fn validate(&self) -> Result<()> {
        validate_name("job", &self.name)?;
        if self.owner.trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "job '{}' has no owner",
                self.name
            )));
        }
        if self.schedule.interval.trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "job '{}' has no schedule interval",
                self.name
            )));
        }
        if let Some(end) = self.schedule.end_date {
            if end < self.schedule.start_date {
                return Err(Error::InvalidInput(format!(
                    "job '{}' ends before it starts",
                    self.name
                )));
            }
        }
        if self.task.unit.trim().is_empty() {
            return Err(Error::InvalidInput(format!(
                "job '{}' has no task",
                self.name
            )));
        }
        let spans = [
            ("window.size", self.window.size),
            ("window.offset", self.window.offset),
            ("behavior.retry.delay", self.behavior.retry.delay),
        ];
        for (field, span) in spans {
            if !span.is_bounded() {
                return Err(Error::InvalidInput(format!(
                    "job '{}' has {} beyond 100 years",
                    self.name, field
                )));
            }
        }
        let mut hooks = BTreeSet::new();
        for hook in &self.hooks {
            if !hooks.insert(hook.unit.as_str()) {
                return Err(Error::InvalidInput(format!(
                    "job '{}' declares hook '{}' twice",
                    self.name, hook.unit
                )));
            }
        }
        Ok(())
    }
}

/// When a job runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSchedule {
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    /// Cron expression or preset such as `@daily`.
    pub interval: String,
}

/// Run behavior passed through to the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobBehavior {
    #[serde(default)]
    pub depends_on_past: bool,
    #[serde(default)]
    pub catch_up: bool,
    #[serde(default)]
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub count: u32,
    pub delay: Span,
    #[serde(default)]
    pub exponential_backoff: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            count: 0,
            delay: Span::from_seconds(5 * 60),
            exponential_backoff: false,
        }
    }
}

/// The data interval a run covers, relative to its scheduled time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub size: Span,
    #[serde(default)]
    pub offset: Span,
    #[serde(default)]
    pub truncate_to: TruncateTo,
}

impl Default for Window {
    fn default() -> Self {
        Self {
            size: Span::from_seconds(24 * 3600),
            offset: Span::default(),
            truncate_to: TruncateTo::Day,
        }
    }
}

/// Unit the scheduled time is truncated to before the window is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TruncateTo {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "h")]
    Hour,
    #[default]
    #[serde(rename = "d")]
    Day,
    #[serde(rename = "w")]
    Week,
    #[serde(rename = "M")]
    Month,
}

impl TruncateTo {
    pub fn as_str(&self) -> &'static str {
        match self {
            TruncateTo::None => "none",
            TruncateTo::Hour => "h",
            TruncateTo::Day => "d",
            TruncateTo::Week => "w",
            TruncateTo::Month => "M",
        }
    }
}

impl FromStr for TruncateTo {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | "none" => Ok(TruncateTo::None),
            "h" => Ok(TruncateTo::Hour),
            "d" => Ok(TruncateTo::Day),
            "w" => Ok(TruncateTo::Week),
            "M" => Ok(TruncateTo::Month),
            other => Err(Error::InvalidInput(format!(
                "unknown truncate unit '{}' (expected h, d, w, M or none)",
                other
            ))),
        }
    }
}

/// A signed duration written as `<int><unit>`, unit one of `s m h d w`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Span {
    seconds: i64,
}

impl Span {
    const UNITS: [(char, i64); 5] = [
        ('w', 7 * 24 * 3600),
        ('d', 24 * 3600),
        ('h', 3600),
        ('m', 60),
        ('s', 1),
    ];

    /// Largest magnitude a span may have: 100 years.
    pub const MAX_SECONDS: i64 = 100 * 366 * 24 * 3600;

    pub const fn from_seconds(seconds: i64) -> Self {
        Self { seconds }
    }

    pub fn is_bounded(&self) -> bool {
        self.seconds.unsigned_abs() <= Self::MAX_SECONDS.unsigned_abs()
    }

    pub fn seconds(&self) -> i64 {
        self.seconds
    }

    /// `None` when the span does not fit a [`TimeDelta`].
    pub fn as_delta(&self) -> Option<TimeDelta> {
        TimeDelta::try_seconds(self.seconds)
    }
}

impl FromStr for Span {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s == "0" {
            return Ok(Self::default());
        }
        let invalid = || Error::InvalidInput(format!("invalid duration '{}'", s));
        let unit = s.chars().last().ok_or_else(invalid)?;
        let factor = Self::UNITS
            .iter()
            .find(|(u, _)| *u == unit)
            .map(|(_, f)| *f)
            .ok_or_else(invalid)?;
        let amount: i64 = s[..s.len() - unit.len_utf8()]
            .parse()
            .map_err(|_| invalid())?;
        let span = amount
            .checked_mul(factor)
            .map(Self::from_seconds)
            .ok_or_else(invalid)?;
        if !span.is_bounded() {
            return Err(Error::InvalidInput(format!(
                "duration '{}' exceeds 100 years",
                s
            )));
        }
        Ok(span)
    }
}

impl TryFrom<String> for Span {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Span> for String {
    fn from(span: Span) -> Self {
        span.to_string()
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.seconds == 0 {
            return f.write_str("0s");
        }
        for (unit, factor) in Self::UNITS {
            if self.seconds % factor == 0 {
                return write!(f, "{}{}", self.seconds / factor, unit);
            }
        }
        unreachable!("seconds always divide evenly")
    }
}

/// The task a job runs, interpreted by the task unit named in `unit`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTask {
    pub unit: String,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

/// A hook attached to a job's task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHook {
    pub unit: String,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
}

/// A reference to another job, optionally qualified by project.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobRef {
    pub project: Option<String>,
    pub job: String,
}

impl JobRef {
    pub fn local(job: impl Into<String>) -> Self {
        Self {
            project: None,
            job: job.into(),
        }
    }

    pub fn qualified(project: impl Into<String>, job: impl Into<String>) -> Self {
        Self {
            project: Some(project.into()),
            job: job.into(),
        }
    }
}

impl FromStr for JobRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        match s.split_once('/') {
            Some((project, job)) => {
                validate_name("project", project)?;
                validate_name("job", job)?;
                Ok(Self::qualified(project, job))
            }
            None => {
                validate_name("job", s)?;
                Ok(Self::local(s))
            }
        }
    }
}

impl TryFrom<String> for JobRef {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<JobRef> for String {
    fn from(r: JobRef) -> Self {
        r.to_string()
    }
}

impl fmt::Display for JobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.project {
            Some(project) => write!(f, "{}/{}", project, self.job),
            None => f.write_str(&self.job),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn make_job(name: &str, deps: &[&str]) -> JobSpec {
        JobSpec {
            name: name.to_string(),
            owner: "data@example.com".to_string(),
            description: String::new(),
            labels: BTreeMap::new(),
            schedule: JobSchedule {
                start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                end_date: None,
                interval: "0 2 * * *".to_string(),
            },
            behavior: JobBehavior::default(),
            window: Window::default(),
            task: JobTask {
                unit: "shell".to_string(),
                config: BTreeMap::new(),
            },
            hooks: vec![],
            dependencies: deps.iter().map(|d| d.parse().unwrap()).collect(),
            assets: BTreeMap::new(),
        }
    }

    #[test]
    fn test_span_parse_and_display() {
        assert_eq!("24h".parse::<Span>().unwrap().seconds(), 86_400);
        assert_eq!("-1h".parse::<Span>().unwrap().seconds(), -3_600);
        assert_eq!("0".parse::<Span>().unwrap().seconds(), 0);
        assert_eq!(Span::from_seconds(86_400).to_string(), "1d");
        assert_eq!(Span::from_seconds(90).to_string(), "90s");
        assert!("12x".parse::<Span>().is_err());
        assert!("h".parse::<Span>().is_err());
    }

    #[test]
    fn test_span_rejects_values_beyond_bound() {
        assert!("5200w".parse::<Span>().is_ok());
        assert!("99999999999w".parse::<Span>().is_err());
        assert!("-9223372036854775808s".parse::<Span>().is_err());
        assert!(serde_json::from_str::<Span>("\"99999999999w\"").is_err());

        let huge = Span::from_seconds(i64::MAX);
        assert!(!huge.is_bounded());
        assert!(huge.as_delta().is_none());

        let mut job = make_job("a", &[]);
        job.window.size = huge;
        assert!(matches!(job.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_job_ref_parse() {
        let local: JobRef = "orders".parse().unwrap();
        assert_eq!(local, JobRef::local("orders"));

        let qualified: JobRef = "finance/fx-rates".parse().unwrap();
        assert_eq!(qualified, JobRef::qualified("finance", "fx-rates"));
        assert_eq!(qualified.to_string(), "finance/fx-rates");

        assert!("Bad Name".parse::<JobRef>().is_err());
        assert!("a/b/c".parse::<JobRef>().is_err());
    }

    #[test]
    fn test_job_spec_json_shape() {
        let job = make_job("orders", &["raw", "finance/fx"]);
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["dependencies"], serde_json::json!(["raw", "finance/fx"]));
        assert_eq!(json["window"]["size"], "1d");
        assert_eq!(json["window"]["truncate_to"], "d");

        let back: JobSpec = serde_json::from_value(json).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn test_validate_rejects_missing_owner() {
        let mut job = make_job("orders", &[]);
        job.owner = " ".to_string();
        assert!(matches!(job.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_validate_rejects_duplicate_hooks() {
        let mut job = make_job("orders", &[]);
        let hook = JobHook {
            unit: "notify".to_string(),
            config: BTreeMap::new(),
        };
        job.hooks = vec![hook.clone(), hook];
        assert!(job.validate().is_err());
    }

    #[test]
    fn test_anchor_time_is_midnight_of_start() {
        let job = make_job("orders", &[]);
        assert_eq!(job.anchor_time().to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }
}
