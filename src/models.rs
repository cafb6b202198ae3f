use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize, Serializer};

/// One logged cycle. `end_date` is absent while the period is ongoing and
/// `cycle_length` is only set once the cycle is closed and has a predecessor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CycleRecord {
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub cycle_length: Option<i64>,
}

impl CycleRecord {
    pub fn open(start_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date: None,
            cycle_length: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.end_date.is_none()
    }

    /// Inclusive day count of the bleeding interval, if the period was closed.
    pub fn period_length(&self) -> Option<i64> {
        self.end_date.map(|end| (end - self.start_date).num_days() + 1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SymptomRecord {
    pub date: NaiveDate,
    pub symptom: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UserSettings {
    pub average_cycle_length: u32,
    pub average_period_length: u32,
    pub reminders_enabled: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            average_cycle_length: 28,
            average_period_length: 5,
            reminders_enabled: true,
        }
    }
}

/// Everything logged for a single user.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct UserHistory {
    pub cycles: Vec<CycleRecord>,
    pub symptoms: Vec<SymptomRecord>,
    pub settings: UserSettings,
}

/// All users' histories, keyed by user name. This is also the backup format.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct TrackerData {
    pub users: BTreeMap<String, UserHistory>,
    /// Top-level sections this crate does not interpret (e.g. `parent_access`),
    /// carried through a restore and the next backup unchanged.
    #[serde(flatten)]
    pub other: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// Bucket a cycle-length standard deviation (days). Lower bounds are
    /// inclusive: 3.0 is medium, 7.0 is low.
    pub fn from_variability(std_dev: f64) -> Self {
        if std_dev < 3.0 {
            Confidence::High
        } else if std_dev < 7.0 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

/// Inclusive pair of dates, serialized as `[start, end]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "(NaiveDate, NaiveDate)", into = "(NaiveDate, NaiveDate)")]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl From<(NaiveDate, NaiveDate)> for DateRange {
    fn from((start, end): (NaiveDate, NaiveDate)) -> Self {
        Self { start, end }
    }
}

impl From<DateRange> for (NaiveDate, NaiveDate) {
    fn from(range: DateRange) -> Self {
        (range.start, range.end)
    }
}

/// Next-onset prediction. Float fields hold unrounded values; they are
/// rounded to one decimal on serialization only.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Prediction {
    pub next_period_date: Option<NaiveDate>,
    /// Heuristic ±2σ spread around `next_period_date`, not a calibrated interval.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_period_range: Option<DateRange>,
    pub confidence: Confidence,
    #[serde(serialize_with = "round_one")]
    pub average_cycle_length: f64,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "round_one_opt"
    )]
    pub cycle_variability: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FertilityWindow {
    pub ovulation_date: NaiveDate,
    pub fertile_window_start: NaiveDate,
    pub fertile_window_end: NaiveDate,
    pub fertile_days_remaining: i64,
}

/// Descriptive statistics over a full history. Cycle and period fields are
/// absent, never zero, when there is nothing to summarize.
#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct Statistics {
    pub total_cycles: usize,
    pub cycles_with_data: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shortest_cycle: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longest_cycle: Option<i64>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "round_one_opt"
    )]
    pub average_cycle: Option<f64>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "round_one_opt"
    )]
    pub average_period_length: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shortest_period: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longest_period: Option<i64>,
}

impl Statistics {
    pub fn is_empty(&self) -> bool {
        self.total_cycles == 0
    }
}

/// One decimal, ties to even (28.25 -> 28.2).
fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round_ties_even() / 10.0
}

fn round_one<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(round_to_tenth(*value))
}

fn round_one_opt<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => serializer.serialize_some(&round_to_tenth(*v)),
        None => serializer.serialize_none(),
    }
}
