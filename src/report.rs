use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;

use crate::config::ReportConfig;
use crate::models::{
    FertilityWindow, Prediction, Statistics, SymptomRecord, TrackerData, UserHistory,
};
use crate::prediction::{self, InvalidHistoryError};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum TrackerState {
    #[serde(rename = "No Data")]
    NoData,
    #[serde(rename = "No Cycles Logged")]
    NoCyclesLogged,
    #[serde(rename = "In Period")]
    InPeriod,
    #[serde(rename = "Not in Period")]
    NotInPeriod,
}

/// Read-only status attributes for one user, recomputed from scratch on
/// every call.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CycleReport {
    pub state: TrackerState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_in_current_period: Option<i64>,
    #[serde(flatten)]
    pub prediction: Option<Prediction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fertility_window: Option<FertilityWindow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<Statistics>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recent_symptoms: Vec<SymptomRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_until_next_period: Option<i64>,
}

impl CycleReport {
    fn bare(state: TrackerState) -> Self {
        Self {
            state,
            days_in_current_period: None,
            prediction: None,
            fertility_window: None,
            statistics: None,
            recent_symptoms: Vec::new(),
            days_until_next_period: None,
        }
    }
}

/// Build the report for one user as of `today`. `None` means the user has
/// never been registered.
pub fn build_report(
    user: Option<&UserHistory>,
    today: NaiveDate,
    config: &ReportConfig,
) -> Result<CycleReport, InvalidHistoryError> {
    let Some(history) = user else {
        return Ok(CycleReport::bare(TrackerState::NoData));
    };
    let cycles = &history.cycles;
    if cycles.is_empty() {
        return Ok(CycleReport::bare(TrackerState::NoCyclesLogged));
    }
    prediction::checked(cycles)?;

    let (state, days_in_current_period) = match history.current_cycle() {
        Some(open) => (
            TrackerState::InPeriod,
            Some((today - open.start_date).num_days() + 1),
        ),
        None => (TrackerState::NotInPeriod, None),
    };

    // fertility must follow the exact prediction being reported
    let predicted = prediction::predict_validated(cycles)?;
    let fertility_window = prediction::window_from_prediction(&predicted, today)?;
    let days_until_next_period = predicted
        .next_period_date
        .map(|next| (next - today).num_days());

    let skip = history.symptoms.len().saturating_sub(config.recent_symptoms);

    Ok(CycleReport {
        state,
        days_in_current_period,
        prediction: Some(predicted),
        fertility_window,
        statistics: Some(prediction::stats_validated(cycles)),
        recent_symptoms: history.symptoms[skip..].to_vec(),
        days_until_next_period,
    })
}

/// Build reports for every user in `data` plus every configured user.
/// Users are independent, so they are evaluated in parallel.
pub fn build_all(
    data: &TrackerData,
    today: NaiveDate,
    config: &ReportConfig,
) -> BTreeMap<String, Result<CycleReport, InvalidHistoryError>> {
    let names: BTreeSet<&str> = data
        .users
        .keys()
        .chain(config.users.iter())
        .map(String::as_str)
        .collect();

    names
        .into_par_iter()
        .map(|name| {
            (
                name.to_string(),
                build_report(data.user(name), today, config),
            )
        })
        .collect()
}
