//! Cycle prediction, fertility window and statistics for logged cycle histories.
//!
//! Every computation is a pure function of one user's history and an
//! explicit `today`; nothing is cached between calls.

pub mod backup;
pub mod config;
pub mod history;
pub mod models;
pub mod prediction;
pub mod report;

pub use config::{Config, ReportConfig};
pub use models::{
    Confidence, CycleRecord, DateRange, FertilityWindow, Prediction, Statistics, SymptomRecord,
    TrackerData, UserHistory, UserSettings,
};
pub use prediction::{cycle_stats, fertility_window, predict, InvalidHistoryError};
pub use report::{build_all, build_report, CycleReport, TrackerState};
