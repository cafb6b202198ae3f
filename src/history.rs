use chrono::NaiveDate;
use tracing::info;

use crate::models::{CycleRecord, SymptomRecord, TrackerData, UserHistory};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    #[error("a period started on {start} is still open")]
    PeriodAlreadyOpen { start: NaiveDate },
    #[error("period start {date} is not after the last start {last_start}")]
    OutOfOrder { date: NaiveDate, last_start: NaiveDate },
    #[error("no open period to end")]
    NoOpenPeriod,
    #[error("period end {date} is before its start {start}")]
    EndBeforeStart { date: NaiveDate, start: NaiveDate },
    #[error("unknown user {user}")]
    UnknownUser { user: String },
}

impl UserHistory {
    /// Append a new open cycle starting on `date`.
    pub fn log_period_start(&mut self, date: NaiveDate) -> Result<(), HistoryError> {
        if let Some(last) = self.cycles.last() {
            if last.is_open() {
                return Err(HistoryError::PeriodAlreadyOpen {
                    start: last.start_date,
                });
            }
            if date <= last.start_date {
                return Err(HistoryError::OutOfOrder {
                    date,
                    last_start: last.start_date,
                });
            }
        }

        self.cycles.push(CycleRecord::open(date));
        Ok(())
    }

    /// Close the open cycle and record its length relative to the previous start.
    pub fn log_period_end(&mut self, date: NaiveDate) -> Result<(), HistoryError> {
        let previous_start = self
            .cycles
            .len()
            .checked_sub(2)
            .map(|i| self.cycles[i].start_date);

        let current = match self.cycles.last_mut() {
            Some(cycle) if cycle.is_open() => cycle,
            _ => return Err(HistoryError::NoOpenPeriod),
        };
        if date < current.start_date {
            return Err(HistoryError::EndBeforeStart {
                date,
                start: current.start_date,
            });
        }

        let start = current.start_date;
        current.end_date = Some(date);
        current.cycle_length = previous_start.map(|prev| (start - prev).num_days());
        Ok(())
    }

    pub fn log_symptom(
        &mut self,
        date: NaiveDate,
        symptom: impl Into<String>,
        notes: Option<String>,
    ) {
        self.symptoms.push(SymptomRecord {
            date,
            symptom: symptom.into(),
            notes,
        });
    }

    /// The cycle currently in progress, if any.
    pub fn current_cycle(&self) -> Option<&CycleRecord> {
        self.cycles.last().filter(|c| c.is_open())
    }
}

impl TrackerData {
    pub fn user(&self, name: &str) -> Option<&UserHistory> {
        self.users.get(name)
    }

    /// Get a user's history, registering the user with default settings first if needed.
    pub fn user_mut(&mut self, name: &str) -> &mut UserHistory {
        self.users.entry(name.to_string()).or_default()
    }

    pub fn log_period_start(&mut self, user: &str, date: NaiveDate) -> Result<(), HistoryError> {
        self.user_mut(user).log_period_start(date)?;
        info!(user, %date, "logged period start");
        Ok(())
    }

    /// End the open period for a known user. Unknown users have nothing open.
    pub fn log_period_end(&mut self, user: &str, date: NaiveDate) -> Result<(), HistoryError> {
        self.users
            .get_mut(user)
            .ok_or(HistoryError::NoOpenPeriod)?
            .log_period_end(date)?;
        info!(user, %date, "logged period end");
        Ok(())
    }

    /// Symptoms are only accepted for registered users.
    pub fn log_symptom(
        &mut self,
        user: &str,
        date: NaiveDate,
        symptom: &str,
        notes: Option<String>,
    ) -> Result<(), HistoryError> {
        self.users
            .get_mut(user)
            .ok_or_else(|| HistoryError::UnknownUser {
                user: user.to_string(),
            })?
            .log_symptom(date, symptom, notes);
        info!(user, %date, symptom, "logged symptom");
        Ok(())
    }
}
