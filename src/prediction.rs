use chrono::{Days, NaiveDate};
use tracing::{debug, warn};

use crate::models::{Confidence, CycleRecord, DateRange, FertilityWindow, Prediction, Statistics};

/// Average cycle length reported until at least one cycle has been measured.
pub const FALLBACK_CYCLE_LENGTH: f64 = 28.0;
/// Fixed luteal phase: ovulation is placed this many days before the next onset.
pub const LUTEAL_PHASE_DAYS: i64 = 14;
const FERTILE_DAYS_BEFORE_OVULATION: i64 = 5;
const FERTILE_DAYS_AFTER_OVULATION: i64 = 1;

/// A history that breaks the ordering the engine relies on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidHistoryError {
    #[error("cycle {index} starts on {start}, not after the previous start {previous}")]
    OutOfOrder {
        index: usize,
        previous: NaiveDate,
        start: NaiveDate,
    },
    #[error("cycle {index} ends on {end}, before it starts on {start}")]
    EndBeforeStart {
        index: usize,
        start: NaiveDate,
        end: NaiveDate,
    },
    #[error("cycle {index} has a non-positive length of {length} days")]
    NonPositiveLength { index: usize, length: i64 },
    #[error("cycle {index} has a length of {length} days but started {expected} days after the previous one")]
    LengthMismatch {
        index: usize,
        length: i64,
        expected: i64,
    },
    #[error("cycle {index} has a length of {length} days but no previous cycle")]
    LengthWithoutPrevious { index: usize, length: i64 },
    #[error("shifting {date} by {days} days leaves the supported calendar range")]
    DateOutOfRange { date: NaiveDate, days: i64 },
}

/// Check that start dates strictly increase, no period ends before it
/// starts and every recorded cycle length equals the gap to the previous start.
pub fn validate_history(cycles: &[CycleRecord]) -> Result<(), InvalidHistoryError> {
    for (index, cycle) in cycles.iter().enumerate() {
        if let Some(end) = cycle.end_date {
            if end < cycle.start_date {
                return Err(InvalidHistoryError::EndBeforeStart {
                    index,
                    start: cycle.start_date,
                    end,
                });
            }
        }
        if let Some(length) = cycle.cycle_length {
            if length <= 0 {
                return Err(InvalidHistoryError::NonPositiveLength { index, length });
            }
        }

        let Some(previous) = index.checked_sub(1).map(|i| &cycles[i]) else {
            if let Some(length) = cycle.cycle_length {
                return Err(InvalidHistoryError::LengthWithoutPrevious { index, length });
            }
            continue;
        };
        if cycle.start_date <= previous.start_date {
            return Err(InvalidHistoryError::OutOfOrder {
                index,
                previous: previous.start_date,
                start: cycle.start_date,
            });
        }
        let expected = (cycle.start_date - previous.start_date).num_days();
        match cycle.cycle_length {
            Some(length) if length != expected => {
                return Err(InvalidHistoryError::LengthMismatch {
                    index,
                    length,
                    expected,
                });
            }
            _ => {}
        }
    }

    Ok(())
}

/// Predict the next period onset from every recorded cycle length.
///
/// With fewer than two cycles, or no measured lengths, this returns the
/// low-confidence default rather than an error.
pub fn predict(cycles: &[CycleRecord]) -> Result<Prediction, InvalidHistoryError> {
    checked(cycles)?;
    predict_validated(cycles)
}

/// Fertile window for the history's own prediction, or `None` when there is
/// nothing to predict from.
pub fn fertility_window(
    cycles: &[CycleRecord],
    today: NaiveDate,
) -> Result<Option<FertilityWindow>, InvalidHistoryError> {
    checked(cycles)?;
    if cycles.len() < 2 {
        return Ok(None);
    }
    window_from_prediction(&predict_validated(cycles)?, today)
}

/// Derive the fertile window from an already computed prediction: ovulation
/// a luteal phase before the next onset, fertile from five days before it
/// through the day after.
pub fn window_from_prediction(
    prediction: &Prediction,
    today: NaiveDate,
) -> Result<Option<FertilityWindow>, InvalidHistoryError> {
    let Some(next_period) = prediction.next_period_date else {
        return Ok(None);
    };

    let ovulation_date = shift(next_period, -LUTEAL_PHASE_DAYS)?;
    let fertile_window_start = shift(ovulation_date, -FERTILE_DAYS_BEFORE_OVULATION)?;
    let fertile_window_end = shift(ovulation_date, FERTILE_DAYS_AFTER_OVULATION)?;

    Ok(Some(FertilityWindow {
        ovulation_date,
        fertile_window_start,
        fertile_window_end,
        fertile_days_remaining: (fertile_window_end - today).num_days().max(0),
    }))
}

/// Compute cycle and period statistics over the whole history.
pub fn cycle_stats(cycles: &[CycleRecord]) -> Result<Statistics, InvalidHistoryError> {
    checked(cycles)?;
    Ok(stats_validated(cycles))
}

pub(crate) fn stats_validated(cycles: &[CycleRecord]) -> Statistics {
    let cycle_lengths: Vec<i64> = cycles.iter().filter_map(|c| c.cycle_length).collect();
    let period_lengths: Vec<i64> = cycles.iter().filter_map(CycleRecord::period_length).collect();

    Statistics {
        total_cycles: cycles.len(),
        cycles_with_data: cycle_lengths.len(),
        shortest_cycle: cycle_lengths.iter().copied().min(),
        longest_cycle: cycle_lengths.iter().copied().max(),
        average_cycle: mean(&cycle_lengths),
        average_period_length: mean(&period_lengths),
        shortest_period: period_lengths.iter().copied().min(),
        longest_period: period_lengths.iter().copied().max(),
    }
}

/// Prediction for a history that has already passed `validate_history`.
pub(crate) fn predict_validated(
    cycles: &[CycleRecord],
) -> Result<Prediction, InvalidHistoryError> {
    let Some(stats) = calc_internals(cycles) else {
        debug!(cycles = cycles.len(), "not enough cycle data, using default prediction");
        return Ok(Prediction {
            next_period_date: None,
            next_period_range: None,
            confidence: Confidence::Low,
            average_cycle_length: FALLBACK_CYCLE_LENGTH,
            cycle_variability: None,
        });
    };

    let next_period = shift(stats.last_start, stats.avg_cycle.trunc() as i64)?;
    let spread = (2.0 * stats.std_dev).trunc() as i64;

    Ok(Prediction {
        next_period_date: Some(next_period),
        next_period_range: Some(DateRange {
            start: shift(next_period, -spread)?,
            end: shift(next_period, spread)?,
        }),
        confidence: Confidence::from_variability(stats.std_dev),
        average_cycle_length: stats.avg_cycle,
        cycle_variability: Some(stats.std_dev),
    })
}

/// Move `date` by a signed number of days without leaving the calendar.
fn shift(date: NaiveDate, days: i64) -> Result<NaiveDate, InvalidHistoryError> {
    let magnitude = Days::new(days.unsigned_abs());
    let shifted = if days >= 0 {
        date.checked_add_days(magnitude)
    } else {
        date.checked_sub_days(magnitude)
    };
    shifted.ok_or(InvalidHistoryError::DateOutOfRange { date, days })
}

pub(crate) fn checked(cycles: &[CycleRecord]) -> Result<(), InvalidHistoryError> {
    validate_history(cycles).map_err(|err| {
        warn!(error = %err, "rejecting cycle history");
        err
    })
}

struct PredictionInternals {
    avg_cycle: f64,
    std_dev: f64,
    last_start: NaiveDate,
}

fn calc_internals(cycles: &[CycleRecord]) -> Option<PredictionInternals> {
    if cycles.len() < 2 {
        return None;
    }

    let cycle_lengths: Vec<i64> = cycles.iter().filter_map(|c| c.cycle_length).collect();
    let avg_cycle = mean(&cycle_lengths)?;

    Some(PredictionInternals {
        avg_cycle,
        std_dev: std_deviation(&cycle_lengths),
        last_start: cycles.last()?.start_date,
    })
}

fn mean(values: &[i64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation; zero for fewer than two values.
fn std_deviation(values: &[i64]) -> f64 {
    let Some(avg) = mean(values) else {
        return 0.0;
    };
    if values.len() < 2 {
        return 0.0;
    }
    let variance = values
        .iter()
        .map(|&v| (v as f64 - avg).powi(2))
        .sum::<f64>()
        / (values.len() - 1) as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn make_cycle(start: &str, end: Option<&str>, length: Option<i64>) -> CycleRecord {
        CycleRecord {
            start_date: date(start),
            end_date: end.map(date),
            cycle_length: length,
        }
    }

    /// Three cycles from the reference example: two closed, one open.
    fn reference_history() -> Vec<CycleRecord> {
        vec![
            make_cycle("2024-01-01", Some("2024-01-05"), None),
            make_cycle("2024-01-29", Some("2024-02-02"), Some(28)),
            make_cycle("2024-02-26", None, Some(28)),
        ]
    }

    #[test]
    fn default_prediction_with_one_cycle() {
        let cycles = vec![make_cycle("2024-01-01", Some("2024-01-05"), None)];
        let pred = predict(&cycles).unwrap();
        assert_eq!(pred.next_period_date, None);
        assert_eq!(pred.next_period_range, None);
        assert_eq!(pred.cycle_variability, None);
        assert_eq!(pred.confidence, Confidence::Low);
        assert_eq!(pred.average_cycle_length, 28.0);
    }

    #[test]
    fn default_prediction_for_empty_history() {
        let pred = predict(&[]).unwrap();
        assert_eq!(pred.next_period_date, None);
        assert_eq!(pred.confidence, Confidence::Low);
    }

    #[test]
    fn default_prediction_without_measured_lengths() {
        let cycles = vec![
            make_cycle("2024-01-01", Some("2024-01-05"), None),
            make_cycle("2024-01-29", None, None),
        ];
        let pred = predict(&cycles).unwrap();
        assert_eq!(pred.next_period_date, None);
        assert_eq!(pred.confidence, Confidence::Low);
        assert_eq!(pred.average_cycle_length, FALLBACK_CYCLE_LENGTH);
    }

    #[test]
    fn predicts_from_reference_history() {
        let pred = predict(&reference_history()).unwrap();
        assert_eq!(pred.next_period_date, Some(date("2024-03-25")));
        assert_eq!(pred.average_cycle_length, 28.0);
        assert_eq!(pred.cycle_variability, Some(0.0));
        assert_eq!(pred.confidence, Confidence::High);
        assert_eq!(
            pred.next_period_range,
            Some(DateRange {
                start: date("2024-03-25"),
                end: date("2024-03-25"),
            })
        );
    }

    #[test]
    fn next_period_truncates_fractional_average() {
        // lengths 28 and 29 average to 28.5; only 28 whole days are added
        let cycles = vec![
            make_cycle("2024-01-01", Some("2024-01-05"), None),
            make_cycle("2024-01-29", Some("2024-02-02"), Some(28)),
            make_cycle("2024-02-27", Some("2024-03-02"), Some(29)),
        ];
        let pred = predict(&cycles).unwrap();
        assert_eq!(pred.average_cycle_length, 28.5);
        assert_eq!(pred.next_period_date, Some(date("2024-03-26")));
        // 2σ = 1.41 days, truncated to a one-day spread
        assert_eq!(
            pred.next_period_range,
            Some(DateRange {
                start: date("2024-03-25"),
                end: date("2024-03-27"),
            })
        );
        assert_eq!(pred.confidence, Confidence::High);
    }

    #[test]
    fn irregular_cycles_lower_confidence() {
        let cycles = vec![
            make_cycle("2024-01-01", Some("2024-01-05"), None),
            make_cycle("2024-01-25", Some("2024-01-29"), Some(24)),
            make_cycle("2024-02-24", None, Some(30)),
        ];
        let pred = predict(&cycles).unwrap();
        // sd of [24, 30] = sqrt(18) ≈ 4.24
        let sd = pred.cycle_variability.unwrap();
        assert!((sd - 18f64.sqrt()).abs() < 1e-9);
        assert_eq!(pred.confidence, Confidence::Medium);
        assert_eq!(pred.next_period_date, Some(date("2024-03-22")));
        assert_eq!(
            pred.next_period_range,
            Some(DateRange {
                start: date("2024-03-14"),
                end: date("2024-03-30"),
            })
        );
    }

    #[test]
    fn average_uses_full_history() {
        let mut cycles = vec![make_cycle("2024-01-01", Some("2024-01-05"), None)];
        let mut start = date("2024-01-01");
        for length in [20, 30, 30, 30, 30, 30, 30] {
            start = start + Duration::days(length);
            cycles.push(CycleRecord {
                start_date: start,
                end_date: Some(start + Duration::days(4)),
                cycle_length: Some(length),
            });
        }
        let pred = predict(&cycles).unwrap();
        assert!((pred.average_cycle_length - 200.0 / 7.0).abs() < 1e-9);
        assert_eq!(pred.next_period_date, Some(start + Duration::days(28)));
    }

    #[test]
    fn confidence_buckets() {
        assert_eq!(Confidence::from_variability(0.0), Confidence::High);
        assert_eq!(Confidence::from_variability(2.9), Confidence::High);
        assert_eq!(Confidence::from_variability(3.0), Confidence::Medium);
        assert_eq!(Confidence::from_variability(6.9), Confidence::Medium);
        assert_eq!(Confidence::from_variability(7.0), Confidence::Low);
        assert_eq!(Confidence::from_variability(10.0), Confidence::Low);
    }

    #[test]
    fn rejects_out_of_order_history() {
        let cycles = vec![
            make_cycle("2024-02-01", Some("2024-02-05"), None),
            make_cycle("2024-01-01", Some("2024-01-05"), Some(31)),
        ];
        assert!(matches!(
            predict(&cycles),
            Err(InvalidHistoryError::OutOfOrder { index: 1, .. })
        ));
        assert!(fertility_window(&cycles, date("2024-01-01")).is_err());
        assert!(cycle_stats(&cycles).is_err());
    }

    #[test]
    fn rejects_end_before_start() {
        let cycles = vec![make_cycle("2024-01-10", Some("2024-01-05"), None)];
        assert_eq!(
            validate_history(&cycles),
            Err(InvalidHistoryError::EndBeforeStart {
                index: 0,
                start: date("2024-01-10"),
                end: date("2024-01-05"),
            })
        );
    }

    #[test]
    fn rejects_non_positive_length() {
        let cycles = vec![
            make_cycle("2024-01-01", Some("2024-01-05"), None),
            make_cycle("2024-01-29", None, Some(0)),
        ];
        assert_eq!(
            validate_history(&cycles),
            Err(InvalidHistoryError::NonPositiveLength { index: 1, length: 0 })
        );
    }

    #[test]
    fn rejects_length_that_disagrees_with_dates() {
        let cycles = vec![
            make_cycle("2024-01-01", Some("2024-01-05"), None),
            make_cycle("2024-01-29", None, Some(1_000_000_000)),
        ];
        assert_eq!(
            predict(&cycles),
            Err(InvalidHistoryError::LengthMismatch {
                index: 1,
                length: 1_000_000_000,
                expected: 28,
            })
        );
        assert!(cycle_stats(&cycles).is_err());
    }

    #[test]
    fn rejects_length_on_first_cycle() {
        let cycles = vec![make_cycle("2024-01-01", Some("2024-01-05"), Some(28))];
        assert_eq!(
            validate_history(&cycles),
            Err(InvalidHistoryError::LengthWithoutPrevious { index: 0, length: 28 })
        );
    }

    #[test]
    fn prediction_past_last_calendar_day_is_an_error() {
        let second = NaiveDate::MAX - Duration::days(10);
        let cycles = vec![
            CycleRecord::open(second - Duration::days(30)),
            CycleRecord {
                start_date: second,
                end_date: None,
                cycle_length: Some(30),
            },
        ];
        assert!(matches!(
            predict(&cycles),
            Err(InvalidHistoryError::DateOutOfRange { .. })
        ));
        assert!(fertility_window(&cycles, second).is_err());
    }

    #[test]
    fn prediction_on_last_calendar_day_is_allowed() {
        let second = NaiveDate::MAX - Duration::days(30);
        let cycles = vec![
            CycleRecord::open(second - Duration::days(30)),
            CycleRecord {
                start_date: second,
                end_date: None,
                cycle_length: Some(30),
            },
        ];
        let pred = predict(&cycles).unwrap();
        assert_eq!(pred.next_period_date, Some(NaiveDate::MAX));
    }

    #[test]
    fn fertility_window_before_first_calendar_day_is_an_error() {
        let cycles = vec![
            CycleRecord::open(NaiveDate::MIN),
            CycleRecord {
                start_date: NaiveDate::MIN + Duration::days(1),
                end_date: None,
                cycle_length: Some(1),
            },
        ];
        let pred = predict(&cycles).unwrap();
        assert_eq!(pred.next_period_date, Some(NaiveDate::MIN + Duration::days(2)));
        assert!(matches!(
            fertility_window(&cycles, NaiveDate::MIN),
            Err(InvalidHistoryError::DateOutOfRange { .. })
        ));
    }

    #[test]
    fn averages_round_half_to_even() {
        // lengths 28, 28, 28, 29 average 28.25; periods 5, 5, 5, 6 average 5.25
        let cycles = vec![
            make_cycle("2024-01-01", Some("2024-01-05"), None),
            make_cycle("2024-01-29", Some("2024-02-02"), Some(28)),
            make_cycle("2024-02-26", Some("2024-03-01"), Some(28)),
            make_cycle("2024-03-25", Some("2024-03-30"), Some(28)),
            make_cycle("2024-04-23", None, Some(29)),
        ];
        let pred = predict(&cycles).unwrap();
        assert_eq!(pred.average_cycle_length, 28.25);
        let value = serde_json::to_value(&pred).unwrap();
        assert_eq!(value["average_cycle_length"], 28.2);

        let stats = serde_json::to_value(cycle_stats(&cycles).unwrap()).unwrap();
        assert_eq!(stats["average_cycle"], 28.2);
        assert_eq!(stats["average_period_length"], 5.2);
    }

    #[test]
    fn no_fertility_window_with_one_cycle() {
        let cycles = vec![make_cycle("2024-01-01", Some("2024-01-05"), None)];
        assert_eq!(fertility_window(&cycles, date("2024-01-02")).unwrap(), None);
    }

    #[test]
    fn no_fertility_window_without_prediction() {
        let cycles = vec![
            make_cycle("2024-01-01", Some("2024-01-05"), None),
            make_cycle("2024-01-29", None, None),
        ];
        assert_eq!(fertility_window(&cycles, date("2024-01-30")).unwrap(), None);
    }

    #[test]
    fn fertility_window_calculated() {
        let fw = fertility_window(&reference_history(), date("2024-03-01"))
            .unwrap()
            .unwrap();
        // Predicted period: Mar 25. Ovulation: Mar 25 - 14 = Mar 11
        assert_eq!(fw.ovulation_date, date("2024-03-11"));
        assert_eq!(fw.fertile_window_start, date("2024-03-06"));
        assert_eq!(fw.fertile_window_end, date("2024-03-12"));
        assert_eq!(fw.fertile_days_remaining, 11);
    }

    #[test]
    fn fertile_days_remaining_clamps_at_zero() {
        let history = reference_history();
        let on_last_day = fertility_window(&history, date("2024-03-12")).unwrap().unwrap();
        assert_eq!(on_last_day.fertile_days_remaining, 0);

        let after = fertility_window(&history, date("2024-04-20")).unwrap().unwrap();
        assert_eq!(after.fertile_days_remaining, 0);
    }

    #[test]
    fn window_offsets_relative_to_next_period() {
        let prediction = predict(&reference_history()).unwrap();
        let d = prediction.next_period_date.unwrap();
        let fw = window_from_prediction(&prediction, d).unwrap().unwrap();
        assert_eq!(fw.ovulation_date, d - Duration::days(14));
        assert_eq!(fw.fertile_window_start, d - Duration::days(19));
        assert_eq!(fw.fertile_window_end, d - Duration::days(13));
    }

    #[test]
    fn cycle_stats_computed() {
        let stats = cycle_stats(&reference_history()).unwrap();
        assert_eq!(stats.total_cycles, 3);
        assert_eq!(stats.cycles_with_data, 2);
        assert_eq!(stats.shortest_cycle, Some(28));
        assert_eq!(stats.longest_cycle, Some(28));
        assert_eq!(stats.average_cycle, Some(28.0));
        assert_eq!(stats.average_period_length, Some(5.0));
        assert_eq!(stats.shortest_period, Some(5));
        assert_eq!(stats.longest_period, Some(5));
    }

    #[test]
    fn period_length_is_inclusive() {
        let cycles = vec![make_cycle("2024-01-01", Some("2024-01-05"), None)];
        let stats = cycle_stats(&cycles).unwrap();
        assert_eq!(stats.shortest_period, Some(5));
        assert_eq!(stats.cycles_with_data, 0);
        assert_eq!(stats.shortest_cycle, None);
        assert_eq!(stats.average_cycle, None);
    }

    #[test]
    fn open_cycles_excluded_from_period_stats() {
        let cycles = vec![
            make_cycle("2024-01-01", None, None),
            make_cycle("2024-01-29", None, Some(28)),
        ];
        let stats = cycle_stats(&cycles).unwrap();
        assert_eq!(stats.total_cycles, 2);
        assert_eq!(stats.cycles_with_data, 1);
        assert_eq!(stats.average_cycle, Some(28.0));
        assert_eq!(stats.average_period_length, None);
        assert_eq!(stats.shortest_period, None);
        assert_eq!(stats.longest_period, None);
    }

    #[test]
    fn empty_history_has_empty_stats() {
        let stats = cycle_stats(&[]).unwrap();
        assert!(stats.is_empty());
        assert_eq!(stats, Statistics::default());
    }
}
