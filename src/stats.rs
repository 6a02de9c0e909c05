//! Response-time arithmetic over application/event dates.
//!
//! Everything here is pure: the store gathers the dates, these functions turn
//! them into day counts and the summary report.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// Days between applying and the first recorded event.
///
/// With no event yet, returns `None` when `ignore_ongoing` is set, otherwise
/// the number of days the application has been pending as of `today`.
pub fn response_days(
    applied: NaiveDate,
    first_event: Option<NaiveDate>,
    ignore_ongoing: bool,
    today: NaiveDate,
) -> Option<i64> {
    match first_event {
        Some(date) => Some((date - applied).num_days()),
        None if ignore_ongoing => None,
        None => Some((today - applied).num_days()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseSample {
    pub application_id: i64,
    pub applied: NaiveDate,
    pub days: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaxResponse {
    pub application_id: i64,
    pub days: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RejectionStats {
    pub sample_count: usize,
    pub total_applications: usize,
    pub mean: Option<f64>,
    /// Population standard deviation.
    pub std_dev: Option<f64>,
    pub max: Option<MaxResponse>,
    /// Mean response time of the applications submitted on each date.
    pub daily_average: BTreeMap<NaiveDate, f64>,
}

impl RejectionStats {
    /// Summarizes `samples`, which are expected in application list order
    /// (ties for the maximum go to the earliest sample).
    pub fn from_samples(samples: &[ResponseSample], total_applications: usize) -> Self {
        let n = samples.len();
        let (mean, std_dev) = if n == 0 {
            (None, None)
        } else {
            let mean = samples.iter().map(|s| s.days as f64).sum::<f64>() / n as f64;
            let variance = samples
                .iter()
                .map(|s| (s.days as f64 - mean).powi(2))
                .sum::<f64>()
                / n as f64;
            (Some(mean), Some(variance.sqrt()))
        };

        let mut max: Option<MaxResponse> = None;
        for s in samples {
            if max.as_ref().is_none_or(|m| s.days > m.days) {
                max = Some(MaxResponse {
                    application_id: s.application_id,
                    days: s.days,
                });
            }
        }

        let mut by_date: BTreeMap<NaiveDate, (i64, usize)> = BTreeMap::new();
        for s in samples {
            let entry = by_date.entry(s.applied).or_insert((0, 0));
            entry.0 += s.days;
            entry.1 += 1;
        }
        let daily_average = by_date
            .into_iter()
            .map(|(date, (sum, count))| (date, sum as f64 / count as f64))
            .collect();

        Self {
            sample_count: n,
            total_applications,
            mean,
            std_dev,
            max,
            daily_average,
        }
    }
}
