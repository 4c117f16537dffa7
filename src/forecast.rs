//! Daily revenue forecasting using augurs (MSTL + ETS).
//!
//! # Algorithm
//!
//! The training series (all days strictly before the cutoff) is decomposed
//! with MSTL using weekly seasonality, plus yearly seasonality when at least
//! two full years of history are available, and an AutoETS trend model.
//! Daily seasonality is never modeled. Predictions carry 95% intervals and
//! span both the training period (in-sample fit) and an out-of-sample
//! horizon through the last observed date.
//!
//! Accuracy is measured on the evaluation period (cutoff onward) by
//! inner-joining predictions with actuals per date. An empty join degrades
//! the metrics to NaN with a warning instead of failing the pipeline.

use std::collections::BTreeMap;

use augurs::{
    ets::AutoETS,
    forecaster::{transforms::LinearInterpolator, Forecaster},
    mstl::MSTLModel,
};
use chrono::{Duration, NaiveDate};
use tracing::warn;

use crate::features::DailySales;

/// Minimum number of training days required to fit the weekly model
/// (two full weekly cycles).
const MIN_TRAIN_POINTS: usize = 14;

/// Weekly seasonality period (days).
const WEEKLY_PERIOD: usize = 7;

/// Yearly seasonality period (days), used once two full years are observed.
const YEARLY_PERIOD: usize = 365;

/// Confidence level for the prediction intervals.
const CONFIDENCE_LEVEL: f64 = 0.95;

/// Error type for forecasting operations
#[derive(Debug, thiserror::Error)]
pub enum ForecastError {
    #[error("no daily sales rows to forecast")]
    EmptyInput,

    #[error("insufficient training data: need at least {MIN_TRAIN_POINTS} days before the cutoff, got {0}")]
    InsufficientData(usize),

    #[error("forecast model error: {0}")]
    Model(String),
}

/// One predicted day, optionally paired with the observed revenue.
#[derive(Debug, Clone)]
pub struct ForecastRow {
    pub date: NaiveDate,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
    pub actual: Option<f64>,
}

/// Accuracy over the evaluation period. All NaN when the join is empty.
#[derive(Debug, Clone, Copy)]
pub struct ForecastMetrics {
    pub mae: f64,
    pub rmse: f64,
    /// Percent. Computed over evaluation days with nonzero actuals.
    pub mape: f64,
}

/// Forecast result bundle.
#[derive(Debug)]
pub struct ForecastOutput {
    /// Full-span predictions left-joined with actuals, for plotting.
    pub rows: Vec<ForecastRow>,
    /// Evaluation-period predictions inner-joined with actuals.
    pub eval_rows: Vec<ForecastRow>,
    pub metrics: ForecastMetrics,
    pub used_yearly_seasonality: bool,
    /// Days predicted past the end of the training series.
    pub horizon: usize,
}

/// Fit the seasonal model on days before `cutoff` and evaluate it on the
/// days from `cutoff` through the last observed date.
pub fn run_forecast(daily: &[DailySales], cutoff: NaiveDate) -> Result<ForecastOutput, ForecastError> {
    if daily.is_empty() {
        return Err(ForecastError::EmptyInput);
    }

    let actuals: BTreeMap<NaiveDate, f64> =
        daily.iter().map(|day| (day.date, day.total_paid)).collect();
    let last_date = *actuals.keys().next_back().expect("non-empty map");

    let train_dates: Vec<NaiveDate> = actuals.keys().copied().filter(|d| *d < cutoff).collect();
    let train_start = *train_dates.first().ok_or(ForecastError::InsufficientData(0))?;
    let train_end = *train_dates.last().expect("non-empty train dates");

    // Gap-fill the training span with zero-revenue days so the seasonal
    // periods stay aligned with the calendar.
    let (filled_dates, values) = fill_daily_series(&actuals, train_start, train_end);
    if values.len() < MIN_TRAIN_POINTS {
        return Err(ForecastError::InsufficientData(values.len()));
    }

    let used_yearly_seasonality = values.len() >= 2 * YEARLY_PERIOD;
    let periods = if used_yearly_seasonality {
        vec![WEEKLY_PERIOD, YEARLY_PERIOD]
    } else {
        vec![WEEKLY_PERIOD]
    };

    let trend = AutoETS::non_seasonal().into_trend_model();
    let mstl = MSTLModel::new(periods, trend);
    let transformers: Vec<Box<dyn augurs::forecaster::Transformer>> =
        vec![Box::new(LinearInterpolator::default())];
    let mut forecaster = Forecaster::new(mstl).with_transformers(transformers);
    forecaster
        .fit(&values)
        .map_err(|e| ForecastError::Model(format!("MSTL fit error: {e}")))?;

    let in_sample = forecaster
        .predict_in_sample(CONFIDENCE_LEVEL)
        .map_err(|e| ForecastError::Model(format!("in-sample predict error: {e}")))?;

    let horizon = (last_date - train_end).num_days().max(0) as usize;
    let mut rows = Vec::with_capacity(values.len() + horizon);
    append_rows(&mut rows, &filled_dates, &in_sample, &actuals);

    if horizon > 0 {
        let ahead = forecaster
            .predict(horizon, CONFIDENCE_LEVEL)
            .map_err(|e| ForecastError::Model(format!("predict error: {e}")))?;
        let ahead_dates: Vec<NaiveDate> = (1..=horizon as i64)
            .map(|offset| train_end + Duration::days(offset))
            .collect();
        append_rows(&mut rows, &ahead_dates, &ahead, &actuals);
    }

    let eval_rows: Vec<ForecastRow> = rows
        .iter()
        .filter(|row| row.date >= cutoff && row.actual.is_some())
        .cloned()
        .collect();
    if eval_rows.is_empty() {
        warn!("no overlap between predictions and actuals in the evaluation period; accuracy metrics are undefined");
    }
    let metrics = compute_metrics(&eval_rows);

    Ok(ForecastOutput {
        rows,
        eval_rows,
        metrics,
        used_yearly_seasonality,
        horizon,
    })
}

/// MAE, RMSE and MAPE over rows that carry both a prediction and an actual.
pub fn compute_metrics(eval_rows: &[ForecastRow]) -> ForecastMetrics {
    if eval_rows.is_empty() {
        return ForecastMetrics {
            mae: f64::NAN,
            rmse: f64::NAN,
            mape: f64::NAN,
        };
    }

    let n = eval_rows.len() as f64;
    let mut abs_sum = 0.0;
    let mut sq_sum = 0.0;
    let mut pct_sum = 0.0;
    let mut pct_count = 0usize;
    for row in eval_rows {
        let actual = row.actual.unwrap_or(0.0);
        let error = actual - row.yhat;
        abs_sum += error.abs();
        sq_sum += error * error;
        if actual != 0.0 {
            pct_sum += (error / actual).abs();
            pct_count += 1;
        }
    }

    ForecastMetrics {
        mae: abs_sum / n,
        rmse: (sq_sum / n).sqrt(),
        mape: if pct_count > 0 {
            pct_sum / pct_count as f64 * 100.0
        } else {
            f64::NAN
        },
    }
}

/// Expand sparse per-day totals into one value per calendar day,
/// with zero for days that saw no transactions.
fn fill_daily_series(
    actuals: &BTreeMap<NaiveDate, f64>,
    start: NaiveDate,
    end: NaiveDate,
) -> (Vec<NaiveDate>, Vec<f64>) {
    let mut dates = Vec::new();
    let mut values = Vec::new();
    let mut current = start;
    while current <= end {
        dates.push(current);
        values.push(actuals.get(&current).copied().unwrap_or(0.0));
        current += Duration::days(1);
    }
    (dates, values)
}

fn append_rows(
    rows: &mut Vec<ForecastRow>,
    dates: &[NaiveDate],
    forecast: &augurs::Forecast,
    actuals: &BTreeMap<NaiveDate, f64>,
) {
    for (i, (&date, &point)) in dates.iter().zip(forecast.point.iter()).enumerate() {
        // Revenue cannot be negative; floor the estimates at zero.
        let yhat = point.max(0.0);
        let (yhat_lower, yhat_upper) = interval_bounds(forecast, i, yhat);
        rows.push(ForecastRow {
            date,
            yhat,
            yhat_lower,
            yhat_upper,
            actual: actuals.get(&date).copied(),
        });
    }
}

fn interval_bounds(forecast: &augurs::Forecast, index: usize, yhat: f64) -> (f64, f64) {
    if let Some(ref intervals) = forecast.intervals {
        if let (Some(&lower), Some(&upper)) =
            (intervals.lower.get(index), intervals.upper.get(index))
        {
            return (lower.max(0.0), upper.max(0.0));
        }
    }
    // Fallback: +/- 20% around the point estimate if no intervals available
    ((yhat * 0.8).max(0.0), yhat * 1.2)
}
