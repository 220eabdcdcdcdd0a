use crate::config::{CONFIDENCE_FRACTION, FOREST_MIN_SAMPLES_SPLIT, MIN_SMOOTHING_POINTS, SEASONAL_PERIOD, TEST_PERCENT};
use crate::data::{business_days_after, FeatureSeries};
use crate::error::{DashError, Result};
use crate::models::holt_winters::HoltWinters;
use crate::models::random_forest::{ForestParams, RandomForestRegressor};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

/// Output of a fitted forecaster, aligned by `index`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ForecastResult {
    pub index: Vec<NaiveDate>,
    pub actual: Option<Vec<f64>>,
    pub forecast: Vec<f64>,
    pub lower_bound: Option<Vec<f64>>,
    pub upper_bound: Option<Vec<f64>>,
}

/// What to forecast.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Horizon {
    /// Predict the held-out test segment and report it next to the actuals.
    HeldOut,
    /// Predict this many business days past the last observation.
    BusinessDays(usize),
}

pub trait Forecaster {
    type Fitted: FittedForecaster;

    fn name(&self) -> &'static str;

    fn fit(&self, series: &FeatureSeries) -> Result<Self::Fitted>;
}

pub trait FittedForecaster {
    fn forecast(&self, horizon: Horizon) -> Result<ForecastResult>;
}

/// Fits `forecaster` on `series` and forecasts `horizon` in one go.
pub fn fit_and_forecast<F: Forecaster>(
    forecaster: &F,
    series: &FeatureSeries,
    horizon: Horizon,
) -> Result<ForecastResult> {
    let fitted = forecaster.fit(series)?;
    let result = fitted.forecast(horizon)?;
    info!(
        "{}: fitted on {} points, forecast {} points",
        forecaster.name(),
        series.len(),
        result.forecast.len()
    );
    Ok(result)
}

// ──────────────────────────────────────────────────────────────────────────────
// Lag-1 random forest
// ──────────────────────────────────────────────────────────────────────────────

/// Rows of `(date, lag1, close, return)` with the first observation dropped,
/// since it has neither a lag nor a return.
#[derive(Clone, Debug, PartialEq)]
pub struct LagFrame {
    pub dates: Vec<NaiveDate>,
    pub lag1: Vec<f64>,
    pub close: Vec<f64>,
    pub returns: Vec<f64>,
}

impl LagFrame {
    pub fn from_series(series: &FeatureSeries) -> Self {
        let v = &series.values;
        let rows = v.len().saturating_sub(1);
        let mut frame = Self {
            dates: Vec::with_capacity(rows),
            lag1: Vec::with_capacity(rows),
            close: Vec::with_capacity(rows),
            returns: Vec::with_capacity(rows),
        };
        for i in 1..v.len() {
            frame.dates.push(series.dates[i]);
            frame.lag1.push(v[i - 1]);
            frame.close.push(v[i]);
            frame.returns.push(v[i] / v[i - 1] - 1.0);
        }
        frame
    }

    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    pub fn mean_return(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.returns.iter().sum::<f64>() / self.returns.len() as f64
    }
}

/// Size of the chronological test segment: `ceil(n * TEST_PERCENT / 100)`.
pub fn test_len(n: usize) -> usize {
    (n * TEST_PERCENT).div_ceil(100)
}

/// Splits `0..n` into a leading train range and a trailing test range.
pub fn chronological_split(n: usize) -> (std::ops::Range<usize>, std::ops::Range<usize>) {
    let train_end = n - test_len(n);
    (0..train_end, train_end..n)
}

#[derive(Clone, Debug, Default)]
pub struct LagRegressionForecaster {
    pub params: ForestParams,
}

impl LagRegressionForecaster {
    pub fn new(n_trees: usize, seed: u64) -> Self {
        Self {
            params: ForestParams {
                n_trees,
                max_depth: None,
                min_samples_split: FOREST_MIN_SAMPLES_SPLIT,
                seed,
            },
        }
    }
}

pub struct FittedLagRegression {
    forest: RandomForestRegressor,
    test_dates: Vec<NaiveDate>,
    test_lag1: Vec<f64>,
    test_close: Vec<f64>,
    last_date: NaiveDate,
    last_close: f64,
}

impl Forecaster for LagRegressionForecaster {
    type Fitted = FittedLagRegression;

    fn name(&self) -> &'static str {
        "Random forest on lag-1 close"
    }

    fn fit(&self, series: &FeatureSeries) -> Result<FittedLagRegression> {
        // One row goes to the lag; train and test need one row each.
        if series.len() < 3 {
            return Err(DashError::InsufficientHistory {
                needed: 3,
                got: series.len(),
            });
        }

        let frame = LagFrame::from_series(series);
        let (train, test) = chronological_split(frame.len());

        let features: Vec<Vec<f64>> = frame.lag1[train.clone()].iter().map(|&x| vec![x]).collect();
        let forest = RandomForestRegressor::fit(&features, &frame.close[train], &self.params)?;
        debug!(
            "Random forest: {} trees on {} rows, mean daily return {:.3}%",
            forest.n_trees(),
            features.len(),
            frame.mean_return() * 100.0
        );

        let (last_date, last_close) = match (series.dates.last(), series.values.last()) {
            (Some(d), Some(c)) => (*d, *c),
            _ => {
                return Err(DashError::InsufficientHistory {
                    needed: 3,
                    got: 0,
                });
            }
        };

        Ok(FittedLagRegression {
            forest,
            test_dates: frame.dates[test.clone()].to_vec(),
            test_lag1: frame.lag1[test.clone()].to_vec(),
            test_close: frame.close[test].to_vec(),
            last_date,
            last_close,
        })
    }
}

impl FittedForecaster for FittedLagRegression {
    fn forecast(&self, horizon: Horizon) -> Result<ForecastResult> {
        match horizon {
            Horizon::HeldOut => Ok(ForecastResult {
                index: self.test_dates.clone(),
                actual: Some(self.test_close.clone()),
                forecast: self
                    .forest
                    .predict(&self.test_lag1.iter().map(|&x| vec![x]).collect::<Vec<_>>()),
                lower_bound: None,
                upper_bound: None,
            }),
            Horizon::BusinessDays(steps) => {
                // Each prediction becomes the next step's lag.
                let mut lag = self.last_close;
                let forecast = (0..steps)
                    .map(|_| {
                        lag = self.forest.predict_one(&[lag]);
                        lag
                    })
                    .collect();
                Ok(ForecastResult {
                    index: business_days_after(self.last_date, steps),
                    actual: None,
                    forecast,
                    lower_bound: None,
                    upper_bound: None,
                })
            }
        }
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Holt-Winters exponential smoothing
// ──────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct ExponentialSmoothingForecaster {
    pub seasonal_period: usize,
    pub confidence_fraction: f64,
}

impl Default for ExponentialSmoothingForecaster {
    fn default() -> Self {
        Self {
            seasonal_period: SEASONAL_PERIOD,
            confidence_fraction: CONFIDENCE_FRACTION,
        }
    }
}

pub struct FittedExponentialSmoothing {
    model: HoltWinters,
    last_date: NaiveDate,
    confidence_fraction: f64,
}

impl Forecaster for ExponentialSmoothingForecaster {
    type Fitted = FittedExponentialSmoothing;

    fn name(&self) -> &'static str {
        "Holt-Winters exponential smoothing"
    }

    fn fit(&self, series: &FeatureSeries) -> Result<FittedExponentialSmoothing> {
        let last_date = match series.last_date() {
            Some(d) if series.len() > MIN_SMOOTHING_POINTS => d,
            _ => {
                return Err(DashError::InsufficientHistory {
                    needed: MIN_SMOOTHING_POINTS + 1,
                    got: series.len(),
                });
            }
        };
        let model = HoltWinters::fit(&series.values, self.seasonal_period)?;
        let p = model.params();
        debug!(
            "Holt-Winters ({}): alpha={:.3} beta={:.3} gamma={:.3} sse={:.3}",
            if model.is_seasonal() { "seasonal" } else { "linear trend" },
            p.alpha,
            p.beta,
            p.gamma,
            model.sse()
        );
        Ok(FittedExponentialSmoothing {
            model,
            last_date,
            confidence_fraction: self.confidence_fraction,
        })
    }
}

impl FittedForecaster for FittedExponentialSmoothing {
    fn forecast(&self, horizon: Horizon) -> Result<ForecastResult> {
        let steps = match horizon {
            Horizon::BusinessDays(steps) => steps,
            Horizon::HeldOut => {
                return Err(DashError::Model(
                    "exponential smoothing forecasts forward only; no held-out segment".to_string(),
                ));
            }
        };

        let forecast = self.model.forecast(steps);
        // Fixed-fraction band, not a statistical interval.
        let conf: Vec<f64> = forecast.iter().map(|f| self.confidence_fraction * f).collect();
        let lower = forecast.iter().zip(&conf).map(|(f, c)| f - c).collect();
        let upper = forecast.iter().zip(&conf).map(|(f, c)| f + c).collect();

        Ok(ForecastResult {
            index: business_days_after(self.last_date, steps),
            actual: None,
            forecast,
            lower_bound: Some(lower),
            upper_bound: Some(upper),
        })
    }
}
