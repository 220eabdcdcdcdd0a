use crate::error::{DashError, Result};

/// Smoothing weights, each in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SmoothingParams {
    pub alpha: f64,
    pub beta: f64,
    /// Ignored by the non-seasonal fallback.
    pub gamma: f64,
}

/// Additive trend, additive seasonality Holt-Winters model.
///
/// Needs two full seasons to initialise the seasonal states; with less
/// history it fits Holt's linear trend method instead.
#[derive(Clone, Debug)]
pub struct HoltWinters {
    params: SmoothingParams,
    level: f64,
    trend: f64,
    /// Circular buffer; `season[t % m]` is the state used at time `t`.
    season: Vec<f64>,
    observations: usize,
    sse: f64,
}

#[derive(Clone, Debug)]
struct InitialState {
    level: f64,
    trend: f64,
    season: Vec<f64>,
}

struct FilterOutput {
    sse: f64,
    level: f64,
    trend: f64,
    season: Vec<f64>,
}

impl InitialState {
    /// States at time -1, so the first fitted value is `level + trend + season[0]`.
    ///
    /// Seasonal: level and trend from the means of the first two seasons, and
    /// seasonal offsets measured against that trend line. Otherwise the line
    /// through the first two observations.
    fn estimate(values: &[f64], period: usize) -> Self {
        if period >= 2 && values.len() >= 2 * period {
            let m = period as f64;
            let first = mean(&values[..period]);
            let second = mean(&values[period..2 * period]);
            let trend = (second - first) / m;
            // `first` sits at the middle of the first season.
            let centre = (m - 1.0) / 2.0;
            Self {
                level: first - (centre + 1.0) * trend,
                trend,
                season: values[..period]
                    .iter()
                    .enumerate()
                    .map(|(i, v)| v - (first + (i as f64 - centre) * trend))
                    .collect(),
            }
        } else {
            let trend = values[1] - values[0];
            Self {
                level: values[0] - trend,
                trend,
                season: Vec::new(),
            }
        }
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

fn run_filter(values: &[f64], init: &InitialState, p: SmoothingParams) -> FilterOutput {
    let mut level = init.level;
    let mut trend = init.trend;
    let mut season = init.season.clone();
    let m = season.len();
    let mut sse = 0.0;

    for (t, &y) in values.iter().enumerate() {
        let s = if m > 0 { season[t % m] } else { 0.0 };
        let fitted = level + trend + s;
        sse += (y - fitted).powi(2);

        let new_level = p.alpha * (y - s) + (1.0 - p.alpha) * (level + trend);
        let new_trend = p.beta * (new_level - level) + (1.0 - p.beta) * trend;
        if m > 0 {
            season[t % m] = p.gamma * (y - level - trend) + (1.0 - p.gamma) * s;
        }
        level = new_level;
        trend = new_trend;
    }

    FilterOutput {
        sse,
        level,
        trend,
        season,
    }
}

/// Coarse grid followed by a shrinking coordinate pattern search.
fn optimise(values: &[f64], init: &InitialState) -> (SmoothingParams, f64) {
    let seasonal = !init.season.is_empty();
    let grid: Vec<f64> = (0..10).map(|i| 0.05 + 0.1 * i as f64).collect();
    let gammas: Vec<f64> = if seasonal { grid.clone() } else { vec![0.0] };

    let sse_of = |p: SmoothingParams| {
        let sse = run_filter(values, init, p).sse;
        if sse.is_finite() { sse } else { f64::INFINITY }
    };

    let mut best = SmoothingParams {
        alpha: 0.5,
        beta: 0.1,
        gamma: if seasonal { 0.1 } else { 0.0 },
    };
    let mut best_sse = sse_of(best);
    for &alpha in &grid {
        for &beta in &grid {
            for &gamma in &gammas {
                let p = SmoothingParams { alpha, beta, gamma };
                let sse = sse_of(p);
                if sse < best_sse {
                    best = p;
                    best_sse = sse;
                }
            }
        }
    }

    let dims = if seasonal { 3 } else { 2 };
    let mut step = 0.05;
    while step > 1e-4 {
        let mut improved = false;
        for dim in 0..dims {
            for dir in [-1.0, 1.0] {
                let mut p = best;
                let field = match dim {
                    0 => &mut p.alpha,
                    1 => &mut p.beta,
                    _ => &mut p.gamma,
                };
                *field = (*field + dir * step).clamp(0.0, 1.0);
                let sse = sse_of(p);
                if sse < best_sse {
                    best = p;
                    best_sse = sse;
                    improved = true;
                }
            }
        }
        if !improved {
            step /= 2.0;
        }
    }

    (best, best_sse)
}

impl HoltWinters {
    /// Estimates initial states and smoothing weights by least squares on
    /// the one-step-ahead errors.
    pub fn fit(values: &[f64], seasonal_period: usize) -> Result<Self> {
        if values.len() < 2 {
            return Err(DashError::InsufficientHistory {
                needed: 2,
                got: values.len(),
            });
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(DashError::Model("series contains non-finite values".to_string()));
        }

        let init = InitialState::estimate(values, seasonal_period);
        let (params, _) = optimise(values, &init);
        Ok(Self::with_params(values, &init, params))
    }

    fn with_params(values: &[f64], init: &InitialState, params: SmoothingParams) -> Self {
        let out = run_filter(values, init, params);
        Self {
            params,
            level: out.level,
            trend: out.trend,
            season: out.season,
            observations: values.len(),
            sse: out.sse,
        }
    }

    /// Point forecasts for the next `steps` periods.
    pub fn forecast(&self, steps: usize) -> Vec<f64> {
        let m = self.season.len();
        (1..=steps)
            .map(|h| {
                let s = if m > 0 {
                    self.season[(self.observations + h - 1) % m]
                } else {
                    0.0
                };
                self.level + h as f64 * self.trend + s
            })
            .collect()
    }

    pub fn params(&self) -> SmoothingParams {
        self.params
    }

    pub fn is_seasonal(&self) -> bool {
        !self.season.is_empty()
    }

    pub fn sse(&self) -> f64 {
        self.sse
    }
}
