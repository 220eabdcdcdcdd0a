use crate::data::DataProvider;
use rayon::ThreadPoolBuilder;
use serde::Serialize;
use std::sync::OnceLock;
use tracing::{info, warn};

static RAYON_INIT: OnceLock<()> = OnceLock::new();

pub fn init_cpu_parallelism() {
    RAYON_INIT.get_or_init(|| {
        let num_threads = num_cpus::get().max(1);
        match ThreadPoolBuilder::new().num_threads(num_threads).build_global() {
            Ok(_) => info!(
                "Initialized Rayon thread pool with {} threads (all logical CPU cores)",
                num_threads
            ),
            Err(e) => warn!(
                "Rayon thread pool already initialized or unavailable ({}). Using existing configuration.",
                e
            ),
        }
    });
}

// ── Dashboard ───────────────────────────────────────────────────────────────
pub const DASHBOARD_TITLE: &str = "Stock Price Dash";
pub const DEFAULT_DASHBOARD_TICKERS: &str = "GOOGL, AAPL, MSFT, NVDA, TSLA, INTC";
pub const DEFAULT_FORECAST_TICKER: &str = "GOOGL";

// ── Forecasting ─────────────────────────────────────────────────────────────
/// Season length for Holt-Winters. A full trading year (252) cannot be
/// seeded from a 1y lookback, which holds less than two seasons.
pub const SEASONAL_PERIOD: usize = 20;
/// Business days forecast by the smoothing model.
pub const FORECAST_HORIZON: usize = 40;
pub const SEASONAL_PERIOD_RANGE: (usize, usize) = (2, 512);
pub const FORECAST_HORIZON_RANGE: (usize, usize) = (1, 520);
/// Half-width of the forecast band as a fraction of the forecast value.
pub const CONFIDENCE_FRACTION: f64 = 0.02;
/// A feature column needs strictly more values than this to be forecast.
pub const MIN_SMOOTHING_POINTS: usize = 10;
/// Percentage of rows (rounded up) held out as the test segment.
pub const TEST_PERCENT: usize = 20;
pub const FOREST_TREES: usize = 100;
pub const FOREST_MIN_SAMPLES_SPLIT: usize = 2;
pub const FOREST_SEED: u64 = 42;

// ── Market data ─────────────────────────────────────────────────────────────
pub const YAHOO_CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";
pub const FETCH_ATTEMPTS: usize = 3;
pub const FETCH_TIMEOUT_SECS: u64 = 15;
pub const BATCH_FETCH_DELAY_MS: u64 = 250;
/// Retry `n` waits `n` times this long.
pub const RETRY_BACKOFF_MS: u64 = 500;

/// Knobs for the market data fetcher.
#[derive(Clone, Debug, Serialize)]
pub struct FetchConfig {
    pub provider: DataProvider,
    /// Chart endpoint; the symbol is appended as the last path segment.
    pub base_url: String,
    pub attempts: usize,
    pub timeout_secs: u64,
    pub batch_delay_ms: u64,
    pub retry_backoff_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            provider: DataProvider::Yahoo,
            base_url: YAHOO_CHART_URL.to_string(),
            attempts: FETCH_ATTEMPTS,
            timeout_secs: FETCH_TIMEOUT_SECS,
            batch_delay_ms: BATCH_FETCH_DELAY_MS,
            retry_backoff_ms: RETRY_BACKOFF_MS,
        }
    }
}

/// Runtime configuration shared by every render pass.
#[derive(Clone, Debug, Serialize)]
pub struct AppConfig {
    pub seasonal_period: usize,
    pub forecast_horizon: usize,
    pub confidence_fraction: f64,
    pub forest_trees: usize,
    pub forest_seed: u64,
    pub fetch: FetchConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            seasonal_period: SEASONAL_PERIOD,
            forecast_horizon: FORECAST_HORIZON,
            confidence_fraction: CONFIDENCE_FRACTION,
            forest_trees: FOREST_TREES,
            forest_seed: FOREST_SEED,
            fetch: FetchConfig::default(),
        }
    }
}

impl AppConfig {
    /// Defaults overridden by `STOCKDASH_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let cfg = Self {
            seasonal_period: env_parse("STOCKDASH_SEASONAL_PERIOD", defaults.seasonal_period),
            forecast_horizon: env_parse("STOCKDASH_FORECAST_HORIZON", defaults.forecast_horizon),
            confidence_fraction: defaults.confidence_fraction,
            forest_trees: env_parse("STOCKDASH_FOREST_TREES", defaults.forest_trees).clamp(1, 1_000),
            forest_seed: env_parse("STOCKDASH_FOREST_SEED", defaults.forest_seed),
            fetch: FetchConfig {
                provider: std::env::var("STOCKDASH_DATA_PROVIDER")
                    .map(|v| DataProvider::from_setting(&v))
                    .unwrap_or(defaults.fetch.provider),
                base_url: std::env::var("STOCKDASH_CHART_URL")
                    .ok()
                    .map(|v| v.trim().trim_end_matches('/').to_string())
                    .filter(|v| !v.is_empty())
                    .unwrap_or(defaults.fetch.base_url),
                attempts: env_parse("STOCKDASH_FETCH_ATTEMPTS", defaults.fetch.attempts).clamp(1, 8),
                timeout_secs: defaults.fetch.timeout_secs,
                batch_delay_ms: env_parse(
                    "STOCKDASH_BATCH_FETCH_DELAY_MS",
                    defaults.fetch.batch_delay_ms,
                )
                .clamp(0, 5_000),
                retry_backoff_ms: defaults.fetch.retry_backoff_ms,
            },
        };
        cfg.with_overrides(None, None)
    }

    /// Applies optional horizon and season overrides, then clamps both to
    /// their supported ranges.
    pub fn with_overrides(mut self, horizon: Option<usize>, seasonal_period: Option<usize>) -> Self {
        let (h_min, h_max) = FORECAST_HORIZON_RANGE;
        let (s_min, s_max) = SEASONAL_PERIOD_RANGE;
        self.forecast_horizon = horizon.unwrap_or(self.forecast_horizon).clamp(h_min, h_max);
        self.seasonal_period = seasonal_period.unwrap_or(self.seasonal_period).clamp(s_min, s_max);
        self
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => parse_or_default(key, &raw, default),
        Err(_) => default,
    }
}

fn parse_or_default<T>(key: &str, raw: &str, default: T) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Display,
{
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return default;
    }
    match trimmed.parse::<T>() {
        Ok(v) => v,
        Err(_) => {
            warn!("Unparsable {}={} ; defaulting to {}", key, trimmed, default);
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_or_default() {
        assert_eq!(parse_or_default("K", " 30 ", 40usize), 30);
        assert_eq!(parse_or_default("K", "", 40usize), 40);
        assert_eq!(parse_or_default("K", "many", 40usize), 40);
        assert_eq!(parse_or_default("K", "7", 1u64), 7);
    }

    #[test]
    fn test_defaults_match_forecast_page() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.seasonal_period, 20);
        assert_eq!(cfg.forecast_horizon, 40);
        assert_eq!(cfg.forest_trees, 100);
        assert!((cfg.confidence_fraction - 0.02).abs() < 1e-12);
        assert_eq!(cfg.fetch.base_url, YAHOO_CHART_URL);
    }

    #[test]
    fn test_overrides_are_clamped() {
        let cfg = AppConfig::default().with_overrides(Some(100_000_000), Some(100_000));
        assert_eq!(cfg.forecast_horizon, 520);
        assert_eq!(cfg.seasonal_period, 512);

        let cfg = AppConfig::default().with_overrides(Some(0), Some(1));
        assert_eq!(cfg.forecast_horizon, 1);
        assert_eq!(cfg.seasonal_period, 2);

        let cfg = AppConfig::default().with_overrides(None, Some(30));
        assert_eq!(cfg.forecast_horizon, FORECAST_HORIZON);
        assert_eq!(cfg.seasonal_period, 30);
    }
}
