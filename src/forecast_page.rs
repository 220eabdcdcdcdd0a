use crate::config::AppConfig;
use crate::dashboard::format_price;
use crate::data::{self, Lookback, PriceField, StockData};
use crate::error::DashError;
use crate::forecast::{
    fit_and_forecast, ExponentialSmoothingForecaster, FittedForecaster, Forecaster, Horizon,
    LagRegressionForecaster,
};
use crate::render::{self, Figure};
use crate::tickers::parse_tickers;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

pub const FORECAST_PAGE_TITLE: &str = "Stock Price Forecasting";
pub const NOT_ENOUGH_DATA: &str = "Not enough data to forecast.";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelChoice {
    /// Holt-Winters per OHLC feature over a 1y lookback.
    #[default]
    ExponentialSmoothing,
    /// Lag-1 random forest on the close of a 2y lookback.
    LagRegression,
}

impl ModelChoice {
    pub fn lookback(self) -> Lookback {
        match self {
            Self::ExponentialSmoothing => Lookback::OneYear,
            Self::LagRegression => Lookback::TwoYears,
        }
    }

    pub fn from_setting(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "exponential_smoothing" | "smoothing" | "holt_winters" | "hw" => Some(Self::ExponentialSmoothing),
            "lag_regression" | "forest" | "random_forest" | "rf" => Some(Self::LagRegression),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ForecastRequest {
    #[serde(default)]
    pub tickers: String,
    #[serde(default)]
    pub model: Option<ModelChoice>,
}

/// One chart, or a notice explaining why there is none.
#[derive(Clone, Debug, Serialize)]
pub struct ForecastPanel {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature: Option<PriceField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub figure: Option<Figure>,
    /// One-line digest of the forecast, also used by the CLI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
}

impl ForecastPanel {
    fn chart(title: String, feature: Option<PriceField>, figure: Figure, summary: String) -> Self {
        Self {
            title,
            feature,
            figure: Some(figure),
            summary: Some(summary),
            notice: None,
            error: None,
            error_kind: None,
        }
    }

    /// `InsufficientHistory` becomes a notice; anything else an error.
    fn failed(title: String, feature: Option<PriceField>, err: DashError) -> Self {
        let error_kind = Some(err.kind());
        let (notice, error) = match err {
            DashError::InsufficientHistory { .. } => (Some(NOT_ENOUGH_DATA.to_string()), None),
            other => (None, Some(other.to_string())),
        };
        Self {
            title,
            feature,
            figure: None,
            summary: None,
            notice,
            error,
            error_kind,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ForecastView {
    pub title: &'static str,
    pub ticker: Option<String>,
    pub model: ModelChoice,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub panels: Vec<ForecastPanel>,
}

impl ForecastView {
    fn empty(ticker: Option<String>, model: ModelChoice) -> Self {
        Self {
            title: FORECAST_PAGE_TITLE,
            ticker,
            model,
            error: None,
            panels: Vec::new(),
        }
    }
}

/// A panel per OHLC feature, each fitted independently.
pub fn smoothing_panels(data: &StockData, cfg: &AppConfig) -> Vec<ForecastPanel> {
    let forecaster = ExponentialSmoothingForecaster {
        seasonal_period: cfg.seasonal_period,
        confidence_fraction: cfg.confidence_fraction,
    };

    PriceField::ALL
        .iter()
        .map(|&field| {
            let title = render::forecast_title(&data.symbol, field);
            let series = data.column(field);
            match fit_and_forecast(&forecaster, &series, Horizon::BusinessDays(cfg.forecast_horizon)) {
                Ok(result) => {
                    let summary = match (result.index.last(), result.forecast.last()) {
                        (Some(date), Some(value)) => format!(
                            "{} {}: {} on {} (±{:.0}%)",
                            data.symbol,
                            field.label(),
                            format_price(*value),
                            date,
                            cfg.confidence_fraction * 100.0
                        ),
                        _ => format!("{} {}: empty forecast", data.symbol, field.label()),
                    };
                    let figure = render::forecast_band_chart(&data.symbol, field, &series, &result);
                    ForecastPanel::chart(title, Some(field), figure, summary)
                }
                Err(e) => {
                    warn!("{} {}: {}", data.symbol, field.label(), e);
                    ForecastPanel::failed(title, Some(field), e)
                }
            }
        })
        .collect()
}

/// Held-out actual vs forecast on the close, plus the next-session prediction.
pub fn lag_regression_panels(data: &StockData, cfg: &AppConfig) -> Vec<ForecastPanel> {
    let title = format!("Stock Price Forecast {}", data.symbol);
    let forecaster = LagRegressionForecaster::new(cfg.forest_trees, cfg.forest_seed);
    let series = data.column(PriceField::Close);

    let outcome = forecaster.fit(&series).and_then(|fitted| {
        let held_out = fitted.forecast(Horizon::HeldOut)?;
        let next = fitted.forecast(Horizon::BusinessDays(1))?;
        Ok((held_out, next))
    });

    let panel = match outcome {
        Ok((held_out, next)) => {
            let summary = match (next.index.first(), next.forecast.first()) {
                (Some(date), Some(value)) => format!(
                    "{} next close ({}): {} from {} test points",
                    data.symbol,
                    date,
                    format_price(*value),
                    held_out.forecast.len()
                ),
                _ => format!("{}: {} test points", data.symbol, held_out.forecast.len()),
            };
            let figure = render::actual_vs_forecast_chart(&data.symbol, &held_out);
            ForecastPanel::chart(title, Some(PriceField::Close), figure, summary)
        }
        Err(e) => {
            warn!("{} lag regression: {}", data.symbol, e);
            ForecastPanel::failed(title, Some(PriceField::Close), e)
        }
    };
    vec![panel]
}

pub fn build_panels(data: &StockData, model: ModelChoice, cfg: &AppConfig) -> Vec<ForecastPanel> {
    match model {
        ModelChoice::ExponentialSmoothing => smoothing_panels(data, cfg),
        ModelChoice::LagRegression => lag_regression_panels(data, cfg),
    }
}

/// Forecasts the first ticker in the request.
///
/// Fitting runs on the blocking pool; the forest fans out further onto rayon.
pub async fn render_forecast(request: &ForecastRequest, cfg: &AppConfig) -> ForecastView {
    let model = request.model.unwrap_or_default();
    let Some(ticker) = parse_tickers(&request.tickers).into_iter().next() else {
        return ForecastView::empty(None, model);
    };

    let mut view = ForecastView::empty(Some(ticker.clone()), model);
    let data = match data::fetch_range(&ticker, model.lookback(), &cfg.fetch).await {
        Ok(data) => data,
        Err(e) => {
            warn!("Forecast fetch for {} failed: {}", ticker, e);
            view.error = Some(e.to_string());
            return view;
        }
    };

    info!(
        "Forecasting {} with {:?} over {} records",
        ticker,
        model,
        data.history.len()
    );
    let cfg = cfg.clone();
    match tokio::task::spawn_blocking(move || build_panels(&data, model, &cfg)).await {
        Ok(panels) => view.panels = panels,
        Err(e) => view.error = Some(format!("forecast task failed: {}", e)),
    }
    view
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FetchConfig;
    use crate::data::tests::series_from_closes;
    use crate::data::DataProvider;

    fn mock_config() -> AppConfig {
        AppConfig {
            forest_trees: 10,
            fetch: FetchConfig {
                provider: DataProvider::Mock,
                ..FetchConfig::default()
            },
            ..AppConfig::default()
        }
    }

    #[test]
    fn test_short_series_gets_a_notice_per_feature() {
        let closes: Vec<f64> = (0..10).map(|i| 100.0 + i as f64).collect();
        let data = series_from_closes("GOOGL", &closes);
        let panels = smoothing_panels(&data, &AppConfig::default());

        assert_eq!(panels.len(), 4);
        for (panel, field) in panels.iter().zip(PriceField::ALL) {
            assert_eq!(panel.feature, Some(field));
            assert_eq!(panel.notice.as_deref(), Some(NOT_ENOUGH_DATA));
            assert!(panel.figure.is_none());
            assert!(panel.error.is_none());
        }
    }

    #[test]
    fn test_smoothing_panels_cover_all_features() {
        let data = StockData::new_mock("GOOGL", 120);
        let panels = smoothing_panels(&data, &AppConfig::default());

        let titles: Vec<&str> = panels.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(
            titles,
            vec![
                "Open Price - Forecast of GOOGL Stock",
                "High Price - Forecast of GOOGL Stock",
                "Low Price - Forecast of GOOGL Stock",
                "Close Price - Forecast of GOOGL Stock",
            ]
        );
        assert!(panels.iter().all(|p| p.figure.is_some() && p.notice.is_none()));
    }

    #[test]
    fn test_lag_regression_panel() {
        let data = StockData::new_mock("AAPL", 60);
        let panels = lag_regression_panels(&data, &mock_config());
        assert_eq!(panels.len(), 1);
        assert_eq!(panels[0].title, "Stock Price Forecast AAPL");
        assert!(panels[0].figure.is_some());
        assert!(panels[0].summary.as_deref().unwrap().contains("12 test points"));

        let short = series_from_closes("AAPL", &[1.0, 2.0]);
        let panels = lag_regression_panels(&short, &mock_config());
        assert_eq!(panels[0].notice.as_deref(), Some(NOT_ENOUGH_DATA));
        assert_eq!(panels[0].error_kind, Some("insufficient_history"));
    }

    #[test]
    fn test_model_choice_settings() {
        assert_eq!(ModelChoice::from_setting("lag-regression"), Some(ModelChoice::LagRegression));
        assert_eq!(ModelChoice::from_setting("HW"), Some(ModelChoice::ExponentialSmoothing));
        assert_eq!(ModelChoice::from_setting("arima"), None);
        assert_eq!(ModelChoice::LagRegression.lookback(), Lookback::TwoYears);
    }

    #[tokio::test]
    async fn test_render_forecast_uses_first_ticker() {
        let request = ForecastRequest {
            tickers: "msft, googl".to_string(),
            model: Some(ModelChoice::LagRegression),
        };
        let view = render_forecast(&request, &mock_config()).await;
        assert_eq!(view.ticker.as_deref(), Some("MSFT"));
        assert_eq!(view.model, ModelChoice::LagRegression);
        assert!(view.error.is_none());
        assert_eq!(view.panels.len(), 1);

        let empty = render_forecast(&ForecastRequest::default(), &mock_config()).await;
        assert!(empty.ticker.is_none());
        assert!(empty.panels.is_empty());
    }
}
