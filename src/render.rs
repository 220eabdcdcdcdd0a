//! Plotly figure descriptions.
//!
//! The server never draws anything; it emits figure JSON in the shape
//! `Plotly.newPlot(el, fig.data, fig.layout)` expects.

use crate::data::{FeatureSeries, PriceField, StockData};
use crate::forecast::ForecastResult;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const VOLUME_COLOR: &str = "rgba(0, 100, 250, 0.5)";
pub const BAND_COLOR: &str = "rgba(0, 100, 250, 0.2)";
const BAND_EDGE: &str = "rgba(255, 255, 255, 0)";

/// Per-ticker chart choice on the dashboard.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    #[default]
    #[serde(alias = "candle")]
    Candlestick,
    #[serde(rename = "line", alias = "line_plot")]
    LinePlot,
}

#[derive(Clone, Debug, Serialize)]
pub struct Figure {
    pub data: Vec<Trace>,
    pub layout: Layout,
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Trace {
    Candlestick(CandlestickTrace),
    Bar(BarTrace),
    Scatter(ScatterTrace),
}

#[derive(Clone, Debug, Serialize)]
pub struct CandlestickTrace {
    pub name: String,
    pub x: Vec<NaiveDate>,
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct BarTrace {
    pub name: String,
    pub x: Vec<NaiveDate>,
    pub y: Vec<f64>,
    pub yaxis: String,
    pub marker: Marker,
}

#[derive(Clone, Debug, Serialize)]
pub struct ScatterTrace {
    pub name: String,
    pub x: Vec<NaiveDate>,
    pub y: Vec<f64>,
    pub mode: String,
    pub line: Line,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fillcolor: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Marker {
    pub color: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct Line {
    pub color: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct Title {
    pub text: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct RangeSlider {
    pub visible: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct Axis {
    pub title: Title,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rangeslider: Option<RangeSlider>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlaying: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side: Option<String>,
}

impl Axis {
    fn titled(text: &str) -> Self {
        Self {
            title: title(text),
            rangeslider: None,
            overlaying: None,
            side: None,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Layout {
    pub title: Title,
    pub xaxis: Axis,
    pub yaxis: Axis,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub yaxis2: Option<Axis>,
    pub autosize: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plot_bgcolor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paper_bgcolor: Option<String>,
}

impl Layout {
    fn new(heading: String, x: Axis, y: Axis) -> Self {
        Self {
            title: Title { text: heading },
            xaxis: x,
            yaxis: y,
            yaxis2: None,
            autosize: true,
            plot_bgcolor: None,
            paper_bgcolor: None,
        }
    }
}

fn title(text: &str) -> Title {
    Title {
        text: text.to_string(),
    }
}

fn line(name: &str, x: Vec<NaiveDate>, y: Vec<f64>, color: &str) -> ScatterTrace {
    ScatterTrace {
        name: name.to_string(),
        x,
        y,
        mode: "lines".to_string(),
        line: Line {
            color: color.to_string(),
        },
        fill: None,
        fillcolor: None,
    }
}

pub fn chart_title(symbol: &str, kind: ChartKind) -> String {
    match kind {
        ChartKind::Candlestick => format!("Candlestick and Volume {}", symbol),
        ChartKind::LinePlot => format!("Line Plot {}", symbol),
    }
}

/// Price chart for one ticker on the dashboard.
pub fn price_chart(data: &StockData, kind: ChartKind) -> Figure {
    let dates: Vec<NaiveDate> = data.history.iter().map(|c| c.date).collect();
    let heading = chart_title(&data.symbol, kind);

    match kind {
        ChartKind::Candlestick => {
            let candles = CandlestickTrace {
                name: "Candlestick".to_string(),
                x: dates.clone(),
                open: data.history.iter().map(|c| c.open).collect(),
                high: data.history.iter().map(|c| c.high).collect(),
                low: data.history.iter().map(|c| c.low).collect(),
                close: data.history.iter().map(|c| c.close).collect(),
            };
            let volume = BarTrace {
                name: "Volume".to_string(),
                x: dates,
                y: data.history.iter().map(|c| c.volume).collect(),
                yaxis: "y2".to_string(),
                marker: Marker {
                    color: VOLUME_COLOR.to_string(),
                },
            };

            let mut xaxis = Axis::titled("Date");
            xaxis.rangeslider = Some(RangeSlider { visible: false });
            let mut layout = Layout::new(heading, xaxis, Axis::titled("Price"));
            layout.yaxis2 = Some(Axis {
                overlaying: Some("y".to_string()),
                side: Some("right".to_string()),
                ..Axis::titled("Volume")
            });

            Figure {
                data: vec![Trace::Candlestick(candles), Trace::Bar(volume)],
                layout,
            }
        }
        ChartKind::LinePlot => Figure {
            data: vec![
                Trace::Scatter(line(
                    "Open Price",
                    dates.clone(),
                    data.history.iter().map(|c| c.open).collect(),
                    "royalblue",
                )),
                Trace::Scatter(line(
                    "Close Price",
                    dates,
                    data.history.iter().map(|c| c.close).collect(),
                    "firebrick",
                )),
            ],
            layout: Layout::new(heading, Axis::titled("Date"), Axis::titled("Price")),
        },
    }
}

pub fn forecast_title(symbol: &str, field: PriceField) -> String {
    format!("{} Price - Forecast of {} Stock", field.label(), symbol)
}

/// History, a shaded interval polygon and the forecast line.
///
/// Without bounds in `result` the polygon is left out.
pub fn forecast_band_chart(
    symbol: &str,
    field: PriceField,
    history: &FeatureSeries,
    result: &ForecastResult,
) -> Figure {
    let mut traces = Vec::with_capacity(3);
    if !history.is_empty() {
        traces.push(Trace::Scatter(line(
            "Historical Data",
            history.dates.clone(),
            history.values.clone(),
            "royalblue",
        )));
    }

    if let (Some(lower), Some(upper)) = (&result.lower_bound, &result.upper_bound) {
        // Closed outline: along the lower bound, back along the upper.
        let x: Vec<NaiveDate> = result
            .index
            .iter()
            .chain(result.index.iter().rev())
            .copied()
            .collect();
        let y: Vec<f64> = lower.iter().chain(upper.iter().rev()).copied().collect();
        let mut band = line("Forecast Interval", x, y, BAND_EDGE);
        band.fill = Some("toself".to_string());
        band.fillcolor = Some(BAND_COLOR.to_string());
        traces.push(Trace::Scatter(band));
    }

    traces.push(Trace::Scatter(line(
        "Forecast",
        result.index.clone(),
        result.forecast.clone(),
        "red",
    )));

    let mut layout = Layout::new(
        forecast_title(symbol, field),
        Axis::titled("Date"),
        Axis::titled(field.label()),
    );
    layout.plot_bgcolor = Some("rgba(0,0,0,0)".to_string());
    layout.paper_bgcolor = Some("rgba(240,240,240,0.8)".to_string());

    Figure {
        data: traces,
        layout,
    }
}

/// Held-out actuals against predictions.
pub fn actual_vs_forecast_chart(symbol: &str, result: &ForecastResult) -> Figure {
    let mut traces = Vec::with_capacity(2);
    if let Some(actual) = &result.actual {
        traces.push(Trace::Scatter(line(
            "Actual",
            result.index.clone(),
            actual.clone(),
            "royalblue",
        )));
    }
    traces.push(Trace::Scatter(line(
        "Forecast",
        result.index.clone(),
        result.forecast.clone(),
        "darkorange",
    )));

    Figure {
        data: traces,
        layout: Layout::new(
            format!("Stock Price Forecast {}", symbol),
            Axis::titled("Date"),
            Axis::titled("Price"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::tests::series_from_closes;
    use serde_json::json;

    #[test]
    fn test_candlestick_chart_has_volume_on_right_axis() {
        let data = series_from_closes("AAPL", &[10.0, 11.0, 12.0]);
        let fig = serde_json::to_value(price_chart(&data, ChartKind::Candlestick)).unwrap();

        assert_eq!(fig["data"][0]["type"], "candlestick");
        assert_eq!(fig["data"][0]["close"], json!([10.0, 11.0, 12.0]));
        assert_eq!(fig["data"][1]["type"], "bar");
        assert_eq!(fig["data"][1]["yaxis"], "y2");
        assert_eq!(fig["data"][1]["marker"]["color"], VOLUME_COLOR);
        assert_eq!(fig["layout"]["yaxis2"]["overlaying"], "y");
        assert_eq!(fig["layout"]["yaxis2"]["side"], "right");
        assert_eq!(fig["layout"]["xaxis"]["rangeslider"]["visible"], false);
        assert_eq!(fig["layout"]["title"]["text"], "Candlestick and Volume AAPL");
        assert_eq!(fig["data"][0]["x"][0], "2024-03-01");
    }

    #[test]
    fn test_line_plot_has_open_and_close() {
        let data = series_from_closes("MSFT", &[10.0, 11.0]);
        let fig = serde_json::to_value(price_chart(&data, ChartKind::LinePlot)).unwrap();

        let traces = fig["data"].as_array().unwrap();
        assert_eq!(traces.len(), 2);
        assert_eq!(traces[0]["name"], "Open Price");
        assert_eq!(traces[0]["line"]["color"], "royalblue");
        assert_eq!(traces[0]["y"], json!([9.0, 10.0]));
        assert_eq!(traces[1]["name"], "Close Price");
        assert_eq!(traces[1]["line"]["color"], "firebrick");
        assert!(fig["layout"].get("yaxis2").is_none());
    }

    #[test]
    fn test_chart_kind_wire_names() {
        let kind: ChartKind = serde_json::from_value(json!("line")).unwrap();
        assert_eq!(kind, ChartKind::LinePlot);
        let kind: ChartKind = serde_json::from_value(json!("candlestick")).unwrap();
        assert_eq!(kind, ChartKind::Candlestick);
        assert_eq!(ChartKind::default(), ChartKind::Candlestick);
    }

    #[test]
    fn test_forecast_band_polygon_is_closed() {
        let d = |day| NaiveDate::from_ymd_opt(2024, 6, day).unwrap();
        let history = FeatureSeries {
            dates: vec![d(6), d(7)],
            values: vec![100.0, 101.0],
        };
        let result = ForecastResult {
            index: vec![d(10), d(11)],
            actual: None,
            forecast: vec![100.0, 200.0],
            lower_bound: Some(vec![98.0, 196.0]),
            upper_bound: Some(vec![102.0, 204.0]),
        };
        let fig = serde_json::to_value(forecast_band_chart("GOOGL", PriceField::High, &history, &result)).unwrap();

        let band = &fig["data"][1];
        assert_eq!(band["fill"], "toself");
        assert_eq!(band["fillcolor"], BAND_COLOR);
        assert_eq!(band["x"], json!(["2024-06-10", "2024-06-11", "2024-06-11", "2024-06-10"]));
        assert_eq!(band["y"], json!([98.0, 196.0, 204.0, 102.0]));
        assert_eq!(fig["data"][2]["line"]["color"], "red");
        assert_eq!(fig["layout"]["title"]["text"], "High Price - Forecast of GOOGL Stock");
        assert_eq!(fig["layout"]["yaxis"]["title"]["text"], "High");
    }

    #[test]
    fn test_actual_vs_forecast_chart() {
        let d = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        let result = ForecastResult {
            index: vec![d],
            actual: Some(vec![5.0]),
            forecast: vec![5.5],
            lower_bound: None,
            upper_bound: None,
        };
        let fig = serde_json::to_value(actual_vs_forecast_chart("TSLA", &result)).unwrap();
        assert_eq!(fig["data"][0]["name"], "Actual");
        assert_eq!(fig["data"][1]["name"], "Forecast");
        assert_eq!(fig["data"][1]["y"], json!([5.5]));
    }
}
