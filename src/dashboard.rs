use crate::config::{AppConfig, DASHBOARD_TITLE};
use crate::data::{self, Lookback, StockData};
use crate::error::{DashError, Result};
use crate::render::{self, ChartKind, Figure};
use crate::tickers::{logo_url, parse_tickers};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::info;

pub const UP_COLOR: &str = "green";
pub const DOWN_COLOR: &str = "red";
pub const GAIN_COLOR: &str = "#4CAF50";
pub const LOSS_COLOR: &str = "#F44336";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// Equal closes count as `Down`.
    pub fn between(previous: f64, current: f64) -> Self {
        if current > previous { Self::Up } else { Self::Down }
    }

    pub fn color(self) -> &'static str {
        match self {
            Self::Up => UP_COLOR,
            Self::Down => DOWN_COLOR,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Up => "Up",
            Self::Down => "Down",
        }
    }
}

/// Intraday move of the latest session.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MarketSummary {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub change_pct: f64,
    pub change_color: &'static str,
    pub change_text: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SummaryCard {
    pub ticker: String,
    pub current: f64,
    pub previous: f64,
    pub direction: Direction,
    pub color: &'static str,
    pub logo_url: &'static str,
    pub last_date: NaiveDate,
    pub market: MarketSummary,
}

pub fn summarize(data: &StockData) -> Result<SummaryCard> {
    let [.., prev, last] = data.history.as_slice() else {
        return Err(DashError::InsufficientHistory {
            needed: 2,
            got: data.history.len(),
        });
    };

    let direction = Direction::between(prev.close, last.close);
    let change_pct = if last.open != 0.0 {
        (last.close - last.open) / last.open * 100.0
    } else {
        0.0
    };
    let (change_color, change_text) = if change_pct >= 0.0 {
        (GAIN_COLOR, format!("+{:.2}%", change_pct))
    } else {
        (LOSS_COLOR, format!("{:.2}%", change_pct))
    };

    Ok(SummaryCard {
        ticker: data.symbol.clone(),
        current: last.close,
        previous: prev.close,
        direction,
        color: direction.color(),
        logo_url: logo_url(&data.symbol),
        last_date: last.date,
        market: MarketSummary {
            date: last.date,
            open: last.open,
            high: last.high,
            low: last.low,
            close: last.close,
            change_pct,
            change_color,
            change_text,
        },
    })
}

/// `1234.5` -> `$1,234.50`.
pub fn format_price(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{}${}.{}", sign, grouped, frac_part)
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn card_html(card: &SummaryCard) -> String {
    format!(
        r#"<div class="card">
  <h3>{ticker}</h3>
  <img src="{logo}" width="100" alt="{ticker} logo" />
  <p>Current Price: {price}</p>
  <p style="color:{color}; font-weight:bold;">{direction}</p>
</div>"#,
        ticker = escape_html(&card.ticker),
        logo = escape_html(card.logo_url),
        price = format_price(card.current),
        color = card.color,
        direction = card.direction.label(),
    )
}

pub fn market_summary_html(market: &MarketSummary) -> String {
    format!(
        r#"<div class="market-summary">
  <h2>Market Summary</h2>
  <p>Date: <strong>{date}</strong></p>
  <div class="change" style="background-color:{color};"><strong>Change:</strong> {change}</div>
  <div class="ohlc">
    <p><strong>Open:</strong> {open}</p>
    <p><strong>High:</strong> {high}</p>
    <p><strong>Close:</strong> {close}</p>
    <p><strong>Low:</strong> {low}</p>
  </div>
</div>"#,
        date = market.date.format("%Y-%m-%d"),
        color = market.change_color,
        change = market.change_text,
        open = format_price(market.open),
        high = format_price(market.high),
        close = format_price(market.close),
        low = format_price(market.low),
    )
}

pub fn error_card_html(ticker: &str, err: &DashError) -> String {
    format!(
        r#"<div class="card card-error">
  <h3>{}</h3>
  <p>{}</p>
</div>"#,
        escape_html(ticker),
        escape_html(&err.to_string()),
    )
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct DashboardRequest {
    #[serde(default)]
    pub tickers: String,
    #[serde(default)]
    pub period: Lookback,
    /// Chart choice per upper-cased ticker; missing tickers get the
    /// candlestick chart.
    #[serde(default, deserialize_with = "deserialize_chart_choices")]
    pub charts: HashMap<String, ChartKind>,
}

impl DashboardRequest {
    pub fn chart_for(&self, ticker: &str) -> ChartKind {
        self.charts.get(ticker).copied().unwrap_or_default()
    }
}

/// Keys are trimmed and upper-cased like tickers. When two keys collide the
/// first in byte order wins, so `"AAPL"` beats `"aapl"`.
fn normalize_chart_choices(raw: BTreeMap<String, ChartKind>) -> HashMap<String, ChartKind> {
    let mut charts = HashMap::with_capacity(raw.len());
    for (key, kind) in raw {
        let key = key.trim().to_uppercase();
        if !key.is_empty() {
            charts.entry(key).or_insert(kind);
        }
    }
    charts
}

fn deserialize_chart_choices<'de, D>(deserializer: D) -> std::result::Result<HashMap<String, ChartKind>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    BTreeMap::deserialize(deserializer).map(normalize_chart_choices)
}

#[derive(Clone, Debug, Serialize)]
pub struct CardView {
    pub ticker: String,
    pub html: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<SummaryCard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ChartView {
    pub ticker: String,
    pub kind: ChartKind,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub figure: Option<Figure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct DashboardView {
    pub title: &'static str,
    pub period: Lookback,
    pub tickers: Vec<String>,
    pub cards: Vec<CardView>,
    pub charts: Vec<ChartView>,
}

fn card_view(ticker: &str, outcome: &Result<StockData>) -> CardView {
    match outcome.as_ref().map_err(Clone::clone).and_then(summarize) {
        Ok(summary) => CardView {
            ticker: ticker.to_string(),
            html: card_html(&summary),
            market_html: Some(market_summary_html(&summary.market)),
            summary: Some(summary),
            error: None,
            error_kind: None,
        },
        Err(e) => CardView {
            ticker: ticker.to_string(),
            html: error_card_html(ticker, &e),
            summary: None,
            market_html: None,
            error: Some(e.to_string()),
            error_kind: Some(e.kind()),
        },
    }
}

fn chart_view(ticker: &str, kind: ChartKind, outcome: &Result<StockData>) -> ChartView {
    let (figure, error) = match outcome {
        Ok(data) => (Some(render::price_chart(data, kind)), None),
        Err(e) => (None, Some(e.to_string())),
    };
    ChartView {
        ticker: ticker.to_string(),
        kind,
        title: render::chart_title(ticker, kind),
        figure,
        error,
    }
}

/// Cards first, then charts, both in input order; each entry carries its own
/// error instead of failing the whole view.
pub fn build_dashboard(request: &DashboardRequest, outcomes: &[(String, Result<StockData>)]) -> DashboardView {
    DashboardView {
        title: DASHBOARD_TITLE,
        period: request.period,
        tickers: outcomes.iter().map(|(t, _)| t.clone()).collect(),
        cards: outcomes.iter().map(|(t, o)| card_view(t, o)).collect(),
        charts: outcomes
            .iter()
            .map(|(t, o)| chart_view(t, request.chart_for(t), o))
            .collect(),
    }
}

/// Parses the ticker field, fetches every symbol and builds the view.
pub async fn render_dashboard(request: &DashboardRequest, cfg: &AppConfig) -> DashboardView {
    let tickers = parse_tickers(&request.tickers);
    if tickers.is_empty() {
        return build_dashboard(request, &[]);
    }
    info!("Dashboard for {} ({})", tickers.join(", "), request.period.as_range());
    let outcomes = data::fetch_all(&tickers, request.period, &cfg.fetch).await;
    build_dashboard(request, &outcomes)
}
