use crate::config::FetchConfig;
use crate::error::{DashError, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Weekday};
use rand::prelude::*;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataProvider {
    Yahoo,
    /// Deterministic synthetic series, for offline demos.
    Mock,
}

impl DataProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yahoo => "yahoo",
            Self::Mock => "mock",
        }
    }

    pub fn from_setting(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "yahoo" | "yfinance" => Self::Yahoo,
            "mock" | "offline" => Self::Mock,
            other => {
                warn!(
                    "Unknown STOCKDASH_DATA_PROVIDER={} ; defaulting to yahoo. Allowed values: yahoo | mock",
                    other
                );
                Self::Yahoo
            }
        }
    }
}

/// How far back to fetch daily history.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lookback {
    #[default]
    #[serde(rename = "1y")]
    OneYear,
    #[serde(rename = "2y")]
    TwoYears,
}

impl Lookback {
    pub fn as_range(self) -> &'static str {
        match self {
            Self::OneYear => "1y",
            Self::TwoYears => "2y",
        }
    }

    fn approx_trading_days(self) -> usize {
        match self {
            Self::OneYear => 252,
            Self::TwoYears => 504,
        }
    }
}

/// One daily OHLCV record.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Candle {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Date-ordered daily history for one symbol.
#[derive(Clone, Debug, Serialize)]
pub struct StockData {
    pub symbol: String,
    pub history: Vec<Candle>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
}

impl PriceField {
    pub const ALL: [PriceField; 4] = [Self::Open, Self::High, Self::Low, Self::Close];

    pub fn label(self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::High => "High",
            Self::Low => "Low",
            Self::Close => "Close",
        }
    }

    fn pick(self, candle: &Candle) -> f64 {
        match self {
            Self::Open => candle.open,
            Self::High => candle.high,
            Self::Low => candle.low,
            Self::Close => candle.close,
        }
    }
}

/// A single dated price column, the input every forecaster works on.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureSeries {
    pub dates: Vec<NaiveDate>,
    pub values: Vec<f64>,
}

impl FeatureSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }
}

impl StockData {
    pub fn column(&self, field: PriceField) -> FeatureSeries {
        let (dates, values) = self
            .history
            .iter()
            .filter(|c| field.pick(c).is_finite())
            .map(|c| (c.date, field.pick(c)))
            .unzip();
        FeatureSeries { dates, values }
    }

    /// Synthetic random walk over consecutive business days.
    ///
    /// The walk is seeded from the symbol, so the same symbol always yields
    /// the same series.
    pub fn new_mock(symbol: &str, days: usize) -> Self {
        let seed = symbol
            .bytes()
            .fold(0xcbf2_9ce4_8422_2325_u64, |h, b| (h ^ b as u64).wrapping_mul(0x100_0000_01b3));
        let mut rng = StdRng::seed_from_u64(seed);
        let mut history = Vec::with_capacity(days);
        let mut current_price: f64 = 50.0 + (seed % 250) as f64;
        let mut current_date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap_or(NaiveDate::MIN);

        for _ in 0..days {
            let z: f64 = rng.sample(StandardNormal);
            // 2% daily volatility with a slight upward drift
            let change_pct = 0.0005 + 0.02 * z;
            let open = current_price * (1.0 + rng.gen_range(-0.005..0.005));
            let close = open * (1.0 + change_pct);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
            let volume = rng.gen_range(1_000_000.0..10_000_000.0_f64).round();

            history.push(Candle {
                date: current_date,
                open,
                high,
                low,
                close,
                volume,
            });

            current_price = close;
            current_date = next_business_day(current_date);
        }

        Self {
            symbol: symbol.to_string(),
            history,
        }
    }
}

pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// First Monday-to-Friday date strictly after `date`.
pub fn next_business_day(date: NaiveDate) -> NaiveDate {
    let mut next = date + Duration::days(1);
    while !is_business_day(next) {
        next += Duration::days(1);
    }
    next
}

/// The `count` consecutive business days following `last`.
pub fn business_days_after(last: NaiveDate, count: usize) -> Vec<NaiveDate> {
    let mut out = Vec::with_capacity(count);
    let mut day = last;
    for _ in 0..count {
        day = next_business_day(day);
        out.push(day);
    }
    out
}

#[derive(Deserialize, Serialize, Debug)]
struct YahooChartResponse {
    chart: YahooChart,
}

#[derive(Deserialize, Serialize, Debug)]
struct YahooChart {
    result: Option<Vec<YahooResult>>,
    error: Option<YahooError>,
}

#[derive(Deserialize, Serialize, Debug)]
struct YahooError {
    code: Option<String>,
    description: Option<String>,
}

#[derive(Deserialize, Serialize, Debug)]
struct YahooResult {
    meta: Option<YahooMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: YahooIndicators,
}

#[derive(Deserialize, Serialize, Debug)]
struct YahooMeta {
    gmtoffset: Option<i64>,
}

#[derive(Deserialize, Serialize, Debug)]
struct YahooIndicators {
    quote: Vec<YahooQuote>,
    #[serde(default)]
    adjclose: Option<Vec<YahooAdjClose>>,
}

#[derive(Deserialize, Serialize, Debug)]
struct YahooAdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

#[derive(Deserialize, Serialize, Debug)]
struct YahooQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

/// Turns a Yahoo chart payload into a [`StockData`].
///
/// Rows with any missing field are skipped. A repeated trading date (Yahoo
/// appends a live bar during the session) keeps only the row that came last.
/// When the payload carries `adjclose`, open, high, low and close are scaled
/// by `adjclose / close` so prices are split and dividend adjusted.
pub fn parse_chart_response(symbol: &str, body: &str) -> Result<StockData> {
    let response: YahooChartResponse = serde_json::from_str(body)
        .map_err(|e| DashError::invalid_ticker(symbol, format!("unreadable chart payload: {}", e)))?;
    chart_to_stock_data(symbol, response)
}

fn chart_to_stock_data(symbol: &str, response: YahooChartResponse) -> Result<StockData> {
    if let Some(err) = response.chart.error {
        let reason = err
            .description
            .or(err.code)
            .unwrap_or_else(|| "chart error".to_string());
        return Err(DashError::invalid_ticker(symbol, reason));
    }

    let result = response
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| DashError::invalid_ticker(symbol, "No data found"))?;

    let quotes = result
        .indicators
        .quote
        .first()
        .ok_or_else(|| DashError::invalid_ticker(symbol, "No quote data"))?;
    let adjusted = result.indicators.adjclose.as_ref().and_then(|a| a.first());
    let offset = result.meta.and_then(|m| m.gmtoffset).unwrap_or(0);
    let timestamps = result.timestamp.unwrap_or_default();

    let mut history: Vec<Candle> = Vec::with_capacity(timestamps.len());
    for (i, &timestamp) in timestamps.iter().enumerate() {
        let field = |v: &Vec<Option<f64>>| v.get(i).copied().flatten();
        let (Some(open), Some(high), Some(low), Some(close), Some(volume)) = (
            field(&quotes.open),
            field(&quotes.high),
            field(&quotes.low),
            field(&quotes.close),
            field(&quotes.volume),
        ) else {
            continue;
        };
        let factor = match adjusted {
            Some(adj) => match field(&adj.adjclose) {
                Some(adj_close) if close != 0.0 => adj_close / close,
                _ => continue,
            },
            None => 1.0,
        };
        let Some(dt) = DateTime::from_timestamp(timestamp + offset, 0) else {
            continue;
        };
        history.push(Candle {
            date: dt.date_naive(),
            open: open * factor,
            high: high * factor,
            low: low * factor,
            close: close * factor,
            volume,
        });
    }

    // Stable, so rows sharing a date stay in payload order.
    history.sort_by_key(|c| c.date);
    let mut deduped: Vec<Candle> = Vec::with_capacity(history.len());
    for candle in history {
        match deduped.last_mut() {
            Some(prev) if prev.date == candle.date => *prev = candle,
            _ => deduped.push(candle),
        }
    }

    if deduped.is_empty() {
        return Err(DashError::invalid_ticker(symbol, "No complete OHLCV rows"));
    }

    Ok(StockData {
        symbol: symbol.to_uppercase(),
        history: deduped,
    })
}

/// Exchange symbols are letters and digits plus `.`, `^`, `=` and `-`
/// (`BRK.B`, `^GSPC`, `EURUSD=X`, `BTC-USD`).
fn check_symbol(symbol: &str) -> Result<()> {
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '.' | '^' | '=' | '-');
    if !symbol.chars().any(|c| c.is_ascii_alphanumeric()) {
        return Err(DashError::invalid_ticker(symbol, "symbol has no letters or digits"));
    }
    if let Some(bad) = symbol.chars().find(|&c| !allowed(c)) {
        return Err(DashError::invalid_ticker(
            symbol,
            format!("unsupported character {:?} in symbol", bad),
        ));
    }
    Ok(())
}

/// `<base>/<symbol>?range=..&interval=1d`, with the symbol percent-encoded
/// as a single path segment.
fn chart_url(base: &str, symbol: &str, lookback: Lookback) -> Result<reqwest::Url> {
    let mut url = reqwest::Url::parse(base)
        .map_err(|e| DashError::network(symbol, format!("bad chart URL {}: {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|_| DashError::network(symbol, format!("chart URL {} cannot take a path", base)))?
        .pop_if_empty()
        .push(symbol);
    url.query_pairs_mut()
        .clear()
        .append_pair("range", lookback.as_range())
        .append_pair("interval", "1d");
    Ok(url)
}

async fn fetch_from_api(
    client: &reqwest::Client,
    symbol: &str,
    lookback: Lookback,
    cfg: &FetchConfig,
) -> Result<StockData> {
    check_symbol(symbol)?;
    let url = chart_url(&cfg.base_url, symbol, lookback)?;

    let max_attempts = cfg.attempts.max(1);
    let mut last_err: Option<DashError> = None;

    for attempt in 1..=max_attempts {
        match client
            .get(url.clone())
            .header("User-Agent", "Mozilla/5.0")
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .send()
            .await
        {
            Ok(resp) => {
                let status = resp.status();
                match resp.text().await {
                    Ok(body) => match parse_chart_response(symbol, &body) {
                        Ok(data) => return Ok(data),
                        // 404 carries a proper chart error; other non-2xx bodies are
                        // rate limits or outages rather than a verdict on the symbol.
                        Err(e) if status.is_success() || status == reqwest::StatusCode::NOT_FOUND => {
                            return Err(e);
                        }
                        Err(_) => {
                            last_err = Some(DashError::network(symbol, format!("HTTP {}", status)));
                        }
                    },
                    Err(e) => last_err = Some(DashError::network(symbol, e)),
                }
            }
            Err(e) => last_err = Some(DashError::network(symbol, e)),
        }

        if attempt < max_attempts {
            warn!(
                "History fetch failed for {} (attempt {}/{}), retrying...",
                symbol, attempt, max_attempts
            );
            let backoff = cfg.retry_backoff_ms * attempt as u64;
            tokio::time::sleep(std::time::Duration::from_millis(backoff)).await;
        }
    }

    Err(last_err.unwrap_or_else(|| DashError::network(symbol, "history fetch failed")))
}

/// Fetches daily history for one symbol.
pub async fn fetch_range(symbol: &str, lookback: Lookback, cfg: &FetchConfig) -> Result<StockData> {
    match cfg.provider {
        DataProvider::Mock => Ok(StockData::new_mock(symbol, lookback.approx_trading_days())),
        DataProvider::Yahoo => {
            info!("Fetching {} history for {}...", lookback.as_range(), symbol);
            let client = reqwest::Client::new();
            fetch_from_api(&client, symbol, lookback, cfg).await
        }
    }
}

/// Fetches every distinct symbol once, in input order, one after another.
///
/// The outcome list mirrors `symbols`: a repeated symbol appears again with
/// the same outcome.
pub async fn fetch_all(
    symbols: &[String],
    lookback: Lookback,
    cfg: &FetchConfig,
) -> Vec<(String, Result<StockData>)> {
    let mut fetched: HashMap<String, Result<StockData>> = HashMap::new();
    let client = reqwest::Client::new();

    for symbol in symbols {
        if fetched.contains_key(symbol) {
            continue;
        }
        let outcome = match cfg.provider {
            DataProvider::Mock => Ok(StockData::new_mock(symbol, lookback.approx_trading_days())),
            DataProvider::Yahoo => {
                if !fetched.is_empty() && cfg.batch_delay_ms > 0 {
                    tokio::time::sleep(std::time::Duration::from_millis(cfg.batch_delay_ms)).await;
                }
                fetch_from_api(&client, symbol, lookback, cfg).await
            }
        };
        match &outcome {
            Ok(data) => info!("{}: {} daily records", symbol, data.history.len()),
            Err(e) => warn!("{}: fetch failed ({}): {}", symbol, e.kind(), e),
        }
        fetched.insert(symbol.clone(), outcome);
    }

    symbols
        .iter()
        .map(|s| {
            let outcome = fetched
                .get(s)
                .cloned()
                .unwrap_or_else(|| Err(DashError::network(s, "not fetched")));
            (s.clone(), outcome)
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn series_from_closes(symbol: &str, closes: &[f64]) -> StockData {
        let mut date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let history = closes
            .iter()
            .map(|&close| {
                let c = Candle {
                    date,
                    open: close - 1.0,
                    high: close + 2.0,
                    low: close - 2.0,
                    close,
                    volume: 1_000.0,
                };
                date = next_business_day(date);
                c
            })
            .collect();
        StockData {
            symbol: symbol.to_string(),
            history,
        }
    }

    const CHART_OK: &str = r#"{"chart":{"result":[{
        "meta":{"symbol":"AAPL","gmtoffset":-14400},
        "timestamp":[1717162200,1717421400,1717507800,1717594200],
        "indicators":{"quote":[{
            "open":[191.44,192.90,194.64,null],
            "high":[192.57,194.99,195.32,196.90],
            "low":[189.91,192.52,193.03,194.87],
            "close":[192.25,194.03,194.35,195.87],
            "volume":[75158300,50080500,47471400,54156800]
        }]}
    }],"error":null}}"#;

    const CHART_NOT_FOUND: &str = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;

    #[test]
    fn test_parse_chart_response_skips_incomplete_rows() {
        let data = parse_chart_response("aapl", CHART_OK).unwrap();
        assert_eq!(data.symbol, "AAPL");
        assert_eq!(data.history.len(), 3);
        assert_eq!(data.history[0].date, NaiveDate::from_ymd_opt(2024, 5, 31).unwrap());
        assert_eq!(data.history[2].date, NaiveDate::from_ymd_opt(2024, 6, 4).unwrap());
        assert!((data.history[2].close - 194.35).abs() < 1e-9);
    }

    #[test]
    fn test_parse_chart_response_reports_invalid_ticker() {
        let err = parse_chart_response("ZZZZ", CHART_NOT_FOUND).unwrap_err();
        assert_eq!(
            err,
            DashError::invalid_ticker("ZZZZ", "No data found, symbol may be delisted")
        );

        let err = parse_chart_response("ZZZZ", "<html>oops</html>").unwrap_err();
        assert_eq!(err.kind(), "invalid_ticker");
    }

    #[test]
    fn test_parse_chart_response_without_rows() {
        let body = r#"{"chart":{"result":[{"meta":{},"indicators":{"quote":[{}]}}],"error":null}}"#;
        let err = parse_chart_response("EMPTY", body).unwrap_err();
        assert_eq!(err, DashError::invalid_ticker("EMPTY", "No complete OHLCV rows"));
    }

    #[test]
    fn test_parse_chart_response_keeps_last_row_per_date() {
        // 06-03 open bar, 05-31, then the 06-03 closing bar
        let body = r#"{"chart":{"result":[{
            "meta":{"gmtoffset":-14400},
            "timestamp":[1717421400,1717162200,1717444800],
            "indicators":{"quote":[{
                "open":[192.90,191.44,192.90],
                "high":[193.50,192.57,194.99],
                "low":[192.52,189.91,192.52],
                "close":[193.10,192.25,194.03],
                "volume":[1000,75158300,50080500]
            }]}
        }],"error":null}}"#;
        let data = parse_chart_response("AAPL", body).unwrap();
        let dates: Vec<NaiveDate> = data.history.iter().map(|c| c.date).collect();
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2024, 5, 31).unwrap(),
                NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            ]
        );
        assert!((data.history[1].close - 194.03).abs() < 1e-9);
        assert!((data.history[1].volume - 50_080_500.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_chart_response_applies_adjusted_close() {
        let body = r#"{"chart":{"result":[{
            "meta":{"gmtoffset":-14400},
            "timestamp":[1717162200,1717421400,1717507800],
            "indicators":{
                "quote":[{
                    "open":[98.0,100.0,101.0],
                    "high":[104.0,102.0,103.0],
                    "low":[96.0,99.0,100.0],
                    "close":[100.0,101.0,102.0],
                    "volume":[500,600,700]
                }],
                "adjclose":[{"adjclose":[50.0,101.0,null]}]
            }
        }],"error":null}}"#;
        let data = parse_chart_response("SPLT", body).unwrap();
        assert_eq!(data.history.len(), 2);

        let first = &data.history[0];
        assert!((first.open - 49.0).abs() < 1e-9);
        assert!((first.high - 52.0).abs() < 1e-9);
        assert!((first.low - 48.0).abs() < 1e-9);
        assert!((first.close - 50.0).abs() < 1e-9);
        assert!((first.volume - 500.0).abs() < 1e-9);

        let second = &data.history[1];
        assert!((second.open - 100.0).abs() < 1e-9);
        assert!((second.close - 101.0).abs() < 1e-9);
    }

    #[test]
    fn test_chart_url_encodes_symbol_as_one_segment() {
        let url = chart_url(crate::config::YAHOO_CHART_URL, "AAPL#", Lookback::OneYear).unwrap();
        assert_eq!(url.path(), "/v8/finance/chart/AAPL%23");
        assert_eq!(url.query(), Some("range=1y&interval=1d"));
        assert_eq!(url.fragment(), None);

        let url =
            chart_url(crate::config::YAHOO_CHART_URL, "AAPL?RANGE=5D&X=", Lookback::TwoYears).unwrap();
        assert!(url.path().starts_with("/v8/finance/chart/AAPL%3F"));
        assert_eq!(url.query(), Some("range=2y&interval=1d"));

        let url = chart_url("http://127.0.0.1:9/chart/", "../../V7/QUOTE", Lookback::OneYear).unwrap();
        assert_eq!(url.path(), "/chart/..%2F..%2FV7%2FQUOTE");
    }

    #[test]
    fn test_check_symbol() {
        for ok in ["AAPL", "BRK.B", "^GSPC", "EURUSD=X", "BTC-USD"] {
            assert!(check_symbol(ok).is_ok(), "{}", ok);
        }
        for bad in ["AAPL#", "AAPL?RANGE=5D&X=", "../../V7/FINANCE/QUOTE", "..", "BRK B"] {
            assert_eq!(check_symbol(bad).unwrap_err().kind(), "invalid_ticker", "{}", bad);
        }
    }

    mod http {
        use super::*;
        use axum::extract::RawQuery;
        use axum::http::StatusCode;
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        /// Serves `status` and `body` for every chart request and counts hits.
        async fn chart_server(status: StatusCode, body: &'static str) -> (FetchConfig, Arc<AtomicUsize>) {
            let hits = Arc::new(AtomicUsize::new(0));
            let counter = hits.clone();
            let app = axum::Router::new().route(
                "/chart/:symbol",
                axum::routing::get(move |RawQuery(query): RawQuery| {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        if query.as_deref() != Some("range=1y&interval=1d") {
                            return (StatusCode::BAD_REQUEST, "unexpected query");
                        }
                        (status, body)
                    }
                }),
            );
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                axum::serve(listener, app).await.unwrap();
            });

            let cfg = FetchConfig {
                provider: DataProvider::Yahoo,
                base_url: format!("http://{}/chart", addr),
                attempts: 3,
                timeout_secs: 5,
                batch_delay_ms: 0,
                retry_backoff_ms: 0,
            };
            (cfg, hits)
        }

        fn client() -> reqwest::Client {
            reqwest::Client::builder().no_proxy().build().unwrap()
        }

        #[tokio::test]
        async fn test_fetch_ok() {
            let (cfg, hits) = chart_server(StatusCode::OK, CHART_OK).await;
            let data = fetch_from_api(&client(), "AAPL", Lookback::OneYear, &cfg).await.unwrap();
            assert_eq!(data.history.len(), 3);
            assert_eq!(hits.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn test_fetch_not_found_is_invalid_ticker() {
            let (cfg, hits) = chart_server(StatusCode::NOT_FOUND, CHART_NOT_FOUND).await;
            let err = fetch_from_api(&client(), "ZZZZ", Lookback::OneYear, &cfg).await.unwrap_err();
            assert_eq!(err.kind(), "invalid_ticker");
            assert_eq!(hits.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn test_fetch_server_error_retries_then_fails() {
            let (cfg, hits) =
                chart_server(StatusCode::INTERNAL_SERVER_ERROR, "<html>upstream error</html>").await;
            let err = fetch_from_api(&client(), "AAPL", Lookback::OneYear, &cfg).await.unwrap_err();
            assert_eq!(err, DashError::network("AAPL", "HTTP 500 Internal Server Error"));
            assert_eq!(hits.load(Ordering::SeqCst), 3);
        }

        #[tokio::test]
        async fn test_fetch_rate_limited_is_network_failure() {
            let (mut cfg, hits) =
                chart_server(StatusCode::TOO_MANY_REQUESTS, "<html>Too Many Requests</html>").await;
            cfg.attempts = 2;
            let err = fetch_from_api(&client(), "AAPL", Lookback::OneYear, &cfg).await.unwrap_err();
            assert_eq!(err.kind(), "network_failure");
            assert_eq!(hits.load(Ordering::SeqCst), 2);
        }

        #[tokio::test]
        async fn test_fetch_rejects_symbol_before_request() {
            let (cfg, hits) = chart_server(StatusCode::OK, CHART_OK).await;
            let err = fetch_from_api(&client(), "AAPL?RANGE=5D&X=", Lookback::OneYear, &cfg)
                .await
                .unwrap_err();
            assert_eq!(err.kind(), "invalid_ticker");
            assert_eq!(hits.load(Ordering::SeqCst), 0);
        }
    }

    #[test]
    fn test_business_days_skip_weekends() {
        // 2024-06-07 is a Friday
        let friday = NaiveDate::from_ymd_opt(2024, 6, 7).unwrap();
        let days = business_days_after(friday, 6);
        assert_eq!(days.len(), 6);
        assert_eq!(days[0], NaiveDate::from_ymd_opt(2024, 6, 10).unwrap());
        assert_eq!(days[5], NaiveDate::from_ymd_opt(2024, 6, 17).unwrap());
        assert!(days.iter().all(|d| is_business_day(*d) && *d > friday));

        let saturday = NaiveDate::from_ymd_opt(2024, 6, 8).unwrap();
        assert_eq!(next_business_day(saturday), NaiveDate::from_ymd_opt(2024, 6, 10).unwrap());
    }

    #[test]
    fn test_mock_is_deterministic_per_symbol() {
        let a = StockData::new_mock("TEST", 50);
        let b = StockData::new_mock("TEST", 50);
        assert_eq!(a.history, b.history);
        assert_eq!(a.history.len(), 50);
        assert!(a.history.iter().all(|c| is_business_day(c.date)));
        assert!(a.history.windows(2).all(|w| w[0].date < w[1].date));
        assert!(a.history.iter().all(|c| c.low <= c.open.min(c.close) && c.high >= c.open.max(c.close)));
    }

    #[test]
    fn test_column_extracts_dated_values() {
        let data = series_from_closes("X", &[10.0, 11.0, 12.0]);
        let opens = data.column(PriceField::Open);
        assert_eq!(opens.values, vec![9.0, 10.0, 11.0]);
        assert_eq!(opens.dates.len(), 3);
        assert_eq!(opens.last_date(), data.history.last().map(|c| c.date));
    }

    #[tokio::test]
    async fn test_fetch_all_mirrors_input_order() {
        let cfg = FetchConfig {
            provider: DataProvider::Mock,
            ..FetchConfig::default()
        };
        let symbols = vec!["TSLA".to_string(), "AAPL".to_string(), "TSLA".to_string()];
        let outcomes = fetch_all(&symbols, Lookback::OneYear, &cfg).await;
        let names: Vec<&str> = outcomes.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(names, vec!["TSLA", "AAPL", "TSLA"]);
        let first = outcomes[0].1.as_ref().unwrap();
        let third = outcomes[2].1.as_ref().unwrap();
        assert_eq!(first.history, third.history);
        assert_eq!(first.history.len(), 252);
    }

    #[test]
    fn test_provider_setting() {
        assert_eq!(DataProvider::from_setting("MOCK"), DataProvider::Mock);
        assert_eq!(DataProvider::from_setting(""), DataProvider::Yahoo);
        assert_eq!(DataProvider::from_setting("polygon"), DataProvider::Yahoo);
    }
}
