mod config;
mod dashboard;
mod data;
mod error;
mod forecast;
mod forecast_page;
mod models;
mod render;
mod tickers;
mod webui;

use clap::Parser;
use dashboard::{format_price, DashboardRequest};
use forecast_page::{ForecastRequest, ModelChoice};
use std::io;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "stockdash: stock price dashboard and short-horizon forecaster",
    after_help = "EXAMPLES:
    # Serve the dashboard on http://localhost:8080
    cargo run --release

    # Log summary cards for a few tickers
    cargo run --release -- --summary \"GOOGL, AAPL, MSFT\"

    # Forecast with the lag-1 random forest
    cargo run --release -- --forecast NVDA --model lag-regression

    # Offline demo with synthetic prices
    STOCKDASH_DATA_PROVIDER=mock cargo run --release"
)]
struct Args {
    /// Address to bind the web server to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Web server port
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Log a summary card per ticker (comma-separated) and exit
    #[arg(long)]
    summary: Option<String>,

    /// Forecast one ticker and exit
    #[arg(long)]
    forecast: Option<String>,

    /// Forecast model: exponential-smoothing (default) or lag-regression
    #[arg(long, value_parser = parse_model)]
    model: Option<ModelChoice>,

    /// Business days forecast by exponential smoothing (default: 40)
    #[arg(long)]
    horizon: Option<usize>,

    /// Holt-Winters season length in trading days (default: 20)
    #[arg(long)]
    seasonal_period: Option<usize>,
}

fn parse_model(raw: &str) -> Result<ModelChoice, String> {
    ModelChoice::from_setting(raw)
        .ok_or_else(|| format!("unknown model '{}' (expected exponential-smoothing or lag-regression)", raw))
}

#[tokio::main]
async fn main() -> io::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("stockdash=info,tower_http=info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    let args = Args::parse();

    config::init_cpu_parallelism();

    let cfg = config::AppConfig::from_env().with_overrides(args.horizon, args.seasonal_period);
    info!(
        "Data provider: {} | horizon {} | seasonal period {}",
        cfg.fetch.provider.as_str(),
        cfg.forecast_horizon,
        cfg.seasonal_period
    );

    if let Some(ref tickers) = args.summary {
        let request = DashboardRequest {
            tickers: tickers.clone(),
            ..DashboardRequest::default()
        };
        let view = dashboard::render_dashboard(&request, &cfg).await;
        if view.cards.is_empty() {
            error!("No tickers given. Example: --summary \"GOOGL, AAPL\"");
        }
        for card in &view.cards {
            match (&card.summary, &card.error) {
                (Some(s), _) => info!(
                    "{:<6} {:>12} {:<4} ({}) | session {} {}",
                    s.ticker,
                    format_price(s.current),
                    s.direction.label(),
                    s.last_date,
                    s.market.date,
                    s.market.change_text
                ),
                (None, Some(e)) => error!("{:<6} {}", card.ticker, e),
                (None, None) => warn!("{:<6} no summary", card.ticker),
            }
        }
        return Ok(());
    }

    if let Some(ref ticker) = args.forecast {
        let request = ForecastRequest {
            tickers: ticker.clone(),
            model: args.model,
        };
        let view = forecast_page::render_forecast(&request, &cfg).await;
        match (&view.ticker, &view.error) {
            (None, _) => error!("No ticker given. Example: --forecast GOOGL"),
            (Some(t), Some(e)) => error!("Forecast for {} failed: {}", t, e),
            (Some(_), None) => {
                for panel in &view.panels {
                    if let Some(ref s) = panel.summary {
                        info!("{}", s);
                    } else if let Some(ref n) = panel.notice {
                        warn!("{}: {}", panel.title, n);
                    } else if let Some(ref e) = panel.error {
                        error!("{}: {}", panel.title, e);
                    }
                }
            }
        }
        return Ok(());
    }

    match webui::run_webui_server(&args.host, args.port, cfg).await {
        Ok(_) => info!("WebUI exited."),
        Err(e) => error!("WebUI failed: {}", e),
    }

    Ok(())
}
