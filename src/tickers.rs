/// Logo shown when a symbol has no entry in [`LOGO_URLS`].
pub const PLACEHOLDER_LOGO: &str = "https://via.placeholder.com/150";

pub const LOGO_URLS: &[(&str, &str)] = &[
    ("GOOGL", "https://logo.clearbit.com/google.com"),
    ("AAPL", "https://logo.clearbit.com/apple.com"),
    ("MSFT", "https://logo.clearbit.com/microsoft.com"),
    ("NVDA", "https://logo.clearbit.com/nvidia.com"),
    ("TSLA", "https://logo.clearbit.com/tesla.com"),
    ("INTC", "https://logo.clearbit.com/intel.com"),
];

/// Splits free text on commas into upper-cased symbols.
///
/// Order is preserved and duplicates are kept; blank tokens are dropped.
pub fn parse_tickers(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Case-sensitive: callers pass symbols already upper-cased by [`parse_tickers`].
pub fn logo_url(symbol: &str) -> &'static str {
    LOGO_URLS
        .iter()
        .find(|(s, _)| *s == symbol)
        .map(|(_, url)| *url)
        .unwrap_or(PLACEHOLDER_LOGO)
}
