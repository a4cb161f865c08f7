//! URL construction for the venue's WebSocket and REST endpoints.

use crate::config::NetworkConfig;

/// Combined-stream WebSocket URL subscribing depth diffs and agg trades for
/// one symbol, e.g.
/// `wss://fstream.binance.com:443/stream?streams=btcusdt@depth@100ms/btcusdt@aggTrade`.
pub fn ws_combined_url(net: &NetworkConfig) -> String {
    format!(
        "wss://{}:{}/stream?streams={sym}@depth@100ms/{sym}@aggTrade",
        net.ws_host,
        net.ws_port,
        sym = net.symbol
    )
}

/// REST depth snapshot URL; the REST API wants the symbol uppercased.
pub fn rest_depth_url(net: &NetworkConfig, depth_limit: usize) -> String {
    format!(
        "https://{}:{}/fapi/v1/depth?symbol={}&limit={}",
        net.rest_host,
        net.rest_port,
        net.symbol.to_uppercase(),
        depth_limit
    )
}

/// Whether a combined-stream name carries depth diffs.
pub fn is_depth_stream(stream: &str) -> bool {
    stream.contains("@depth")
}

/// Whether a combined-stream name carries aggregated trades.
pub fn is_agg_trade_stream(stream: &str) -> bool {
    stream.contains("@aggTrade")
}
