use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use depthcast::{Config, MarketDataEngine};

#[derive(Parser, Debug)]
#[command(name = "depthcast")]
#[command(version, about = "Binance Futures market data engine: depth replica, trade flow, WS fan-out")]
struct Args {
    /// Path to a JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Venue symbol (e.g. btcusdt, ethusdt); overrides config and env
    #[arg(short, long)]
    symbol: Option<String>,

    /// Local WebSocket server port for subscribers
    #[arg(long)]
    ws_server_port: Option<u16>,

    /// Log level for the engine (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(
            format!("depthcast={}", args.log_level)
                .parse()
                .context("invalid --log-level")?,
        );
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Precedence: defaults < config file < environment < CLI flags.
    let mut config = Config::load(args.config.as_deref());
    if let Some(symbol) = args.symbol {
        config.network.symbol = symbol.to_lowercase();
    }
    if let Some(port) = args.ws_server_port {
        config.output.ws_server_port = port;
    }
    config.validate().context("invalid configuration")?;

    info!(
        symbol = %config.network.symbol,
        ws_host = %config.network.ws_host,
        ws_server_port = config.output.ws_server_port,
        "depthcast starting"
    );

    let mut engine = MarketDataEngine::new(config);
    engine.run()
}
