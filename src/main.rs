// =============================================================================
// tradedesk CLI — download candles, place orders, manage open exposure
// =============================================================================

use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tradedesk::{
    place_order, positions, timeparse, BinanceClient, CandleCache, CandleStore,
    CoinmFuturesMarket, DateRange, KucoinFutures, KucoinSpot, Market, MarketAdapter,
    MarketDataSource, OrderSpec, PositionSide, Settings, Side, SpotMarket, TimeInForce,
    UsdmFuturesMarket,
};

// ---------------------------------------------------------------------------
// CLI argument structs
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(
    name = "tradedesk",
    version,
    about = "Candle cache and order tools for Binance and KuCoin",
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Update the local parquet candle cache for a symbol and timeframe
    Download(DownloadArgs),
    /// Place an order after price/quantity reconciliation
    Order(OrderArgs),
    /// List open positions (futures) or non-zero balances (spot)
    Positions(PositionsArgs),
    /// Close all open positions with opposing market orders
    CloseAll(CloseAllArgs),
    /// Cancel all open orders
    CancelAll(CancelAllArgs),
}

#[derive(Parser)]
struct DownloadArgs {
    /// Data source: binance, kucoin-spot or kucoin-futures
    #[arg(long, default_value = "binance")]
    exchange: String,

    /// Binance market segment (SPOT, USDM or COINM); ignored for KuCoin
    #[arg(long, default_value = "SPOT")]
    market: String,

    #[arg(long)]
    symbol: String,

    /// Kline timeframe, e.g. 5m or 1h (KuCoin also accepts 5min, 1hour)
    #[arg(long, default_value = "5m")]
    timeframe: String,

    /// Range start: RFC 3339, "%Y-%m-%d [%H:%M[:%S]]" or "N days ago"
    #[arg(long, default_value = "30 days ago")]
    start: String,

    /// Range end, same formats as --start
    #[arg(long, default_value = "now")]
    end: String,
}

#[derive(Parser)]
struct OrderArgs {
    /// Binance market segment (SPOT, USDM or COINM)
    #[arg(long, default_value = "SPOT")]
    market: String,

    #[arg(long)]
    symbol: String,

    /// BUY or SELL
    #[arg(long)]
    side: String,

    /// Size in base units (contracts for COINM)
    #[arg(long)]
    quantity: Option<f64>,

    /// Size as a quote-currency value (not supported on COINM)
    #[arg(long)]
    notional: Option<f64>,

    #[arg(long)]
    limit: Option<f64>,

    #[arg(long)]
    stop: Option<f64>,

    /// LONG or SHORT (futures hedge mode)
    #[arg(long)]
    position_side: Option<String>,

    /// GTC, IOC or FOK
    #[arg(long, default_value = "GTC")]
    time_in_force: String,
}

#[derive(Parser)]
struct PositionsArgs {
    #[arg(long, default_value = "USDM")]
    market: String,

    #[arg(long)]
    symbol: Option<String>,

    /// LONG or SHORT
    #[arg(long)]
    side: Option<String>,
}

#[derive(Parser)]
struct CloseAllArgs {
    #[arg(long, default_value = "USDM")]
    market: String,

    #[arg(long)]
    symbol: Option<String>,
}

#[derive(Parser)]
struct CancelAllArgs {
    #[arg(long, default_value = "USDM")]
    market: String,

    #[arg(long)]
    symbol: Option<String>,
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

fn binance_adapter(settings: &Settings, market: Market) -> Box<dyn MarketAdapter> {
    let client = Arc::new(BinanceClient::new(
        settings.binance_api_key.clone(),
        settings.binance_api_secret.clone(),
    ));
    match market {
        Market::Spot => Box::new(SpotMarket::new(client)),
        Market::UsdmFutures => Box::new(UsdmFuturesMarket::new(client)),
        Market::CoinmFutures => Box::new(CoinmFuturesMarket::new(client)),
    }
}

fn data_source(settings: &Settings, exchange: &str, market: &str) -> Result<Box<dyn MarketDataSource>> {
    match exchange.to_ascii_lowercase().as_str() {
        "binance" => {
            let market: Market = market.parse()?;
            let client = Arc::new(BinanceClient::new(
                settings.binance_api_key.clone(),
                settings.binance_api_secret.clone(),
            ));
            Ok(match market {
                Market::Spot => Box::new(SpotMarket::new(client)),
                Market::UsdmFutures => Box::new(UsdmFuturesMarket::new(client)),
                Market::CoinmFutures => Box::new(CoinmFuturesMarket::new(client)),
            })
        }
        "kucoin-spot" => Ok(Box::new(KucoinSpot::new())),
        "kucoin-futures" => Ok(Box::new(KucoinFutures::new())),
        other => bail!("unknown exchange {other:?} (expected binance, kucoin-spot or kucoin-futures)"),
    }
}

fn main() -> Result<()> {
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;

    match cli.command {
        Commands::Download(args) => {
            let source = data_source(&settings, &args.exchange, &args.market)?;
            let store = CandleStore::new(&settings.data_dir)?;
            let cache = CandleCache::new(source, store);

            let range = DateRange::new(
                timeparse::parse_utc(&args.start)?,
                timeparse::parse_utc(&args.end)?,
            )?;
            let series = cache.ensure_range(&args.symbol, &args.timeframe, &range)?;

            info!(
                symbol = %args.symbol.to_uppercase(),
                timeframe = %args.timeframe,
                rows = series.len(),
                path = %cache.store().path_for(&args.symbol.to_uppercase(), &args.timeframe).display(),
                "candle cache is up to date"
            );
        }

        Commands::Order(args) => {
            let market: Market = args.market.parse()?;
            let adapter = binance_adapter(&settings, market);

            let spec = OrderSpec {
                symbol: args.symbol,
                side: args.side.parse::<Side>()?,
                quantity: args.quantity,
                notional: args.notional,
                limit_price: args.limit,
                stop_price: args.stop,
                position_side: args
                    .position_side
                    .as_deref()
                    .map(str::parse::<PositionSide>)
                    .transpose()?,
                time_in_force: args.time_in_force.parse::<TimeInForce>()?,
                price_tolerance: settings.price_tolerance,
            };

            match place_order(adapter.as_ref(), &spec)? {
                Some(receipt) => println!("{}", serde_json::to_string_pretty(&receipt)?),
                None => warn!("order was not placed, see log for the reason"),
            }
        }

        Commands::Positions(args) => {
            let market: Market = args.market.parse()?;
            let adapter = binance_adapter(&settings, market);
            let side = args
                .side
                .as_deref()
                .map(str::parse::<PositionSide>)
                .transpose()?;

            let open = positions::list_positions(adapter.as_ref(), args.symbol.as_deref(), side)?;
            if open.is_empty() {
                println!("no open positions");
            }
            for position in open {
                println!("{:<14} {:>5} {}", position.symbol, position.side.to_string(), position.amount);
            }
        }

        Commands::CloseAll(args) => {
            let market: Market = args.market.parse()?;
            let adapter = binance_adapter(&settings, market);
            let closed = positions::close_all(adapter.as_ref(), args.symbol.as_deref())?;
            info!(closed, market = %market, "close-all finished");
        }

        Commands::CancelAll(args) => {
            let market: Market = args.market.parse()?;
            let adapter = binance_adapter(&settings, market);
            let cancelled = positions::cancel_all(adapter.as_ref(), args.symbol.as_deref())?;
            info!(cancelled, market = %market, "cancel-all finished");
        }
    }

    Ok(())
}
