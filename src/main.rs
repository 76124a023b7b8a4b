use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use feedmux::adapter::binance::{
    DepthClient, DepthTopic, RestSnapshotProvider, TradeClient, UpdateSpeed, WebSocketTransport,
};
use feedmux::application::cache::OrderBookCache;
use feedmux::domain::{StreamEvent, Symbol};
use feedmux::infrastructure::config::Config;
use feedmux::infrastructure::{ClientManager, RetryTaskController, StreamMultiplexer, TaskEvent};
use feedmux::port::{EventCallback, SnapshotProvider};

/// Stream exchange market data over one multiplexed connection.
#[derive(Parser, Debug)]
#[command(name = "feedmux")]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    // Both the WebSocket and HTTP stacks link rustls; pin one provider.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = Config::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    config.init_logging();
    info!("feedmux starting");

    let multiplexer = Arc::new(StreamMultiplexer::new(
        Arc::new(WebSocketTransport::new()),
        Url::parse(&config.endpoint.ws_url)?,
        config.stream.clone(),
    ));
    let controller = Arc::new(RetryTaskController::new(config.retry.clone()));
    let depth = ClientManager::new(
        Arc::new(DepthClient::new()),
        Arc::clone(&multiplexer),
        Arc::clone(&controller),
        &config.watchdog,
    );
    let trades = ClientManager::new(
        Arc::new(TradeClient::new()),
        Arc::clone(&multiplexer),
        Arc::clone(&controller),
        &config.watchdog,
    );

    let token = CancellationToken::new();
    let provider: Arc<dyn SnapshotProvider> =
        Arc::new(RestSnapshotProvider::new(&config.endpoint.api_url)?);
    let mut background = Vec::new();

    background.push(tokio::spawn(log_task_events(depth.events(), token.clone())));

    for name in &config.depth.symbols {
        let symbol = Symbol::new(name);
        let cache = Arc::new(OrderBookCache::new(
            symbol.clone(),
            config.depth.limit,
            config.retry.delay(),
        )
        .with_max_pending(config.depth.max_pending));
        background.push(tokio::spawn(log_book_tops(Arc::clone(&cache), token.clone())));
        {
            let cache = Arc::clone(&cache);
            let provider = Arc::clone(&provider);
            let token = token.clone();
            background.push(tokio::spawn(async move { cache.run(provider, token).await }));
        }
        let topic = DepthTopic::new(symbol).with_speed(UpdateSpeed::Fast);
        depth.subscribe(&topic, Some(cache.callback())).await?;
    }

    let on_trade: EventCallback = Arc::new(|event: &StreamEvent| {
        if let Some(trade) = event.as_trade() {
            info!(
                symbol = %trade.symbol,
                price = %trade.price,
                quantity = %trade.quantity,
                "Trade"
            );
        }
    });
    for name in &config.trade.symbols {
        trades
            .subscribe(&Symbol::new(name), Some(Arc::clone(&on_trade)))
            .await?;
    }

    if multiplexer.is_empty() {
        warn!("No symbols configured; nothing to stream");
    }

    signal::ctrl_c().await?;
    info!("Shutdown signal received");

    depth.shutdown().await;
    trades.shutdown().await;
    token.cancel();
    for handle in background {
        let _ = handle.await;
    }

    let stats = multiplexer.stats();
    info!(
        sessions = stats.sessions_opened,
        messages = stats.messages_received,
        dropped = stats.messages_dropped,
        "feedmux stopped"
    );
    Ok(())
}

async fn log_book_tops(cache: Arc<OrderBookCache>, token: CancellationToken) {
    let mut updates = cache.subscribe();
    loop {
        let update = tokio::select! {
            () = token.cancelled() => break,
            update = updates.recv() => update,
        };
        match update {
            Ok(update) => {
                if let Some(top) = cache.book(1).and_then(|book| book.top()) {
                    info!(
                        symbol = %update.symbol,
                        last_update_id = update.last_update_id,
                        bid = %top.bid().price(),
                        ask = %top.ask().price(),
                        "Top of book"
                    );
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(symbol = %cache.symbol(), skipped, "Book listener lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

async fn log_task_events(
    mut events: broadcast::Receiver<TaskEvent>,
    token: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            () = token.cancelled() => break,
            event = events.recv() => event,
        };
        match event {
            Ok(TaskEvent::Pausing { delay }) => {
                info!(delay_ms = delay.as_millis() as u64, "Stream paused before retry");
            }
            Ok(TaskEvent::Resuming) => info!("Stream resuming"),
            // Already logged by the controller.
            Ok(TaskEvent::Error(_)) => {}
            Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => break,
        }
    }
}
