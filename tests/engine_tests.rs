//! End-to-end tests of typed clients sharing one multiplexed connection.
//!
//! Everything runs against the channel-driven mock transport on a paused
//! clock; no network I/O.

use std::sync::Arc;
use std::time::Duration;

use feedmux::adapter::binance::{DepthClient, DepthTopic, TradeClient};
use feedmux::application::cache::OrderBookCache;
use feedmux::error::Error;
use feedmux::infrastructure::{ClientManager, RetryTaskController, StreamMultiplexer, TaskEvent};
use feedmux::port::SnapshotProvider;
use feedmux::testkit::config;
use feedmux::testkit::domain::{depth_json, envelope, snapshot, symbol, trade_json};
use feedmux::testkit::observer::recording_callback;
use feedmux::testkit::snapshot::ScriptedSnapshots;
use feedmux::testkit::transport::{channel_transport, ChannelTransportHandle};
use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;

struct Engine {
    depth: ClientManager<DepthClient>,
    trades: ClientManager<TradeClient>,
    multiplexer: Arc<StreamMultiplexer>,
    handle: ChannelTransportHandle,
}

fn engine() -> Engine {
    let (transport, handle) = channel_transport();
    let multiplexer = Arc::new(StreamMultiplexer::new(
        Arc::new(transport),
        config::ws_url(),
        config::stream(),
    ));
    let controller = Arc::new(RetryTaskController::new(config::retry()));
    let depth = ClientManager::new(
        Arc::new(DepthClient::new()),
        Arc::clone(&multiplexer),
        Arc::clone(&controller),
        &config::watchdog(3600),
    );
    let trades = ClientManager::new(
        Arc::new(TradeClient::new()),
        Arc::clone(&multiplexer),
        controller,
        &config::watchdog(3600),
    );
    Engine {
        depth,
        trades,
        multiplexer,
        handle,
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test(start_paused = true)]
async fn single_stream_session_delivers_bare_payloads() {
    let engine = engine();
    let (callback, seen) = recording_callback();

    engine
        .trades
        .subscribe(&symbol("BTCUSDT"), Some(callback))
        .await
        .unwrap();
    engine.handle.wait_for_connects(1).await;
    assert_eq!(
        engine.handle.last_uri().unwrap().as_str(),
        "wss://stream.test:9443/ws/btcusdt@trade"
    );

    engine
        .handle
        .send_json(&trade_json("BTCUSDT", 1, "100.5", "2"));
    settle().await;

    {
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].as_trade().unwrap().price, dec!(100.5));
    }
    engine.trades.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn clients_share_one_combined_session() {
    let engine = engine();
    let (trade_cb, trades_seen) = recording_callback();
    let (depth_cb, depth_seen) = recording_callback();

    engine
        .depth
        .subscribe(&DepthTopic::new(symbol("BTCUSDT")), Some(depth_cb))
        .await
        .unwrap();
    engine
        .trades
        .subscribe(&symbol("BTCUSDT"), Some(trade_cb))
        .await
        .unwrap();
    settle().await;

    assert_eq!(
        engine.handle.last_uri().unwrap().as_str(),
        "wss://stream.test:9443/stream?streams=btcusdt@depth/btcusdt@trade"
    );
    assert_eq!(
        engine.multiplexer.session_streams(),
        Some(engine.multiplexer.active_streams())
    );

    engine.handle.send_json(&envelope(
        "btcusdt@depth",
        depth_json("BTCUSDT", 1, 2, &[("100", "1")], &[]),
    ));
    engine.handle.send_json(&envelope(
        "btcusdt@trade",
        trade_json("BTCUSDT", 9, "100", "1"),
    ));
    settle().await;

    assert_eq!(depth_seen.lock().len(), 1);
    assert_eq!(trades_seen.lock().len(), 1);
    assert_eq!(trades_seen.lock()[0].as_trade().unwrap().id, 9);

    engine.depth.shutdown().await;
    engine.trades.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn releasing_a_client_shrinks_the_session() {
    let engine = engine();
    engine
        .depth
        .subscribe(&DepthTopic::new(symbol("ETHUSDT")), None)
        .await
        .unwrap();
    engine
        .trades
        .subscribe(&symbol("ETHUSDT"), None)
        .await
        .unwrap();
    settle().await;

    engine
        .trades
        .unsubscribe(&symbol("ETHUSDT"), None)
        .await
        .unwrap();
    settle().await;

    assert_eq!(
        engine.handle.last_uri().unwrap().as_str(),
        "wss://stream.test:9443/ws/ethusdt@depth"
    );
    engine.depth.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn server_close_is_retried_after_the_delay() {
    let engine = engine();
    engine
        .trades
        .subscribe(&symbol("BTCUSDT"), None)
        .await
        .unwrap();
    engine.handle.wait_for_connects(1).await;
    let mut events = engine.trades.events();

    engine.handle.close_session(Some("maintenance"));
    engine.handle.wait_for_connects(2).await;

    match events.recv().await.unwrap() {
        TaskEvent::Error(e) => assert!(matches!(e.as_ref(), Error::Connection(_))),
        other => panic!("expected error event, got {other:?}"),
    }
    match events.recv().await.unwrap() {
        TaskEvent::Pausing { delay } => assert_eq!(delay, Duration::from_millis(50)),
        other => panic!("expected pausing event, got {other:?}"),
    }
    assert!(matches!(events.recv().await.unwrap(), TaskEvent::Resuming));
    engine.trades.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn depth_feed_keeps_order_book_in_sync() {
    let engine = engine();
    let cache = Arc::new(OrderBookCache::new(
        symbol("BTCUSDT"),
        100,
        Duration::from_millis(50),
    ));
    let provider: Arc<dyn SnapshotProvider> = Arc::new(ScriptedSnapshots::with_results(vec![Ok(
        snapshot("BTCUSDT", 100, &[("10000", "1")], &[("10010", "1")]),
    )]));
    let token = CancellationToken::new();
    let runner = {
        let cache = Arc::clone(&cache);
        let token = token.clone();
        tokio::spawn(async move { cache.run(provider, token).await })
    };

    engine
        .depth
        .subscribe(&DepthTopic::new(symbol("BTCUSDT")), Some(cache.callback()))
        .await
        .unwrap();
    engine.handle.wait_for_connects(1).await;
    engine.handle.send_json(&depth_json(
        "BTCUSDT",
        101,
        101,
        &[("10000", "0")],
        &[("10020", "2")],
    ));
    settle().await;

    let book = cache.snapshot().unwrap();
    assert_eq!(book.last_update_id(), 101);
    assert!(book.bids().is_empty());
    assert_eq!(book.quantity(dec!(10010)), dec!(1));
    assert_eq!(book.quantity(dec!(10020)), dec!(2));

    token.cancel();
    runner.await.unwrap();
    engine.depth.shutdown().await;
}
