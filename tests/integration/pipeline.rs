//! End-to-end scans through `ArbitrageScanner`.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal_macros::dec;
use std::path::PathBuf;
use std::sync::Arc;

use arbscan::config::AppConfig;
use arbscan::engine::alerter::{AlertDispatcher, AlertSink};
use arbscan::engine::scanner::ArbitrageScanner;
use arbscan::storage::{AlertDedupStore, OpportunityLog};
use arbscan::strategy::{PairDecision, ScanParams};
use arbscan::types::Side;

use crate::mock_source::{kalshi, polymarket, CaptureSink, MockSource};

// ---- helpers ---------------------------------------------------------------

fn params() -> ScanParams {
    ScanParams {
        match_threshold: 85,
        fee_a: dec!(0.02),
        fee_b: dec!(0.07),
        min_profit_usd: dec!(25),
        total_budget_usd: dec!(1000),
    }
}

fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

fn temp_dir() -> PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("arbscan_it_{}", uuid::Uuid::new_v4()));
    p
}

fn bitcoin_sources() -> (Arc<MockSource>, Arc<MockSource>) {
    let a = MockSource::new(
        "polymarket",
        vec![
            polymarket("0xabc", "Will Bitcoin reach $100k in 2025?", dec!(0.40), dec!(0.62)),
            polymarket("0xdef", "Will the Lakers win the NBA title?", dec!(0.12), dec!(0.90)),
            polymarket("0xbad", "Will it snow in Miami this year?", dec!(1.20), dec!(0.05)),
        ],
    );
    let b = MockSource::new(
        "kalshi",
        vec![
            kalshi("BTC-100K", "Bitcoin to reach $100,000", dec!(0.47), dec!(0.55)),
            kalshi("FED-CUT", "Fed cuts rates in March", dec!(0.30), dec!(0.72)),
        ],
    );
    (a, b)
}

fn scanner_with_sink(a: Arc<MockSource>, b: Arc<MockSource>) -> (ArbitrageScanner, Arc<CaptureSink>) {
    let sink = CaptureSink::new();
    let alerts = AlertDispatcher::new(vec![sink.clone() as Arc<dyn AlertSink>]);
    (ArbitrageScanner::new(a, b, params(), alerts), sink)
}

// ---- tests -----------------------------------------------------------------

#[tokio::test]
async fn test_full_scan_alerts_bitcoin_arbitrage() {
    let (a, b) = bitcoin_sources();
    let (mut scanner, sink) = scanner_with_sink(a.clone(), b.clone());

    let report = scanner.scan_at(noon()).await.unwrap();

    assert_eq!(a.fetch_count(), 1);
    assert_eq!(b.fetch_count(), 1);
    assert_eq!(report.markets_a, 2);
    assert_eq!(report.markets_b, 2);
    assert_eq!(report.invalid_markets, 1);
    assert_eq!(report.pairs, 1);
    assert_eq!(report.opportunities.len(), 1);

    let opp = &report.opportunities[0];
    assert_eq!(opp.side_a, Side::Yes);
    assert_eq!(opp.side_b, Side::No);
    assert_eq!(opp.stake_a.round_dp(2), dec!(416.20));
    assert_eq!(opp.stake_b.round_dp(2), dec!(583.80));
    assert_eq!(opp.guaranteed_profit.round_dp(2), dec!(28.02));
    assert_eq!(opp.roi_percent.round_dp(2), dec!(2.80));

    let received = sink.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].market_id_a, "0xabc");
    assert_eq!(received[0].market_id_b, "BTC-100K");
    assert_eq!(received[0].link_a, "https://polymarket.com/event/0xabc");
    assert_eq!(received[0].link_b, "N/A");
    assert_eq!(report.delivery.delivered, 1);
    assert_eq!(report.delivery.failed, 0);
}

#[tokio::test]
async fn test_repeat_scans_alert_once_until_price_moves() {
    let (a, b) = bitcoin_sources();
    let (mut scanner, sink) = scanner_with_sink(a, b.clone());

    scanner.scan_at(noon()).await.unwrap();
    let second = scanner.scan_at(noon() + Duration::minutes(5)).await.unwrap();
    assert_eq!(second.opportunities.len(), 1);
    assert_eq!(second.suppressed, 1);
    assert_eq!(sink.received().len(), 1);

    // A cheaper NO leg is a different opportunity
    b.set_markets(vec![kalshi(
        "BTC-100K",
        "Bitcoin to reach $100,000",
        dec!(0.47),
        dec!(0.53),
    )]);
    let third = scanner.scan_at(noon() + Duration::minutes(10)).await.unwrap();
    assert_eq!(third.new_alerts.len(), 1);
    assert!(third.new_alerts[0].guaranteed_profit > dec!(28.02));
    assert_eq!(sink.received().len(), 2);
}

#[tokio::test]
async fn test_failed_source_recovers_next_scan() {
    let (a, b) = bitcoin_sources();
    a.set_error("gateway timeout");
    let (mut scanner, sink) = scanner_with_sink(a.clone(), b);

    let first = scanner.scan_at(noon()).await.unwrap();
    assert_eq!(first.markets_a, 0);
    assert!(first.opportunities.is_empty());
    assert!(sink.received().is_empty());

    a.clear_error();
    let second = scanner.scan_at(noon() + Duration::minutes(5)).await.unwrap();
    assert_eq!(second.opportunities.len(), 1);
    assert_eq!(sink.received().len(), 1);
    assert_eq!(a.fetch_count(), 2);
}

#[tokio::test]
async fn test_fetch_limit_passed_to_sources() {
    let (a, b) = bitcoin_sources();
    let (scanner, _sink) = scanner_with_sink(a, b);
    let mut scanner = scanner.with_fetch_limit(1);

    let report = scanner.scan_at(noon()).await.unwrap();
    assert_eq!(report.markets_a, 1);
    assert_eq!(report.markets_b, 1);
    assert_eq!(report.opportunities.len(), 1);
}

#[tokio::test]
async fn test_log_and_alert_history_persist_across_restarts() {
    let dir = temp_dir();
    let log_path = dir.join("opportunities.jsonl");
    let dedup_path = dir.join("alerted.json");

    {
        let (a, b) = bitcoin_sources();
        let (scanner, sink) = scanner_with_sink(a, b);
        let mut scanner = scanner
            .with_opportunity_log(OpportunityLog::new(&log_path))
            .with_dedup(AlertDedupStore::new(Duration::hours(24)), Some(dedup_path.clone()));
        scanner.scan_at(noon()).await.unwrap();
        assert_eq!(sink.received().len(), 1);
    }

    // A fresh process reloads the history and stays quiet
    let store = AlertDedupStore::load(&dedup_path, Duration::hours(24)).unwrap();
    assert_eq!(store.len(), 1);

    let (a, b) = bitcoin_sources();
    let (scanner, sink) = scanner_with_sink(a, b);
    let mut scanner = scanner
        .with_opportunity_log(OpportunityLog::new(&log_path))
        .with_dedup(store, Some(dedup_path.clone()));
    let report = scanner.scan_at(noon() + Duration::hours(1)).await.unwrap();
    assert_eq!(report.suppressed, 1);
    assert!(sink.received().is_empty());

    let logged = OpportunityLog::new(&log_path).read_all().unwrap();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].event, "Will Bitcoin reach $100k in 2025?");
    assert_eq!(logged[0].guaranteed_profit, dec!(28.02));

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_alert_lost_in_outage_is_sent_after_restart() {
    let dir = temp_dir();
    let log_path = dir.join("opportunities.jsonl");
    let dedup_path = dir.join("alerted.json");

    {
        let (a, b) = bitcoin_sources();
        let (scanner, sink) = scanner_with_sink(a, b);
        sink.set_rejecting(true);
        let mut scanner = scanner
            .with_opportunity_log(OpportunityLog::new(&log_path))
            .with_dedup(AlertDedupStore::new(Duration::hours(24)), Some(dedup_path.clone()));

        let report = scanner.scan_at(noon()).await.unwrap();
        assert_eq!(report.opportunities.len(), 1);
        assert_eq!(report.undelivered, 1);
        assert_eq!(report.delivery.failed, 1);
        assert!(sink.received().is_empty());
    }

    // Nothing was remembered, so the next process alerts again
    let store = AlertDedupStore::load(&dedup_path, Duration::hours(24)).unwrap();
    assert!(store.is_empty());
    assert!(OpportunityLog::new(&log_path).read_all().unwrap().is_empty());

    let (a, b) = bitcoin_sources();
    let (scanner, sink) = scanner_with_sink(a, b);
    let mut scanner = scanner
        .with_opportunity_log(OpportunityLog::new(&log_path))
        .with_dedup(store, Some(dedup_path.clone()));
    let report = scanner.scan_at(noon() + Duration::minutes(5)).await.unwrap();
    assert_eq!(report.new_alerts.len(), 1);
    assert_eq!(report.suppressed, 0);
    assert_eq!(sink.received().len(), 1);
    assert_eq!(OpportunityLog::new(&log_path).read_all().unwrap().len(), 1);

    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_config_profit_floor_filters_opportunity() {
    let config = AppConfig::from_toml(
        r#"
        [scanner]
        name = "ARBSCAN-IT"
        scan_interval_secs = 60
        source_a = "polymarket"
        source_b = "kalshi"

        [matching]
        threshold = 85

        [arbitrage]
        total_budget_usd = 1000.0
        min_profit_usd = 100.0

        [platforms.polymarket]
        fee = 0.02

        [platforms.kalshi]
        fee = 0.07

        [platforms.predictit]
        fee = 0.10

        [alerts]
        log_enabled = false

        [storage]
        opportunity_log = "data/opportunities.jsonl"
        dedup_path = "data/alerted.json"
        "#,
    )
    .unwrap();
    let params = config.scan_params().unwrap();
    assert_eq!(params.fee_b, dec!(0.07));

    let (a, b) = bitcoin_sources();
    let sink = CaptureSink::new();
    let alerts = AlertDispatcher::new(vec![sink.clone() as Arc<dyn AlertSink>]);
    let mut scanner = ArbitrageScanner::new(a, b, params, alerts);

    let report = scanner.scan_at(noon()).await.unwrap();
    assert_eq!(report.pairs, 1);
    assert!(report.opportunities.is_empty());
    assert!(matches!(
        report.decisions[0],
        PairDecision::BelowProfitFloor { .. }
    ));
    assert!(sink.received().is_empty());
}
