use std::sync::Arc;

use serde_json::{json, Value};

use crate::rpc::ToolRouter;
use crate::tests::common;
use crate::ServiceState;

async fn router_over_fixture() -> (Arc<ServiceState>, ToolRouter, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    common::populate_fixture_root(dir.path()).await;
    let state = common::fixture_state(dir.path()).await;
    let router = ToolRouter::new(Arc::clone(&state));
    (state, router, dir)
}

async fn call(router: &ToolRouter, name: &str, args: Value) -> Value {
    let payload = router.call(name, args).await.expect("known tool");
    serde_json::from_str(&payload).expect("envelope is valid JSON")
}

fn assert_envelope_invariants(envelope: &Value) {
    assert_eq!(envelope["schema"], "stroll.history.v1");
    let ok = envelope["ok"].as_bool().unwrap();
    assert_eq!(ok, envelope["error"].is_null());
    let ts = envelope["meta"]["timestamp"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
}

#[tokio::test]
async fn test_discover_payload() {
    let (_state, router, _dir) = router_over_fixture().await;
    let envelope = call(&router, "discover", json!({})).await;
    assert_envelope_invariants(&envelope);
    assert_eq!(envelope["data"]["service"], "stroll.history");
    assert_eq!(envelope["data"]["version"], "1.0.0");
}

#[tokio::test]
async fn test_version_payload() {
    let (_state, router, _dir) = router_over_fixture().await;
    let envelope = call(&router, "version", json!({})).await;
    assert_envelope_invariants(&envelope);
    assert_eq!(envelope["data"], json!({"service": "stroll.history", "version": "1.0.0"}));
}

#[tokio::test]
async fn test_get_bars_happy_path() {
    let (_state, router, _dir) = router_over_fixture().await;
    let envelope = call(
        &router,
        "get_bars",
        json!({"symbol": "spy", "from": "2024-01-01", "to": "2024-01-31", "granularity": "1d"}),
    )
    .await;
    assert_envelope_invariants(&envelope);
    assert_eq!(envelope["data"]["symbol"], "SPY");
    assert_eq!(envelope["data"]["granularity"], "1d");
    assert_eq!(envelope["meta"]["count"], 9);

    let bars = envelope["data"]["bars"].as_array().unwrap();
    assert_eq!(bars.len(), 9);
    let mut last_t = String::new();
    for bar in bars {
        // Short wire names and bar integrity on every row
        let t = bar["t"].as_str().unwrap().to_string();
        assert!(t > last_t, "timestamps must be strictly increasing");
        last_t = t;
        let (o, h, l, c) = (
            bar["o"].as_f64().unwrap(),
            bar["h"].as_f64().unwrap(),
            bar["l"].as_f64().unwrap(),
            bar["c"].as_f64().unwrap(),
        );
        assert!(l <= o.min(c) && o.max(c) <= h);
        assert!(bar["v"].as_i64().unwrap() >= 0);
        assert_eq!(bar["symbol"], "SPY");
        assert_eq!(bar["g"], "1d");
    }
}

#[tokio::test]
async fn test_get_bars_weekend_range_is_empty_ok() {
    let (_state, router, _dir) = router_over_fixture().await;
    let envelope = call(
        &router,
        "get_bars",
        json!({"symbol": "SPY", "from": "2024-01-06", "to": "2024-01-07", "granularity": "1d"}),
    )
    .await;
    assert_eq!(envelope["ok"], true);
    assert_eq!(envelope["data"]["symbol"], "SPY");
    assert_eq!(envelope["data"]["from"], "2024-01-06");
    assert_eq!(envelope["data"]["to"], "2024-01-07");
    assert_eq!(envelope["data"]["bars"], json!([]));
    assert_eq!(envelope["meta"]["count"], 0);
}

#[tokio::test]
async fn test_get_bars_granularity_defaults_to_daily() {
    let (_state, router, _dir) = router_over_fixture().await;
    let envelope = call(
        &router,
        "get_bars",
        json!({"symbol": "SPY", "from": "2024-01-02", "to": "2024-01-03"}),
    )
    .await;
    assert_eq!(envelope["data"]["granularity"], "1d");
}

#[tokio::test]
async fn test_get_bars_invalid_date_rejected() {
    let (_state, router, _dir) = router_over_fixture().await;
    let envelope = call(
        &router,
        "get_bars",
        json!({"symbol": "SPY", "from": "2024-02-30", "to": "2024-03-01"}),
    )
    .await;
    assert_envelope_invariants(&envelope);
    assert_eq!(envelope["ok"], false);
    assert_eq!(envelope["error"]["code"], "INVALID_ARGUMENT");
}

#[tokio::test]
async fn test_get_bars_missing_symbol_rejected() {
    let (_state, router, _dir) = router_over_fixture().await;
    let envelope =
        call(&router, "get_bars", json!({"from": "2024-01-01", "to": "2024-01-02"})).await;
    assert_eq!(envelope["error"]["code"], "INVALID_ARGUMENT");
}

#[tokio::test]
async fn test_get_bars_uncovered_granularity_is_not_found() {
    let (_state, router, _dir) = router_over_fixture().await;
    // 1h parses fine but no partition covers it
    let envelope = call(
        &router,
        "get_bars",
        json!({"symbol": "SPY", "from": "2024-01-01", "to": "2024-01-31", "granularity": "1h"}),
    )
    .await;
    assert_eq!(envelope["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_get_bars_cached_payloads_are_identical() {
    let (state, router, _dir) = router_over_fixture().await;
    let args = json!({"symbol": "SPY", "from": "2024-01-01", "to": "2024-01-31"});
    let first = router.call("get_bars", args.clone()).await.unwrap();
    let second = router.call("get_bars", args).await.unwrap();
    assert_eq!(first, second, "cached responses must be byte-identical");
    assert_eq!(state.planner.invocations(), 1);
}

#[tokio::test]
async fn test_get_bars_singleflight_under_concurrency() {
    let (state, router, _dir) = router_over_fixture().await;
    let router = Arc::new(router);

    let mut tasks = Vec::new();
    for _ in 0..50 {
        let router = Arc::clone(&router);
        tasks.push(tokio::spawn(async move {
            router
                .call(
                    "get_bars",
                    json!({"symbol": "SPY", "from": "2024-01-01", "to": "2024-01-31"}),
                )
                .await
                .unwrap()
        }));
    }

    let mut payloads = Vec::new();
    for task in tasks {
        payloads.push(task.await.unwrap());
    }
    assert!(payloads.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(state.planner.invocations(), 1, "concurrent misses must share one plan");
}

#[tokio::test]
async fn test_get_options_chain() {
    let (_state, router, _dir) = router_over_fixture().await;
    let envelope =
        call(&router, "get_options", json!({"symbol": "SPX", "date": "2024-06-21"})).await;
    assert_envelope_invariants(&envelope);
    assert_eq!(envelope["data"]["symbol"], "SPX");
    assert_eq!(envelope["data"]["expiry"], "2024-06-21");
    let chain = envelope["data"]["chain"].as_array().unwrap();
    assert_eq!(chain.len(), 4);
    for row in chain {
        assert!(row["strike"].as_f64().unwrap() > 0.0);
        if let (Some(bid), Some(ask)) = (row["bid"].as_f64(), row["ask"].as_f64()) {
            assert!(bid <= ask);
        }
    }
}

#[tokio::test]
async fn test_get_options_covered_but_absent_chain_is_empty() {
    let (_state, router, _dir) = router_over_fixture().await;
    // Partition options_spx_2024_06 covers June; no rows at this expiry
    let envelope =
        call(&router, "get_options", json!({"symbol": "SPX", "date": "2024-06-07"})).await;
    assert_eq!(envelope["ok"], true);
    assert_eq!(envelope["data"]["chain"], json!([]));
    assert_eq!(envelope["meta"]["count"], 0);
}

#[tokio::test]
async fn test_get_options_uncovered_expiry_is_not_found() {
    let (_state, router, _dir) = router_over_fixture().await;
    let envelope =
        call(&router, "get_options", json!({"symbol": "SPX", "date": "2023-06-16"})).await;
    assert_eq!(envelope["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_list_datasets() {
    let (_state, router, _dir) = router_over_fixture().await;
    let envelope = call(&router, "list_datasets", json!({})).await;
    assert_envelope_invariants(&envelope);
    let datasets = envelope["data"]["datasets"].as_array().unwrap();
    assert_eq!(datasets.len(), 3);
    let daily = datasets
        .iter()
        .find(|d| d["granularity"] == "1d")
        .expect("daily dataset present");
    assert_eq!(daily["symbol"], "SPY");
    assert_eq!(daily["kind"], "bars");
    assert_eq!(daily["from"], "2020-01-01");
    assert_eq!(daily["to"], "2024-12-31");
    assert_eq!(daily["partitions"], 1);
}

#[tokio::test]
async fn test_provider_status_healthy() {
    let (_state, router, _dir) = router_over_fixture().await;
    let envelope = call(&router, "provider_status", json!({})).await;
    assert_envelope_invariants(&envelope);
    let providers = envelope["data"]["providers"].as_array().unwrap();
    assert!(!providers.is_empty());
    for provider in providers {
        assert_eq!(provider["available"], true);
        assert!(provider["response_time_ms"].as_f64().unwrap() >= 0.0);
        let checked = provider["last_check"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(checked).is_ok());
    }
}

#[tokio::test]
async fn test_provider_status_detailed_includes_per_tool_metrics() {
    let (_state, router, _dir) = router_over_fixture().await;
    // Generate some samples first
    call(&router, "version", json!({})).await;
    call(&router, "version", json!({})).await;
    let envelope = call(&router, "provider_status", json!({"output": "detailed"})).await;
    let per_tool = &envelope["data"]["performance"]["per_tool"];
    assert!(per_tool["version"]["count"].as_u64().unwrap() >= 2);
}

#[tokio::test]
async fn test_degraded_root_unavailable_everywhere() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("does-not-exist");
    let state = common::fixture_state(&missing).await;
    let router = ToolRouter::new(Arc::clone(&state));

    let status = call(&router, "provider_status", json!({})).await;
    let providers = status["data"]["providers"].as_array().unwrap();
    assert_eq!(providers.len(), 1);
    assert_eq!(providers[0]["available"], false);

    let bars = call(
        &router,
        "get_bars",
        json!({"symbol": "SPY", "from": "2024-01-01", "to": "2024-01-31"}),
    )
    .await;
    assert_eq!(bars["ok"], false);
    assert_eq!(bars["error"]["code"], "PROVIDER_UNAVAILABLE");

    let inventory = call(&router, "data_inventory", json!({})).await;
    assert_eq!(inventory["error"]["code"], "PROVIDER_UNAVAILABLE");
}

#[tokio::test]
async fn test_data_inventory_reports_coverage_and_gaps() {
    let (_state, router, _dir) = router_over_fixture().await;
    let envelope = call(
        &router,
        "data_inventory",
        json!({"symbol": "SPY", "from": "2024-01-02", "to": "2024-01-12"}),
    )
    .await;
    assert_envelope_invariants(&envelope);
    let data = &envelope["data"];
    assert_eq!(data["symbol"], "SPY");
    // Every weekday in this window has a bar
    assert!(data["coverage_pct"].as_f64().unwrap() >= 99.0);
    assert_eq!(data["missing_samples"], json!([]));
    assert_eq!(data["recommendations"][0]["action"], "DATA_READY");
}

#[tokio::test]
async fn test_data_inventory_sparse_range_recommends_acquisition() {
    let (_state, router, _dir) = router_over_fixture().await;
    // The daily partition spans 2020-2024 but only January 2024 has rows
    let envelope = call(
        &router,
        "data_inventory",
        json!({"symbol": "SPY", "from": "2020-01-01", "to": "2023-12-31"}),
    )
    .await;
    let data = &envelope["data"];
    assert!(data["coverage_pct"].as_f64().unwrap() < 10.0);
    assert_eq!(data["recommendations"][0]["action"], "ACQUIRE_DATA");
    assert_eq!(data["recommendations"][0]["priority"], "HIGH");
    // Sample lists are capped at ten entries
    assert!(data["missing_samples"].as_array().unwrap().len() <= 10);
    assert!(data["available_samples"].as_array().unwrap().len() <= 10);
}

#[tokio::test]
async fn test_data_inventory_defaults_from_catalog() {
    let (_state, router, _dir) = router_over_fixture().await;
    let envelope = call(&router, "data_inventory", json!({})).await;
    assert_eq!(envelope["ok"], true);
    // First bar dataset alphabetically is SPY
    assert_eq!(envelope["data"]["symbol"], "SPY");
}

#[tokio::test]
async fn test_metrics_recorded_for_tool_calls() {
    let (state, router, _dir) = router_over_fixture().await;
    call(&router, "version", json!({})).await;
    call(
        &router,
        "get_bars",
        json!({"symbol": "SPY", "from": "2024-02-30", "to": "2024-03-01"}),
    )
    .await;

    let snapshot = state.metrics.snapshot();
    assert_eq!(snapshot.per_tool["version"].count, 1);
    assert!((snapshot.per_tool["version"].success_rate - 1.0).abs() < 1e-9);
    assert_eq!(snapshot.per_tool["get_bars"].count, 1);
    assert!((snapshot.per_tool["get_bars"].success_rate - 0.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_unknown_tool_returns_none() {
    let (_state, router, _dir) = router_over_fixture().await;
    assert!(router.call("nope", json!({})).await.is_none());
}
