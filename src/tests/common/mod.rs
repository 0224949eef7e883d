// Common test utilities and helpers

use std::path::Path;
use std::sync::Arc;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

use crate::config::Config;
use crate::ServiceState;

/// A bar fixture row: (timestamp, open, high, low, close, volume)
pub type BarFixture<'a> = (&'a str, f64, f64, f64, f64, i64);

/// An option fixture row: (right, strike, bid, ask)
pub type OptionFixture<'a> = (&'a str, f64, Option<f64>, Option<f64>);

async fn create_partition(path: &Path) -> SqlitePool {
    let options = SqliteConnectOptions::new().filename(path).create_if_missing(true);
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("Failed to create fixture partition")
}

/// Write a bar partition file with the canonical schema and indexes
pub async fn write_bars_partition(
    path: &Path,
    symbol: &str,
    granularity: &str,
    rows: &[BarFixture<'_>],
) {
    let pool = create_partition(path).await;
    sqlx::query(
        "CREATE TABLE bars (symbol TEXT NOT NULL, t TEXT NOT NULL, \
         o REAL NOT NULL, h REAL NOT NULL, l REAL NOT NULL, c REAL NOT NULL, \
         v INTEGER NOT NULL, g TEXT NOT NULL, UNIQUE(symbol, t, g))",
    )
    .execute(&pool)
    .await
    .expect("create bars table");
    for sql in [
        "CREATE INDEX idx_bars_symbol_t ON bars(symbol, t)",
        "CREATE INDEX idx_bars_symbol_g ON bars(symbol, g)",
        "CREATE INDEX idx_bars_t ON bars(t)",
    ] {
        sqlx::query(sql).execute(&pool).await.expect("create bars index");
    }

    for (t, o, h, l, c, v) in rows {
        sqlx::query(
            "INSERT INTO bars (symbol, t, o, h, l, c, v, g) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(symbol)
        .bind(t)
        .bind(o)
        .bind(h)
        .bind(l)
        .bind(c)
        .bind(v)
        .bind(granularity)
        .execute(&pool)
        .await
        .expect("insert bar row");
    }
    pool.close().await;
}

/// Write an options partition file with the canonical schema and indexes
pub async fn write_options_partition(
    path: &Path,
    symbol: &str,
    expiry: &str,
    rows: &[OptionFixture<'_>],
) {
    let pool = create_partition(path).await;
    sqlx::query(
        "CREATE TABLE options (symbol TEXT NOT NULL, expiry TEXT NOT NULL, \
         \"right\" TEXT NOT NULL, strike REAL NOT NULL, \
         bid REAL, ask REAL, mid REAL, delta REAL, gamma REAL, \
         UNIQUE(symbol, expiry, \"right\", strike))",
    )
    .execute(&pool)
    .await
    .expect("create options table");
    for sql in [
        "CREATE INDEX idx_options_symbol_expiry ON options(symbol, expiry)",
        "CREATE INDEX idx_options_expiry ON options(expiry)",
    ] {
        sqlx::query(sql).execute(&pool).await.expect("create options index");
    }

    for (right, strike, bid, ask) in rows {
        let mid = match (bid, ask) {
            (Some(b), Some(a)) => Some((b + a) / 2.0),
            _ => None,
        };
        sqlx::query(
            "INSERT INTO options (symbol, expiry, \"right\", strike, bid, ask, mid, delta, gamma) \
             VALUES (?, ?, ?, ?, ?, ?, ?, NULL, NULL)",
        )
        .bind(symbol)
        .bind(expiry)
        .bind(right)
        .bind(strike)
        .bind(bid)
        .bind(ask)
        .bind(mid)
        .execute(&pool)
        .await
        .expect("insert option row");
    }
    pool.close().await;
}

/// Weekday daily bars for early January 2024 (Jan 2..5 and Jan 8..12)
pub fn january_daily_bars() -> Vec<(String, f64, f64, f64, f64, i64)> {
    let days = ["02", "03", "04", "05", "08", "09", "10", "11", "12"];
    days.iter()
        .enumerate()
        .map(|(i, day)| {
            let base = 470.0 + i as f64;
            (
                format!("2024-01-{}T21:00:00.000Z", day),
                base,
                base + 2.0,
                base - 2.0,
                base + 1.0,
                1_000_000 + i as i64,
            )
        })
        .collect()
}

/// Standard fixture tree: SPY daily + minute bars and an SPX option chain
pub async fn populate_fixture_root(root: &Path) {
    let daily = january_daily_bars();
    let daily_refs: Vec<BarFixture<'_>> = daily
        .iter()
        .map(|(t, o, h, l, c, v)| (t.as_str(), *o, *h, *l, *c, *v))
        .collect();
    write_bars_partition(&root.join("spy_1d_2020_2024.db"), "SPY", "1d", &daily_refs).await;

    write_bars_partition(
        &root.join("spy_1min_2024.db"),
        "SPY",
        "1m",
        &[
            ("2024-01-02T14:30:00.000Z", 470.0, 470.4, 469.9, 470.2, 12_000),
            ("2024-01-02T14:31:00.000Z", 470.2, 470.5, 470.1, 470.3, 9_500),
            ("2024-01-02T14:32:00.000Z", 470.3, 470.6, 470.0, 470.1, 8_200),
        ],
    )
    .await;

    write_options_partition(
        &root.join("options_spx_2024_06.db"),
        "SPX",
        "2024-06-21",
        &[
            ("CALL", 4900.0, Some(120.5), Some(121.5)),
            ("CALL", 5000.0, Some(55.0), Some(56.0)),
            ("PUT", 4900.0, Some(48.0), Some(49.0)),
            ("PUT", 5000.0, Some(92.0), Some(93.5)),
        ],
    )
    .await;
}

/// Service state over a fixture root, discovered and probed
pub async fn fixture_state(root: &Path) -> Arc<ServiceState> {
    let mut config = Config::default();
    config.data.root = root.to_string_lossy().into_owned();
    let state = ServiceState::new(config);
    state.startup().await;
    state
}
