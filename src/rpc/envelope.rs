//! Domain response envelope and record serialization.
//!
//! Every tool payload travels as `{schema, ok, data, error, meta}` inside
//! the JSON-RPC result. Bars use short field names on the wire; canonical
//! records keep their long names in memory.

use serde::Serialize;
use serde_json::{json, Value};

use crate::models::{Bar, OptionRow};
use crate::utils::error::ServiceError;
use crate::utils::time::{format_timestamp_ms, now_timestamp_ms};

pub const SCHEMA: &str = "stroll.history.v1";
pub const SERVICE_NAME: &str = "stroll.history";
pub const SERVICE_VERSION: &str = "1.0.0";

#[derive(Debug, Serialize)]
struct ErrBody {
    code: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct Meta {
    #[serde(skip_serializing_if = "Option::is_none")]
    count: Option<usize>,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct Envelope {
    schema: &'static str,
    ok: bool,
    data: Value,
    error: Option<ErrBody>,
    meta: Meta,
}

fn render(envelope: &Envelope) -> String {
    serde_json::to_string(envelope).unwrap_or_else(|e| {
        format!(
            "{{\"schema\":\"{}\",\"ok\":false,\"data\":null,\"error\":{{\"code\":\"INTERNAL_ERROR\",\"message\":\"envelope serialization: {}\"}},\"meta\":{{\"timestamp\":\"{}\"}}}}",
            SCHEMA, e, now_timestamp_ms()
        )
    })
}

/// Successful envelope; `count` lands in `meta.count` when given
pub fn success(data: Value, count: Option<usize>) -> String {
    render(&Envelope {
        schema: SCHEMA,
        ok: true,
        data,
        error: None,
        meta: Meta { count, timestamp: now_timestamp_ms() },
    })
}

/// Failed envelope carrying the client-visible error kind
pub fn failure(err: &ServiceError) -> String {
    render(&Envelope {
        schema: SCHEMA,
        ok: false,
        data: Value::Null,
        error: Some(ErrBody { code: err.client_code(), message: err.to_string() }),
        meta: Meta { count: None, timestamp: now_timestamp_ms() },
    })
}

/// Bar record with wire-short field names
pub fn bar_json(bar: &Bar) -> Value {
    json!({
        "t": format_timestamp_ms(bar.t),
        "o": bar.open,
        "h": bar.high,
        "l": bar.low,
        "c": bar.close,
        "v": bar.volume,
        "symbol": bar.symbol,
        "g": bar.granularity,
    })
}

pub fn option_row_json(row: &OptionRow) -> Value {
    json!({
        "symbol": row.symbol,
        "expiry": row.expiry.to_string(),
        "right": row.right,
        "strike": row.strike,
        "bid": row.bid,
        "ask": row.ask,
        "mid": row.mid,
        "delta": row.delta,
        "gamma": row.gamma,
    })
}

/// Constant `discover` payload, rendered once at startup
pub fn discover_envelope() -> String {
    success(
        json!({
            "service": SERVICE_NAME,
            "version": SERVICE_VERSION,
            "description": "historical market-data query service over local partitions",
            "protocol": "json-rpc-2.0",
            "transport": "stdio",
            "commands": [
                "version",
                "discover",
                "list-datasets",
                "get-bars",
                "get-options",
                "provider-status",
                "data-inventory",
            ],
        }),
        None,
    )
}

/// Constant `version` payload
pub fn version_envelope() -> String {
    success(json!({ "service": SERVICE_NAME, "version": SERVICE_VERSION }), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Granularity, Price, SymbolInterner};
    use chrono::NaiveDate;

    #[test]
    fn test_success_envelope_shape() {
        let payload = success(json!({"x": 1}), Some(3));
        let v: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(v["schema"], SCHEMA);
        assert_eq!(v["ok"], true);
        assert_eq!(v["data"]["x"], 1);
        assert!(v["error"].is_null());
        assert_eq!(v["meta"]["count"], 3);
        // meta.timestamp parses as a wire timestamp
        let ts = v["meta"]["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
        assert!(ts.ends_with('Z'));
    }

    #[test]
    fn test_failure_envelope_shape() {
        let err = ServiceError::invalid_argument("bad date");
        let payload = failure(&err);
        let v: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(v["ok"], false);
        assert!(v["data"].is_null());
        assert_eq!(v["error"]["code"], "INVALID_ARGUMENT");
        assert_eq!(v["error"]["message"], "bad date");
    }

    #[test]
    fn test_ok_iff_error_null() {
        let ok: Value = serde_json::from_str(&success(json!({}), None)).unwrap();
        assert!(ok["ok"].as_bool().unwrap() && ok["error"].is_null());
        let bad: Value =
            serde_json::from_str(&failure(&ServiceError::not_found("nope"))).unwrap();
        assert!(!bad["ok"].as_bool().unwrap() && !bad["error"].is_null());
    }

    #[test]
    fn test_partition_errors_surface_as_data_error() {
        let payload = failure(&ServiceError::partition_corrupt("torn page"));
        let v: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(v["error"]["code"], "DATA_ERROR");
    }

    #[test]
    fn test_bar_short_field_names() {
        let interner = SymbolInterner::new();
        let bar = Bar {
            symbol: interner.intern("SPY").unwrap(),
            t: NaiveDate::from_ymd_opt(2024, 1, 5)
                .unwrap()
                .and_hms_opt(21, 0, 0)
                .unwrap()
                .and_utc(),
            open: Price::from_f64(468.5).unwrap(),
            high: Price::from_f64(470.1).unwrap(),
            low: Price::from_f64(467.0).unwrap(),
            close: Price::from_f64(469.25).unwrap(),
            volume: 80_500_000,
            granularity: Granularity::OneDay,
        };
        let v = bar_json(&bar);
        assert_eq!(v["t"], "2024-01-05T21:00:00.000Z");
        assert_eq!(v["o"], 468.5);
        assert_eq!(v["h"], 470.1);
        assert_eq!(v["l"], 467.0);
        assert_eq!(v["c"], 469.25);
        assert_eq!(v["v"], 80_500_000);
        assert_eq!(v["symbol"], "SPY");
        assert_eq!(v["g"], "1d");
    }

    #[test]
    fn test_discover_lists_command_names() {
        let v: Value = serde_json::from_str(&discover_envelope()).unwrap();
        assert_eq!(v["data"]["service"], SERVICE_NAME);
        assert_eq!(v["data"]["version"], "1.0.0");
        let commands: Vec<&str> = v["data"]["commands"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|c| c.as_str())
            .collect();
        for required in
            ["version", "discover", "list-datasets", "get-bars", "get-options", "provider-status"]
        {
            assert!(commands.contains(&required), "missing command {}", required);
        }
    }

    #[test]
    fn test_version_payload() {
        let v: Value = serde_json::from_str(&version_envelope()).unwrap();
        assert_eq!(v["schema"], "stroll.history.v1");
        assert_eq!(v["ok"], true);
        assert_eq!(v["data"]["service"], "stroll.history");
        assert_eq!(v["data"]["version"], "1.0.0");
    }
}
