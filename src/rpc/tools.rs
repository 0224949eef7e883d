//! Tool registry and handlers.
//!
//! Handlers parse and validate arguments, route through the cache and
//! planner, and produce the serialized domain envelope. Argument problems
//! surface as `INVALID_ARGUMENT` envelopes; only protocol-level misuse
//! (unknown tool, malformed params object) is reported as a JSON-RPC error
//! by the dispatcher.

use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::catalog::DatasetKind;
use crate::models::{fingerprint, BarsQuery};
use crate::rpc::envelope;
use crate::utils::error::{ServiceError, ServiceResult};
use crate::utils::time::parse_iso_date;
use crate::ServiceState;

/// One tool as advertised through `tools/list`
pub struct ToolDef {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

pub fn tool_definitions() -> Vec<ToolDef> {
    vec![
        ToolDef {
            name: "discover",
            description: "Service metadata: name, version and available commands.",
            input_schema: json!({ "type": "object", "properties": {}, "additionalProperties": false }),
        },
        ToolDef {
            name: "version",
            description: "Service name and version.",
            input_schema: json!({ "type": "object", "properties": {}, "additionalProperties": false }),
        },
        ToolDef {
            name: "list_datasets",
            description: "Datasets present in the partition catalog with their covered spans.",
            input_schema: json!({ "type": "object", "properties": {}, "additionalProperties": false }),
        },
        ToolDef {
            name: "get_bars",
            description: "Historical OHLCV bars for a symbol over a date range.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "symbol": { "type": "string", "description": "Ticker symbol, e.g. SPY" },
                    "from": { "type": "string", "description": "Start date (YYYY-MM-DD, inclusive)" },
                    "to": { "type": "string", "description": "End date (YYYY-MM-DD, inclusive)" },
                    "granularity": {
                        "type": "string",
                        "description": "Bar cadence: 1m, 5m, 1h or 1d (default 1d)",
                        "enum": ["1m", "5m", "1h", "1d"]
                    }
                },
                "required": ["symbol", "from", "to"]
            }),
        },
        ToolDef {
            name: "get_options",
            description: "Stored option chain for a symbol at an expiry date.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "symbol": { "type": "string", "description": "Underlying symbol, e.g. SPX" },
                    "date": { "type": "string", "description": "Expiry date (YYYY-MM-DD)" }
                },
                "required": ["symbol", "date"]
            }),
        },
        ToolDef {
            name: "provider_status",
            description: "Availability and probe latency of the partition store, with per-tool performance metrics.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "output": {
                        "type": "string",
                        "description": "summary (default) or detailed",
                        "enum": ["summary", "detailed"]
                    }
                }
            }),
        },
        ToolDef {
            name: "data_inventory",
            description: "Coverage report: samples trading days across a range and reports gaps.",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "symbol": { "type": "string", "description": "Ticker symbol (default: first catalogued bar dataset)" },
                    "from": { "type": "string", "description": "Start date (default: dataset span start)" },
                    "to": { "type": "string", "description": "End date (default: dataset span end, clamped to today)" }
                }
            }),
        },
    ]
}

/// Registered tool names, in `tools/list` order; the metrics ring indexes
/// its samples against this registry
pub fn tool_names() -> Vec<&'static str> {
    tool_definitions().iter().map(|t| t.name).collect()
}

/// Byte payloads rendered once at startup and served by copy
pub struct StaticPayloads {
    pub discover: String,
    pub version: String,
    pub initialize_result: String,
    pub tools_list_result: String,
}

impl StaticPayloads {
    pub fn build() -> Self {
        let tools: Vec<Value> = tool_definitions()
            .into_iter()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description,
                    "inputSchema": t.input_schema,
                })
            })
            .collect();
        let tools_list_result = json!({ "tools": tools }).to_string();
        let initialize_result = json!({
            "protocolVersion": "2024-11-05",
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": envelope::SERVICE_NAME,
                "version": envelope::SERVICE_VERSION,
            },
        })
        .to_string();

        Self {
            discover: envelope::discover_envelope(),
            version: envelope::version_envelope(),
            initialize_result,
            tools_list_result,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GetBarsArgs {
    symbol: String,
    from: String,
    to: String,
    granularity: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GetOptionsArgs {
    symbol: String,
    date: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProviderStatusArgs {
    output: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DataInventoryArgs {
    symbol: Option<String>,
    from: Option<String>,
    to: Option<String>,
}

pub struct ToolRouter {
    state: std::sync::Arc<ServiceState>,
}

impl ToolRouter {
    pub fn new(state: std::sync::Arc<ServiceState>) -> Self {
        Self { state }
    }

    pub fn is_known(name: &str) -> bool {
        tool_definitions().iter().any(|t| t.name == name)
    }

    /// Run one tool call. Returns None for unknown tools (the dispatcher
    /// maps that to `-32601`); known tools always yield an envelope, with
    /// failures folded into `ok:false` payloads. A metric sample is
    /// recorded around every known-tool call.
    pub async fn call(&self, name: &str, arguments: Value) -> Option<String> {
        let started = Instant::now();
        let result: ServiceResult<String> = match name {
            "discover" => Ok(self.state.statics.discover.clone()),
            "version" => Ok(self.state.statics.version.clone()),
            "list_datasets" => self.list_datasets().await,
            "get_bars" => self.get_bars(arguments).await,
            "get_options" => self.get_options(arguments).await,
            "provider_status" => self.provider_status(arguments).await,
            "data_inventory" => self.data_inventory(arguments).await,
            _ => return None,
        };

        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        let (payload, success) = match result {
            Ok(payload) => (payload, true),
            Err(err) => {
                tracing::debug!("Tool {} failed: {} ({})", name, err, err.code());
                (envelope::failure(&err), false)
            },
        };
        self.state.metrics.record(name, latency_ms, success);
        Some(payload)
    }

    fn parse_args<T: serde::de::DeserializeOwned>(arguments: Value) -> ServiceResult<T> {
        let value = if arguments.is_null() { json!({}) } else { arguments };
        serde_json::from_value(value)
            .map_err(|e| ServiceError::invalid_argument(format!("invalid arguments: {}", e)))
    }

    async fn get_bars(&self, arguments: Value) -> ServiceResult<String> {
        let args: GetBarsArgs = Self::parse_args(arguments)?;
        let query = BarsQuery::parse(
            &self.state.interner,
            &args.symbol,
            &args.from,
            &args.to,
            args.granularity.as_deref(),
        )?;

        let key = fingerprint("get_bars", &query.fingerprint());
        let ttl = Duration::from_secs(self.state.config.cache.bars_ttl_secs);
        self.state
            .cache
            .get_or_compute(&key, ttl, || async {
                let bars = self.state.planner.bars(&query).await?;
                let rows: Vec<Value> = bars.iter().map(envelope::bar_json).collect();
                let data = json!({
                    "symbol": query.symbol,
                    "from": query.from.to_string(),
                    "to": query.to.to_string(),
                    "granularity": query.granularity,
                    "bars": rows,
                });
                Ok(envelope::success(data, Some(bars.len())))
            })
            .await
    }

    async fn get_options(&self, arguments: Value) -> ServiceResult<String> {
        let args: GetOptionsArgs = Self::parse_args(arguments)?;
        let symbol = self.state.interner.intern(&args.symbol)?;
        let expiry = parse_iso_date("date", &args.date)?;

        let key = fingerprint("get_options", &format!("{}|{}", symbol, expiry));
        let ttl = Duration::from_secs(self.state.config.cache.options_ttl_secs);
        self.state
            .cache
            .get_or_compute(&key, ttl, || async {
                let chain = self.state.planner.options(&symbol, expiry).await?;
                let rows: Vec<Value> = chain.iter().map(envelope::option_row_json).collect();
                let data = json!({
                    "symbol": symbol,
                    "expiry": expiry.to_string(),
                    "chain": rows,
                });
                Ok(envelope::success(data, Some(chain.len())))
            })
            .await
    }

    async fn list_datasets(&self) -> ServiceResult<String> {
        if self.state.catalog.is_degraded() {
            return Err(ServiceError::provider_unavailable(format!(
                "data root {} is unavailable",
                self.state.catalog.root().display()
            )));
        }

        let key = fingerprint("list_datasets", "all");
        let ttl = Duration::from_secs(self.state.config.cache.bars_ttl_secs);
        self.state
            .cache
            .get_or_compute(&key, ttl, || async {
                let datasets: Vec<Value> = self
                    .state
                    .catalog
                    .datasets()
                    .into_iter()
                    .map(|d| {
                        json!({
                            "symbol": d.symbol,
                            "kind": d.kind.as_str(),
                            "granularity": d.granularity,
                            "from": d.span.start.to_string(),
                            "to": d.span.end.to_string(),
                            "partitions": d.partitions,
                        })
                    })
                    .collect();
                let count = datasets.len();
                Ok(envelope::success(json!({ "datasets": datasets }), Some(count)))
            })
            .await
    }

    async fn provider_status(&self, arguments: Value) -> ServiceResult<String> {
        let args: ProviderStatusArgs = Self::parse_args(arguments)?;
        let detailed = matches!(args.output.as_deref(), Some("detailed"));

        let providers = self.state.health.check().await;
        let count = providers.len();
        let snapshot = self.state.metrics.snapshot();

        let performance = if detailed {
            json!({
                "overall": snapshot.overall,
                "per_tool": snapshot.per_tool,
                "rps_1m": snapshot.rps_1m,
            })
        } else {
            json!({
                "overall": snapshot.overall,
                "rps_1m": snapshot.rps_1m,
            })
        };

        let data = json!({
            "providers": providers,
            "performance": performance,
            "cache_entries": self.state.cache.len(),
            "open_partitions": self.state.store.open_partitions(),
        });
        Ok(envelope::success(data, Some(count)))
    }

    async fn data_inventory(&self, arguments: Value) -> ServiceResult<String> {
        let args: DataInventoryArgs = Self::parse_args(arguments)?;

        if self.state.catalog.is_degraded() {
            return Err(ServiceError::provider_unavailable(format!(
                "data root {} is unavailable",
                self.state.catalog.root().display()
            )));
        }

        // Defaults come from the catalog: first bar dataset (alphabetical)
        // and its covered span, clamped to today.
        let bar_datasets: Vec<_> = self
            .state
            .catalog
            .datasets()
            .into_iter()
            .filter(|d| d.kind == DatasetKind::Bars)
            .collect();

        let symbol = match &args.symbol {
            Some(raw) => self.state.interner.intern(raw)?,
            None => bar_datasets
                .first()
                .map(|d| d.symbol.clone())
                .ok_or_else(|| ServiceError::not_found("no bar datasets in catalog"))?,
        };

        let dataset_span = bar_datasets
            .iter()
            .filter(|d| d.symbol == symbol)
            .map(|d| d.span)
            .reduce(|mut acc, span| {
                acc.start = acc.start.min(span.start);
                acc.end = acc.end.max(span.end);
                acc
            });

        let today = Utc::now().date_naive();
        let from = match &args.from {
            Some(raw) => parse_iso_date("from", raw)?,
            None => dataset_span
                .map(|s| s.start)
                .ok_or_else(|| {
                    ServiceError::not_found(format!("no bar datasets for {}", symbol))
                })?,
        };
        let to = match &args.to {
            Some(raw) => parse_iso_date("to", raw)?,
            None => dataset_span
                .map(|s| s.end.min(today))
                .ok_or_else(|| {
                    ServiceError::not_found(format!("no bar datasets for {}", symbol))
                })?,
        };
        if from > to {
            return Err(ServiceError::invalid_argument(format!(
                "from ({}) must not be after to ({})",
                from, to
            )));
        }

        let key = fingerprint("data_inventory", &format!("{}|{}|{}", symbol, from, to));
        let ttl = Duration::from_secs(self.state.config.cache.bars_ttl_secs);
        self.state
            .cache
            .get_or_compute(&key, ttl, || async {
                let report = self.state.inventory.analyze(&symbol, from, to).await?;
                let count = report.probed;
                let data = serde_json::to_value(&report).map_err(|e| {
                    ServiceError::internal(format!("report serialization: {}", e))
                })?;
                Ok(envelope::success(data, Some(count)))
            })
            .await
    }
}
