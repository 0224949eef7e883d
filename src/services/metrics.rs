//! Per-tool latency and success telemetry.
//!
//! A bounded, lock-free sample ring. Appends claim a slot from an atomic
//! cursor and publish it through a per-slot sequence counter (odd while a
//! write is in flight); wrap-around overwrites the oldest slot. Snapshots
//! read whatever slots are stable at call time and skip torn ones, so
//! writers are never blocked by readers or by each other.
//!
//! Tool names are registered at construction so a slot stores a plain
//! index; samples recorded against an unregistered name land in the
//! `other` bucket.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, AtomicUsize, Ordering};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Bucket for samples recorded against a name outside the registry
pub const OTHER_TOOL: &str = "other";

#[derive(Debug, Clone)]
pub struct MetricSample {
    pub tool: &'static str,
    pub latency_ms: f64,
    pub success: bool,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolStats {
    pub count: usize,
    pub avg_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub per_tool: BTreeMap<String, ToolStats>,
    pub overall: ToolStats,
    /// Requests per second over the trailing minute
    pub rps_1m: f64,
}

/// One ring slot. `seq` is 0 until the first write, odd while a write is
/// in progress, and even once the payload fields are stable.
struct Slot {
    seq: AtomicU64,
    tool: AtomicU32,
    latency_bits: AtomicU64,
    success: AtomicU32,
    at_ms: AtomicI64,
}

impl Slot {
    fn empty() -> Self {
        Self {
            seq: AtomicU64::new(0),
            tool: AtomicU32::new(0),
            latency_bits: AtomicU64::new(0),
            success: AtomicU32::new(0),
            at_ms: AtomicI64::new(0),
        }
    }
}

pub struct MetricsRing {
    /// Registered tool names; a slot's `tool` field indexes into this
    tools: Vec<&'static str>,
    slots: Box<[Slot]>,
    /// Total samples ever recorded; slot index is `cursor % capacity`
    cursor: AtomicUsize,
}

impl MetricsRing {
    pub fn new(capacity: usize, tools: Vec<&'static str>) -> Self {
        let capacity = capacity.max(1);
        let slots: Vec<Slot> = (0..capacity).map(|_| Slot::empty()).collect();
        Self { tools, slots: slots.into_boxed_slice(), cursor: AtomicUsize::new(0) }
    }

    /// Append one sample. Wait-free: one fetch_add to claim a slot, plain
    /// stores to fill it, and the sequence counter to publish it.
    pub fn record(&self, tool: &str, latency_ms: f64, success: bool) {
        let tool_id = self
            .tools
            .iter()
            .position(|t| *t == tool)
            .unwrap_or(self.tools.len()) as u32;
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.slots.len();
        let slot = &self.slots[index];

        slot.seq.fetch_add(1, Ordering::AcqRel);
        slot.tool.store(tool_id, Ordering::Relaxed);
        slot.latency_bits.store(latency_ms.to_bits(), Ordering::Relaxed);
        slot.success.store(success as u32, Ordering::Relaxed);
        slot.at_ms.store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        slot.seq.fetch_add(1, Ordering::AcqRel);
    }

    pub fn len(&self) -> usize {
        self.cursor.load(Ordering::Relaxed).min(self.slots.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy all stable slots. A slot whose sequence is odd or changes
    /// mid-read is being rewritten and is skipped.
    fn collect(&self) -> Vec<MetricSample> {
        let mut samples = Vec::with_capacity(self.len());
        for slot in self.slots.iter() {
            let seq = slot.seq.load(Ordering::Acquire);
            if seq == 0 || seq % 2 == 1 {
                continue;
            }
            let tool_id = slot.tool.load(Ordering::Relaxed) as usize;
            let latency_ms = f64::from_bits(slot.latency_bits.load(Ordering::Relaxed));
            let success = slot.success.load(Ordering::Relaxed) == 1;
            let at_ms = slot.at_ms.load(Ordering::Relaxed);
            if slot.seq.load(Ordering::Acquire) != seq {
                continue;
            }
            let Some(at) = DateTime::from_timestamp_millis(at_ms) else {
                continue;
            };
            let tool = self.tools.get(tool_id).copied().unwrap_or(OTHER_TOOL);
            samples.push(MetricSample { tool, latency_ms, success, at });
        }
        samples
    }

    /// Summarize the ring at call time
    pub fn snapshot(&self) -> MetricsSnapshot {
        let samples = self.collect();

        let mut per_tool: BTreeMap<&'static str, Vec<&MetricSample>> = BTreeMap::new();
        for sample in &samples {
            per_tool.entry(sample.tool).or_default().push(sample);
        }

        let minute_ago = Utc::now() - Duration::seconds(60);
        let recent = samples.iter().filter(|s| s.at >= minute_ago).count();

        MetricsSnapshot {
            per_tool: per_tool
                .into_iter()
                .map(|(tool, group)| (tool.to_string(), stats_of(&group)))
                .collect(),
            overall: stats_of(&samples.iter().collect::<Vec<_>>()),
            rps_1m: recent as f64 / 60.0,
        }
    }
}

fn stats_of(samples: &[&MetricSample]) -> ToolStats {
    if samples.is_empty() {
        return ToolStats {
            count: 0,
            avg_ms: 0.0,
            p50_ms: 0.0,
            p95_ms: 0.0,
            p99_ms: 0.0,
            success_rate: 0.0,
        };
    }
    let mut latencies: Vec<f64> = samples.iter().map(|s| s.latency_ms).collect();
    latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let successes = samples.iter().filter(|s| s.success).count();
    let sum: f64 = latencies.iter().sum();
    ToolStats {
        count: samples.len(),
        avg_ms: sum / samples.len() as f64,
        p50_ms: percentile(&latencies, 50.0),
        p95_ms: percentile(&latencies, 95.0),
        p99_ms: percentile(&latencies, 99.0),
        success_rate: successes as f64 / samples.len() as f64,
    }
}

/// Nearest-rank percentile over an already-sorted slice
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p / 100.0 * (sorted.len() - 1) as f64).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}
