//! 日志初始化与基础计数器。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 基础指标快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub messages_received: u64,
    pub dropped_unknown_topic: u64,
    pub decode_failures: u64,
    pub computation_failures: u64,
    pub metrics_updated: u64,
    pub publishers_started: u64,
    pub write_success: u64,
    pub write_failure: u64,
}

/// 基础指标（进程级原子计数）。
pub struct TelemetryMetrics {
    messages_received: AtomicU64,
    dropped_unknown_topic: AtomicU64,
    decode_failures: AtomicU64,
    computation_failures: AtomicU64,
    metrics_updated: AtomicU64,
    publishers_started: AtomicU64,
    write_success: AtomicU64,
    write_failure: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            messages_received: AtomicU64::new(0),
            dropped_unknown_topic: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            computation_failures: AtomicU64::new(0),
            metrics_updated: AtomicU64::new(0),
            publishers_started: AtomicU64::new(0),
            write_success: AtomicU64::new(0),
            write_failure: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            dropped_unknown_topic: self.dropped_unknown_topic.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            computation_failures: self.computation_failures.load(Ordering::Relaxed),
            metrics_updated: self.metrics_updated.load(Ordering::Relaxed),
            publishers_started: self.publishers_started.load(Ordering::Relaxed),
            write_success: self.write_success.load(Ordering::Relaxed),
            write_failure: self.write_failure.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 记录 MQTT 报文接收次数。
pub fn record_message_received() {
    metrics().messages_received.fetch_add(1, Ordering::Relaxed);
}

/// 记录未知 topic 丢弃次数。
pub fn record_dropped_unknown_topic() {
    metrics()
        .dropped_unknown_topic
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录解码失败次数（JSON 错误、缺字段、字段非法）。
pub fn record_decode_failure() {
    metrics().decode_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录计算失败次数（除零）。
pub fn record_computation_failure() {
    metrics()
        .computation_failures
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录最新指标更新次数。
pub fn record_metrics_updated() {
    metrics().metrics_updated.fetch_add(1, Ordering::Relaxed);
}

/// 记录发布任务创建次数。
pub fn record_publisher_started() {
    metrics()
        .publishers_started
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录样本写入成功次数。
pub fn record_write_success() {
    metrics().write_success.fetch_add(1, Ordering::Relaxed);
}

/// 记录样本写入失败次数。
pub fn record_write_failure() {
    metrics().write_failure.fetch_add(1, Ordering::Relaxed);
}
