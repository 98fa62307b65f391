//! MQTT → OEE → InfluxDB 桥接进程。

mod bridge;
mod context;
mod error;

use context::AppContext;
use error::BridgeError;
use oee_config::{BridgeConfig, IntervalSource};
use oee_telemetry::{init_tracing, metrics};
use std::process::ExitCode;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 初始化结构化日志（配置错误也需要输出）
    init_tracing();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(target: "oee.bridge", error = %err, exit_code = err.exit_code(), "bridge_exit");
            ExitCode::from(err.exit_code())
        }
    }
}

async fn run() -> Result<(), BridgeError> {
    // 从配置文件加载运行配置（缺失即退出）
    let config = BridgeConfig::load()?;
    if config.interval_source == IntervalSource::Legacy {
        warn!(
            target: "oee.bridge",
            "loggingInterval is deprecated, move it to influxdb.logging_interval"
        );
    }
    info!(
        target: "oee.bridge",
        machines = config.machines.len(),
        interval_ms = config.logging_interval_ms,
        metrics_mode = %config.metrics_mode,
        validation = %config.validation,
        measurement = ?config.measurement,
        "config_loaded"
    );

    // 构建应用上下文：设备表、InfluxDB 客户端、采样发布器
    let ctx = AppContext::build(config)?;
    // 时序库探活（严格模式下失败即退出）
    ctx.check_database().await?;

    // 启动 MQTT 采集，等待致命错误或 Ctrl-C
    let mut ingest = bridge::spawn_ingest(&ctx);
    let outcome = tokio::select! {
        joined = &mut ingest => bridge::ingest_outcome(joined),
        _ = tokio::signal::ctrl_c() => {
            info!(target: "oee.bridge", "shutdown_requested");
            ingest.abort();
            Ok(())
        }
    };

    let stopped = ctx.publisher.stop_all().await;
    let snapshot = metrics().snapshot();
    info!(
        target: "oee.bridge",
        publishers_stopped = stopped,
        messages_received = snapshot.messages_received,
        dropped_unknown_topic = snapshot.dropped_unknown_topic,
        decode_failures = snapshot.decode_failures,
        computation_failures = snapshot.computation_failures,
        samples_written = snapshot.write_success,
        write_failures = snapshot.write_failure,
        "bridge_stopped"
    );
    outcome
}
