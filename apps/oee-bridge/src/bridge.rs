//! 采集链路装配模块
//!
//! 将 MQTT 采集源、报文解码、OEE 计算与采样发布串成一条链路：
//! 报文 → 解码（topic → 设备，字段校验）→ 计算指标 → 覆盖设备的最新指标槽位。
//! 时序库写入由各设备的发布任务按周期完成，报文处理不等待写入。

use crate::context::AppContext;
use crate::error::BridgeError;
use domain::{RawEvent, ValidationMode};
use oee_decode::{DecodeError, MessageDecoder};
use oee_ingest::{IngestError, MqttSource, RawEventHandler, Source};
use oee_pipeline::SamplePublisher;
use oee_telemetry::{
    record_computation_failure, record_decode_failure, record_dropped_unknown_topic,
    record_message_received, record_metrics_updated,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 报文处理器
///
/// 实现了 `RawEventHandler` 接口，每条报文只影响对应设备的最新指标。
pub struct BridgeHandler {
    /// 解码器（设备表 + 指标模式）
    decoder: MessageDecoder,
    /// 缺字段处理策略
    validation: ValidationMode,
    /// 采样发布器
    publisher: SamplePublisher,
}

impl BridgeHandler {
    pub fn new(
        decoder: MessageDecoder,
        validation: ValidationMode,
        publisher: SamplePublisher,
    ) -> Self {
        Self {
            decoder,
            validation,
            publisher,
        }
    }

    fn machine_name(&self, topic: &str) -> String {
        self.decoder
            .registry()
            .find(topic)
            .map(|machine| machine.name.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl RawEventHandler for BridgeHandler {
    async fn handle(&self, event: RawEvent) -> Result<(), IngestError> {
        record_message_received();
        debug!(
            target: "oee.bridge",
            topic = %event.topic,
            payload_size = event.payload.len(),
            received_at_ms = event.received_at_ms,
            "message_received"
        );

        // 1. 解码：topic → 设备，payload → 读数 / 预计算指标
        let (machine, payload) = match self.decoder.decode(&event.topic, &event.payload) {
            Ok(decoded) => decoded,
            Err(DecodeError::UnknownTopic(topic)) => {
                record_dropped_unknown_topic();
                error!(target: "oee.bridge", topic = %topic, "message_unknown_topic");
                return Ok(());
            }
            Err(err @ DecodeError::MissingField(_)) if self.validation.is_strict() => {
                record_decode_failure();
                let machine = self.machine_name(&event.topic);
                error!(
                    target: "oee.bridge",
                    machine = %machine,
                    topic = %event.topic,
                    error = %err,
                    "message_missing_field_fatal"
                );
                return Err(IngestError::Rejected(format!("{} ({})", err, machine)));
            }
            Err(err) => {
                record_decode_failure();
                warn!(
                    target: "oee.bridge",
                    machine = %self.machine_name(&event.topic),
                    topic = %event.topic,
                    error = %err,
                    "message_decode_failed"
                );
                return Ok(());
            }
        };

        // 2. 计算：除零直接丢弃本条报文，槽位保持上一次的指标
        let metrics = match oee_calc::derive(payload) {
            Ok(metrics) => metrics,
            Err(err) => {
                record_computation_failure();
                warn!(
                    target: "oee.bridge",
                    machine = %machine.name,
                    topic = %machine.topic,
                    error = %err,
                    "metrics_computation_failed"
                );
                return Ok(());
            }
        };

        // 3. 覆盖最新指标，首条报文时创建该设备的发布任务
        record_metrics_updated();
        info!(
            target: "oee.bridge",
            machine = %machine.name,
            availability = metrics.availability,
            performance = metrics.performance,
            quality = metrics.quality,
            oee = metrics.oee,
            "metrics_updated"
        );
        self.publisher.update(&machine, metrics).await;
        Ok(())
    }
}

/// 启动采集任务
///
/// 采集源只在严格模式的致命错误（订阅失败、报文缺字段）时返回。
pub fn spawn_ingest(ctx: &AppContext) -> tokio::task::JoinHandle<Result<(), IngestError>> {
    let handler = Arc::new(BridgeHandler::new(
        ctx.decoder(),
        ctx.config.validation,
        ctx.publisher.clone(),
    ));
    let mqtt_config = ctx.mqtt_source_config();
    info!(
        target: "oee.bridge",
        host = %mqtt_config.host,
        port = mqtt_config.port,
        topics = ?mqtt_config.topics,
        "ingest_source_mqtt"
    );
    let source: Arc<dyn Source> = Arc::new(MqttSource::new(mqtt_config));
    tokio::spawn(async move { source.run(handler).await })
}

/// 采集任务结束后的进程结果：正常结束为 Ok，源错误与任务 panic 都按失败退出。
pub fn ingest_outcome(
    joined: Result<Result<(), IngestError>, tokio::task::JoinError>,
) -> Result<(), BridgeError> {
    match joined {
        Ok(Ok(())) => {
            info!(target: "oee.bridge", "ingest_finished");
            Ok(())
        }
        Ok(Err(err)) => Err(BridgeError::from(err)),
        Err(err) => {
            error!(target: "oee.bridge", error = %err, "ingest_task_failed");
            Err(BridgeError::from(err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{MachineConfig, MetricsMode};
    use oee_decode::MachineRegistry;
    use oee_ingest::ChannelSource;
    use oee_pipeline::StorageSampleWriter;
    use oee_storage::InMemorySampleStore;
    use std::time::Duration;
    use tokio::sync::mpsc;

    const INTERVAL: Duration = Duration::from_millis(1000);

    struct Harness {
        store: Arc<InMemorySampleStore>,
        publisher: SamplePublisher,
        handler: Arc<BridgeHandler>,
    }

    fn harness(mode: MetricsMode, validation: ValidationMode) -> Harness {
        let registry = Arc::new(MachineRegistry::new(vec![
            MachineConfig::new("press-1", "factory/press-1"),
            MachineConfig::new("press-2", "factory/press-2"),
        ]));
        let store = Arc::new(InMemorySampleStore::new());
        let writer = Arc::new(StorageSampleWriter::new(store.clone()));
        let publisher = SamplePublisher::new(writer, INTERVAL);
        let handler = Arc::new(BridgeHandler::new(
            MessageDecoder::new(registry, mode),
            validation,
            publisher.clone(),
        ));
        Harness {
            store,
            publisher,
            handler,
        }
    }

    fn event(topic: &str, payload: &str) -> RawEvent {
        RawEvent {
            topic: topic.to_string(),
            payload: payload.as_bytes().to_vec(),
            received_at_ms: 1,
        }
    }

    const FIRST: &str =
        r#"{"runTime":8,"totalTime":10,"targetSpeed":5,"totalProduced":35,"goodProduced":30}"#;
    const SECOND: &str =
        r#"{"runTime":10,"totalTime":10,"targetSpeed":5,"totalProduced":50,"goodProduced":25}"#;

    #[tokio::test(start_paused = true)]
    async fn next_tick_uses_latest_message_only() {
        let h = harness(MetricsMode::Computed, ValidationMode::Lenient);
        h.handler
            .handle(event("factory/press-1", FIRST))
            .await
            .expect("first");
        h.handler
            .handle(event("factory/press-1", SECOND))
            .await
            .expect("second");
        tokio::time::sleep(Duration::from_millis(1100)).await;

        let samples = h.store.samples_for("press-1");
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].metrics.availability, 1.0);
        assert_eq!(samples[0].metrics.quality, 0.5);
        assert_eq!(h.publisher.active().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reference_reading_is_published() {
        let h = harness(MetricsMode::Computed, ValidationMode::Lenient);
        h.handler
            .handle(event("factory/press-2", FIRST))
            .await
            .expect("handled");
        tokio::time::sleep(Duration::from_millis(1100)).await;

        let samples = h.store.samples_for("press-2");
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].machine.topic, "factory/press-2");
        assert!((samples[0].metrics.oee - 0.6).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_topic_is_dropped() {
        let h = harness(MetricsMode::Computed, ValidationMode::Strict);
        h.handler
            .handle(event("factory/lathe-9", FIRST))
            .await
            .expect("dropped without error");
        tokio::time::sleep(Duration::from_millis(3000)).await;
        assert!(h.store.is_empty());
        assert_eq!(h.publisher.active().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn lenient_missing_field_is_skipped() {
        let h = harness(MetricsMode::Computed, ValidationMode::Lenient);
        let missing = r#"{"runTime":8,"totalTime":10,"targetSpeed":5,"totalProduced":35}"#;
        h.handler
            .handle(event("factory/press-1", missing))
            .await
            .expect("skipped");
        tokio::time::sleep(Duration::from_millis(3000)).await;
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn strict_missing_field_stops_the_source() {
        let h = harness(MetricsMode::Computed, ValidationMode::Strict);
        let (sender, receiver) = mpsc::channel(4);
        let missing = r#"{"runTime":8,"totalTime":10,"targetSpeed":5,"totalProduced":35}"#;
        sender
            .send(event("factory/press-1", missing))
            .await
            .expect("send");
        sender
            .send(event("factory/press-1", FIRST))
            .await
            .expect("send");
        drop(sender);

        let source = ChannelSource::new(receiver);
        let err = source.run(h.handler.clone()).await.expect_err("rejected");
        assert!(matches!(err, IngestError::Rejected(_)));
        assert!(err.to_string().contains("goodProduced"));
        assert_eq!(h.publisher.active().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn division_by_zero_keeps_previous_metrics() {
        let h = harness(MetricsMode::Computed, ValidationMode::Strict);
        let zero_produced =
            r#"{"runTime":8,"totalTime":10,"targetSpeed":5,"totalProduced":0,"goodProduced":0}"#;
        h.handler
            .handle(event("factory/press-1", FIRST))
            .await
            .expect("first");
        h.handler
            .handle(event("factory/press-1", zero_produced))
            .await
            .expect("skipped");
        tokio::time::sleep(Duration::from_millis(1100)).await;

        let samples = h.store.samples();
        assert_eq!(samples.len(), 1);
        assert!(samples[0].metrics.oee.is_finite());
        assert!((samples[0].metrics.oee - 0.6).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn passthrough_metrics_are_forwarded() {
        let h = harness(MetricsMode::Passthrough, ValidationMode::Lenient);
        let metrics = r#"{"availability":0.9,"performance":0.8,"quality":0.95,"oee":0.684}"#;
        h.handler
            .handle(event("factory/press-1", metrics))
            .await
            .expect("handled");
        tokio::time::sleep(Duration::from_millis(1100)).await;

        let samples = h.store.samples();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].metrics.oee, 0.684);
    }

    #[tokio::test]
    async fn ingest_outcome_maps_task_results() {
        assert!(ingest_outcome(Ok(Ok(()))).is_ok());

        let rejected = ingest_outcome(Ok(Err(IngestError::Rejected("goodProduced".to_string()))))
            .expect_err("rejected");
        assert_eq!(rejected.exit_code(), 9);

        let task: tokio::task::JoinHandle<Result<(), IngestError>> =
            tokio::spawn(async { panic!("handler crashed") });
        let err = ingest_outcome(task.await).expect_err("panicked");
        assert!(matches!(err, BridgeError::IngestTask(_)));
        assert_ne!(err.exit_code(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_payload_does_not_affect_other_machines() {
        let h = harness(MetricsMode::Computed, ValidationMode::Strict);
        h.handler
            .handle(event("factory/press-1", "{not json"))
            .await
            .expect("skipped");
        h.handler
            .handle(event("factory/press-2", FIRST))
            .await
            .expect("handled");
        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert!(h.store.samples_for("press-1").is_empty());
        assert_eq!(h.store.samples_for("press-2").len(), 1);
    }
}
