//! 采样发布：每台设备一个长期运行的定时任务。
//!
//! 新报文只覆盖设备的“最新指标”槽位（`watch` 通道），不会重新创建定时任务；
//! 任务在每个周期读取槽位并写入一次样本。

use async_trait::async_trait;
use domain::{MachineConfig, OeeMetrics, Sample};
use oee_storage::SampleStore;
use oee_telemetry::{record_publisher_started, record_write_failure, record_write_success};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

/// 发布链路错误。
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("writer error: {0}")]
    Writer(String),
}

/// 样本写入器抽象。
#[async_trait]
pub trait SampleWriter: Send + Sync {
    async fn write(&self, sample: &Sample) -> Result<(), PipelineError>;
}

/// 基于存储层的写入器。
#[derive(Clone)]
pub struct StorageSampleWriter {
    store: Arc<dyn SampleStore>,
}

impl StorageSampleWriter {
    pub fn new(store: Arc<dyn SampleStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SampleWriter for StorageSampleWriter {
    async fn write(&self, sample: &Sample) -> Result<(), PipelineError> {
        self.store
            .write_sample(sample)
            .await
            .map_err(|err| PipelineError::Writer(err.to_string()))
    }
}

/// 单台设备的发布任务句柄。
#[derive(Debug)]
pub struct PublisherHandle {
    machine: MachineConfig,
    task: JoinHandle<()>,
}

impl PublisherHandle {
    pub fn machine(&self) -> &MachineConfig {
        &self.machine
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// 停止定时任务。
    pub fn stop(self) {
        self.task.abort();
    }
}

/// 启动单台设备的周期发布任务。
///
/// 首次写入发生在启动后一个周期；每个周期调用 `source()` 取当前指标并写入一次。
/// 写入失败只记录日志，不影响后续周期，也不缓存失败的样本。
pub fn spawn_publisher<F>(
    machine: MachineConfig,
    interval: Duration,
    source: F,
    writer: Arc<dyn SampleWriter>,
) -> PublisherHandle
where
    F: Fn() -> OeeMetrics + Send + Sync + 'static,
{
    record_publisher_started();
    let task_machine = machine.clone();
    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let sample = Sample {
                machine: task_machine.clone(),
                metrics: source(),
                ts_ms: now_epoch_ms(),
            };
            match writer.write(&sample).await {
                Ok(()) => {
                    record_write_success();
                    info!(
                        target: "oee.publisher",
                        machine = %sample.machine.name,
                        availability = sample.metrics.availability,
                        performance = sample.metrics.performance,
                        quality = sample.metrics.quality,
                        oee = sample.metrics.oee,
                        ts_ms = sample.ts_ms,
                        "sample_written"
                    );
                }
                Err(err) => {
                    record_write_failure();
                    warn!(
                        target: "oee.publisher",
                        machine = %sample.machine.name,
                        error = %err,
                        "sample_write_failed"
                    );
                }
            }
        }
    });
    PublisherHandle { machine, task }
}

struct MachineSlot {
    latest: watch::Sender<OeeMetrics>,
    handle: PublisherHandle,
}

struct PublisherInner {
    writer: Arc<dyn SampleWriter>,
    interval: Duration,
    slots: Mutex<HashMap<String, MachineSlot>>,
}

/// 所有设备的发布器注册表（按 topic 索引）。
#[derive(Clone)]
pub struct SamplePublisher {
    inner: Arc<PublisherInner>,
}

impl SamplePublisher {
    pub fn new(writer: Arc<dyn SampleWriter>, interval: Duration) -> Self {
        Self {
            inner: Arc::new(PublisherInner {
                writer,
                interval,
                slots: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// 更新设备的最新指标。
    ///
    /// 设备首次出现时创建定时任务；之后只替换槽位中的值。
    pub async fn update(&self, machine: &MachineConfig, metrics: OeeMetrics) {
        let mut slots = self.inner.slots.lock().await;
        if let Some(slot) = slots.get(&machine.topic) {
            if !slot.handle.is_finished() {
                slot.latest.send_replace(metrics);
                return;
            }
            // 任务已异常结束，下面重新创建
            warn!(
                target: "oee.publisher",
                machine = %machine.name,
                "publisher_task_restarted"
            );
        }

        let (latest, receiver) = watch::channel(metrics);
        let handle = spawn_publisher(
            machine.clone(),
            self.inner.interval,
            move || *receiver.borrow(),
            self.inner.writer.clone(),
        );
        info!(
            target: "oee.publisher",
            machine = %machine.name,
            topic = %machine.topic,
            interval_ms = self.inner.interval.as_millis() as u64,
            "publisher_started"
        );
        slots.insert(machine.topic.clone(), MachineSlot { latest, handle });
    }

    /// 当前设备的最新指标（无任务时为 None）。
    pub async fn current(&self, topic: &str) -> Option<OeeMetrics> {
        let slots = self.inner.slots.lock().await;
        slots.get(topic).map(|slot| *slot.latest.borrow())
    }

    /// 正在运行的发布任务数量。
    pub async fn active(&self) -> usize {
        let slots = self.inner.slots.lock().await;
        slots.len()
    }

    /// 停止单台设备的发布任务。
    pub async fn stop(&self, topic: &str) -> bool {
        let mut slots = self.inner.slots.lock().await;
        match slots.remove(topic) {
            Some(slot) => {
                info!(
                    target: "oee.publisher",
                    machine = %slot.handle.machine().name,
                    "publisher_stopped"
                );
                slot.handle.stop();
                true
            }
            None => false,
        }
    }

    /// 停止全部发布任务，返回停止的数量。
    pub async fn stop_all(&self) -> usize {
        let mut slots = self.inner.slots.lock().await;
        let count = slots.len();
        for (_, slot) in slots.drain() {
            info!(
                target: "oee.publisher",
                machine = %slot.handle.machine().name,
                "publisher_stopped"
            );
            slot.handle.stop();
        }
        count
    }
}

fn now_epoch_ms() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_millis() as i64
}
