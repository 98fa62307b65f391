//! 样本内存实现
//!
//! 仅用于本地测试和占位。

use crate::error::StorageError;
use crate::traits::SampleStore;
use domain::Sample;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// 样本内存存储
pub struct InMemorySampleStore {
    samples: RwLock<Vec<Sample>>,
    reject_writes: AtomicBool,
}

impl InMemorySampleStore {
    /// 创建新的样本存储
    pub fn new() -> Self {
        Self {
            samples: RwLock::new(Vec::new()),
            reject_writes: AtomicBool::new(false),
        }
    }

    /// 模拟时序库不可达（用于测试写入失败路径）
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::Relaxed);
    }

    /// 已写入样本数量
    pub fn len(&self) -> usize {
        self.samples.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 已写入样本快照
    pub fn samples(&self) -> Vec<Sample> {
        self.samples.read().map(|s| s.clone()).unwrap_or_default()
    }

    /// 指定设备的样本快照
    pub fn samples_for(&self, machine_name: &str) -> Vec<Sample> {
        self.samples()
            .into_iter()
            .filter(|sample| sample.machine.name == machine_name)
            .collect()
    }
}

impl Default for InMemorySampleStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl SampleStore for InMemorySampleStore {
    async fn write_sample(&self, sample: &Sample) -> Result<(), StorageError> {
        if self.reject_writes.load(Ordering::Relaxed) {
            return Err(StorageError::new("sink unreachable"));
        }
        let mut samples = self
            .samples
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        samples.push(sample.clone());
        Ok(())
    }
}
