//! 存储接口 Trait 定义
//!
//! - SampleStore：OEE 样本写入
//!
//! 设计原则：
//! - 所有接口返回 StorageError
//! - 使用 async_trait 支持动态分发

use crate::error::StorageError;
use async_trait::async_trait;
use domain::Sample;

/// 样本存储接口
///
/// 每次调用写入一个点（measurement + `machine` tag + 四个指标字段）。
#[async_trait]
pub trait SampleStore: Send + Sync {
    async fn write_sample(&self, sample: &Sample) -> Result<(), StorageError>;
}
