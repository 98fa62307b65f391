//! 内存存储实现模块
//!
//! 提供基于 `RwLock<Vec>` 的内存存储，用于测试和本地演示：
//! - sample：OEE 样本存储

pub mod sample;

pub use sample::InMemorySampleStore;
