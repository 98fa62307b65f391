//! # OEE Storage 模块
//!
//! 本模块提供 OEE 样本的时序存储抽象层，支持多种存储后端实现。
//!
//! ## 架构设计
//!
//! 1. **接口抽象层** (`traits.rs`)：`SampleStore` 异步 Trait
//! 2. **错误处理层** (`error.rs`)：统一的存储错误类型
//! 3. **编码层** (`line_protocol.rs`)：样本 → InfluxDB 行协议
//! 4. **连接管理层** (`connection.rs`)：HTTP 客户端与连接参数
//! 5. **实现层**：
//!    - `in_memory/`：内存存储实现（用于测试和演示）
//!    - `influx.rs`：InfluxDB 1.x HTTP API 实现（生产环境使用）
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use domain::{MachineConfig, MeasurementPolicy, OeeMetrics, Sample};
//! use oee_storage::{InfluxConnection, InfluxSampleStore, SampleStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = InfluxSampleStore::new(
//!         InfluxConnection {
//!             base_url: "http://localhost:8086".to_string(),
//!             database: "oee".to_string(),
//!             username: None,
//!             password: None,
//!             timeout_ms: 10_000,
//!         },
//!         MeasurementPolicy::default(),
//!     )?;
//!
//!     let sample = Sample {
//!         machine: MachineConfig::new("press-1", "factory/press-1"),
//!         metrics: OeeMetrics { availability: 0.8, performance: 0.875, quality: 0.857, oee: 0.6 },
//!         ts_ms: 1_700_000_000_000,
//!     };
//!     store.write_sample(&sample).await?;
//!     Ok(())
//! }
//! ```

pub mod connection;
pub mod error;
pub mod in_memory;
pub mod influx;
pub mod line_protocol;
pub mod traits;

pub use connection::{InfluxConnection, build_client};
pub use error::StorageError;
pub use in_memory::InMemorySampleStore;
pub use influx::{InfluxSampleStore, parse_database_names};
pub use line_protocol::{Point, sample_point};
pub use traits::SampleStore;
