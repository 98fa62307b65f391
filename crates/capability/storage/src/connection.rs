//! InfluxDB 连接管理
//!
//! 提供 HTTP 客户端初始化功能：
//! - InfluxConnection：连接参数
//! - build_client：带请求超时的 reqwest 客户端

use crate::error::StorageError;
use std::time::Duration;

/// InfluxDB 1.x HTTP API 连接参数。
#[derive(Debug, Clone)]
pub struct InfluxConnection {
    /// API 根地址，例如 `http://localhost:8086`
    pub base_url: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_ms: u64,
}

impl InfluxConnection {
    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// 建立 HTTP 客户端
///
/// # 参数
/// - `timeout_ms`：单次请求超时（毫秒）
pub fn build_client(timeout_ms: u64) -> Result<reqwest::Client, StorageError> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .build()?;
    Ok(client)
}
