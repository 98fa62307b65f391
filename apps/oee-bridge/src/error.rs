//! 进程级错误与退出码。

use oee_config::ConfigError;
use oee_ingest::IngestError;
use oee_storage::StorageError;

/// 导致进程退出的错误。
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("influxdb client error: {0}")]
    Client(StorageError),
    #[error("influxdb unreachable: {0}")]
    Database(StorageError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    /// 采集任务 panic 或被取消。
    #[error("ingest task aborted: {0}")]
    IngestTask(#[from] tokio::task::JoinError),
}

impl BridgeError {
    /// 退出码：1 配置错误，2 订阅失败，3 时序库不可达，9 报文缺字段（严格模式）。
    pub fn exit_code(&self) -> u8 {
        match self {
            BridgeError::Config(_) => 1,
            BridgeError::Client(_) | BridgeError::Database(_) => 3,
            BridgeError::Ingest(IngestError::Subscribe(_)) => 2,
            BridgeError::Ingest(IngestError::Rejected(_)) => 9,
            BridgeError::Ingest(_) | BridgeError::IngestTask(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let config = BridgeError::Config(ConfigError::NotFound("config.json".to_string()));
        let subscribe = BridgeError::Ingest(IngestError::Subscribe("t1".to_string()));
        let database = BridgeError::Database(StorageError::new("connection refused"));
        let rejected = BridgeError::Ingest(IngestError::Rejected("goodProduced".to_string()));

        assert_eq!(config.exit_code(), 1);
        assert_eq!(subscribe.exit_code(), 2);
        assert_eq!(database.exit_code(), 3);
        assert_eq!(rejected.exit_code(), 9);
    }

    #[tokio::test]
    async fn panicked_ingest_task_is_not_a_clean_exit() {
        let task: tokio::task::JoinHandle<Result<(), IngestError>> =
            tokio::spawn(async { panic!("ingest loop crashed") });
        let err = BridgeError::from(task.await.expect_err("panicked"));
        assert!(matches!(err, BridgeError::IngestTask(_)));
        assert_eq!(err.exit_code(), 1);
    }
}
