//! 应用上下文：启动时一次性构建的配置与客户端，按引用传给各组件。

use crate::error::BridgeError;
use domain::ValidationMode;
use oee_config::BridgeConfig;
use oee_decode::{MachineRegistry, MessageDecoder};
use oee_ingest::MqttSourceConfig;
use oee_pipeline::{SamplePublisher, StorageSampleWriter};
use oee_storage::{InfluxConnection, InfluxSampleStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct AppContext {
    pub config: BridgeConfig,
    pub registry: Arc<MachineRegistry>,
    pub store: Arc<InfluxSampleStore>,
    pub publisher: SamplePublisher,
}

impl AppContext {
    pub fn build(config: BridgeConfig) -> Result<Self, BridgeError> {
        let registry = Arc::new(MachineRegistry::new(config.machines.clone()));

        let connection = InfluxConnection {
            base_url: config.influxdb.base_url(),
            database: config.influxdb.database.clone(),
            username: config.influxdb.username.clone(),
            password: config.influxdb.password.clone(),
            timeout_ms: config.influxdb.timeout_ms,
        };
        let store = Arc::new(
            InfluxSampleStore::new(connection, config.measurement.clone())
                .map_err(BridgeError::Client)?,
        );

        let writer = StorageSampleWriter::new(store.clone());
        let publisher = SamplePublisher::new(
            Arc::new(writer),
            Duration::from_millis(config.logging_interval_ms),
        );

        Ok(Self {
            config,
            registry,
            store,
            publisher,
        })
    }

    pub fn decoder(&self) -> MessageDecoder {
        MessageDecoder::new(self.registry.clone(), self.config.metrics_mode)
    }

    pub fn mqtt_source_config(&self) -> MqttSourceConfig {
        let mqtt = &self.config.mqtt;
        MqttSourceConfig {
            host: mqtt.host.clone(),
            port: mqtt.port,
            username: mqtt.username.clone(),
            password: mqtt.password.clone(),
            client_id: mqtt.client_id.clone(),
            keep_alive_secs: mqtt.keep_alive_secs,
            qos: mqtt.qos,
            reconnect_delay_ms: mqtt.reconnect_period_ms,
            topics: self.registry.topics(),
            fail_on_subscribe_error: self.config.validation.is_strict(),
        }
    }

    /// 启动探活：严格模式下不可达即返回错误，宽松模式只记录日志。
    pub async fn check_database(&self) -> Result<(), BridgeError> {
        let database = self.store.database();
        match self.store.database_names().await {
            Ok(names) => {
                info!(
                    target: "oee.bridge",
                    url = %self.config.influxdb.base_url(),
                    databases = ?names,
                    "influxdb_connected"
                );
                if !names.iter().any(|name| name == database) {
                    warn!(target: "oee.bridge", database = %database, "influxdb_database_missing");
                }
                Ok(())
            }
            Err(err) if self.config.validation == ValidationMode::Strict => {
                Err(BridgeError::Database(err))
            }
            Err(err) => {
                warn!(
                    target: "oee.bridge",
                    url = %self.config.influxdb.base_url(),
                    error = %err,
                    "influxdb_unreachable"
                );
                Ok(())
            }
        }
    }
}
