//! 桥接进程运行配置加载。
//!
//! 配置来自 JSON 文件（路径由 `OEE_CONFIG` 指定，默认 `config.json`），
//! 账号口令可由环境变量覆盖。发布周期的规范位置为
//! `influxdb.logging_interval`，旧版顶层 `loggingInterval` 仍可读取。

use domain::{MachineConfig, MeasurementPolicy, MetricsMode, ValidationMode};
use serde::Deserialize;
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};

/// 默认配置文件路径。
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(String),
    #[error("failed to read {0}: {1}")]
    Read(String, String),
    #[error("invalid config json: {0}")]
    Parse(String),
    #[error("missing required setting: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
    #[error("duplicate machine topic: {0}")]
    DuplicateTopic(String),
}

/// 发布周期的读取来源。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalSource {
    /// `influxdb.logging_interval`
    Canonical,
    /// 顶层 `loggingInterval`（旧格式）
    Legacy,
}

/// MQTT 连接配置。
#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: Option<String>,
    pub keep_alive_secs: u64,
    pub qos: u8,
    pub reconnect_period_ms: u64,
}

/// InfluxDB 连接配置。
#[derive(Debug, Clone)]
pub struct InfluxDbConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_ms: u64,
}

impl InfluxDbConfig {
    /// HTTP API 根地址，例如 `http://localhost:8086`。
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }
}

/// 桥接进程运行配置。
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub mqtt: MqttConfig,
    pub influxdb: InfluxDbConfig,
    pub machines: Vec<MachineConfig>,
    pub logging_interval_ms: u64,
    pub interval_source: IntervalSource,
    pub metrics_mode: MetricsMode,
    pub validation: ValidationMode,
    pub measurement: MeasurementPolicy,
}

impl BridgeConfig {
    /// 从 `OEE_CONFIG`（或默认路径）加载，并应用环境变量覆盖。
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path();
        let mut config = Self::from_file(&path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// 读取并校验指定配置文件（不读取环境变量）。
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)
            .map_err(|err| ConfigError::Read(path.display().to_string(), err.to_string()))?;
        Self::from_json_str(&content)
    }

    /// 解析并校验 JSON 配置文本。
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig =
            serde_json::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        raw.resolve()
    }

    /// 用环境变量覆盖账号口令（仅非空值生效）。
    pub fn apply_env_overrides(&mut self) {
        if let Some(value) = read_optional("OEE_MQTT_USERNAME") {
            self.mqtt.username = Some(value);
        }
        if let Some(value) = read_optional("OEE_MQTT_PASSWORD") {
            self.mqtt.password = Some(value);
        }
        if let Some(value) = read_optional("OEE_INFLUXDB_USERNAME") {
            self.influxdb.username = Some(value);
        }
        if let Some(value) = read_optional("OEE_INFLUXDB_PASSWORD") {
            self.influxdb.password = Some(value);
        }
    }
}

/// 配置文件路径：`OEE_CONFIG` 或默认值。
pub fn config_path() -> PathBuf {
    read_optional("OEE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    mqtt: RawMqtt,
    influxdb: Option<RawInfluxDb>,
    #[serde(default)]
    machines: Vec<RawMachine>,
    #[serde(rename = "loggingInterval")]
    logging_interval: Option<u64>,
    #[serde(default)]
    bridge: RawBridge,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMqtt {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    client_id: Option<String>,
    keepalive: Option<u64>,
    qos: Option<u8>,
    reconnect_period: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawInfluxDb {
    protocol: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    database: Option<String>,
    username: Option<String>,
    password: Option<String>,
    timeout: Option<u64>,
    logging_interval: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawMachine {
    name: Option<String>,
    topic: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawBridge {
    metrics_mode: Option<String>,
    validation: Option<String>,
    measurement: Option<String>,
}

impl RawConfig {
    fn resolve(self) -> Result<BridgeConfig, ConfigError> {
        let influx = self
            .influxdb
            .ok_or_else(|| ConfigError::Missing("influxdb".to_string()))?;
        let (logging_interval_ms, interval_source) =
            resolve_interval(influx.logging_interval, self.logging_interval)?;
        let machines = resolve_machines(self.machines)?;
        let mqtt = resolve_mqtt(self.mqtt)?;
        let influxdb = resolve_influxdb(influx)?;

        let metrics_mode = match self.bridge.metrics_mode {
            Some(value) => value
                .parse::<MetricsMode>()
                .map_err(|value| ConfigError::Invalid("bridge.metrics_mode".to_string(), value))?,
            None => MetricsMode::default(),
        };
        let validation = match self.bridge.validation {
            Some(value) => value
                .parse::<ValidationMode>()
                .map_err(|value| ConfigError::Invalid("bridge.validation".to_string(), value))?,
            None => ValidationMode::default(),
        };
        let measurement = match self.bridge.measurement {
            Some(value) => MeasurementPolicy::parse(&value)
                .ok_or_else(|| ConfigError::Invalid("bridge.measurement".to_string(), value))?,
            None => MeasurementPolicy::default(),
        };

        Ok(BridgeConfig {
            mqtt,
            influxdb,
            machines,
            logging_interval_ms,
            interval_source,
            metrics_mode,
            validation,
            measurement,
        })
    }
}

/// 发布周期：规范位置优先，旧位置兜底；两处取值冲突或都缺失时报错。
fn resolve_interval(
    canonical: Option<u64>,
    legacy: Option<u64>,
) -> Result<(u64, IntervalSource), ConfigError> {
    let (value, source) = match (canonical, legacy) {
        (Some(canonical), Some(legacy)) if canonical != legacy => {
            return Err(ConfigError::Invalid(
                "influxdb.logging_interval".to_string(),
                format!("conflicts with loggingInterval ({} != {})", canonical, legacy),
            ));
        }
        (Some(value), _) => (value, IntervalSource::Canonical),
        (None, Some(value)) => (value, IntervalSource::Legacy),
        (None, None) => {
            return Err(ConfigError::Missing("influxdb.logging_interval".to_string()));
        }
    };
    if value == 0 {
        return Err(ConfigError::Invalid(
            "influxdb.logging_interval".to_string(),
            "0".to_string(),
        ));
    }
    Ok((value, source))
}

fn resolve_machines(raw: Vec<RawMachine>) -> Result<Vec<MachineConfig>, ConfigError> {
    if raw.is_empty() {
        return Err(ConfigError::Missing("machines".to_string()));
    }
    let mut seen = HashSet::new();
    let mut machines = Vec::with_capacity(raw.len());
    for (index, machine) in raw.into_iter().enumerate() {
        let name = non_empty(machine.name)
            .ok_or_else(|| ConfigError::Missing(format!("machines[{}].name", index)))?;
        let topic = non_empty(machine.topic)
            .ok_or_else(|| ConfigError::Missing(format!("machines[{}].topic", index)))?;
        // 报文按 topic 精确匹配设备，通配符 topic 永远匹配不到
        if topic.contains('+') || topic.contains('#') {
            return Err(ConfigError::Invalid(
                format!("machines[{}].topic", index),
                topic,
            ));
        }
        if !seen.insert(topic.clone()) {
            return Err(ConfigError::DuplicateTopic(topic));
        }
        machines.push(MachineConfig::new(name, topic));
    }
    Ok(machines)
}

fn resolve_mqtt(raw: RawMqtt) -> Result<MqttConfig, ConfigError> {
    let qos = raw.qos.unwrap_or(0);
    if qos > 2 {
        return Err(ConfigError::Invalid("mqtt.qos".to_string(), qos.to_string()));
    }
    Ok(MqttConfig {
        host: non_empty(raw.host).unwrap_or_else(|| "localhost".to_string()),
        port: raw.port.unwrap_or(1883),
        username: non_empty(raw.username),
        password: non_empty(raw.password),
        client_id: non_empty(raw.client_id),
        keep_alive_secs: raw.keepalive.unwrap_or(60),
        qos,
        reconnect_period_ms: raw.reconnect_period.unwrap_or(1000),
    })
}

fn resolve_influxdb(raw: RawInfluxDb) -> Result<InfluxDbConfig, ConfigError> {
    let protocol = non_empty(raw.protocol)
        .unwrap_or_else(|| "http".to_string())
        .to_ascii_lowercase();
    if protocol != "http" && protocol != "https" {
        return Err(ConfigError::Invalid("influxdb.protocol".to_string(), protocol));
    }
    let database = non_empty(raw.database)
        .ok_or_else(|| ConfigError::Missing("influxdb.database".to_string()))?;
    Ok(InfluxDbConfig {
        protocol,
        host: non_empty(raw.host).unwrap_or_else(|| "localhost".to_string()),
        port: raw.port.unwrap_or(8086),
        database,
        username: non_empty(raw.username),
        password: non_empty(raw.password),
        timeout_ms: raw.timeout.filter(|value| *value > 0).unwrap_or(10_000),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}
