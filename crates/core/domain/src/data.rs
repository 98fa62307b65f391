/// 协议输入原始事件（一条 MQTT 报文）。
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub topic: String,
    pub payload: Vec<u8>,
    pub received_at_ms: i64,
}

/// 单条报文解码出的生产读数。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub run_time: f64,
    pub total_time: f64,
    pub target_speed: f64,
    pub total_produced: f64,
    pub good_produced: f64,
}

/// OEE 派生指标（不做区间裁剪）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OeeMetrics {
    pub availability: f64,
    pub performance: f64,
    pub quality: f64,
    pub oee: f64,
}

/// 解码结果：按指标模式携带原始读数或预计算指标。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MachinePayload {
    Reading(Reading),
    Metrics(OeeMetrics),
}

/// 发布周期到点时写入时序库的一条样本。
#[derive(Debug, Clone)]
pub struct Sample {
    pub machine: MachineConfig,
    pub metrics: OeeMetrics,
    pub ts_ms: i64,
}

/// 设备描述：名称 + 订阅 topic（topic 为唯一键）。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MachineConfig {
    pub name: String,
    pub topic: String,
}

impl MachineConfig {
    pub fn new(name: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            topic: topic.into(),
        }
    }
}
