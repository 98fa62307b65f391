//! MQTT 报文解码：topic → 设备，payload → 读数或预计算指标。

use domain::{MachineConfig, MachinePayload, MetricsMode, OeeMetrics, Reading};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// 解码错误。
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("unknown topic: {0}")]
    UnknownTopic(String),
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("missing field: {0}")]
    MissingField(String),
    #[error("invalid field: {0}")]
    InvalidField(String),
}

/// 已配置设备表，按 topic 精确匹配。
#[derive(Debug, Clone, Default)]
pub struct MachineRegistry {
    machines: Vec<MachineConfig>,
    by_topic: HashMap<String, usize>,
}

impl MachineRegistry {
    /// 构建设备表；同一 topic 出现多次时保留第一条（配置加载阶段已拒绝重复）。
    pub fn new(machines: Vec<MachineConfig>) -> Self {
        let mut registry = Self::default();
        for machine in machines {
            if registry.by_topic.contains_key(&machine.topic) {
                continue;
            }
            registry
                .by_topic
                .insert(machine.topic.clone(), registry.machines.len());
            registry.machines.push(machine);
        }
        registry
    }

    pub fn find(&self, topic: &str) -> Option<&MachineConfig> {
        self.by_topic
            .get(topic)
            .and_then(|index| self.machines.get(*index))
    }

    pub fn topics(&self) -> Vec<String> {
        self.machines
            .iter()
            .map(|machine| machine.topic.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.machines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.machines.is_empty()
    }
}

/// 绑定设备表与指标模式的解码器。
#[derive(Debug, Clone)]
pub struct MessageDecoder {
    registry: Arc<MachineRegistry>,
    mode: MetricsMode,
}

impl MessageDecoder {
    pub fn new(registry: Arc<MachineRegistry>, mode: MetricsMode) -> Self {
        Self { registry, mode }
    }

    pub fn registry(&self) -> &MachineRegistry {
        &self.registry
    }

    pub fn decode(
        &self,
        topic: &str,
        payload: &[u8],
    ) -> Result<(MachineConfig, MachinePayload), DecodeError> {
        decode(topic, payload, &self.registry, self.mode)
    }
}

/// 解码一条报文。
///
/// 校验顺序：topic 解析 → JSON 解析 → 按模式检查必填字段（报告第一个缺失字段）。
/// 数字字段也接受可解析为数字的字符串。
pub fn decode(
    topic: &str,
    payload: &[u8],
    machines: &MachineRegistry,
    mode: MetricsMode,
) -> Result<(MachineConfig, MachinePayload), DecodeError> {
    let machine = machines
        .find(topic)
        .cloned()
        .ok_or_else(|| DecodeError::UnknownTopic(topic.to_string()))?;

    let value: Value = serde_json::from_slice(payload)
        .map_err(|err| DecodeError::MalformedPayload(err.to_string()))?;
    let Value::Object(object) = value else {
        return Err(DecodeError::MalformedPayload(
            "expected a json object".to_string(),
        ));
    };

    let fields = mode
        .required_fields()
        .iter()
        .map(|field| number_field(&object, field))
        .collect::<Result<Vec<f64>, DecodeError>>()?;

    let payload = match mode {
        MetricsMode::Computed => MachinePayload::Reading(Reading {
            run_time: fields[0],
            total_time: fields[1],
            target_speed: fields[2],
            total_produced: fields[3],
            good_produced: fields[4],
        }),
        MetricsMode::Passthrough => MachinePayload::Metrics(OeeMetrics {
            availability: fields[0],
            performance: fields[1],
            quality: fields[2],
            oee: fields[3],
        }),
    };
    Ok((machine, payload))
}

fn number_field(object: &Map<String, Value>, field: &str) -> Result<f64, DecodeError> {
    match object.get(field) {
        None | Some(Value::Null) => Err(DecodeError::MissingField(field.to_string())),
        Some(Value::Number(number)) => number
            .as_f64()
            .ok_or_else(|| DecodeError::InvalidField(field.to_string())),
        Some(Value::String(text)) => text
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .ok_or_else(|| DecodeError::InvalidField(field.to_string())),
        Some(_) => Err(DecodeError::InvalidField(field.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> MachineRegistry {
        MachineRegistry::new(vec![
            MachineConfig::new("press-1", "factory/press-1"),
            MachineConfig::new("press-2", "factory/press-2"),
        ])
    }

    #[test]
    fn decodes_reading_for_known_topic() {
        let payload = br#"{"runTime":8,"totalTime":10,"targetSpeed":5,"totalProduced":35,"goodProduced":30}"#;
        let (machine, decoded) = decode(
            "factory/press-2",
            payload,
            &registry(),
            MetricsMode::Computed,
        )
        .expect("decoded");
        assert_eq!(machine.name, "press-2");
        assert_eq!(
            decoded,
            MachinePayload::Reading(Reading {
                run_time: 8.0,
                total_time: 10.0,
                target_speed: 5.0,
                total_produced: 35.0,
                good_produced: 30.0,
            })
        );
    }

    #[test]
    fn unknown_topic_is_rejected_before_parsing() {
        let err = decode("factory/lathe", b"not json", &registry(), MetricsMode::Computed)
            .expect_err("unknown");
        assert_eq!(err, DecodeError::UnknownTopic("factory/lathe".to_string()));
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = decode("factory/press-1", b"{runTime:", &registry(), MetricsMode::Computed)
            .expect_err("malformed");
        assert!(matches!(err, DecodeError::MalformedPayload(_)));

        let err = decode("factory/press-1", b"[1,2]", &registry(), MetricsMode::Computed)
            .expect_err("not an object");
        assert!(matches!(err, DecodeError::MalformedPayload(_)));
    }

    #[test]
    fn missing_good_produced_is_reported() {
        let payload = br#"{"runTime":8,"totalTime":10,"targetSpeed":5,"totalProduced":35}"#;
        let err = decode("factory/press-1", payload, &registry(), MetricsMode::Computed)
            .expect_err("missing");
        assert_eq!(err, DecodeError::MissingField("goodProduced".to_string()));
    }

    #[test]
    fn null_counts_as_missing() {
        let payload = br#"{"runTime":null,"totalTime":10,"targetSpeed":5,"totalProduced":35,"goodProduced":30}"#;
        let err = decode("factory/press-1", payload, &registry(), MetricsMode::Computed)
            .expect_err("missing");
        assert_eq!(err, DecodeError::MissingField("runTime".to_string()));
    }

    #[test]
    fn zero_is_present_not_missing() {
        let payload = br#"{"runTime":0,"totalTime":10,"targetSpeed":5,"totalProduced":0,"goodProduced":0}"#;
        let (_, decoded) = decode("factory/press-1", payload, &registry(), MetricsMode::Computed)
            .expect("decoded");
        assert!(matches!(decoded, MachinePayload::Reading(r) if r.run_time == 0.0));
    }

    #[test]
    fn numeric_strings_are_accepted_and_garbage_is_invalid() {
        let payload = br#"{"runTime":"8","totalTime":10,"targetSpeed":5,"totalProduced":35,"goodProduced":true}"#;
        let err = decode("factory/press-1", payload, &registry(), MetricsMode::Computed)
            .expect_err("invalid");
        assert_eq!(err, DecodeError::InvalidField("goodProduced".to_string()));
    }

    #[test]
    fn passthrough_requires_metric_fields() {
        let payload = br#"{"availability":0.9,"performance":0.8,"quality":0.95,"oee":0.684}"#;
        let decoder = MessageDecoder::new(Arc::new(registry()), MetricsMode::Passthrough);
        let (_, decoded) = decoder.decode("factory/press-1", payload).expect("decoded");
        assert_eq!(
            decoded,
            MachinePayload::Metrics(OeeMetrics {
                availability: 0.9,
                performance: 0.8,
                quality: 0.95,
                oee: 0.684,
            })
        );

        let reading = br#"{"runTime":8,"totalTime":10,"targetSpeed":5,"totalProduced":35,"goodProduced":30}"#;
        let err = decoder
            .decode("factory/press-1", reading)
            .expect_err("missing");
        assert_eq!(err, DecodeError::MissingField("availability".to_string()));
    }

    #[test]
    fn registry_keeps_first_entry_for_topic() {
        let registry = MachineRegistry::new(vec![
            MachineConfig::new("first", "shared"),
            MachineConfig::new("second", "shared"),
        ]);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.find("shared").map(|m| m.name.as_str()), Some("first"));
        assert_eq!(registry.topics(), vec!["shared".to_string()]);
    }
}
