//! InfluxDB 行协议编码
//!
//! 格式：
//! ```text
//! measurement,tag1=val1,tag2=val2 field1=val1,field2=val2 timestamp
//! ```
//!
//! 时间戳精度为毫秒（写入时携带 `precision=ms`）。

use crate::error::StorageError;
use domain::{MeasurementPolicy, Sample};

/// 一个待写入的点。
#[derive(Debug, Clone)]
pub struct Point {
    measurement: String,
    tags: Vec<(String, String)>,
    fields: Vec<(String, f64)>,
    timestamp_ms: Option<i64>,
}

impl Point {
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: Vec::new(),
            fields: Vec::new(),
            timestamp_ms: None,
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: f64) -> Self {
        self.fields.push((key.into(), value));
        self
    }

    pub fn timestamp_ms(mut self, ts_ms: i64) -> Self {
        self.timestamp_ms = Some(ts_ms);
        self
    }

    /// 编码为一行行协议。
    ///
    /// tag 按 key 排序；至少需要一个字段，且字段值必须是有限浮点数。
    pub fn to_line(&self) -> Result<String, StorageError> {
        if self.measurement.is_empty() {
            return Err(StorageError::new("measurement name is empty"));
        }
        if self.fields.is_empty() {
            return Err(StorageError::new(format!(
                "point {} has no fields",
                self.measurement
            )));
        }

        let mut line = escape_measurement(&self.measurement);

        let mut sorted_tags: Vec<_> = self.tags.iter().collect();
        sorted_tags.sort_by(|a, b| a.0.cmp(&b.0));
        for (key, value) in sorted_tags {
            // 空 tag 值不合法，直接省略
            if value.is_empty() {
                continue;
            }
            line.push(',');
            line.push_str(&escape_key(key));
            line.push('=');
            line.push_str(&escape_key(value));
        }

        line.push(' ');
        for (i, (key, value)) in self.fields.iter().enumerate() {
            if !value.is_finite() {
                return Err(StorageError::new(format!(
                    "field {} of {} is not finite",
                    key, self.measurement
                )));
            }
            if i > 0 {
                line.push(',');
            }
            line.push_str(&escape_key(key));
            line.push('=');
            line.push_str(&value.to_string());
        }

        if let Some(ts_ms) = self.timestamp_ms {
            line.push(' ');
            line.push_str(&ts_ms.to_string());
        }
        Ok(line)
    }
}

/// 将样本映射为点：measurement 由命名策略决定，tag 为 `machine=<name>`。
pub fn sample_point(sample: &Sample, measurement: &MeasurementPolicy) -> Point {
    let metrics = &sample.metrics;
    Point::new(measurement.measurement_for(&sample.machine.name))
        .tag("machine", sample.machine.name.clone())
        .field("availability", metrics.availability)
        .field("performance", metrics.performance)
        .field("quality", metrics.quality)
        .field("oee", metrics.oee)
        .timestamp_ms(sample.ts_ms)
}

/// measurement 名：转义逗号与空格。
fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

/// tag key / tag value / field key：转义逗号、等号与空格。
fn escape_key(s: &str) -> String {
    s.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{MachineConfig, OeeMetrics};

    fn sample(name: &str) -> Sample {
        Sample {
            machine: MachineConfig::new(name, "factory/line"),
            metrics: OeeMetrics {
                availability: 0.8,
                performance: 0.875,
                quality: 0.5,
                oee: 0.35,
            },
            ts_ms: 1_700_000_000_000,
        }
    }

    #[test]
    fn sample_line_with_fixed_measurement() {
        let line = sample_point(&sample("press-1"), &MeasurementPolicy::default())
            .to_line()
            .expect("line");
        assert_eq!(
            line,
            "oee,machine=press-1 availability=0.8,performance=0.875,quality=0.5,oee=0.35 1700000000000"
        );
    }

    #[test]
    fn sample_line_with_machine_measurement_is_escaped() {
        let line = sample_point(&sample("press 1,a"), &MeasurementPolicy::MachineName)
            .to_line()
            .expect("line");
        assert!(line.starts_with("press\\ 1\\,a,machine=press\\ 1\\,a "));
    }

    #[test]
    fn tags_are_sorted_and_equals_escaped() {
        let line = Point::new("m")
            .tag("zone", "a=b")
            .tag("line", "north")
            .field("value", 1.0)
            .to_line()
            .expect("line");
        assert_eq!(line, "m,line=north,zone=a\\=b value=1");
    }

    #[test]
    fn non_finite_field_is_rejected() {
        let err = Point::new("oee")
            .field("quality", f64::NAN)
            .to_line()
            .expect_err("nan");
        assert_eq!(err.to_string(), "field quality of oee is not finite");
    }

    #[test]
    fn point_without_fields_is_rejected() {
        assert!(Point::new("oee").tag("machine", "m1").to_line().is_err());
    }
}
