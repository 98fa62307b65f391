//! 运行开关：三种历史变体合并为一份程序后的配置项。

use std::fmt;
use std::str::FromStr;

/// 指标来源模式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetricsMode {
    /// 报文携带原始读数，由桥接进程计算 OEE。
    #[default]
    Computed,
    /// 报文直接携带四项指标，原样转发。
    Passthrough,
}

impl MetricsMode {
    /// 当前模式下报文必须包含的字段（按校验顺序）。
    pub fn required_fields(self) -> &'static [&'static str] {
        match self {
            MetricsMode::Computed => &[
                "runTime",
                "totalTime",
                "targetSpeed",
                "totalProduced",
                "goodProduced",
            ],
            MetricsMode::Passthrough => &["availability", "performance", "quality", "oee"],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MetricsMode::Computed => "computed",
            MetricsMode::Passthrough => "passthrough",
        }
    }
}

impl FromStr for MetricsMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "computed" => Ok(MetricsMode::Computed),
            "passthrough" => Ok(MetricsMode::Passthrough),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for MetricsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 报文缺字段时的处理策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    /// 缺字段视为致命错误，进程以退出码 9 结束。
    Strict,
    /// 缺字段只跳过当前报文。
    #[default]
    Lenient,
}

impl ValidationMode {
    pub fn is_strict(self) -> bool {
        matches!(self, ValidationMode::Strict)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ValidationMode::Strict => "strict",
            ValidationMode::Lenient => "lenient",
        }
    }
}

impl FromStr for ValidationMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(ValidationMode::Strict),
            "lenient" => Ok(ValidationMode::Lenient),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for ValidationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 时序库 measurement 命名策略。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeasurementPolicy {
    /// 所有设备写入同一个 measurement（默认 `oee`）。
    Fixed(String),
    /// 以设备名作为 measurement。
    MachineName,
}

impl Default for MeasurementPolicy {
    fn default() -> Self {
        MeasurementPolicy::Fixed("oee".to_string())
    }
}

impl MeasurementPolicy {
    /// 解析配置值：`machine` 表示按设备名，其余非空值作为固定名称。
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        if value.eq_ignore_ascii_case("machine") {
            return Some(MeasurementPolicy::MachineName);
        }
        Some(MeasurementPolicy::Fixed(value.to_string()))
    }

    pub fn measurement_for<'a>(&'a self, machine_name: &'a str) -> &'a str {
        match self {
            MeasurementPolicy::Fixed(name) => name,
            MeasurementPolicy::MachineName => machine_name,
        }
    }
}
