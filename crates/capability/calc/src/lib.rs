//! OEE 计算：可用率 × 性能 × 质量。

use domain::{MachinePayload, OeeMetrics, Reading};

/// 计算错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComputationError {
    /// 除数为零，携带对应的指标名。
    #[error("division by zero computing {0}")]
    DivisionByZero(&'static str),
}

/// 由读数计算四项指标（纯函数）。
///
/// 除数检查顺序为 availability → performance → quality，
/// 任一除数为零即返回错误，不会产出 NaN / Infinity。
pub fn compute(reading: &Reading) -> Result<OeeMetrics, ComputationError> {
    let availability = ratio(reading.run_time, reading.total_time, "availability")?;
    let performance = ratio(
        reading.total_produced,
        reading.run_time * reading.target_speed,
        "performance",
    )?;
    let quality = ratio(reading.good_produced, reading.total_produced, "quality")?;

    Ok(OeeMetrics {
        availability,
        performance,
        quality,
        oee: availability * performance * quality,
    })
}

/// 按解码结果得到指标：原始读数走计算，预计算指标原样返回。
pub fn derive(payload: MachinePayload) -> Result<OeeMetrics, ComputationError> {
    match payload {
        MachinePayload::Reading(reading) => compute(&reading),
        MachinePayload::Metrics(metrics) => Ok(metrics),
    }
}

fn ratio(numerator: f64, denominator: f64, metric: &'static str) -> Result<f64, ComputationError> {
    if denominator == 0.0 {
        return Err(ComputationError::DivisionByZero(metric));
    }
    let value = numerator / denominator;
    // 溢出结果按除零处理。
    if !value.is_finite() {
        return Err(ComputationError::DivisionByZero(metric));
    }
    Ok(value)
}
