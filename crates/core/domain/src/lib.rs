pub mod data;
pub mod mode;

pub use data::{MachineConfig, MachinePayload, OeeMetrics, RawEvent, Reading, Sample};
pub use mode::{MeasurementPolicy, MetricsMode, ValidationMode};
