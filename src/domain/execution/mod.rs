//! Execution domain - the observable record of a chain run

mod entity;
mod request;

pub use entity::{
    ExecutionId, ExecutionRecord, ExecutionStatus, ExecutionTotals, StepRecord, StepStatus,
    StepTelemetry,
};
pub use request::RunRequest;
