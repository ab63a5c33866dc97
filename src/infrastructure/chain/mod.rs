//! Chain execution: per-kind step executors and the runner that sequences them

mod aggregation;
mod runner;
mod step_executor;

pub use aggregation::aggregate;
pub use runner::ChainRunner;
pub use step_executor::StepExecutor;
