//! Code step sandbox

mod rhai_sandbox;

pub use rhai_sandbox::{RhaiSandbox, SandboxLimits};
