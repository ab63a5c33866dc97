//! In-process approval gate

mod registry;

pub use registry::ApprovalRegistry;
