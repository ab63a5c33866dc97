//! LLM invocation domain

mod invoker;

pub use invoker::{LlmError, LlmInvocation, LlmInvoker, LlmRequest, LlmUsage};

#[cfg(test)]
pub use invoker::mock;
