//! Prompt library domain

mod entity;
mod resolver;

pub use entity::{Prompt, PromptId};
pub use resolver::{PromptResolver, ResolvedPrompt};

#[cfg(test)]
pub use resolver::MockPromptResolver;
