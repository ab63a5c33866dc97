//! Prompt library lookups for prompt steps

mod resolver;

pub use resolver::StoragePromptResolver;
