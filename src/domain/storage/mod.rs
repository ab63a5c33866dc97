//! Storage domain - persistence contract for chains, executions, prompts and queries

mod entity;
mod repository;

pub use entity::{StorageEntity, StorageKey};
pub use repository::Storage;

#[cfg(test)]
pub use repository::mock;
