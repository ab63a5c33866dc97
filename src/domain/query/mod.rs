//! Pre-registered parameterized queries for database steps

mod entity;
mod executor;

pub use entity::{QueryId, StoredQuery};
pub use executor::{QueryExecutor, QueryResolver, QueryResult};

#[cfg(test)]
pub use executor::{MockQueryExecutor, MockQueryResolver};
