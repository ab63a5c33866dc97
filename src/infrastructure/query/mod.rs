//! Stored-query resolution and Postgres execution for database steps

mod postgres;
mod resolver;

pub use postgres::PostgresQueryExecutor;
pub use resolver::StorageQueryResolver;
