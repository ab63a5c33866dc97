use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions};
use sqlx::query::Query;
use sqlx::{Postgres, Row};

use crate::config::DatabaseConfig;
use crate::domain::chain::ChainError;
use crate::domain::query::{QueryExecutor, QueryResult, StoredQuery};

#[derive(Debug, Clone)]
struct Connection {
    pool: PgPool,
    writable: bool,
}

/// Runs stored queries on named, lazily connected Postgres pools.
///
/// Row-returning statements are wrapped so each row comes back as one JSON
/// object. Read-only connections run inside a `READ ONLY` transaction.
#[derive(Debug, Clone, Default)]
pub struct PostgresQueryExecutor {
    connections: HashMap<String, Connection>,
}

impl PostgresQueryExecutor {
    pub fn from_config(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let mut connections = HashMap::with_capacity(config.connections.len());

        for (name, connection) in &config.connections {
            let pool = PgPoolOptions::new()
                .max_connections(connection.max_connections)
                .connect_lazy(&connection.url)?;
            tracing::info!(connection = %name, writable = connection.writable, "Registered database connection");
            connections.insert(
                name.clone(),
                Connection {
                    pool,
                    writable: connection.writable,
                },
            );
        }

        Ok(Self { connections })
    }

    pub fn connection_names(&self) -> Vec<&str> {
        self.connections.keys().map(String::as_str).collect()
    }
}

fn returns_rows(sql: &str) -> bool {
    let head = sql.trim_start().to_ascii_lowercase();
    head.starts_with("select") || head.starts_with("with") || head.starts_with("values")
}

fn wrap_as_json(sql: &str) -> String {
    let inner = sql.trim().trim_end_matches(';');
    format!("SELECT to_jsonb(q) AS row FROM ({}) q", inner)
}

fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [Value],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            Value::Null => query.bind(Option::<String>::None),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => query.bind(i),
                None => query.bind(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => query.bind(s.as_str()),
            other => query.bind(sqlx::types::Json(other)),
        };
    }
    query
}

fn db_error(connection_id: &str, error: sqlx::Error) -> ChainError {
    let message = match &error {
        sqlx::Error::Database(db) => db.message().to_string(),
        sqlx::Error::PoolTimedOut => "connection pool timed out".to_string(),
        other => other.to_string(),
    };
    ChainError::external("database", format!("{}: {}", connection_id, message))
}

#[async_trait]
impl QueryExecutor for PostgresQueryExecutor {
    async fn execute(
        &self,
        connection_id: &str,
        query: &StoredQuery,
        params: Vec<Value>,
    ) -> Result<QueryResult, ChainError> {
        let connection = self.connections.get(connection_id).ok_or_else(|| {
            ChainError::configuration(format!("unknown database connection '{}'", connection_id))
        })?;

        let is_select = returns_rows(query.sql());
        if !is_select && !connection.writable {
            return Err(ChainError::configuration(format!(
                "connection '{}' is read-only; query '{}' is not a read statement",
                connection_id,
                query.id()
            )));
        }

        let mut tx = connection
            .pool
            .begin()
            .await
            .map_err(|e| db_error(connection_id, e))?;

        if !connection.writable {
            sqlx::query("SET TRANSACTION READ ONLY")
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error(connection_id, e))?;
        }

        let result = if is_select {
            let sql = wrap_as_json(query.sql());
            let rows = bind_all(sqlx::query(&sql), &params)
                .fetch_all(&mut *tx)
                .await
                .map_err(|e| db_error(connection_id, e))?;

            let rows = rows
                .iter()
                .map(|row| row.try_get::<Value, _>("row"))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| db_error(connection_id, e))?;

            QueryResult {
                row_count: rows.len() as u64,
                rows,
            }
        } else {
            let done = bind_all(sqlx::query(query.sql()), &params)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_error(connection_id, e))?;

            QueryResult {
                rows: Vec::new(),
                row_count: done.rows_affected(),
            }
        };

        tx.commit().await.map_err(|e| db_error(connection_id, e))?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConnectionConfig;
    use crate::domain::query::QueryId;

    #[test]
    fn test_statement_classification() {
        assert!(returns_rows("  SELECT * FROM t"));
        assert!(returns_rows("with x as (select 1) select * from x"));
        assert!(!returns_rows("UPDATE t SET a = 1"));
        assert!(!returns_rows("delete from t"));
    }

    #[test]
    fn test_wrap_as_json_strips_terminator() {
        assert_eq!(
            wrap_as_json("SELECT id FROM orders WHERE id = $1;"),
            "SELECT to_jsonb(q) AS row FROM (SELECT id FROM orders WHERE id = $1) q"
        );
    }

    #[tokio::test]
    async fn test_unknown_connection() {
        let executor = PostgresQueryExecutor::default();
        let query = StoredQuery::new(QueryId::new("q").unwrap(), "q", "SELECT 1");

        let err = executor.execute("analytics", &query, vec![]).await.unwrap_err();
        assert!(matches!(err, ChainError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_write_rejected_on_read_only_connection() {
        let mut config = DatabaseConfig::default();
        config.connections.insert(
            "analytics".to_string(),
            DatabaseConnectionConfig {
                url: "postgres://localhost/analytics".to_string(),
                writable: false,
                max_connections: 1,
            },
        );
        let executor = PostgresQueryExecutor::from_config(&config).unwrap();
        let query = StoredQuery::new(QueryId::new("purge").unwrap(), "purge", "DELETE FROM t");

        let err = executor.execute("analytics", &query, vec![]).await.unwrap_err();
        assert!(err.to_string().contains("read-only"));
        assert_eq!(executor.connection_names(), vec!["analytics"]);
    }
}
