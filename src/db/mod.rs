pub mod rest;
pub use rest::RestStore;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, SqlitePool, TypeInfo, ValueRef};
use std::str::FromStr;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{Result, SyncError};
use crate::services::normalizer::{ColumnSpec, WEEKLY_KEY, WEEKLY_SCHEMA};

/// One stored row, column name to value.
pub type StoreRow = serde_json::Map<String, Value>;

/// A table store that can upsert on a natural key.
#[async_trait]
pub trait StatStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Checks that the store is reachable and the table is usable.
    async fn ping(&self, table: &str) -> Result<()>;

    /// Inserts new rows and updates existing ones matched on `on_conflict`
    /// (comma-joined column list). Returns the rows affected.
    async fn upsert(&self, table: &str, rows: &[StoreRow], on_conflict: &str) -> Result<Vec<StoreRow>>;

    /// Plain insert. Rows clashing with an existing key are rejected.
    async fn insert(&self, table: &str, rows: &[StoreRow]) -> Result<Vec<StoreRow>>;

    /// Every stored row of one player, newest season first, weeks ascending.
    async fn player_rows(&self, table: &str, player_id: &str) -> Result<Vec<StoreRow>>;
}

/// Builds the store named by the configuration. `sqlite:` URLs open a local
/// database; anything else is treated as a PostgREST endpoint.
pub async fn connect(config: &Config) -> Result<Arc<dyn StatStore>> {
    if config.store_url.starts_with("sqlite:") {
        let store = SqliteStore::connect(&config.store_url).await?;
        store
            .ensure_table(&config.table, WEEKLY_SCHEMA, WEEKLY_KEY)
            .await
            .map_err(|e| SyncError::connection(format!("cannot prepare table '{}': {}", config.table, e)))?;
        Ok(Arc::new(store))
    } else {
        Ok(Arc::new(RestStore::new(&config.store_url, &config.store_key)?))
    }
}

/// Quotes an SQL identifier after checking it is a plain name.
fn ident(name: &str) -> Result<String> {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(format!("\"{}\"", name))
    } else {
        Err(SyncError::Store(format!("invalid identifier '{}'", name)))
    }
}

// ── SQLite ───────────────────────────────────────────────────────────────────

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        // Strip the "sqlite:" prefix to get the file path, create parent dir if needed
        let file_path = database_url
            .strip_prefix("sqlite:///")
            .or_else(|| database_url.strip_prefix("sqlite://"))
            .or_else(|| database_url.strip_prefix("sqlite:"))
            .unwrap_or(database_url);

        if !file_path.starts_with(":memory:") {
            if let Some(parent) = std::path::Path::new(file_path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent).await.ok();
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| SyncError::connection(format!("invalid database URL '{}': {}", database_url, e)))?
            .create_if_missing(true);

        // One connection: batches run sequentially, and `:memory:` databases
        // exist per connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| SyncError::connection(format!("cannot open {}: {}", database_url, e)))?;

        Ok(Self { pool })
    }

    /// Creates `table` with one column per schema entry and a unique
    /// constraint on `key`, so upserts have something to conflict on.
    pub async fn ensure_table(&self, table: &str, schema: &[ColumnSpec], key: &[&str]) -> Result<()> {
        let mut defs = Vec::with_capacity(schema.len() + 2);
        defs.push("id INTEGER PRIMARY KEY AUTOINCREMENT".to_string());
        for spec in schema {
            defs.push(format!("{} {}", ident(spec.target)?, spec.kind.sql_type()));
        }
        let key_cols = key.iter().map(|k| ident(k)).collect::<Result<Vec<_>>>()?;
        defs.push(format!("UNIQUE ({})", key_cols.join(", ")));

        let sql = format!("CREATE TABLE IF NOT EXISTS {} (\n    {}\n)", ident(table)?, defs.join(",\n    "));
        sqlx::query(&sql).execute(&self.pool).await?;

        let index = format!(
            "CREATE INDEX IF NOT EXISTS {} ON {}(player_id)",
            ident(&format!("idx_{}_player", table))?,
            ident(table)?
        );
        sqlx::query(&index).execute(&self.pool).await?;

        tracing::info!("Table '{}' ready", table);
        Ok(())
    }

    #[cfg(test)]
    pub async fn count(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", ident(table)?);
        Ok(sqlx::query_scalar(&sql).fetch_one(&self.pool).await?)
    }

    /// Writes all rows in one transaction; any failing row rolls the batch back.
    async fn write_rows(&self, table: &str, rows: &[StoreRow], on_conflict: Option<&str>) -> Result<Vec<StoreRow>> {
        let table = ident(table)?;
        let conflict_cols = match on_conflict {
            Some(key) => Some(key.split(',').map(|k| ident(k.trim())).collect::<Result<Vec<_>>>()?),
            None => None,
        };

        let mut tx = self.pool.begin().await?;
        let mut affected = Vec::with_capacity(rows.len());

        for row in rows {
            let columns = row.keys().map(|k| ident(k)).collect::<Result<Vec<_>>>()?;
            let placeholders = vec!["?"; columns.len()].join(", ");
            let mut sql = format!("INSERT INTO {} ({}) VALUES ({})", table, columns.join(", "), placeholders);

            if let Some(conflict_cols) = &conflict_cols {
                let updates: Vec<String> = columns
                    .iter()
                    .filter(|c| !conflict_cols.contains(c))
                    .map(|c| format!("{c} = excluded.{c}"))
                    .collect();
                if updates.is_empty() {
                    sql.push_str(&format!(" ON CONFLICT ({}) DO NOTHING", conflict_cols.join(", ")));
                } else {
                    sql.push_str(&format!(
                        " ON CONFLICT ({}) DO UPDATE SET {}",
                        conflict_cols.join(", "),
                        updates.join(", ")
                    ));
                }
            }

            let mut query = sqlx::query(&sql);
            for value in row.values() {
                query = bind_json(query, value);
            }
            let result = query.execute(&mut *tx).await?;
            if result.rows_affected() > 0 {
                affected.push(row.clone());
            }
        }

        tx.commit().await?;
        Ok(affected)
    }
}

fn bind_json<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &Value,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        Value::String(s) => query.bind(s.clone()),
        other => query.bind(other.to_string()),
    }
}

fn row_to_json(row: &SqliteRow) -> StoreRow {
    let mut map = StoreRow::new();
    for column in row.columns() {
        let i = column.ordinal();
        let value = match row.try_get_raw(i) {
            Ok(raw) if raw.is_null() => Value::Null,
            Ok(raw) => match raw.type_info().name() {
                "INTEGER" => row.try_get::<i64, _>(i).map(Value::from).unwrap_or(Value::Null),
                "REAL" => row.try_get::<f64, _>(i).map(Value::from).unwrap_or(Value::Null),
                _ => row.try_get::<String, _>(i).map(Value::String).unwrap_or(Value::Null),
            },
            Err(_) => Value::Null,
        };
        map.insert(column.name().to_string(), value);
    }
    map
}

#[async_trait]
impl StatStore for SqliteStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn ping(&self, table: &str) -> Result<()> {
        let found: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(table)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| SyncError::connection(e.to_string()))?;
        if found == 0 {
            return Err(SyncError::connection(format!("table '{}' does not exist", table)));
        }
        Ok(())
    }

    async fn upsert(&self, table: &str, rows: &[StoreRow], on_conflict: &str) -> Result<Vec<StoreRow>> {
        self.write_rows(table, rows, Some(on_conflict)).await
    }

    async fn insert(&self, table: &str, rows: &[StoreRow]) -> Result<Vec<StoreRow>> {
        self.write_rows(table, rows, None).await
    }

    async fn player_rows(&self, table: &str, player_id: &str) -> Result<Vec<StoreRow>> {
        let sql = format!(
            "SELECT * FROM {} WHERE player_id = ? ORDER BY season DESC, week ASC",
            ident(table)?
        );
        let rows = sqlx::query(&sql).bind(player_id).fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| {
                let mut map = row_to_json(row);
                map.remove("id");
                map
            })
            .collect())
    }
}
