use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, QueryBuilder, Row as _, Sqlite, SqlitePool, TypeInfo, ValueRef};

use crate::errors::{FetchError, FetchResult};
use crate::export::query::QueryOptions;
use crate::types::{Chunk, Row};

/// A paged view over a data source.
///
/// `fetch_page` must not mutate the options (the engine owns the `page`
/// cursor) and must be deterministic across calls while the underlying data
/// is static. A fetcher that never returns an empty chunk for a finite
/// result set makes the export loop unbounded; eventual exhaustion is the
/// implementor's responsibility.
#[async_trait]
pub trait ChunkFetcher: Send + Sync {
    async fn fetch_page(&self, options: &QueryOptions) -> FetchResult<Chunk>;
}

/// Fetcher over a SQLite table, translating the option set into one bounded
/// SELECT per page.
pub struct SqliteChunkFetcher {
    pool: SqlitePool,
    table: String,
}

impl SqliteChunkFetcher {
    pub fn new(pool: SqlitePool, table: &str) -> Self {
        Self {
            pool,
            table: sanitize_identifier(table),
        }
    }
}

#[async_trait]
impl ChunkFetcher for SqliteChunkFetcher {
    async fn fetch_page(&self, options: &QueryOptions) -> FetchResult<Chunk> {
        // Without a limit the whole result set is one page; later pages are
        // empty by definition.
        let Some(limit) = options.limit else {
            if options.page > 1 {
                return Ok(Chunk::new());
            }
            let mut builder = self.select_builder(options)?;
            let rows = builder.build().fetch_all(&self.pool).await?;
            return rows.iter().map(row_to_record).collect();
        };

        let mut builder = self.select_builder(options)?;
        builder.push(" LIMIT ");
        builder.push_bind(limit as i64);
        let offset = options.offset.unwrap_or(0) as i64
            + (options.page as i64 - 1) * limit as i64;
        builder.push(" OFFSET ");
        builder.push_bind(offset);

        log::debug!(
            "fetching page {} (limit {}, offset {}) from {}",
            options.page,
            limit,
            offset,
            self.table
        );

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_record).collect()
    }
}

impl SqliteChunkFetcher {
    fn select_builder(
        &self,
        options: &QueryOptions,
    ) -> FetchResult<QueryBuilder<'static, Sqlite>> {
        let mut builder = QueryBuilder::new("SELECT ");

        if options.fields.is_empty() {
            builder.push("*");
        } else {
            for (index, field) in options.fields.iter().enumerate() {
                if index > 0 {
                    builder.push(", ");
                }
                builder.push(sanitize_identifier(column_name(field)));
            }
        }

        builder.push(" FROM ");
        builder.push(&self.table);

        for (index, (key, value)) in options.conditions.iter().enumerate() {
            builder.push(if index == 0 { " WHERE " } else { " AND " });
            builder.push(sanitize_identifier(column_name(key)));
            match value {
                Value::Null => {
                    builder.push(" IS NULL");
                }
                Value::Array(items) => {
                    builder.push(" IN (");
                    for (item_index, item) in items.iter().enumerate() {
                        if item_index > 0 {
                            builder.push(", ");
                        }
                        bind_scalar(&mut builder, item)?;
                    }
                    builder.push(")");
                }
                scalar => {
                    builder.push(" = ");
                    bind_scalar(&mut builder, scalar)?;
                }
            }
        }

        if !options.order.is_empty() {
            builder.push(" ORDER BY ");
            for (index, clause) in options.order.iter().enumerate() {
                if index > 0 {
                    builder.push(", ");
                }
                let mut parts = clause.split_whitespace();
                let column = parts.next().unwrap_or(clause.as_str());
                builder.push(sanitize_identifier(column_name(column)));
                let direction = match parts.next().map(str::to_ascii_uppercase) {
                    Some(direction) if direction == "DESC" => " DESC",
                    _ => " ASC",
                };
                builder.push(direction);
            }
        }

        if let Some(group) = &options.group {
            builder.push(" GROUP BY ");
            builder.push(sanitize_identifier(column_name(group)));
        }

        Ok(builder)
    }
}

fn bind_scalar(builder: &mut QueryBuilder<'static, Sqlite>, value: &Value) -> FetchResult<()> {
    match value {
        Value::String(s) => {
            builder.push_bind(s.clone());
        }
        Value::Bool(b) => {
            builder.push_bind(*b);
        }
        Value::Number(n) => {
            if let Some(int) = n.as_i64() {
                builder.push_bind(int);
            } else if let Some(float) = n.as_f64() {
                builder.push_bind(float);
            } else {
                return Err(FetchError::Query(format!(
                    "unbindable numeric condition value: {}",
                    n
                )));
            }
        }
        other => {
            return Err(FetchError::Query(format!(
                "unsupported condition value: {}",
                other
            )));
        }
    }
    Ok(())
}

/// Strip an optional model qualifier: `EmailSignup.email` selects the
/// `email` column.
fn column_name(field: &str) -> &str {
    field.rsplit('.').next().unwrap_or(field)
}

/// Only allow alphanumerics and underscores in identifiers used in dynamic
/// SQL.
pub fn sanitize_identifier(identifier: &str) -> String {
    let safe: String = identifier
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect();

    if safe.is_empty() {
        return "_invalid".to_string();
    }

    // Numeric-only identifiers are not valid column names
    if safe.chars().all(|c| c.is_numeric()) {
        return format!("_{}", safe);
    }

    safe
}

fn row_to_record(row: &SqliteRow) -> FetchResult<Row> {
    let mut record = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(index)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            match raw.type_info().name() {
                "INTEGER" | "INT" | "INT4" | "INT8" | "BIGINT" => {
                    Value::from(row.try_get::<i64, _>(index)?)
                }
                "REAL" | "NUMERIC" => serde_json::Number::from_f64(row.try_get::<f64, _>(index)?)
                    .map(Value::Number)
                    .ok_or_else(|| {
                        FetchError::Decode(format!("non-finite value in column {}", column.name()))
                    })?,
                "BOOLEAN" => Value::Bool(row.try_get::<bool, _>(index)?),
                "BLOB" => Value::String(
                    String::from_utf8_lossy(&row.try_get::<Vec<u8>, _>(index)?).into_owned(),
                ),
                _ => Value::String(row.try_get::<String, _>(index)?),
            }
        };
        record.insert(column.name().to_string(), value);
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn seeded_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE email_signups (
                id INTEGER PRIMARY KEY,
                email TEXT NOT NULL,
                confirmed INTEGER NOT NULL DEFAULT 0,
                created TEXT
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
        for (id, email, confirmed) in [
            (1, "a@example.com", 1),
            (2, "b@example.com", 0),
            (3, "c@example.com", 1),
            (4, "d@example.com", 1),
            (5, "e@example.com", 0),
        ] {
            sqlx::query("INSERT INTO email_signups (id, email, confirmed, created) VALUES (?, ?, ?, '2024-01-01')")
                .bind(id)
                .bind(email)
                .bind(confirmed)
                .execute(&pool)
                .await
                .unwrap();
        }
        pool
    }

    fn options_with_limit(limit: u32) -> QueryOptions {
        QueryOptions {
            limit: Some(limit),
            order: vec!["id ASC".to_string()],
            ..QueryOptions::default()
        }
    }

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("email_signups"), "email_signups");
        assert_eq!(sanitize_identifier("DROP TABLE x;"), "DROPTABLEx");
        assert_eq!(sanitize_identifier("123"), "_123");
        assert_eq!(sanitize_identifier(""), "_invalid");
        assert_eq!(sanitize_identifier("!@#"), "_invalid");
    }

    #[test]
    fn test_column_name_strips_model() {
        assert_eq!(column_name("EmailSignup.email"), "email");
        assert_eq!(column_name("email"), "email");
    }

    #[tokio::test]
    async fn test_pages_slice_the_result_set() {
        let fetcher = SqliteChunkFetcher::new(seeded_pool().await, "email_signups");
        let mut options = options_with_limit(2);

        let page1 = fetcher.fetch_page(&options).await.unwrap();
        assert_eq!(page1.len(), 2);
        assert_eq!(page1[0].get("email"), Some(&json!("a@example.com")));

        options.page = 3;
        let page3 = fetcher.fetch_page(&options).await.unwrap();
        assert_eq!(page3.len(), 1);
        assert_eq!(page3[0].get("email"), Some(&json!("e@example.com")));

        options.page = 4;
        assert!(fetcher.fetch_page(&options).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_is_deterministic_for_static_data() {
        let fetcher = SqliteChunkFetcher::new(seeded_pool().await, "email_signups");
        let options = options_with_limit(3);
        let first = fetcher.fetch_page(&options).await.unwrap();
        let second = fetcher.fetch_page(&options).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_conditions_equality_and_in() {
        let fetcher = SqliteChunkFetcher::new(seeded_pool().await, "email_signups");
        let mut options = options_with_limit(10);
        options
            .conditions
            .insert("confirmed".to_string(), json!(1));
        let confirmed = fetcher.fetch_page(&options).await.unwrap();
        assert_eq!(confirmed.len(), 3);

        let mut options = options_with_limit(10);
        options
            .conditions
            .insert("id".to_string(), json!([1, 5]));
        let picked = fetcher.fetch_page(&options).await.unwrap();
        assert_eq!(picked.len(), 2);
        assert_eq!(picked[1].get("email"), Some(&json!("e@example.com")));
    }

    #[tokio::test]
    async fn test_field_projection_limits_columns() {
        let fetcher = SqliteChunkFetcher::new(seeded_pool().await, "email_signups");
        let mut options = options_with_limit(1);
        options.fields = vec!["EmailSignup.email".to_string()];
        let rows = fetcher.fetch_page(&options).await.unwrap();
        assert_eq!(rows[0].len(), 1);
        assert!(rows[0].contains_key("email"));
    }

    #[tokio::test]
    async fn test_order_desc() {
        let fetcher = SqliteChunkFetcher::new(seeded_pool().await, "email_signups");
        let mut options = options_with_limit(1);
        options.order = vec!["id DESC".to_string()];
        let rows = fetcher.fetch_page(&options).await.unwrap();
        assert_eq!(rows[0].get("id"), Some(&json!(5)));
    }

    #[tokio::test]
    async fn test_missing_limit_is_a_single_page() {
        let fetcher = SqliteChunkFetcher::new(seeded_pool().await, "email_signups");
        let mut options = QueryOptions::default();
        options.order = vec!["id".to_string()];

        let all = fetcher.fetch_page(&options).await.unwrap();
        assert_eq!(all.len(), 5);

        options.page = 2;
        assert!(fetcher.fetch_page(&options).await.unwrap().is_empty());
    }
}
