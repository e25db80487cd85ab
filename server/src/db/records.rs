//! PostgreSQL-backed record store.

use super::query::{self, SqlArg, Statement};
use super::Pool;
use async_trait::async_trait;
use ferry_engine::error::{StoreError, StoreResult};
use ferry_engine::{Document, Filter, Page, Patch, Record, RecordStore};
use sqlx::error::ErrorKind;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::QueryAs;
use sqlx::{Postgres, Row};

/// A stored record row from the database.
#[derive(Debug)]
pub struct StoredRecord {
    pub id: String,
    pub payload: serde_json::Value,
    pub created_at: i64,
    pub updated_at: i64,
}

impl<'r> sqlx::FromRow<'r, PgRow> for StoredRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredRecord {
            id: row.try_get("id")?,
            payload: row.try_get("payload")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl StoredRecord {
    /// Convert database row to a ferry-engine Record.
    pub fn into_record(self) -> Record {
        Record {
            id: self.id,
            created_at: self.created_at.max(0) as u64,
            updated_at: self.updated_at.max(0) as u64,
            payload: self.payload,
        }
    }
}

/// One record table accessed through a connection pool.
#[derive(Debug, Clone)]
pub struct PgRecordStore {
    pool: Pool,
    table: String,
}

impl PgRecordStore {
    /// `table` must already be a validated identifier.
    pub fn new(pool: Pool, table: impl Into<String>) -> Self {
        Self {
            pool,
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the table and its index if missing.
    pub async fn ensure_table(&self) -> Result<(), sqlx::Error> {
        sqlx::raw_sql(&query::create_table(&self.table))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn fetch_all(&self, statement: Statement) -> StoreResult<Vec<Record>> {
        let rows = bind(sqlx::query_as::<_, StoredRecord>(&statement.sql), statement.args)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(rows.into_iter().map(StoredRecord::into_record).collect())
    }

    async fn fetch_optional(&self, statement: Statement) -> StoreResult<Option<Record>> {
        let row = bind(sqlx::query_as::<_, StoredRecord>(&statement.sql), statement.args)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(row.map(StoredRecord::into_record))
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn count(&self) -> StoreResult<u64> {
        let count: i64 = sqlx::query_scalar(&query::count(&self.table))
            .fetch_one(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(count.max(0) as u64)
    }

    async fn find(&self, filter: &Filter, page: Page) -> StoreResult<Vec<Record>> {
        query::check(filter)?;
        self.fetch_all(query::select(&self.table, filter, page)).await
    }

    async fn insert(&self, document: Document) -> StoreResult<Record> {
        let statement = query::insert(
            &self.table,
            document.id,
            document.payload,
            document.created_at,
            document.updated_at,
        );
        self.fetch_optional(statement)
            .await?
            .ok_or_else(|| StoreError::Write(format!("insert into {} returned no row", self.table)))
    }

    async fn update(&self, filter: &Filter, patch: Patch) -> StoreResult<Option<Record>> {
        query::check(filter)?;
        self.fetch_optional(query::update(&self.table, filter, patch))
            .await
    }
}

fn bind<'q>(
    mut query: QueryAs<'q, Postgres, StoredRecord, PgArguments>,
    args: Vec<SqlArg>,
) -> QueryAs<'q, Postgres, StoredRecord, PgArguments> {
    for arg in args {
        query = match arg {
            SqlArg::Text(value) => query.bind(value),
            SqlArg::OptText(value) => query.bind(value),
            SqlArg::BigInt(value) => query.bind(value),
            SqlArg::OptBigInt(value) => query.bind(value),
            SqlArg::Json(value) => query.bind(value),
        };
    }
    query
}

/// Constraint violations are write rejections; anything else is treated as
/// the store being unreachable.
pub fn store_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if matches!(
            db.kind(),
            ErrorKind::UniqueViolation
                | ErrorKind::ForeignKeyViolation
                | ErrorKind::NotNullViolation
                | ErrorKind::CheckViolation
        ) {
            return StoreError::Write(db.message().to_string());
        }
    }

    tracing::debug!(error = %err, "store call failed");
    StoreError::Unavailable(err.to_string())
}
