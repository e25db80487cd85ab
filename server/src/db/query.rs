//! SQL text for the record tables.
//!
//! Table names are validated identifiers (see `Config`); every value is a
//! bound parameter.

use ferry_engine::error::{StoreError, StoreResult};
use ferry_engine::{Comparison, Condition, Filter, Page, Patch};
use serde_json::Value;

/// Store-side wall clock in milliseconds. `clock_timestamp()` advances
/// within a transaction, unlike `now()`.
pub const NOW_MS: &str = "(EXTRACT(EPOCH FROM clock_timestamp()) * 1000)::BIGINT";

const COLUMNS: &str = "id, payload, created_at, updated_at";

/// A bound query parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlArg {
    Text(String),
    OptText(Option<String>),
    BigInt(i64),
    OptBigInt(Option<i64>),
    Json(Value),
}

/// SQL text plus its parameters, in `$n` order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<SqlArg>,
}

/// `CREATE TABLE` for one record table and its delta index.
pub fn create_table(table: &str) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            seq BIGSERIAL UNIQUE NOT NULL,
            id TEXT PRIMARY KEY,
            payload JSONB NOT NULL DEFAULT '{{}}'::jsonb,
            created_at BIGINT NOT NULL,
            updated_at BIGINT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS {table}_updated_at_idx ON {table} (updated_at);
        "#
    )
}

pub fn count(table: &str) -> String {
    format!("SELECT COUNT(*) FROM {table}")
}

/// Matching rows in insertion order, windowed by `page`.
pub fn select(table: &str, filter: &Filter, page: Page) -> Statement {
    let mut args = Vec::new();
    let predicate = predicate(filter, &mut args);

    args.push(SqlArg::OptBigInt(page.limit.map(to_bigint)));
    let limit = args.len();
    args.push(SqlArg::BigInt(to_bigint(page.offset)));
    let offset = args.len();

    Statement {
        sql: format!(
            "SELECT {COLUMNS} FROM {table} WHERE {predicate} ORDER BY seq LIMIT ${limit} OFFSET ${offset}"
        ),
        args,
    }
}

/// Insert one row. Missing timestamps come from the store clock, and
/// `created_at` falls back to `updated_at`.
pub fn insert(
    table: &str,
    id: Option<String>,
    payload: Value,
    created_at: Option<u64>,
    updated_at: Option<u64>,
) -> Statement {
    Statement {
        sql: format!(
            r#"
            WITH clock AS (SELECT {NOW_MS} AS ms)
            INSERT INTO {table} (id, payload, created_at, updated_at)
            SELECT COALESCE($1, gen_random_uuid()::TEXT),
                   $2::jsonb,
                   COALESCE($3, $4, clock.ms),
                   COALESCE($4, clock.ms)
            FROM clock
            RETURNING {COLUMNS}
            "#
        ),
        args: vec![
            SqlArg::OptText(id),
            SqlArg::Json(payload),
            SqlArg::OptBigInt(created_at.map(to_bigint)),
            SqlArg::OptBigInt(updated_at.map(to_bigint)),
        ],
    }
}

/// Patch the first matching row and move its `updated_at` strictly forward.
pub fn update(table: &str, filter: &Filter, patch: Patch) -> Statement {
    let mut args = Vec::new();
    let predicate = predicate(filter, &mut args);

    let payload = match patch {
        Patch::Set(fields) => {
            args.push(SqlArg::Json(Value::Object(fields)));
            format!(
                "(CASE WHEN jsonb_typeof(payload) = 'object' THEN payload ELSE '{{}}'::jsonb END) || ${}::jsonb",
                args.len()
            )
        }
        Patch::Replace(value) => {
            args.push(SqlArg::Json(value));
            format!("${}::jsonb", args.len())
        }
    };

    Statement {
        sql: format!(
            r#"
            UPDATE {table}
            SET payload = {payload},
                updated_at = GREATEST({NOW_MS}, updated_at + 1)
            WHERE seq = (
                SELECT seq FROM {table} WHERE {predicate} ORDER BY seq LIMIT 1 FOR UPDATE
            )
            RETURNING {COLUMNS}
            "#
        ),
        args,
    }
}

/// Reject filters that have no sensible jsonb rendering: empty field names,
/// and ordering comparisons against objects or arrays.
pub fn check(filter: &Filter) -> StoreResult<()> {
    for condition in filter.conditions() {
        if let Condition::Field(name, op, value) = condition {
            if name.is_empty() {
                return Err(StoreError::InvalidFilter("empty field name".to_string()));
            }
            if *op != Comparison::Eq && (value.is_object() || value.is_array()) {
                return Err(StoreError::InvalidFilter(format!(
                    "cannot order field {name} against a structured value"
                )));
            }
        }
    }
    Ok(())
}

/// `WHERE` body for `filter`, pushing its values onto `args`.
fn predicate(filter: &Filter, args: &mut Vec<SqlArg>) -> String {
    if filter.is_empty() {
        return "TRUE".to_string();
    }

    filter
        .conditions()
        .iter()
        .map(|condition| match condition {
            Condition::Id(id) => {
                args.push(SqlArg::Text(id.clone()));
                format!("id = ${}", args.len())
            }
            Condition::UpdatedAt(op, ts) => {
                args.push(SqlArg::BigInt(to_bigint(*ts)));
                format!("updated_at {} ${}", op.as_sql(), args.len())
            }
            Condition::Field(name, op, value) => {
                args.push(SqlArg::Text(name.clone()));
                let field = args.len();
                args.push(SqlArg::Json(value.clone()));
                let operand = args.len();
                // jsonb orders across types; values of different types never match.
                format!(
                    "(jsonb_typeof(payload -> ${field}::TEXT) = jsonb_typeof(${operand}::jsonb) \
                     AND payload -> ${field}::TEXT {} ${operand}::jsonb)",
                    op.as_sql()
                )
            }
        })
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn to_bigint(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
