//! SQLite persistence for entries and their history.
//!
//! Filters arrive as Mongo-style documents (`{"_date": {"$lt": "..."}}`) and
//! are compiled to SQL with bound parameters. Service fields map to columns,
//! every other field is read out of the JSON `body`.

use std::fmt;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::models::StoredEntry;
use crate::models::date::format_oplog;

const SERVICE_FIELDS: [&str; 4] = ["_id", "_date", "_user", "_type"];

#[derive(Debug)]
pub enum StoreError {
    Database(sqlx::Error),
    InvalidField(String),
    UnsupportedOperator(String),
    InvalidValue(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Database(e) => write!(f, "database error: {e}"),
            StoreError::InvalidField(field) => write!(f, "invalid field name: {field}"),
            StoreError::UnsupportedOperator(op) => write!(f, "unsupported operator: {op}"),
            StoreError::InvalidValue(value) => write!(f, "invalid filter value: {value}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e)
    }
}

pub struct FindQuery<'a> {
    pub filter: &'a Map<String, Value>,
    pub skip: i64,
    /// Zero means unbounded.
    pub limit: i64,
    pub sort: &'a [(String, i64)],
}

/// Outcome of a write, in the shape API callers already understand.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteResult {
    pub ok: f64,
    pub n: u64,
    pub err: Option<String>,
}

impl WriteResult {
    fn affected(n: u64) -> Self {
        Self { ok: 1.0, n, err: None }
    }
}

#[derive(Clone)]
pub struct EntryStore {
    pool: SqlitePool,
}

impl EntryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn find(&self, query: &FindQuery<'_>) -> Result<Vec<StoredEntry>, StoreError> {
        let mut builder =
            QueryBuilder::<Sqlite>::new("SELECT id, date, user, type, body FROM entries WHERE 1 = 1");
        push_filter(&mut builder, query.filter)?;

        builder.push(" ORDER BY ");
        for (field, direction) in query.sort {
            let direction = match direction {
                -1 => " DESC",
                1 => " ASC",
                _ => continue,
            };
            builder.push(column(field)?).push(direction).push(", ");
        }
        let limit = if query.limit > 0 { query.limit } else { -1 };
        builder
            .push("rowid LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(query.skip);

        let entries = builder
            .build_query_as::<StoredEntry>()
            .fetch_all(&self.pool)
            .await?;
        Ok(entries)
    }

    pub async fn get(&self, id: &str) -> Result<Option<StoredEntry>, sqlx::Error> {
        sqlx::query_as("SELECT id, date, user, type, body FROM entries WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Insert a validated document and return its new id.
    pub async fn insert(&self, document: &Map<String, Value>) -> Result<String, sqlx::Error> {
        let id = Uuid::new_v4().simple().to_string();
        let row = Columns::from_document(document);

        sqlx::query("INSERT INTO entries (id, date, user, type, body) VALUES (?, ?, ?, ?, ?)")
            .bind(&id)
            .bind(&row.date)
            .bind(&row.user)
            .bind(&row.kind)
            .bind(&row.body)
            .execute(&self.pool)
            .await?;

        Ok(id)
    }

    /// Overwrite `previous` with `document` if it belongs to `owner`,
    /// recording the old version in the history table.
    pub async fn replace(
        &self,
        previous: &StoredEntry,
        owner: &str,
        document: &Map<String, Value>,
        action: &str,
    ) -> Result<WriteResult, sqlx::Error> {
        let row = Columns::from_document(document);
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE entries SET date = ?, user = ?, type = ?, body = ? WHERE id = ? AND user IS ?",
        )
        .bind(&row.date)
        .bind(&row.user)
        .bind(&row.kind)
        .bind(&row.body)
        .bind(&previous.id)
        .bind(owner)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() > 0 {
            backup(&mut tx, previous, action).await?;
        }
        tx.commit().await?;

        Ok(WriteResult::affected(result.rows_affected()))
    }

    /// Delete `previous` unless it belongs to someone other than `caller`.
    pub async fn delete(
        &self,
        previous: &StoredEntry,
        caller: &str,
        action: &str,
    ) -> Result<WriteResult, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("DELETE FROM entries WHERE id = ? AND (user IS NULL OR user = ?)")
            .bind(&previous.id)
            .bind(caller)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() > 0 {
            backup(&mut tx, previous, action).await?;
        }
        tx.commit().await?;

        Ok(WriteResult::affected(result.rows_affected()))
    }
}

async fn backup(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    previous: &StoredEntry,
    action: &str,
) -> Result<(), sqlx::Error> {
    let body = Value::Object(previous.clone().into_document()).to_string();
    sqlx::query("INSERT INTO entry_history (date, body, type) VALUES (?, ?, ?)")
        .bind(format_oplog(&Utc::now()))
        .bind(body)
        .bind(action)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

struct Columns {
    date: String,
    user: Option<String>,
    kind: Option<String>,
    body: String,
}

impl Columns {
    fn from_document(document: &Map<String, Value>) -> Self {
        let text = |name: &str| document.get(name).and_then(Value::as_str).map(str::to_string);
        let body: Map<String, Value> = document
            .iter()
            .filter(|(name, _)| !SERVICE_FIELDS.contains(&name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        Self {
            date: text("_date").unwrap_or_else(|| format_oplog(&Utc::now())),
            user: text("_user"),
            kind: text("_type"),
            body: Value::Object(body).to_string(),
        }
    }
}

fn column(field: &str) -> Result<String, StoreError> {
    let column = match field {
        "_id" => "id".to_string(),
        "_date" => "date".to_string(),
        "_user" => "user".to_string(),
        "_type" => "type".to_string(),
        name if !name.is_empty()
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') =>
        {
            format!("json_extract(body, '$.{name}')")
        }
        other => return Err(StoreError::InvalidField(other.to_string())),
    };
    Ok(column)
}

fn comparison(operator: &str) -> Result<&'static str, StoreError> {
    match operator {
        "$eq" => Ok(" IS "),
        "$ne" => Ok(" IS NOT "),
        "$lt" => Ok(" < "),
        "$lte" => Ok(" <= "),
        "$gt" => Ok(" > "),
        "$gte" => Ok(" >= "),
        other => Err(StoreError::UnsupportedOperator(other.to_string())),
    }
}

fn push_filter(
    builder: &mut QueryBuilder<'_, Sqlite>,
    filter: &Map<String, Value>,
) -> Result<(), StoreError> {
    for (field, condition) in filter {
        let column = column(field)?;
        match condition {
            Value::Object(operators) => {
                for (operator, operand) in operators {
                    builder.push(" AND ").push(&column);
                    if operator == "$in" {
                        let Value::Array(items) = operand else {
                            return Err(StoreError::InvalidValue(operand.to_string()));
                        };
                        if items.is_empty() {
                            builder.push(" IN (NULL)");
                            continue;
                        }
                        builder.push(" IN (");
                        for (i, item) in items.iter().enumerate() {
                            if i > 0 {
                                builder.push(", ");
                            }
                            push_value(builder, item)?;
                        }
                        builder.push(")");
                    } else {
                        builder.push(comparison(operator)?);
                        push_value(builder, operand)?;
                    }
                }
            }
            value => {
                builder.push(" AND ").push(&column).push(" IS ");
                push_value(builder, value)?;
            }
        }
    }
    Ok(())
}

fn push_value(builder: &mut QueryBuilder<'_, Sqlite>, value: &Value) -> Result<(), StoreError> {
    match value {
        Value::String(s) => {
            builder.push_bind(s.clone());
        }
        Value::Bool(b) => {
            builder.push_bind(*b);
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                builder.push_bind(i);
            } else if let Some(f) = n.as_f64() {
                builder.push_bind(f);
            } else {
                return Err(StoreError::InvalidValue(n.to_string()));
            }
        }
        Value::Null => {
            builder.push("NULL");
        }
        other => return Err(StoreError::InvalidValue(other.to_string())),
    }
    Ok(())
}
