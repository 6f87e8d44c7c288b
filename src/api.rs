//! JSON-RPC methods served on `/api`: `entry.get`, `entry.put`, `entry.del`.

use chrono::Utc;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::models::date::{format_oplog, is_oplog};
use crate::models::{USER_TYPE, User};
use crate::store::{EntryStore, FindQuery, StoreError, WriteResult};

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;
pub const SERVER_ERROR: i64 = -32099;

const DEFAULT_LIMIT: u32 = 20;

/// An error reported to the caller in the `error` envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct RpcFault {
    pub code: i64,
    pub message: String,
}

impl RpcFault {
    pub fn new(code: i64) -> Self {
        let message = match code {
            PARSE_ERROR => "Parse error",
            INVALID_REQUEST => "Invalid Request",
            METHOD_NOT_FOUND => "Method not found",
            INVALID_PARAMS => "Invalid params",
            SERVER_ERROR => "Server error",
            _ => "Internal error",
        };
        Self {
            code,
            message: message.to_string(),
        }
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self {
            code: SERVER_ERROR,
            message: message.into(),
        }
    }

    pub fn to_envelope(&self) -> Value {
        json!({"error": {"code": self.code, "message": self.message}})
    }
}

/// A request message that passed shape validation.
#[derive(Debug, Clone)]
pub struct Message {
    pub method: String,
    pub params: Map<String, Value>,
}

impl Message {
    pub fn parse(value: Value) -> Result<Self, RpcFault> {
        let Value::Object(mut object) = value else {
            return Err(RpcFault::new(INVALID_REQUEST));
        };
        let method = match object.remove("method") {
            Some(Value::String(method)) => method,
            _ => return Err(RpcFault::new(INVALID_REQUEST)),
        };
        let params = match object.remove("params") {
            Some(Value::Object(params)) => params,
            _ => return Err(RpcFault::new(INVALID_REQUEST)),
        };
        Ok(Self { method, params })
    }
}

pub fn envelope(outcome: Result<Value, RpcFault>) -> Value {
    match outcome {
        Ok(result) => json!({ "result": result }),
        Err(fault) => fault.to_envelope(),
    }
}

pub async fn dispatch(store: &EntryStore, user: &User, message: Message) -> Result<Value, RpcFault> {
    tracing::debug!(method = %message.method, user = %user.name, "rpc call");
    match message.method.as_str() {
        "entry.get" => entry_get(store, message.params).await,
        "entry.put" => entry_put(store, user, message.params).await,
        "entry.del" => entry_del(store, user, message.params).await,
        other => {
            tracing::warn!(method = other, "unknown rpc method");
            Err(RpcFault::new(METHOD_NOT_FOUND))
        }
    }
}

#[derive(Deserialize)]
struct GetParams {
    find: Map<String, Value>,
    #[serde(default)]
    skip: u32,
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default)]
    sort: Vec<(String, i64)>,
    #[serde(default)]
    fields: Option<Vec<String>>,
}

fn default_limit() -> u32 {
    DEFAULT_LIMIT
}

async fn entry_get(store: &EntryStore, params: Map<String, Value>) -> Result<Value, RpcFault> {
    let params: GetParams = serde_json::from_value(Value::Object(params)).map_err(|e| {
        tracing::warn!(error = %e, "entry.get params rejected");
        RpcFault::new(INVALID_PARAMS)
    })?;

    let query = FindQuery {
        filter: &params.find,
        skip: i64::from(params.skip),
        limit: i64::from(params.limit),
        sort: &params.sort,
    };
    let entries = store.find(&query).await.map_err(|e| match e {
        StoreError::Database(e) => {
            tracing::error!(error = %e, "Get entry error");
            RpcFault::server("Failed to query entries")
        }
        other => {
            tracing::warn!(error = %other, "entry.get filter rejected");
            RpcFault::new(INVALID_PARAMS)
        }
    })?;

    let documents = entries
        .into_iter()
        .map(|entry| Value::Object(project(entry.into_document(), params.fields.as_deref())))
        .collect();
    Ok(Value::Array(documents))
}

async fn entry_put(
    store: &EntryStore,
    user: &User,
    mut params: Map<String, Value>,
) -> Result<Value, RpcFault> {
    let failed = |e: sqlx::Error| {
        tracing::error!(error = %e, "Failed to put entry");
        RpcFault::server("Failed to put entry")
    };

    let Some(id) = params.remove("_id") else {
        params
            .entry("_date")
            .or_insert_with(|| Value::String(format_oplog(&Utc::now())));
        params.insert("_user".to_string(), Value::String(user.name.clone()));
        validate(&params)?;

        let id = store.insert(&params).await.map_err(failed)?;
        tracing::info!(%id, user = %user.name, "entry created");
        return Ok(Value::String(id));
    };

    let Value::String(id) = id else {
        return Err(RpcFault::new(INVALID_PARAMS));
    };
    let previous = store
        .get(&id)
        .await
        .map_err(failed)?
        .ok_or_else(|| RpcFault::server(format!("Entry with id \"{id}\" not found")))?;

    let mut document = previous.clone().into_document();
    apply_update(&mut document, params)?;
    validate(&document)?;

    let result = store
        .replace(&previous, &user.name, &document, "entry.put")
        .await
        .map_err(failed)?;
    tracing::info!(%id, user = %user.name, n = result.n, "entry updated");
    write_result(result)
}

async fn entry_del(
    store: &EntryStore,
    user: &User,
    params: Map<String, Value>,
) -> Result<Value, RpcFault> {
    let failed = |e: sqlx::Error| {
        tracing::error!(error = %e, "Failed to delete entry");
        RpcFault::server("Failed to delete entry")
    };

    let Some(id) = params.get("_id").and_then(Value::as_str) else {
        return Err(RpcFault::new(INVALID_PARAMS));
    };
    let previous = store
        .get(id)
        .await
        .map_err(failed)?
        .ok_or_else(|| RpcFault::server(format!("Entry with id \"{id}\" not found")))?;

    let result = store
        .delete(&previous, &user.name, "entry.del")
        .await
        .map_err(failed)?;
    tracing::info!(%id, user = %user.name, n = result.n, "entry deleted");
    write_result(result)
}

fn write_result(result: WriteResult) -> Result<Value, RpcFault> {
    serde_json::to_value(result).map_err(|e| {
        tracing::error!(error = %e, "Unable to encode result");
        RpcFault::new(INTERNAL_ERROR)
    })
}

/// Apply `$set` / `$unset` operators. `_id` and `_user` cannot be changed.
fn apply_update(document: &mut Map<String, Value>, update: Map<String, Value>) -> Result<(), RpcFault> {
    let protected = |name: &str| matches!(name.trim(), "_id" | "_user");

    for (operator, fields) in update {
        let Value::Object(fields) = fields else {
            return Err(RpcFault::new(INVALID_PARAMS));
        };
        match operator.as_str() {
            "$set" => {
                for (name, value) in fields.into_iter().filter(|(name, _)| !protected(name)) {
                    document.insert(name, value);
                }
            }
            "$unset" => {
                for name in fields.keys().filter(|name| !protected(name)) {
                    document.remove(name);
                }
            }
            other => {
                tracing::warn!(operator = other, "unsupported update operator");
                return Err(RpcFault::new(INVALID_PARAMS));
            }
        }
    }
    Ok(())
}

fn validate(document: &Map<String, Value>) -> Result<(), RpcFault> {
    let invalid = |reason: &str| {
        tracing::warn!(reason, "Validation failed");
        RpcFault::new(INVALID_PARAMS)
    };

    match document.get("_date") {
        Some(Value::String(date)) if is_oplog(date) => {}
        _ => return Err(invalid("_date must be a YYYY-MM-DDTHH:MM:SSZ string")),
    }
    for field in ["_type", "_user", "summary"] {
        if document.get(field).is_some_and(|value| !value.is_string()) {
            return Err(invalid("service fields and summary must be strings"));
        }
    }
    if document.get("_type").and_then(Value::as_str) == Some(USER_TYPE) {
        let summary = document.get("summary").and_then(Value::as_str).unwrap_or("");
        if summary.is_empty() {
            return Err(invalid("user entries require a summary"));
        }
    }
    Ok(())
}

fn project(mut document: Map<String, Value>, fields: Option<&[String]>) -> Map<String, Value> {
    if let Some(fields) = fields {
        document.retain(|name, _| name == "_id" || fields.iter().any(|field| field == name));
    }
    document
}
