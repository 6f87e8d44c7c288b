use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value, json};

use super::{ClientError, RpcClient};
use crate::models::date::format_oplog;
use crate::models::{Entry, EntryPatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl Serialize for SortOrder {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            SortOrder::Ascending => serializer.serialize_i64(1),
            SortOrder::Descending => serializer.serialize_i64(-1),
        }
    }
}

/// Parameters of `entry.get`. `find` is mandatory; the rest is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntryQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub find: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<(String, SortOrder)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
}

impl EntryQuery {
    pub fn find(filter: Map<String, Value>) -> Self {
        Self {
            find: Some(filter),
            ..Default::default()
        }
    }

    pub fn date_before(date: &DateTime<Utc>) -> Self {
        Self::find(date_filter("$lt", date))
    }

    pub fn date_after(date: &DateTime<Utc>) -> Self {
        Self::find(date_filter("$gt", date))
    }

    pub fn by_id(id: &str) -> Self {
        let mut filter = Map::new();
        filter.insert("_id".to_string(), Value::String(id.to_string()));
        Self::find(filter)
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn sort(mut self, field: &str, order: SortOrder) -> Self {
        self.sort.push((field.to_string(), order));
        self
    }

    pub fn fields(mut self, fields: &[&str]) -> Self {
        self.fields = Some(fields.iter().map(|field| field.to_string()).collect());
        self
    }
}

fn date_filter(operator: &str, date: &DateTime<Utc>) -> Map<String, Value> {
    let mut filter = Map::new();
    filter.insert("_date".to_string(), json!({ operator: format_oplog(date) }));
    filter
}

#[derive(Debug, Clone, PartialEq)]
pub enum EntryPut {
    /// Any id on the entry is ignored; the service assigns one.
    Create(Entry),
    Update { id: String, set: EntryPatch },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PutOutcome {
    /// The submitted entry with the assigned id merged in.
    Created(Entry),
    Updated,
}

/// `entry.get`, `entry.put` and `entry.del` over the RPC client.
#[derive(Clone)]
pub struct EntryService {
    rpc: RpcClient,
}

impl EntryService {
    pub fn new(rpc: RpcClient) -> Self {
        Self { rpc }
    }

    pub async fn get(&self, query: &EntryQuery) -> Result<Vec<Entry>, ClientError> {
        if query.find.is_none() {
            return Err(ClientError::FindRequired);
        }
        let params = to_params(query)?;
        let result = self.rpc.call("entry.get", params).await?;
        serde_json::from_value(result).map_err(|e| {
            tracing::warn!(error = %e, "entry.get returned malformed entries");
            ClientError::InvalidResponse
        })
    }

    pub async fn put(&self, put: EntryPut) -> Result<PutOutcome, ClientError> {
        match put {
            EntryPut::Create(mut entry) => {
                entry.id = None;
                let result = self.rpc.call("entry.put", to_params(&entry)?).await?;
                let Value::String(id) = result else {
                    return Err(ClientError::InvalidResponse);
                };
                entry.id = Some(id);
                Ok(PutOutcome::Created(entry))
            }
            EntryPut::Update { id, set } => {
                if id.is_empty() {
                    return Err(ClientError::IdRequired);
                }
                let params = json!({ "_id": id, "$set": to_params(&set)? });
                self.rpc.call("entry.put", params).await?;
                Ok(PutOutcome::Updated)
            }
        }
    }

    pub async fn del(&self, id: &str) -> Result<(), ClientError> {
        if id.is_empty() {
            return Err(ClientError::IdRequired);
        }
        self.rpc.call("entry.del", json!({ "_id": id })).await?;
        Ok(())
    }
}

fn to_params<T: Serialize>(value: &T) -> Result<Value, ClientError> {
    serde_json::to_value(value).map_err(|e| ClientError::Transport(e.to_string()))
}
