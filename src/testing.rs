//! In-memory backend used by unit tests.

use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::model::{generate_id, parse_id, Id, ResourceType};
use crate::service::{ApiRequest, ApiResponse, Method, Transport};

const PAGE_SIZE: usize = 2;

#[derive(Default)]
struct MemoryState {
    records: HashMap<String, Vec<Value>>,
    requests: Vec<ApiRequest>,
    failures: VecDeque<Error>,
}

/// Answers the REST contract from memory, records every request and can
/// inject failures and latency.
#[derive(Default)]
pub struct MemoryTransport {
    state: Mutex<MemoryState>,
    latency: Duration,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    /// Store a record under `path`, filling in id and timestamps.
    pub fn seed(&self, path: &str, record: Value) -> Id {
        let record = stamp(record, None);
        let id = record_id(&record).unwrap_or_else(generate_id);
        self.state
            .lock()
            .records
            .entry(path.to_string())
            .or_default()
            .push(record);
        id
    }

    pub fn record(&self, path: &str, id: Id) -> Option<Value> {
        self.state
            .lock()
            .records
            .get(path)
            .and_then(|records| records.iter().find(|r| record_id(r) == Some(id)).cloned())
    }

    /// The next request fails with `err`. Backend errors are answered as a
    /// response with that status; anything else fails the transport.
    pub fn fail_next(&self, err: Error) {
        self.state.lock().failures.push_back(err);
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.state.lock().requests.clone()
    }

    pub fn count(&self, method: Method) -> usize {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| r.method == method)
            .count()
    }

    fn respond(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let mut state = self.state.lock();
        if let Some(failure) = state.failures.pop_front() {
            return match failure {
                Error::Backend { status, body } => Ok(ApiResponse {
                    status,
                    body: Value::String(body),
                }),
                other => Err(other),
            };
        }

        let (base, id) = split_path(&request.path);
        let records = state.records.entry(base.to_string()).or_default();

        let response = match (request.method, id) {
            (Method::Get, Some(id)) => match records.iter().find(|r| record_id(r) == Some(id)) {
                Some(record) => ok(record.clone()),
                None => not_found(),
            },
            (Method::Get, None) => {
                let name = request.query_param("name");
                let page: usize = request
                    .query_param("page")
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(1);
                let matching: Vec<Value> = records
                    .iter()
                    .filter(|r| name.map_or(true, |name| r["name"] == name))
                    .cloned()
                    .collect();
                let page_count = matching.len().div_ceil(PAGE_SIZE).max(1);
                let items: Vec<Value> = matching
                    .iter()
                    .skip((page.max(1) - 1) * PAGE_SIZE)
                    .take(PAGE_SIZE)
                    .cloned()
                    .collect();
                ok(json!({
                    "items": items,
                    "totalItemCount": matching.len(),
                    "pageCount": page_count,
                    "page": page,
                }))
            }
            (Method::Post, None) => {
                let record = stamp(request.body.clone().unwrap_or_default(), None);
                records.push(record.clone());
                ApiResponse {
                    status: 201,
                    body: record,
                }
            }
            (Method::Put, Some(id)) => match records.iter_mut().find(|r| record_id(r) == Some(id)) {
                Some(existing) => {
                    let merged = stamp(request.body.clone().unwrap_or_default(), Some(existing));
                    *existing = merged.clone();
                    ok(merged)
                }
                None => not_found(),
            },
            _ => ApiResponse {
                status: 405,
                body: Value::Null,
            },
        };
        Ok(response)
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.state.lock().requests.push(request.clone());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.respond(&request)
    }
}

fn ok(body: Value) -> ApiResponse {
    ApiResponse { status: 200, body }
}

fn not_found() -> ApiResponse {
    ApiResponse {
        status: 404,
        body: Value::String("not found".to_string()),
    }
}

fn record_id(record: &Value) -> Option<Id> {
    record.get("id").and_then(Value::as_str).and_then(parse_id)
}

fn split_path(path: &str) -> (&str, Option<Id>) {
    match path.rsplit_once('/') {
        Some((base, last)) => match parse_id(last) {
            Some(id) => (base, Some(id)),
            None => (path, None),
        },
        None => (path, None),
    }
}

/// Merge `body` over `existing` the way the backend does: fresh ids for new
/// records and new sub-resources, server-owned timestamps.
fn stamp(body: Value, existing: Option<&Value>) -> Value {
    let mut record = match existing {
        Some(Value::Object(fields)) => fields.clone(),
        _ => Map::new(),
    };
    if let Value::Object(fields) = body {
        record.extend(fields);
    }

    let now = chrono::Utc::now().to_rfc3339();
    if record_id(&Value::Object(record.clone())).is_none() {
        record.insert("id".to_string(), json!(generate_id()));
    }
    record.entry("createdAt").or_insert_with(|| json!(now));
    record.insert("updatedAt".to_string(), json!(now));

    for kind in ResourceType::ALL {
        if let Some(Value::Array(items)) = record.get_mut(kind.wire_key()) {
            for item in items.iter_mut() {
                if let Value::Object(fields) = item {
                    fields
                        .entry("id")
                        .or_insert_with(|| json!(generate_id()));
                }
            }
        }
    }
    Value::Object(record)
}
