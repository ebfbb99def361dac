//! services/portal/src/adapters/firebase/firestore.rs
//!
//! Cloud Firestore over its REST API, plus the codec between Firestore's
//! typed `Value` representation and plain JSON document bodies.

use super::identity::FirebaseIdentityProvider;
use super::{json, send, Service};
use async_trait::async_trait;
use kids_learning_core::ports::{
    Direction, DocumentData, DocumentStore, PortError, PortResult, Query, SetMode, Snapshot,
};
use reqwest::RequestBuilder;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

//=========================================================================================
// Value codec
//=========================================================================================

fn malformed(what: &str) -> PortError {
    PortError::Store(format!("malformed Firestore value: {}", what))
}

/// Encodes a JSON value as a Firestore `Value`.
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            // 64-bit integers travel as strings.
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64().unwrap_or_default() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

/// Encodes a document body as a Firestore `fields` map.
pub fn encode_fields(data: &DocumentData) -> Value {
    Value::Object(
        data.iter()
            .map(|(key, value)| (key.clone(), encode_value(value)))
            .collect(),
    )
}

/// Decodes a Firestore `Value` back into plain JSON. Timestamps, references
/// and bytes come back as their string forms.
pub fn decode_value(value: &Value) -> PortResult<Value> {
    let (kind, inner) = value
        .as_object()
        .and_then(|typed| typed.iter().next())
        .ok_or_else(|| malformed("expected a single-key object"))?;

    let decoded = match kind.as_str() {
        "nullValue" => Value::Null,
        "booleanValue" => Value::Bool(inner.as_bool().ok_or_else(|| malformed(kind))?),
        "integerValue" => match inner {
            Value::String(s) => s.parse::<i64>().map(Value::from).map_err(|_| malformed(s))?,
            Value::Number(n) => Value::Number(n.clone()),
            _ => return Err(malformed(kind)),
        },
        // NaN and the infinities arrive as strings and have no JSON form.
        "doubleValue" => match inner {
            Value::Number(n) => Value::Number(n.clone()),
            _ => Value::Null,
        },
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => {
            Value::String(inner.as_str().ok_or_else(|| malformed(kind))?.to_string())
        }
        "geoPointValue" => inner.clone(),
        "arrayValue" => match inner.get("values").and_then(Value::as_array) {
            Some(values) => Value::Array(values.iter().map(decode_value).collect::<PortResult<_>>()?),
            None => Value::Array(Vec::new()),
        },
        "mapValue" => Value::Object(decode_fields(inner.get("fields"))?),
        other => return Err(malformed(other)),
    };
    Ok(decoded)
}

/// Decodes a Firestore `fields` map. A document without fields is empty.
pub fn decode_fields(fields: Option<&Value>) -> PortResult<DocumentData> {
    let Some(fields) = fields else {
        return Ok(DocumentData::new());
    };
    fields
        .as_object()
        .ok_or_else(|| malformed("fields is not an object"))?
        .iter()
        .map(|(key, value)| Ok((key.clone(), decode_value(value)?)))
        .collect()
}

/// Field names outside `[A-Za-z_][A-Za-z0-9_]*` must be backquoted in masks.
fn field_path(key: &str) -> String {
    let mut chars = key.chars();
    let simple = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if simple {
        key.to_string()
    } else {
        format!("`{}`", key.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

/// Translates a port query into a Firestore `StructuredQuery`.
pub fn structured_query(query: &Query) -> Value {
    let mut structured = json!({ "from": [{ "collectionId": query.collection }] });

    let mut filters: Vec<Value> = query
        .filters
        .iter()
        .map(|filter| {
            json!({
                "fieldFilter": {
                    "field": { "fieldPath": field_path(&filter.field) },
                    "op": "EQUAL",
                    "value": encode_value(&filter.value),
                }
            })
        })
        .collect();
    if filters.len() == 1 {
        structured["where"] = filters.remove(0);
    } else if !filters.is_empty() {
        structured["where"] = json!({ "compositeFilter": { "op": "AND", "filters": filters } });
    }

    if let Some(order) = &query.order_by {
        let direction = match order.direction {
            Direction::Ascending => "ASCENDING",
            Direction::Descending => "DESCENDING",
        };
        structured["orderBy"] = json!([{
            "field": { "fieldPath": field_path(&order.field) },
            "direction": direction,
        }]);
        if let Some(cursor) = &query.start_after {
            structured["startAt"] = json!({ "values": [encode_value(cursor)], "before": false });
        }
    }

    if let Some(limit) = query.limit {
        structured["limit"] = json!(limit);
    }
    structured
}

//=========================================================================================
// REST adapter
//=========================================================================================

#[derive(Deserialize)]
struct DocumentResource {
    name: String,
    #[serde(default)]
    fields: Option<Value>,
}

impl DocumentResource {
    fn id(&self) -> String {
        self.name.rsplit('/').next().unwrap_or_default().to_string()
    }
}

#[derive(Deserialize)]
struct RunQueryItem {
    #[serde(default)]
    document: Option<DocumentResource>,
}

pub struct FirestoreDocumentStore {
    http: reqwest::Client,
    documents_url: String,
    identity: Arc<FirebaseIdentityProvider>,
}

impl FirestoreDocumentStore {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        project_id: &str,
        identity: Arc<FirebaseIdentityProvider>,
    ) -> Self {
        Self {
            http,
            documents_url: format!(
                "{}/projects/{}/databases/(default)/documents",
                base_url.trim_end_matches('/'),
                project_id
            ),
            identity,
        }
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{}/{}", self.documents_url, collection, id)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.identity.id_token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn patch(&self, collection: &str, id: &str, data: &DocumentData, params: Vec<(&str, String)>) -> PortResult<()> {
        let request = self
            .http
            .patch(self.document_url(collection, id))
            .query(&params)
            .json(&json!({ "fields": encode_fields(data) }));
        send(self.authorized(request), Service::Store).await?;
        Ok(())
    }
}

fn mask(data: &DocumentData) -> Vec<(&'static str, String)> {
    data.keys()
        .map(|key| ("updateMask.fieldPaths", field_path(key)))
        .collect()
}

#[async_trait]
impl DocumentStore for FirestoreDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> PortResult<Option<DocumentData>> {
        let request = self.http.get(self.document_url(collection, id));
        match send(self.authorized(request), Service::Store).await {
            Ok(response) => {
                let document: DocumentResource = json(response).await?;
                Ok(Some(decode_fields(document.fields.as_ref())?))
            }
            Err(PortError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn set(&self, collection: &str, id: &str, data: DocumentData, mode: SetMode) -> PortResult<()> {
        let params = match mode {
            SetMode::Replace => Vec::new(),
            SetMode::Merge => mask(&data),
        };
        self.patch(collection, id, &data, params).await
    }

    async fn update(&self, collection: &str, id: &str, partial: DocumentData) -> PortResult<()> {
        let mut params = mask(&partial);
        params.push(("currentDocument.exists", "true".to_string()));
        self.patch(collection, id, &partial, params).await
    }

    async fn add(&self, collection: &str, data: DocumentData) -> PortResult<String> {
        let request = self
            .http
            .post(format!("{}/{}", self.documents_url, collection))
            .json(&json!({ "fields": encode_fields(&data) }));
        let document: DocumentResource =
            json(send(self.authorized(request), Service::Store).await?).await?;
        Ok(document.id())
    }

    async fn query(&self, query: &Query) -> PortResult<Vec<Snapshot>> {
        let request = self
            .http
            .post(format!("{}:runQuery", self.documents_url))
            .json(&json!({ "structuredQuery": structured_query(query) }));
        let items: Vec<RunQueryItem> =
            json(send(self.authorized(request), Service::Store).await?).await?;

        let snapshots = items
            .into_iter()
            .filter_map(|item| item.document)
            .map(|document| {
                Ok(Snapshot {
                    id: document.id(),
                    data: decode_fields(document.fields.as_ref())?,
                })
            })
            .collect::<PortResult<Vec<_>>>()?;
        debug!(collection = %query.collection, count = snapshots.len(), "query served");
        Ok(snapshots)
    }
}
