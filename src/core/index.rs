//! Paginated enumeration of materialized point ids in the derived index.
//!
//! The reconciliation core never writes to Qdrant; points are created and
//! deleted only by the outbox consumer. A transport error on any page aborts
//! the whole enumeration: a partial id set must never be read as "no drift",
//! or the undercount would manufacture false repairs.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::core::config::QdrantConfig;
use crate::core::error::DriftgateError;

/// Bounded scroll page size.
const SCROLL_PAGE_LIMIT: u32 = 1000;
/// Per-request timeout; a hung index must fail the run, never stall it.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Every point id enumerated from the index, split by shape. `decisions`
/// holds ids that parse as decision uuids; `foreign` holds everything else
/// verbatim. Foreign ids cannot correspond to any decision, so they surface
/// as extra points in the drift report rather than aborting the run.
#[derive(Debug, Clone, Default)]
pub struct PointIds {
    pub decisions: BTreeSet<Uuid>,
    pub foreign: Vec<String>,
}

/// Seam over the derived index. Production wires in [`QdrantIndex`], tests
/// wire in fakes.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// All point ids in the collection, optionally restricted to one org.
    async fn collect_point_ids(&self, org: Option<Uuid>) -> Result<PointIds, DriftgateError>;
}

/// Typed shape of a scroll response. Required fields are required: a
/// response missing `result` or `points` is a decode error, not an empty
/// page.
#[derive(Debug, Deserialize)]
struct ScrollResponse {
    result: ScrollResult,
}

#[derive(Debug, Deserialize)]
struct ScrollResult {
    points: Vec<ScrollPoint>,
    #[serde(default)]
    next_page_offset: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ScrollPoint {
    id: PointId,
}

/// Qdrant point ids are either strings or unsigned integers on the wire.
/// This collection is keyed by decision uuids; anything else is a foreign
/// id.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PointId {
    Text(String),
    Num(u64),
}

/// REST scroll client for one Qdrant collection.
pub struct QdrantIndex {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    api_key: Option<String>,
}

impl QdrantIndex {
    pub fn new(cfg: &QdrantConfig) -> Result<Self, DriftgateError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(QdrantIndex {
            client,
            base_url: cfg.base_url.clone(),
            collection: cfg.collection.clone(),
            api_key: cfg.api_key.clone(),
        })
    }

    async fn scroll_page(
        &self,
        org: Option<Uuid>,
        offset: Option<&serde_json::Value>,
    ) -> Result<ScrollResult, DriftgateError> {
        let mut body = json!({
            "limit": SCROLL_PAGE_LIMIT,
            "with_payload": false,
            "with_vector": false,
        });
        if let Some(offset) = offset {
            body["offset"] = offset.clone();
        }
        if let Some(org) = org {
            body["filter"] = json!({
                "must": [{ "key": "org_id", "match": { "value": org.to_string() } }]
            });
        }

        let url = format!(
            "{}/collections/{}/points/scroll",
            self.base_url, self.collection
        );
        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DriftgateError::QdrantStatus {
                status: status.as_u16(),
                body,
            });
        }
        let page: ScrollResponse = response
            .json()
            .await
            .map_err(|e| DriftgateError::Decode(e.to_string()))?;
        Ok(page.result)
    }
}

#[async_trait]
impl SearchIndex for QdrantIndex {
    async fn collect_point_ids(&self, org: Option<Uuid>) -> Result<PointIds, DriftgateError> {
        let mut ids = PointIds::default();
        let mut offset: Option<serde_json::Value> = None;
        let mut pages = 0u32;

        loop {
            let result = self.scroll_page(org, offset.as_ref()).await?;
            pages += 1;

            for point in result.points {
                match point.id {
                    PointId::Text(raw) => match raw.parse::<Uuid>() {
                        Ok(id) => {
                            ids.decisions.insert(id);
                        }
                        Err(_) => ids.foreign.push(raw),
                    },
                    PointId::Num(n) => ids.foreign.push(n.to_string()),
                }
            }

            offset = match result.next_page_offset {
                None | Some(serde_json::Value::Null) => None,
                Some(serde_json::Value::String(s)) if s.is_empty() => None,
                Some(other) => Some(other),
            };
            if offset.is_none() {
                break;
            }
        }

        if !ids.foreign.is_empty() {
            tracing::warn!(
                count = ids.foreign.len(),
                "collection holds point ids that are not decision uuids"
            );
        }
        tracing::debug!(count = ids.decisions.len(), pages, "enumerated qdrant point ids");
        Ok(ids)
    }
}
