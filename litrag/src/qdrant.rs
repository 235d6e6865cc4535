//! Qdrant vector store backend.
//!
//! Provides [`QdrantVectorStore`] which implements [`VectorStore`] using
//! the [qdrant-client](https://docs.rs/qdrant-client) crate over gRPC.
//!
//! Passages are stored as points whose payload carries the provenance
//! fields by name (`document_id`, `text`, `title`, `authors`,
//! `source_url`, `embedding_model`) plus a nested `metadata` object.
//! Exact filters are pushed down as Qdrant `match` conditions.
//!
//! # Example
//!
//! ```rust,ignore
//! use litrag::qdrant::QdrantVectorStore;
//!
//! let store = QdrantVectorStore::new("http://localhost:6334")?;
//! store.create_collection("article_chunks", 384).await?;
//! store.upsert("article_chunks", &records).await?;
//! let passages = store.search("article_chunks", &query_embedding, 9, None).await?;
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::point_id::PointIdOptions;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, Distance, Filter, PointId, PointStruct, ScoredPoint,
    SearchPointsBuilder, UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, RetrievalError};
use crate::passage::{ExactFilter, IndexRecord, Passage};
use crate::vectorstore::VectorStore;

/// Default gRPC endpoint of a local Qdrant.
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";

/// Payload key holding the caller's passage id, which may not be a valid point id.
const PASSAGE_ID_KEY: &str = "passage_id";

/// A [`VectorStore`] backed by [Qdrant](https://qdrant.tech/).
///
/// Wraps a [`qdrant_client::Qdrant`] client and maps collections to Qdrant
/// collections with cosine distance.
pub struct QdrantVectorStore {
    client: Qdrant,
}

impl QdrantVectorStore {
    /// Create a new Qdrant vector store connecting to the given URL.
    pub fn new(url: &str) -> Result<Self> {
        let client = Qdrant::from_url(url).build().map_err(Self::map_err)?;
        Ok(Self { client })
    }

    /// Create a new Qdrant vector store with the default local URL.
    pub fn default_url() -> Result<Self> {
        Self::new(DEFAULT_QDRANT_URL)
    }

    /// Create a new Qdrant vector store from an existing client.
    pub fn from_client(client: Qdrant) -> Self {
        Self { client }
    }

    fn map_err(e: qdrant_client::QdrantError) -> RetrievalError {
        RetrievalError::VectorStore { backend: "qdrant".to_string(), message: e.to_string() }
    }
}

/// Qdrant only accepts unsigned integers and UUIDs as point ids; any other
/// passage id is mapped to a stable name-based UUID.
fn point_id(passage_id: &str) -> PointId {
    if let Ok(num) = passage_id.parse::<u64>() {
        return num.into();
    }
    match Uuid::parse_str(passage_id) {
        Ok(uuid) => uuid.to_string().into(),
        Err(_) => Uuid::new_v5(&Uuid::NAMESPACE_OID, passage_id.as_bytes()).to_string().into(),
    }
}

fn payload_for(passage: &Passage) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert(PASSAGE_ID_KEY.into(), json!(passage.id));
    payload.insert("document_id".into(), json!(passage.document_id));
    payload.insert("text".into(), json!(passage.text));
    let optional = [
        ("title", &passage.title),
        ("authors", &passage.authors),
        ("source_url", &passage.source_url),
        ("embedding_model", &passage.embedding_model),
    ];
    for (key, value) in optional {
        if let Some(value) = value {
            payload.insert(key.into(), json!(value));
        }
    }
    if !passage.metadata.is_empty() {
        payload.insert("metadata".into(), json!(passage.metadata));
    }
    payload
}

/// Read a payload value as text. Lists of strings (e.g. author lists written
/// by other tools) are joined with `", "`; numbers are formatted.
fn payload_text(value: &QdrantValue) -> Option<String> {
    match &value.kind {
        Some(Kind::StringValue(s)) => Some(s.clone()),
        Some(Kind::IntegerValue(n)) => Some(n.to_string()),
        Some(Kind::DoubleValue(n)) => Some(n.to_string()),
        Some(Kind::ListValue(list)) => {
            let items: Vec<String> = list.values.iter().filter_map(payload_text).collect();
            Some(items.join(", "))
        }
        _ => None,
    }
}

/// Convert a scored point into a [`Passage`], or `None` when required
/// payload fields are missing.
fn passage_from_point(point: ScoredPoint) -> Option<Passage> {
    let get = |key: &str| point.payload.get(key).and_then(payload_text);

    let id = get(PASSAGE_ID_KEY).or_else(|| {
        point.id.as_ref().and_then(|pid| match &pid.point_id_options {
            Some(PointIdOptions::Uuid(s)) => Some(s.clone()),
            Some(PointIdOptions::Num(n)) => Some(n.to_string()),
            None => None,
        })
    })?;
    let (Some(document_id), Some(text)) = (get("document_id"), get("text")) else {
        warn!(point.id = %id, "skipping qdrant point without document_id or text payload");
        return None;
    };

    let metadata: HashMap<String, String> = point
        .payload
        .get("metadata")
        .and_then(|v| match &v.kind {
            Some(Kind::StructValue(s)) => Some(
                s.fields
                    .iter()
                    .filter_map(|(k, v)| payload_text(v).map(|s| (k.clone(), s)))
                    .collect(),
            ),
            _ => None,
        })
        .unwrap_or_default();

    Some(Passage {
        title: get("title"),
        authors: get("authors"),
        source_url: get("source_url"),
        embedding_model: get("embedding_model"),
        metadata,
        ..Passage::new(id, document_id, text).with_score(point.score)
    })
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()> {
        let collections = self.client.list_collections().await.map_err(Self::map_err)?;
        let exists = collections.collections.iter().any(|c| c.name == name);
        if exists {
            debug!(collection = name, "qdrant collection already exists, skipping creation");
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(name)
                    .vectors_config(VectorParamsBuilder::new(dimensions as u64, Distance::Cosine)),
            )
            .await
            .map_err(Self::map_err)?;

        debug!(collection = name, dimensions, "created qdrant collection");
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.client.delete_collection(name).await.map_err(Self::map_err)?;
        debug!(collection = name, "deleted qdrant collection");
        Ok(())
    }

    async fn upsert(&self, collection: &str, records: &[IndexRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let points = records
            .iter()
            .map(|record| {
                let payload = Payload::try_from(Value::Object(payload_for(&record.passage)))
                    .map_err(Self::map_err)?;
                Ok(PointStruct::new(
                    point_id(&record.passage.id),
                    record.embedding.clone(),
                    payload,
                ))
            })
            .collect::<Result<Vec<PointStruct>>>()?;

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .map_err(Self::map_err)?;

        debug!(collection, count = records.len(), "upserted passages to qdrant");
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        limit: usize,
        filter: Option<&ExactFilter>,
    ) -> Result<Vec<Passage>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut request = SearchPointsBuilder::new(collection, embedding.to_vec(), limit as u64)
            .with_payload(true);
        if let Some(filter) = filter {
            let condition = Condition::matches(filter.field.clone(), filter.value.clone());
            request = request.filter(Filter::all([condition]));
        }

        let response = self.client.search_points(request).await.map_err(Self::map_err)?;
        let passages: Vec<Passage> =
            response.result.into_iter().filter_map(passage_from_point).collect();

        debug!(
            collection,
            limit,
            filtered = filter.is_some(),
            hits = passages.len(),
            "qdrant search"
        );
        Ok(passages)
    }
}
