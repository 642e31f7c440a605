//! LanceDB-backed `VectorStore`. One Lance table per collection name, with
//! a fixed-size-list float column sized to the embedder's dimension and a
//! payload spread across scalar columns so `ensure_payload_indexes` can
//! build real per-field indexes rather than filtering inside a blob.

use arrow::array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, ListArray, StringArray,
};
use arrow::buffer::OffsetBuffer;
use arrow::datatypes::{DataType, Field, Fields, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchIterator};
use async_trait::async_trait;
use dashmap::DashMap;
use lancedb::connection::Connection;
use lancedb::index::Index;
use newsfeed_core::error::{PipelineError, Result};
use newsfeed_core::models::VectorPoint;
use newsfeed_core::traits::VectorStore;
use std::sync::Arc;

fn schema_for_dim(dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim as i32),
            false,
        ),
        Field::new("source", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("summary", DataType::Utf8, true),
        Field::new("link", DataType::Utf8, false),
        Field::new(
            "keywords",
            DataType::List(Arc::new(Field::new("item", DataType::Utf8, true))),
            false,
        ),
        Field::new(
            "images",
            DataType::List(Arc::new(Field::new("item", DataType::Utf8, true))),
            false,
        ),
        Field::new("published_datetime", DataType::Utf8, false),
        Field::new("published_ts", DataType::Int64, false),
        Field::new("status", DataType::Utf8, false),
    ]))
}

fn string_list_array(values: &[Vec<String>]) -> ListArray {
    let flat: Vec<&str> = values.iter().flatten().map(|s| s.as_str()).collect();
    let offsets = OffsetBuffer::from_lengths(values.iter().map(|v| v.len()));
    let field = Arc::new(Field::new("item", DataType::Utf8, true));
    ListArray::new(field, offsets, Arc::new(StringArray::from(flat)), None)
}

fn points_to_batch(schema: Arc<Schema>, dim: usize, points: &[VectorPoint]) -> Result<RecordBatch> {
    let ids: Vec<String> = points.iter().map(|p| p.id.to_string()).collect();
    let flat_vectors: Vec<f32> = points.iter().flat_map(|p| p.vector.iter().copied()).collect();
    let vector_values = Float32Array::from(flat_vectors);
    let vector_field = Arc::new(Field::new("item", DataType::Float32, true));
    let vectors = FixedSizeListArray::new(vector_field, dim as i32, Arc::new(vector_values), None);

    let sources: Vec<&str> = points.iter().map(|p| p.payload.source.as_str()).collect();
    let titles: Vec<&str> = points.iter().map(|p| p.payload.title.as_str()).collect();
    let contents: Vec<&str> = points.iter().map(|p| p.payload.content.as_str()).collect();
    let summaries: Vec<Option<&str>> = points.iter().map(|p| p.payload.summary.as_deref()).collect();
    let links: Vec<&str> = points.iter().map(|p| p.payload.link.as_str()).collect();
    let keywords: Vec<Vec<String>> = points.iter().map(|p| p.payload.keywords.clone()).collect();
    let images: Vec<Vec<String>> = points.iter().map(|p| p.payload.images.clone()).collect();
    let published_datetimes: Vec<&str> = points.iter().map(|p| p.payload.published_datetime.as_str()).collect();
    let published_ts: Vec<i64> = points.iter().map(|p| p.payload.published_timestamp).collect();
    let statuses: Vec<&str> = points.iter().map(|_| "pending").collect();

    RecordBatch::try_new(
        schema,
        vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vectors),
            Arc::new(StringArray::from(sources)),
            Arc::new(StringArray::from(titles)),
            Arc::new(StringArray::from(contents)),
            Arc::new(StringArray::from(summaries)),
            Arc::new(StringArray::from(links)),
            Arc::new(string_list_array(&keywords)),
            Arc::new(string_list_array(&images)),
            Arc::new(StringArray::from(published_datetimes)),
            Arc::new(Int64Array::from(published_ts)),
            Arc::new(StringArray::from(statuses)),
        ],
    )
    .map_err(|e| PipelineError::VectorStore(format!("failed to build record batch: {e}")))
}

pub struct LanceVectorStore {
    connection: Connection,
    /// Dimension each collection was created with, so a later call with a
    /// mismatched dimension is caught instead of silently corrupting the
    /// table.
    dimensions: DashMap<String, usize>,
}

impl LanceVectorStore {
    pub async fn connect(uri: &str) -> Result<Self> {
        let connection = lancedb::connect(uri)
            .execute()
            .await
            .map_err(|e| PipelineError::VectorStore(format!("failed to connect to lancedb at {uri}: {e}")))?;
        Ok(Self { connection, dimensions: DashMap::new() })
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn ensure_collection(&self, name: &str, dim: usize) -> Result<()> {
        let existing = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| PipelineError::VectorStore(format!("failed to list tables: {e}")))?;

        if existing.iter().any(|t| t == name) {
            let table = self
                .connection
                .open_table(name)
                .execute()
                .await
                .map_err(|e| PipelineError::VectorStore(format!("failed to open table {name}: {e}")))?;
            let schema = table
                .schema()
                .await
                .map_err(|e| PipelineError::VectorStore(format!("failed to read schema for {name}: {e}")))?;
            let existing_dim = schema
                .field_with_name("vector")
                .ok()
                .and_then(|f| match f.data_type() {
                    DataType::FixedSizeList(_, n) => Some(*n as usize),
                    _ => None,
                });
            if existing_dim != Some(dim) {
                return Err(PipelineError::VectorStore(format!(
                    "collection {name} already exists with dimension {existing_dim:?}, expected {dim}"
                )));
            }
            self.dimensions.insert(name.to_string(), dim);
            return Ok(());
        }

        let schema = schema_for_dim(dim);
        let empty = RecordBatch::new_empty(schema.clone());
        let batches = RecordBatchIterator::new(vec![Ok(empty)], schema);
        self.connection
            .create_table(name, Box::new(batches))
            .execute()
            .await
            .map_err(|e| PipelineError::VectorStore(format!("failed to create table {name}: {e}")))?;
        self.dimensions.insert(name.to_string(), dim);
        Ok(())
    }

    async fn ensure_payload_indexes(&self, name: &str) -> Result<()> {
        let table = self
            .connection
            .open_table(name)
            .execute()
            .await
            .map_err(|e| PipelineError::VectorStore(format!("failed to open table {name}: {e}")))?;

        for column in ["source", "status"] {
            table
                .create_index(&[column], Index::Auto)
                .execute()
                .await
                .map_err(|e| PipelineError::VectorStore(format!("failed to index {name}.{column}: {e}")))?;
        }
        table
            .create_index(&["published_ts"], Index::Auto)
            .execute()
            .await
            .map_err(|e| PipelineError::VectorStore(format!("failed to index {name}.published_ts: {e}")))?;

        // `keywords` is a List<Utf8> column; lancedb has no scalar index type for
        // list columns, so it is filtered via SQL-like `array_contains` expressions
        // over the raw column instead of a built index.
        Ok(())
    }

    async fn upsert_points(&self, name: &str, points: &[VectorPoint]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let dim = self
            .dimensions
            .get(name)
            .map(|d| *d)
            .unwrap_or_else(|| points[0].vector.len());

        for point in points {
            if point.vector.len() != dim {
                return Err(PipelineError::VectorStore(format!(
                    "point {} has dimension {}, collection {name} expects {dim}",
                    point.id,
                    point.vector.len()
                )));
            }
        }

        let table = self
            .connection
            .open_table(name)
            .execute()
            .await
            .map_err(|e| PipelineError::VectorStore(format!("failed to open table {name}: {e}")))?;

        let schema = table
            .schema()
            .await
            .map_err(|e| PipelineError::VectorStore(format!("failed to read schema for {name}: {e}")))?;
        let batch = points_to_batch(schema.clone(), dim, points)?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        table
            .merge_insert(&["id"])
            .when_matched_update_all(None)
            .when_not_matched_insert_all()
            .execute(Box::new(batches))
            .await
            .map_err(|e| PipelineError::VectorStore(format!("failed to upsert into {name}: {e}")))?;
        Ok(())
    }
}
