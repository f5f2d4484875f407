/// Thin LanceDB wrapper for one on-disk database directory.
///
/// Callers own the table schema. Similarity search needs a `FixedSizeList<Float32>`
/// vector column; filters are DataFusion SQL over the remaining columns.
use std::path::Path;
use std::sync::Arc;

use arrow_array::{RecordBatch, RecordBatchIterator};
use arrow_schema::Schema;
use lancedb::query::{ExecutableQuery, QueryBase};
use tracing::info;

use crate::error::CommonError;

pub struct VectorDb {
    db: lancedb::Connection,
}

impl VectorDb {
    /// Open (or create) the database stored in `dir`.
    pub async fn connect(dir: &Path) -> Result<Self, CommonError> {
        let uri = dir.to_string_lossy();
        let db = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| CommonError::VectorDb(format!("cannot open {uri}: {e}")))?;
        Ok(Self { db })
    }

    /// Write `batches` as the whole content of `table_name`, dropping any previous table
    /// first so rebuilds never accumulate rows.
    pub async fn create_or_replace_table(
        &self,
        table_name: &str,
        schema: Arc<Schema>,
        batches: Vec<RecordBatch>,
    ) -> Result<(), CommonError> {
        if self.table_exists(table_name).await? {
            self.db
                .drop_table(table_name)
                .await
                .map_err(|e| CommonError::VectorDb(format!("drop table failed: {e}")))?;
        }

        let batch_iter = RecordBatchIterator::new(batches.into_iter().map(Ok), schema);
        self.db
            .create_table(table_name, Box::new(batch_iter))
            .execute()
            .await
            .map_err(|e| CommonError::VectorDb(format!("create table failed: {e}")))?;

        info!(table = table_name, "vector table written");
        Ok(())
    }

    /// Whether a table with this name exists in the database.
    pub async fn table_exists(&self, table_name: &str) -> Result<bool, CommonError> {
        let names = self
            .db
            .table_names()
            .execute()
            .await
            .map_err(|e| CommonError::VectorDb(format!("listing tables failed: {e}")))?;
        Ok(names.iter().any(|n| n == table_name))
    }

    /// Number of rows in the table, optionally restricted by a SQL filter.
    pub async fn count_rows(
        &self,
        table_name: &str,
        filter: Option<String>,
    ) -> Result<usize, CommonError> {
        let table = self.open(table_name).await?;
        table
            .count_rows(filter)
            .await
            .map_err(|e| CommonError::VectorDb(format!("count rows failed: {e}")))
    }

    /// Search for the nearest vectors to the given query embedding among rows matching
    /// `filter` (DataFusion SQL syntax, e.g. `source_type = 'cv'`).
    ///
    /// Returns up to `limit` results as RecordBatches ordered by ascending `_distance`.
    pub async fn search_filtered(
        &self,
        table_name: &str,
        query_embedding: &[f32],
        filter: &str,
        limit: usize,
    ) -> Result<Vec<RecordBatch>, CommonError> {
        let table = self.open(table_name).await?;

        let results = table
            .vector_search(query_embedding)
            .map_err(|e| CommonError::VectorDb(format!("vector search setup failed: {e}")))?
            .only_if(filter)
            .limit(limit)
            .execute()
            .await
            .map_err(|e| CommonError::VectorDb(format!("vector search failed: {e}")))?;

        futures::TryStreamExt::try_collect(results)
            .await
            .map_err(|e| CommonError::VectorDb(format!("collecting search results failed: {e}")))
    }

    async fn open(&self, table_name: &str) -> Result<lancedb::Table, CommonError> {
        self.db
            .open_table(table_name)
            .execute()
            .await
            .map_err(|e| CommonError::VectorDb(format!("open table failed: {e}")))
    }
}

/// Quote a value for use inside a DataFusion SQL string literal.
pub fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow_array::{Array, ArrayRef, FixedSizeListArray, Float32Array, StringArray};
    use arrow_schema::{DataType, Field};

    fn batch(tags: &[&str], vectors: &[[f32; 2]]) -> RecordBatch {
        let item = Arc::new(Field::new("item", DataType::Float32, true));
        let schema = Arc::new(Schema::new(vec![
            Field::new("tag", DataType::Utf8, false),
            Field::new("embedding", DataType::FixedSizeList(item.clone(), 2), false),
        ]));
        let flat: Vec<f32> = vectors.iter().flat_map(|v| v.iter().copied()).collect();
        let tag_array: ArrayRef = Arc::new(StringArray::from(tags.to_vec()));
        let emb_array: ArrayRef = Arc::new(
            FixedSizeListArray::try_new(item, 2, Arc::new(Float32Array::from(flat)), None)
                .unwrap(),
        );
        RecordBatch::try_new(schema, vec![tag_array, emb_array]).unwrap()
    }

    #[test]
    fn test_sql_literal_escapes_quotes() {
        assert_eq!(sql_literal("cv"), "'cv'");
        assert_eq!(sql_literal("o'brien"), "'o''brien'");
    }

    #[tokio::test]
    async fn test_replace_table_does_not_duplicate_rows() {
        let dir = tempfile::tempdir().unwrap();
        let db = VectorDb::connect(dir.path()).await.unwrap();
        assert!(!db.table_exists("t").await.unwrap());

        for _ in 0..2 {
            let b = batch(&["a", "b", "a"], &[[1.0, 0.0], [0.0, 1.0], [0.9, 0.1]]);
            let schema = b.schema();
            db.create_or_replace_table("t", schema, vec![b]).await.unwrap();
        }

        assert!(db.table_exists("t").await.unwrap());
        assert_eq!(db.count_rows("t", None).await.unwrap(), 3);
        assert_eq!(
            db.count_rows("t", Some(format!("tag = {}", sql_literal("a"))))
                .await
                .unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn test_search_filtered_respects_filter() {
        let dir = tempfile::tempdir().unwrap();
        let db = VectorDb::connect(dir.path()).await.unwrap();
        let b = batch(&["a", "b", "a"], &[[1.0, 0.0], [0.0, 1.0], [0.9, 0.1]]);
        let schema = b.schema();
        db.create_or_replace_table("t", schema, vec![b]).await.unwrap();

        let batches = db
            .search_filtered("t", &[0.0, 1.0], "tag = 'a'", 5)
            .await
            .unwrap();
        let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
        assert_eq!(rows, 2);
        for b in &batches {
            let tags = b
                .column_by_name("tag")
                .unwrap()
                .as_any()
                .downcast_ref::<StringArray>()
                .unwrap();
            for i in 0..tags.len() {
                assert_eq!(tags.value(i), "a");
            }
        }
    }
}
