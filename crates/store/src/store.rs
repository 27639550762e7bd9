use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use bytemuck::{cast_slice, pod_collect_to_vec};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use manual_rag_core::{
    cosine_similarity, sort_hits, ChunkMetadata, IndexRecord, MetadataField, MetadataFilter,
    RagError, SearchHit, VectorIndex,
};

/// SQLite-backed chunk index. Each collection is an independent chunk set.
#[derive(Debug, Clone)]
pub struct SqliteIndex {
    path: PathBuf,
    collection: String,
}

impl SqliteIndex {
    pub fn open<P: AsRef<Path>>(path: P, collection: &str) -> Result<Self> {
        let index = Self {
            path: path.as_ref().to_path_buf(),
            collection: collection.to_string(),
        };
        index.init()?;
        index.ensure_collection(&index.connection()?)?;
        Ok(index)
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn connection(&self) -> Result<Connection> {
        Ok(Connection::open(&self.path)?)
    }

    pub fn init(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS collections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE IF NOT EXISTS chunks (
                collection_id INTEGER NOT NULL,
                chunk_id TEXT NOT NULL,
                text TEXT NOT NULL,
                source TEXT NOT NULL,
                chapter TEXT NOT NULL,
                page INTEGER NOT NULL,
                embedding BLOB NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (collection_id, chunk_id),
                FOREIGN KEY(collection_id) REFERENCES collections(id)
            );
            CREATE INDEX IF NOT EXISTS idx_chunks_chapter ON chunks(collection_id, chapter);
            "#,
        )?;
        Ok(())
    }

    fn ensure_collection(&self, conn: &Connection) -> Result<i64> {
        let mut stmt = conn.prepare("SELECT id FROM collections WHERE name = ?1")?;
        if let Some(id) = stmt
            .query_row([&self.collection], |row| row.get(0))
            .optional()?
        {
            return Ok(id);
        }
        conn.execute(
            "INSERT INTO collections (name) VALUES (?1)",
            params![self.collection],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn upsert_records(&self, records: &[IndexRecord]) -> Result<()> {
        let mut conn = self.connection()?;
        let collection_id = self.ensure_collection(&conn)?;
        let tx = conn.transaction()?;
        for record in records {
            let embedding_blob = cast_slice::<f32, u8>(&record.embedding);
            tx.execute(
                "INSERT OR REPLACE INTO chunks (collection_id, chunk_id, text, source, chapter, page, embedding) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    collection_id,
                    record.id,
                    record.text,
                    record.metadata.source,
                    record.metadata.chapter,
                    record.metadata.page,
                    embedding_blob,
                ],
            )?;
        }
        tx.commit()?;
        debug!(collection = %self.collection, records = records.len(), "upserted chunks");
        Ok(())
    }

    fn search_records(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchHit>> {
        let conn = self.connection()?;
        let collection_id = self.ensure_collection(&conn)?;
        let mut sql = String::from(
            "SELECT chunk_id, text, source, chapter, page, embedding FROM chunks WHERE collection_id = ?1",
        );
        if let Some(filter) = filter {
            sql.push_str(&format!(" AND {} = ?2", column(filter.field)));
        }
        sql.push_str(" ORDER BY rowid");
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = match filter {
            Some(filter) => stmt.query(params![collection_id, filter.value])?,
            None => stmt.query(params![collection_id])?,
        };
        let mut hits = Vec::new();
        while let Some(row) = rows.next()? {
            let embedding_blob: Vec<u8> = row.get(5)?;
            let embedding = decode_embedding(&embedding_blob)?;
            hits.push(SearchHit {
                id: row.get(0)?,
                text: row.get(1)?,
                metadata: ChunkMetadata {
                    source: row.get(2)?,
                    chapter: row.get(3)?,
                    page: row.get(4)?,
                },
                score: cosine_similarity(query, &embedding),
            });
        }
        sort_hits(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }

    fn distinct_column(&self, field: MetadataField) -> Result<BTreeSet<String>> {
        let conn = self.connection()?;
        let collection_id = self.ensure_collection(&conn)?;
        let sql = format!(
            "SELECT DISTINCT CAST({} AS TEXT) FROM chunks WHERE collection_id = ?1",
            column(field)
        );
        let mut stmt = conn.prepare(&sql)?;
        let values = stmt
            .query_map([collection_id], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<BTreeSet<String>>>()?;
        Ok(values)
    }

    fn count_records(&self) -> Result<usize> {
        let conn = self.connection()?;
        let collection_id = self.ensure_collection(&conn)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM chunks WHERE collection_id = ?1",
            [collection_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn clear(&self) -> Result<()> {
        let conn = self.connection()?;
        let collection_id = self.ensure_collection(&conn)?;
        let removed = conn.execute("DELETE FROM chunks WHERE collection_id = ?1", [collection_id])?;
        debug!(collection = %self.collection, removed, "deleted chunks");
        Ok(())
    }

    fn drop_and_create(&self) -> Result<()> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM chunks WHERE collection_id IN (SELECT id FROM collections WHERE name = ?1)",
            [&self.collection],
        )?;
        tx.execute("DELETE FROM collections WHERE name = ?1", [&self.collection])?;
        tx.commit()?;
        let id = self.ensure_collection(&conn)?;
        info!(collection = %self.collection, id, "recreated collection");
        Ok(())
    }
}

impl VectorIndex for SqliteIndex {
    fn upsert(&mut self, records: &[IndexRecord]) -> manual_rag_core::Result<()> {
        self.upsert_records(records).map_err(RagError::index)
    }

    fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> manual_rag_core::Result<Vec<SearchHit>> {
        self.search_records(query, k, filter).map_err(RagError::index)
    }

    fn distinct_values(&self, field: MetadataField) -> manual_rag_core::Result<BTreeSet<String>> {
        self.distinct_column(field).map_err(RagError::index)
    }

    fn count(&self) -> manual_rag_core::Result<usize> {
        self.count_records().map_err(RagError::index)
    }

    fn delete_all(&mut self) -> manual_rag_core::Result<()> {
        self.clear().map_err(RagError::index)
    }

    fn recreate(&mut self) -> manual_rag_core::Result<()> {
        self.drop_and_create().map_err(RagError::index)
    }
}

fn column(field: MetadataField) -> &'static str {
    match field {
        MetadataField::Source => "source",
        MetadataField::Chapter => "chapter",
        MetadataField::Page => "page",
    }
}

fn decode_embedding(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % std::mem::size_of::<f32>() != 0 {
        return Err(anyhow!("invalid embedding"));
    }
    Ok(pod_collect_to_vec::<u8, f32>(blob))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(id: &str, chapter: &str, page: u32, embedding: Vec<f32>) -> IndexRecord {
        IndexRecord {
            id: id.to_string(),
            text: format!("{chapter} body {id}"),
            metadata: ChunkMetadata {
                source: "manual.pdf".to_string(),
                chapter: chapter.to_string(),
                page,
            },
            embedding,
        }
    }

    fn seeded(path: &Path) -> SqliteIndex {
        let mut index = SqliteIndex::open(path, "manual_chunks").unwrap();
        index
            .upsert(&[
                record("chunk_0", "Setup", 14, vec![1.0, 0.0, 0.0]),
                record("chunk_1", "Guide Mode", 20, vec![0.0, 1.0, 0.0]),
                record("chunk_2", "Guide Mode", 21, vec![0.0, 0.8, 0.6]),
            ])
            .unwrap();
        index
    }

    #[test]
    fn search_orders_by_similarity() {
        let dir = tempdir().unwrap();
        let index = seeded(&dir.path().join("rag.sqlite"));
        let hits = index.search(&[0.0, 1.0, 0.0], 2, None).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "chunk_1");
        assert_eq!(hits[1].id, "chunk_2");
        assert_eq!(hits[0].metadata.page, 20);
    }

    #[test]
    fn chapter_filter_limits_results() {
        let dir = tempdir().unwrap();
        let index = seeded(&dir.path().join("rag.sqlite"));
        let filter = MetadataFilter::chapter("Setup");
        let hits = index.search(&[0.0, 1.0, 0.0], 5, Some(&filter)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata.chapter, "Setup");
    }

    #[test]
    fn page_filter_compares_numerically() {
        let dir = tempdir().unwrap();
        let index = seeded(&dir.path().join("rag.sqlite"));
        let filter = MetadataFilter {
            field: MetadataField::Page,
            value: "21".to_string(),
        };
        let hits = index.search(&[0.0, 1.0, 0.0], 5, Some(&filter)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "chunk_2");
    }

    #[test]
    fn distinct_values_reflect_latest_writes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rag.sqlite");
        let mut index = seeded(&path);
        let chapters = index.distinct_values(MetadataField::Chapter).unwrap();
        assert_eq!(chapters.len(), 2);
        index
            .upsert(&[record("chunk_0", "Playback Menu", 30, vec![1.0, 0.0, 0.0])])
            .unwrap();
        let chapters: Vec<String> = index
            .distinct_values(MetadataField::Chapter)
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(chapters, vec!["Guide Mode", "Playback Menu"]);
        assert_eq!(index.count().unwrap(), 3);
        let pages = index.distinct_values(MetadataField::Page).unwrap();
        assert!(pages.contains("30"));
    }

    #[test]
    fn recreate_and_delete_all_empty_the_collection() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rag.sqlite");
        let mut index = seeded(&path);
        index.recreate().unwrap();
        assert_eq!(index.count().unwrap(), 0);
        let mut index = seeded(&path);
        index.delete_all().unwrap();
        assert!(index.search(&[1.0, 0.0, 0.0], 3, None).unwrap().is_empty());
    }

    #[test]
    fn collections_are_isolated_and_persistent() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rag.sqlite");
        seeded(&path);
        let other = SqliteIndex::open(&path, "other_manual").unwrap();
        assert_eq!(other.count().unwrap(), 0);
        let reopened = SqliteIndex::open(&path, "manual_chunks").unwrap();
        assert_eq!(reopened.count().unwrap(), 3);
    }

    #[test]
    fn odd_sized_blob_is_rejected() {
        assert!(decode_embedding(&[0u8; 5]).is_err());
        assert_eq!(
            decode_embedding(cast_slice(&[1.5f32, -2.0])).unwrap(),
            vec![1.5, -2.0]
        );
    }
}
