//! SQLite-backed knowledge store for a single topic.
//!
//! Chunks and their embeddings live in one SQLite file per topic; search is
//! brute-force cosine similarity over the stored vectors.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::chunker::TextChunk;
use super::store::{RetrievedDocument, Retriever};
use crate::core::errors::RagError;
use crate::llm::LlmProvider;
use crate::vector_math;

pub struct SqliteVectorStore {
    pool: SqlitePool,
    db_path: PathBuf,
    embedder: Arc<dyn LlmProvider>,
    k: usize,
}

impl SqliteVectorStore {
    /// Open an existing store, or create an empty one when `create` is set.
    pub async fn open(
        db_path: &Path,
        embedder: Arc<dyn LlmProvider>,
        k: usize,
        create: bool,
    ) -> Result<Self, RagError> {
        if !create && !db_path.exists() {
            return Err(RagError::Retrieval(format!(
                "knowledge store not found: {}",
                db_path.display()
            )));
        }
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RagError::Retrieval(format!("{}: {}", parent.display(), e)))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(create)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| RagError::Retrieval(format!("{}: {}", db_path.display(), e)))?;

        let store = Self {
            pool,
            db_path: db_path.to_path_buf(),
            embedder,
            k: k.max(1),
        };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    async fn init_schema(&self) -> Result<(), RagError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chunks (
                chunk_id INTEGER PRIMARY KEY AUTOINCREMENT,
                content TEXT NOT NULL,
                source TEXT NOT NULL DEFAULT '',
                metadata TEXT DEFAULT '{}',
                embedding BLOB,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS store_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::internal)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    /// Embed and store chunks in one transaction. Returns the number inserted.
    pub async fn ingest(&self, chunks: &[TextChunk]) -> Result<usize, RagError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(RagError::Retrieval(format!(
                "expected {} embeddings, got {}",
                chunks.len(),
                embeddings.len()
            )));
        }

        let items: Vec<(RetrievedDocument, Vec<f32>)> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| {
                let doc = RetrievedDocument::new(
                    chunk.text.clone(),
                    json!({
                        "source": chunk.source,
                        "start_offset": chunk.start_offset,
                        "chunk_index": chunk.chunk_index,
                    }),
                );
                (doc, embedding)
            })
            .collect();

        self.insert_batch(&items).await?;
        self.record_embedder().await?;
        Ok(items.len())
    }

    pub async fn insert_batch(&self, items: &[(RetrievedDocument, Vec<f32>)]) -> Result<(), RagError> {
        if items.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(RagError::internal)?;

        for (doc, embedding) in items {
            let blob = Self::serialize_embedding(embedding);
            let metadata_str = serde_json::to_string(&doc.metadata).unwrap_or_else(|_| "{}".to_string());

            sqlx::query(
                "INSERT INTO chunks (content, source, metadata, embedding) VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(&doc.content)
            .bind(doc.source().unwrap_or_default())
            .bind(&metadata_str)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(RagError::internal)?;
        }

        tx.commit().await.map_err(RagError::internal)?;
        Ok(())
    }

    async fn record_embedder(&self) -> Result<(), RagError> {
        sqlx::query("INSERT OR REPLACE INTO store_meta (key, value) VALUES ('embedder', ?1)")
            .bind(self.embedder.name())
            .execute(&self.pool)
            .await
            .map_err(RagError::internal)?;
        Ok(())
    }

    pub async fn count(&self) -> Result<usize, RagError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(RagError::internal)?;
        Ok(count as usize)
    }

    /// Top-`k` chunks by cosine similarity to an already embedded query.
    pub async fn search(&self, query_embedding: &[f32]) -> Result<Vec<RetrievedDocument>, RagError> {
        let rows = sqlx::query("SELECT content, metadata, embedding FROM chunks ORDER BY chunk_id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RagError::Retrieval(e.to_string()))?;

        let mut docs = Vec::with_capacity(rows.len());
        let mut vectors = Vec::with_capacity(rows.len());
        for row in &rows {
            let embedding_bytes: Vec<u8> = row.get("embedding");
            if embedding_bytes.is_empty() {
                continue;
            }
            let metadata_str: String = row.get("metadata");
            let metadata = serde_json::from_str::<Value>(&metadata_str).unwrap_or(Value::Null);
            docs.push(RetrievedDocument::new(row.get::<String, _>("content"), metadata));
            vectors.push(Self::deserialize_embedding(&embedding_bytes));
        }

        let ranked = vector_math::rank_descending_by_cosine(query_embedding, &vectors);
        Ok(ranked
            .into_iter()
            .take(self.k)
            .filter_map(|(idx, _)| docs.get(idx).cloned())
            .collect())
    }
}

#[async_trait]
impl Retriever for SqliteVectorStore {
    async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedDocument>, RagError> {
        if self.count().await? == 0 {
            return Ok(Vec::new());
        }

        let embeddings = self.embedder.embed(&[query.to_string()]).await?;
        let Some(query_embedding) = embeddings.into_iter().next() else {
            return Ok(Vec::new());
        };

        self.search(&query_embedding).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatRequest, Completion};

    /// Embeds text as letter-frequency vectors over a-e.
    struct LetterEmbedder;

    #[async_trait]
    impl LlmProvider for LetterEmbedder {
        fn name(&self) -> &str {
            "letters"
        }

        fn model(&self) -> &str {
            "letters"
        }

        async fn chat(&self, _request: ChatRequest) -> Result<Completion, RagError> {
            Err(RagError::Generation("not a chat model".to_string()))
        }

        async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
            Ok(inputs
                .iter()
                .map(|text| {
                    ['a', 'b', 'c', 'd', 'e']
                        .iter()
                        .map(|letter| text.chars().filter(|c| c == letter).count() as f32 + 0.01)
                        .collect()
                })
                .collect())
        }
    }

    fn chunk(text: &str, index: usize) -> TextChunk {
        TextChunk {
            text: text.to_string(),
            source: "notes.txt".to_string(),
            start_offset: index * 10,
            chunk_index: index,
        }
    }

    async fn store_at(dir: &Path, k: usize) -> SqliteVectorStore {
        SqliteVectorStore::open(&dir.join("topic.db"), Arc::new(LetterEmbedder), k, true)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn empty_store_returns_no_documents() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_at(tmp.path(), 4).await;

        let docs = store.retrieve("anything").await.unwrap();
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn retrieve_ranks_by_similarity_and_limits_to_k() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_at(tmp.path(), 2).await;

        let inserted = store
            .ingest(&[chunk("aaaa", 0), chunk("bbbb", 1), chunk("aab", 2), chunk("eeee", 3)])
            .await
            .unwrap();
        assert_eq!(inserted, 4);
        assert_eq!(store.count().await.unwrap(), 4);

        let docs = store.retrieve("aaa").await.unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].content, "aaaa");
        assert_eq!(docs[1].content, "aab");
        assert_eq!(docs[0].source(), Some("notes.txt"));
        assert_eq!(docs[0].metadata["chunk_index"], 0);
    }

    #[tokio::test]
    async fn open_without_create_requires_existing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("missing.db");
        let result = SqliteVectorStore::open(&missing, Arc::new(LetterEmbedder), 4, false).await;
        assert!(matches!(result, Err(RagError::Retrieval(_))));

        let created = store_at(tmp.path(), 4).await;
        drop(created);
        let reopened =
            SqliteVectorStore::open(&tmp.path().join("topic.db"), Arc::new(LetterEmbedder), 4, false)
                .await;
        assert!(reopened.is_ok());
    }

    #[tokio::test]
    async fn unusable_parent_directory_is_reported() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        std::fs::write(&blocker, "plain file").unwrap();

        let result =
            SqliteVectorStore::open(&blocker.join("topic.db"), Arc::new(LetterEmbedder), 4, true).await;
        match result {
            Err(RagError::Retrieval(message)) => assert!(message.contains("not-a-dir")),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("store opened under a regular file"),
        }
    }
}
