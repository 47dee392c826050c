//! SQLite-backed corpus.
//!
//! Search mode depends on the embedding configuration:
//!
//! - **Embeddings enabled**: the query is embedded and compared by cosine
//!   similarity against every stored vector of the requested corpora.
//! - **Embeddings disabled**: FTS5 keyword search; query terms are OR-ed
//!   together and `-bm25` is used as the score so higher is better.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, QueryEmbedder};
use crate::models::{ChunkRecord, CodeChunk};
use crate::traits::{ChunkLoader, SemanticSearch};

use super::{query_terms, CorpusExport};

/// Counts from an [`import`](SqliteCorpus::import).
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub documents: usize,
    pub chunks: usize,
    pub vectors: usize,
}

pub struct SqliteCorpus {
    pool: SqlitePool,
    embedder: Option<Arc<QueryEmbedder>>,
}

impl SqliteCorpus {
    pub fn new(pool: SqlitePool, embedder: Option<Arc<QueryEmbedder>>) -> Self {
        Self { pool, embedder }
    }

    /// Open the configured database and create the embedder, if enabled.
    pub async fn connect(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        let embedder = QueryEmbedder::from_config(&config.embedding)?.map(Arc::new);
        Ok(Self::new(pool, embedder))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Replace the chunks of every document in `export`.
    pub async fn import(&self, export: &CorpusExport) -> Result<ImportStats> {
        let mut tx = self.pool.begin().await?;
        let mut stats = ImportStats::default();

        let mut doc_ids: Vec<&str> = export.documents.iter().map(|d| d.id.as_str()).collect();
        for c in &export.chunks {
            if !doc_ids.contains(&c.document_id.as_str()) {
                doc_ids.push(&c.document_id);
            }
        }

        for doc_id in doc_ids.iter().copied() {
            let doc = export.documents.iter().find(|d| d.id == doc_id);
            sqlx::query(
                "INSERT INTO documents (id, title, source, updated_at) VALUES (?, ?, ?, strftime('%s','now')) \
                 ON CONFLICT(id) DO UPDATE SET title = excluded.title, source = excluded.source, \
                 updated_at = excluded.updated_at",
            )
            .bind(doc_id)
            .bind(doc.and_then(|d| d.title.clone()))
            .bind(doc.map(|d| d.source.clone()).unwrap_or_default())
            .execute(&mut *tx)
            .await?;

            for table in ["chunks_fts", "chunk_vectors", "chunks"] {
                sqlx::query(&format!("DELETE FROM {} WHERE document_id = ?", table))
                    .bind(doc_id)
                    .execute(&mut *tx)
                    .await?;
            }
            stats.documents += 1;
        }

        for c in &export.chunks {
            sqlx::query(
                "INSERT INTO chunks (id, document_id, chunk_index, text) VALUES (?, ?, ?, ?)",
            )
            .bind(&c.id)
            .bind(&c.document_id)
            .bind(c.chunk_index)
            .bind(&c.text)
            .execute(&mut *tx)
            .await?;
            sqlx::query("INSERT INTO chunks_fts (chunk_id, document_id, text) VALUES (?, ?, ?)")
                .bind(&c.id)
                .bind(&c.document_id)
                .bind(&c.text)
                .execute(&mut *tx)
                .await?;
            if let Some(vector) = &c.embedding {
                sqlx::query(
                    "INSERT INTO chunk_vectors (chunk_id, document_id, embedding, model, dims) \
                     VALUES (?, ?, ?, ?, ?)",
                )
                .bind(&c.id)
                .bind(&c.document_id)
                .bind(vec_to_blob(vector))
                .bind(export.embedding_model.clone().unwrap_or_default())
                .bind(vector.len() as i64)
                .execute(&mut *tx)
                .await?;
                stats.vectors += 1;
            }
            stats.chunks += 1;
        }

        tx.commit().await?;
        Ok(stats)
    }

    async fn vector_search(
        &self,
        embedder: &QueryEmbedder,
        corpus_ids: &[String],
        query: &str,
        top_k: usize,
    ) -> Result<Vec<CodeChunk>> {
        let query_vec = embedder.embed(query).await?;
        self.rank_vectors(&query_vec, embedder.model_name(), corpus_ids, top_k).await
    }

    /// Score stored vectors of `corpus_ids` against `query_vec`.
    ///
    /// Fails if any stored vector has a different length or came from a
    /// different model, since cosine scores would be meaningless.
    async fn rank_vectors(
        &self,
        query_vec: &[f32],
        model: &str,
        corpus_ids: &[String],
        top_k: usize,
    ) -> Result<Vec<CodeChunk>> {
        let sql = format!(
            "SELECT cv.chunk_id, cv.document_id, cv.embedding, cv.model, cv.dims, c.text \
             FROM chunk_vectors cv JOIN chunks c ON c.id = cv.chunk_id \
             WHERE cv.document_id IN ({})",
            placeholders(corpus_ids.len())
        );
        let mut q = sqlx::query(&sql);
        for id in corpus_ids {
            q = q.bind(id);
        }
        let rows = q.fetch_all(&self.pool).await?;

        let mut candidates = Vec::with_capacity(rows.len());
        for row in &rows {
            let chunk_id: String = row.get("chunk_id");
            let dims: i64 = row.get("dims");
            let stored_model: String = row.get("model");
            if dims as usize != query_vec.len() {
                bail!(
                    "chunk {} has a {}-dim vector but the query has {} dims",
                    chunk_id,
                    dims,
                    query_vec.len()
                );
            }
            if !stored_model.is_empty() && stored_model != model {
                bail!(
                    "chunk {} was embedded with '{}' but queries use '{}'",
                    chunk_id,
                    stored_model,
                    model
                );
            }
            let blob: Vec<u8> = row.get("embedding");
            candidates.push(CodeChunk {
                chunk_id,
                doc_id: row.get("document_id"),
                content: row.get("text"),
                score: cosine_similarity(query_vec, &blob_to_vec(&blob)) as f64,
                matched_query: None,
            });
        }

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(top_k);
        Ok(candidates)
    }

    async fn keyword_search(
        &self,
        corpus_ids: &[String],
        query: &str,
        top_k: usize,
    ) -> Result<Vec<CodeChunk>> {
        let Some(match_expr) = fts_match_expr(query) else {
            return Ok(Vec::new());
        };

        let sql = format!(
            "SELECT chunks_fts.chunk_id AS chunk_id, chunks_fts.document_id AS document_id, \
                    bm25(chunks_fts) AS bm25_score, c.text AS text \
             FROM chunks_fts JOIN chunks c ON c.id = chunks_fts.chunk_id \
             WHERE chunks_fts MATCH ? AND chunks_fts.document_id IN ({}) \
             ORDER BY bm25_score LIMIT ?",
            placeholders(corpus_ids.len())
        );
        let mut q = sqlx::query(&sql).bind(match_expr);
        for id in corpus_ids {
            q = q.bind(id);
        }
        let rows = q.bind(top_k as i64).fetch_all(&self.pool).await?;

        Ok(rows
            .iter()
            .map(|row| {
                let rank: f64 = row.get("bm25_score");
                CodeChunk {
                    chunk_id: row.get("chunk_id"),
                    doc_id: row.get("document_id"),
                    content: row.get("text"),
                    score: -rank, // negate so higher = better
                    matched_query: None,
                }
            })
            .collect())
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Quote each term so FTS5 never sees operators from user text.
fn fts_match_expr(query: &str) -> Option<String> {
    let terms = query_terms(query);
    if terms.is_empty() {
        return None;
    }
    Some(
        terms
            .iter()
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(" OR "),
    )
}

#[async_trait]
impl ChunkLoader for SqliteCorpus {
    async fn load_chunks(&self, corpus_id: &str) -> Result<Vec<ChunkRecord>> {
        let rows = sqlx::query(
            "SELECT id, document_id, text FROM chunks WHERE document_id = ? ORDER BY chunk_index",
        )
        .bind(corpus_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ChunkRecord {
                chunk_id: row.get("id"),
                doc_id: row.get("document_id"),
                content: row.get("text"),
            })
            .collect())
    }
}

#[async_trait]
impl SemanticSearch for SqliteCorpus {
    async fn search(
        &self,
        corpus_ids: &[String],
        query: &str,
        top_k: usize,
    ) -> Result<Vec<CodeChunk>> {
        if corpus_ids.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        match &self.embedder {
            Some(embedder) => self.vector_search(embedder, corpus_ids, query, top_k).await,
            None => self.keyword_search(corpus_ids, query, top_k).await,
        }
    }
}
