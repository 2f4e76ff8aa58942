//! Vector retrieval backends.
//!
//! Two interchangeable stores behind [`VectorIndex`]: a sqlite-vec backed
//! store (default) and an in-memory brute-force scan. Both are rebuilt per
//! run; nothing persists between pipeline invocations.
use std::sync::Once;

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::{debug, warn};

/// A chunk paired with its embedding, ready for indexing.
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub text: String,
    pub embedding: Vec<f32>,
}

/// Cosine similarity between two vectors. Returns 0.0 for zero-norm or
/// mismatched inputs.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// A rebuildable store of embedded chunks, queried by vector similarity.
pub trait VectorIndex {
    /// Replace the index contents with the given chunks.
    fn build(&mut self, chunks: Vec<IndexedChunk>) -> Result<()>;

    /// Return the texts of the `top_k` most similar chunks, best first.
    fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<String>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Build the backend named by `kind` (`"sqlite"` or `"memory"`), falling
/// back to the in-memory scan if sqlite-vec cannot be initialized.
pub fn make_index(kind: &str) -> Box<dyn VectorIndex> {
    match kind {
        "memory" => Box::new(InMemoryIndex::new()),
        "sqlite" => match SqliteVecIndex::new() {
            Ok(idx) => Box::new(idx),
            Err(e) => {
                warn!("sqlite-vec unavailable ({e}), falling back to in-memory index");
                Box::new(InMemoryIndex::new())
            }
        },
        other => {
            warn!("unknown vector store '{other}', using in-memory index");
            Box::new(InMemoryIndex::new())
        }
    }
}

// ── In-memory backend ────────────────────────────────────────────────

/// Brute-force cosine scan over all chunks. Fine at per-run scale.
pub struct InMemoryIndex {
    chunks: Vec<IndexedChunk>,
}

impl InMemoryIndex {
    #[must_use]
    pub fn new() -> Self {
        Self { chunks: Vec::new() }
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorIndex for InMemoryIndex {
    fn build(&mut self, chunks: Vec<IndexedChunk>) -> Result<()> {
        self.chunks = chunks;
        Ok(())
    }

    fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<String>> {
        let mut scored: Vec<(usize, f32)> = self
            .chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (i, cosine_similarity(embedding, &c.embedding)))
            .collect();
        // Stable sort keeps insertion order for tied scores
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(i, _)| self.chunks[i].text.clone())
            .collect())
    }

    fn len(&self) -> usize {
        self.chunks.len()
    }
}

// ── sqlite-vec backend ───────────────────────────────────────────────

static SQLITE_VEC_INIT: Once = Once::new();

fn init_sqlite_vec() {
    SQLITE_VEC_INIT.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite_vec::sqlite3_vec_init as *const (),
        )));
    });
}

fn serialize_vector(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// In-memory SQLite database with the `vec0` virtual table extension.
pub struct SqliteVecIndex {
    conn: Connection,
    count: usize,
}

impl SqliteVecIndex {
    pub fn new() -> Result<Self> {
        init_sqlite_vec();
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;

        // Probe that the extension actually loaded
        conn.query_row("SELECT vec_version()", [], |row| row.get::<_, String>(0))
            .context("sqlite-vec extension not available")?;

        Ok(Self { conn, count: 0 })
    }
}

impl VectorIndex for SqliteVecIndex {
    fn build(&mut self, chunks: Vec<IndexedChunk>) -> Result<()> {
        self.conn
            .execute_batch("DROP TABLE IF EXISTS vec_chunks; DROP TABLE IF EXISTS chunks;")
            .context("failed to reset index tables")?;

        if chunks.is_empty() {
            self.count = 0;
            return Ok(());
        }

        let dim = chunks[0].embedding.len();
        self.conn
            .execute_batch(&format!(
                "CREATE VIRTUAL TABLE vec_chunks USING vec0(embedding FLOAT[{dim}]);
                 CREATE TABLE chunks (id INTEGER PRIMARY KEY, content TEXT NOT NULL);"
            ))
            .context("failed to create index tables")?;

        let tx = self.conn.transaction().context("failed to begin insert")?;
        for (i, chunk) in chunks.iter().enumerate() {
            anyhow::ensure!(
                chunk.embedding.len() == dim,
                "embedding dimension mismatch: expected {dim}, got {}",
                chunk.embedding.len()
            );
            let id = i as i64 + 1;
            tx.execute(
                "INSERT INTO vec_chunks (rowid, embedding) VALUES (?1, ?2)",
                rusqlite::params![id, serialize_vector(&chunk.embedding)],
            )?;
            tx.execute(
                "INSERT INTO chunks (id, content) VALUES (?1, ?2)",
                rusqlite::params![id, chunk.text],
            )?;
        }
        tx.commit().context("failed to commit index build")?;

        self.count = chunks.len();
        debug!("indexed {} chunks (dim {dim})", self.count);
        Ok(())
    }

    fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<String>> {
        if self.count == 0 {
            return Ok(Vec::new());
        }

        let mut stmt = self
            .conn
            .prepare(
                "SELECT c.content
                 FROM vec_chunks v
                 JOIN chunks c ON v.rowid = c.id
                 ORDER BY vec_distance_cosine(v.embedding, ?1) ASC, c.id ASC
                 LIMIT ?2",
            )
            .context("failed to prepare similarity query")?;

        let rows = stmt
            .query_map(
                rusqlite::params![serialize_vector(embedding), top_k as i64],
                |row| row.get::<_, String>(0),
            )
            .context("similarity query failed")?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    fn len(&self) -> usize {
        self.count
    }
}
