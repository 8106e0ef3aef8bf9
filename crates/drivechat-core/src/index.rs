//! Retrievable keyword index over an ingested document collection.
//!
//! An [`Index`] holds the chunked text of every document plus the term
//! statistics needed for BM25 ranking. Document names are indexed alongside
//! chunk text so a question that names a file ("what does a.txt say")
//! retrieves that file's passages.
//!
//! # Persistence
//!
//! [`Index::to_json`] writes only the documents and chunk texts; term
//! statistics are recomputed by [`Index::from_json`]. A reloaded index
//! therefore ranks every query exactly as the index it was saved from.
//!
//! # Scoring
//!
//! ```text
//! idf(t)      = ln(1 + (N - df + 0.5) / (df + 0.5))
//! score(c, q) = Σ idf(t) · tf·(k1 + 1) / (tf + k1·(1 - b + b·len/avglen))
//! ```
//!
//! with `k1 = 1.2`, `b = 0.75`. Ties are broken by chunk position.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chunk::chunk_text;
use crate::models::{ContentKind, DocumentCollection};

/// Version written into every serialized index.
pub const INDEX_FORMAT_VERSION: u32 = 1;

const BM25_K1: f64 = 1.2;
const BM25_B: f64 = 0.75;
const SNIPPET_CHARS: usize = 240;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("malformed index data: {0}")]
    Format(#[from] serde_json::Error),

    #[error("unsupported index format version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
}

/// A source document as recorded in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedDocument {
    pub file_id: String,
    pub name: String,
    pub kind: ContentKind,
}

/// One retrievable passage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub id: String,
    /// Position of the owning document in [`Index::documents`].
    pub document: usize,
    pub chunk_index: i64,
    pub text: String,
}

/// A ranked passage returned by [`Index::search`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub chunk_id: String,
    pub file_id: String,
    pub document_name: String,
    pub text: String,
    pub snippet: String,
    pub score: f64,
}

#[derive(Serialize, Deserialize)]
struct IndexFile {
    version: u32,
    built_at: i64,
    documents: Vec<IndexedDocument>,
    chunks: Vec<IndexedChunk>,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct TermStats {
    /// Term frequencies per chunk, parallel to `chunks`.
    chunk_terms: Vec<HashMap<String, u32>>,
    chunk_lens: Vec<u32>,
    doc_freq: HashMap<String, u32>,
    avg_len: f64,
}

/// The retrievable structure built from a [`DocumentCollection`].
#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    built_at: i64,
    documents: Vec<IndexedDocument>,
    chunks: Vec<IndexedChunk>,
    stats: TermStats,
}

impl Index {
    /// Chunk and index every document. Empty documents are recorded but
    /// contribute no passages; an empty collection yields an empty index.
    pub fn build(docs: &DocumentCollection, max_tokens: usize) -> Self {
        let mut documents = Vec::with_capacity(docs.len());
        let mut chunks = Vec::new();

        for (pos, doc) in docs.iter().enumerate() {
            documents.push(IndexedDocument {
                file_id: doc.origin.file_id.clone(),
                name: doc.origin.name.clone(),
                kind: doc.origin.kind,
            });
            for c in chunk_text(&doc.origin.file_id, &doc.text, max_tokens) {
                chunks.push(IndexedChunk {
                    id: c.id,
                    document: pos,
                    chunk_index: c.chunk_index,
                    text: c.text,
                });
            }
        }

        Self::assemble(chrono::Utc::now().timestamp(), documents, chunks)
    }

    fn assemble(built_at: i64, documents: Vec<IndexedDocument>, chunks: Vec<IndexedChunk>) -> Self {
        let stats = compute_stats(&documents, &chunks);
        Self {
            built_at,
            documents,
            chunks,
            stats,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, IndexError> {
        let file = IndexFile {
            version: INDEX_FORMAT_VERSION,
            built_at: self.built_at,
            documents: self.documents.clone(),
            chunks: self.chunks.clone(),
        };
        Ok(serde_json::to_vec(&file)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, IndexError> {
        let file: IndexFile = serde_json::from_slice(bytes)?;
        if file.version != INDEX_FORMAT_VERSION {
            return Err(IndexError::UnsupportedVersion {
                found: file.version,
                expected: INDEX_FORMAT_VERSION,
            });
        }
        let max_doc = file.documents.len();
        if let Some(bad) = file.chunks.iter().find(|c| c.document >= max_doc) {
            return Err(IndexError::Format(serde::de::Error::custom(format!(
                "chunk {} references missing document {}",
                bad.id, bad.document
            ))));
        }
        Ok(Self::assemble(file.built_at, file.documents, file.chunks))
    }

    pub fn documents(&self) -> &[IndexedDocument] {
        &self.documents
    }

    pub fn chunks(&self) -> &[IndexedChunk] {
        &self.chunks
    }

    /// True when nothing in the index can be retrieved.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Rank passages against `query`, best first. Chunks that share no term
    /// with the query are never returned.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<SearchHit> {
        let mut seen = HashSet::new();
        let terms: Vec<String> = tokenize(query)
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .collect();
        if terms.is_empty() || self.chunks.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let n = self.chunks.len() as f64;
        let idf: Vec<(&str, f64)> = terms
            .iter()
            .filter_map(|t| {
                let df = *self.stats.doc_freq.get(t)? as f64;
                Some((t.as_str(), (1.0 + (n - df + 0.5) / (df + 0.5)).ln()))
            })
            .collect();
        if idf.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f64)> = self
            .stats
            .chunk_terms
            .iter()
            .enumerate()
            .filter_map(|(i, tf_map)| {
                let len = self.stats.chunk_lens[i] as f64;
                let norm = BM25_K1 * (1.0 - BM25_B + BM25_B * len / self.stats.avg_len.max(1.0));
                let score: f64 = idf
                    .iter()
                    .filter_map(|(t, w)| {
                        let tf = *tf_map.get(*t)? as f64;
                        Some(w * tf * (BM25_K1 + 1.0) / (tf + norm))
                    })
                    .sum();
                (score > 0.0).then_some((i, score))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(top_k);

        scored
            .into_iter()
            .map(|(i, score)| {
                let chunk = &self.chunks[i];
                let doc = &self.documents[chunk.document];
                SearchHit {
                    chunk_id: chunk.id.clone(),
                    file_id: doc.file_id.clone(),
                    document_name: doc.name.clone(),
                    text: chunk.text.clone(),
                    snippet: chunk.text.chars().take(SNIPPET_CHARS).collect(),
                    score,
                }
            })
            .collect()
    }
}

fn compute_stats(documents: &[IndexedDocument], chunks: &[IndexedChunk]) -> TermStats {
    let mut stats = TermStats::default();
    let mut total_len = 0u64;

    for chunk in chunks {
        let mut tf: HashMap<String, u32> = HashMap::new();
        let name_terms = documents
            .get(chunk.document)
            .map(|d| tokenize(&d.name))
            .unwrap_or_default();
        let mut len = 0u32;
        for term in tokenize(&chunk.text).into_iter().chain(name_terms) {
            *tf.entry(term).or_insert(0) += 1;
            len += 1;
        }
        for term in tf.keys() {
            *stats.doc_freq.entry(term.clone()).or_insert(0) += 1;
        }
        total_len += u64::from(len);
        stats.chunk_lens.push(len);
        stats.chunk_terms.push(tf);
    }

    stats.avg_len = if chunks.is_empty() {
        0.0
    } else {
        total_len as f64 / chunks.len() as f64
    };
    stats
}

/// Lowercased alphanumeric runs.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Group hits by source file id, preserving rank order. Files that share a
/// name in different folders stay separate.
pub fn hits_by_document(hits: &[SearchHit]) -> BTreeMap<String, Vec<&SearchHit>> {
    let mut grouped: BTreeMap<String, Vec<&SearchHit>> = BTreeMap::new();
    for hit in hits {
        grouped.entry(hit.file_id.clone()).or_default().push(hit);
    }
    grouped
}
