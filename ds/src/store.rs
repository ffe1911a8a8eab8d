//! Core DestinationStore implementation

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::splitter::TextSplitter;

/// Unique identifier for a chunk within the store
pub type ChunkId = String;

const INDEX_FILE: &str = "index.jsonl";
const CHUNKS_DIR: &str = "chunks";

/// Words too common to say anything about a destination
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "are", "was", "you", "your", "can", "not", "but", "all",
    "into", "what", "where", "when", "how", "which", "about", "there", "their", "they", "have", "has", "will",
];

/// Metadata for a single chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMeta {
    /// Unique chunk ID
    pub chunk_id: ChunkId,
    /// Source file path
    pub source: String,
    /// Chunk length in characters
    pub char_len: usize,
    /// Content hash for staleness detection
    pub content_hash: String,
    /// Creation timestamp (unix ms)
    pub created_at: i64,
}

/// Options for building the index
#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Maximum chunk size in characters
    pub chunk_size: usize,
    /// Overlap between adjacent chunks in characters
    pub overlap: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
            overlap: crate::DEFAULT_OVERLAP,
        }
    }
}

/// What `index_directory` did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    /// A fresh index was written
    Indexed { documents: usize, chunks: usize },
    /// An index already existed; nothing was touched
    AlreadyIndexed,
}

/// A retrieved chunk
#[derive(Debug, Clone)]
pub struct Snippet {
    /// Chunk ID
    pub chunk_id: ChunkId,
    /// Source document
    pub source: String,
    /// Relevance score (higher is closer)
    pub score: f64,
    /// Chunk text
    pub text: String,
}

/// Statistics for the store
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    /// Number of chunks
    pub chunk_count: usize,
    /// Total characters stored
    pub total_chars: usize,
    /// Number of source documents
    pub source_count: usize,
}

/// The destination document store
pub struct DestinationStore {
    /// Base path for storage
    base_path: PathBuf,
}

impl DestinationStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let base_path = path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path).context("Failed to create store directory")?;
        debug!(?base_path, "Opened destination store");
        Ok(Self { base_path })
    }

    /// Store root
    pub fn path(&self) -> &Path {
        &self.base_path
    }

    /// Whether an index has been built
    pub fn is_indexed(&self) -> bool {
        self.base_path.join(INDEX_FILE).exists()
    }

    /// Index every `**/*.txt` document under `docs_dir`
    ///
    /// Skipped entirely when an index already exists.
    pub fn index_directory(&self, docs_dir: impl AsRef<Path>, options: IndexOptions) -> Result<IndexOutcome> {
        let docs_dir = docs_dir.as_ref();
        if self.is_indexed() {
            info!(path = %self.base_path.display(), "Index already exists, skipping");
            return Ok(IndexOutcome::AlreadyIndexed);
        }

        let pattern = docs_dir.join("**").join("*.txt");
        let pattern = pattern.to_string_lossy();
        let mut sources: Vec<PathBuf> = glob::glob(&pattern)
            .context(format!("Invalid glob pattern: {}", pattern))?
            .filter_map(|entry| entry.ok())
            .filter(|p| p.is_file())
            .collect();
        sources.sort();

        let chunks_path = self.base_path.join(CHUNKS_DIR);
        fs::create_dir_all(&chunks_path)?;

        // Write to a temp file first so a crashed run never looks indexed
        let tmp_index = self.base_path.join(format!("{}.tmp", INDEX_FILE));
        let mut index_file = fs::File::create(&tmp_index)?;

        let splitter = TextSplitter::new(options.chunk_size, options.overlap);
        let mut chunk_num = 0u32;

        for path in &sources {
            chunk_num = self.index_file(path, &splitter, &chunks_path, &mut index_file, chunk_num)?;
        }

        index_file.flush()?;
        drop(index_file);
        fs::rename(&tmp_index, self.base_path.join(INDEX_FILE))?;

        info!(
            documents = sources.len(),
            chunk_count = chunk_num,
            "Indexing complete"
        );
        Ok(IndexOutcome::Indexed {
            documents: sources.len(),
            chunks: chunk_num as usize,
        })
    }

    fn index_file(
        &self,
        path: &Path,
        splitter: &TextSplitter,
        chunks_path: &Path,
        index_file: &mut fs::File,
        mut chunk_num: u32,
    ) -> Result<u32> {
        let content = fs::read_to_string(path).context(format!("Failed to read file: {}", path.display()))?;
        let source = path.to_string_lossy().to_string();

        for chunk in splitter.split(&content) {
            chunk_num += 1;
            let chunk_id = format!("{:04}", chunk_num);
            fs::write(chunks_path.join(format!("{}.txt", chunk_id)), &chunk)?;

            let meta = ChunkMeta {
                chunk_id,
                source: source.clone(),
                char_len: chunk.chars().count(),
                content_hash: format!("{:x}", content_hash(chunk.as_bytes())),
                created_at: chrono::Utc::now().timestamp_millis(),
            };

            let line = serde_json::to_string(&meta)?;
            writeln!(index_file, "{}", line)?;
        }

        Ok(chunk_num)
    }

    /// Return up to `k` chunks closest to the query
    ///
    /// An unbuilt index yields no snippets rather than an error.
    pub fn retrieve(&self, query: &str, k: usize) -> Result<Vec<Snippet>> {
        if k == 0 || !self.is_indexed() {
            debug!(k, indexed = self.is_indexed(), "retrieve: nothing to search");
            return Ok(Vec::new());
        }

        let query_terms: HashSet<String> = tokenize(query).into_iter().collect();
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored = Vec::new();
        for meta in self.read_index()? {
            let text = self.get_chunk(&meta.chunk_id)?;
            let score = score_chunk(&query_terms, &text);
            if score > 0.0 {
                scored.push(Snippet {
                    chunk_id: meta.chunk_id,
                    source: meta.source,
                    score,
                    text,
                });
            }
        }

        // Stable sort keeps index order among equal scores
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        debug!(query, returned = scored.len(), "retrieve: done");
        Ok(scored)
    }

    /// Get the full content of a chunk
    pub fn get_chunk(&self, chunk_id: &str) -> Result<String> {
        let chunk_path = self.base_path.join(CHUNKS_DIR).join(format!("{}.txt", chunk_id));
        fs::read_to_string(&chunk_path).context(format!("Chunk not found: {}", chunk_id))
    }

    /// Get statistics for the store
    pub fn stats(&self) -> Result<StoreStats> {
        if !self.is_indexed() {
            return Ok(StoreStats::default());
        }

        let mut stats = StoreStats::default();
        let mut sources = HashSet::new();
        for meta in self.read_index()? {
            stats.chunk_count += 1;
            stats.total_chars += meta.char_len;
            sources.insert(meta.source);
        }
        stats.source_count = sources.len();

        Ok(stats)
    }

    /// Delete the index and all chunks
    pub fn clear(&self) -> Result<()> {
        let index_path = self.base_path.join(INDEX_FILE);
        if index_path.exists() {
            fs::remove_file(&index_path)?;
        }
        let chunks_path = self.base_path.join(CHUNKS_DIR);
        if chunks_path.exists() {
            fs::remove_dir_all(&chunks_path)?;
        }
        info!(path = %self.base_path.display(), "Cleared destination index");
        Ok(())
    }

    fn read_index(&self) -> Result<Vec<ChunkMeta>> {
        let file = fs::File::open(self.base_path.join(INDEX_FILE)).context("Failed to open index")?;
        let reader = BufReader::new(file);

        let mut metas = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            metas.push(serde_json::from_str(&line)?);
        }
        Ok(metas)
    }
}

/// Lowercased alphanumeric terms, minus stopwords and very short words
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .map(|w| w.to_lowercase())
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .collect()
}

/// Sum of dampened term frequencies for every query term present
fn score_chunk(query_terms: &HashSet<String>, text: &str) -> f64 {
    let mut counts: HashMap<String, u32> = HashMap::new();
    for term in tokenize(text) {
        if query_terms.contains(&term) {
            *counts.entry(term).or_insert(0) += 1;
        }
    }
    counts.values().map(|&tf| 1.0 + (tf as f64).ln()).sum()
}

/// Simple hash for content (not cryptographic, just for change detection)
fn content_hash(data: &[u8]) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    data.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_docs(dir: &Path) {
        fs::create_dir_all(dir.join("europe")).unwrap();
        fs::write(
            dir.join("europe").join("lisbon.txt"),
            "Lisbon is famous for trams, miradouros and pastel de nata.\n\nTram 28 climbs through Alfama.",
        )
        .unwrap();
        fs::write(
            dir.join("kyoto.txt"),
            "Kyoto has thousands of temples. The Fushimi Inari shrine is best at dawn.",
        )
        .unwrap();
        fs::write(dir.join("notes.md"), "not indexed").unwrap();
    }

    #[test]
    fn test_index_and_retrieve() {
        let temp = TempDir::new().unwrap();
        let docs = temp.path().join("docs");
        write_docs(&docs);

        let store = DestinationStore::open(temp.path().join("index")).unwrap();
        let outcome = store.index_directory(&docs, IndexOptions::default()).unwrap();
        assert_eq!(outcome, IndexOutcome::Indexed { documents: 2, chunks: 2 });

        let snippets = store.retrieve("trams in Lisbon", 3).unwrap();
        assert_eq!(snippets.len(), 1);
        assert!(snippets[0].text.contains("Tram 28"));
        assert!(snippets[0].source.ends_with("lisbon.txt"));
    }

    #[test]
    fn test_index_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let docs = temp.path().join("docs");
        write_docs(&docs);

        let store = DestinationStore::open(temp.path().join("index")).unwrap();
        store.index_directory(&docs, IndexOptions::default()).unwrap();
        let before = store.stats().unwrap();

        fs::write(docs.join("paris.txt"), "Paris has the Louvre.").unwrap();
        let outcome = store.index_directory(&docs, IndexOptions::default()).unwrap();
        assert_eq!(outcome, IndexOutcome::AlreadyIndexed);

        let after = store.stats().unwrap();
        assert_eq!(before.chunk_count, after.chunk_count);
        assert_eq!(after.source_count, 2);
    }

    #[test]
    fn test_retrieve_without_index_is_empty() {
        let temp = TempDir::new().unwrap();
        let store = DestinationStore::open(temp.path()).unwrap();

        assert!(!store.is_indexed());
        assert!(store.retrieve("anything at all", 3).unwrap().is_empty());
    }

    #[test]
    fn test_retrieve_respects_k_and_ranking() {
        let temp = TempDir::new().unwrap();
        let docs = temp.path().join("docs");
        fs::create_dir_all(&docs).unwrap();
        fs::write(docs.join("a.txt"), "beaches").unwrap();
        fs::write(docs.join("b.txt"), "beaches beaches and surfing").unwrap();
        fs::write(docs.join("c.txt"), "museums").unwrap();

        let store = DestinationStore::open(temp.path().join("index")).unwrap();
        store.index_directory(&docs, IndexOptions::default()).unwrap();

        let snippets = store.retrieve("beaches surfing", 1).unwrap();
        assert_eq!(snippets.len(), 1);
        assert!(snippets[0].source.ends_with("b.txt"));
    }

    #[test]
    fn test_clear_removes_index() {
        let temp = TempDir::new().unwrap();
        let docs = temp.path().join("docs");
        write_docs(&docs);

        let store = DestinationStore::open(temp.path().join("index")).unwrap();
        store.index_directory(&docs, IndexOptions::default()).unwrap();
        assert!(store.is_indexed());

        store.clear().unwrap();
        assert!(!store.is_indexed());
        assert_eq!(store.stats().unwrap().chunk_count, 0);
    }

    #[test]
    fn test_tokenize_drops_stopwords() {
        let terms = tokenize("The best food in Porto, and the wine!");
        assert_eq!(terms, vec!["best", "food", "porto", "wine"]);
    }
}
