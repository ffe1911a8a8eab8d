//! DestinationStore - chunked index over destination documents
//!
//! Builds a small on-disk index from a directory of plain-text destination
//! guides and answers top-k lookups against it. The index is built once;
//! re-indexing an existing store is a no-op.
//!
//! # Architecture
//!
//! ```text
//! data/index/
//! ├── index.jsonl      # chunk metadata, one ChunkMeta per line
//! └── chunks/
//!     ├── 0001.txt
//!     ├── 0002.txt
//!     └── ...
//! ```
//!
//! # Example
//!
//! ```ignore
//! use destinationstore::{DestinationStore, IndexOptions};
//!
//! let store = DestinationStore::open("data/index")?;
//! store.index_directory("data/destinations", IndexOptions::default())?;
//! let snippets = store.retrieve("lisbon trams and viewpoints", 3)?;
//! ```

pub mod cli;
pub mod config;
mod splitter;
mod store;

pub use splitter::TextSplitter;
pub use store::{ChunkMeta, DestinationStore, IndexOptions, IndexOutcome, Snippet, StoreStats};

/// Default chunk size (characters)
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Default overlap between chunks (characters)
pub const DEFAULT_OVERLAP: usize = 50;

/// Default number of snippets returned by a lookup
pub const DEFAULT_TOP_K: usize = 3;
