//! mmdb-core: an embedded MVCC document store.
//!
//! Every write creates an immutable, content-addressed revision. A document
//! may hold several leaf revisions at once (conflicts); the store elects one
//! deterministically as the winner.
//!
//! ```
//! use mmdb_core::{ConflictPolicy, Document, Store};
//!
//! let mut store = Store::open_in_memory()?;
//! let doc = Document::new("Doc1")?;
//! let rev = store.put(&doc, ConflictPolicy::Reject)?;
//! assert_eq!(rev.generation(), 1);
//!
//! let current = store.get("Doc1")?.expect("written above");
//! assert_eq!(current.revision, rev);
//! # Ok::<(), mmdb_core::StoreError>(())
//! ```

pub mod canonical;
pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod hash;
pub mod revision;
pub mod store;
pub mod timing;
pub mod tree;

pub use config::{RetryPolicy, StoreConfig};
pub use document::{Document, DocumentId, Fields};
pub use error::{ErrorCode, StoreError};
pub use revision::{MalformedRevision, Recency, Revision};
pub use store::{CloseError, ConflictPolicy, Store};
