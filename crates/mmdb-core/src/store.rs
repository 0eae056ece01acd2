//! The store handle and the put engine.
//!
//! A [`Store`] owns one SQLite connection. `close` consumes the handle, so
//! a closed store cannot be used; a busy close hands it back.
//!
//! Every put runs inside a single `BEGIN IMMEDIATE` transaction: the read
//! of the current winner, the conflict check, the insert, the index update,
//! and the demotion of the prior winner either all land or none do.
//! `IMMEDIATE` takes the write lock up front, so two handles racing on the
//! same document serialize instead of both passing the conflict check.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::config::{RetryPolicy, StoreConfig};
use crate::db;
use crate::document::{Document, DocumentId};
use crate::error::{StoreError, is_busy};
use crate::revision::{Recency, Revision};
use crate::timing::timed;
use crate::tree::{self, RevisionRecord};

/// What `put` does when the base revision is not the current winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Fail with [`StoreError::Conflict`] and change nothing.
    #[default]
    Reject,
    /// Accept the write as a new branch off the stale base.
    AllowFork,
}

/// An open document store.
#[derive(Debug)]
pub struct Store {
    conn: Connection,
    path: Option<PathBuf>,
}

/// Failure to close a [`Store`].
#[derive(Debug, thiserror::Error)]
pub enum CloseError {
    /// The database still has work outstanding. The handle is returned
    /// intact; retry later.
    #[error("store is busy and cannot close yet")]
    Busy(Store),
    #[error(transparent)]
    Failed(StoreError),
}

impl CloseError {
    /// The still-open handle, if the close was refused as busy.
    #[must_use]
    pub fn into_store(self) -> Option<Store> {
        match self {
            Self::Busy(store) => Some(store),
            Self::Failed(_) => None,
        }
    }
}

impl Store {
    /// Open (or create) a store file with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] if SQLite cannot open or migrate the
    /// database.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_config(path, &StoreConfig::default())
    }

    /// Open (or create) a store file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] if SQLite cannot open or migrate the
    /// database, or [`StoreError::Busy`] if another handle holds the lock
    /// past the busy timeout.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open_with_config(path: impl AsRef<Path>, config: &StoreConfig) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = db::open_database(path, config)?;
        debug!("store opened");
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Open a private, non-persistent store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::open_in_memory_with_config(&StoreConfig::default())
    }

    /// Open a private, non-persistent store with explicit settings.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Storage`] if the schema cannot be created.
    pub fn open_in_memory_with_config(config: &StoreConfig) -> Result<Self, StoreError> {
        let conn = db::open_in_memory(config)?;
        debug!("in-memory store opened");
        Ok(Self { conn, path: None })
    }

    /// Backing file, or `None` for an in-memory store.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Close the store.
    ///
    /// # Errors
    ///
    /// [`CloseError::Busy`] returns the handle when SQLite reports it busy;
    /// [`CloseError::Failed`] for anything else.
    pub fn close(self) -> Result<(), CloseError> {
        let path = self.path;
        match self.conn.close() {
            Ok(()) => {
                debug!("store closed");
                Ok(())
            }
            Err((conn, err)) if is_busy(&err) => {
                warn!(error = %err, "store busy on close");
                Err(CloseError::Busy(Self { conn, path }))
            }
            Err((_conn, err)) => Err(CloseError::Failed(err.into())),
        }
    }

    /// Close the store, sleeping `policy.backoff()` between busy attempts.
    ///
    /// # Errors
    ///
    /// The last [`CloseError`] once `policy.attempts` are spent, or the first
    /// non-busy failure.
    pub fn close_with_retry(self, policy: &RetryPolicy) -> Result<(), CloseError> {
        retry_close(self, policy, Self::close)
    }

    /// Write a new revision of `doc` based on `doc.revision`.
    ///
    /// Returns the new revision. Under [`ConflictPolicy::Reject`] the base
    /// must be the current winner (or the document must not exist yet).
    ///
    /// # Errors
    ///
    /// - [`StoreError::Conflict`] if the base is stale and the policy rejects
    /// - [`StoreError::PayloadTooLarge`] for fields over 1 MiB
    /// - [`StoreError::DuplicateRevision`] if the revision already exists
    /// - [`StoreError::Consistency`] if the index points at a missing record
    /// - [`StoreError::Busy`] / [`StoreError::Storage`] from SQLite
    ///
    /// On any error nothing is persisted.
    #[instrument(skip_all, fields(doc_id = %doc.id, base = %doc.revision, ?policy))]
    pub fn put(&mut self, doc: &Document, policy: ConflictPolicy) -> Result<Revision, StoreError> {
        timed("put", || self.put_in_transaction(doc, policy))
    }

    fn put_in_transaction(
        &mut self,
        doc: &Document,
        policy: ConflictPolicy,
    ) -> Result<Revision, StoreError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let current = tree::get_current(&tx, &doc.id)?.map(|(revision, _)| revision);

        let continues_winner = match current {
            None => false,
            Some(current) => match doc.revision.compare(&current) {
                Recency::Equal => true,
                _ if policy == ConflictPolicy::Reject => {
                    warn!(current = %current, "rejected stale write");
                    return Err(StoreError::Conflict {
                        id: doc.id.to_string(),
                        base: doc.revision,
                        current,
                    });
                }
                _ => {
                    debug!(current = %current, "forking from stale base");
                    false
                }
            },
        };

        let canonical = doc.fields.canonicalize()?;
        let revision = doc
            .revision
            .next(&doc.id, canonical.as_str())
            .ok_or_else(|| StoreError::GenerationExhausted {
                id: doc.id.to_string(),
                base: doc.revision,
            })?;
        tree::insert_revision(&tx, &doc.id, &revision, &canonical)?;

        let elected = current.is_none_or(|current| revision >= current);
        if elected {
            tree::set_current(&tx, &doc.id, &revision)?;
            if let Some(prior) = current.filter(|_| continues_winner) {
                tree::demote(&tx, &doc.id, &prior)?;
            }
        }

        tx.commit()?;
        debug!(rev = %revision, elected, "put committed");
        Ok(revision)
    }

    /// The document at its winning revision.
    ///
    /// # Errors
    ///
    /// Id validation failures, [`StoreError::Consistency`] if the index is
    /// dangling, storage failures.
    #[instrument(skip(self))]
    pub fn get(&self, id: &str) -> Result<Option<Document>, StoreError> {
        let id = DocumentId::new(id)?;
        let found = timed("get", || tree::get_current(&self.conn, &id))?;
        debug!(found = found.is_some(), "get");
        Ok(found.map(|(revision, fields)| Document {
            id,
            revision,
            fields,
        }))
    }

    /// The document at an exact revision, winning or not.
    ///
    /// # Errors
    ///
    /// [`StoreError::MalformedRevision`] if `revision` does not parse, id
    /// validation failures, storage failures.
    #[instrument(skip(self))]
    pub fn get_at(&self, id: &str, revision: &str) -> Result<Option<Document>, StoreError> {
        let id = DocumentId::new(id)?;
        let revision = Revision::parse(revision)?;
        let fields = timed("get_at", || tree::get_at(&self.conn, &id, &revision))?;
        Ok(fields.map(|fields| Document {
            id,
            revision,
            fields,
        }))
    }

    /// Leaf revisions of `id`, newest first. More than one means the
    /// document has unresolved conflicts.
    ///
    /// # Errors
    ///
    /// Id validation failures, storage failures.
    #[instrument(skip(self))]
    pub fn list_conflicts(&self, id: &str) -> Result<Vec<Revision>, StoreError> {
        let id = DocumentId::new(id)?;
        let mut leaves = timed("list_conflicts", || tree::list_leaves(&self.conn, &id))?;
        leaves.sort_unstable_by(|a, b| b.cmp(a));
        Ok(leaves)
    }

    /// Every revision record of `id`, newest first, with leaf flags.
    ///
    /// # Errors
    ///
    /// Id validation failures, storage failures.
    #[instrument(skip(self))]
    pub fn history(&self, id: &str) -> Result<Vec<RevisionRecord>, StoreError> {
        let id = DocumentId::new(id)?;
        timed("history", || tree::list_revisions(&self.conn, &id))
    }
}

fn retry_close(
    store: Store,
    policy: &RetryPolicy,
    mut close: impl FnMut(Store) -> Result<(), CloseError>,
) -> Result<(), CloseError> {
    let mut store = store;
    let mut attempt = 1;
    loop {
        match close(store) {
            Err(CloseError::Busy(again)) if attempt < policy.attempts => {
                attempt += 1;
                std::thread::sleep(policy.backoff());
                store = again;
            }
            other => return other,
        }
    }
}
