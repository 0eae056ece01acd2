//! Revision tree records and the document index.
//!
//! Free functions over a `&Connection` so they compose inside a
//! transaction (`Transaction` derefs to `Connection`). None of them open
//! their own transaction.

use rusqlite::Connection;
use serde::Serialize;

use crate::db::query::{self, Param};
use crate::document::{CanonicalFields, DocumentId, Fields};
use crate::error::{StoreError, is_constraint_violation};
use crate::params;
use crate::revision::Revision;

/// One row of a document's revision history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RevisionRecord {
    #[serde(rename = "rev")]
    pub revision: Revision,
    pub leaf: bool,
    pub deleted: bool,
}

fn parse_stored(id: &DocumentId, text: &str) -> Result<Revision, StoreError> {
    Revision::parse(text).map_err(|e| {
        tracing::error!(doc_id = %id, rev = text, "stored revision does not parse");
        StoreError::consistency(id.as_str(), format!("stored revision is malformed: {e}"))
    })
}

fn parse_stored_fields(id: &DocumentId, revision: &Revision, text: &str) -> Result<Fields, StoreError> {
    text.parse().map_err(|e| {
        tracing::error!(doc_id = %id, rev = %revision, "stored fields do not parse");
        StoreError::consistency(id.as_str(), format!("fields of revision '{revision}' are corrupt: {e}"))
    })
}

/// The winning revision recorded in the document index, if the id exists.
///
/// # Errors
///
/// Storage failures, or [`StoreError::Consistency`] if the index holds
/// unparsable revision text.
pub fn current_revision(conn: &Connection, id: &DocumentId) -> Result<Option<Revision>, StoreError> {
    let text = query::fetch_one(
        conn,
        "SELECT rev FROM docs WHERE id = ?1",
        &params![id.as_str()],
        |row| row.get::<_, String>(0),
    )?;
    text.map(|t| parse_stored(id, &t)).transpose()
}

/// Resolve the index pointer and fetch the winning record.
///
/// # Errors
///
/// [`StoreError::Consistency`] if the index points at a revision with no
/// record; storage failures otherwise.
pub fn get_current(
    conn: &Connection,
    id: &DocumentId,
) -> Result<Option<(Revision, Fields)>, StoreError> {
    let Some(revision) = current_revision(conn, id)? else {
        return Ok(None);
    };
    match get_at(conn, id, &revision)? {
        Some(fields) => Ok(Some((revision, fields))),
        None => {
            tracing::error!(doc_id = %id, rev = %revision, "document index points at a missing revision");
            Err(StoreError::consistency(
                id.as_str(),
                format!("index points at missing revision '{revision}'"),
            ))
        }
    }
}

/// Fields of one exact revision, whether or not it is the winner.
///
/// # Errors
///
/// Storage failures, or [`StoreError::Consistency`] if the stored fields
/// are corrupt.
pub fn get_at(
    conn: &Connection,
    id: &DocumentId,
    revision: &Revision,
) -> Result<Option<Fields>, StoreError> {
    if revision.is_none() {
        return Ok(None);
    }
    let text = query::fetch_one(
        conn,
        "SELECT doc FROM revs WHERE id = ?1 AND rev = ?2",
        &params![id.as_str(), revision.to_string()],
        |row| row.get::<_, String>(0),
    )?;
    text.map(|t| parse_stored_fields(id, revision, &t)).transpose()
}

/// Leaf, non-deleted revisions of `id`, in storage order.
///
/// # Errors
///
/// Storage failures, or [`StoreError::Consistency`] for unparsable rows.
pub fn list_leaves(conn: &Connection, id: &DocumentId) -> Result<Vec<Revision>, StoreError> {
    let rows = query::fetch_many(
        conn,
        "SELECT rev FROM revs WHERE id = ?1 AND leaf = 1 AND deleted = 0",
        &params![id.as_str()],
        |row| row.get::<_, String>(0),
    )?;
    rows.iter().map(|t| parse_stored(id, t)).collect()
}

/// Every revision record of `id`, newest first.
///
/// # Errors
///
/// Storage failures, or [`StoreError::Consistency`] for unparsable rows.
pub fn list_revisions(conn: &Connection, id: &DocumentId) -> Result<Vec<RevisionRecord>, StoreError> {
    let rows = query::fetch_many(
        conn,
        "SELECT rev, leaf, deleted FROM revs WHERE id = ?1",
        &params![id.as_str()],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, bool>(1)?,
                row.get::<_, bool>(2)?,
            ))
        },
    )?;
    let mut records = rows
        .into_iter()
        .map(|(text, leaf, deleted)| {
            Ok(RevisionRecord {
                revision: parse_stored(id, &text)?,
                leaf,
                deleted,
            })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;
    records.sort_by(|a, b| b.revision.cmp(&a.revision));
    Ok(records)
}

/// Append a new leaf record.
///
/// # Errors
///
/// [`StoreError::DuplicateRevision`] if `(id, revision)` already exists.
pub fn insert_revision(
    conn: &Connection,
    id: &DocumentId,
    revision: &Revision,
    fields: &CanonicalFields,
) -> Result<(), StoreError> {
    let result = query::execute(
        conn,
        "INSERT INTO revs (id, rev, doc) VALUES (?1, ?2, ?3)",
        &params![id.as_str(), revision.to_string(), fields.as_str()],
    );
    match result {
        Ok(_) => Ok(()),
        Err(e) if is_constraint_violation(&e) => Err(StoreError::DuplicateRevision {
            id: id.to_string(),
            revision: *revision,
        }),
        Err(e) => Err(e.into()),
    }
}

/// Clear the leaf flag on an existing record.
///
/// # Errors
///
/// [`StoreError::NotFound`] if there is no such record.
pub fn demote(conn: &Connection, id: &DocumentId, revision: &Revision) -> Result<(), StoreError> {
    let changed = query::execute(
        conn,
        "UPDATE revs SET leaf = 0 WHERE id = ?1 AND rev = ?2",
        &[Param::from(id.as_str()), Param::from(revision.to_string())],
    )?;
    if changed == 0 {
        return Err(StoreError::not_found(id.as_str(), revision));
    }
    Ok(())
}

/// Point the document index at `revision`, creating the row if needed.
///
/// # Errors
///
/// Storage failures.
pub fn set_current(conn: &Connection, id: &DocumentId, revision: &Revision) -> Result<(), StoreError> {
    query::execute(
        conn,
        "INSERT INTO docs (id, rev) VALUES (?1, ?2)
         ON CONFLICT(id) DO UPDATE SET rev = excluded.rev",
        &params![id.as_str(), revision.to_string()],
    )?;
    Ok(())
}
