//! Content-addressed revision digests.
//!
//! A revision's digest is MD5 over the exact byte sequence
//!
//! ```text
//! {document_id},{parent_revision_text},{canonical_fields_json}
//! ```
//!
//! where the parent text is empty for a document's first revision. Inputs
//! are never normalized here; callers pass the canonical JSON produced by
//! [`crate::canonical`], so semantically identical field sets collide on
//! purpose.

use crate::document::{DocumentId, Fields};
use crate::error::StoreError;
use crate::revision::DIGEST_LEN;

/// Compute the raw digest for already-validated inputs.
#[must_use]
pub fn digest(document_id: &str, parent_revision: &str, canonical_fields: &str) -> [u8; DIGEST_LEN] {
    let mut ctx = md5::Context::new();
    ctx.consume(document_id.as_bytes());
    ctx.consume(b",");
    ctx.consume(parent_revision.as_bytes());
    ctx.consume(b",");
    ctx.consume(canonical_fields.as_bytes());
    ctx.compute().0
}

/// Validate the inputs and compute the digest for `fields`.
///
/// # Errors
///
/// Returns [`StoreError::PayloadTooLarge`] if `document_id` exceeds
/// [`crate::document::MAX_ID_LENGTH`] bytes or the canonical fields exceed
/// [`crate::document::MAX_FIELDS_LENGTH`] bytes, and
/// [`StoreError::InvalidDocumentId`] for an empty id.
pub fn digest_fields(
    document_id: &str,
    parent_revision: &str,
    fields: &Fields,
) -> Result<[u8; DIGEST_LEN], StoreError> {
    let id = DocumentId::new(document_id)?;
    let canonical = fields.canonicalize()?;
    Ok(digest(id.as_str(), parent_revision, canonical.as_str()))
}
