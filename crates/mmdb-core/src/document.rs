//! Documents: a validated id, the revision it was read or written at, and
//! its JSON fields.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::canonical::canonicalize_object;
use crate::error::StoreError;
use crate::revision::Revision;

/// Maximum document id length in bytes.
pub const MAX_ID_LENGTH: usize = 40;

/// Maximum size of a document's canonical JSON fields in bytes (1 MiB).
pub const MAX_FIELDS_LENGTH: usize = 1024 * 1024;

/// A document key: non-empty, at most [`MAX_ID_LENGTH`] bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Validate and wrap an id.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidDocumentId`] for an empty id,
    /// [`StoreError::PayloadTooLarge`] for one longer than 40 bytes.
    pub fn new(id: impl Into<String>) -> Result<Self, StoreError> {
        let id = id.into();
        if id.is_empty() {
            return Err(StoreError::InvalidDocumentId {
                reason: "id must not be empty",
            });
        }
        if id.len() > MAX_ID_LENGTH {
            return Err(StoreError::PayloadTooLarge {
                what: "document id",
                len: id.len(),
                limit: MAX_ID_LENGTH,
            });
        }
        Ok(Self(id))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for DocumentId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for DocumentId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let id = String::deserialize(deserializer)?;
        Self::new(id).map_err(serde::de::Error::custom)
    }
}

/// A document's field tree: always a JSON object at the top level.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fields(Map<String, Value>);

impl Fields {
    /// An empty object.
    #[must_use]
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Set one top-level field, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub const fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Canonical JSON of these fields, without a size check.
    #[must_use]
    pub fn canonical_json(&self) -> String {
        canonicalize_object(&self.0)
    }

    /// Serialize canonically and enforce [`MAX_FIELDS_LENGTH`].
    ///
    /// # Errors
    ///
    /// [`StoreError::PayloadTooLarge`] when the canonical form is over 1 MiB.
    pub fn canonicalize(&self) -> Result<CanonicalFields, StoreError> {
        let json = self.canonical_json();
        if json.len() > MAX_FIELDS_LENGTH {
            return Err(StoreError::PayloadTooLarge {
                what: "document fields",
                len: json.len(),
                limit: MAX_FIELDS_LENGTH,
            });
        }
        Ok(CanonicalFields(json))
    }
}

impl TryFrom<Value> for Fields {
    type Error = StoreError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(StoreError::InvalidFields {
                reason: format!("expected a JSON object, got {}", json_kind(&other)),
            }),
        }
    }
}

impl From<Map<String, Value>> for Fields {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl FromStr for Fields {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: Value = serde_json::from_str(s).map_err(|e| StoreError::InvalidFields {
            reason: e.to_string(),
        })?;
        Self::try_from(value)
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Canonical JSON text of a [`Fields`] value that passed the size check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalFields(String);

impl CanonicalFields {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The unit of input to `put` and output from `get`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    /// Base revision on input, the read revision on output.
    #[serde(rename = "rev", default)]
    pub revision: Revision,
    #[serde(default)]
    pub fields: Fields,
}

impl Document {
    /// A new document with no revision and empty fields.
    ///
    /// # Errors
    ///
    /// Propagates id validation failures from [`DocumentId::new`].
    pub fn new(id: impl Into<String>) -> Result<Self, StoreError> {
        Ok(Self {
            id: DocumentId::new(id)?,
            revision: Revision::NONE,
            fields: Fields::new(),
        })
    }

    /// Build a document from text parts: id, revision text (empty for a new
    /// document), and a JSON object.
    ///
    /// # Errors
    ///
    /// Any of the id, revision, or fields failing to validate.
    pub fn from_parts(id: &str, revision: &str, fields: &str) -> Result<Self, StoreError> {
        Ok(Self {
            id: DocumentId::new(id)?,
            revision: Revision::parse(revision)?,
            fields: fields.parse()?,
        })
    }

    #[must_use]
    pub const fn with_revision(mut self, revision: Revision) -> Self {
        self.revision = revision;
        self
    }

    #[must_use]
    pub fn with_fields(mut self, fields: Fields) -> Self {
        self.fields = fields;
        self
    }

    /// Parse and set the base revision.
    ///
    /// # Errors
    ///
    /// [`StoreError::MalformedRevision`] if `revision` does not parse.
    pub fn set_revision_str(&mut self, revision: &str) -> Result<(), StoreError> {
        self.revision = Revision::parse(revision)?;
        Ok(())
    }

    /// Parse and replace the fields.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidFields`] if `fields` is not a JSON object.
    pub fn set_fields_str(&mut self, fields: &str) -> Result<(), StoreError> {
        self.fields = fields.parse()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn id_limits() {
        assert!(DocumentId::new("a".repeat(MAX_ID_LENGTH)).is_ok());
        assert!(matches!(
            DocumentId::new("a".repeat(MAX_ID_LENGTH + 1)),
            Err(StoreError::PayloadTooLarge { .. })
        ));
        assert!(matches!(
            DocumentId::new(""),
            Err(StoreError::InvalidDocumentId { .. })
        ));
    }

    #[test]
    fn fields_must_be_an_object() {
        assert!("{}".parse::<Fields>().is_ok());
        for bad in ["[]", "1", "\"x\"", "null", "not json"] {
            assert!(
                matches!(bad.parse::<Fields>(), Err(StoreError::InvalidFields { .. })),
                "accepted {bad}"
            );
        }
    }

    #[test]
    fn canonical_json_sorts_keys() {
        let fields: Fields = r#"{"b": 1, "a": [true, null]}"#.parse().expect("parse");
        assert_eq!(fields.canonical_json(), r#"{"a":[true,null],"b":1}"#);
    }

    #[test]
    fn canonicalize_enforces_limit_after_escaping() {
        // Each 'é' is two UTF-8 bytes but six canonical bytes.
        let text = "é".repeat(MAX_FIELDS_LENGTH / 6);
        let fields = Fields::try_from(json!({ "t": text })).expect("object");
        assert!(matches!(
            fields.canonicalize(),
            Err(StoreError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn from_parts_builds_document() {
        let doc = Document::from_parts(
            "SpaghettiWithMeatballs",
            "2-12340000000000000000000000001234",
            r#"{"sauce": "red"}"#,
        )
        .expect("document");
        assert_eq!(doc.id.as_str(), "SpaghettiWithMeatballs");
        assert_eq!(doc.revision.generation(), 2);
        assert_eq!(doc.fields.get("sauce"), Some(&json!("red")));
    }

    #[test]
    fn from_parts_rejects_bad_revision() {
        let err = Document::from_parts("Doc1", "1-aaa", "{}").expect_err("bad revision");
        assert!(matches!(err, StoreError::MalformedRevision(_)));
    }

    #[test]
    fn setters_replace_state() {
        let mut doc = Document::new("Doc1").expect("document");
        doc.set_fields_str(r#"{"a": "a"}"#).expect("fields");
        doc.set_revision_str("1-00000000000000000000000000000001")
            .expect("revision");
        assert_eq!(doc.fields.len(), 1);
        assert_eq!(doc.revision.generation(), 1);
    }

    #[test]
    fn serializes_with_rev_key() {
        let doc = Document::new("Doc1").expect("document");
        let value = serde_json::to_value(&doc).expect("serialize");
        assert_eq!(value, json!({"id": "Doc1", "rev": "", "fields": {}}));
    }
}
