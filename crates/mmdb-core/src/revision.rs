//! Revision identifiers.
//!
//! A revision names one node in a document's revision tree: a generation
//! counter (1-based depth along its branch) plus a 128-bit content digest.
//!
//! # Text form
//!
//! ```text
//! {generation}-{32 lowercase hex chars}
//! ```
//!
//! The "no revision" sentinel ([`Revision::NONE`]) formats to the empty
//! string and is what an empty input parses to.
//!
//! Parsing collapses leading zeros in the generation (`01-…` parses to
//! generation 1) and accepts uppercase hex, while formatting always emits
//! the zero-stripped, lowercase form. `format(parse(s)) == s` therefore only
//! holds for input that is already canonical.
//!
//! # Ordering
//!
//! [`Ord`] sorts by recency: a revision is *newer* (greater) when its
//! generation is larger, and at equal generations the revision with the
//! byte-wise **smaller** digest is newer. This single order decides both
//! "is this write based on the current winner" and "which sibling wins".

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::document::DocumentId;
use crate::hash;

/// Number of bytes in a revision digest.
pub const DIGEST_LEN: usize = 16;

/// Upper bound on the text length of a formatted revision
/// (`4294967295-` plus 32 hex chars).
pub const MAX_REVISION_TEXT_LEN: usize = 10 + 1 + DIGEST_LEN * 2;

/// Error returned when revision text cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed revision '{input}': {reason}")]
pub struct MalformedRevision {
    /// The rejected input.
    pub input: String,
    /// Why it was rejected.
    pub reason: &'static str,
}

impl MalformedRevision {
    fn new(input: &str, reason: &'static str) -> Self {
        Self {
            input: input.to_string(),
            reason,
        }
    }
}

/// Result of comparing two revisions with [`Revision::compare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Recency {
    /// The left-hand revision is newer.
    Newer,
    /// The left-hand revision is older.
    Older,
    /// Both sides name the same revision.
    Equal,
}

/// A position in a document's revision tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Revision {
    generation: u32,
    digest: [u8; DIGEST_LEN],
}

impl Revision {
    /// The "no revision" sentinel used for documents that do not exist yet.
    pub const NONE: Self = Self {
        generation: 0,
        digest: [0; DIGEST_LEN],
    };

    /// Build a revision from its parts.
    ///
    /// A zero generation always yields [`Revision::NONE`], whatever the digest.
    #[must_use]
    pub const fn new(generation: u32, digest: [u8; DIGEST_LEN]) -> Self {
        if generation == 0 {
            Self::NONE
        } else {
            Self { generation, digest }
        }
    }

    /// Parse revision text. Empty input yields [`Revision::NONE`].
    ///
    /// # Errors
    ///
    /// Returns [`MalformedRevision`] if the generation is not a non-empty
    /// run of decimal digits that fits in a `u32` and is non-zero, if the
    /// `-` separator is missing, or if the digest is not exactly 32 hex
    /// characters.
    pub fn parse(text: &str) -> Result<Self, MalformedRevision> {
        if text.is_empty() {
            return Ok(Self::NONE);
        }

        let Some((generation, digest)) = text.split_once('-') else {
            return Err(MalformedRevision::new(text, "missing '-' separator"));
        };

        if generation.is_empty() || !generation.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MalformedRevision::new(
                text,
                "generation must be decimal digits",
            ));
        }

        let generation = parse_generation(generation)
            .ok_or_else(|| MalformedRevision::new(text, "generation out of range"))?;
        if generation == 0 {
            return Err(MalformedRevision::new(text, "generation must be positive"));
        }

        if digest.len() != DIGEST_LEN * 2 {
            return Err(MalformedRevision::new(
                text,
                "digest must be exactly 32 hex characters",
            ));
        }

        let mut bytes = [0_u8; DIGEST_LEN];
        hex::decode_to_slice(digest, &mut bytes)
            .map_err(|_| MalformedRevision::new(text, "digest is not hexadecimal"))?;

        Ok(Self {
            generation,
            digest: bytes,
        })
    }

    /// Derive the child revision of `self` for `id` with the given
    /// canonical field payload.
    ///
    /// The generation is one more than the parent's; the digest is
    /// [`hash::digest`] over the id, the parent's text form, and the
    /// canonical fields. `None` when the parent is at `u32::MAX`.
    #[must_use]
    pub fn next(&self, id: &DocumentId, canonical_fields: &str) -> Option<Self> {
        let generation = self.generation.checked_add(1)?;
        Some(Self {
            generation,
            digest: hash::digest(id.as_str(), &self.to_string(), canonical_fields),
        })
    }

    /// Generation counter; `0` only for the sentinel.
    #[must_use]
    pub const fn generation(&self) -> u32 {
        self.generation
    }

    /// Raw digest bytes.
    #[must_use]
    pub const fn digest(&self) -> &[u8; DIGEST_LEN] {
        &self.digest
    }

    /// True for the "no revision" sentinel.
    #[must_use]
    pub const fn is_none(&self) -> bool {
        self.generation == 0
    }

    /// Compare `self` against `other` by recency.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Recency {
        match self.cmp(other) {
            Ordering::Greater => Recency::Newer,
            Ordering::Less => Recency::Older,
            Ordering::Equal => Recency::Equal,
        }
    }
}

fn parse_generation(digits: &str) -> Option<u32> {
    let trimmed = digits.trim_start_matches('0');
    if trimmed.is_empty() {
        return Some(0);
    }
    trimmed.parse().ok()
}

impl Ord for Revision {
    fn cmp(&self, other: &Self) -> Ordering {
        self.generation
            .cmp(&other.generation)
            .then_with(|| other.digest.cmp(&self.digest))
    }
}

impl PartialOrd for Revision {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return Ok(());
        }
        write!(f, "{}-{}", self.generation, hex::encode(self.digest))
    }
}

impl FromStr for Revision {
    type Err = MalformedRevision;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for Revision {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Revision {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}
