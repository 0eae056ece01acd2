//! `mmdb get`: read a document at its winning or an explicit revision.

use crate::output::{OutputMode, render};
use clap::Args;
use mmdb_core::{Document, Revision, Store, StoreError};
use std::io::Write;

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Document id.
    pub id: String,

    /// Read this exact revision instead of the current winner.
    #[arg(short, long)]
    pub rev: Option<String>,
}

/// Fetch a document, turning absence into [`StoreError::NotFound`].
pub fn get_document(store: &Store, id: &str, rev: Option<&str>) -> anyhow::Result<Document> {
    let found = match rev {
        Some(rev) => store.get_at(id, rev)?,
        None => store.get(id)?,
    };
    let Some(doc) = found else {
        let revision = rev.map(Revision::parse).transpose()?.unwrap_or_default();
        return Err(StoreError::not_found(id, &revision).into());
    };
    Ok(doc)
}

pub fn write_document(mode: OutputMode, out: &mut dyn Write, doc: &Document) -> anyhow::Result<()> {
    render(mode, out, doc, |d, w| {
        writeln!(w, "{} {} {}", d.id, d.revision, d.fields.canonical_json())
    })
}

pub fn run_get(
    args: &GetArgs,
    store: &Store,
    mode: OutputMode,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let doc = get_document(store, &args.id, args.rev.as_deref())?;
    write_document(mode, out, &doc)
}
