//! `mmdb put`: write a new revision of a document.

use crate::output::{OutputMode, render};
use anyhow::Context;
use clap::Args;
use mmdb_core::{ConflictPolicy, Document, Fields, Revision, Store};
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct PutArgs {
    /// Document id (1 to 40 bytes).
    pub id: String,

    /// Base revision; omit when creating the document.
    #[arg(short, long, default_value = "")]
    pub rev: String,

    /// Fields as a JSON object.
    #[arg(short, long, conflicts_with = "fields_file")]
    pub fields: Option<String>,

    /// Read the fields JSON object from a file (`-` for stdin).
    #[arg(long, value_name = "PATH")]
    pub fields_file: Option<PathBuf>,

    /// Accept a stale base revision as a new conflicting branch.
    #[arg(long)]
    pub allow_conflict: bool,
}

#[derive(Debug, Serialize)]
pub struct PutOutput {
    pub id: String,
    pub rev: Revision,
}

impl PutArgs {
    fn fields_text(&self) -> anyhow::Result<String> {
        match (&self.fields, &self.fields_file) {
            (Some(text), _) => Ok(text.clone()),
            (None, Some(path)) if path.as_os_str() == "-" => {
                std::io::read_to_string(std::io::stdin()).context("read fields from stdin")
            }
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("read fields from {}", path.display())),
            (None, None) => Ok("{}".to_string()),
        }
    }

    const fn policy(&self) -> ConflictPolicy {
        if self.allow_conflict {
            ConflictPolicy::AllowFork
        } else {
            ConflictPolicy::Reject
        }
    }
}

/// Put `fields` on top of `rev` and report the new revision.
pub fn put_document(
    store: &mut Store,
    id: &str,
    rev: &str,
    fields: &str,
    policy: ConflictPolicy,
) -> anyhow::Result<PutOutput> {
    let mut doc = Document::new(id)?;
    doc.set_revision_str(rev)?;
    doc.fields = fields.parse::<Fields>()?;
    let rev = store.put(&doc, policy)?;
    Ok(PutOutput {
        id: doc.id.to_string(),
        rev,
    })
}

pub fn write_put(mode: OutputMode, out: &mut dyn Write, result: &PutOutput) -> anyhow::Result<()> {
    render(mode, out, result, |r, w| writeln!(w, "{}", r.rev))
}

pub fn run_put(
    args: &PutArgs,
    store: &mut Store,
    mode: OutputMode,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let fields = args.fields_text()?;
    let result = put_document(store, &args.id, &args.rev, &fields, args.policy())?;
    write_put(mode, out, &result)
}
