//! `mmdb revs`: list a document's leaf revisions or its full history.

use crate::output::{OutputMode, render};
use clap::Args;
use mmdb_core::Store;
use mmdb_core::tree::RevisionRecord;
use serde::Serialize;
use std::io::Write;

#[derive(Args, Debug)]
pub struct RevsArgs {
    /// Document id.
    pub id: String,

    /// Include non-leaf revisions, with their leaf/deleted flags.
    #[arg(short, long)]
    pub all: bool,
}

#[derive(Debug, Serialize)]
pub struct RevsOutput {
    pub id: String,
    pub revs: Vec<RevisionRecord>,
}

/// Leaves (or full history when `all`) newest first.
pub fn list_revisions(store: &Store, id: &str, all: bool) -> anyhow::Result<RevsOutput> {
    let revs = if all {
        store.history(id)?
    } else {
        store
            .list_conflicts(id)?
            .into_iter()
            .map(|revision| RevisionRecord {
                revision,
                leaf: true,
                deleted: false,
            })
            .collect()
    };
    Ok(RevsOutput {
        id: id.to_string(),
        revs,
    })
}

pub fn write_revisions(mode: OutputMode, out: &mut dyn Write, result: &RevsOutput) -> anyhow::Result<()> {
    render(mode, out, result, |r, w| {
        for record in &r.revs {
            if record.leaf {
                writeln!(w, "{}", record.revision)?;
            } else {
                writeln!(w, "{} (superseded)", record.revision)?;
            }
        }
        Ok(())
    })
}

pub fn run_revs(
    args: &RevsArgs,
    store: &Store,
    mode: OutputMode,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let result = list_revisions(store, &args.id, args.all)?;
    write_revisions(mode, out, &result)
}
