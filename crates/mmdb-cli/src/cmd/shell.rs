//! `mmdb shell`: line-oriented command session over stdin.
//!
//! One command per line, whitespace-separated:
//!
//! ```text
//! put  <id> [<rev>|-] [<json object>]
//! fork <id> <rev>|-   [<json object>]
//! get  <id> [<rev>]
//! revs <id> [all]
//! quit
//! ```
//!
//! `-` or an omitted revision stands for "no base revision"; a token
//! starting with `{` is taken as the fields. Everything after the revision
//! is the fields JSON and may contain spaces. Blank lines and lines starting with
//! `#` are skipped. A failing command writes an error line and the session
//! continues.

use crate::cmd::{get, put, revs};
use crate::output::{CliError, OutputMode, write_error};
use mmdb_core::{ConflictPolicy, Store};
use std::io::{BufRead, Write};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand<'a> {
    Put {
        id: &'a str,
        rev: &'a str,
        fields: &'a str,
        policy: ConflictPolicy,
    },
    Get {
        id: &'a str,
        rev: Option<&'a str>,
    },
    Revs {
        id: &'a str,
        all: bool,
    },
    Quit,
}

/// Split off the first whitespace-delimited token.
fn next_token(input: &str) -> Option<(&str, &str)> {
    let input = input.trim_start();
    if input.is_empty() {
        return None;
    }
    Some(
        input
            .split_once(char::is_whitespace)
            .map_or((input, ""), |(head, rest)| (head, rest.trim_start())),
    )
}

fn require_id<'a>(verb: &str, rest: &'a str) -> Result<(&'a str, &'a str), String> {
    next_token(rest).ok_or_else(|| format!("`{verb}` needs a document id"))
}

/// Parse one line. `Ok(None)` for blank and comment lines.
pub fn parse_line(line: &str) -> Result<Option<ShellCommand<'_>>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let Some((verb, rest)) = next_token(line) else {
        return Ok(None);
    };

    let command = match verb {
        "put" | "fork" => {
            let (id, rest) = require_id(verb, rest)?;
            let (rev, fields) = if rest.starts_with('{') {
                ("-", rest)
            } else {
                next_token(rest).unwrap_or(("-", ""))
            };
            ShellCommand::Put {
                id,
                rev: if rev == "-" { "" } else { rev },
                fields: if fields.is_empty() { "{}" } else { fields },
                policy: if verb == "fork" {
                    ConflictPolicy::AllowFork
                } else {
                    ConflictPolicy::Reject
                },
            }
        }
        "get" => {
            let (id, rest) = require_id(verb, rest)?;
            ShellCommand::Get {
                id,
                rev: next_token(rest).map(|(rev, _)| rev),
            }
        }
        "revs" => {
            let (id, rest) = require_id(verb, rest)?;
            let all = match next_token(rest) {
                None => false,
                Some(("all", _)) => true,
                Some((other, _)) => return Err(format!("unexpected argument `{other}`")),
            };
            ShellCommand::Revs { id, all }
        }
        "quit" | "exit" => ShellCommand::Quit,
        other => return Err(format!("unknown command `{other}`")),
    };
    Ok(Some(command))
}

fn execute(
    store: &mut Store,
    command: ShellCommand<'_>,
    mode: OutputMode,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    match command {
        ShellCommand::Put {
            id,
            rev,
            fields,
            policy,
        } => {
            let result = put::put_document(store, id, rev, fields, policy)?;
            put::write_put(mode, out, &result)
        }
        ShellCommand::Get { id, rev } => {
            let doc = get::get_document(store, id, rev)?;
            get::write_document(mode, out, &doc)
        }
        ShellCommand::Revs { id, all } => {
            let result = revs::list_revisions(store, id, all)?;
            revs::write_revisions(mode, out, &result)
        }
        ShellCommand::Quit => Ok(()),
    }
}

/// Counters reported when the session ends.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub ok: usize,
    pub failed: usize,
}

/// Run commands from `input` until EOF or `quit`.
pub fn run_shell(
    store: &mut Store,
    mode: OutputMode,
    input: impl BufRead,
    out: &mut dyn Write,
) -> anyhow::Result<SessionStats> {
    let mut stats = SessionStats::default();

    for line in input.lines() {
        let line = line?;
        let outcome = match parse_line(&line) {
            Ok(None) => continue,
            Ok(Some(ShellCommand::Quit)) => break,
            Ok(Some(command)) => {
                execute(store, command, mode, out).map_err(|e| CliError::from(&e))
            }
            Err(message) => Err(CliError::new(message)),
        };

        match outcome {
            Ok(()) => stats.ok += 1,
            Err(error) => {
                stats.failed += 1;
                write_error(mode, out, &error)?;
            }
        }
        out.flush()?;
    }

    debug!(ok = stats.ok, failed = stats.failed, "shell session ended");
    Ok(stats)
}
