//! Shared output layer: human text or one-line JSON per result.
//!
//! Results go to the writer handed in by the caller (stdout for one-shot
//! commands, the session writer for `mmdb shell`). Errors go to stderr for
//! one-shot commands and inline for the shell.

use mmdb_core::StoreError;
use mmdb_core::config::ConfigError;
use serde::Serialize;
use std::io::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl OutputMode {
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }
}

/// A structured error with an optional machine code and remediation hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CliError {
    #[serde(rename = "error")]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            hint: None,
        }
    }

    pub fn with_details(
        message: impl Into<String>,
        code: impl Into<String>,
        hint: Option<&str>,
    ) -> Self {
        Self {
            message: message.into(),
            code: Some(code.into()),
            hint: hint.map(str::to_string),
        }
    }
}

impl From<&StoreError> for CliError {
    fn from(err: &StoreError) -> Self {
        Self::with_details(err.to_string(), err.code().code(), err.hint())
    }
}

impl From<&ConfigError> for CliError {
    fn from(err: &ConfigError) -> Self {
        let code = err.code();
        Self::with_details(err.to_string(), code.code(), code.hint())
    }
}

impl From<&anyhow::Error> for CliError {
    fn from(err: &anyhow::Error) -> Self {
        if let Some(store) = err.downcast_ref::<StoreError>() {
            return store.into();
        }
        if let Some(config) = err.downcast_ref::<ConfigError>() {
            return config.into();
        }
        Self::new(format!("{err:#}"))
    }
}

/// Write a serializable value as one JSON line, or through `human_fn`.
pub fn render<T: Serialize>(
    mode: OutputMode,
    out: &mut dyn Write,
    value: &T,
    human_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    match mode {
        OutputMode::Json => {
            serde_json::to_writer(&mut *out, value)?;
            writeln!(out)?;
        }
        OutputMode::Human => human_fn(value, out)?,
    }
    Ok(())
}

/// Write an error as `{"error", "code", "hint"}` or as `error: ...` text.
pub fn write_error(mode: OutputMode, out: &mut dyn Write, error: &CliError) -> io::Result<()> {
    match mode {
        OutputMode::Json => {
            serde_json::to_writer(&mut *out, error)?;
            writeln!(out)
        }
        OutputMode::Human => {
            match &error.code {
                Some(code) => writeln!(out, "error[{code}]: {}", error.message)?,
                None => writeln!(out, "error: {}", error.message)?,
            }
            if let Some(hint) = &error.hint {
                writeln!(out, "  hint: {hint}")?;
            }
            Ok(())
        }
    }
}

/// Render an error to stderr.
pub fn render_error(mode: OutputMode, error: &CliError) -> io::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    write_error(mode, &mut out, error)
}
