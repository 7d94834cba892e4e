//! CLI subcommand implementations for the `purifier` binary.

pub mod actions_cmd;
pub mod check_cmd;
pub mod output;
pub mod run_cmd;

use std::path::Path;

use anyhow::{bail, Context, Result};

/// Pipeline text from an inline argument or a file, exactly one of them.
pub fn load_source(inline: Option<&str>, file: Option<&Path>) -> Result<String> {
    match (inline, file) {
        (Some(_), Some(_)) => bail!("give the pipeline inline or with --file, not both"),
        (Some(text), None) => Ok(text.to_string()),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read pipeline file {}", path.display())),
        (None, None) => bail!("no pipeline given (pass it inline or with --file)"),
    }
}

/// Render a parse error with the offending line and a caret.
pub(crate) fn explain_parse_error(err: &crate::ParseError, source: &str) -> anyhow::Error {
    anyhow::anyhow!("{err}\n\n{}", indent(&err.snippet(source)))
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("    {line}"))
        .collect::<Vec<_>>()
        .join("\n")
}
