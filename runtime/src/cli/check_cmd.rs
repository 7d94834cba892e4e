//! CLI handler for `purifier check [pipeline]`.

use std::path::Path;

use anyhow::Result;
use serde_json::json;

use crate::cli::{explain_parse_error, load_source, output};
use crate::{Config, Registry};

/// Parse a pipeline and print it in normalised form.
pub fn run(pipeline: Option<&str>, file: Option<&Path>) -> Result<()> {
    let source = load_source(pipeline, file)?;
    let registry = Registry::standard(&Config::from_env());
    let normalised = normalise(&source, &registry)?;

    if output::is_json() {
        output::print_json(&json!({
            "valid": true,
            "pipeline": normalised,
        }));
    } else if !output::is_quiet() {
        println!("{normalised}");
    }
    Ok(())
}

fn normalise(source: &str, registry: &Registry) -> Result<String> {
    crate::pipeline::parse(source, registry)
        .map(|expr| expr.to_string())
        .map_err(|e| explain_parse_error(&e, source))
}
