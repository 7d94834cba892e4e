//! CLI handler for `purifier run <url> [pipeline]`.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::json;

use crate::cli::{explain_parse_error, load_source, output};
use crate::{Config, Error, Scraper, Value};

/// Options of a single run.
#[derive(Debug, Default)]
pub struct RunOptions<'a> {
    pub pipeline: Option<&'a str>,
    pub file: Option<&'a Path>,
    /// Start from this file's contents instead of the anchor.
    pub input: Option<&'a Path>,
    pub debug: bool,
    pub timeout_ms: Option<u64>,
    pub user_agent: Option<&'a str>,
}

impl RunOptions<'_> {
    /// Flags override the environment.
    pub fn config(&self) -> Config {
        let mut config = Config::from_env();
        if let Some(ms) = self.timeout_ms {
            config.timeout_ms = ms;
        }
        if let Some(ua) = self.user_agent {
            config.user_agent = ua.to_string();
        }
        if self.debug {
            config.debug = true;
        }
        config
    }
}

pub fn run(url: &str, opts: &RunOptions<'_>) -> Result<()> {
    let source = load_source(opts.pipeline, opts.file)?;
    let scraper = Scraper::new(opts.config());

    let result = match opts.input {
        Some(path) => {
            let body = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read input file {}", path.display()))?;
            scraper.scrape_input(source.as_str(), url, Value::String(body))
        }
        None => scraper.scrape(source.as_str(), url),
    };

    let value = match result {
        Ok(value) => value,
        Err(Error::Parse(e)) => return Err(explain_parse_error(&e, &source)),
        Err(e) => return Err(e).context(format!("scraping {url} failed")),
    };

    if output::is_json() {
        output::print_json(&json!({
            "anchor": url,
            "result": value.to_json(),
        }));
    } else {
        output::print_json(&value.to_json());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let opts = RunOptions {
            debug: true,
            timeout_ms: Some(250),
            user_agent: Some("probe/1"),
            ..Default::default()
        };
        let config = opts.config();
        assert!(config.debug);
        assert_eq!(config.timeout_ms, 250);
        assert_eq!(config.user_agent, "probe/1");
    }

    #[test]
    fn test_run_offline_from_input_file() {
        let mut page = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut page, b"<title>Offline</title>").unwrap();
        let opts = RunOptions {
            pipeline: Some("html | xpath_one('//title/text()')"),
            input: Some(page.path()),
            ..Default::default()
        };
        run("https://example.com", &opts).unwrap();
    }

    #[test]
    fn test_run_reports_parse_error_with_snippet() {
        let opts = RunOptions {
            pipeline: Some("html |"),
            ..Default::default()
        };
        let err = run("https://example.com", &opts).unwrap_err();
        let text = format!("{err:#}");
        assert!(text.contains("expected an expression, found end of input"));
        assert!(text.contains("    html |\n          ^"));
    }
}
