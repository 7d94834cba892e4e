// Copyright 2026 Purifier Contributors
// SPDX-License-Identifier: Apache-2.0

//! Purifier: composable scraping pipelines.
//!
//! A pipeline is a tree of actions glued together with sequencing,
//! optional sequencing, mapping, record building and fallback. It can be
//! written as text:
//!
//! ```text
//! request_get
//!   | html
//!   | xpath_all('//a[@class="titlelink"]')
//!   | map(fields(title=xpath_one("text()"), url=xpath_one("@href")))
//! ```
//!
//! or built in Rust with the combinators in [`pipeline`]. Either way it is
//! evaluated by [`Scraper::scrape`] against an anchor, usually the starting
//! URL.
//!
//! Values hold parsed documents behind `Rc`, so a [`Value`] stays on the
//! thread that produced it. Run independent scrapes on separate threads, one
//! [`Scraper`] each or a shared one, and convert results with
//! [`Value::to_json`] before moving them across threads.

pub mod actions;
pub mod cli;
pub mod config;
pub mod document;
pub mod pipeline;

use std::borrow::Cow;
use std::io::{self, Write};
use std::time::Instant;

use tracing::info;

pub use actions::{Action, ActionContext, BoundArgs, Param, ParamKind, Registry};
pub use config::Config;
pub use pipeline::{
    ActionError, BuildError, Context, Error, EvalError, Evaluator, Expr, ParseError, Trace,
    TraceEvent, Value, WriterTrace,
};

/// A pipeline given either as text or as an already-built tree.
#[derive(Debug, Clone, Copy)]
pub enum Source<'a> {
    Text(&'a str),
    Expr(&'a Expr),
}

impl<'a> From<&'a str> for Source<'a> {
    fn from(text: &'a str) -> Self {
        Source::Text(text)
    }
}

impl<'a> From<&'a String> for Source<'a> {
    fn from(text: &'a String) -> Self {
        Source::Text(text)
    }
}

impl<'a> From<&'a Expr> for Source<'a> {
    fn from(expr: &'a Expr) -> Self {
        Source::Expr(expr)
    }
}

/// Registry plus configuration: everything needed to run pipelines.
pub struct Scraper {
    registry: Registry,
    config: Config,
}

impl Default for Scraper {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Scraper {
    /// Built-in actions, HTTP client configured from `config`.
    pub fn new(config: Config) -> Self {
        Self {
            registry: Registry::standard(&config),
            config,
        }
    }

    pub fn with_registry(registry: Registry, config: Config) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// For registering extra actions.
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Parse pipeline text against this scraper's registry.
    pub fn compile(&self, text: &str) -> Result<Expr, ParseError> {
        pipeline::parse(text, &self.registry)
    }

    /// Run a pipeline. The initial working value is the anchor itself.
    pub fn scrape<'s>(&self, source: impl Into<Source<'s>>, anchor: &str) -> Result<Value, Error> {
        self.scrape_input(source, anchor, Value::from(anchor))
    }

    /// Run a pipeline starting from `input` instead of the anchor.
    pub fn scrape_input<'s>(
        &self,
        source: impl Into<Source<'s>>,
        anchor: &str,
        input: Value,
    ) -> Result<Value, Error> {
        let mut stderr_trace = WriterTrace::new(io::stderr());
        let trace: Option<&mut dyn Trace> = if self.config.debug {
            Some(&mut stderr_trace)
        } else {
            None
        };
        self.run(source.into(), anchor, input, trace, &mut io::stdout())
    }

    /// Run with an explicit trace sink and debug-dump output.
    pub fn scrape_traced<'s>(
        &self,
        source: impl Into<Source<'s>>,
        anchor: &str,
        input: Value,
        trace: &mut dyn Trace,
        out: &mut dyn Write,
    ) -> Result<Value, Error> {
        self.run(source.into(), anchor, input, Some(trace), out)
    }

    fn run(
        &self,
        source: Source<'_>,
        anchor: &str,
        input: Value,
        trace: Option<&mut dyn Trace>,
        out: &mut dyn Write,
    ) -> Result<Value, Error> {
        // Compile before anything runs, so a bad pipeline never touches the network.
        let expr = match source {
            Source::Text(text) => Cow::Owned(self.compile(text)?),
            Source::Expr(expr) => Cow::Borrowed(expr),
        };

        let started = Instant::now();
        info!(anchor, pipeline = %expr, "scrape started");

        let mut evaluator = Evaluator::new(&self.registry).with_output(out);
        if let Some(trace) = trace {
            evaluator = evaluator.with_trace(trace);
        }
        let value = evaluator.evaluate(&expr, Context::new(anchor, input))?;

        info!(
            anchor,
            result = value.kind(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "scrape finished"
        );
        Ok(value)
    }
}

/// Run a pipeline with the built-in actions and `PURIFIER_*` configuration.
pub fn scrape<'s>(source: impl Into<Source<'s>>, anchor: &str) -> Result<Value, Error> {
    Scraper::new(Config::from_env()).scrape(source, anchor)
}
