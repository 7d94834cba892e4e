// Copyright 2026 Purifier Contributors
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use purifier::cli::{self, output};

#[derive(Parser)]
#[command(
    name = "purifier",
    about = "Purifier — composable scraping pipelines",
    version,
    after_help = "Run 'purifier <command> --help' for details on each command.\nRun 'purifier actions' to list what a pipeline can call."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline against a URL and print the result as JSON
    Run {
        /// Anchor URL (the starting value of the pipeline)
        url: String,
        /// Pipeline text, e.g. "request_get | html | xpath_all('//a/@href')"
        pipeline: Option<String>,
        /// Read the pipeline from a file instead
        #[arg(long, short)]
        file: Option<PathBuf>,
        /// Start from this file's contents instead of fetching (offline runs)
        #[arg(long)]
        input: Option<PathBuf>,
        /// Trace every evaluated node on stderr
        #[arg(long)]
        debug: bool,
        /// HTTP timeout in milliseconds
        #[arg(long)]
        timeout: Option<u64>,
        /// HTTP User-Agent header
        #[arg(long)]
        user_agent: Option<String>,
    },
    /// Parse a pipeline and print it in normalised form
    Check {
        /// Pipeline text
        pipeline: Option<String>,
        /// Read the pipeline from a file instead
        #[arg(long, short)]
        file: Option<PathBuf>,
    },
    /// List the actions a pipeline can call
    Actions,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

fn init_tracing(verbose: bool) {
    let directive = if verbose {
        "purifier=debug"
    } else {
        "purifier=warn"
    };
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    let filter = match directive.parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global flags via environment variables so all modules can check them
    if cli.json {
        std::env::set_var("PURIFIER_JSON", "1");
    }
    if cli.quiet {
        std::env::set_var("PURIFIER_QUIET", "1");
    }
    if cli.verbose {
        std::env::set_var("PURIFIER_VERBOSE", "1");
    }

    init_tracing(output::is_verbose());

    let result = match cli.command {
        Commands::Run {
            url,
            pipeline,
            file,
            input,
            debug,
            timeout,
            user_agent,
        } => {
            let opts = cli::run_cmd::RunOptions {
                pipeline: pipeline.as_deref(),
                file: file.as_deref(),
                input: input.as_deref(),
                debug,
                timeout_ms: timeout,
                user_agent: user_agent.as_deref(),
            };
            cli::run_cmd::run(&url, &opts)
        }
        Commands::Check { pipeline, file } => {
            cli::check_cmd::run(pipeline.as_deref(), file.as_deref())
        }
        Commands::Actions => cli::actions_cmd::run(),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "purifier", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if !output::is_quiet() && !output::is_json() {
            eprintln!("  Error: {e:#}");
        }
        if output::is_json() {
            output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        }
        std::process::exit(1);
    }

    result
}
