//! Output mode flags shared by all subcommands.
//!
//! `main` turns the global `--json`/`--quiet`/`--verbose` flags into
//! environment variables so every command can check them.

pub fn is_json() -> bool {
    flag("PURIFIER_JSON")
}

pub fn is_quiet() -> bool {
    flag("PURIFIER_QUIET")
}

pub fn is_verbose() -> bool {
    flag("PURIFIER_VERBOSE")
}

fn flag(key: &str) -> bool {
    std::env::var(key).map(|v| v == "1").unwrap_or(false)
}

/// Print a JSON value, pretty, on stdout.
pub fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("  Error: failed to encode output: {e}"),
    }
}
