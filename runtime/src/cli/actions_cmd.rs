//! CLI handler for `purifier actions`.

use anyhow::Result;
use serde_json::json;

use crate::cli::output;
use crate::{Action, Config, Registry};

/// List the built-in actions.
pub fn run() -> Result<()> {
    let registry = Registry::standard(&Config::from_env());

    if output::is_json() {
        let actions: Vec<serde_json::Value> = registry
            .iter()
            .map(|action| {
                json!({
                    "name": action.name(),
                    "params": action.params().iter().map(|p| json!({
                        "name": p.name,
                        "kind": format!("{:?}", p.kind).to_lowercase(),
                        "required": p.required,
                    })).collect::<Vec<_>>(),
                    "summary": action.summary(),
                })
            })
            .collect();
        output::print_json(&json!({ "actions": actions }));
        return Ok(());
    }

    for action in registry.iter() {
        println!("  {:<34} {}", signature(action), action.summary());
    }
    Ok(())
}

/// `name(param: kind, ...)`, or just the name when it takes nothing.
fn signature(action: &dyn Action) -> String {
    let params = action.params();
    if params.is_empty() {
        return action.name().to_string();
    }
    let params: Vec<String> = params.iter().map(ToString::to_string).collect();
    format!("{}({})", action.name(), params.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature() {
        let registry = Registry::standard(&Config::default());
        let sig = |name: &str| signature(registry.resolve(name).unwrap());
        assert_eq!(sig("html"), "html");
        assert_eq!(sig("xpath_one"), "xpath_one(path: str)");
        assert_eq!(sig("request_get"), "request_get(headers: dict?)");
        assert_eq!(sig("rstrip"), "rstrip(chars: str?)");
    }
}
