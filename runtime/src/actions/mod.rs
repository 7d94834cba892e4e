//! Action registry: the leaf operations a pipeline can call by name.
//!
//! Each action declares a parameter schema. Call-site arguments are bound
//! against it once at parse time (so mistakes are parse errors) and again at
//! dispatch, for trees built with the combinators.

pub mod document;
pub mod http;
pub mod json;
pub mod text;

use std::collections::BTreeMap;
use std::io::Write;

use crate::config::Config;
use crate::pipeline::error::ActionError;
use crate::pipeline::expr::{Arg, Args};
use crate::pipeline::value::Value;

/// Kind of literal a parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Str,
    Dict,
}

/// One declared parameter of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Param {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
}

impl Param {
    pub const fn required(name: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::Str,
            required: true,
        }
    }

    pub const fn optional(name: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::Str,
            required: false,
        }
    }

    pub const fn optional_dict(name: &'static str) -> Self {
        Self {
            name,
            kind: ParamKind::Dict,
            required: false,
        }
    }
}

impl std::fmt::Display for Param {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.kind {
            ParamKind::Str => "str",
            ParamKind::Dict => "dict",
        };
        if self.required {
            write!(f, "{}: {kind}", self.name)
        } else {
            write!(f, "{}: {kind}?", self.name)
        }
    }
}

/// Arguments matched to an action's declared parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundArgs {
    values: Vec<(&'static str, Arg)>,
}

impl BoundArgs {
    fn get(&self, name: &str) -> Option<&Arg> {
        self.values
            .iter()
            .find(|(param, _)| *param == name)
            .map(|(_, arg)| arg)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(Arg::Str(s)) => Some(s),
            _ => None,
        }
    }

    pub fn require_str(&self, name: &str) -> Result<&str, ActionError> {
        self.str(name).ok_or_else(|| {
            ActionError::InvalidArguments(format!("missing required argument '{name}'"))
        })
    }

    pub fn dict(&self, name: &str) -> Option<&[(String, String)]> {
        match self.get(name) {
            Some(Arg::Dict(pairs)) => Some(pairs),
            _ => None,
        }
    }
}

fn check_kind(param: &Param, arg: &Arg) -> Result<(), ActionError> {
    match (param.kind, arg) {
        (ParamKind::Str, Arg::Str(_)) | (ParamKind::Dict, Arg::Dict(_)) => Ok(()),
        (ParamKind::Str, Arg::Dict(_)) => Err(ActionError::InvalidArguments(format!(
            "argument '{}' expects a string, got a dict",
            param.name
        ))),
        (ParamKind::Dict, Arg::Str(_)) => Err(ActionError::InvalidArguments(format!(
            "argument '{}' expects a dict, got a string",
            param.name
        ))),
    }
}

/// Match call-site arguments against a parameter schema.
pub fn bind(params: &[Param], args: &Args) -> Result<BoundArgs, ActionError> {
    let mut values: Vec<(&'static str, Arg)> = Vec::new();

    match args {
        Args::Positional(list) => {
            if list.len() > params.len() {
                return Err(ActionError::InvalidArguments(format!(
                    "takes at most {} argument(s), got {}",
                    params.len(),
                    list.len()
                )));
            }
            for (param, arg) in params.iter().zip(list) {
                check_kind(param, arg)?;
                values.push((param.name, arg.clone()));
            }
        }
        Args::Named(list) => {
            for (name, arg) in list {
                let param = params.iter().find(|p| p.name == name).ok_or_else(|| {
                    ActionError::InvalidArguments(format!("unknown argument '{name}'"))
                })?;
                if values.iter().any(|(bound, _)| *bound == param.name) {
                    return Err(ActionError::InvalidArguments(format!(
                        "argument '{name}' given twice"
                    )));
                }
                check_kind(param, arg)?;
                values.push((param.name, arg.clone()));
            }
        }
    }

    if let Some(missing) = params
        .iter()
        .find(|p| p.required && !values.iter().any(|(bound, _)| *bound == p.name))
    {
        return Err(ActionError::InvalidArguments(format!(
            "missing required argument '{}'",
            missing.name
        )));
    }

    Ok(BoundArgs { values })
}

/// What an action sees besides its input value.
pub struct ActionContext<'a> {
    /// The immutable anchor of the running evaluation.
    pub anchor: &'a str,
    /// Where debug dumps are printed.
    pub out: &'a mut dyn Write,
}

/// A leaf operation resolved by name.
pub trait Action: Send + Sync {
    fn name(&self) -> &'static str;

    fn params(&self) -> &'static [Param] {
        &[]
    }

    /// One-line description for `purifier actions`.
    fn summary(&self) -> &'static str;

    /// Check literal arguments ahead of evaluation (e.g. compile a query).
    fn validate(&self, _args: &BoundArgs) -> Result<(), ActionError> {
        Ok(())
    }

    fn apply(
        &self,
        cx: &mut ActionContext<'_>,
        input: Value,
        args: &BoundArgs,
    ) -> Result<Value, ActionError>;
}

type ApplyFn =
    dyn Fn(&mut ActionContext<'_>, Value, &BoundArgs) -> Result<Value, ActionError> + Send + Sync;

/// Closure-backed action, see [`Registry::register_fn`].
struct FnAction {
    name: &'static str,
    params: &'static [Param],
    apply: Box<ApplyFn>,
}

impl Action for FnAction {
    fn name(&self) -> &'static str {
        self.name
    }

    fn params(&self) -> &'static [Param] {
        self.params
    }

    fn summary(&self) -> &'static str {
        "user-defined action"
    }

    fn apply(
        &self,
        cx: &mut ActionContext<'_>,
        input: Value,
        args: &BoundArgs,
    ) -> Result<Value, ActionError> {
        (self.apply)(cx, input, args)
    }
}

/// How many matches a query action hands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Every match, as a list.
    All,
    /// Exactly one match, else a recoverable error.
    One,
    /// The first match, else a recoverable error.
    First,
}

impl Cardinality {
    pub fn pick(self, what: &str, mut matches: Vec<Value>) -> Result<Value, ActionError> {
        match self {
            Cardinality::All => Ok(Value::List(matches)),
            Cardinality::One if matches.len() == 1 => Ok(matches.remove(0)),
            Cardinality::One => Err(ActionError::Content(format!(
                "{what} found {} matches, expected exactly 1",
                matches.len()
            ))),
            Cardinality::First if !matches.is_empty() => Ok(matches.remove(0)),
            Cardinality::First => Err(ActionError::Content(format!(
                "{what} found 0 matches, expected at least 1"
            ))),
        }
    }
}

/// Name → action lookup.
#[derive(Default)]
pub struct Registry {
    actions: BTreeMap<&'static str, Box<dyn Action>>,
}

impl Registry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Every built-in action, with the HTTP client built from `config`.
    pub fn standard(config: &Config) -> Self {
        let mut registry = Self::empty();
        http::register(&mut registry, config);
        document::register(&mut registry);
        json::register(&mut registry);
        text::register(&mut registry);
        registry
    }

    /// Add an action, replacing any action of the same name.
    pub fn register(&mut self, action: impl Action + 'static) -> &mut Self {
        self.actions.insert(action.name(), Box::new(action));
        self
    }

    pub fn register_fn<F>(&mut self, name: &'static str, params: &'static [Param], f: F) -> &mut Self
    where
        F: Fn(&mut ActionContext<'_>, Value, &BoundArgs) -> Result<Value, ActionError>
            + Send
            + Sync
            + 'static,
    {
        self.register(FnAction {
            name,
            params,
            apply: Box::new(f),
        })
    }

    pub fn resolve(&self, name: &str) -> Option<&dyn Action> {
        self.actions.get(name).map(|action| action.as_ref())
    }

    /// Actions in name order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Action> {
        self.actions.values().map(|action| action.as_ref())
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARAMS: &[Param] = &[Param::required("path"), Param::optional("mode")];

    #[test]
    fn test_bind_positional() {
        let bound = bind(PARAMS, &Args::Positional(vec!["//a".into()])).unwrap();
        assert_eq!(bound.str("path"), Some("//a"));
        assert_eq!(bound.str("mode"), None);
    }

    #[test]
    fn test_bind_named_any_order() {
        let args = Args::Named(vec![
            ("mode".into(), "fast".into()),
            ("path".into(), "//a".into()),
        ]);
        let bound = bind(PARAMS, &args).unwrap();
        assert_eq!(bound.require_str("path").unwrap(), "//a");
        assert_eq!(bound.str("mode"), Some("fast"));
    }

    #[test]
    fn test_bind_rejects_bad_shapes() {
        let too_many = Args::Positional(vec!["a".into(), "b".into(), "c".into()]);
        assert!(bind(PARAMS, &too_many).is_err());

        let unknown = Args::Named(vec![("nope".into(), "x".into())]);
        assert!(bind(PARAMS, &unknown).is_err());

        let twice = Args::Named(vec![
            ("path".into(), "a".into()),
            ("path".into(), "b".into()),
        ]);
        assert!(bind(PARAMS, &twice).is_err());

        let missing = Args::default();
        let err = bind(PARAMS, &missing).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid arguments: missing required argument 'path'"
        );

        let dict = Args::Positional(vec![Arg::Dict(vec![])]);
        assert!(bind(PARAMS, &dict).is_err());
    }

    #[test]
    fn test_cardinality() {
        let two = vec![Value::from("a"), Value::from("b")];
        assert_eq!(
            Cardinality::All.pick("q", two.clone()).unwrap(),
            Value::List(two.clone())
        );
        assert_eq!(
            Cardinality::First.pick("q", two.clone()).unwrap(),
            Value::from("a")
        );
        let err = Cardinality::One.pick("q", two).unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(err.to_string(), "q found 2 matches, expected exactly 1");
        assert!(Cardinality::First.pick("q", vec![]).unwrap_err().is_recoverable());
    }

    #[test]
    fn test_standard_registry_has_builtins() {
        let registry = Registry::standard(&Config::default());
        for name in [
            "request_get",
            "html",
            "xpath_one",
            "xpath_all",
            "xpath_first",
            "one",
            "first",
            "json",
            "base64",
            "jsonpath_all",
            "jsonpath_one",
            "html_to_text",
            "rstrip",
            "find_json",
            "constantly",
            "debug_dump_json",
            "debug_dump_html",
        ] {
            assert!(registry.resolve(name).is_some(), "missing action {name}");
        }
        assert!(registry.resolve("xpath").is_none());
    }

    #[test]
    fn test_register_fn_replaces_by_name() {
        let mut registry = Registry::empty();
        registry.register_fn("echo", &[], |_, input, _| Ok(input));
        registry.register_fn("echo", &[], |_, _, _| Ok(Value::from("replaced")));
        assert_eq!(registry.len(), 1);

        let mut sink = Vec::new();
        let mut cx = ActionContext {
            anchor: "https://example.com",
            out: &mut sink,
        };
        let echo = registry.resolve("echo").unwrap();
        let out = echo
            .apply(&mut cx, Value::from("x"), &BoundArgs::default())
            .unwrap();
        assert_eq!(out, Value::from("replaced"));
    }
}
