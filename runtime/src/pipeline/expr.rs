//! Pipeline algebra: the expression tree and its combinators.
//!
//! Trees are built either by [`parser::parse`](crate::pipeline::parser::parse)
//! or directly with the functions here; the evaluator cannot tell the two
//! apart. Trees are immutable once built.

use std::fmt;
use std::ops::{BitOr, Div, Rem};

use crate::pipeline::error::BuildError;

/// A literal action argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Str(String),
    /// String-to-string mapping, in declaration order.
    Dict(Vec<(String, String)>),
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Str(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Str(s)
    }
}

/// Arguments of an action call: strictly positional or strictly named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Args {
    Positional(Vec<Arg>),
    Named(Vec<(String, Arg)>),
}

impl Default for Args {
    fn default() -> Self {
        Args::Positional(Vec::new())
    }
}

impl Args {
    pub fn is_empty(&self) -> bool {
        match self {
            Args::Positional(args) => args.is_empty(),
            Args::Named(args) => args.is_empty(),
        }
    }

    /// Every string literal, dictionary keys and values included.
    pub fn literals(&self) -> impl Iterator<Item = &str> {
        let args: Vec<&Arg> = match self {
            Args::Positional(args) => args.iter().collect(),
            Args::Named(args) => args.iter().map(|(_, arg)| arg).collect(),
        };
        args.into_iter().flat_map(|arg| match arg {
            Arg::Str(s) => vec![s.as_str()],
            Arg::Dict(pairs) => pairs
                .iter()
                .flat_map(|(k, v)| [k.as_str(), v.as_str()])
                .collect(),
        })
    }
}

/// A leaf: a named action and its literal arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionCall {
    pub name: String,
    pub args: Args,
}

/// Named sub-expressions of a `fields(...)` node. Names are unique.
#[derive(Debug, Clone, PartialEq)]
pub struct Fields(Vec<(String, Expr)>);

impl Fields {
    pub fn new<I, K>(named: I) -> Result<Self, BuildError>
    where
        I: IntoIterator<Item = (K, Expr)>,
        K: Into<String>,
    {
        let mut fields: Vec<(String, Expr)> = Vec::new();
        for (name, expr) in named {
            let name = name.into();
            if fields.iter().any(|(existing, _)| *existing == name) {
                return Err(BuildError::DuplicateField(name));
            }
            fields.push((name, expr));
        }
        Ok(Fields(fields))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Expr)> {
        self.0.iter().map(|(name, expr)| (name.as_str(), expr))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }
}

/// A pipeline expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `left | right`
    Sequence(Box<Expr>, Box<Expr>),
    /// `left |? right`, absent if `left` fails recoverably.
    OptionalSequence(Box<Expr>, Box<Expr>),
    /// `right` on the original input if `left` is absent. No textual form.
    Fallback(Box<Expr>, Box<Expr>),
    /// `map(inner)`: `inner` once per list element.
    Map(Box<Expr>),
    /// `fields(name=expr, ...)`: every field sees the same input.
    Fields(Fields),
    Action(ActionCall),
}

impl Expr {
    /// Node identity shown by the debug trace.
    pub fn label(&self) -> String {
        match self {
            Expr::Sequence(..) => "sequence".to_string(),
            Expr::OptionalSequence(..) => "optional sequence".to_string(),
            Expr::Fallback(..) => "fallback".to_string(),
            Expr::Map(_) => "map".to_string(),
            Expr::Fields(fields) => {
                format!("fields({})", fields.names().collect::<Vec<_>>().join(", "))
            }
            Expr::Action(call) => call.to_string(),
        }
    }

    /// Whether [`Display`](fmt::Display) output parses back to this tree.
    ///
    /// Fallback nodes have no text form, and a string literal holding both
    /// quote characters cannot be quoted.
    pub fn has_text_form(&self) -> bool {
        match self {
            Expr::Fallback(..) => false,
            Expr::Sequence(left, right) | Expr::OptionalSequence(left, right) => {
                left.has_text_form() && right.has_text_form()
            }
            Expr::Map(inner) => inner.has_text_form(),
            Expr::Fields(fields) => fields.0.iter().all(|(_, expr)| expr.has_text_form()),
            Expr::Action(call) => call.args.literals().all(quotable),
        }
    }

    fn is_binary(&self) -> bool {
        matches!(
            self,
            Expr::Sequence(..) | Expr::OptionalSequence(..) | Expr::Fallback(..)
        )
    }
}

/// `a | b`
pub fn sequence(a: impl Into<Expr>, b: impl Into<Expr>) -> Expr {
    Expr::Sequence(Box::new(a.into()), Box::new(b.into()))
}

/// `a |? b`
pub fn optional_sequence(a: impl Into<Expr>, b: impl Into<Expr>) -> Expr {
    Expr::OptionalSequence(Box::new(a.into()), Box::new(b.into()))
}

/// Evaluate `a`; if absent, evaluate `b` against the same input.
pub fn fallback(a: impl Into<Expr>, b: impl Into<Expr>) -> Expr {
    Expr::Fallback(Box::new(a.into()), Box::new(b.into()))
}

pub fn map_each(inner: impl Into<Expr>) -> Expr {
    Expr::Map(Box::new(inner.into()))
}

/// Build a record node. Rejects duplicate names.
pub fn fields<I, K>(named: I) -> Result<Expr, BuildError>
where
    I: IntoIterator<Item = (K, Expr)>,
    K: Into<String>,
{
    Fields::new(named).map(Expr::Fields)
}

/// An action with no arguments (declared defaults apply).
pub fn action(name: impl Into<String>) -> Expr {
    Expr::Action(ActionCall {
        name: name.into(),
        args: Args::default(),
    })
}

/// An action with positional string arguments.
pub fn action_with<I, S>(name: impl Into<String>, args: I) -> Expr
where
    I: IntoIterator<Item = S>,
    S: Into<Arg>,
{
    Expr::Action(ActionCall {
        name: name.into(),
        args: Args::Positional(args.into_iter().map(Into::into).collect()),
    })
}

/// An action with named arguments.
pub fn action_named<I, K>(name: impl Into<String>, args: I) -> Expr
where
    I: IntoIterator<Item = (K, Arg)>,
    K: Into<String>,
{
    Expr::Action(ActionCall {
        name: name.into(),
        args: Args::Named(args.into_iter().map(|(k, v)| (k.into(), v)).collect()),
    })
}

impl<R: Into<Expr>> BitOr<R> for Expr {
    type Output = Expr;

    fn bitor(self, rhs: R) -> Expr {
        sequence(self, rhs)
    }
}

impl<R: Into<Expr>> Rem<R> for Expr {
    type Output = Expr;

    fn rem(self, rhs: R) -> Expr {
        optional_sequence(self, rhs)
    }
}

impl<R: Into<Expr>> Div<R> for Expr {
    type Output = Expr;

    fn div(self, rhs: R) -> Expr {
        fallback(self, rhs)
    }
}

// ── Display: back to pipeline text ──

fn quotable(s: &str) -> bool {
    !(s.contains('"') && s.contains('\''))
}

/// Literals holding both quote characters come out unparseable.
fn quote(s: &str) -> String {
    if s.contains('"') {
        format!("'{s}'")
    } else {
        format!("\"{s}\"")
    }
}

fn write_arg(f: &mut fmt::Formatter<'_>, arg: &Arg) -> fmt::Result {
    match arg {
        Arg::Str(s) => write!(f, "{}", quote(s)),
        Arg::Dict(pairs) => {
            write!(f, "{{")?;
            for (i, (k, v)) in pairs.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}: {}", quote(k), quote(v))?;
            }
            write!(f, "}}")
        }
    }
}

impl fmt::Display for ActionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if self.args.is_empty() {
            return Ok(());
        }
        write!(f, "(")?;
        match &self.args {
            Args::Positional(args) => {
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write_arg(f, arg)?;
                }
            }
            Args::Named(args) => {
                for (i, (name, arg)) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}=")?;
                    write_arg(f, arg)?;
                }
            }
        }
        write!(f, ")")
    }
}

/// Pipeline text. Lossy where [`Expr::has_text_form`] is false.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Sequence(left, right) | Expr::OptionalSequence(left, right) => {
                let op = if matches!(self, Expr::Sequence(..)) {
                    "|"
                } else {
                    "|?"
                };
                if matches!(**left, Expr::Fallback(..)) {
                    write!(f, "({left})")?;
                } else {
                    write!(f, "{left}")?;
                }
                if right.is_binary() {
                    write!(f, " {op} ({right})")
                } else {
                    write!(f, " {op} {right}")
                }
            }
            Expr::Fallback(left, right) => write!(f, "({left}) // ({right})"),
            Expr::Map(inner) => write!(f, "map({inner})"),
            Expr::Fields(fields) => {
                write!(f, "fields(")?;
                for (i, (name, expr)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}={expr}")?;
                }
                write!(f, ")")
            }
            Expr::Action(call) => write!(f, "{call}"),
        }
    }
}

impl From<ActionCall> for Expr {
    fn from(call: ActionCall) -> Self {
        Expr::Action(call)
    }
}
