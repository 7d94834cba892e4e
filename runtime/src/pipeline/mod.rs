//! Pipelines: expression trees, their textual form and their evaluation.

pub mod error;
pub mod evaluator;
pub mod expr;
pub mod parser;
pub mod value;

pub use error::{ActionError, BuildError, Error, EvalError, ParseError};
pub use evaluator::{Context, Evaluator, Trace, TraceEvent, WriterTrace};
pub use expr::{
    action, action_named, action_with, fallback, fields, map_each, optional_sequence, sequence,
    ActionCall, Arg, Args, Expr, Fields,
};
pub use parser::parse;
pub use value::Value;
