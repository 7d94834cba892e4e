//! Evaluator: walks an expression tree against a context.
//!
//! Evaluation is a plain synchronous recursion. The anchor is borrowed for
//! the whole walk; every node receives the working value by move and hands
//! back a new one.

use std::io::{self, Write};

use indexmap::IndexMap;
use tracing::debug;

use crate::actions::{bind, ActionContext, Registry};
use crate::pipeline::error::{ActionError, EvalError};
use crate::pipeline::expr::{ActionCall, Expr, Fields};
use crate::pipeline::value::Value;

/// Anchor plus working value.
#[derive(Debug, Clone)]
pub struct Context<'a> {
    /// Set once per evaluation (usually the starting URL).
    pub anchor: &'a str,
    pub value: Value,
}

impl<'a> Context<'a> {
    pub fn new(anchor: &'a str, value: Value) -> Self {
        Self { anchor, value }
    }
}

/// Emitted before each node is evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    /// Nesting depth, 0 for the root node.
    pub depth: usize,
    /// Node label, see [`Expr::label`].
    pub node: String,
    pub anchor: String,
    /// Summary of the node's input.
    pub value: String,
}

/// Sink for trace events.
pub trait Trace {
    fn enter(&mut self, event: TraceEvent);
}

impl Trace for Vec<TraceEvent> {
    fn enter(&mut self, event: TraceEvent) {
        self.push(event);
    }
}

/// Writes one indented line per event.
pub struct WriterTrace<W: Write> {
    writer: W,
}

impl<W: Write> WriterTrace<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Trace for WriterTrace<W> {
    fn enter(&mut self, event: TraceEvent) {
        // Tracing must never change the outcome, so write errors are dropped.
        let _ = writeln!(
            self.writer,
            "{:indent$}{} <- {} (anchor {})",
            "",
            event.node,
            event.value,
            event.anchor,
            indent = event.depth * 2
        );
    }
}

pub struct Evaluator<'a> {
    registry: &'a Registry,
    trace: Option<&'a mut dyn Trace>,
    out: Box<dyn Write + 'a>,
}

impl<'a> Evaluator<'a> {
    /// Debug dumps go to stdout.
    pub fn new(registry: &'a Registry) -> Self {
        Self {
            registry,
            trace: None,
            out: Box::new(io::stdout()),
        }
    }

    pub fn with_trace(mut self, trace: &'a mut dyn Trace) -> Self {
        self.trace = Some(trace);
        self
    }

    /// Where debug-dump actions print.
    pub fn with_output(mut self, out: impl Write + 'a) -> Self {
        self.out = Box::new(out);
        self
    }

    pub fn evaluate(&mut self, expr: &Expr, cx: Context<'_>) -> Result<Value, EvalError> {
        let result = self.eval(expr, cx.anchor, cx.value, 0);
        let _ = self.out.flush();
        result
    }

    fn eval(
        &mut self,
        expr: &Expr,
        anchor: &str,
        value: Value,
        depth: usize,
    ) -> Result<Value, EvalError> {
        if let Some(trace) = self.trace.as_deref_mut() {
            trace.enter(TraceEvent {
                depth,
                node: expr.label(),
                anchor: anchor.to_string(),
                value: value.summary(),
            });
        }

        match expr {
            Expr::Sequence(left, right) => {
                let mid = self.eval(left, anchor, value, depth + 1)?;
                self.eval(right, anchor, mid, depth + 1)
            }
            Expr::OptionalSequence(left, right) => {
                match self.eval(left, anchor, value, depth + 1) {
                    Ok(mid) => self.eval(right, anchor, mid, depth + 1),
                    Err(e) if e.is_recoverable() => {
                        debug!(node = %e.node, reason = %e.source, "optional step absent");
                        Ok(Value::Absent)
                    }
                    Err(e) => Err(e),
                }
            }
            Expr::Fallback(left, right) => {
                let first = self.eval(left, anchor, value.clone(), depth + 1)?;
                if first.is_absent() {
                    self.eval(right, anchor, value, depth + 1)
                } else {
                    Ok(first)
                }
            }
            Expr::Map(inner) => {
                let input = value.summary();
                let items = value
                    .into_list()
                    .map_err(|e| EvalError::new("map".to_string(), input, e))?;
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval(inner, anchor, item, depth + 1)?);
                }
                Ok(Value::List(out))
            }
            Expr::Fields(fields) => self.eval_fields(fields, anchor, value, depth),
            Expr::Action(call) => self.eval_action(call, anchor, value),
        }
    }

    fn eval_fields(
        &mut self,
        fields: &Fields,
        anchor: &str,
        value: Value,
        depth: usize,
    ) -> Result<Value, EvalError> {
        let mut record = IndexMap::with_capacity(fields.len());
        for (name, expr) in fields.iter() {
            let field = self.eval(expr, anchor, value.clone(), depth + 1)?;
            record.insert(name.to_string(), field);
        }
        Ok(Value::Map(record))
    }

    fn eval_action(
        &mut self,
        call: &ActionCall,
        anchor: &str,
        value: Value,
    ) -> Result<Value, EvalError> {
        let input = value.summary();
        let fail = |e: ActionError| EvalError::new(call.to_string(), input.clone(), e);

        let registry = self.registry;
        let action = registry
            .resolve(&call.name)
            .ok_or_else(|| fail(ActionError::UnknownAction(call.name.clone())))?;
        let args = bind(action.params(), &call.args).map_err(fail)?;
        debug!(action = %call.name, input = %input, "dispatching action");

        let mut cx = ActionContext {
            anchor,
            out: &mut *self.out,
        };
        action.apply(&mut cx, value, &args).map_err(fail)
    }
}
