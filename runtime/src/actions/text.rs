//! Small value-shaping actions: list picks, trimming, base64, constants.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use super::{Action, ActionContext, BoundArgs, Cardinality, Param, Registry};
use crate::pipeline::error::ActionError;
use crate::pipeline::value::Value;

pub fn register(registry: &mut Registry) {
    registry
        .register(Pick {
            name: "one",
            cardinality: Cardinality::One,
        })
        .register(Pick {
            name: "first",
            cardinality: Cardinality::First,
        })
        .register(Rstrip)
        .register(Base64)
        .register(Constantly);
}

/// `one` / `first` over a list.
pub struct Pick {
    name: &'static str,
    cardinality: Cardinality,
}

impl Action for Pick {
    fn name(&self) -> &'static str {
        self.name
    }

    fn summary(&self) -> &'static str {
        match self.cardinality {
            Cardinality::First => "first element of a list; empty is recoverable",
            _ => "sole element of a list; any other length is recoverable",
        }
    }

    fn apply(
        &self,
        _cx: &mut ActionContext<'_>,
        input: Value,
        _args: &BoundArgs,
    ) -> Result<Value, ActionError> {
        let items = input.into_list()?;
        self.cardinality.pick(&format!("{}()", self.name), items)
    }
}

const CHARS: &[Param] = &[Param::optional("chars")];

pub struct Rstrip;

impl Action for Rstrip {
    fn name(&self) -> &'static str {
        "rstrip"
    }

    fn params(&self) -> &'static [Param] {
        CHARS
    }

    fn summary(&self) -> &'static str {
        "remove trailing characters (whitespace by default)"
    }

    fn apply(
        &self,
        _cx: &mut ActionContext<'_>,
        input: Value,
        args: &BoundArgs,
    ) -> Result<Value, ActionError> {
        let s = input.into_string()?;
        let trimmed = match args.str("chars") {
            Some(chars) => s.trim_end_matches(|c: char| chars.contains(c)),
            None => s.trim_end(),
        };
        Ok(Value::String(trimmed.to_string()))
    }
}

pub struct Base64;

impl Action for Base64 {
    fn name(&self) -> &'static str {
        "base64"
    }

    fn summary(&self) -> &'static str {
        "decode standard base64 into bytes (strict alphabet and padding)"
    }

    fn apply(
        &self,
        _cx: &mut ActionContext<'_>,
        input: Value,
        _args: &BoundArgs,
    ) -> Result<Value, ActionError> {
        let encoded = input.into_string()?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Value::Bytes)
            .map_err(|e| ActionError::Malformed {
                what: "base64",
                message: e.to_string(),
            })
    }
}

const VALUE: &[Param] = &[Param::required("value")];

pub struct Constantly;

impl Action for Constantly {
    fn name(&self) -> &'static str {
        "constantly"
    }

    fn params(&self) -> &'static [Param] {
        VALUE
    }

    fn summary(&self) -> &'static str {
        "ignore the input and yield the literal"
    }

    fn apply(
        &self,
        _cx: &mut ActionContext<'_>,
        _input: Value,
        args: &BoundArgs,
    ) -> Result<Value, ActionError> {
        Ok(Value::from(args.require_str("value")?))
    }
}
