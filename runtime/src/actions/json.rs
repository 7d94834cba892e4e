//! JSON actions: decoding, JSONPath queries, embedded-JSON search, dumps.

use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json_path::JsonPath;
use tracing::debug;

use super::{Action, ActionContext, BoundArgs, Cardinality, Param, Registry};
use crate::pipeline::error::ActionError;
use crate::pipeline::value::Value;

pub fn register(registry: &mut Registry) {
    registry
        .register(Json)
        .register(JsonPathQuery::new("jsonpath_all", Cardinality::All))
        .register(JsonPathQuery::new("jsonpath_one", Cardinality::One))
        .register(FindJson)
        .register(DebugDumpJson);
}

fn text_input(input: Value) -> Result<String, ActionError> {
    match input {
        Value::String(s) => Ok(s),
        Value::Bytes(bytes) => String::from_utf8(bytes).map_err(|e| ActionError::Malformed {
            what: "UTF-8",
            message: e.to_string(),
        }),
        other => Err(ActionError::type_mismatch("string", other.kind())),
    }
}

fn compile_path(path: &str) -> Result<JsonPath, ActionError> {
    JsonPath::parse(path).map_err(|e| ActionError::Query(format!("invalid JSONPath '{path}': {e}")))
}

pub struct Json;

impl Action for Json {
    fn name(&self) -> &'static str {
        "json"
    }

    fn summary(&self) -> &'static str {
        "parse a JSON document"
    }

    fn apply(
        &self,
        _cx: &mut ActionContext<'_>,
        input: Value,
        _args: &BoundArgs,
    ) -> Result<Value, ActionError> {
        let text = text_input(input)?;
        let parsed: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| ActionError::Malformed {
                what: "JSON",
                message: e.to_string(),
            })?;
        Ok(parsed.into())
    }
}

const PATH: &[Param] = &[Param::required("path")];

/// RFC 9535 JSONPath over the input, viewed as JSON.
pub struct JsonPathQuery {
    name: &'static str,
    cardinality: Cardinality,
}

impl JsonPathQuery {
    pub fn new(name: &'static str, cardinality: Cardinality) -> Self {
        Self { name, cardinality }
    }
}

impl Action for JsonPathQuery {
    fn name(&self) -> &'static str {
        self.name
    }

    fn params(&self) -> &'static [Param] {
        PATH
    }

    fn summary(&self) -> &'static str {
        match self.cardinality {
            Cardinality::One => "the single JSONPath match; 0 or several is recoverable",
            _ => "every JSONPath match, as a list",
        }
    }

    fn validate(&self, args: &BoundArgs) -> Result<(), ActionError> {
        compile_path(args.require_str("path")?).map(|_| ())
    }

    fn apply(
        &self,
        _cx: &mut ActionContext<'_>,
        input: Value,
        args: &BoundArgs,
    ) -> Result<Value, ActionError> {
        let path = args.require_str("path")?;
        let query = compile_path(path)?;
        let document = match &input {
            Value::Node(_) => return Err(ActionError::type_mismatch("JSON value", "node")),
            other => other.to_json(),
        };
        let matches = query
            .query(&document)
            .all()
            .into_iter()
            .map(|m| Value::from(m.clone()))
            .collect();
        self.cardinality.pick(&format!("jsonpath '{path}'"), matches)
    }
}

/// First JSON object or array embedded anywhere in a string.
pub struct FindJson;

impl FindJson {
    fn find(text: &str) -> Option<serde_json::Value> {
        text.char_indices()
            .filter(|(_, c)| *c == '{' || *c == '[')
            .find_map(|(start, _)| {
                let mut stream = serde_json::Deserializer::from_str(&text[start..])
                    .into_iter::<serde_json::Value>();
                match stream.next() {
                    Some(Ok(value)) if value.is_object() || value.is_array() => Some(value),
                    _ => None,
                }
            })
    }
}

impl Action for FindJson {
    fn name(&self) -> &'static str {
        "find_json"
    }

    fn summary(&self) -> &'static str {
        "first JSON object or array embedded in a string"
    }

    fn apply(
        &self,
        _cx: &mut ActionContext<'_>,
        input: Value,
        _args: &BoundArgs,
    ) -> Result<Value, ActionError> {
        let text = text_input(input)?;
        match Self::find(&text) {
            Some(found) => {
                debug!(array = found.is_array(), "found embedded json");
                Ok(found.into())
            }
            None => Err(ActionError::Malformed {
                what: "JSON",
                message: "no JSON object or array found in text".to_string(),
            }),
        }
    }
}

/// Pretty JSON with a 4-space indent. Non-ASCII is written as is.
pub fn to_pretty_json(value: &serde_json::Value) -> Result<String, ActionError> {
    let mut buf = Vec::new();
    let mut serializer =
        serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
    value
        .serialize(&mut serializer)
        .map_err(|e| ActionError::Malformed {
            what: "JSON",
            message: e.to_string(),
        })?;
    String::from_utf8(buf).map_err(|e| ActionError::Malformed {
        what: "UTF-8",
        message: e.to_string(),
    })
}

pub struct DebugDumpJson;

impl Action for DebugDumpJson {
    fn name(&self) -> &'static str {
        "debug_dump_json"
    }

    fn summary(&self) -> &'static str {
        "print the value as indented JSON; passes it through"
    }

    fn apply(
        &self,
        cx: &mut ActionContext<'_>,
        input: Value,
        _args: &BoundArgs,
    ) -> Result<Value, ActionError> {
        let pretty = to_pretty_json(&input.to_json())?;
        writeln!(cx.out, "{pretty}")?;
        Ok(input)
    }
}
