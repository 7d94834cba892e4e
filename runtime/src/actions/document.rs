//! HTML actions: parsing, XPath queries, text flattening, markup dumps.

use url::Url;

use super::{Action, ActionContext, BoundArgs, Cardinality, Param, Registry};
use crate::document::{compile_xpath, Document};
use crate::pipeline::error::ActionError;
use crate::pipeline::value::Value;

pub fn register(registry: &mut Registry) {
    registry
        .register(Html)
        .register(XPathQuery::new("xpath_all", Cardinality::All))
        .register(XPathQuery::new("xpath_one", Cardinality::One))
        .register(XPathQuery::new("xpath_first", Cardinality::First))
        .register(HtmlToText)
        .register(DebugDumpHtml);
}

/// Parse markup into a document, resolving links against the anchor.
pub struct Html;

impl Action for Html {
    fn name(&self) -> &'static str {
        "html"
    }

    fn summary(&self) -> &'static str {
        "parse markup into a document; links become absolute against the anchor"
    }

    fn apply(
        &self,
        cx: &mut ActionContext<'_>,
        input: Value,
        _args: &BoundArgs,
    ) -> Result<Value, ActionError> {
        let markup = match input {
            Value::String(s) => s,
            Value::Bytes(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            other => return Err(ActionError::type_mismatch("string", other.kind())),
        };
        let base = Url::parse(cx.anchor).ok();
        Ok(Value::Node(Document::parse(&markup, base.as_ref())))
    }
}

const PATH: &[Param] = &[Param::required("path")];

/// Evaluate an XPath expression relative to the input node.
pub struct XPathQuery {
    name: &'static str,
    cardinality: Cardinality,
}

impl XPathQuery {
    pub fn new(name: &'static str, cardinality: Cardinality) -> Self {
        Self { name, cardinality }
    }
}

impl Action for XPathQuery {
    fn name(&self) -> &'static str {
        self.name
    }

    fn params(&self) -> &'static [Param] {
        PATH
    }

    fn summary(&self) -> &'static str {
        match self.cardinality {
            Cardinality::All => "every XPath match, as a list",
            Cardinality::One => "the single XPath match; 0 or several is recoverable",
            Cardinality::First => "the first XPath match; none is recoverable",
        }
    }

    fn validate(&self, args: &BoundArgs) -> Result<(), ActionError> {
        compile_xpath(args.require_str("path")?).map(|_| ())
    }

    fn apply(
        &self,
        _cx: &mut ActionContext<'_>,
        input: Value,
        args: &BoundArgs,
    ) -> Result<Value, ActionError> {
        let path = args.require_str("path")?;
        let xpath = compile_xpath(path)?;
        let matches = input.as_node()?.select(&xpath)?;
        self.cardinality.pick(&format!("xpath '{path}'"), matches)
    }
}

/// Flatten a node to text without touching the document.
pub struct HtmlToText;

impl Action for HtmlToText {
    fn name(&self) -> &'static str {
        "html_to_text"
    }

    fn summary(&self) -> &'static str {
        "text content of a node; <br> and block elements break lines"
    }

    fn apply(
        &self,
        _cx: &mut ActionContext<'_>,
        input: Value,
        _args: &BoundArgs,
    ) -> Result<Value, ActionError> {
        Ok(Value::String(input.as_node()?.text()))
    }
}

pub struct DebugDumpHtml;

impl Action for DebugDumpHtml {
    fn name(&self) -> &'static str {
        "debug_dump_html"
    }

    fn summary(&self) -> &'static str {
        "print a node as indented markup; passes it through"
    }

    fn apply(
        &self,
        cx: &mut ActionContext<'_>,
        input: Value,
        _args: &BoundArgs,
    ) -> Result<Value, ActionError> {
        let markup = input.as_node()?.pretty_html();
        cx.out.write_all(markup.as_bytes())?;
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::bind;
    use crate::pipeline::expr::Args;

    const PAGE: &str = r#"<html><head><title>One</title></head>
        <body><a href="/a">A</a><a href="b">B</a><p>x<br>y</p></body></html>"#;

    fn apply(action: &dyn Action, input: Value, args: Args) -> Result<(Value, String), ActionError> {
        let bound = bind(action.params(), &args)?;
        let mut out = Vec::new();
        let mut cx = ActionContext {
            anchor: "https://example.com/dir/",
            out: &mut out,
        };
        let value = action.apply(&mut cx, input, &bound)?;
        Ok((value, String::from_utf8(out).unwrap()))
    }

    fn parsed() -> Value {
        apply(&Html, Value::from(PAGE), Args::default()).unwrap().0
    }

    fn path(p: &str) -> Args {
        Args::Positional(vec![p.into()])
    }

    #[test]
    fn test_html_resolves_links_against_anchor() {
        let query = XPathQuery::new("xpath_all", Cardinality::All);
        let (hrefs, _) = apply(&query, parsed(), path("//a/@href")).unwrap();
        assert_eq!(
            hrefs,
            Value::List(vec![
                "https://example.com/a".into(),
                "https://example.com/dir/b".into(),
            ])
        );
    }

    #[test]
    fn test_html_accepts_bytes_rejects_lists() {
        let (value, _) = apply(&Html, Value::Bytes(PAGE.as_bytes().to_vec()), Args::default()).unwrap();
        assert!(value.as_node().is_ok());

        let err = apply(&Html, Value::List(vec![]), Args::default()).unwrap_err();
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_xpath_cardinalities() {
        let one = XPathQuery::new("xpath_one", Cardinality::One);
        let (title, _) = apply(&one, parsed(), path("//title/text()")).unwrap();
        assert_eq!(title, Value::from("One"));

        let err = apply(&one, parsed(), path("//a")).unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(err.to_string(), "xpath '//a' found 2 matches, expected exactly 1");

        let first = XPathQuery::new("xpath_first", Cardinality::First);
        let (a, _) = apply(&first, parsed(), path("//a/text()")).unwrap();
        assert_eq!(a, Value::from("A"));
        assert!(apply(&first, parsed(), path("//table"))
            .unwrap_err()
            .is_recoverable());
    }

    #[test]
    fn test_xpath_requires_node_input() {
        let all = XPathQuery::new("xpath_all", Cardinality::All);
        let err = apply(&all, Value::from("<p>"), path("//p")).unwrap_err();
        assert!(matches!(err, ActionError::Type { expected: "node", .. }));
    }

    #[test]
    fn test_xpath_validate_rejects_bad_expression() {
        let all = XPathQuery::new("xpath_all", Cardinality::All);
        let bound = bind(all.params(), &path("//a[")).unwrap();
        assert!(matches!(all.validate(&bound), Err(ActionError::Query(_))));
    }

    #[test]
    fn test_html_to_text_breaks_lines() {
        let one = XPathQuery::new("xpath_one", Cardinality::One);
        let (p, _) = apply(&one, parsed(), path("//p")).unwrap();
        let (text, _) = apply(&HtmlToText, p, Args::default()).unwrap();
        assert_eq!(text, Value::from("x\ny\n"));
    }

    #[test]
    fn test_debug_dump_html_passes_through() {
        let doc = parsed();
        let (value, printed) = apply(&DebugDumpHtml, doc.clone(), Args::default()).unwrap();
        assert_eq!(value, doc);
        assert!(printed.starts_with("<html>\n <head>\n"));
        assert!(printed.contains("  <title>\n   One\n  </title>\n"));
    }
}
