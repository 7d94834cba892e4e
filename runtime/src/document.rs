//! HTML documents as XPath-queryable trees.
//!
//! Markup is parsed with `scraper` (html5ever, so tag soup is repaired the
//! way a browser would) and copied into an `sxd_document` package, which is
//! what `sxd_xpath` evaluates against. While copying, link attributes are
//! resolved against the page's `<base href>` and the pipeline anchor.
//!
//! A [`NodeRef`] is an owned handle: the shared document plus the element
//! path from the root. Handles never mutate the document.

use std::fmt;
use std::rc::Rc;

use scraper::{ElementRef, Html, Node as HtmlNode, Selector};
use sxd_document::{dom, Package};
use sxd_xpath::nodeset::Node;
use sxd_xpath::{Context, Factory, Value as XPathValue, XPath};
use url::Url;

use crate::pipeline::error::ActionError;
use crate::pipeline::value::Value;

/// Attributes holding URLs that get resolved to absolute form.
const LINK_ATTRIBUTES: &[&str] = &[
    "action",
    "archive",
    "background",
    "cite",
    "codebase",
    "data",
    "formaction",
    "href",
    "icon",
    "longdesc",
    "lowsrc",
    "manifest",
    "poster",
    "profile",
    "src",
    "usemap",
];

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// Elements that start and end a line when flattened to text.
const BLOCK_ELEMENTS: &[&str] = &[
    "address",
    "article",
    "aside",
    "blockquote",
    "dd",
    "details",
    "dialog",
    "div",
    "dl",
    "dt",
    "fieldset",
    "figcaption",
    "figure",
    "footer",
    "form",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "header",
    "hr",
    "li",
    "main",
    "nav",
    "ol",
    "p",
    "pre",
    "section",
    "summary",
    "table",
    "tr",
    "ul",
];

/// Elements whose content is never text.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "template"];

/// A parsed HTML document.
pub struct Document {
    package: Package,
}

impl Document {
    /// Parse markup, resolving link attributes against `base`.
    ///
    /// Returns a handle to the document root.
    pub fn parse(markup: &str, base: Option<&Url>) -> NodeRef {
        let html = Html::parse_document(markup);
        let base = effective_base(&html, base);
        let package = Package::new();
        {
            let document = package.as_document();
            let source_root = html.root_element();
            let root = copy_element(&document, source_root, base.as_ref());
            document.root().append_child(root);
            copy_children(&document, root, source_root, base.as_ref());
        }
        tracing::debug!(
            bytes = markup.len(),
            base = base.as_ref().map(Url::as_str).unwrap_or("-"),
            "parsed HTML document"
        );
        NodeRef {
            doc: Rc::new(Document { package }),
            path: Vec::new(),
        }
    }
}

/// The `<base href>` of the page, resolved against the anchor.
fn effective_base(html: &Html, anchor: Option<&Url>) -> Option<Url> {
    let declared = Selector::parse("base[href]")
        .ok()
        .and_then(|selector| {
            html.select(&selector)
                .next()
                .and_then(|base| base.value().attr("href"))
                .map(|href| href.trim().to_string())
        });

    match (anchor, declared) {
        (Some(anchor), Some(href)) => anchor.join(&href).ok().or_else(|| Some(anchor.clone())),
        (Some(anchor), None) => Some(anchor.clone()),
        (None, Some(href)) => Url::parse(&href).ok(),
        (None, None) => None,
    }
}

fn copy_element<'d>(
    document: &dom::Document<'d>,
    source: ElementRef<'_>,
    base: Option<&Url>,
) -> dom::Element<'d> {
    let element = document.create_element(source.value().name());
    for (name, value) in source.value().attrs() {
        match base {
            Some(base) if LINK_ATTRIBUTES.contains(&name) => {
                let resolved = absolutize(base, value);
                element.set_attribute_value(name, &resolved);
            }
            _ => {
                element.set_attribute_value(name, value);
            }
        }
    }
    element
}

fn copy_children<'d>(
    document: &dom::Document<'d>,
    parent: dom::Element<'d>,
    source: ElementRef<'_>,
    base: Option<&Url>,
) {
    let mut pending = vec![(parent, source)];
    while let Some((parent, source)) = pending.pop() {
        for child in source.children() {
            match child.value() {
                HtmlNode::Text(text) => parent.append_child(document.create_text(text)),
                HtmlNode::Comment(comment) => {
                    parent.append_child(document.create_comment(comment))
                }
                HtmlNode::Element(_) => {
                    if let Some(source_child) = ElementRef::wrap(child) {
                        let copy = copy_element(document, source_child, base);
                        parent.append_child(copy);
                        pending.push((copy, source_child));
                    }
                }
                _ => {}
            }
        }
    }
}

fn absolutize(base: &Url, link: &str) -> String {
    let link = link.trim();
    match base.join(link) {
        Ok(url) => url.to_string(),
        Err(_) => link.to_string(),
    }
}

/// Compile an XPath 1.0 expression.
pub fn compile_xpath(expr: &str) -> Result<XPath, ActionError> {
    Factory::new()
        .build(expr)
        .map_err(|e| ActionError::Query(format!("invalid XPath '{expr}': {e}")))?
        .ok_or_else(|| ActionError::Query("empty XPath expression".to_string()))
}

/// Owned handle to the root or an element of a [`Document`].
#[derive(Clone)]
pub struct NodeRef {
    doc: Rc<Document>,
    /// Child indices from the document root down to the element.
    path: Vec<usize>,
}

impl NodeRef {
    fn stale() -> ActionError {
        ActionError::Query("node handle no longer resolves".to_string())
    }

    fn sibling(&self, path: Vec<usize>) -> NodeRef {
        NodeRef {
            doc: Rc::clone(&self.doc),
            path,
        }
    }

    /// Element name, or `None` for the document root.
    pub fn name(&self) -> Option<String> {
        let document = self.doc.package.as_document();
        match resolve(&document, &self.path)? {
            Node::Element(element) => Some(element.name().local_part().to_string()),
            _ => None,
        }
    }

    /// Short description for summaries.
    pub fn describe(&self) -> String {
        match self.name() {
            Some(name) => format!("<{name}> node"),
            None => "document".to_string(),
        }
    }

    /// Evaluate `xpath` with this node as the context node.
    ///
    /// Elements come back as nodes; attributes, text and comments as their
    /// string value; scalar results as a single value.
    pub fn select(&self, xpath: &XPath) -> Result<Vec<Value>, ActionError> {
        let document = self.doc.package.as_document();
        let node = resolve(&document, &self.path).ok_or_else(Self::stale)?;
        let context = Context::new();
        let result = xpath
            .evaluate(&context, node)
            .map_err(|e| ActionError::Query(e.to_string()))?;

        Ok(match result {
            XPathValue::Nodeset(nodes) => nodes
                .document_order()
                .into_iter()
                .map(|node| self.node_value(node))
                .collect(),
            XPathValue::String(s) => vec![Value::String(s)],
            XPathValue::Number(n) => vec![Value::from_f64(n)],
            XPathValue::Boolean(b) => vec![Value::Bool(b)],
        })
    }

    fn node_value(&self, node: Node<'_>) -> Value {
        match node {
            Node::Root(_) => Value::Node(self.sibling(Vec::new())),
            Node::Element(element) => Value::Node(self.sibling(path_of(element))),
            Node::Attribute(attribute) => Value::String(attribute.value().to_string()),
            Node::Text(text) => Value::String(text.text().to_string()),
            other => Value::String(other.string_value()),
        }
    }

    /// Flatten to text. `<br>` and block-level elements break lines.
    pub fn text(&self) -> String {
        let document = self.doc.package.as_document();
        let mut out = String::new();
        match resolve(&document, &self.path) {
            Some(Node::Element(element)) => flatten(element, &mut out),
            Some(Node::Root(root)) => {
                for child in root.children() {
                    if let dom::ChildOfRoot::Element(element) = child {
                        flatten(element, &mut out);
                    }
                }
            }
            _ => {}
        }
        out
    }

    /// Compact markup of this node.
    pub fn outer_html(&self) -> String {
        let mut out = String::new();
        self.for_each_element(|element| write_markup(element, &mut out));
        out
    }

    /// Indented markup, one tag or text run per line.
    pub fn pretty_html(&self) -> String {
        let mut out = String::new();
        self.for_each_element(|element| write_pretty(element, &mut out));
        out
    }

    fn for_each_element(&self, mut f: impl FnMut(dom::Element<'_>)) {
        let document = self.doc.package.as_document();
        match resolve(&document, &self.path) {
            Some(Node::Element(element)) => f(element),
            Some(Node::Root(root)) => {
                for child in root.children() {
                    if let dom::ChildOfRoot::Element(element) = child {
                        f(element);
                    }
                }
            }
            _ => {}
        }
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.doc, &other.doc) && self.path == other.path
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeRef({} at {:?})", self.describe(), self.path)
    }
}

fn resolve<'d>(document: &dom::Document<'d>, path: &[usize]) -> Option<Node<'d>> {
    let Some((first, rest)) = path.split_first() else {
        return Some(Node::Root(document.root()));
    };
    let mut element = match document.root().children().into_iter().nth(*first)? {
        dom::ChildOfRoot::Element(element) => element,
        _ => return None,
    };
    for idx in rest {
        element = match element.children().into_iter().nth(*idx)? {
            dom::ChildOfElement::Element(child) => child,
            _ => return None,
        };
    }
    Some(Node::Element(element))
}

fn path_of(element: dom::Element<'_>) -> Vec<usize> {
    let mut path = Vec::new();
    let mut current = element;
    loop {
        match current.parent() {
            Some(dom::ParentOfChild::Element(parent)) => {
                let idx = parent
                    .children()
                    .iter()
                    .position(|c| matches!(c, dom::ChildOfElement::Element(e) if *e == current))
                    .unwrap_or(0);
                path.push(idx);
                current = parent;
            }
            Some(dom::ParentOfChild::Root(root)) => {
                let idx = root
                    .children()
                    .iter()
                    .position(|c| matches!(c, dom::ChildOfRoot::Element(e) if *e == current))
                    .unwrap_or(0);
                path.push(idx);
                break;
            }
            None => break,
        }
    }
    path.reverse();
    path
}

fn break_line(out: &mut String) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
}

/// One step of a depth-first walk, in document order.
enum Visit<'d> {
    Open(dom::Element<'d>, usize),
    Close(dom::Element<'d>, usize),
    /// A non-element child, with its parent.
    Leaf(dom::Element<'d>, dom::ChildOfElement<'d>, usize),
}

/// Walk the subtree under `root` without recursing. Returning false from
/// `Visit::Open` skips that element's children and its `Close`.
fn walk<'d>(root: dom::Element<'d>, mut visit: impl FnMut(Visit<'d>) -> bool) {
    let mut stack = vec![Visit::Open(root, 0)];
    while let Some(step) = stack.pop() {
        let (element, depth) = match step {
            Visit::Open(element, depth) => (element, depth),
            other => {
                visit(other);
                continue;
            }
        };
        if !visit(Visit::Open(element, depth)) {
            continue;
        }
        stack.push(Visit::Close(element, depth));
        for child in element.children().into_iter().rev() {
            match child {
                dom::ChildOfElement::Element(child) => stack.push(Visit::Open(child, depth + 1)),
                other => stack.push(Visit::Leaf(element, other, depth + 1)),
            }
        }
    }
}

fn flatten(element: dom::Element<'_>, out: &mut String) {
    walk(element, |step| match step {
        Visit::Open(element, _) => {
            let name = element.name().local_part();
            if SKIPPED_ELEMENTS.contains(&name) {
                return false;
            }
            if name == "br" {
                out.push('\n');
                return false;
            }
            if BLOCK_ELEMENTS.contains(&name) {
                break_line(out);
            }
            true
        }
        Visit::Close(element, _) => {
            if BLOCK_ELEMENTS.contains(&element.name().local_part()) {
                break_line(out);
            }
            true
        }
        Visit::Leaf(_, dom::ChildOfElement::Text(text), _) => {
            out.push_str(text.text());
            true
        }
        Visit::Leaf(..) => true,
    });
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn escape_attribute(value: &str) -> String {
    escape_text(value).replace('"', "&quot;")
}

fn open_tag(element: dom::Element<'_>) -> String {
    let mut tag = format!("<{}", element.name().local_part());
    for attribute in element.attributes() {
        tag.push(' ');
        tag.push_str(attribute.name().local_part());
        tag.push_str("=\"");
        tag.push_str(&escape_attribute(attribute.value()));
        tag.push('"');
    }
    tag.push('>');
    tag
}

fn write_markup(element: dom::Element<'_>, out: &mut String) {
    walk(element, |step| match step {
        Visit::Open(element, _) => {
            out.push_str(&open_tag(element));
            !VOID_ELEMENTS.contains(&element.name().local_part())
        }
        Visit::Close(element, _) => {
            out.push_str("</");
            out.push_str(element.name().local_part());
            out.push('>');
            true
        }
        Visit::Leaf(parent, child, _) => {
            match child {
                dom::ChildOfElement::Text(text)
                    if SKIPPED_ELEMENTS.contains(&parent.name().local_part()) =>
                {
                    out.push_str(text.text())
                }
                dom::ChildOfElement::Text(text) => out.push_str(&escape_text(text.text())),
                dom::ChildOfElement::Comment(comment) => {
                    out.push_str("<!--");
                    out.push_str(comment.text());
                    out.push_str("-->");
                }
                _ => {}
            }
            true
        }
    });
}

fn write_pretty(element: dom::Element<'_>, out: &mut String) {
    walk(element, |step| match step {
        Visit::Open(element, depth) => {
            out.push_str(&" ".repeat(depth));
            out.push_str(&open_tag(element));
            out.push('\n');
            !VOID_ELEMENTS.contains(&element.name().local_part())
        }
        Visit::Close(element, depth) => {
            out.push_str(&" ".repeat(depth));
            out.push_str("</");
            out.push_str(element.name().local_part());
            out.push_str(">\n");
            true
        }
        Visit::Leaf(_, child, depth) => {
            match child {
                dom::ChildOfElement::Text(text) => {
                    let trimmed = text.text().trim();
                    if !trimmed.is_empty() {
                        out.push_str(&" ".repeat(depth));
                        out.push_str(&escape_text(trimmed));
                        out.push('\n');
                    }
                }
                dom::ChildOfElement::Comment(comment) => {
                    out.push_str(&" ".repeat(depth));
                    out.push_str("<!--");
                    out.push_str(comment.text());
                    out.push_str("-->\n");
                }
                _ => {}
            }
            true
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head><title>Listing</title></head><body>
        <div id="list">
          <a class="titlelink" href="/item?id=1">First</a>
          <a class="titlelink" href="https://other.org/x">Second</a>
          <img src="img/logo.png">
        </div>
        <p>Line one<br>Line two</p><p>Para &amp; more</p>
        <script>var hidden = 1;</script>
        </body></html>"#;

    fn page() -> NodeRef {
        let base = Url::parse("https://example.com/news/").unwrap();
        Document::parse(PAGE, Some(&base))
    }

    fn select(node: &NodeRef, expr: &str) -> Vec<Value> {
        node.select(&compile_xpath(expr).unwrap()).unwrap()
    }

    #[test]
    fn test_select_elements_in_document_order() {
        let root = page();
        let links = select(&root, r#"//a[@class="titlelink"]"#);
        assert_eq!(links.len(), 2);
        let first = links[0].as_node().unwrap();
        assert_eq!(first.name().as_deref(), Some("a"));
        assert_eq!(select(first, "text()"), vec![Value::from("First")]);
    }

    #[test]
    fn test_links_resolved_against_anchor() {
        let root = page();
        assert_eq!(
            select(&root, "//a/@href"),
            vec![
                Value::from("https://example.com/item?id=1"),
                Value::from("https://other.org/x"),
            ]
        );
        assert_eq!(
            select(&root, "//img/@src"),
            vec![Value::from("https://example.com/news/img/logo.png")]
        );
    }

    #[test]
    fn test_base_href_takes_precedence() {
        let anchor = Url::parse("https://example.com/a/b").unwrap();
        let root = Document::parse(
            r#"<html><head><base href="/static/"></head><body><a href="x.html">x</a></body></html>"#,
            Some(&anchor),
        );
        assert_eq!(
            select(&root, "//a/@href"),
            vec![Value::from("https://example.com/static/x.html")]
        );
    }

    #[test]
    fn test_links_untouched_without_base() {
        let root = Document::parse(r#"<a href="/rel">r</a>"#, None);
        assert_eq!(select(&root, "//a/@href"), vec![Value::from("/rel")]);
    }

    #[test]
    fn test_scalar_results() {
        let root = page();
        assert_eq!(
            select(&root, "count(//a)"),
            vec![Value::Number(2.into())]
        );
        assert_eq!(select(&root, "boolean(//table)"), vec![Value::Bool(false)]);
        assert_eq!(
            select(&root, "string(//title)"),
            vec![Value::from("Listing")]
        );
    }

    #[test]
    fn test_handles_to_same_element_are_equal() {
        let root = page();
        let a = select(&root, "//div[@id='list']");
        let b = select(&root, "//a[1]/..");
        assert_eq!(a, b);
        assert_ne!(a, select(&root, "//p[1]"));
    }

    #[test]
    fn test_text_breaks_lines_and_skips_scripts() {
        let root = page();
        let body = select(&root, "//body");
        let text = body[0].as_node().unwrap().text();
        assert!(text.contains("Line one\nLine two"));
        assert!(text.contains("Para & more"));
        assert!(!text.contains("hidden"));

        let paragraphs = select(&root, "//p");
        assert_eq!(paragraphs[0].as_node().unwrap().text(), "Line one\nLine two\n");
    }

    #[test]
    fn test_text_does_not_mutate_document() {
        let root = page();
        let before = root.outer_html();
        let _ = root.text();
        assert_eq!(root.outer_html(), before);
    }

    #[test]
    fn test_outer_html_escapes() {
        let root = Document::parse(r#"<p title="a&quot;b">1 &lt; 2</p>"#, None);
        let p = select(&root, "//p");
        assert_eq!(
            p[0].as_node().unwrap().outer_html(),
            r#"<p title="a&quot;b">1 &lt; 2</p>"#
        );
    }

    #[test]
    fn test_pretty_html_indents() {
        let root = Document::parse("<ul><li>one</li><li>two</li></ul>", None);
        let list = select(&root, "//ul");
        assert_eq!(
            list[0].as_node().unwrap().pretty_html(),
            "<ul>\n <li>\n  one\n </li>\n <li>\n  two\n </li>\n</ul>\n"
        );
    }

    #[test]
    fn test_deeply_nested_markup() {
        let depth = 20_000;
        let markup = format!("{}deep{}", "<div>".repeat(depth), "</div>".repeat(depth));
        let root = Document::parse(&markup, None);
        assert_eq!(root.text().trim(), "deep");

        let html = root.outer_html();
        assert!(html.starts_with("<html><head></head><body><div><div>"));
        assert!(html.contains("<div><div>deep</div></div>"));
        assert!(html.ends_with("</div></body></html>"));
        assert_eq!(html.matches("<div>").count(), depth);
    }

    #[test]
    fn test_invalid_xpath_is_fatal() {
        let err = compile_xpath("//a[").unwrap_err();
        assert!(!err.is_recoverable());
    }
}
