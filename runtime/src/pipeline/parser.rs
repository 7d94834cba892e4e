//! Pipeline text parser: tokenizer plus recursive descent.
//!
//! Grammar:
//! ```text
//! pipeline    := expr (pipe-op expr)*
//! pipe-op     := "|?" | "|"
//! expr        := "(" pipeline ")" | map-call | fields-call | action-call
//! map-call    := "map" "(" pipeline ")"
//! fields-call := "fields" "(" ident "=" pipeline ("," ident "=" pipeline)* [","] ")"
//! action-call := ident [ "(" [arglist] ")" ]
//! arglist     := string ("," string)* [","]
//!              | ident "=" (string | dict) ("," ident "=" (string | dict))* [","]
//! dict        := "{" [string ":" string ("," string ":" string)* [","]] "}"
//! string      := '"' [^"]* '"' | "'" [^']* "'"
//! ident       := [a-z_][a-z0-9_]*
//! ```
//!
//! Pipe operators associate to the left. Parentheses, `map(...)` and
//! `fields(...)` nest at most 256 deep. Action names and arguments are
//! checked against the registry, so a pipeline that parses will not fail on
//! an unknown action or a malformed literal at run time.

use crate::actions::{bind, Registry};
use crate::pipeline::error::ParseError;
use crate::pipeline::expr::{ActionCall, Arg, Args, Expr, Fields};

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Str(String),
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Equals,
    Pipe,
    PipeOpt,
    Eof,
}

impl Tok {
    fn describe(&self) -> String {
        match self {
            Tok::Ident(name) => format!("'{name}'"),
            Tok::Str(s) => format!("string {s:?}"),
            Tok::LParen => "'('".into(),
            Tok::RParen => "')'".into(),
            Tok::LBrace => "'{'".into(),
            Tok::RBrace => "'}'".into(),
            Tok::Comma => "','".into(),
            Tok::Colon => "':'".into(),
            Tok::Equals => "'='".into(),
            Tok::Pipe => "'|'".into(),
            Tok::PipeOpt => "'|?'".into(),
            Tok::Eof => "end of input".into(),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    /// Byte offset in the source.
    at: usize,
}

/// Compile pipeline text into an expression tree.
pub fn parse(source: &str, registry: &Registry) -> Result<Expr, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
        depth: 0,
        registry,
    };
    let expr = parser.parse_pipeline()?;
    match parser.peek() {
        Tok::Eof => Ok(expr),
        Tok::RParen => Err(parser.error_here("unbalanced ')'")),
        other => {
            let message = format!("expected '|' or end of input, found {}", other.describe());
            Err(parser.error_here(message))
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_lowercase() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'
}

fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(at, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }

        let punct = match c {
            '(' => Some(Tok::LParen),
            ')' => Some(Tok::RParen),
            '{' => Some(Tok::LBrace),
            '}' => Some(Tok::RBrace),
            ',' => Some(Tok::Comma),
            ':' => Some(Tok::Colon),
            '=' => Some(Tok::Equals),
            _ => None,
        };
        if let Some(tok) = punct {
            chars.next();
            tokens.push(Token { tok, at });
            continue;
        }

        match c {
            '|' => {
                chars.next();
                let tok = if chars.next_if(|&(_, c)| c == '?').is_some() {
                    Tok::PipeOpt
                } else {
                    Tok::Pipe
                };
                tokens.push(Token { tok, at });
            }
            '"' | '\'' => {
                chars.next();
                let start = at + 1;
                let end = loop {
                    match chars.next() {
                        Some((i, ch)) if ch == c => break i,
                        Some(_) => {}
                        None => return Err(ParseError::at(source, at, "unterminated string")),
                    }
                };
                tokens.push(Token {
                    tok: Tok::Str(source[start..end].to_string()),
                    at,
                });
            }
            c if is_ident_start(c) => {
                let mut end = at;
                while let Some(&(i, ch)) = chars.peek() {
                    if !is_ident_char(ch) {
                        break;
                    }
                    end = i + ch.len_utf8();
                    chars.next();
                }
                tokens.push(Token {
                    tok: Tok::Ident(source[at..end].to_string()),
                    at,
                });
            }
            other => {
                return Err(ParseError::at(
                    source,
                    at,
                    format!("unexpected character {other:?}"),
                ))
            }
        }
    }

    tokens.push(Token {
        tok: Tok::Eof,
        at: source.len(),
    });
    Ok(tokens)
}

/// Deepest allowed nesting of `(...)`, `map(...)` and `fields(...)`.
const MAX_NESTING: usize = 256;

struct Parser<'s, 'r> {
    source: &'s str,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    registry: &'r Registry,
}

impl Parser<'_, '_> {
    fn peek(&self) -> &Tok {
        &self.tokens[self.pos].tok
    }

    fn peek_at(&self, offset: usize) -> &Tok {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].tok
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos].at
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if token.tok != Tok::Eof {
            self.pos += 1;
        }
        token
    }

    fn error_at(&self, at: usize, message: impl Into<String>) -> ParseError {
        ParseError::at(self.source, at, message)
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        self.error_at(self.offset(), message)
    }

    fn expect(&mut self, tok: Tok) -> Result<Token, ParseError> {
        if *self.peek() == tok {
            return Ok(self.advance());
        }
        let message = format!("expected {}, found {}", tok.describe(), self.peek().describe());
        Err(self.error_here(message))
    }

    fn expect_string(&mut self, what: &str) -> Result<String, ParseError> {
        match self.peek().clone() {
            Tok::Str(s) => {
                self.advance();
                Ok(s)
            }
            other => {
                let message = format!("expected {what}, found {}", other.describe());
                Err(self.error_here(message))
            }
        }
    }

    /// Consume a `,` unless `close` follows. Returns false at `close`.
    fn list_separator(&mut self, close: Tok) -> Result<bool, ParseError> {
        match self.peek().clone() {
            tok if tok == close => Ok(false),
            Tok::Comma => {
                self.advance();
                // Trailing comma.
                Ok(*self.peek() != close)
            }
            Tok::Eof => {
                let message = format!("expected {}, found end of input", close.describe());
                Err(self.error_here(message))
            }
            other => {
                let message = format!(
                    "expected ',' or {}, found {}",
                    close.describe(),
                    other.describe()
                );
                Err(self.error_here(message))
            }
        }
    }

    /// Enter a parenthesised sub-pipeline opened at `at`.
    fn descend(&mut self, at: usize) -> Result<(), ParseError> {
        if self.depth >= MAX_NESTING {
            let message = format!("pipeline nested deeper than {MAX_NESTING} levels");
            return Err(self.error_at(at, message));
        }
        self.depth += 1;
        Ok(())
    }

    fn nested_pipeline(&mut self, at: usize) -> Result<Expr, ParseError> {
        self.descend(at)?;
        let inner = self.parse_pipeline()?;
        self.depth -= 1;
        Ok(inner)
    }

    fn parse_pipeline(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_expr()?;
        loop {
            let optional = match self.peek() {
                Tok::Pipe => false,
                Tok::PipeOpt => true,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_expr()?;
            left = if optional {
                Expr::OptionalSequence(Box::new(left), Box::new(right))
            } else {
                Expr::Sequence(Box::new(left), Box::new(right))
            };
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        match self.peek().clone() {
            Tok::LParen => {
                let at = self.offset();
                self.advance();
                let inner = self.nested_pipeline(at)?;
                self.expect(Tok::RParen)?;
                Ok(inner)
            }
            Tok::Ident(name) if name == "map" => {
                self.advance();
                let at = self.expect(Tok::LParen)?.at;
                let inner = self.nested_pipeline(at)?;
                self.expect(Tok::RParen)?;
                Ok(Expr::Map(Box::new(inner)))
            }
            Tok::Ident(name) if name == "fields" => {
                self.advance();
                self.parse_fields()
            }
            Tok::Ident(name) => {
                let at = self.offset();
                self.advance();
                self.parse_action(name, at)
            }
            other => {
                let message = format!("expected an expression, found {}", other.describe());
                Err(self.error_here(message))
            }
        }
    }

    fn parse_fields(&mut self) -> Result<Expr, ParseError> {
        let open = self.expect(Tok::LParen)?.at;
        let mut named: Vec<(String, Expr)> = Vec::new();
        loop {
            let at = self.offset();
            let name = match self.peek().clone() {
                Tok::Ident(name) => {
                    self.advance();
                    name
                }
                other => {
                    let message = format!("expected a field name, found {}", other.describe());
                    return Err(self.error_here(message));
                }
            };
            if named.iter().any(|(existing, _)| *existing == name) {
                return Err(self.error_at(at, format!("duplicate field name '{name}'")));
            }
            self.expect(Tok::Equals)?;
            let expr = self.nested_pipeline(open)?;
            named.push((name, expr));
            if !self.list_separator(Tok::RParen)? {
                break;
            }
        }
        self.expect(Tok::RParen)?;
        let fields = Fields::new(named).map_err(|e| self.error_here(e.to_string()))?;
        Ok(Expr::Fields(fields))
    }

    fn parse_action(&mut self, name: String, at: usize) -> Result<Expr, ParseError> {
        let registry = self.registry;
        let action = registry
            .resolve(&name)
            .ok_or_else(|| self.error_at(at, format!("unknown action '{name}'")))?;

        let args = if *self.peek() == Tok::LParen {
            self.advance();
            let args = self.parse_args()?;
            self.expect(Tok::RParen)?;
            args
        } else {
            Args::default()
        };

        let bound = bind(action.params(), &args)
            .map_err(|e| self.error_at(at, format!("{name}: {e}")))?;
        action
            .validate(&bound)
            .map_err(|e| self.error_at(at, format!("{name}: {e}")))?;

        Ok(Expr::Action(ActionCall { name, args }))
    }

    fn parse_args(&mut self) -> Result<Args, ParseError> {
        if *self.peek() == Tok::RParen {
            return Ok(Args::default());
        }
        let named = matches!(
            (self.peek(), self.peek_at(1)),
            (Tok::Ident(_), Tok::Equals)
        );

        if !named {
            let mut args = Vec::new();
            loop {
                if matches!((self.peek(), self.peek_at(1)), (Tok::Ident(_), Tok::Equals)) {
                    return Err(self.error_here("cannot mix positional and named arguments"));
                }
                args.push(Arg::Str(self.expect_string("a quoted string")?));
                if !self.list_separator(Tok::RParen)? {
                    break;
                }
            }
            return Ok(Args::Positional(args));
        }

        let mut args = Vec::new();
        loop {
            let name = match self.peek().clone() {
                Tok::Ident(name) => {
                    self.advance();
                    name
                }
                Tok::Str(_) => {
                    return Err(self.error_here("cannot mix positional and named arguments"));
                }
                other => {
                    let message = format!("expected an argument name, found {}", other.describe());
                    return Err(self.error_here(message));
                }
            };
            self.expect(Tok::Equals)?;
            let value = if *self.peek() == Tok::LBrace {
                Arg::Dict(self.parse_dict()?)
            } else {
                Arg::Str(self.expect_string("a quoted string or '{'")?)
            };
            args.push((name, value));
            if !self.list_separator(Tok::RParen)? {
                break;
            }
        }
        Ok(Args::Named(args))
    }

    fn parse_dict(&mut self) -> Result<Vec<(String, String)>, ParseError> {
        self.expect(Tok::LBrace)?;
        let mut pairs = Vec::new();
        if *self.peek() != Tok::RBrace {
            loop {
                let key = self.expect_string("a quoted key")?;
                self.expect(Tok::Colon)?;
                let value = self.expect_string("a quoted value")?;
                pairs.push((key, value));
                if !self.list_separator(Tok::RBrace)? {
                    break;
                }
            }
        }
        self.expect(Tok::RBrace)?;
        Ok(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::pipeline::expr::{action, action_named, action_with, fields, map_each};

    fn registry() -> Registry {
        Registry::standard(&Config::default())
    }

    fn parse_ok(source: &str) -> Expr {
        parse(source, &registry()).unwrap()
    }

    fn parse_err(source: &str) -> ParseError {
        parse(source, &registry()).unwrap_err()
    }

    #[test]
    fn test_parse_single_action() {
        assert_eq!(parse_ok("html"), action("html"));
        assert_eq!(parse_ok("  html\n"), action("html"));
    }

    #[test]
    fn test_parse_pipe_left_associative() {
        let expr = parse_ok("request_get | html | html_to_text");
        assert_eq!(
            expr,
            (action("request_get") | action("html")) | action("html_to_text")
        );
    }

    #[test]
    fn test_parse_optional_pipe() {
        let expr = parse_ok("html |? xpath_one('//title')");
        assert_eq!(expr, action("html") % action_with("xpath_one", ["//title"]));
    }

    #[test]
    fn test_parse_grouping_nests_right() {
        let expr = parse_ok("html | (xpath_all('//a') | one)");
        assert_eq!(
            expr,
            action("html") | (action_with("xpath_all", ["//a"]) | action("one"))
        );
    }

    #[test]
    fn test_parse_whitespace_insensitive() {
        let spaced = parse_ok("xpath_one( \"x\" )  |\n  html_to_text");
        let tight = parse_ok("xpath_one(\"x\")|html_to_text");
        assert_eq!(spaced, tight);
    }

    #[test]
    fn test_parse_both_quote_styles() {
        let expr = parse_ok(r#"xpath_all('//a[@class="titlelink"]')"#);
        assert_eq!(
            expr,
            action_with("xpath_all", [r#"//a[@class="titlelink"]"#])
        );
        assert_eq!(parse_ok("rstrip(\"';\")"), action_with("rstrip", ["';"]));
    }

    #[test]
    fn test_parse_map_and_fields() {
        let expr = parse_ok(
            r#"html | xpath_all('//a[@class="titlelink"]')
               | map(fields(title=xpath_one("text()"), url=xpath_one("@href"),))"#,
        );
        let record = fields([
            ("title", action_with("xpath_one", ["text()"])),
            ("url", action_with("xpath_one", ["@href"])),
        ])
        .unwrap();
        assert_eq!(
            expr,
            action("html")
                | action_with("xpath_all", [r#"//a[@class="titlelink"]"#])
                | map_each(record)
        );
    }

    #[test]
    fn test_parse_named_args_with_dict() {
        let expr = parse_ok(r#"request_get(headers={"Accept": "text/html", 'X-Token': "abc",})"#);
        assert_eq!(
            expr,
            action_named(
                "request_get",
                [(
                    "headers",
                    Arg::Dict(vec![
                        ("Accept".into(), "text/html".into()),
                        ("X-Token".into(), "abc".into()),
                    ])
                )]
            )
        );
    }

    #[test]
    fn test_parse_empty_parens_take_defaults() {
        assert_eq!(parse_ok("rstrip()"), action("rstrip"));
        assert_eq!(
            parse_ok("request_get(headers={})"),
            action_named("request_get", [("headers", Arg::Dict(vec![]))])
        );
    }

    #[test]
    fn test_parse_display_round_trip() {
        let source = r#"request_get | html | xpath_all('//a[@class="x"]') | map(fields(title=xpath_one("text()") |? rstrip, url=xpath_one("@href")))"#;
        let expr = parse_ok(source);
        assert!(expr.has_text_form());
        assert_eq!(parse_ok(&expr.to_string()), expr);

        let unquotable = action_with("constantly", [r#"it's "quoted""#]);
        assert!(!unquotable.has_text_form());
        assert!(parse(&unquotable.to_string(), &registry()).is_err());
    }

    #[test]
    fn test_parse_error_empty_input() {
        let err = parse_err("   ");
        assert_eq!(err.message, "expected an expression, found end of input");
        assert_eq!(err.position, 3);
    }

    #[test]
    fn test_parse_error_unbalanced_paren() {
        let source = "html | xpath_one('//title'";
        let err = parse_err(source);
        assert_eq!(err.position, source.len());
        assert_eq!(err.message, "expected ')', found end of input");

        let err = parse_err("html)");
        assert_eq!(err.position, 4);
        assert_eq!(err.message, "unbalanced ')'");
    }

    #[test]
    fn test_parse_error_missing_closer() {
        let source = "fields(a=html";
        let err = parse_err(source);
        assert_eq!(err.message, "expected ')', found end of input");
        assert_eq!(err.position, source.len());

        let source = "request_get(headers={'a': 'b'";
        let err = parse_err(source);
        assert_eq!(err.message, "expected '}', found end of input");
        assert_eq!(err.position, source.len());

        let err = parse_err("xpath_one('//a' '//b')");
        assert_eq!(err.message, "expected ',' or ')', found string \"//b\"");
        assert_eq!(err.position, 16);
    }

    #[test]
    fn test_parse_nesting_limit() {
        let nested = |depth: usize| format!("{}html{}", "(".repeat(depth), ")".repeat(depth));
        assert_eq!(parse_ok(&nested(MAX_NESTING)), action("html"));

        let err = parse_err(&nested(100_000));
        assert_eq!(err.position, MAX_NESTING);
        assert!(err.message.starts_with("pipeline nested deeper than"));

        let maps = format!("{}html{}", "map(".repeat(MAX_NESTING + 1), ")".repeat(MAX_NESTING + 1));
        assert_eq!(parse_err(&maps).position, MAX_NESTING * 4 + 3);
    }

    #[test]
    fn test_parse_error_unknown_action() {
        let err = parse_err("html |\n  xpath('//a')");
        assert_eq!(err.message, "unknown action 'xpath'");
        assert_eq!((err.line, err.column), (2, 3));
    }

    #[test]
    fn test_parse_error_mixed_args() {
        let err = parse_err("request_get(headers={}, 'x')");
        assert_eq!(err.message, "cannot mix positional and named arguments");

        let err = parse_err("xpath_one('//a', path='//b')");
        assert_eq!(err.message, "cannot mix positional and named arguments");
    }

    #[test]
    fn test_parse_error_argument_shape() {
        let err = parse_err("xpath_one");
        assert_eq!(
            err.message,
            "xpath_one: invalid arguments: missing required argument 'path'"
        );
        assert!(parse(r"xpath_one('a', 'b')", &registry()).is_err());
        assert!(parse(r"request_get(headers='x')", &registry()).is_err());
    }

    #[test]
    fn test_parse_error_invalid_query_literal() {
        let err = parse_err("html | xpath_all('//a[')");
        assert_eq!(err.position, 7);
        assert!(err.message.starts_with("xpath_all: "));

        let err = parse_err("json | jsonpath_one('$[')");
        assert!(err.message.starts_with("jsonpath_one: "));
    }

    #[test]
    fn test_parse_error_duplicate_field() {
        let err = parse_err("fields(a=html, a=json)");
        assert_eq!(err.message, "duplicate field name 'a'");
        assert_eq!(err.position, 15);
    }

    #[test]
    fn test_parse_error_unterminated_string() {
        let err = parse_err("constantly('oops)");
        assert_eq!(err.message, "unterminated string");
        assert_eq!(err.position, 11);
    }

    #[test]
    fn test_parse_error_bad_character() {
        let err = parse_err("html // json");
        assert_eq!(err.message, "unexpected character '/'");
        assert_eq!(err.position, 5);

        let err = parse_err("HTML");
        assert_eq!(err.position, 0);
    }

    #[test]
    fn test_parse_error_dangling_pipe() {
        let err = parse_err("html |");
        assert_eq!(err.message, "expected an expression, found end of input");
    }

    #[test]
    fn test_parse_error_trailing_tokens() {
        let err = parse_err("html json");
        assert_eq!(err.message, "expected '|' or end of input, found 'json'");
    }
}
