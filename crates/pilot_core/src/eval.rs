//! Restricted expression evaluation for the debug `evaluate` command.
//!
//! An expression sees exactly two free names, `document` and `window`, and
//! can only walk members, call a fixed set of read-only methods and index
//! lists. Nothing else from the host is reachable.

use serde_json::{json, Value};

use crate::dom::{Dom, NodeId};

/// Deepest nesting of parentheses, brackets and call arguments accepted.
pub const MAX_NESTING: usize = 64;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
}

#[derive(Debug, Clone, PartialEq)]
enum EvalValue {
    Window,
    Document,
    Location,
    Element(NodeId),
    List(Vec<NodeId>),
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
}

impl EvalValue {
    fn type_name(&self) -> &'static str {
        match self {
            EvalValue::Window => "Window",
            EvalValue::Document => "HTMLDocument",
            EvalValue::Location => "Location",
            EvalValue::Element(_) => "HTMLElement",
            EvalValue::List(_) => "NodeList",
            EvalValue::Str(_) => "string",
            EvalValue::Num(_) => "number",
            EvalValue::Bool(_) => "boolean",
            EvalValue::Null => "null",
        }
    }
}

/// Evaluates `source` against the page and renders the value as JSON.
pub fn evaluate(dom: &dyn Dom, source: &str) -> Result<Value, String> {
    let source = source.trim().trim_end_matches(';').trim();
    let source = source.strip_prefix("return ").unwrap_or(source);
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        dom,
        tokens: &tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expression()?;
    if let Some(extra) = tokens.get(parser.pos) {
        return Err(format!("unexpected token {extra:?}"));
    }
    Ok(to_json(dom, &value))
}

fn tokenize(source: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '"' | '\'' | '`' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    let Some(&ch) = chars.get(i) else {
                        return Err("unterminated string literal".to_string());
                    };
                    i += 1;
                    if ch == quote {
                        break;
                    }
                    if ch == '\\' {
                        let Some(&escaped) = chars.get(i) else {
                            return Err("unterminated string literal".to_string());
                        };
                        i += 1;
                        text.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            other => other,
                        });
                    } else {
                        text.push(ch);
                    }
                }
                tokens.push(Token::Str(text));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let number = literal
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number {literal}"))?;
                tokens.push(Token::Num(number));
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
                {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unsupported character {other:?}")),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    dom: &'a dyn Dom,
    tokens: &'a [Token],
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: &Token) -> Result<(), String> {
        match self.next() {
            Some(ref token) if token == expected => Ok(()),
            other => Err(format!("expected {expected:?}, found {other:?}")),
        }
    }

    fn expression(&mut self) -> Result<EvalValue, String> {
        if self.depth >= MAX_NESTING {
            return Err(format!("expression nested deeper than {MAX_NESTING} levels"));
        }
        self.depth += 1;
        let value = self.postfix();
        self.depth -= 1;
        value
    }

    fn postfix(&mut self) -> Result<EvalValue, String> {
        let mut value = self.primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    let Some(Token::Ident(name)) = self.next() else {
                        return Err("expected member name after '.'".to_string());
                    };
                    if self.peek() == Some(&Token::LParen) {
                        self.pos += 1;
                        let args = self.arguments()?;
                        value = self.call(&value, &name, &args)?;
                    } else {
                        value = self.member(&value, &name)?;
                    }
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let index = self.expression()?;
                    self.expect(&Token::RBracket)?;
                    value = self.index(&value, &index)?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn primary(&mut self) -> Result<EvalValue, String> {
        match self.next() {
            Some(Token::Ident(name)) => match name.as_str() {
                "document" => Ok(EvalValue::Document),
                "window" => Ok(EvalValue::Window),
                "null" | "undefined" => Ok(EvalValue::Null),
                "true" => Ok(EvalValue::Bool(true)),
                "false" => Ok(EvalValue::Bool(false)),
                other => Err(format!("{other} is not defined")),
            },
            Some(Token::Str(text)) => Ok(EvalValue::Str(text)),
            Some(Token::Num(n)) => Ok(EvalValue::Num(n)),
            Some(Token::LParen) => {
                let value = self.expression()?;
                self.expect(&Token::RParen)?;
                Ok(value)
            }
            other => Err(format!("unexpected {other:?}")),
        }
    }

    fn arguments(&mut self) -> Result<Vec<EvalValue>, String> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            match self.next() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => return Ok(args),
                other => return Err(format!("expected ',' or ')', found {other:?}")),
            }
        }
    }

    fn member(&self, target: &EvalValue, name: &str) -> Result<EvalValue, String> {
        let dom = self.dom;
        let value = match (target, name) {
            (EvalValue::Null, _) => {
                return Err(format!("cannot read properties of null (reading '{name}')"))
            }
            (EvalValue::Window, "document") => EvalValue::Document,
            (EvalValue::Window | EvalValue::Document, "location") => EvalValue::Location,
            (EvalValue::Window, "innerWidth") => EvalValue::Num(dom.viewport().0),
            (EvalValue::Window, "innerHeight") => EvalValue::Num(dom.viewport().1),
            (EvalValue::Window, "scrollX") => EvalValue::Num(dom.scroll_position().0),
            (EvalValue::Window, "scrollY") => EvalValue::Num(dom.scroll_position().1),
            (EvalValue::Document, "title") => EvalValue::Str(dom.title()),
            (EvalValue::Document, "URL") => EvalValue::Str(dom.location()),
            (EvalValue::Document, "body") => dom.body().map_or(EvalValue::Null, EvalValue::Element),
            (EvalValue::Document, "activeElement") => dom
                .focused()
                .or_else(|| dom.body())
                .map_or(EvalValue::Null, EvalValue::Element),
            (EvalValue::Location, "href") => EvalValue::Str(dom.location()),
            (EvalValue::Location, "host" | "hostname" | "pathname" | "search") => {
                let parsed = url::Url::parse(&dom.location()).ok();
                let part = parsed.map(|url| match name {
                    "pathname" => url.path().to_string(),
                    "search" => url.query().map(|q| format!("?{q}")).unwrap_or_default(),
                    _ => url.host_str().unwrap_or_default().to_string(),
                });
                EvalValue::Str(part.unwrap_or_default())
            }
            (EvalValue::Element(node), _) => element_member(dom, *node, name),
            (EvalValue::List(nodes), "length") => EvalValue::Num(nodes.len() as f64),
            (EvalValue::Str(text), "length") => EvalValue::Num(text.chars().count() as f64),
            _ => EvalValue::Null,
        };
        Ok(value)
    }

    fn call(&self, target: &EvalValue, name: &str, args: &[EvalValue]) -> Result<EvalValue, String> {
        let dom = self.dom;
        match (target, name) {
            (EvalValue::Document, "querySelector") => {
                let selector = string_arg(args, 0, name)?;
                Ok(dom
                    .query_selector(&selector)
                    .map_or(EvalValue::Null, EvalValue::Element))
            }
            (EvalValue::Document, "querySelectorAll") => {
                let selector = string_arg(args, 0, name)?;
                Ok(EvalValue::List(dom.query_selector_all(&selector)))
            }
            (EvalValue::Document, "getElementById") => {
                let id = string_arg(args, 0, name)?;
                Ok(dom
                    .query_selector_all("[id]")
                    .into_iter()
                    .find(|&node| dom.attribute(node, "id").as_deref() == Some(id.as_str()))
                    .map_or(EvalValue::Null, EvalValue::Element))
            }
            (EvalValue::Element(node), "getAttribute") => {
                let attr = string_arg(args, 0, name)?;
                Ok(dom
                    .attribute(*node, &attr)
                    .map_or(EvalValue::Null, EvalValue::Str))
            }
            (EvalValue::Element(node), "hasAttribute") => {
                let attr = string_arg(args, 0, name)?;
                Ok(EvalValue::Bool(dom.attribute(*node, &attr).is_some()))
            }
            (EvalValue::List(nodes), "item") => {
                let index = number_arg(args, 0, name)?;
                Ok(list_item(nodes, index))
            }
            (EvalValue::Str(text), "trim") => Ok(EvalValue::Str(text.trim().to_string())),
            (EvalValue::Str(text), "includes") => {
                let needle = string_arg(args, 0, name)?;
                Ok(EvalValue::Bool(text.contains(needle.as_str())))
            }
            (EvalValue::Location, "toString") => Ok(EvalValue::Str(dom.location())),
            (EvalValue::Null, _) => Err(format!("cannot read properties of null (reading '{name}')")),
            _ => Err(format!("{}.{name} is not a function", target.type_name())),
        }
    }

    fn index(&self, target: &EvalValue, index: &EvalValue) -> Result<EvalValue, String> {
        match (target, index) {
            (EvalValue::List(nodes), EvalValue::Num(i)) => Ok(list_item(nodes, *i)),
            (EvalValue::Str(text), EvalValue::Num(i)) => Ok(text
                .chars()
                .nth(*i as usize)
                .map_or(EvalValue::Null, |c| EvalValue::Str(c.to_string()))),
            (_, EvalValue::Str(name)) => self.member(target, name),
            _ => Err(format!("cannot index {}", target.type_name())),
        }
    }
}

fn element_member(dom: &dyn Dom, node: NodeId, name: &str) -> EvalValue {
    match name {
        "tagName" | "nodeName" => EvalValue::Str(dom.tag_name(node).to_ascii_uppercase()),
        "textContent" | "innerText" => EvalValue::Str(dom.inner_text(node)),
        "innerHTML" => EvalValue::Str(dom.inner_html(node)),
        "outerHTML" => EvalValue::Str(dom.outer_html(node)),
        "value" => dom.value(node).map_or(EvalValue::Null, EvalValue::Str),
        "id" => EvalValue::Str(dom.attribute(node, "id").unwrap_or_default()),
        "className" => EvalValue::Str(dom.attribute(node, "class").unwrap_or_default()),
        "isContentEditable" => EvalValue::Bool(dom.is_content_editable(node)),
        "parentElement" => dom.parent(node).map_or(EvalValue::Null, EvalValue::Element),
        "offsetWidth" => EvalValue::Num(dom.bounding_rect(node).width),
        "offsetHeight" => EvalValue::Num(dom.bounding_rect(node).height),
        _ => EvalValue::Null,
    }
}

fn list_item(nodes: &[NodeId], index: f64) -> EvalValue {
    if index < 0.0 {
        return EvalValue::Null;
    }
    nodes
        .get(index as usize)
        .copied()
        .map_or(EvalValue::Null, EvalValue::Element)
}

fn string_arg(args: &[EvalValue], index: usize, method: &str) -> Result<String, String> {
    match args.get(index) {
        Some(EvalValue::Str(text)) => Ok(text.clone()),
        Some(EvalValue::Num(n)) => Ok(n.to_string()),
        _ => Err(format!("{method} expects a string argument")),
    }
}

fn number_arg(args: &[EvalValue], index: usize, method: &str) -> Result<f64, String> {
    match args.get(index) {
        Some(EvalValue::Num(n)) => Ok(*n),
        _ => Err(format!("{method} expects a number argument")),
    }
}

fn describe_node(dom: &dyn Dom, node: NodeId) -> Value {
    let text: String = dom.inner_text(node).chars().take(200).collect();
    json!({
        "node": node,
        "tag": dom.tag_name(node),
        "id": dom.attribute(node, "id"),
        "text": text,
    })
}

fn to_json(dom: &dyn Dom, value: &EvalValue) -> Value {
    match value {
        EvalValue::Window => json!("[object Window]"),
        EvalValue::Document => json!("[object HTMLDocument]"),
        EvalValue::Location => json!(dom.location()),
        EvalValue::Element(node) => describe_node(dom, *node),
        EvalValue::List(nodes) => nodes.iter().map(|&n| describe_node(dom, n)).collect(),
        EvalValue::Str(text) => json!(text),
        EvalValue::Num(n) => json!(n),
        EvalValue::Bool(b) => json!(b),
        EvalValue::Null => Value::Null,
    }
}
