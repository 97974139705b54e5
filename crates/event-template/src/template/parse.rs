//! Builds a [`Tree`] from tokens.
//!
//! Function names are resolved against the registry while parsing, so
//! calling an unknown function is a syntax error, as is using a variable
//! that was never declared.

use std::collections::HashMap;

use crate::error::ParseError;

use super::funcs::Funcs;
use super::lexer::{lex, Token, TokenKind};
use super::node::{Arg, Branch, Command, Node, Pipeline, Tree};
use super::value::Value;

/// Deepest allowed nesting of control structures and parentheses.
const MAX_NESTING: usize = 500;

const KEYWORDS: [&str; 10] = [
    "block", "break", "continue", "define", "else", "end", "if", "range", "template", "with",
];

pub(crate) fn parse(source: &str, funcs: &Funcs) -> Result<Tree, ParseError> {
    let mut parser = Parser {
        tokens: lex(source)?,
        pos: 0,
        funcs,
        vars: vec!["$".to_string()],
        range_depth: 0,
        depth: 0,
        defines: HashMap::new(),
    };

    let (root, end) = parser.list(true)?;
    match end {
        End::Eof => Ok(Tree {
            root,
            defines: parser.defines,
        }),
        End::End(line) => Err(ParseError::new(line, "unexpected {{end}}")),
        End::Else(line) => Err(ParseError::new(line, "unexpected {{else}}")),
    }
}

/// What stopped a node list.
enum End {
    Eof,
    End(usize),
    Else(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BranchKind {
    If,
    Range,
    With,
}

impl BranchKind {
    fn name(self) -> &'static str {
        match self {
            BranchKind::If => "if",
            BranchKind::Range => "range",
            BranchKind::With => "with",
        }
    }

    fn node(self, branch: Branch) -> Node {
        match self {
            BranchKind::If => Node::If(branch),
            BranchKind::Range => Node::Range(branch),
            BranchKind::With => Node::With(branch),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Close {
    Delim,
    Paren,
}

struct Parser<'a> {
    /// Always ends with `Eof`; `pos` never moves past it.
    tokens: Vec<Token>,
    pos: usize,
    funcs: &'a Funcs,
    vars: Vec<String>,
    range_depth: usize,
    depth: usize,
    defines: HashMap<String, Vec<Node>>,
}

impl<'a> Parser<'a> {
    fn list(&mut self, top: bool) -> Result<(Vec<Node>, End), ParseError> {
        let mut nodes = Vec::new();
        loop {
            let tok = self.next();
            match tok.kind {
                TokenKind::Text(text) => nodes.push(Node::Text(text)),
                TokenKind::Eof => return Ok((nodes, End::Eof)),
                TokenKind::LeftDelim => {
                    self.skip_space();
                    let head = self.peek().clone();
                    let keyword = match &head.kind {
                        TokenKind::Identifier(word) if KEYWORDS.contains(&word.as_str()) => {
                            word.as_str()
                        }
                        _ => {
                            nodes.push(Node::Action(self.pipeline("command", Close::Delim)?));
                            continue;
                        }
                    };
                    self.bump();
                    match keyword {
                        "end" => {
                            self.expect_close("end")?;
                            return Ok((nodes, End::End(head.line)));
                        }
                        "else" => return Ok((nodes, End::Else(head.line))),
                        "if" => nodes.push(self.branch(BranchKind::If, head.line)?),
                        "range" => nodes.push(self.branch(BranchKind::Range, head.line)?),
                        "with" => nodes.push(self.branch(BranchKind::With, head.line)?),
                        "template" => nodes.push(self.template(head.line)?),
                        "block" => nodes.push(self.block(head.line)?),
                        "define" if top => self.define(head.line)?,
                        "break" | "continue" => {
                            if self.range_depth == 0 {
                                return Err(ParseError::new(
                                    head.line,
                                    format!("{{{{{keyword}}}}} outside {{{{range}}}}"),
                                ));
                            }
                            self.expect_close(keyword)?;
                            nodes.push(if keyword == "break" {
                                Node::Break
                            } else {
                                Node::Continue
                            });
                        }
                        other => {
                            return Err(ParseError::new(
                                head.line,
                                format!("unexpected <{other}> in command"),
                            ))
                        }
                    }
                }
                other => {
                    return Err(ParseError::new(
                        tok.line,
                        format!("unexpected {other} in input"),
                    ))
                }
            }
        }
    }

    /// `if`, `range` or `with`, after the keyword.
    fn branch(&mut self, kind: BranchKind, line: usize) -> Result<Node, ParseError> {
        self.enter(line)?;
        let mark = self.vars.len();

        let pipe = self.pipeline(kind.name(), Close::Delim)?;
        if kind == BranchKind::Range {
            self.range_depth += 1;
        }
        let (list, end) = self.list(false)?;
        if kind == BranchKind::Range {
            self.range_depth -= 1;
        }

        let else_list = match end {
            End::End(_) => None,
            End::Eof => {
                return Err(ParseError::new(
                    line,
                    format!("unexpected EOF in {{{{{}}}}}", kind.name()),
                ))
            }
            End::Else(else_line) => {
                self.skip_space();
                let chained = match &self.peek().kind {
                    TokenKind::Identifier(word) => {
                        word == kind.name() && kind != BranchKind::Range
                    }
                    _ => false,
                };
                if chained {
                    // `else if` / `else with` shares the enclosing `end`.
                    self.bump();
                    Some(vec![self.branch(kind, else_line)?])
                } else {
                    self.expect_close("else")?;
                    let (else_list, end) = self.list(false)?;
                    if !matches!(end, End::End(_)) {
                        return Err(ParseError::new(
                            else_line,
                            format!("expected {{{{end}}}} to close {{{{{}}}}}", kind.name()),
                        ));
                    }
                    Some(else_list)
                }
            }
        };

        self.vars.truncate(mark);
        self.leave();
        Ok(kind.node(Branch {
            pipe,
            list,
            else_list,
        }))
    }

    /// `{{template "name"}}` or `{{template "name" pipeline}}`.
    fn template(&mut self, line: usize) -> Result<Node, ParseError> {
        let name = self.template_name("template clause")?;
        self.skip_space();
        let pipe = if self.peek().kind == TokenKind::RightDelim {
            self.bump();
            None
        } else {
            Some(self.pipeline("template clause", Close::Delim)?)
        };
        Ok(Node::Template { line, name, pipe })
    }

    /// `{{define "name"}} ... {{end}}`
    fn define(&mut self, line: usize) -> Result<(), ParseError> {
        let name = self.template_name("define clause")?;
        self.expect_close("define clause")?;
        let body = self.body(line, "define")?;
        self.add_define(line, name, body)
    }

    /// `{{block "name" pipeline}} ... {{end}}`: defines and calls in place.
    fn block(&mut self, line: usize) -> Result<Node, ParseError> {
        let name = self.template_name("block clause")?;
        let pipe = self.pipeline("block clause", Close::Delim)?;
        let body = self.body(line, "block")?;
        self.add_define(line, name.clone(), body)?;
        Ok(Node::Template {
            line,
            name,
            pipe: Some(pipe),
        })
    }

    /// A template body, parsed with its own variable scope.
    fn body(&mut self, line: usize, clause: &str) -> Result<Vec<Node>, ParseError> {
        self.enter(line)?;
        let vars = std::mem::replace(&mut self.vars, vec!["$".to_string()]);
        let range_depth = std::mem::take(&mut self.range_depth);
        let (body, end) = self.list(false)?;
        self.vars = vars;
        self.range_depth = range_depth;
        self.leave();

        match end {
            End::End(_) => Ok(body),
            _ => Err(ParseError::new(
                line,
                format!("unexpected EOF in {{{{{clause}}}}}"),
            )),
        }
    }

    fn add_define(&mut self, line: usize, name: String, body: Vec<Node>) -> Result<(), ParseError> {
        if self.defines.contains_key(&name) {
            return Err(ParseError::new(
                line,
                format!("multiple definition of template {name:?}"),
            ));
        }
        self.defines.insert(name, body);
        Ok(())
    }

    fn template_name(&mut self, context: &str) -> Result<String, ParseError> {
        let tok = self.next_non_space();
        match tok.kind {
            TokenKind::String(name) => Ok(name),
            other => Err(ParseError::new(
                tok.line,
                format!("unexpected {other} in {context}"),
            )),
        }
    }

    fn pipeline(&mut self, context: &str, close: Close) -> Result<Pipeline, ParseError> {
        self.skip_space();
        let line = self.peek().line;
        let (decl, is_assign) = self.declarations(context)?;
        for var in &decl {
            if is_assign {
                self.use_var(var, line)?;
            } else {
                self.vars.push(var.clone());
            }
        }

        let mut cmds = Vec::new();
        loop {
            self.skip_space();
            let tok = self.peek().clone();
            match (&tok.kind, close) {
                (TokenKind::RightDelim, Close::Delim) | (TokenKind::RightParen, Close::Paren) => {
                    self.bump();
                    break;
                }
                (TokenKind::RightDelim | TokenKind::RightParen | TokenKind::Eof, _) => {
                    return Err(ParseError::new(
                        tok.line,
                        format!("unexpected {} in {context}", tok.kind),
                    ));
                }
                _ => {
                    let (cmd, piped) = self.command()?;
                    cmds.push(cmd);
                    if piped {
                        self.skip_space();
                        if matches!(
                            self.peek().kind,
                            TokenKind::RightDelim | TokenKind::RightParen
                        ) {
                            return Err(ParseError::new(line, "missing command after \"|\""));
                        }
                    }
                }
            }
        }

        if cmds.is_empty() {
            return Err(ParseError::new(line, format!("missing value for {context}")));
        }
        for (i, cmd) in cmds.iter().enumerate().skip(1) {
            if matches!(cmd.args.first(), Some(Arg::Dot | Arg::Literal(_))) {
                return Err(ParseError::new(
                    line,
                    format!("non executable command in pipeline stage {}", i + 1),
                ));
            }
        }

        Ok(Pipeline {
            line,
            is_assign,
            decl,
            cmds,
        })
    }

    /// `$x :=`, `$x =`, and in `range` also `$i, $e :=`. Leaves the
    /// position untouched when the pipeline declares nothing.
    fn declarations(&mut self, context: &str) -> Result<(Vec<String>, bool), ParseError> {
        let TokenKind::Variable(first) = self.peek().kind.clone() else {
            return Ok((Vec::new(), false));
        };
        let save = self.pos;
        self.bump();
        self.skip_space();

        match self.peek().kind {
            TokenKind::Declare | TokenKind::Assign => {
                let is_assign = self.peek().kind == TokenKind::Assign;
                self.bump();
                Ok((vec![first], is_assign))
            }
            TokenKind::Comma if context == "range" => {
                self.bump();
                let tok = self.next_non_space();
                let TokenKind::Variable(second) = tok.kind else {
                    return Err(ParseError::new(
                        tok.line,
                        format!("unexpected {} in range declaration", tok.kind),
                    ));
                };
                let op = self.next_non_space();
                let is_assign = match op.kind {
                    TokenKind::Declare => false,
                    TokenKind::Assign => true,
                    other => {
                        return Err(ParseError::new(
                            op.line,
                            format!("unexpected {other} in range declaration"),
                        ))
                    }
                };
                Ok((vec![first, second], is_assign))
            }
            _ => {
                self.pos = save;
                Ok((Vec::new(), false))
            }
        }
    }

    /// One command. Returns whether it was followed by `|`.
    fn command(&mut self) -> Result<(Command, bool), ParseError> {
        let mut args = Vec::new();
        let piped = loop {
            self.skip_space();
            if let Some(arg) = self.operand()? {
                args.push(arg);
            }
            let tok = self.peek().clone();
            match tok.kind {
                TokenKind::Space => self.bump(),
                TokenKind::RightDelim | TokenKind::RightParen => break false,
                TokenKind::Pipe => {
                    self.bump();
                    break true;
                }
                other => {
                    return Err(ParseError::new(
                        tok.line,
                        format!("unexpected {other} in operand"),
                    ))
                }
            }
        };

        if args.is_empty() {
            return Err(ParseError::new(self.peek().line, "empty command"));
        }
        Ok((Command { args }, piped))
    }

    /// A term followed by any directly attached `.Field` accesses.
    fn operand(&mut self) -> Result<Option<Arg>, ParseError> {
        let line = self.peek().line;
        let Some(term) = self.term()? else {
            return Ok(None);
        };

        let mut fields = Vec::new();
        loop {
            let name = match &self.peek().kind {
                TokenKind::Field(name) => name.clone(),
                _ => break,
            };
            fields.push(name);
            self.bump();
        }
        if fields.is_empty() {
            return Ok(Some(term));
        }

        let arg = match term {
            Arg::Field(mut path) => {
                path.extend(fields);
                Arg::Field(path)
            }
            Arg::Variable(name, mut path) => {
                path.extend(fields);
                Arg::Variable(name, path)
            }
            term @ (Arg::Dot | Arg::Literal(_)) => {
                return Err(ParseError::new(
                    line,
                    format!("unexpected . after term {term}"),
                ))
            }
            term => Arg::Chain(Box::new(term), fields),
        };
        Ok(Some(arg))
    }

    fn term(&mut self) -> Result<Option<Arg>, ParseError> {
        let tok = self.peek().clone();
        let arg = match tok.kind {
            TokenKind::Identifier(name) => {
                if KEYWORDS.contains(&name.as_str()) {
                    return Ok(None);
                }
                if !self.funcs.is_defined(&name) {
                    return Err(ParseError::new(
                        tok.line,
                        format!("function {name:?} not defined"),
                    ));
                }
                Arg::Identifier(name)
            }
            TokenKind::Dot => Arg::Dot,
            TokenKind::Nil => Arg::Literal(Value::Nil),
            TokenKind::Bool(b) => Arg::Literal(Value::Bool(b)),
            TokenKind::String(s) => Arg::Literal(Value::String(s)),
            TokenKind::Char(c) => Arg::Literal(Value::Int(i64::from(u32::from(c)))),
            TokenKind::Number(text) => match parse_number(&text) {
                Some(value) => Arg::Literal(value),
                None => {
                    return Err(ParseError::new(
                        tok.line,
                        format!("illegal number syntax: {text:?}"),
                    ))
                }
            },
            TokenKind::Field(name) => Arg::Field(vec![name]),
            TokenKind::Variable(name) => {
                self.use_var(&name, tok.line)?;
                Arg::Variable(name, Vec::new())
            }
            TokenKind::LeftParen => {
                self.bump();
                self.enter(tok.line)?;
                let pipe = self.pipeline("parenthesized pipeline", Close::Paren)?;
                self.leave();
                return Ok(Some(Arg::Pipe(pipe)));
            }
            _ => return Ok(None),
        };
        self.bump();
        Ok(Some(arg))
    }

    fn use_var(&self, name: &str, line: usize) -> Result<(), ParseError> {
        if self.vars.iter().any(|v| v == name) {
            Ok(())
        } else {
            Err(ParseError::new(line, format!("undefined variable {name:?}")))
        }
    }

    fn expect_close(&mut self, context: &str) -> Result<(), ParseError> {
        let tok = self.next_non_space();
        match tok.kind {
            TokenKind::RightDelim => Ok(()),
            other => Err(ParseError::new(
                tok.line,
                format!("unexpected {other} in {context}"),
            )),
        }
    }

    fn enter(&mut self, line: usize) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(ParseError::new(line, "template nesting too deep"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn bump(&mut self) {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn next(&mut self) -> Token {
        let tok = self.peek().clone();
        self.bump();
        tok
    }

    fn skip_space(&mut self) {
        while self.peek().kind == TokenKind::Space {
            self.bump();
        }
    }

    fn next_non_space(&mut self) -> Token {
        self.skip_space();
        self.next()
    }
}

/// Parses an integer (decimal, `0x`, `0o`, `0b` or leading-zero octal) or a
/// float. Underscores between digits are ignored.
fn parse_number(text: &str) -> Option<Value> {
    let cleaned: String = text.chars().filter(|&c| c != '_').collect();
    let (negative, digits) = match cleaned.as_bytes().first() {
        Some(b'-') => (true, &cleaned[1..]),
        Some(b'+') => (false, &cleaned[1..]),
        _ => (false, cleaned.as_str()),
    };

    let radix_digits = |prefixes: [&str; 2]| {
        prefixes
            .iter()
            .find_map(|prefix| digits.strip_prefix(prefix))
    };
    let int = if let Some(hex) = radix_digits(["0x", "0X"]) {
        i64::from_str_radix(hex, 16).ok()
    } else if let Some(oct) = radix_digits(["0o", "0O"]) {
        i64::from_str_radix(oct, 8).ok()
    } else if let Some(bin) = radix_digits(["0b", "0B"]) {
        i64::from_str_radix(bin, 2).ok()
    } else if digits.len() > 1 && digits.starts_with('0') && digits.bytes().all(|b| b.is_ascii_digit()) {
        i64::from_str_radix(&digits[1..], 8).ok()
    } else if digits.bytes().all(|b| b.is_ascii_digit()) {
        digits.parse::<i64>().ok()
    } else {
        None
    };

    if let Some(i) = int {
        return Some(Value::Int(if negative { -i } else { i }));
    }
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-')) {
        return None;
    }
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(Value::Float)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn funcs() -> Funcs {
        let mut funcs = Funcs::builtin();
        funcs.add("upper", |_| Ok(Value::Nil));
        funcs
    }

    fn parse_ok(source: &str) -> Tree {
        parse(source, &funcs()).unwrap()
    }

    fn parse_err(source: &str) -> String {
        parse(source, &funcs()).unwrap_err().message
    }

    fn action(tree: &Tree) -> &Pipeline {
        match &tree.root[0] {
            Node::Action(pipe) => pipe,
            other => panic!("expected action, got {other:?}"),
        }
    }

    #[test]
    fn test_field_chain_is_one_argument() {
        let tree = parse_ok("{{ .Check.Name }}");
        assert_eq!(action(&tree).to_string(), ".Check.Name");
        assert_eq!(action(&tree).cmds[0].args.len(), 1);
    }

    #[test]
    fn test_pipeline_with_function_arguments() {
        let tree = parse_ok(r#"{{ .Check.Name | printf "%s-%d" 3 }}"#);
        let pipe = action(&tree);
        assert_eq!(pipe.cmds.len(), 2);
        assert_eq!(pipe.cmds[1].args.len(), 3);
        assert_eq!(pipe.to_string(), r#".Check.Name | printf "%s-%d" 3"#);
    }

    #[test]
    fn test_parenthesized_method_chain() {
        let tree = parse_ok(r#"{{(len .X).Format "2006"}}"#);
        let pipe = action(&tree);
        assert!(matches!(pipe.cmds[0].args[0], Arg::Chain(_, _)));
        assert_eq!(pipe.to_string(), r#"(len .X).Format "2006""#);
    }

    #[test]
    fn test_control_structures() {
        let tree = parse_ok(
            "{{ if .A }}a{{ else if .B }}b{{ else }}c{{ end }}\
             {{ range $i, $e := .L }}{{ $i }}{{ break }}{{ end }}\
             {{ with .C }}{{ . }}{{ end }}",
        );
        assert_eq!(tree.root.len(), 3);
        match &tree.root[0] {
            Node::If(branch) => {
                let nested = branch.else_list.as_ref().unwrap();
                assert!(matches!(nested[0], Node::If(_)));
            }
            other => panic!("expected if, got {other:?}"),
        }
        match &tree.root[1] {
            Node::Range(branch) => assert_eq!(branch.pipe.decl, vec!["$i", "$e"]),
            other => panic!("expected range, got {other:?}"),
        }
    }

    #[test]
    fn test_define_and_template() {
        let tree = parse_ok(r#"{{ define "x" }}X{{ end }}{{ template "x" . }}"#);
        assert!(tree.defines.contains_key("x"));
        assert!(matches!(tree.root[0], Node::Template { .. }));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(parse_number("42"), Some(Value::Int(42)));
        assert_eq!(parse_number("-0x1F"), Some(Value::Int(-31)));
        assert_eq!(parse_number("017"), Some(Value::Int(15)));
        assert_eq!(parse_number("1_000"), Some(Value::Int(1000)));
        assert_eq!(parse_number("1.5e3"), Some(Value::Float(1500.0)));
        assert_eq!(parse_number("9223372036854775807"), Some(Value::Int(i64::MAX)));
        assert_eq!(parse_number("-"), None);
        assert_eq!(parse_number("12abc"), None);
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse("Check: {{ .Check.Name Entity: {{ .Entity.Name }} !", &funcs()).is_err());
        assert!(parse_err("{{ .Check.Name Entity }}").contains(r#"function "Entity" not defined"#));
        assert!(parse_err("{{ nosuch .X }}").contains(r#"function "nosuch" not defined"#));
        assert!(parse_err("{{ $x }}").contains("undefined variable"));
        assert!(parse_err("{{ if .A }}x").contains("unexpected EOF"));
        assert!(parse_err("x{{ end }}").contains("unexpected {{end}}"));
        assert!(parse_err("{{ break }}").contains("outside {{range}}"));
        assert!(parse_err("{{ .X | }}").contains("missing command"));
        assert!(parse_err("{{ .X | \"s\" }}").contains("non executable"));
        assert!(parse_err("{{ }}").contains("missing value"));
        assert!(parse_err("{{ \"s\".X }}").contains("unexpected . after term"));
        assert!(parse_err("{{ 12abc }}").contains("illegal number"));
        assert!(parse_err(r#"{{define "a"}}{{end}}{{define "a"}}{{end}}"#).contains("multiple definition"));
    }

    #[test]
    fn test_variables_are_scoped_to_their_block() {
        parse_ok("{{ $x := 1 }}{{ $x }}{{ $x = 2 }}");
        assert!(parse_err("{{ if true }}{{ $y := 1 }}{{ end }}{{ $y }}").contains("undefined variable"));
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let source = format!("{{{{ {}1{} }}}}", "(".repeat(MAX_NESTING + 1), ")".repeat(MAX_NESTING + 1));
        assert!(parse_err(&source).contains("too deep"));
    }
}
