//! Splits template source into tokens.
//!
//! Outside actions everything is text. Inside `{{ ... }}` the lexer
//! produces fields, variables, identifiers, literals and punctuation, and
//! keeps runs of whitespace as [`TokenKind::Space`] because the parser needs
//! them to tell `.A.B` (one path) from `.A .B` (two arguments).
//!
//! `{{- ` and ` -}}` trim the whitespace around an action, and
//! `{{/* ... */}}` is a comment that produces nothing.

use std::fmt;

use crate::error::ParseError;

const LEFT_DELIM: &str = "{{";
const RIGHT_DELIM: &str = "}}";
const RIGHT_TRIM: &str = "-}}";

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    Text(String),
    LeftDelim,
    RightDelim,
    Space,
    /// `.Name`, without the dot.
    Field(String),
    Dot,
    /// `$` or `$name`, including the `$`.
    Variable(String),
    Identifier(String),
    Bool(bool),
    Nil,
    String(String),
    Char(char),
    /// Unparsed number text; the parser decides int or float.
    Number(String),
    Pipe,
    LeftParen,
    RightParen,
    Declare,
    Assign,
    Comma,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Text(_) => f.write_str("text"),
            TokenKind::LeftDelim => f.write_str("\"{{\""),
            TokenKind::RightDelim => f.write_str("\"}}\""),
            TokenKind::Space => f.write_str("space"),
            TokenKind::Field(name) => write!(f, "<.{name}>"),
            TokenKind::Dot => f.write_str("<.>"),
            TokenKind::Variable(name) => write!(f, "<{name}>"),
            TokenKind::Identifier(name) => write!(f, "<{name}>"),
            TokenKind::Bool(b) => write!(f, "<{b}>"),
            TokenKind::Nil => f.write_str("<nil>"),
            TokenKind::String(s) => write!(f, "{s:?}"),
            TokenKind::Char(c) => write!(f, "{c:?}"),
            TokenKind::Number(n) => write!(f, "<{n}>"),
            TokenKind::Pipe => f.write_str("\"|\""),
            TokenKind::LeftParen => f.write_str("\"(\""),
            TokenKind::RightParen => f.write_str("\")\""),
            TokenKind::Declare => f.write_str("\":=\""),
            TokenKind::Assign => f.write_str("\"=\""),
            TokenKind::Comma => f.write_str("\",\""),
            TokenKind::Eof => f.write_str("EOF"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub line: usize,
}

/// Tokenizes `source`. The result always ends with [`TokenKind::Eof`].
pub(crate) fn lex(source: &str) -> Result<Vec<Token>, ParseError> {
    Lexer {
        src: source,
        pos: 0,
        line: 1,
        paren_depth: 0,
        tokens: Vec::new(),
    }
    .run()
}

fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
    paren_depth: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn run(mut self) -> Result<Vec<Token>, ParseError> {
        let mut trim_next = false;
        loop {
            let rest = &self.src[self.pos..];
            let delim = rest.find(LEFT_DELIM);
            let text = &rest[..delim.unwrap_or(rest.len())];
            let trim_left = delim.is_some()
                && matches!(
                    rest.as_bytes().get(text.len() + LEFT_DELIM.len()..text.len() + LEFT_DELIM.len() + 2),
                    Some([b'-', c]) if is_space(char::from(*c))
                );

            let mut kept = text;
            if trim_next {
                kept = kept.trim_start_matches(is_space);
            }
            if trim_left {
                kept = kept.trim_end_matches(is_space);
            }
            if !kept.is_empty() {
                self.push(TokenKind::Text(kept.to_string()));
            }
            self.advance(text.len());

            if delim.is_none() {
                break;
            }
            self.advance(LEFT_DELIM.len());
            if trim_left {
                self.advance(2);
            }
            trim_next = self.action()?;
        }
        self.push(TokenKind::Eof);
        Ok(self.tokens)
    }

    /// Lexes one action, starting just after its opening delimiter.
    /// Returns whether it ended with a right trim marker.
    fn action(&mut self) -> Result<bool, ParseError> {
        if self.rest().starts_with("/*") {
            return self.comment();
        }

        self.push(TokenKind::LeftDelim);
        self.paren_depth = 0;
        loop {
            let rest = self.rest();
            if rest.starts_with(RIGHT_DELIM) {
                self.close_action()?;
                self.advance(RIGHT_DELIM.len());
                return Ok(false);
            }
            let Some(c) = rest.chars().next() else {
                return Err(self.error("unclosed action"));
            };

            match c {
                c if is_space(c) => {
                    let len = rest.find(|c| !is_space(c)).unwrap_or(rest.len());
                    self.advance(len);
                    if self.rest().starts_with(RIGHT_TRIM) {
                        self.close_action()?;
                        self.advance(RIGHT_TRIM.len());
                        return Ok(true);
                    }
                    self.push(TokenKind::Space);
                }
                '=' => self.single(TokenKind::Assign),
                ':' => {
                    if !rest.starts_with(":=") {
                        return Err(self.error("expected :="));
                    }
                    self.push(TokenKind::Declare);
                    self.advance(2);
                }
                '|' => self.single(TokenKind::Pipe),
                ',' => self.single(TokenKind::Comma),
                '(' => {
                    self.paren_depth += 1;
                    self.single(TokenKind::LeftParen);
                }
                ')' => {
                    if self.paren_depth == 0 {
                        return Err(self.error("unexpected right paren"));
                    }
                    self.paren_depth -= 1;
                    self.single(TokenKind::RightParen);
                }
                '"' => self.quoted()?,
                '`' => self.raw_string()?,
                '\'' => self.char_constant()?,
                '$' => {
                    let len = 1 + self.word_len(1);
                    let name = rest[..len].to_string();
                    self.push(TokenKind::Variable(name));
                    self.advance(len);
                }
                '.' => match rest[1..].chars().next() {
                    Some(d) if d.is_ascii_digit() => self.number(),
                    Some(w) if is_word(w) => {
                        let len = self.word_len(1);
                        let name = rest[1..1 + len].to_string();
                        self.push(TokenKind::Field(name));
                        self.advance(1 + len);
                    }
                    _ => self.single(TokenKind::Dot),
                },
                '+' | '-' | '0'..='9' => self.number(),
                c if c.is_alphabetic() || c == '_' => {
                    let len = self.word_len(0);
                    let kind = match &rest[..len] {
                        "true" => TokenKind::Bool(true),
                        "false" => TokenKind::Bool(false),
                        "nil" => TokenKind::Nil,
                        word => TokenKind::Identifier(word.to_string()),
                    };
                    self.push(kind);
                    self.advance(len);
                }
                other => {
                    return Err(self.error(format!("unrecognized character in action: {other:?}")))
                }
            }
        }
    }

    /// `{{/* ... */}}`, with optional trim markers on either side.
    fn comment(&mut self) -> Result<bool, ParseError> {
        let end = self
            .rest()
            .find("*/")
            .ok_or_else(|| self.error("unclosed comment"))?;
        self.advance(end + 2);

        let rest = self.rest();
        let ws = rest.find(|c| !is_space(c)).unwrap_or(rest.len());
        if ws > 0 && rest[ws..].starts_with(RIGHT_TRIM) {
            self.advance(ws + RIGHT_TRIM.len());
            return Ok(true);
        }
        if rest.starts_with(RIGHT_DELIM) {
            self.advance(RIGHT_DELIM.len());
            return Ok(false);
        }
        Err(self.error("comment ends before closing delimiter"))
    }

    fn close_action(&mut self) -> Result<(), ParseError> {
        if self.paren_depth > 0 {
            return Err(self.error("unclosed left paren"));
        }
        self.push(TokenKind::RightDelim);
        Ok(())
    }

    fn quoted(&mut self) -> Result<(), ParseError> {
        let rest = self.rest();
        let mut value = String::new();
        let mut chars = rest.char_indices().skip(1);

        loop {
            match chars.next() {
                None | Some((_, '\n')) => return Err(self.error("unterminated quoted string")),
                Some((i, '"')) => {
                    self.push(TokenKind::String(value));
                    self.advance(i + 1);
                    return Ok(());
                }
                Some((_, '\\')) => {
                    let escaped = match chars.next() {
                        Some((_, 'n')) => Some('\n'),
                        Some((_, 't')) => Some('\t'),
                        Some((_, 'r')) => Some('\r'),
                        Some((_, 'a')) => Some('\x07'),
                        Some((_, 'b')) => Some('\x08'),
                        Some((_, 'f')) => Some('\x0c'),
                        Some((_, 'v')) => Some('\x0b'),
                        Some((_, c @ ('\\' | '"' | '\''))) => Some(c),
                        Some((_, 'x')) => hex_escape(&mut chars, 2),
                        Some((_, 'u')) => hex_escape(&mut chars, 4),
                        Some((_, 'U')) => hex_escape(&mut chars, 8),
                        _ => None,
                    };
                    match escaped {
                        Some(c) => value.push(c),
                        None => return Err(self.error("invalid escape in quoted string")),
                    }
                }
                Some((_, c)) => value.push(c),
            }
        }
    }

    fn raw_string(&mut self) -> Result<(), ParseError> {
        let rest = self.rest();
        let end = rest[1..]
            .find('`')
            .ok_or_else(|| self.error("unterminated raw quoted string"))?;
        let value = rest[1..1 + end].to_string();
        self.push(TokenKind::String(value));
        self.advance(end + 2);
        Ok(())
    }

    fn char_constant(&mut self) -> Result<(), ParseError> {
        let rest = self.rest();
        let mut chars = rest.char_indices().skip(1);
        let value = match chars.next() {
            Some((_, '\\')) => match chars.next() {
                Some((_, 'n')) => Some('\n'),
                Some((_, 't')) => Some('\t'),
                Some((_, 'r')) => Some('\r'),
                Some((_, c @ ('\\' | '\'' | '"'))) => Some(c),
                _ => None,
            },
            Some((_, '\'')) | Some((_, '\n')) | None => None,
            Some((_, c)) => Some(c),
        };
        match (value, chars.next()) {
            (Some(c), Some((i, '\''))) => {
                self.push(TokenKind::Char(c));
                self.advance(i + 1);
                Ok(())
            }
            _ => Err(self.error("unterminated character constant")),
        }
    }

    /// Scans a number-like run; validity is checked by the parser.
    fn number(&mut self) {
        let rest = self.rest();
        let mut len = 0;
        let mut prev = '\0';
        for (i, c) in rest.char_indices() {
            let sign_ok = (i == 0 || matches!(prev, 'e' | 'E' | 'p' | 'P')) && matches!(c, '+' | '-');
            if !(is_word(c) || c == '.' || sign_ok) {
                break;
            }
            len = i + c.len_utf8();
            prev = c;
        }
        let text = rest[..len].to_string();
        self.push(TokenKind::Number(text));
        self.advance(len);
    }

    fn single(&mut self, kind: TokenKind) {
        self.push(kind);
        self.advance(1);
    }

    /// Length of the identifier characters starting `skip` bytes in.
    fn word_len(&self, skip: usize) -> usize {
        let rest = &self.rest()[skip..];
        rest.find(|c| !is_word(c)).unwrap_or(rest.len())
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn advance(&mut self, len: usize) {
        let consumed = &self.src[self.pos..self.pos + len];
        self.line += consumed.matches('\n').count();
        self.pos += len;
    }

    fn push(&mut self, kind: TokenKind) {
        self.tokens.push(Token {
            kind,
            line: self.line,
        });
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(self.line, message)
    }
}

fn hex_escape(chars: &mut impl Iterator<Item = (usize, char)>, digits: usize) -> Option<char> {
    let hex: String = chars.take(digits).map(|(_, c)| c).collect();
    if hex.len() != digits {
        return None;
    }
    u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_text_and_field_path() {
        assert_eq!(
            kinds("Check: {{ .Check.Name }}!"),
            vec![
                TokenKind::Text("Check: ".into()),
                TokenKind::LeftDelim,
                TokenKind::Space,
                TokenKind::Field("Check".into()),
                TokenKind::Field("Name".into()),
                TokenKind::Space,
                TokenKind::RightDelim,
                TokenKind::Text("!".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_function_call_with_string_arguments() {
        assert_eq!(
            kinds(r#"{{.X | replace "a\tb" `c\d`}}"#),
            vec![
                TokenKind::LeftDelim,
                TokenKind::Field("X".into()),
                TokenKind::Space,
                TokenKind::Pipe,
                TokenKind::Space,
                TokenKind::Identifier("replace".into()),
                TokenKind::Space,
                TokenKind::String("a\tb".into()),
                TokenKind::Space,
                TokenKind::String("c\\d".into()),
                TokenKind::RightDelim,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_parenthesized_chain_and_literals() {
        assert_eq!(
            kinds("{{(UnixTime $t).Format 'x' -3 1.5 true nil}}"),
            vec![
                TokenKind::LeftDelim,
                TokenKind::LeftParen,
                TokenKind::Identifier("UnixTime".into()),
                TokenKind::Space,
                TokenKind::Variable("$t".into()),
                TokenKind::RightParen,
                TokenKind::Field("Format".into()),
                TokenKind::Space,
                TokenKind::Char('x'),
                TokenKind::Space,
                TokenKind::Number("-3".into()),
                TokenKind::Space,
                TokenKind::Number("1.5".into()),
                TokenKind::Space,
                TokenKind::Bool(true),
                TokenKind::Space,
                TokenKind::Nil,
                TokenKind::RightDelim,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_trim_markers() {
        assert_eq!(
            kinds("a  {{- .X -}}\n  b"),
            vec![
                TokenKind::Text("a".into()),
                TokenKind::LeftDelim,
                TokenKind::Field("X".into()),
                TokenKind::RightDelim,
                TokenKind::Text("b".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_vanish() {
        assert_eq!(
            kinds("a{{/* note */}}b {{- /* x */ -}} c"),
            vec![
                TokenKind::Text("a".into()),
                TokenKind::Text("b".into()),
                TokenKind::Text("c".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_declarations() {
        assert_eq!(
            kinds("{{$i, $e := .L}}"),
            vec![
                TokenKind::LeftDelim,
                TokenKind::Variable("$i".into()),
                TokenKind::Comma,
                TokenKind::Space,
                TokenKind::Variable("$e".into()),
                TokenKind::Space,
                TokenKind::Declare,
                TokenKind::Space,
                TokenKind::Field("L".into()),
                TokenKind::RightDelim,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_lines_are_tracked() {
        let tokens = lex("one\ntwo\n{{ .X }}").unwrap();
        let field = tokens
            .iter()
            .find(|t| matches!(t.kind, TokenKind::Field(_)))
            .unwrap();
        assert_eq!(field.line, 3);
    }

    #[test]
    fn test_lex_errors() {
        assert!(lex("{{ .X ").is_err());
        assert!(lex("{{ \"open }}").is_err());
        assert!(lex("{{ (.X }}").is_err());
        assert!(lex("{{ .X) }}").is_err());
        assert!(lex("{{ # }}").is_err());
        assert!(lex("{{/* open").is_err());
        assert_eq!(lex("x\n{{ .X").unwrap_err().line, 2);
    }
}
