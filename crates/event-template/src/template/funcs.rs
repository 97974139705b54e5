//! The function registry and the builtins every template gets.
//!
//! Builtins follow `text/template`: `not`, `len`, `index`, `slice`,
//! `print`, `printf`, `println` and the comparisons `eq`, `ne`, `lt`, `le`,
//! `gt`, `ge`. `and` and `or` short-circuit, so the executor evaluates them
//! itself and they only appear here as names the parser accepts.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt::{self, Write as _};

use thiserror::Error;

use super::value::Value;
use super::MAX_OUTPUT_LEN;

/// A helper rejected its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub(crate) struct FuncError(String);

impl FuncError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        FuncError(message.into())
    }
}

pub(crate) type FuncResult = Result<Value, FuncError>;

type Func = dyn Fn(&[Value]) -> FuncResult + Send + Sync;

/// Named functions callable from templates.
pub(crate) struct Funcs {
    funcs: HashMap<&'static str, Box<Func>>,
}

impl Funcs {
    /// A registry holding only the builtins.
    pub(crate) fn builtin() -> Self {
        let mut funcs = Funcs {
            funcs: HashMap::new(),
        };
        funcs.add("not", |args| Ok(Value::Bool(!args1("not", args)?.is_true())));
        funcs.add("len", len);
        funcs.add("index", index);
        funcs.add("slice", slice);
        funcs.add("print", |args| Ok(Value::String(sprint(args))));
        funcs.add("println", |args| {
            let line: Vec<String> = args.iter().map(Value::to_string).collect();
            Ok(Value::String(format!("{}\n", line.join(" "))))
        });
        funcs.add("printf", |args| match args {
            [Value::String(format), rest @ ..] => Ok(Value::String(sprintf(format, rest)?)),
            [other, ..] => Err(FuncError::new(format!(
                "printf: format must be a string, got {}",
                other.kind()
            ))),
            [] => Err(arity("printf", "at least 1", 0)),
        });
        funcs.add("eq", eq);
        funcs.add("ne", |args| {
            let (a, b) = args2("ne", args)?;
            Ok(Value::Bool(!equal(a, b)?))
        });
        funcs.add("lt", |args| ordered("lt", args, Ordering::is_lt));
        funcs.add("le", |args| ordered("le", args, Ordering::is_le));
        funcs.add("gt", |args| ordered("gt", args, Ordering::is_gt));
        funcs.add("ge", |args| ordered("ge", args, Ordering::is_ge));
        funcs
    }

    /// Registers `f` under `name`, replacing any function of that name.
    pub(crate) fn add<F>(&mut self, name: &'static str, f: F)
    where
        F: Fn(&[Value]) -> FuncResult + Send + Sync + 'static,
    {
        self.funcs.insert(name, Box::new(f));
    }

    pub(crate) fn get(&self, name: &str) -> Option<&Func> {
        self.funcs.get(name).map(|f| f.as_ref())
    }

    /// Whether a template may call `name`.
    pub(crate) fn is_defined(&self, name: &str) -> bool {
        matches!(name, "and" | "or") || self.funcs.contains_key(name)
    }
}

impl fmt::Debug for Funcs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.funcs.keys().collect();
        names.sort();
        f.debug_struct("Funcs").field("names", &names).finish()
    }
}

fn arity(name: &str, want: impl fmt::Display, got: usize) -> FuncError {
    FuncError::new(format!("wrong number of args for {name}: want {want} got {got}"))
}

pub(crate) fn args0(name: &str, args: &[Value]) -> Result<(), FuncError> {
    match args {
        [] => Ok(()),
        _ => Err(arity(name, 0, args.len())),
    }
}

pub(crate) fn args1<'a>(name: &str, args: &'a [Value]) -> Result<&'a Value, FuncError> {
    match args {
        [a] => Ok(a),
        _ => Err(arity(name, 1, args.len())),
    }
}

pub(crate) fn args2<'a>(
    name: &str,
    args: &'a [Value],
) -> Result<(&'a Value, &'a Value), FuncError> {
    match args {
        [a, b] => Ok((a, b)),
        _ => Err(arity(name, 2, args.len())),
    }
}

pub(crate) fn args3<'a>(
    name: &str,
    args: &'a [Value],
) -> Result<(&'a Value, &'a Value, &'a Value), FuncError> {
    match args {
        [a, b, c] => Ok((a, b, c)),
        _ => Err(arity(name, 3, args.len())),
    }
}

pub(crate) fn int_arg(name: &str, value: &Value) -> Result<i64, FuncError> {
    match value {
        Value::Int(i) => Ok(*i),
        other => Err(FuncError::new(format!(
            "{name}: expected int, got {}",
            other.kind()
        ))),
    }
}

pub(crate) fn str_arg<'a>(name: &str, value: &'a Value) -> Result<&'a str, FuncError> {
    value.as_str().ok_or_else(|| {
        FuncError::new(format!("{name}: expected string, got {}", value.kind()))
    })
}

/// Double-quoted string literal with escapes, in the form `%q` prints it.
///
/// Control characters and whitespace other than the ASCII space are
/// escaped; other characters are kept as they are.
pub(crate) fn go_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\x07' => out.push_str("\\a"),
            '\x08' => out.push_str("\\b"),
            '\x0c' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\x0b' => out.push_str("\\v"),
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            c if c.is_ascii_control() => {
                let _ = write!(out, "\\x{:02x}", u32::from(c));
            }
            c if c.is_control() || (c.is_whitespace() && c != ' ') => {
                let code = u32::from(c);
                if code > 0xffff {
                    let _ = write!(out, "\\U{code:08x}");
                } else {
                    let _ = write!(out, "\\u{code:04x}");
                }
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn len(args: &[Value]) -> FuncResult {
    let n = match args1("len", args)? {
        Value::String(s) => s.len(),
        Value::Bytes(b) => b.len(),
        Value::List(items) => items.len(),
        Value::Map(map) => map.len(),
        other => {
            return Err(FuncError::new(format!(
                "len of type {}",
                other.kind()
            )))
        }
    };
    Ok(Value::from(n))
}

/// `index item k1 k2 ...`: `item[k1][k2]...`. A missing map key yields nil.
fn index(args: &[Value]) -> FuncResult {
    let Some((item, keys)) = args.split_first() else {
        return Err(arity("index", "at least 1", 0));
    };
    let mut current = item.clone();
    for key in keys {
        current = match (&current, key) {
            (Value::List(items), Value::Int(i)) => position(*i, items.len())
                .map(|i| items[i].clone())
                .ok_or_else(|| FuncError::new(format!("index out of range: {i}")))?,
            (Value::Bytes(bytes), Value::Int(i)) => position(*i, bytes.len())
                .map(|i| Value::Int(i64::from(bytes[i])))
                .ok_or_else(|| FuncError::new(format!("index out of range: {i}")))?,
            (Value::Map(map), Value::String(k)) => map.get(k).cloned().unwrap_or(Value::Nil),
            (Value::Nil, _) => return Err(FuncError::new("index of untyped nil")),
            (Value::List(_) | Value::Bytes(_), other) | (Value::Map(_), other) => {
                return Err(FuncError::new(format!(
                    "cannot index {} with {}",
                    current.kind(),
                    other.kind()
                )))
            }
            (other, _) => {
                return Err(FuncError::new(format!(
                    "can't index item of type {}",
                    other.kind()
                )))
            }
        };
    }
    Ok(current)
}

fn position(i: i64, len: usize) -> Option<usize> {
    usize::try_from(i).ok().filter(|&i| i < len)
}

/// `slice item [start [end]]`.
fn slice(args: &[Value]) -> FuncResult {
    let Some((item, bounds)) = args.split_first() else {
        return Err(arity("slice", "at least 1", 0));
    };
    if bounds.len() > 2 {
        return Err(FuncError::new("too many slice indexes"));
    }
    let len = match item {
        Value::String(s) => s.len(),
        Value::Bytes(b) => b.len(),
        Value::List(items) => items.len(),
        other => {
            return Err(FuncError::new(format!(
                "can't slice item of type {}",
                other.kind()
            )))
        }
    };

    let mut idx = [0, len];
    for (slot, bound) in idx.iter_mut().zip(bounds) {
        let i = int_arg("slice", bound)?;
        *slot = usize::try_from(i)
            .ok()
            .filter(|&i| i <= len)
            .ok_or_else(|| FuncError::new(format!("index out of range: {i}")))?;
    }
    let [start, end] = idx;
    if start > end {
        return Err(FuncError::new(format!("invalid slice index: {start} > {end}")));
    }

    match item {
        Value::String(s) => s
            .get(start..end)
            .map(Value::from)
            .ok_or_else(|| FuncError::new("slice splits a character")),
        Value::Bytes(b) => Ok(Value::Bytes(b[start..end].to_vec())),
        Value::List(items) => Ok(Value::List(items[start..end].to_vec())),
        _ => Ok(Value::Nil),
    }
}

/// Adds a space between operands when neither side is a string.
fn sprint(args: &[Value]) -> String {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 && !matches!(arg, Value::String(_)) && !matches!(args[i - 1], Value::String(_)) {
            out.push(' ');
        }
        let _ = write!(out, "{arg}");
    }
    out
}

fn eq(args: &[Value]) -> FuncResult {
    let Some((first, rest)) = args.split_first() else {
        return Err(FuncError::new("missing argument for comparison"));
    };
    if rest.is_empty() {
        return Err(FuncError::new("missing argument for comparison"));
    }
    for other in rest {
        if equal(first, other)? {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn equal(a: &Value, b: &Value) -> Result<bool, FuncError> {
    match (a, b) {
        (Value::Nil, Value::Nil) => Ok(true),
        (Value::Nil, _) | (_, Value::Nil) => Ok(false),
        (Value::Bool(x), Value::Bool(y)) => Ok(x == y),
        (Value::Time(x), Value::Time(y)) => Ok(x == y),
        _ => compare(a, b).map(Ordering::is_eq),
    }
}

fn compare(a: &Value, b: &Value) -> Result<Ordering, FuncError> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(x.cmp(y)),
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        (Value::Float(x), Value::Float(y)) => x
            .partial_cmp(y)
            .ok_or_else(|| FuncError::new("invalid type for comparison")),
        _ if a.kind() != b.kind() => Err(FuncError::new("incompatible types for comparison")),
        _ => Err(FuncError::new("invalid type for comparison")),
    }
}

fn ordered(name: &str, args: &[Value], test: fn(Ordering) -> bool) -> FuncResult {
    let (a, b) = args2(name, args)?;
    Ok(Value::Bool(test(compare(a, b)?)))
}

#[derive(Debug, Default)]
struct Directive {
    minus: bool,
    plus: bool,
    zero: bool,
    width: Option<usize>,
    precision: Option<usize>,
}

/// `printf` formatting with the common verbs: `%v %s %d %f %e %g %x %X %o
/// %b %q %t %c %T %%`, the flags `-`, `+` and `0`, width and precision.
fn sprintf(format: &str, args: &[Value]) -> Result<String, FuncError> {
    let mut out = String::new();
    let mut args = args.iter();
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut directive = Directive::default();
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => directive.minus = true,
                '+' => directive.plus = true,
                '0' => directive.zero = true,
                ' ' | '#' => {}
                _ => break,
            }
            chars.next();
        }
        directive.width = count(&mut chars)?;
        if chars.peek() == Some(&'.') {
            chars.next();
            directive.precision = Some(count(&mut chars)?.unwrap_or(0));
        }

        let Some(verb) = chars.next() else {
            out.push_str("%!(NOVERB)");
            break;
        };
        if verb == '%' {
            out.push('%');
            continue;
        }
        match args.next() {
            Some(arg) => {
                let (body, numeric) = format_verb(verb, &directive, arg);
                pad(&mut out, &body, numeric, &directive);
            }
            None => {
                let _ = write!(out, "%!{verb}(MISSING)");
            }
        }
        if out.len() > MAX_OUTPUT_LEN {
            return Err(FuncError::new(format!(
                "printf: result would exceed {MAX_OUTPUT_LEN} bytes"
            )));
        }
    }

    let extra: Vec<String> = args.map(|arg| format!("{}={arg}", arg.kind())).collect();
    if !extra.is_empty() {
        let _ = write!(out, "%!(EXTRA {})", extra.join(", "));
    }
    Ok(out)
}

/// A width or precision. Values larger than the output limit are errors.
fn count(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Result<Option<usize>, FuncError> {
    let mut n: Option<usize> = None;
    while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
        chars.next();
        let next = n
            .unwrap_or(0)
            .checked_mul(10)
            .and_then(|v| v.checked_add(d as usize))
            .filter(|&v| v <= MAX_OUTPUT_LEN)
            .ok_or_else(|| {
                FuncError::new(format!("printf: width exceeds {MAX_OUTPUT_LEN}"))
            })?;
        n = Some(next);
    }
    Ok(n)
}

fn format_verb(verb: char, directive: &Directive, arg: &Value) -> (String, bool) {
    let signed = |s: String, negative: bool| {
        if directive.plus && !negative {
            format!("+{s}")
        } else {
            s
        }
    };
    match (verb, arg) {
        ('v', Value::Int(i)) | ('d', Value::Int(i)) => (signed(i.to_string(), *i < 0), true),
        ('v', Value::Float(x)) => (signed(x.to_string(), *x < 0.0), true),
        ('v', other) => (other.to_string(), false),
        ('s', Value::String(s)) => (truncate(s, directive.precision), false),
        ('s', Value::Bytes(b)) => (truncate(&String::from_utf8_lossy(b), directive.precision), false),
        ('s', other @ (Value::List(_) | Value::Map(_) | Value::Time(_))) => (other.to_string(), false),
        ('f' | 'F', Value::Float(x)) => {
            let p = directive.precision.unwrap_or(6);
            (signed(format!("{x:.p$}"), *x < 0.0), true)
        }
        ('e', Value::Float(x)) => {
            let p = directive.precision.unwrap_or(6);
            (signed(go_exponent(&format!("{x:.p$e}")), *x < 0.0), true)
        }
        ('g', Value::Float(x)) => {
            let body = match directive.precision {
                Some(p) => format!("{x:.p$}"),
                None => x.to_string(),
            };
            (signed(body, *x < 0.0), true)
        }
        ('x', Value::Int(i)) => (signed_radix(*i, |n| format!("{n:x}")), true),
        ('X', Value::Int(i)) => (signed_radix(*i, |n| format!("{n:X}")), true),
        ('o', Value::Int(i)) => (signed_radix(*i, |n| format!("{n:o}")), true),
        ('b', Value::Int(i)) => (signed_radix(*i, |n| format!("{n:b}")), true),
        ('x', Value::String(s)) => (hex(s.as_bytes(), false), false),
        ('X', Value::String(s)) => (hex(s.as_bytes(), true), false),
        ('x', Value::Bytes(b)) => (hex(b, false), false),
        ('X', Value::Bytes(b)) => (hex(b, true), false),
        ('q', Value::String(s)) => (go_quote(s), false),
        ('q', Value::Int(i)) => match u32::try_from(*i).ok().and_then(char::from_u32) {
            Some(c) => (format!("{c:?}"), false),
            None => (bad_verb(verb, arg), false),
        },
        ('t', Value::Bool(b)) => (b.to_string(), false),
        ('c', Value::Int(i)) => match u32::try_from(*i).ok().and_then(char::from_u32) {
            Some(c) => (c.to_string(), false),
            None => (bad_verb(verb, arg), false),
        },
        ('T', other) => (other.kind().to_string(), false),
        _ => (bad_verb(verb, arg), false),
    }
}

fn bad_verb(verb: char, arg: &Value) -> String {
    match arg {
        Value::Nil => format!("%!{verb}(<nil>)"),
        other => format!("%!{verb}({}={other})", other.kind()),
    }
}

fn truncate(s: &str, precision: Option<usize>) -> String {
    match precision {
        Some(p) => s.chars().take(p).collect(),
        None => s.to_string(),
    }
}

fn signed_radix(i: i64, digits: impl Fn(u64) -> String) -> String {
    if i < 0 {
        format!("-{}", digits(i.unsigned_abs()))
    } else {
        digits(i.unsigned_abs())
    }
}

fn hex(bytes: &[u8], upper: bool) -> String {
    bytes.iter().fold(String::new(), |mut out, b| {
        let _ = if upper {
            write!(out, "{b:02X}")
        } else {
            write!(out, "{b:02x}")
        };
        out
    })
}

/// `1.5e3` to `1.5e+03`.
fn go_exponent(s: &str) -> String {
    match s.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exp),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        None => s.to_string(),
    }
}

fn pad(out: &mut String, body: &str, numeric: bool, directive: &Directive) {
    let width = directive.width.unwrap_or(0);
    let len = body.chars().count();
    if len >= width {
        out.push_str(body);
        return;
    }
    let fill = width - len;
    if directive.minus {
        out.push_str(body);
        out.extend(std::iter::repeat(' ').take(fill));
    } else if directive.zero && numeric {
        let (sign, digits) = match body.chars().next() {
            Some(c @ ('-' | '+')) => (Some(c), &body[1..]),
            _ => (None, body),
        };
        out.extend(sign);
        out.extend(std::iter::repeat('0').take(fill));
        out.push_str(digits);
    } else {
        out.extend(std::iter::repeat(' ').take(fill));
        out.push_str(body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn call(name: &str, args: &[Value]) -> FuncResult {
        let funcs = Funcs::builtin();
        let f = funcs.get(name).unwrap();
        f(args)
    }

    fn printf(format: &str, args: &[Value]) -> String {
        sprintf(format, args).unwrap()
    }

    #[test]
    fn test_go_quote_escapes() {
        assert_eq!(go_quote("check-nginx"), r#""check-nginx""#);
        assert_eq!(go_quote("a\"b\\c"), r#""a\"b\\c""#);
        assert_eq!(go_quote("tab\there\n"), r#""tab\there\n""#);
        assert_eq!(go_quote("\u{7f}"), r#""\x7f""#);
        assert_eq!(go_quote("\u{1}\u{7}"), r#""\x01\a""#);
        assert_eq!(go_quote("\u{a0}"), r#""\u00a0""#);
        assert_eq!(go_quote("héllo ✓"), "\"héllo ✓\"");
    }

    #[test]
    fn test_is_defined_includes_short_circuit_names() {
        let funcs = Funcs::builtin();
        assert!(funcs.is_defined("and"));
        assert!(funcs.is_defined("or"));
        assert!(funcs.is_defined("printf"));
        assert!(!funcs.is_defined("html"));
        assert!(funcs.get("and").is_none());
    }

    #[test]
    fn test_printf_verbs() {
        assert_eq!(printf("%s=%d", &["status".into(), Value::Int(2)]), "status=2");
        assert_eq!(printf("%5d|%-5d|%05d", &[Value::Int(42), Value::Int(42), Value::Int(-42)]), "   42|42   |-0042");
        assert_eq!(printf("%.2f %+d", &[Value::Float(0.152), Value::Int(3)]), "0.15 +3");
        assert_eq!(printf("%x %X %q", &[Value::Int(255), "hi".into(), "a\tb".into()]), "ff 6869 \"a\\tb\"");
        assert_eq!(printf("%v %t %%", &[Value::Float(60.0), Value::Bool(true)]), "60 true %");
        assert_eq!(printf("%.3s", &["abcdef".into()]), "abc");
        assert_eq!(printf("%e", &[Value::Float(1500.0)]), "1.500000e+03");
    }

    #[test]
    fn test_printf_mismatches() {
        assert_eq!(printf("%d", &["x".into()]), "%!d(string=x)");
        assert_eq!(printf("%s %s", &["x".into()]), "x %!s(MISSING)");
        assert_eq!(printf("%s", &["x".into(), Value::Int(1)]), "x%!(EXTRA int=1)");
    }

    #[test]
    fn test_printf_width_is_bounded() {
        let err = sprintf("%99999999999999999999999d", &[Value::Int(1)]).unwrap_err();
        assert!(err.to_string().contains("width exceeds"));
        let err = sprintf(&format!("%{}d", MAX_OUTPUT_LEN + 1), &[Value::Int(1)]).unwrap_err();
        assert!(err.to_string().contains("width exceeds"));
    }

    #[test]
    fn test_print_spacing() {
        let out = call("print", &["a".into(), Value::Int(1), Value::Int(2), "b".into()]).unwrap();
        assert_eq!(out, Value::from("a1 2b"));
        let out = call("println", &["a".into(), Value::Int(1)]).unwrap();
        assert_eq!(out, Value::from("a 1\n"));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(call("eq", &[Value::Int(2), Value::Int(0), Value::Int(2)]).unwrap(), Value::Bool(true));
        assert_eq!(call("ne", &["a".into(), "b".into()]).unwrap(), Value::Bool(true));
        assert_eq!(call("lt", &[Value::Int(1), Value::Int(2)]).unwrap(), Value::Bool(true));
        assert_eq!(call("ge", &["b".into(), "a".into()]).unwrap(), Value::Bool(true));
        assert_eq!(call("eq", &[Value::Nil, Value::Nil]).unwrap(), Value::Bool(true));

        let err = call("lt", &[Value::Int(1), "2".into()]).unwrap_err();
        assert_eq!(err.to_string(), "incompatible types for comparison");
        let err = call("lt", &[Value::Bool(true), Value::Bool(false)]).unwrap_err();
        assert_eq!(err.to_string(), "invalid type for comparison");
        let err = call("lt", &[Value::Int(1)]).unwrap_err();
        assert_eq!(err.to_string(), "wrong number of args for lt: want 2 got 1");
    }

    #[test]
    fn test_len_index_slice() {
        let list: Value = ["a", "b", "c"].into_iter().collect();
        assert_eq!(call("len", &[list.clone()]).unwrap(), Value::Int(3));
        assert_eq!(call("len", &["héllo".into()]).unwrap(), Value::Int(6));
        assert!(call("len", &[Value::Int(3)]).is_err());

        assert_eq!(call("index", &[list.clone(), Value::Int(1)]).unwrap(), Value::from("b"));
        assert!(call("index", &[list.clone(), Value::Int(3)]).is_err());
        assert!(call("index", &[list.clone(), Value::Int(-1)]).is_err());

        let mut map = BTreeMap::new();
        map.insert("region".to_string(), Value::from("us-west-1"));
        let map = Value::Map(map);
        assert_eq!(call("index", &[map.clone(), "region".into()]).unwrap(), Value::from("us-west-1"));
        assert_eq!(call("index", &[map, "zone".into()]).unwrap(), Value::Nil);

        assert_eq!(
            call("slice", &[list.clone(), Value::Int(1)]).unwrap(),
            ["b", "c"].into_iter().collect::<Value>()
        );
        assert_eq!(call("slice", &["check-nginx".into(), Value::Int(0), Value::Int(5)]).unwrap(), Value::from("check"));
        assert!(call("slice", &[list, Value::Int(2), Value::Int(1)]).is_err());
    }

    #[test]
    fn test_not() {
        assert_eq!(call("not", &[Value::from("")]).unwrap(), Value::Bool(true));
        assert!(call("not", &[]).is_err());
    }
}
