//! The sprig string library.
//!
//! Arguments follow sprig's order, with the string being worked on last,
//! so every helper reads naturally at the end of a pipeline:
//!
//! ```text
//! {{ .Check.Name | replace "nginx" "sprig" }}
//! {{ .Check.Output | trunc 120 | nospace }}
//! {{ .Entity.Name | trimPrefix "web-" | upper }}
//! {{ cat "check" .Check.Name "is" .Check.State }}
//! ```
//!
//! - `replace old new s`, `upper`, `lower`, `title`, `untitle`, `trim`
//! - `trimAll cutset s`, `trimPrefix prefix s`, `trimSuffix suffix s`
//! - `hasPrefix prefix s`, `hasSuffix suffix s`, `contains needle s`
//! - `repeat n s`, `substr start end s`, `trunc n s`, `abbrev width s`
//! - `nospace`, `initials`, `quote ...`, `squote ...`
//! - `snakecase`, `kebabcase`, `camelcase`
//! - `b64enc`, `b64dec`, `sha256sum`, `toString`
//! - `splitList sep s`, `join sep list`, `indent n s`, `nindent n s`
//! - `ternary yes no cond`, `cat ...`, `coalesce ...`, `empty v`,
//!   `default fallback v`, `list ...`
//!
//! Helpers that can grow their input (`repeat`, `replace`, `indent`,
//! `nindent`, `join`) refuse to build a result larger than
//! [`MAX_OUTPUT_LEN`] bytes.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sha2::{Digest, Sha256};

use super::funcs::{args1, args2, args3, go_quote, int_arg, str_arg, FuncError, FuncResult, Funcs};
use super::value::Value;
use super::MAX_OUTPUT_LEN;

/// Registers the string library on `funcs`.
pub(crate) fn register(funcs: &mut Funcs) {
    funcs.add("replace", |args| {
        let (old, new, s) = args3("replace", args)?;
        let (old, new, s) = (
            str_arg("replace", old)?,
            str_arg("replace", new)?,
            str_arg("replace", s)?,
        );
        let hits = if old.is_empty() {
            s.chars().count() + 1
        } else {
            s.matches(old).count()
        };
        let size = hits
            .checked_mul(new.len())
            .and_then(|added| (s.len() - hits * old.len()).checked_add(added));
        limit("replace", size)?;
        Ok(Value::String(s.replace(old, new)))
    });
    funcs.add("upper", |args| map_str("upper", args, str::to_uppercase));
    funcs.add("lower", |args| map_str("lower", args, str::to_lowercase));
    funcs.add("title", |args| map_str("title", args, title));
    funcs.add("untitle", |args| {
        map_str("untitle", args, |s| {
            s.split(' ').map(lower_first).collect::<Vec<_>>().join(" ")
        })
    });
    funcs.add("trim", |args| map_str("trim", args, |s| s.trim().to_string()));
    funcs.add("trimAll", |args| {
        with_str("trimAll", args, |cutset, s| {
            Value::from(s.trim_matches(|c: char| cutset.contains(c)))
        })
    });
    funcs.add("trimPrefix", |args| {
        with_str("trimPrefix", args, |prefix, s| {
            Value::from(s.strip_prefix(prefix).unwrap_or(s))
        })
    });
    funcs.add("trimSuffix", |args| {
        with_str("trimSuffix", args, |suffix, s| {
            Value::from(s.strip_suffix(suffix).unwrap_or(s))
        })
    });
    funcs.add("hasPrefix", |args| {
        with_str("hasPrefix", args, |prefix, s| Value::Bool(s.starts_with(prefix)))
    });
    funcs.add("hasSuffix", |args| {
        with_str("hasSuffix", args, |suffix, s| Value::Bool(s.ends_with(suffix)))
    });
    funcs.add("contains", |args| {
        with_str("contains", args, |needle, s| Value::Bool(s.contains(needle)))
    });
    funcs.add("repeat", repeat);
    funcs.add("substr", |args| {
        let (start, end, s) = args3("substr", args)?;
        let (start, end) = (int_arg("substr", start)?, int_arg("substr", end)?);
        Ok(Value::String(substr(str_arg("substr", s)?, start, end)))
    });
    funcs.add("trunc", |args| {
        let (n, s) = args2("trunc", args)?;
        Ok(Value::String(trunc(str_arg("trunc", s)?, int_arg("trunc", n)?)))
    });
    funcs.add("abbrev", |args| {
        let (width, s) = args2("abbrev", args)?;
        Ok(Value::String(abbrev(str_arg("abbrev", s)?, int_arg("abbrev", width)?)))
    });
    funcs.add("nospace", |args| {
        map_str("nospace", args, |s| s.chars().filter(|c| !c.is_whitespace()).collect())
    });
    funcs.add("initials", |args| {
        map_str("initials", args, |s| {
            s.split_whitespace().filter_map(|w| w.chars().next()).collect()
        })
    });
    funcs.add("quote", |args| Ok(Value::String(quote_each(args, |s| go_quote(&s)))));
    funcs.add("squote", |args| Ok(Value::String(quote_each(args, |s| format!("'{s}'")))));
    funcs.add("snakecase", |args| map_str("snakecase", args, |s| words(s).join("_")));
    funcs.add("kebabcase", |args| map_str("kebabcase", args, |s| words(s).join("-")));
    funcs.add("camelcase", |args| {
        map_str("camelcase", args, |s| words(s).iter().map(|w| upper_first(w)).collect())
    });
    funcs.add("b64enc", |args| map_str("b64enc", args, |s| BASE64.encode(s.as_bytes())));
    funcs.add("b64dec", |args| {
        let s = str_arg("b64dec", args1("b64dec", args)?)?;
        let bytes = BASE64
            .decode(s.as_bytes())
            .map_err(|e| FuncError::new(format!("b64dec: {e}")))?;
        String::from_utf8(bytes)
            .map(Value::String)
            .map_err(|e| FuncError::new(format!("b64dec: {e}")))
    });
    funcs.add("sha256sum", |args| {
        map_str("sha256sum", args, |s| {
            Sha256::digest(s.as_bytes())
                .iter()
                .map(|b| format!("{b:02x}"))
                .collect()
        })
    });
    funcs.add("toString", |args| Ok(Value::String(strval(args1("toString", args)?))));
    funcs.add("splitList", |args| {
        with_str("splitList", args, |sep, s| s.split(sep).collect())
    });
    funcs.add("join", join);
    funcs.add("indent", |args| indent("indent", args, false));
    funcs.add("nindent", |args| indent("nindent", args, true));
    funcs.add("ternary", |args| {
        let (yes, no, cond) = args3("ternary", args)?;
        Ok(if cond.is_true() { yes.clone() } else { no.clone() })
    });
    funcs.add("cat", |args| {
        let parts: Vec<String> = args
            .iter()
            .filter(|v| !matches!(v, Value::Nil))
            .map(strval)
            .collect();
        Ok(Value::String(parts.join(" ")))
    });
    funcs.add("coalesce", |args| {
        Ok(args.iter().find(|v| v.is_true()).cloned().unwrap_or(Value::Nil))
    });
    funcs.add("empty", |args| Ok(Value::Bool(!args1("empty", args)?.is_true())));
    funcs.add("default", |args| match args {
        [fallback] => Ok(fallback.clone()),
        [fallback, given] if !given.is_true() => Ok(fallback.clone()),
        [_, given] => Ok(given.clone()),
        _ => Err(FuncError::new(format!(
            "wrong number of args for default: want 1 or 2 got {}",
            args.len()
        ))),
    });
    funcs.add("list", |args| Ok(Value::List(args.to_vec())));
}

/// Fails when a result of `size` bytes (or an overflowing size) is too big.
fn limit(name: &str, size: Option<usize>) -> Result<usize, FuncError> {
    size.filter(|&n| n <= MAX_OUTPUT_LEN).ok_or_else(|| {
        FuncError::new(format!("{name}: result would exceed {MAX_OUTPUT_LEN} bytes"))
    })
}

fn map_str(name: &str, args: &[Value], f: impl FnOnce(&str) -> String) -> FuncResult {
    let s = str_arg(name, args1(name, args)?)?;
    Ok(Value::String(f(s)))
}

fn with_str(name: &str, args: &[Value], f: impl FnOnce(&str, &str) -> Value) -> FuncResult {
    let (a, s) = args2(name, args)?;
    Ok(f(str_arg(name, a)?, str_arg(name, s)?))
}

/// Text form of any value, as `toString` prints it.
fn strval(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        other => other.to_string(),
    }
}

fn quote_each(args: &[Value], quote: impl Fn(String) -> String) -> String {
    args.iter()
        .filter(|v| !matches!(v, Value::Nil))
        .map(|v| quote(strval(v)))
        .collect::<Vec<_>>()
        .join(" ")
}

fn repeat(args: &[Value]) -> FuncResult {
    let (count, s) = args2("repeat", args)?;
    let (count, s) = (int_arg("repeat", count)?, str_arg("repeat", s)?);
    let count = usize::try_from(count)
        .map_err(|_| FuncError::new(format!("repeat: negative count {count}")))?;
    limit("repeat", s.len().checked_mul(count))?;
    Ok(Value::String(s.repeat(count)))
}

fn join(args: &[Value]) -> FuncResult {
    let (sep, items) = args2("join", args)?;
    let sep = str_arg("join", sep)?;
    let parts: Vec<String> = match items {
        Value::List(items) => items
            .iter()
            .filter(|v| !matches!(v, Value::Nil))
            .map(strval)
            .collect(),
        Value::Nil => Vec::new(),
        other => vec![strval(other)],
    };
    let size = parts.iter().try_fold(0usize, |acc, p| acc.checked_add(p.len())).and_then(|n| {
        sep.len()
            .checked_mul(parts.len().saturating_sub(1))
            .and_then(|seps| n.checked_add(seps))
    });
    limit("join", size)?;
    Ok(Value::String(parts.join(sep)))
}

/// `indent n s` pads every line of `s`; `nindent` also starts a new line.
fn indent(name: &str, args: &[Value], newline: bool) -> FuncResult {
    let (width, s) = args2(name, args)?;
    let (width, s) = (int_arg(name, width)?, str_arg(name, s)?);
    let width = usize::try_from(width)
        .map_err(|_| FuncError::new(format!("{name}: negative width {width}")))?;
    let lines = s.split('\n').count();
    let size = width
        .checked_mul(lines)
        .and_then(|pad| pad.checked_add(s.len() + usize::from(newline)));
    limit(name, size)?;

    let pad = " ".repeat(width);
    let body = s
        .split('\n')
        .map(|line| format!("{pad}{line}"))
        .collect::<Vec<_>>()
        .join("\n");
    Ok(Value::String(if newline { format!("\n{body}") } else { body }))
}

/// Characters `start..end`; a negative `end` means the rest of the string.
fn substr(s: &str, start: i64, end: i64) -> String {
    let len = i64::try_from(s.chars().count()).unwrap_or(i64::MAX);
    let start = start.clamp(0, len);
    let end = if end < 0 { len } else { end.clamp(start, len) };
    s.chars()
        .skip(usize::try_from(start).unwrap_or(0))
        .take(usize::try_from(end - start).unwrap_or(0))
        .collect()
}

/// The first `n` characters, or the last `-n` when `n` is negative.
fn trunc(s: &str, n: i64) -> String {
    let len = s.chars().count();
    let keep = usize::try_from(n.unsigned_abs()).unwrap_or(usize::MAX);
    if keep >= len {
        return s.to_string();
    }
    if n >= 0 {
        s.chars().take(keep).collect()
    } else {
        s.chars().skip(len - keep).collect()
    }
}

/// Shortens to at most `width` characters ending in `...`. Widths below 4
/// leave the string alone.
fn abbrev(s: &str, width: i64) -> String {
    let Ok(width) = usize::try_from(width) else {
        return s.to_string();
    };
    if width < 4 || s.chars().count() <= width {
        return s.to_string();
    }
    let head: String = s.chars().take(width - 3).collect();
    format!("{head}...")
}

/// Uppercases the first letter of every word.
fn title(s: &str) -> String {
    let mut at_start = true;
    s.chars()
        .flat_map(|c| {
            let out: Vec<char> = if at_start {
                c.to_uppercase().collect()
            } else {
                vec![c]
            };
            at_start = !(c.is_alphanumeric() || c == '_' || c == '\'');
            out
        })
        .collect()
}

/// Lowercase words, split on separators, on lower-to-upper changes and
/// before the last capital of an acronym (`HTTPServer` is `http server`).
fn words(s: &str) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        if c.is_uppercase() && !current.is_empty() {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if prev.is_lowercase() || prev.is_numeric() || (prev.is_uppercase() && next_lower) {
                words.push(std::mem::take(&mut current));
            }
        }
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

fn upper_first(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn lower_first(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: &[Value]) -> FuncResult {
        let mut funcs = Funcs::builtin();
        register(&mut funcs);
        let f = funcs.get(name).unwrap();
        f(args)
    }

    fn s(name: &str, args: &[Value]) -> String {
        match call(name, args).unwrap() {
            Value::String(s) => s,
            other => panic!("{name} returned {other:?}"),
        }
    }

    #[test]
    fn test_replace_and_case() {
        assert_eq!(s("replace", &["nginx".into(), "sprig".into(), "check-nginx".into()]), "check-sprig");
        assert_eq!(s("replace", &["".into(), "-".into(), "ab".into()]), "-a-b-");
        assert_eq!(s("upper", &["check".into()]), "CHECK");
        assert_eq!(s("title", &["disk usage high".into()]), "Disk Usage High");
        assert_eq!(s("untitle", &["Hello World".into()]), "hello world");
        assert_eq!(s("initials", &["web server one".into()]), "wso");
    }

    #[test]
    fn test_trim_family() {
        assert_eq!(s("trimPrefix", &["check-".into(), "check-nginx".into()]), "nginx");
        assert_eq!(s("trimSuffix", &["-nginx".into(), "check-nginx".into()]), "check");
        assert_eq!(s("trimPrefix", &["zzz".into(), "check-nginx".into()]), "check-nginx");
        assert_eq!(s("trimAll", &["$".into(), "$$5.00$".into()]), "5.00");
        assert_eq!(s("trim", &["  x \n".into()]), "x");
    }

    #[test]
    fn test_predicates() {
        assert_eq!(call("hasPrefix", &["check".into(), "check-nginx".into()]).unwrap(), Value::Bool(true));
        assert_eq!(call("hasSuffix", &["x".into(), "check-nginx".into()]).unwrap(), Value::Bool(true));
        assert_eq!(call("contains", &["web".into(), "check-nginx".into()]).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_slicing() {
        let name = Value::from("check-nginx");
        assert_eq!(s("substr", &[Value::Int(0), Value::Int(5), name.clone()]), "check");
        assert_eq!(s("substr", &[Value::Int(6), Value::Int(100), name.clone()]), "nginx");
        assert_eq!(s("trunc", &[Value::Int(5), name.clone()]), "check");
        assert_eq!(s("trunc", &[Value::Int(-5), name.clone()]), "nginx");
        assert_eq!(s("trunc", &[Value::Int(50), name.clone()]), "check-nginx");
        assert_eq!(s("abbrev", &[Value::Int(8), name.clone()]), "check...");
        assert_eq!(s("abbrev", &[Value::Int(2), name]), "check-nginx");
    }

    #[test]
    fn test_case_conversion() {
        assert_eq!(s("snakecase", &["HTTPServer errorCount".into()]), "http_server_error_count");
        assert_eq!(s("kebabcase", &["disk_usage high".into()]), "disk-usage-high");
        assert_eq!(s("camelcase", &["disk_usage-high".into()]), "DiskUsageHigh");
    }

    #[test]
    fn test_encoding() {
        assert_eq!(s("b64enc", &["nginx".into()]), "bmdpbng=");
        assert_eq!(s("b64dec", &["bmdpbng=".into()]), "nginx");
        assert!(call("b64dec", &["!!!".into()]).is_err());
        assert_eq!(
            s("sha256sum", &["abc".into()]),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_quote_matches_go_escaping() {
        assert_eq!(s("quote", &["check-nginx".into()]), "\"check-nginx\"");
        assert_eq!(s("quote", &["a\tb".into()]), r#""a\tb""#);
        assert_eq!(s("quote", &["\u{7f}".into()]), r#""\x7f""#);
        assert_eq!(s("quote", &["a".into(), Value::Nil, Value::Int(2)]), r#""a" "2""#);
        assert_eq!(s("squote", &["check-nginx".into()]), "'check-nginx'");
    }

    #[test]
    fn test_layout_helpers() {
        assert_eq!(s("nospace", &["a b\tc".into()]), "abc");
        assert_eq!(s("indent", &[Value::Int(2), "a\nb".into()]), "  a\n  b");
        assert_eq!(s("nindent", &[Value::Int(2), "a".into()]), "\n  a");
        assert_eq!(s("repeat", &[Value::Int(3), "ab".into()]), "ababab");
        let parts = call("splitList", &[",".into(), "a,b,c".into()]).unwrap();
        assert_eq!(s("join", &["+".into(), parts]), "a+b+c");
        assert_eq!(s("toString", &[Value::Int(42)]), "42");
    }

    #[test]
    fn test_growth_is_bounded() {
        let err = call("repeat", &[Value::Int(i64::MAX), "ab".into()]).unwrap_err();
        assert_eq!(err.to_string(), format!("repeat: result would exceed {MAX_OUTPUT_LEN} bytes"));
        assert!(call("repeat", &[Value::Int(-1), "ab".into()]).is_err());
        assert!(call("repeat", &[Value::Int(i64::MAX), "".into()]).is_ok());

        let err = call("indent", &[Value::Int(i64::MAX), "a\nb".into()]).unwrap_err();
        assert!(err.to_string().starts_with("indent: result would exceed"));
        let err = call("nindent", &[Value::Int(1 << 40), "a".into()]).unwrap_err();
        assert!(err.to_string().starts_with("nindent: result would exceed"));
        assert!(call("indent", &[Value::Int(-4), "a".into()]).is_err());

        let big = Value::String("x".repeat((1 << 10) + 1));
        let err = call("replace", &["x".into(), big.clone(), big.clone()]).unwrap_err();
        assert!(err.to_string().starts_with("replace: result would exceed"));

        let many: Value = std::iter::repeat("a").take(1 << 11).collect();
        let err = call("join", &[big, many]).unwrap_err();
        assert!(err.to_string().starts_with("join: result would exceed"));
    }

    #[test]
    fn test_value_helpers() {
        assert_eq!(s("cat", &["check".into(), Value::Nil, "failed".into(), Value::Int(2)]), "check failed 2");
        assert_eq!(call("coalesce", &["".into(), Value::Nil, "x".into()]).unwrap(), Value::from("x"));
        assert_eq!(call("empty", &["".into()]).unwrap(), Value::Bool(true));
        assert_eq!(call("default", &["n/a".into(), "".into()]).unwrap(), Value::from("n/a"));
        assert_eq!(call("default", &["n/a".into(), "x".into()]).unwrap(), Value::from("x"));
        assert_eq!(call("default", &["n/a".into()]).unwrap(), Value::from("n/a"));
        assert_eq!(call("ternary", &["yes".into(), "no".into(), Value::Bool(true)]).unwrap(), Value::from("yes"));
        assert_eq!(
            call("list", &["a".into(), Value::Int(1)]).unwrap(),
            Value::List(vec!["a".into(), Value::Int(1)])
        );
    }

    #[test]
    fn test_type_errors() {
        let err = call("upper", &[Value::Int(1)]).unwrap_err();
        assert_eq!(err.to_string(), "upper: expected string, got int");
        let err = call("replace", &["a".into(), "b".into()]).unwrap_err();
        assert_eq!(err.to_string(), "wrong number of args for replace: want 3 got 2");
    }
}
