//! String functions. Positions are 1-based and lengths count Unicode
//! code points.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use crate::ast::{EvalCtx, Expr};
use crate::error::{Error, Result};
use crate::functions::{
    eval_arg, int_arg, string_arg, Function, FunctionRegistry, Idempotency,
};
use crate::value::Value;

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.add(Function::native("BASE64DEC", 1, 1, Idempotency::Args, base64dec));
    registry.add(Function::native("BASE64ENC", 1, 1, Idempotency::Args, base64enc));
    registry.add(Function::native("CHAR", 1, 1, Idempotency::Args, char_fn));
    registry.add(Function::native("CHARINDEX", 2, 3, Idempotency::Args, charindex));
    registry.add(Function::native("CONCAT", 1, usize::MAX, Idempotency::Args, concat));
    registry.add(Function::native("CONCAT_WS", 2, usize::MAX, Idempotency::Args, concat_ws));
    registry.add(Function::native("LEFT", 2, 2, Idempotency::Args, left));
    registry.add(Function::native("LEN", 1, 1, Idempotency::Args, len));
    registry.add(Function::native("LOWER", 1, 1, Idempotency::Args, lower));
    registry.add(Function::native("LPAD", 2, 3, Idempotency::Args, lpad));
    registry.add(Function::native("LTRIM", 1, 1, Idempotency::Args, ltrim));
    registry.add(Function::native("NCHAR", 1, 1, Idempotency::Args, char_fn));
    registry.add(Function::native("REPLICATE", 2, 2, Idempotency::Args, replicate));
    registry.add(Function::native("REVERSE", 1, 1, Idempotency::Args, reverse));
    registry.add(Function::native("RIGHT", 2, 2, Idempotency::Args, right));
    registry.add(Function::native("RTRIM", 1, 1, Idempotency::Args, rtrim));
    registry.add(Function::native("SPACE", 1, 1, Idempotency::Args, space));
    registry.add(Function::native("STUFF", 4, 4, Idempotency::Args, stuff));
    registry.add(Function::native("SUBSTRING", 3, 3, Idempotency::Args, substring));
    registry.add(Function::native("TRIM", 1, 1, Idempotency::Args, trim));
    registry.add(Function::native("UNICODE", 1, 1, Idempotency::Args, unicode));
    registry.add(Function::native("UPPER", 1, 1, Idempotency::Args, upper));
}

fn char_fn(args: &[Expr], ctx: &EvalCtx<'_>) -> Result<Value> {
    let Some(code) = int_arg(args, 0, ctx)? else {
        return Ok(Value::Null);
    };
    if code < 0 || code > i64::from(i32::MAX) {
        return Ok(Value::Null);
    }
    Ok(u32::try_from(code)
        .ok()
        .and_then(char::from_u32)
        .map_or(Value::Null, |c| Value::String(c.to_string())))
}

fn charindex(args: &[Expr], ctx: &EvalCtx<'_>) -> Result<Value> {
    let (Some(hay), Some(needle)) = (string_arg(args, 0, ctx)?, string_arg(args, 1, ctx)?) else {
        return Ok(Value::Null);
    };
    let start = if args.len() > 2 {
        match int_arg(args, 2, ctx)? {
            Some(start) => start,
            None => return Ok(Value::Null),
        }
    } else {
        1
    };

    let hay: Vec<char> = hay.chars().collect();
    let needle: Vec<char> = needle.chars().collect();
    // A negative start clamps to the beginning, one past the end to the end.
    let from = (start.max(1) - 1).min(hay.len() as i64) as usize;
    if needle.len() > hay.len() {
        return Ok(Value::Int(0));
    }
    for i in from..=(hay.len() - needle.len()) {
        if hay[i..i + needle.len()] == needle[..] {
            return Ok(Value::Int(i as i64 + 1));
        }
    }
    Ok(Value::Int(0))
}

fn concat(args: &[Expr], ctx: &EvalCtx<'_>) -> Result<Value> {
    let mut out = String::new();
    for i in 0..args.len() {
        if let Some(part) = string_arg(args, i, ctx)? {
            out.push_str(&part);
        }
    }
    Ok(Value::String(out))
}

fn concat_ws(args: &[Expr], ctx: &EvalCtx<'_>) -> Result<Value> {
    let separator = string_arg(args, 0, ctx)?.unwrap_or_default();
    let mut parts = Vec::new();
    for i in 1..args.len() {
        if let Some(part) = string_arg(args, i, ctx)? {
            parts.push(part);
        }
    }
    Ok(Value::String(parts.join(&separator)))
}

fn base64enc(args: &[Expr], ctx: &EvalCtx<'_>) -> Result<Value> {
    Ok(string_arg(args, 0, ctx)?
        .map_or(Value::Null, |s| Value::String(BASE64.encode(s.as_bytes()))))
}

fn base64dec(args: &[Expr], ctx: &EvalCtx<'_>) -> Result<Value> {
    let Some(encoded) = string_arg(args, 0, ctx)? else {
        return Ok(Value::Null);
    };
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| Error::InvalidArgument(format!("invalid base64: {e}")))?;
    Ok(Value::String(String::from_utf8_lossy(&bytes).into_owned()))
}

fn left(args: &[Expr], ctx: &EvalCtx<'_>) -> Result<Value> {
    let (Some(s), Some(n)) = (string_arg(args, 0, ctx)?, int_arg(args, 1, ctx)?) else {
        return Ok(Value::Null);
    };
    let take = n.max(0) as usize;
    Ok(Value::String(s.chars().take(take).collect()))
}

fn right(args: &[Expr], ctx: &EvalCtx<'_>) -> Result<Value> {
    let (Some(s), Some(n)) = (string_arg(args, 0, ctx)?, int_arg(args, 1, ctx)?) else {
        return Ok(Value::Null);
    };
    let chars: Vec<char> = s.chars().collect();
    let take = (n.max(0) as usize).min(chars.len());
    Ok(Value::String(chars[chars.len() - take..].iter().collect()))
}

fn len(args: &[Expr], ctx: &EvalCtx<'_>) -> Result<Value> {
    Ok(string_arg(args, 0, ctx)?
        .map_or(Value::Null, |s| Value::Int(s.chars().count() as i64)))
}

fn lower(args: &[Expr], ctx: &EvalCtx<'_>) -> Result<Value> {
    Ok(string_arg(args, 0, ctx)?.map_or(Value::Null, |s| Value::String(s.to_lowercase())))
}

fn upper(args: &[Expr], ctx: &EvalCtx<'_>) -> Result<Value> {
    Ok(string_arg(args, 0, ctx)?.map_or(Value::Null, |s| Value::String(s.to_uppercase())))
}

/// Reads a pad argument: a one-rune string or an integer code point.
fn pad_rune(args: &[Expr], i: usize, ctx: &EvalCtx<'_>) -> Result<Option<char>> {
    match eval_arg(args, i, ctx)? {
        Value::Null => Ok(None),
        Value::Int(code) => u32::try_from(code)
            .ok()
            .and_then(char::from_u32)
            .map(Some)
            .ok_or_else(|| Error::InvalidArgument(format!("{code} is not a pad code point"))),
        Value::String(s) => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(Some(c)),
                _ => Err(Error::InvalidArgument(format!(
                    "pad string '{s}' must be a single rune"
                ))),
            }
        }
        other => Err(Error::InvalidArgument(format!(
            "pad must be a rune or code point, got {other}"
        ))),
    }
}

fn lpad(args: &[Expr], ctx: &EvalCtx<'_>) -> Result<Value> {
    let (Some(s), Some(width)) = (string_arg(args, 0, ctx)?, int_arg(args, 1, ctx)?) else {
        return Ok(Value::Null);
    };
    if width < 0 {
        return Ok(Value::Null);
    }
    let pad = if args.len() > 2 {
        match pad_rune(args, 2, ctx)? {
            Some(c) => c,
            None => return Ok(Value::Null),
        }
    } else {
        ' '
    };
    let width = width as usize;
    let length = s.chars().count();
    if length >= width {
        // Longer inputs truncate from the right.
        return Ok(Value::String(s.chars().take(width).collect()));
    }
    let mut out: String = std::iter::repeat(pad).take(width - length).collect();
    out.push_str(&s);
    Ok(Value::String(out))
}

fn ltrim(args: &[Expr], ctx: &EvalCtx<'_>) -> Result<Value> {
    Ok(string_arg(args, 0, ctx)?
        .map_or(Value::Null, |s| Value::String(s.trim_start().to_string())))
}

fn rtrim(args: &[Expr], ctx: &EvalCtx<'_>) -> Result<Value> {
    Ok(string_arg(args, 0, ctx)?
        .map_or(Value::Null, |s| Value::String(s.trim_end().to_string())))
}

fn trim(args: &[Expr], ctx: &EvalCtx<'_>) -> Result<Value> {
    Ok(string_arg(args, 0, ctx)?.map_or(Value::Null, |s| Value::String(s.trim().to_string())))
}

fn replicate(args: &[Expr], ctx: &EvalCtx<'_>) -> Result<Value> {
    let (Some(s), Some(n)) = (string_arg(args, 0, ctx)?, int_arg(args, 1, ctx)?) else {
        return Ok(Value::Null);
    };
    if n < 0 {
        return Ok(Value::Null);
    }
    Ok(Value::String(s.repeat(n as usize)))
}

fn reverse(args: &[Expr], ctx: &EvalCtx<'_>) -> Result<Value> {
    Ok(string_arg(args, 0, ctx)?
        .map_or(Value::Null, |s| Value::String(s.chars().rev().collect())))
}

fn space(args: &[Expr], ctx: &EvalCtx<'_>) -> Result<Value> {
    let Some(n) = int_arg(args, 0, ctx)? else {
        return Ok(Value::Null);
    };
    if n < 0 {
        return Ok(Value::Null);
    }
    Ok(Value::String(" ".repeat(n as usize)))
}

fn stuff(args: &[Expr], ctx: &EvalCtx<'_>) -> Result<Value> {
    let (Some(s), Some(start), Some(delete), Some(replace)) = (
        string_arg(args, 0, ctx)?,
        int_arg(args, 1, ctx)?,
        int_arg(args, 2, ctx)?,
        string_arg(args, 3, ctx)?,
    ) else {
        return Ok(Value::Null);
    };
    let chars: Vec<char> = s.chars().collect();
    if start <= 0 || start > chars.len() as i64 || delete < 0 {
        return Ok(Value::Null);
    }
    let from = (start - 1) as usize;
    let delete = (delete as usize).min(chars.len() - from);
    let mut out: String = chars[..from].iter().collect();
    out.push_str(&replace);
    out.extend(&chars[from + delete..]);
    Ok(Value::String(out))
}

fn substring(args: &[Expr], ctx: &EvalCtx<'_>) -> Result<Value> {
    let (Some(s), Some(start), Some(length)) = (
        string_arg(args, 0, ctx)?,
        int_arg(args, 1, ctx)?,
        int_arg(args, 2, ctx)?,
    ) else {
        return Ok(Value::Null);
    };
    if length < 0 {
        return Err(Error::InvalidArgument(format!(
            "SUBSTRING length {length} is negative"
        )));
    }
    // start ≤ 0 clamps to the string start; over-runs truncate.
    let skip = (start.max(1) - 1) as usize;
    Ok(Value::String(
        s.chars().skip(skip).take(length as usize).collect(),
    ))
}

fn unicode(args: &[Expr], ctx: &EvalCtx<'_>) -> Result<Value> {
    let Some(s) = string_arg(args, 0, ctx)? else {
        return Ok(Value::Null);
    };
    Ok(s.chars()
        .next()
        .map_or(Value::Null, |c| Value::Int(i64::from(u32::from(c)))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::Scope;

    fn call(f: super::super::NativeFn, args: Vec<Value>) -> Result<Value> {
        let exprs: Vec<Expr> = args.into_iter().map(Expr::Constant).collect();
        let scope = Scope::new();
        let ctx = EvalCtx::statement(&scope);
        f(&exprs, &ctx)
    }

    fn s(v: &str) -> Value {
        Value::String(v.to_string())
    }

    #[test]
    fn test_char() {
        assert_eq!(call(char_fn, vec![Value::Int(65)]).unwrap(), s("A"));
        assert_eq!(call(char_fn, vec![Value::Int(0x1F980)]).unwrap(), s("🦀"));
        assert_eq!(call(char_fn, vec![Value::Int(-1)]).unwrap(), Value::Null);
        assert_eq!(
            call(char_fn, vec![Value::Int(i64::from(i32::MAX) + 1)]).unwrap(),
            Value::Null
        );
        assert_eq!(call(char_fn, vec![Value::Null]).unwrap(), Value::Null);
    }

    #[test]
    fn test_charindex() {
        assert_eq!(
            call(charindex, vec![s("hello world"), s("world")]).unwrap(),
            Value::Int(7)
        );
        assert_eq!(
            call(charindex, vec![s("hello"), s("zz")]).unwrap(),
            Value::Int(0)
        );
        // Negative start clamps to the beginning.
        assert_eq!(
            call(charindex, vec![s("aba"), s("a"), Value::Int(-5)]).unwrap(),
            Value::Int(1)
        );
        assert_eq!(
            call(charindex, vec![s("aba"), s("a"), Value::Int(2)]).unwrap(),
            Value::Int(3)
        );
        // Start past the end clamps to the end.
        assert_eq!(
            call(charindex, vec![s("aba"), s("a"), Value::Int(99)]).unwrap(),
            Value::Int(0)
        );
    }

    #[test]
    fn test_concat_elides_nulls() {
        assert_eq!(
            call(concat, vec![s("a"), Value::Null, s("b"), Value::Int(1)]).unwrap(),
            s("ab1")
        );
    }

    #[test]
    fn test_concat_ws() {
        assert_eq!(
            call(concat_ws, vec![s(","), s("a"), Value::Null, s("b")]).unwrap(),
            s("a,b")
        );
        // Null separator behaves as CONCAT.
        assert_eq!(
            call(concat_ws, vec![Value::Null, s("a"), s("b")]).unwrap(),
            s("ab")
        );
    }

    #[test]
    fn test_base64_round_trip() {
        let encoded = call(base64enc, vec![s("hello")]).unwrap();
        assert_eq!(encoded, s("aGVsbG8="));
        assert_eq!(call(base64dec, vec![encoded]).unwrap(), s("hello"));
        assert!(call(base64dec, vec![s("!!")]).is_err());
    }

    #[test]
    fn test_left_right() {
        assert_eq!(call(left, vec![s("héllo"), Value::Int(2)]).unwrap(), s("hé"));
        assert_eq!(call(left, vec![s("ab"), Value::Int(9)]).unwrap(), s("ab"));
        assert_eq!(call(left, vec![s("ab"), Value::Int(-3)]).unwrap(), s(""));
        assert_eq!(call(right, vec![s("héllo"), Value::Int(3)]).unwrap(), s("llo"));
        assert_eq!(call(right, vec![s("ab"), Value::Int(9)]).unwrap(), s("ab"));
    }

    #[test]
    fn test_len_counts_code_points() {
        assert_eq!(call(len, vec![s("héllo")]).unwrap(), Value::Int(5));
        assert_eq!(call(len, vec![s("")]).unwrap(), Value::Int(0));
        assert_eq!(call(len, vec![Value::Null]).unwrap(), Value::Null);
    }

    #[test]
    fn test_case_mapping() {
        assert_eq!(call(lower, vec![s("HeLLo")]).unwrap(), s("hello"));
        assert_eq!(call(upper, vec![s("HeLLo")]).unwrap(), s("HELLO"));
    }

    #[test]
    fn test_lpad() {
        assert_eq!(call(lpad, vec![s("7"), Value::Int(3)]).unwrap(), s("  7"));
        assert_eq!(
            call(lpad, vec![s("7"), Value::Int(3), s("0")]).unwrap(),
            s("007")
        );
        // Longer than the width truncates from the right.
        assert_eq!(
            call(lpad, vec![s("abcdef"), Value::Int(3)]).unwrap(),
            s("abc")
        );
        assert!(call(lpad, vec![s("x"), Value::Int(3), s("ab")]).is_err());
        // An integer pad is a code point.
        assert_eq!(
            call(lpad, vec![s("7"), Value::Int(3), Value::Int(48)]).unwrap(),
            s("007")
        );
    }

    #[test]
    fn test_trims_use_unicode_whitespace() {
        assert_eq!(call(trim, vec![s("\u{2003} x \u{2003}")]).unwrap(), s("x"));
        assert_eq!(call(ltrim, vec![s("  x  ")]).unwrap(), s("x  "));
        assert_eq!(call(rtrim, vec![s("  x  ")]).unwrap(), s("  x"));
    }

    #[test]
    fn test_replicate_and_space() {
        assert_eq!(
            call(replicate, vec![s("ab"), Value::Int(3)]).unwrap(),
            s("ababab")
        );
        assert_eq!(
            call(replicate, vec![s("ab"), Value::Int(-1)]).unwrap(),
            Value::Null
        );
        assert_eq!(call(space, vec![Value::Int(3)]).unwrap(), s("   "));
        assert_eq!(call(space, vec![Value::Int(-1)]).unwrap(), Value::Null);
    }

    #[test]
    fn test_reverse() {
        assert_eq!(call(reverse, vec![s("abc")]).unwrap(), s("cba"));
    }

    #[test]
    fn test_stuff() {
        assert_eq!(
            call(
                stuff,
                vec![s("abcdef"), Value::Int(2), Value::Int(3), s("XY")]
            )
            .unwrap(),
            s("aXYef")
        );
        // Out-of-domain starts and negative lengths yield Null.
        assert_eq!(
            call(stuff, vec![s("abc"), Value::Int(0), Value::Int(1), s("X")]).unwrap(),
            Value::Null
        );
        assert_eq!(
            call(stuff, vec![s("abc"), Value::Int(4), Value::Int(1), s("X")]).unwrap(),
            Value::Null
        );
        assert_eq!(
            call(stuff, vec![s("abc"), Value::Int(1), Value::Int(-1), s("X")]).unwrap(),
            Value::Null
        );
        // The deleted range clamps to what remains.
        assert_eq!(
            call(stuff, vec![s("abc"), Value::Int(2), Value::Int(99), s("X")]).unwrap(),
            s("aX")
        );
    }

    #[test]
    fn test_substring() {
        assert_eq!(
            call(substring, vec![s("hello"), Value::Int(2), Value::Int(3)]).unwrap(),
            s("ell")
        );
        // Full-width slice is the identity.
        assert_eq!(
            call(substring, vec![s("hello"), Value::Int(1), Value::Int(5)]).unwrap(),
            s("hello")
        );
        // start ≤ 0 clamps to the start.
        assert_eq!(
            call(substring, vec![s("hello"), Value::Int(0), Value::Int(2)]).unwrap(),
            s("he")
        );
        // Over-run truncates.
        assert_eq!(
            call(substring, vec![s("hello"), Value::Int(4), Value::Int(99)]).unwrap(),
            s("lo")
        );
        assert!(
            call(substring, vec![s("hello"), Value::Int(1), Value::Int(-1)]).is_err()
        );
    }

    #[test]
    fn test_unicode() {
        assert_eq!(call(unicode, vec![s("Ax")]).unwrap(), Value::Int(65));
        assert_eq!(call(unicode, vec![s("🦀")]).unwrap(), Value::Int(0x1F980));
        assert_eq!(call(unicode, vec![s("")]).unwrap(), Value::Null);
    }
}
