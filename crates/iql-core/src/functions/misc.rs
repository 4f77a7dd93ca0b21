//! Math and visualization functions.

use crate::ast::{EvalCtx, Expr};
use crate::error::{Error, Result};
use crate::functions::{
    eval_arg, float_arg, int_arg, Function, FunctionRegistry, Idempotency,
};
use crate::value::{values_equal, Value};

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.add(Function::native("FLOOR", 1, 1, Idempotency::Args, floor));
    registry.add(Function::native("HBAR", 3, 4, Idempotency::Args, hbar));
    registry.add(Function::native("NULLIF", 2, 2, Idempotency::Args, nullif));
}

fn nullif(args: &[Expr], ctx: &EvalCtx<'_>) -> Result<Value> {
    let a = eval_arg(args, 0, ctx)?;
    let b = eval_arg(args, 1, ctx)?;
    if values_equal(&a, &b).unwrap_or(false) {
        Ok(Value::Null)
    } else {
        Ok(a)
    }
}

fn floor(args: &[Expr], ctx: &EvalCtx<'_>) -> Result<Value> {
    Ok(match eval_arg(args, 0, ctx)? {
        Value::Int(v) => Value::Int(v),
        Value::Float(v) => Value::Float(v.floor()),
        _ => Value::Null,
    })
}

/// The left one-eighth through seven-eighths block elements, by fill.
const EIGHTHS: [char; 7] = ['\u{258F}', '\u{258E}', '\u{258D}', '\u{258C}', '\u{258B}', '\u{258A}', '\u{2589}'];
const FULL_BLOCK: char = '\u{2588}';

/// Reads the HBAR pad argument: a one-rune string or an integer code
/// point; default space.
fn pad_arg(args: &[Expr], ctx: &EvalCtx<'_>) -> Result<Option<char>> {
    if args.len() < 4 {
        return Ok(Some(' '));
    }
    match eval_arg(args, 3, ctx)? {
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

/// `HBAR(value, max, width[, pad])`: a `width`-character bar whose filled
/// share is `value/max`, drawn with block elements; the fractional cell
/// uses the partial glyphs.
fn hbar(args: &[Expr], ctx: &EvalCtx<'_>) -> Result<Value> {
    let (Some(value), Some(max), Some(width)) = (
        float_arg(args, 0, ctx)?,
        float_arg(args, 1, ctx)?,
        int_arg(args, 2, ctx)?,
    ) else {
        return Ok(Value::Null);
    };
    let Some(pad) = pad_arg(args, ctx)? else {
        return Ok(Value::Null);
    };
    if width < 0 {
        return Err(Error::InvalidArgument(format!(
            "HBAR width {width} is negative"
        )));
    }
    let width = width as usize;

    let ratio = if max == 0.0 { 0.0 } else { value / max };
    let filled = ratio.clamp(0.0, 1.0) * width as f64;
    let full = filled.floor() as usize;
    let eighths = ((filled - filled.floor()) * 8.0).round() as usize;
    let (full, eighths) = if eighths == 8 { (full + 1, 0) } else { (full, eighths) };

    let mut bar = String::with_capacity(width * 3);
    for _ in 0..full.min(width) {
        bar.push(FULL_BLOCK);
    }
    if eighths > 0 && full < width {
        bar.push(EIGHTHS[eighths - 1]);
    }
    while bar.chars().count() < width {
        bar.push(pad);
    }
    Ok(Value::String(bar))
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

    #[test]
    fn test_nullif() {
        assert_eq!(
            call(nullif, vec![Value::Int(1), Value::Int(1)]).unwrap(),
            Value::Null
        );
        assert_eq!(
            call(nullif, vec![Value::Int(1), Value::Int(2)]).unwrap(),
            Value::Int(1)
        );
        assert_eq!(
            call(nullif, vec![Value::Null, Value::Null]).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_floor() {
        assert_eq!(call(floor, vec![Value::Int(7)]).unwrap(), Value::Int(7));
        assert_eq!(
            call(floor, vec![Value::Float(2.9)]).unwrap(),
            Value::Float(2.0)
        );
        assert_eq!(
            call(floor, vec![Value::Float(-2.1)]).unwrap(),
            Value::Float(-3.0)
        );
        assert_eq!(
            call(floor, vec![Value::String("x".into())]).unwrap(),
            Value::Null
        );
        assert_eq!(call(floor, vec![Value::Null]).unwrap(), Value::Null);
    }

    #[test]
    fn test_hbar_full_and_empty() {
        assert_eq!(
            call(hbar, vec![Value::Int(10), Value::Int(10), Value::Int(4)]).unwrap(),
            Value::String("████".into())
        );
        assert_eq!(
            call(hbar, vec![Value::Int(0), Value::Int(10), Value::Int(4)]).unwrap(),
            Value::String("    ".into())
        );
    }

    #[test]
    fn test_hbar_partial_glyph() {
        // 5/10 of 4 cells = 2 full cells exactly.
        assert_eq!(
            call(hbar, vec![Value::Int(5), Value::Int(10), Value::Int(4)]).unwrap(),
            Value::String("██  ".into())
        );
        // 1/16 of 4 cells = a quarter cell: the 2/8 glyph.
        assert_eq!(
            call(hbar, vec![Value::Int(1), Value::Int(16), Value::Int(4)]).unwrap(),
            Value::String("▎   ".into())
        );
    }

    #[test]
    fn test_hbar_pad() {
        assert_eq!(
            call(
                hbar,
                vec![
                    Value::Int(1),
                    Value::Int(2),
                    Value::Int(4),
                    Value::String(".".into())
                ]
            )
            .unwrap(),
            Value::String("██..".into())
        );
        assert_eq!(
            call(
                hbar,
                vec![Value::Int(1), Value::Int(2), Value::Int(4), Value::Int(46)]
            )
            .unwrap(),
            Value::String("██..".into())
        );
        assert!(call(
            hbar,
            vec![
                Value::Int(1),
                Value::Int(2),
                Value::Int(4),
                Value::String("ab".into())
            ]
        )
        .is_err());
    }

    #[test]
    fn test_hbar_clamps_over_full() {
        assert_eq!(
            call(hbar, vec![Value::Int(20), Value::Int(10), Value::Int(3)]).unwrap(),
            Value::String("███".into())
        );
        assert_eq!(
            call(hbar, vec![Value::Int(-5), Value::Int(10), Value::Int(3)]).unwrap(),
            Value::String("   ".into())
        );
    }

    #[test]
    fn test_hbar_null_propagates() {
        assert_eq!(
            call(hbar, vec![Value::Null, Value::Int(10), Value::Int(3)]).unwrap(),
            Value::Null
        );
    }
}
