//! Date functions.
//!
//! Integer arguments coerce to dates as Unix-epoch seconds, so `YEAR(0)`
//! is 1970.

use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::ast::{EvalCtx, Expr};
use crate::error::{Error, Result};
use crate::functions::{eval_arg, tag_arg, Function, FunctionRegistry, Idempotency};
use crate::value::Value;

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.add(Function {
        name: "DATEDIFF".to_string(),
        min_args: 3,
        max_args: 3,
        first_bound: 1,
        idempotency: Idempotency::Args,
        kind: super::FunctionKind::Native(datediff),
    });
    registry.add(Function::native("DAY", 1, 1, Idempotency::Args, day));
    registry.add(Function::native(
        "GETDATE",
        0,
        0,
        Idempotency::Volatile,
        getdate,
    ));
    registry.add(Function::native("MONTH", 1, 1, Idempotency::Args, month));
    registry.add(Function::native("YEAR", 1, 1, Idempotency::Args, year));
}

fn getdate(_args: &[Expr], _ctx: &EvalCtx<'_>) -> Result<Value> {
    Ok(Value::Date(Utc::now()))
}

fn date_arg(args: &[Expr], i: usize, ctx: &EvalCtx<'_>) -> Result<Option<DateTime<Utc>>> {
    eval_arg(args, i, ctx)?.date()
}

fn year(args: &[Expr], ctx: &EvalCtx<'_>) -> Result<Value> {
    Ok(date_arg(args, 0, ctx)?
        .map_or(Value::Null, |d| Value::Int(i64::from(d.year()))))
}

fn month(args: &[Expr], ctx: &EvalCtx<'_>) -> Result<Value> {
    Ok(date_arg(args, 0, ctx)?
        .map_or(Value::Null, |d| Value::Int(i64::from(d.month()))))
}

fn day(args: &[Expr], ctx: &EvalCtx<'_>) -> Result<Value> {
    Ok(date_arg(args, 0, ctx)?
        .map_or(Value::Null, |d| Value::Int(i64::from(d.day()))))
}

/// Truncates a date to the unit boundary.
fn truncate(date: DateTime<Utc>, unit: Unit) -> DateTime<Utc> {
    let d = date;
    match unit {
        Unit::Year | Unit::Day => d
            .with_hour(0)
            .and_then(|d| d.with_minute(0))
            .and_then(|d| d.with_second(0))
            .and_then(|d| d.with_nanosecond(0))
            .unwrap_or(d),
        Unit::Hour => d
            .with_minute(0)
            .and_then(|d| d.with_second(0))
            .and_then(|d| d.with_nanosecond(0))
            .unwrap_or(d),
        Unit::Minute => d
            .with_second(0)
            .and_then(|d| d.with_nanosecond(0))
            .unwrap_or(d),
        Unit::Second => d.with_nanosecond(0).unwrap_or(d),
        Unit::Millisecond => d
            .with_nanosecond(d.nanosecond() / 1_000_000 * 1_000_000)
            .unwrap_or(d),
        Unit::Microsecond => d
            .with_nanosecond(d.nanosecond() / 1_000 * 1_000)
            .unwrap_or(d),
        Unit::Nanosecond => d,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unit {
    Year,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
    Microsecond,
    Nanosecond,
}

impl Unit {
    fn parse(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "year" | "yy" | "yyyy" => Ok(Self::Year),
            "day" | "dd" | "d" => Ok(Self::Day),
            "hour" | "hh" => Ok(Self::Hour),
            "minute" | "mi" | "n" => Ok(Self::Minute),
            "second" | "ss" | "s" => Ok(Self::Second),
            "millisecond" | "ms" => Ok(Self::Millisecond),
            "microsecond" | "mcs" => Ok(Self::Microsecond),
            "nanosecond" | "ns" => Ok(Self::Nanosecond),
            _ => Err(Error::InvalidArgument(format!(
                "unknown date part '{name}'"
            ))),
        }
    }
}

fn datediff(args: &[Expr], ctx: &EvalCtx<'_>) -> Result<Value> {
    let unit = Unit::parse(tag_arg(args, 0)?)?;
    let (Some(from), Some(to)) = (date_arg(args, 1, ctx)?, date_arg(args, 2, ctx)?) else {
        return Ok(Value::Null);
    };

    if unit == Unit::Year {
        return Ok(Value::Int(i64::from(to.year()) - i64::from(from.year())));
    }

    let delta = truncate(to, unit) - truncate(from, unit);
    let count = match unit {
        Unit::Day => Some(delta.num_days()),
        Unit::Hour => Some(delta.num_hours()),
        Unit::Minute => Some(delta.num_minutes()),
        Unit::Second => Some(delta.num_seconds()),
        Unit::Millisecond => Some(delta.num_milliseconds()),
        Unit::Microsecond => delta.num_microseconds(),
        Unit::Nanosecond => delta.num_nanoseconds(),
        Unit::Year => None,
    };
    count.map(Value::Int).ok_or_else(|| {
        Error::InvalidArgument("date difference overflows the unit".to_string())
    })
}
