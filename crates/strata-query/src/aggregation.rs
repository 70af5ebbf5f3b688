//! Reduce functions for combining per-mapper partial results
//!
//! Each aggregate in a SELECT list gets a reduce function that folds the
//! mappers' per-interval outputs into a single column value. Reduce
//! functions are pure: no I/O, no shared state. Arity is validated once at
//! initialization, not per bucket.

use crate::error::{QueryError, Result};
use crate::mapper::MapperValue;
use crate::model::Value;
use crate::statement::{Call, Expr, Literal};
use std::cmp::Ordering;
use strata_core::{FieldValue, Timestamp};

/// A reduce function: folds one output per mapper (None where a mapper had
/// no data for the interval) into a single column value.
pub type ReduceFunc = Box<dyn Fn(&[Option<MapperValue>]) -> Result<Value> + Send + Sync>;

/// Look up the reduce function for an aggregate call, validating its arity.
///
/// `None` stands for a raw (non-aggregate) query and yields the raw
/// reducer, the only one whose output is a sequence rather than a scalar.
pub fn initialize_reduce_func(call: Option<&Call>) -> Result<ReduceFunc> {
    let Some(call) = call else {
        return Ok(Box::new(reduce_raw));
    };
    match call.name.as_str() {
        "count" => unary(call, reduce_count),
        "sum" => unary(call, reduce_sum),
        "mean" => unary(call, reduce_mean),
        "min" => unary(call, reduce_min),
        "max" => unary(call, reduce_max),
        "first" => unary(call, reduce_first),
        "last" => unary(call, reduce_last),
        "percentile" => percentile_func(call),
        _ => Err(QueryError::UnknownAggregate(call.name.clone())),
    }
}

fn unary(call: &Call, f: fn(&[Option<MapperValue>]) -> Result<Value>) -> Result<ReduceFunc> {
    expect_arity(call, 1)?;
    Ok(Box::new(f))
}

fn expect_arity(call: &Call, expected: usize) -> Result<()> {
    if call.args.len() != expected {
        return Err(QueryError::ArityMismatch {
            call: call.name.clone(),
            expected,
            got: call.args.len(),
        });
    }
    Ok(())
}

fn unexpected(call: &str, got: &MapperValue) -> QueryError {
    QueryError::UnexpectedMapperOutput {
        call: call.to_string(),
        got: got.kind(),
    }
}

fn reduce_count(outputs: &[Option<MapperValue>]) -> Result<Value> {
    let mut total = 0i64;
    for out in outputs.iter().flatten() {
        match out {
            MapperValue::Scalar(FieldValue::Integer(n)) => total += n,
            other => return Err(unexpected("count", other)),
        }
    }
    Ok(Value::Integer(total))
}

fn reduce_sum(outputs: &[Option<MapperValue>]) -> Result<Value> {
    let mut int_sum = 0i64;
    let mut float_sum = 0.0f64;
    let mut saw_float = false;
    let mut any = false;
    for out in outputs.iter().flatten() {
        match out {
            MapperValue::Scalar(FieldValue::Integer(n)) => {
                int_sum += n;
                any = true;
            }
            MapperValue::Scalar(FieldValue::Float(f)) => {
                float_sum += f;
                saw_float = true;
                any = true;
            }
            other => return Err(unexpected("sum", other)),
        }
    }
    if !any {
        return Ok(Value::Null);
    }
    Ok(if saw_float {
        Value::Float(float_sum + int_sum as f64)
    } else {
        Value::Integer(int_sum)
    })
}

fn reduce_mean(outputs: &[Option<MapperValue>]) -> Result<Value> {
    let mut count = 0u64;
    let mut sum = 0.0f64;
    for out in outputs.iter().flatten() {
        match out {
            MapperValue::MeanPartial { count: c, sum: s } => {
                count += c;
                sum += s;
            }
            other => return Err(unexpected("mean", other)),
        }
    }
    if count == 0 {
        return Ok(Value::Null);
    }
    Ok(Value::Float(sum / count as f64))
}

fn reduce_min(outputs: &[Option<MapperValue>]) -> Result<Value> {
    reduce_extremum("min", outputs, |candidate, best| candidate < best)
}

fn reduce_max(outputs: &[Option<MapperValue>]) -> Result<Value> {
    reduce_extremum("max", outputs, |candidate, best| candidate > best)
}

fn reduce_extremum(
    call: &str,
    outputs: &[Option<MapperValue>],
    better: fn(f64, f64) -> bool,
) -> Result<Value> {
    let mut best: Option<(f64, FieldValue)> = None;
    for out in outputs.iter().flatten() {
        let value = match out {
            MapperValue::Scalar(v) => v,
            other => return Err(unexpected(call, other)),
        };
        let Some(ordinal) = value.as_f64() else {
            return Err(unexpected(call, out));
        };
        if best.as_ref().map_or(true, |(b, _)| better(ordinal, *b)) {
            best = Some((ordinal, value.clone()));
        }
    }
    Ok(best.map_or(Value::Null, |(_, v)| Value::from(v)))
}

fn reduce_first(outputs: &[Option<MapperValue>]) -> Result<Value> {
    reduce_timed("first", outputs, |candidate, best| candidate < best)
}

fn reduce_last(outputs: &[Option<MapperValue>]) -> Result<Value> {
    reduce_timed("last", outputs, |candidate, best| candidate > best)
}

fn reduce_timed(
    call: &str,
    outputs: &[Option<MapperValue>],
    better: fn(Timestamp, Timestamp) -> bool,
) -> Result<Value> {
    let mut best: Option<(Timestamp, FieldValue)> = None;
    for out in outputs.iter().flatten() {
        match out {
            MapperValue::Timed { timestamp, value } => {
                if best.as_ref().map_or(true, |(t, _)| better(*timestamp, *t)) {
                    best = Some((*timestamp, value.clone()));
                }
            }
            other => return Err(unexpected(call, other)),
        }
    }
    Ok(best.map_or(Value::Null, |(_, v)| Value::from(v)))
}

fn percentile_func(call: &Call) -> Result<ReduceFunc> {
    expect_arity(call, 2)?;
    let p = match &call.args[1] {
        Expr::Literal(Literal::Number(n)) if *n > 0.0 && *n <= 100.0 => *n,
        _ => {
            return Err(QueryError::InvalidArgument {
                call: call.name.clone(),
                reason: "percentile requires a number between 0 and 100".to_string(),
            })
        }
    };
    Ok(Box::new(move |outputs| reduce_percentile(p, outputs)))
}

fn reduce_percentile(p: f64, outputs: &[Option<MapperValue>]) -> Result<Value> {
    let mut samples = Vec::new();
    for out in outputs.iter().flatten() {
        match out {
            MapperValue::Samples(values) => samples.extend_from_slice(values),
            other => return Err(unexpected("percentile", other)),
        }
    }
    if samples.is_empty() {
        return Ok(Value::Null);
    }
    samples.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    // nearest-rank
    let rank = (samples.len() as f64 * p / 100.0 + 0.5).floor() as usize;
    let idx = rank.saturating_sub(1).min(samples.len() - 1);
    Ok(Value::Float(samples[idx]))
}

/// The raw reducer: concatenate per-mapper batches into one time-ordered
/// record sequence. Stable, so records from earlier mappers come first on
/// timestamp ties.
fn reduce_raw(outputs: &[Option<MapperValue>]) -> Result<Value> {
    let mut points = Vec::new();
    for out in outputs.iter().flatten() {
        match out {
            MapperValue::Batch(batch) => points.extend(batch.iter().cloned()),
            other => return Err(unexpected("raw", other)),
        }
    }
    points.sort_by_key(|p| p.timestamp);
    Ok(Value::Batch(points))
}
