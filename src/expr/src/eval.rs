//! The two evaluation modes (`spec.md` §4.4 step 5): index-mode combines
//! per-predicate bitstreams into a candidate set; event-mode runs the
//! type-resolved AST against one concrete event with short-circuit boolean
//! logic, used by the exporter's candidate check.

use regex::Regex;

use vast_bitstream::{Bitstream, EwahBitstream};
use vast_common::address::Protocol;
use vast_common::event::Event;
use vast_common::value::Value;
use vast_common::{Error, Result};
use vast_index::Op;

use crate::ast::{EventField, Expr, Extractor, Predicate};

/// Combines predicate lookups into a candidate bitstream for `expr`.
/// `lookup` is the INDEX actor's per-attribute dispatch; it is generic here
/// so the evaluator can be exercised without a running actor.
pub fn eval_index(
    expr: &Expr,
    universe_len: u64,
    lookup: &mut dyn FnMut(&Predicate) -> Result<EwahBitstream>,
) -> Result<EwahBitstream> {
    Ok(match expr {
        Expr::Const(b) => constant(universe_len, *b),
        Expr::Predicate(p) => clamp(lookup(p)?, universe_len),
        Expr::Conjunction(children) => {
            let mut acc = constant(universe_len, true);
            for child in children {
                let bm = eval_index(child, universe_len, lookup)?;
                acc.and(&bm);
            }
            acc
        }
        Expr::Disjunction(children) => {
            let mut acc = constant(universe_len, false);
            for child in children {
                let bm = eval_index(child, universe_len, lookup)?;
                acc.or(&bm);
            }
            acc
        }
        Expr::Negation(inner) => {
            let mut bm = eval_index(inner, universe_len, lookup)?;
            bm.not();
            clamp(bm, universe_len)
        }
    })
}

fn constant(len: u64, bit: bool) -> EwahBitstream {
    let mut b = EwahBitstream::new();
    b.append(len, bit);
    b
}

fn clamp(mut b: EwahBitstream, len: u64) -> EwahBitstream {
    if b.size() < len {
        b.append(len - b.size(), false);
    } else if b.size() > len {
        b.trim();
    }
    b
}

/// Evaluates the type-resolved AST against one event, short-circuiting.
pub fn eval_event(expr: &Expr, event: &Event) -> Result<bool> {
    Ok(match expr {
        Expr::Const(b) => *b,
        Expr::Predicate(p) => eval_predicate(p, event)?,
        Expr::Conjunction(children) => {
            for child in children {
                if !eval_event(child, event)? {
                    return Ok(false);
                }
            }
            true
        }
        Expr::Disjunction(children) => {
            for child in children {
                if eval_event(child, event)? {
                    return Ok(true);
                }
            }
            false
        }
        Expr::Negation(inner) => !eval_event(inner, event)?,
    })
}

fn field_at<'a>(value: &'a Value, path: &[usize]) -> Option<&'a Value> {
    let mut current = value;
    for &idx in path {
        match current {
            Value::Record(fields) => current = &fields.get(idx)?.1,
            _ => return None,
        }
    }
    Some(current)
}

fn eval_predicate(p: &Predicate, event: &Event) -> Result<bool> {
    let lhs = match &p.extractor {
        Extractor::Event(EventField::Id) => Value::Count(event.id),
        Extractor::Event(EventField::Timestamp) => Value::TimePoint(event.timestamp),
        Extractor::Type => Value::String(event.type_name.clone()),
        Extractor::Data { path, .. } => match field_at(&event.value, path) {
            Some(v) => v.clone(),
            None => return Ok(false),
        },
        Extractor::Schema(path) => {
            return Err(Error::query(format!("unresolved schema extractor: {path}")))
        }
    };
    if matches!(lhs, Value::Absent) {
        return Ok(false);
    }
    apply_op(p.op, &lhs, &p.value)
}

fn values_equal(a: &Value, b: &Value) -> bool {
    if let (Value::Port(x), Value::Port(y)) = (a, b) {
        if x.proto == Protocol::Unknown || y.proto == Protocol::Unknown {
            return x.number == y.number;
        }
    }
    if a == b {
        return true;
    }
    matches!((a.as_f64(), b.as_f64()), (Some(x), Some(y)) if x == y)
}

fn values_cmp(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => x.partial_cmp(y),
        (Value::Address(x), Value::Address(y)) => x.bits().partial_cmp(&y.bits()),
        _ => None,
    }
}

fn apply_op(op: Op, lhs: &Value, rhs: &Value) -> Result<bool> {
    Ok(match op {
        Op::Eq => values_equal(lhs, rhs),
        Op::Ne => !values_equal(lhs, rhs),
        Op::Lt | Op::Le | Op::Gt | Op::Ge => {
            let ord = values_cmp(lhs, rhs)
                .ok_or_else(|| Error::query(format!("cannot order {lhs} and {rhs}")))?;
            match op {
                Op::Lt => ord.is_lt(),
                Op::Le => ord.is_le(),
                Op::Gt => ord.is_gt(),
                Op::Ge => ord.is_ge(),
                _ => unreachable!(),
            }
        }
        Op::In => match (lhs, rhs) {
            (Value::String(s), Value::String(needle)) => s.contains(needle.as_str()),
            (Value::Address(a), Value::Subnet(s)) => s.contains(*a),
            _ => {
                return Err(Error::query(
                    "`in` is only supported for string substrings and address/subnet membership",
                ))
            }
        },
        Op::NotIn => !apply_op(Op::In, lhs, rhs)?,
        Op::Match | Op::NotMatch => {
            let pattern = match rhs {
                Value::Pattern(p) | Value::String(p) => p.as_str(),
                other => return Err(Error::query(format!("{other} is not a pattern"))),
            };
            let haystack = match lhs {
                Value::String(s) => s.as_str(),
                other => return Err(Error::query(format!("{other} is not a string"))),
            };
            let re = Regex::new(pattern)
                .map_err(|e| Error::query(format!("invalid pattern {pattern:?}: {e}")))?;
            let is_match = re.is_match(haystack);
            if op == Op::Match {
                is_match
            } else {
                !is_match
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use vast_common::address::Port;

    fn event_with(fields: Vec<(&str, Value)>) -> Event {
        Event::new(
            0,
            "conn",
            0,
            Value::Record(fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect()),
        )
    }

    #[test]
    fn event_mode_short_circuits_conjunction() {
        let expr = Expr::and(vec![
            Expr::predicate(Extractor::Data { path: vec![0], ty: vast_common::types::Type::Port }, Op::Eq, Value::Port("995/?".parse().unwrap())),
            Expr::predicate(Extractor::Data { path: vec![1], ty: vast_common::types::Type::String }, Op::In, Value::String("mozilla".into())),
        ]);
        let matching = event_with(vec![
            ("resp_p", Value::Port("995/tcp".parse().unwrap())),
            ("server_name", Value::String("www.mozilla.org".into())),
        ]);
        assert!(eval_event(&expr, &matching).unwrap());

        let non_matching = event_with(vec![
            ("resp_p", Value::Port("80/tcp".parse().unwrap())),
            ("server_name", Value::String("www.mozilla.org".into())),
        ]);
        assert!(!eval_event(&expr, &non_matching).unwrap());
    }

    #[test]
    fn wildcard_port_equality_ignores_protocol() {
        assert!(values_equal(
            &Value::Port(Port { number: 995, proto: Protocol::Tcp }),
            &Value::Port("995/?".parse().unwrap())
        ));
    }

    #[test]
    fn index_mode_combines_predicate_bitstreams() {
        let mut calls = HashMap::new();
        calls.insert(0usize, {
            let mut b = EwahBitstream::new();
            b.append(4, false);
            b.push_back(true);
            b
        });
        let expr = Expr::predicate(Extractor::Event(EventField::Id), Op::Eq, Value::Count(4));
        let mut call_count = 0;
        let hits = eval_index(&expr, 5, &mut |_p| {
            let b = calls.get(&call_count).cloned().unwrap();
            call_count += 1;
            Ok(b)
        })
        .unwrap();
        assert!(hits.get(4));
        assert_eq!(hits.count(), 1);
    }

    #[test]
    fn absent_field_is_not_a_match() {
        let expr = Expr::predicate(
            Extractor::Data { path: vec![5], ty: vast_common::types::Type::String },
            Op::Eq,
            Value::String("x".into()),
        );
        let event = event_with(vec![("resp_p", Value::Port("1/tcp".parse().unwrap()))]);
        assert!(!eval_event(&expr, &event).unwrap());
    }
}
