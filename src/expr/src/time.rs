//! Time-restriction pre-pass (`spec.md` §4.4 step 6): proves whether a
//! chunk's `[first_ts, last_ts]` window can be skipped entirely before any
//! event is read, by walking only the timestamp predicates in the AST.
//! Anything the pass can't reason about (a non-timestamp predicate, or a
//! non-comparison operator) is treated as "maybe matches" so the pass only
//! ever skips chunks it can prove can't match — it never produces a false
//! negative.

use vast_common::value::Value;
use vast_index::Op;

use crate::ast::{EventField, Expr, Extractor};

/// Returns `false` only when `expr` can be proven to have no chance of
/// matching any event with a timestamp in `[first_ts, last_ts]`.
pub fn chunk_may_match(expr: &Expr, first_ts: i64, last_ts: i64) -> bool {
    match expr {
        Expr::Const(b) => *b,
        Expr::Predicate(p) => match (&p.extractor, &p.value) {
            (Extractor::Event(EventField::Timestamp), Value::TimePoint(t)) => {
                match p.op {
                    Op::Eq => first_ts <= *t && *t <= last_ts,
                    Op::Lt => first_ts < *t,
                    Op::Le => first_ts <= *t,
                    Op::Gt => last_ts > *t,
                    Op::Ge => last_ts >= *t,
                    // `!=` and the non-comparison operators can't prune a
                    // range: any value in the chunk could still satisfy them.
                    _ => true,
                }
            }
            _ => true,
        },
        Expr::Conjunction(children) => children
            .iter()
            .all(|c| chunk_may_match(c, first_ts, last_ts)),
        Expr::Disjunction(children) => children
            .iter()
            .any(|c| chunk_may_match(c, first_ts, last_ts)),
        // A negated timestamp predicate's complement is not generally
        // representable as a single provable range without re-deriving the
        // NNF rewrite, so conservatively assume it may match.
        Expr::Negation(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vast_common::types::Type;

    fn ts_pred(op: Op, t: i64) -> Expr {
        Expr::predicate(Extractor::Event(EventField::Timestamp), op, Value::TimePoint(t))
    }

    #[test]
    fn chunk_entirely_before_a_ge_bound_is_skipped() {
        assert!(!chunk_may_match(&ts_pred(Op::Ge, 1000), 0, 999));
    }

    #[test]
    fn chunk_overlapping_the_bound_may_match() {
        assert!(chunk_may_match(&ts_pred(Op::Ge, 1000), 500, 1500));
    }

    #[test]
    fn conjunction_requires_every_clause_to_be_possible() {
        let expr = Expr::and(vec![ts_pred(Op::Ge, 1000), ts_pred(Op::Lt, 2000)]);
        assert!(chunk_may_match(&expr, 1500, 1600));
        assert!(!chunk_may_match(&expr, 0, 999));
        assert!(!chunk_may_match(&expr, 2000, 3000));
    }

    #[test]
    fn non_timestamp_predicates_are_never_pruned() {
        let expr = Expr::predicate(
            Extractor::Data { path: vec![0], ty: Type::String },
            Op::Eq,
            Value::String("x".into()),
        );
        assert!(chunk_may_match(&expr, 0, 0));
    }
}
