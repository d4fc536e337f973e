//! Schema and type resolution (`spec.md` §4.4 steps 3–4): substitutes
//! `SchemaExtractor` with a concrete `DataExtractor` for one event type,
//! then checks each predicate's literal against the resolved field type,
//! casting where the types are both numeric and pruning otherwise. Pruning
//! a required clause of a conjunction prunes the conjunction; pruning a
//! disjunct merely drops it.

use vast_common::types::Type;
use vast_common::{Error, Result};
use vast_index::Op;

use crate::ast::{EventField, Expr, Extractor, Predicate};

/// Substitutes every `Schema` extractor with a `Data` extractor resolved
/// against `root`, pruning predicates whose path doesn't exist on this
/// event type.
pub fn resolve_schema(expr: &Expr, root: &Type) -> Expr {
    match expr {
        Expr::Const(b) => Expr::Const(*b),
        Expr::Negation(inner) => Expr::Negation(Box::new(resolve_schema(inner, root))),
        Expr::Conjunction(children) => {
            fold_conjunction(children.iter().map(|c| resolve_schema(c, root)).collect())
        }
        Expr::Disjunction(children) => {
            fold_disjunction(children.iter().map(|c| resolve_schema(c, root)).collect())
        }
        Expr::Predicate(p) => match &p.extractor {
            Extractor::Schema(path) => match resolve_path(root, path) {
                Some((indices, ty)) => Expr::Predicate(Predicate {
                    extractor: Extractor::Data { path: indices, ty },
                    op: p.op,
                    value: p.value.clone(),
                }),
                None => Expr::Const(false),
            },
            _ => Expr::Predicate(p.clone()),
        },
    }
}

fn resolve_path(root: &Type, path: &str) -> Option<(Vec<usize>, Type)> {
    let mut current = root;
    let mut indices = Vec::new();
    for segment in path.split('.') {
        match current {
            Type::Record(fields) => {
                let idx = fields.iter().position(|f| f.name == segment)?;
                indices.push(idx);
                current = &fields[idx].ty;
            }
            _ => return None,
        }
    }
    Some((indices, current.clone()))
}

/// Checks each predicate's literal against its extractor's resolved type,
/// casting between numeric types and pruning mismatches that can't be
/// reconciled. A `~`/`!~` predicate whose pattern fails to compile is a
/// `query`-class error raised here, at resolution time, rather than left
/// to surface later from inside `eval`/`lookup`.
pub fn resolve_types(expr: &Expr) -> Result<Expr> {
    match expr {
        Expr::Const(b) => Ok(Expr::Const(*b)),
        Expr::Negation(inner) => Ok(Expr::Negation(Box::new(resolve_types(inner)?))),
        Expr::Conjunction(children) => Ok(fold_conjunction(
            children.iter().map(resolve_types).collect::<Result<Vec<_>>>()?,
        )),
        Expr::Disjunction(children) => Ok(fold_disjunction(
            children.iter().map(resolve_types).collect::<Result<Vec<_>>>()?,
        )),
        Expr::Predicate(p) => resolve_predicate(p),
    }
}

fn fold_conjunction(resolved: Vec<Expr>) -> Expr {
    if resolved.iter().any(|c| matches!(c, Expr::Const(false))) {
        return Expr::Const(false);
    }
    let kept: Vec<Expr> = resolved
        .into_iter()
        .filter(|c| !matches!(c, Expr::Const(true)))
        .collect();
    if kept.is_empty() {
        Expr::Const(true)
    } else {
        Expr::Conjunction(kept)
    }
}

fn fold_disjunction(resolved: Vec<Expr>) -> Expr {
    if resolved.iter().any(|c| matches!(c, Expr::Const(true))) {
        return Expr::Const(true);
    }
    let kept: Vec<Expr> = resolved
        .into_iter()
        .filter(|c| !matches!(c, Expr::Const(false)))
        .collect();
    if kept.is_empty() {
        Expr::Const(false)
    } else {
        Expr::Disjunction(kept)
    }
}

fn resolve_predicate(p: &Predicate) -> Result<Expr> {
    use vast_common::value::Value;

    let field_ty = match &p.extractor {
        Extractor::Data { ty, .. } => ty.clone(),
        Extractor::Event(EventField::Id) => Type::Count,
        Extractor::Event(EventField::Timestamp) => Type::TimePoint,
        Extractor::Type => Type::String,
        // Not yet schema-resolved (e.g. evaluated standalone in a test);
        // leave it for a later pass to either resolve or reject.
        Extractor::Schema(_) => return Ok(Expr::Predicate(p.clone())),
    };

    if matches!(p.op, Op::Match | Op::NotMatch) {
        if !matches!(field_ty, Type::String | Type::Pattern) {
            return Ok(Expr::Const(false));
        }
        let pattern = match &p.value {
            Value::Pattern(s) | Value::String(s) => s,
            other => return Err(Error::query(format!("{other} is not a pattern"))),
        };
        return match regex::Regex::new(pattern) {
            Ok(_) => Ok(Expr::Predicate(p.clone())),
            Err(e) => Err(Error::query(format!("invalid pattern: {e}"))),
        };
    }
    if matches!(p.op, Op::In | Op::NotIn) {
        return Ok(match (&field_ty, &p.value) {
            (Type::String, Value::String(_)) => Expr::Predicate(p.clone()),
            (Type::Address, Value::Subnet(_)) => Expr::Predicate(p.clone()),
            _ => Expr::Const(false),
        });
    }

    Ok(match value_type(&p.value) {
        Some(vt) if vt == field_ty => Expr::Predicate(p.clone()),
        Some(vt) if field_ty.is_numeric() && vt.is_numeric() => match cast_to(&p.value, &field_ty) {
            Some(value) => Expr::Predicate(Predicate {
                extractor: p.extractor.clone(),
                op: p.op,
                value,
            }),
            None => Expr::Const(false),
        },
        _ => Expr::Const(false),
    })
}

fn value_type(v: &vast_common::value::Value) -> Option<Type> {
    use vast_common::value::Value;
    Some(match v {
        Value::Bool(_) => Type::Bool,
        Value::Int(_) => Type::Int,
        Value::Count(_) => Type::Count,
        Value::Real(_) => Type::Real,
        Value::TimePoint(_) => Type::TimePoint,
        Value::TimeDuration(_) => Type::TimeDuration,
        Value::String(_) => Type::String,
        Value::Pattern(_) => Type::Pattern,
        Value::Address(_) => Type::Address,
        Value::Subnet(_) => Type::Subnet,
        Value::Port(_) => Type::Port,
        _ => return None,
    })
}

fn cast_to(value: &vast_common::value::Value, ty: &Type) -> Option<vast_common::value::Value> {
    use vast_common::value::Value;
    let f = value.as_f64()?;
    Some(match ty {
        Type::Int => Value::Int(f as i64),
        Type::Count => Value::Count(f as u64),
        Type::Real => Value::Real(f),
        Type::TimePoint => Value::TimePoint(f as i64),
        Type::TimeDuration => Value::TimeDuration(f as i64),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vast_common::value::Value;

    fn conn_type() -> Type {
        Type::record([
            ("resp_p", Type::Port),
            ("server_name", Type::String),
        ])
    }

    #[test]
    fn schema_path_resolves_to_data_extractor() {
        let expr = Expr::predicate(
            Extractor::Schema("server_name".into()),
            Op::Eq,
            Value::String("x".into()),
        );
        let resolved = resolve_schema(&expr, &conn_type());
        match resolved {
            Expr::Predicate(p) => assert_eq!(
                p.extractor,
                Extractor::Data {
                    path: vec![1],
                    ty: Type::String
                }
            ),
            other => panic!("expected predicate, got {other:?}"),
        }
    }

    #[test]
    fn unknown_field_prunes_to_false() {
        let expr = Expr::predicate(Extractor::Schema("nope".into()), Op::Eq, Value::Bool(true));
        assert_eq!(resolve_schema(&expr, &conn_type()), Expr::Const(false));
    }

    #[test]
    fn pruned_conjunct_prunes_whole_conjunction() {
        let a = Expr::predicate(Extractor::Schema("nope".into()), Op::Eq, Value::Bool(true));
        let b = Expr::predicate(Extractor::Schema("resp_p".into()), Op::Eq, Value::Port("1/tcp".parse().unwrap()));
        let expr = Expr::and(vec![a, b]);
        assert_eq!(resolve_schema(&expr, &conn_type()), Expr::Const(false));
    }

    #[test]
    fn numeric_literal_is_cast_to_the_fields_type() {
        let expr = Expr::predicate(
            Extractor::Data { path: vec![], ty: Type::Real },
            Op::Lt,
            Value::Int(3),
        );
        let resolved = resolve_types(&expr).unwrap();
        match resolved {
            Expr::Predicate(p) => assert_eq!(p.value, Value::Real(3.0)),
            other => panic!("expected predicate, got {other:?}"),
        }
    }

    #[test]
    fn incompatible_type_prunes_predicate() {
        let expr = Expr::predicate(
            Extractor::Data { path: vec![], ty: Type::Address },
            Op::Eq,
            Value::String("x".into()),
        );
        assert_eq!(resolve_types(&expr).unwrap(), Expr::Const(false));
    }

    #[test]
    fn invalid_pattern_is_a_query_error_at_resolution_time() {
        let expr = Expr::predicate(
            Extractor::Data { path: vec![], ty: Type::String },
            Op::Match,
            Value::Pattern("(unterminated".into()),
        );
        assert!(resolve_types(&expr).is_err());
    }

    #[test]
    fn valid_pattern_resolves_unchanged() {
        let expr = Expr::predicate(
            Extractor::Data { path: vec![], ty: Type::String },
            Op::Match,
            Value::Pattern("^curl/".into()),
        );
        assert!(resolve_types(&expr).unwrap() != Expr::Const(false));
    }
}
