//! Recursive-descent grammar for the query language, built from the
//! combinators in [`crate::combinator`] (`spec.md` §8 scenario 5: `id.resp_p
//! == 995/? && "mozilla" in ssl.server_name`).
//!
//! ```text
//! expr       := or_expr
//! or_expr    := and_expr ("||" and_expr)*
//! and_expr   := unary ("&&" unary)*
//! unary      := "!" unary | primary
//! primary    := "(" expr ")" | predicate
//! predicate  := field_path relop literal | literal ("in" | "!in") field_path
//! field_path := ident ("." ident)*
//! relop      := "==" | "!=" | "<=" | "<" | ">=" | ">" | "in" | "!in" | "~" | "!~"
//! literal    := string | subnet | port | address | float | int | bool
//! ```

use vast_common::address::{Address, Port, Subnet};
use vast_common::value::Value;
use vast_common::{Error, Result};
use vast_index::Op;

use crate::ast::{Expr, Extractor};
use crate::combinator::{alt, repeat, seq, tag, take_while1, ws, PResult};

pub fn parse(input: &str) -> Result<Expr> {
    let (rest, expr) = or_expr(input).map_err(Error::query)?;
    let (rest, _) = ws(rest).map_err(Error::query)?;
    if !rest.is_empty() {
        return Err(Error::query(format!("unexpected trailing input: {rest:?}")));
    }
    Ok(expr)
}

fn or_expr(input: &str) -> PResult<'_, Expr> {
    let (rest, first) = and_expr(input)?;
    let (rest, more) = repeat(|i| seq(tag("||"), and_expr)(i).map(|(r, (_, e))| (r, e)))(rest)?;
    Ok((rest, fold(first, more, Expr::or)))
}

fn and_expr(input: &str) -> PResult<'_, Expr> {
    let (rest, first) = unary(input)?;
    let (rest, more) = repeat(|i| seq(tag("&&"), unary)(i).map(|(r, (_, e))| (r, e)))(rest)?;
    Ok((rest, fold(first, more, Expr::and)))
}

fn fold(first: Expr, rest: Vec<Expr>, wrap: impl Fn(Vec<Expr>) -> Expr) -> Expr {
    if rest.is_empty() {
        first
    } else {
        let mut all = vec![first];
        all.extend(rest);
        wrap(all)
    }
}

fn unary(input: &str) -> PResult<'_, Expr> {
    alt(
        |i| {
            let (rest, (_, inner)) = seq(tag("!"), unary)(i)?;
            Ok((rest, Expr::not(inner)))
        },
        primary,
    )(input)
}

fn primary(input: &str) -> PResult<'_, Expr> {
    alt(parenthesized, predicate)(input)
}

fn parenthesized(input: &str) -> PResult<'_, Expr> {
    let (rest, _) = tag("(")(input)?;
    let (rest, inner) = or_expr(rest)?;
    let (rest, _) = tag(")")(rest)?;
    Ok((rest, inner))
}

/// A predicate can be written field-first (`field op literal`, used for
/// every comparison and for subnet/address membership: `src in
/// 10.0.0.0/24`) or literal-first (`literal in field`, used for substring
/// containment: `"mozilla" in ssl.server_name`). Either way the resulting
/// `Predicate` always carries the field as its extractor and the literal as
/// its value — only the textual order differs, not the represented shape.
fn predicate(input: &str) -> PResult<'_, Expr> {
    alt(literal_in_field, field_first_predicate)(input)
}

fn literal_in_field(input: &str) -> PResult<'_, Expr> {
    let (rest, lit) = literal(input)?;
    let (rest, op) = alt(
        |i| tag("!in")(i).map(|(r, _)| (r, Op::NotIn)),
        |i| tag("in")(i).map(|(r, _)| (r, Op::In)),
    )(rest)?;
    let (rest, path) = field_path(rest)?;
    Ok((rest, Expr::predicate(path_to_extractor(path), op, lit)))
}

fn field_first_predicate(input: &str) -> PResult<'_, Expr> {
    let (rest, path) = field_path(input)?;
    let (rest, op) = relop(rest)?;
    let (rest, lit) = literal(rest)?;
    let value = if matches!(op, Op::Match | Op::NotMatch) {
        match lit {
            Value::String(s) => Value::Pattern(s),
            other => other,
        }
    } else {
        lit
    };
    Ok((rest, Expr::predicate(path_to_extractor(path), op, value)))
}

fn path_to_extractor(path: String) -> Extractor {
    match path.as_str() {
        "id" => Extractor::Event(crate::ast::EventField::Id),
        "timestamp" => Extractor::Event(crate::ast::EventField::Timestamp),
        "type" => Extractor::Type,
        _ => Extractor::Schema(path),
    }
}

fn field_path(input: &str) -> PResult<'_, String> {
    let ident = |i| take_while1("identifier", |c: char| c.is_alphanumeric() || c == '_')(i);
    let (rest, first) = ident(input)?;
    let (rest, tail) = repeat(|i| seq(tag("."), ident)(i).map(|(r, (_, s))| (r, s)))(rest)?;
    let mut path = first.to_string();
    for seg in tail {
        path.push('.');
        path.push_str(seg);
    }
    Ok((rest, path))
}

fn relop(input: &str) -> PResult<'_, Op> {
    alt(
        alt(
            alt(
                |i| tag("==")(i).map(|(r, _)| (r, Op::Eq)),
                |i| tag("!=")(i).map(|(r, _)| (r, Op::Ne)),
            ),
            alt(
                |i| tag("<=")(i).map(|(r, _)| (r, Op::Le)),
                |i| tag(">=")(i).map(|(r, _)| (r, Op::Ge)),
            ),
        ),
        alt(
            alt(
                |i| tag("<")(i).map(|(r, _)| (r, Op::Lt)),
                |i| tag(">")(i).map(|(r, _)| (r, Op::Gt)),
            ),
            alt(
                alt(
                    |i| tag("!in")(i).map(|(r, _)| (r, Op::NotIn)),
                    |i| tag("in")(i).map(|(r, _)| (r, Op::In)),
                ),
                alt(
                    |i| tag("!~")(i).map(|(r, _)| (r, Op::NotMatch)),
                    |i| tag("~")(i).map(|(r, _)| (r, Op::Match)),
                ),
            ),
        ),
    )(input)
}

fn literal(input: &str) -> PResult<'_, Value> {
    alt(
        quoted_string,
        alt(
            subnet_literal,
            alt(port_literal, alt(address_literal, alt(number_literal, bool_literal))),
        ),
    )(input)
}

fn quoted_string(input: &str) -> PResult<'_, Value> {
    let (input, _) = ws(input)?;
    let rest = input.strip_prefix('"').ok_or("expected a quoted string")?;
    let end = rest.find('"').ok_or("unterminated string literal")?;
    Ok((&rest[end + 1..], Value::String(rest[..end].to_string())))
}

fn bare_token(input: &str) -> PResult<'_, &str> {
    take_while1("a literal", |c: char| {
        c.is_alphanumeric() || matches!(c, '.' | '/' | ':' | '-' | '_' | '?')
    })(input)
}

fn subnet_literal(input: &str) -> PResult<'_, Value> {
    let (rest, tok) = bare_token(input)?;
    tok.parse::<Subnet>()
        .map(|s| (rest, Value::Subnet(s)))
        .map_err(|e| e.to_string())
}

fn port_literal(input: &str) -> PResult<'_, Value> {
    let (rest, tok) = bare_token(input)?;
    // `Port::from_str` treats a bare number as a port with an unknown
    // protocol, which would swallow plain integer literals like `1` — only
    // accept this branch when the literal spells out a protocol suffix.
    if !tok.contains('/') {
        return Err("not a port literal".to_string());
    }
    tok.parse::<Port>()
        .map(|p| (rest, Value::Port(p)))
        .map_err(|e| e.to_string())
}

fn address_literal(input: &str) -> PResult<'_, Value> {
    let (rest, tok) = bare_token(input)?;
    tok.parse::<Address>()
        .map(|a| (rest, Value::Address(a)))
        .map_err(|e| e.to_string())
}

fn number_literal(input: &str) -> PResult<'_, Value> {
    let (rest, tok) = bare_token(input)?;
    if tok.contains('.') {
        tok.parse::<f64>()
            .map(|f| (rest, Value::Real(f)))
            .map_err(|e| e.to_string())
    } else {
        tok.parse::<i64>()
            .map(|n| (rest, Value::Int(n)))
            .map_err(|e| e.to_string())
    }
}

fn bool_literal(input: &str) -> PResult<'_, Value> {
    let (rest, tok) = bare_token(input)?;
    match tok {
        "true" => Ok((rest, Value::Bool(true))),
        "false" => Ok((rest, Value::Bool(false))),
        other => Err(format!("not a recognized literal: {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::EventField;

    #[test]
    fn parses_scenario_5_query() {
        let expr = parse(r#"id.resp_p == 995/? && "mozilla" in ssl.server_name"#).unwrap();
        match expr {
            Expr::Conjunction(children) => {
                assert_eq!(children.len(), 2);
                match &children[0] {
                    Expr::Predicate(p) => {
                        assert_eq!(p.extractor, Extractor::Schema("id.resp_p".into()));
                        assert_eq!(p.op, Op::Eq);
                        assert_eq!(p.value, Value::Port("995/?".parse().unwrap()));
                    }
                    other => panic!("expected predicate, got {other:?}"),
                }
                match &children[1] {
                    Expr::Predicate(p) => {
                        assert_eq!(p.extractor, Extractor::Schema("ssl.server_name".into()));
                        assert_eq!(p.op, Op::In);
                        assert_eq!(p.value, Value::String("mozilla".into()));
                    }
                    other => panic!("expected predicate, got {other:?}"),
                }
            }
            other => panic!("expected conjunction, got {other:?}"),
        }
    }

    #[test]
    fn parses_negation_and_parentheses() {
        let expr = parse("!(src in 10.0.0.0/24)").unwrap();
        match expr {
            Expr::Negation(inner) => match *inner {
                Expr::Predicate(p) => {
                    assert_eq!(p.op, Op::In);
                    assert_eq!(p.value, Value::Subnet("10.0.0.0/24".parse().unwrap()));
                }
                other => panic!("expected predicate, got {other:?}"),
            },
            other => panic!("expected negation, got {other:?}"),
        }
    }

    #[test]
    fn parses_disjunction_with_lower_precedence_than_conjunction() {
        let expr = parse("a == 1 && b == 2 || c == 3").unwrap();
        match expr {
            Expr::Disjunction(children) => {
                assert_eq!(children.len(), 2);
                assert!(matches!(children[0], Expr::Conjunction(_)));
                assert!(matches!(children[1], Expr::Predicate(_)));
            }
            other => panic!("expected disjunction, got {other:?}"),
        }
    }

    #[test]
    fn rejects_trailing_garbage() {
        assert!(parse("a == 1 )").is_err());
    }

    #[test]
    fn id_and_timestamp_resolve_to_event_extractors() {
        let expr = parse("timestamp >= 0").unwrap();
        match expr {
            Expr::Predicate(p) => assert_eq!(p.extractor, Extractor::Event(EventField::Timestamp)),
            other => panic!("expected predicate, got {other:?}"),
        }
    }
}
