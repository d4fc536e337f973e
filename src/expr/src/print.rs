//! The inverse of [`crate::parser::parse`] (`spec.md` §9's `{parse, print}`
//! capability split): renders a compiled AST back to source form for
//! logging a query alongside its runtime in the exporter's `done` event.

use std::fmt::Write as _;

use vast_common::value::Value;
use vast_index::Op;

use crate::ast::{EventField, Expr, Extractor};

pub fn print(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr);
    out
}

fn write_expr(out: &mut String, expr: &Expr) {
    match expr {
        Expr::Const(b) => {
            let _ = write!(out, "{b}");
        }
        // Substring containment parses literal-first (`"x" in field`); print
        // it back the same way instead of the field-first form used by
        // every other predicate, including subnet/address membership.
        Expr::Predicate(p) if matches!(p.op, Op::In | Op::NotIn) && matches!(p.value, Value::String(_)) => {
            let _ = write!(out, "{} {} ", p.value, op_str(p.op));
            write_extractor(out, &p.extractor);
        }
        Expr::Predicate(p) => {
            write_extractor(out, &p.extractor);
            let _ = write!(out, " {} {}", op_str(p.op), p.value);
        }
        Expr::Negation(inner) => {
            out.push('!');
            write_parenthesized(out, inner);
        }
        Expr::Conjunction(children) => write_joined(out, children, "&&"),
        Expr::Disjunction(children) => write_joined(out, children, "||"),
    }
}

fn write_joined(out: &mut String, children: &[Expr], op: &str) {
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            let _ = write!(out, " {op} ");
        }
        write_parenthesized(out, child);
    }
}

fn write_parenthesized(out: &mut String, expr: &Expr) {
    let needs_parens = matches!(expr, Expr::Conjunction(_) | Expr::Disjunction(_));
    if needs_parens {
        out.push('(');
        write_expr(out, expr);
        out.push(')');
    } else {
        write_expr(out, expr);
    }
}

fn write_extractor(out: &mut String, extractor: &Extractor) {
    match extractor {
        Extractor::Type => out.push_str("type"),
        Extractor::Event(EventField::Id) => out.push_str("id"),
        Extractor::Event(EventField::Timestamp) => out.push_str("timestamp"),
        Extractor::Schema(path) => out.push_str(path),
        Extractor::Data { path, .. } => {
            let _ = write!(out, "${}", path.iter().map(ToString::to_string).collect::<Vec<_>>().join("."));
        }
    }
}

fn op_str(op: Op) -> &'static str {
    match op {
        Op::Eq => "==",
        Op::Ne => "!=",
        Op::Lt => "<",
        Op::Le => "<=",
        Op::Gt => ">",
        Op::Ge => ">=",
        Op::In => "in",
        Op::NotIn => "!in",
        Op::Match => "~",
        Op::NotMatch => "!~",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn printing_a_parsed_query_round_trips_operators_and_connectives() {
        let expr = parse(r#"id.resp_p == 995/? && "mozilla" in ssl.server_name"#).unwrap();
        assert_eq!(
            print(&expr),
            r#"id.resp_p == 995/? && "mozilla" in ssl.server_name"#
        );
    }

    #[test]
    fn printing_negation_adds_parentheses_around_compound_children() {
        let expr = parse("!(a == 1 && b == 2)").unwrap();
        assert_eq!(print(&expr), "!(a == 1 && b == 2)");
    }
}
