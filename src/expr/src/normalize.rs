//! Negation-normal-form pass (`spec.md` §4.4 step 2): pushes `!` down to
//! predicates and constants via De Morgan's law, so later passes (and both
//! evaluators) never see a negation wrapping a conjunction or disjunction.

use crate::ast::Expr;

pub fn normalize(expr: &Expr) -> Expr {
    push_negation(expr, false)
}

fn push_negation(expr: &Expr, negate: bool) -> Expr {
    match expr {
        Expr::Const(b) => Expr::Const(b ^ negate),
        Expr::Predicate(p) => {
            if negate {
                Expr::Negation(Box::new(Expr::Predicate(p.clone())))
            } else {
                Expr::Predicate(p.clone())
            }
        }
        Expr::Negation(inner) => push_negation(inner, !negate),
        Expr::Conjunction(children) => {
            let mapped = children.iter().map(|c| push_negation(c, negate)).collect();
            if negate {
                Expr::Disjunction(mapped)
            } else {
                Expr::Conjunction(mapped)
            }
        }
        Expr::Disjunction(children) => {
            let mapped = children.iter().map(|c| push_negation(c, negate)).collect();
            if negate {
                Expr::Conjunction(mapped)
            } else {
                Expr::Disjunction(mapped)
            }
        }
    }
}
