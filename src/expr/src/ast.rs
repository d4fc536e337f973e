//! The expression AST (`spec.md` §3, §4.4, §9): a tagged sum with a
//! visitor contract that yields either `bool` (event-mode) or a bitstream
//! (index-mode), so no virtual dispatch is needed anywhere in this crate.

use vast_common::types::Type;
use vast_common::value::Value;
use vast_index::Op;

/// What metadata field an [`Extractor::Event`] reads off an event, distinct
/// from its typed payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventField {
    Id,
    Timestamp,
}

/// A predicate's left-hand side.
#[derive(Debug, Clone, PartialEq)]
pub enum Extractor {
    /// Matches by the event's declared type name (the name itself is
    /// carried in the predicate's `value`, not the extractor).
    Type,
    /// Unresolved dotted field path, e.g. `id.orig_h`. Replaced by `Data`
    /// during schema resolution.
    Schema(String),
    Event(EventField),
    /// Resolved field access: the indices to walk through nested records,
    /// plus the field's structural type, cached so type resolution doesn't
    /// need to re-walk the schema.
    Data { path: Vec<usize>, ty: Type },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub extractor: Extractor,
    pub op: Op,
    pub value: Value,
}

/// Tree of {Conjunction, Disjunction, Negation, Predicate}, plus a `Const`
/// node produced by resolution when a clause is proven trivially true or
/// false (pruning), so evaluators never have to special-case `Option`.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(bool),
    Conjunction(Vec<Expr>),
    Disjunction(Vec<Expr>),
    Negation(Box<Expr>),
    Predicate(Predicate),
}

impl Expr {
    pub fn predicate(extractor: Extractor, op: Op, value: Value) -> Expr {
        Expr::Predicate(Predicate { extractor, op, value })
    }

    pub fn and(children: Vec<Expr>) -> Expr {
        Expr::Conjunction(children)
    }

    pub fn or(children: Vec<Expr>) -> Expr {
        Expr::Disjunction(children)
    }

    pub fn not(inner: Expr) -> Expr {
        Expr::Negation(Box::new(inner))
    }
}
