//! The schema type system (`spec.md` §3): a closed set of value shapes that
//! every event attribute is drawn from. Two types are *congruent* if their
//! structure matches ignoring name, which lets the expression engine resolve
//! a predicate against any record type that merely has a compatible field.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Type {
    Bool,
    Int,
    Count,
    Real,
    TimePoint,
    TimeDuration,
    String,
    Pattern,
    Address,
    Subnet,
    Port,
    Enum(Vec<String>),
    Vector(Box<Type>),
    Set(Box<Type>),
    Table(Box<Type>, Box<Type>),
    Record(Vec<Field>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub ty: Type,
}

impl Type {
    pub fn record(fields: impl IntoIterator<Item = (impl Into<String>, Type)>) -> Type {
        Type::Record(
            fields
                .into_iter()
                .map(|(name, ty)| Field {
                    name: name.into(),
                    ty,
                })
                .collect(),
        )
    }

    /// Two types are congruent if they have the same structure, regardless
    /// of record field names or enum member spelling order.
    pub fn congruent(&self, other: &Type) -> bool {
        use Type::*;
        match (self, other) {
            (Bool, Bool)
            | (Int, Int)
            | (Count, Count)
            | (Real, Real)
            | (TimePoint, TimePoint)
            | (TimeDuration, TimeDuration)
            | (String, String)
            | (Pattern, Pattern)
            | (Address, Address)
            | (Subnet, Subnet)
            | (Port, Port) => true,
            (Enum(a), Enum(b)) => a.len() == b.len(),
            (Vector(a), Vector(b)) => a.congruent(b),
            (Set(a), Set(b)) => a.congruent(b),
            (Table(ka, va), Table(kb, vb)) => ka.congruent(kb) && va.congruent(vb),
            (Record(a), Record(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.ty.congruent(&y.ty))
            }
            _ => false,
        }
    }

    /// Looks up a (possibly nested) field by dotted path, e.g. `id.orig_h`.
    pub fn field_path(&self, path: &str) -> Option<&Type> {
        let mut current = self;
        for segment in path.split('.') {
            match current {
                Type::Record(fields) => {
                    current = &fields.iter().find(|f| f.name == segment)?.ty;
                }
                _ => return None,
            }
        }
        Some(current)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Type::Int | Type::Count | Type::Real | Type::Port | Type::TimePoint | Type::TimeDuration
        )
    }

    pub fn is_ordered(&self) -> bool {
        self.is_numeric()
    }

    /// A stable identifier for this type's structure, stored in
    /// [`crate::event::Event`]'s owning chunk meta so a reader can detect a
    /// schema drift between what a chunk was sealed with and what the
    /// current schema resolves the event type to, without comparing the
    /// full `Type` tree on every read.
    pub fn fingerprint(&self) -> u64 {
        crc32fast::hash(self.to_string().as_bytes()) as u64
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::Count => write!(f, "count"),
            Type::Real => write!(f, "real"),
            Type::TimePoint => write!(f, "time"),
            Type::TimeDuration => write!(f, "duration"),
            Type::String => write!(f, "string"),
            Type::Pattern => write!(f, "pattern"),
            Type::Address => write!(f, "addr"),
            Type::Subnet => write!(f, "subnet"),
            Type::Port => write!(f, "port"),
            Type::Enum(variants) => write!(f, "enum{{{}}}", variants.join(",")),
            Type::Vector(t) => write!(f, "vector<{t}>"),
            Type::Set(t) => write!(f, "set<{t}>"),
            Type::Table(k, v) => write!(f, "table<{k},{v}>"),
            Type::Record(fields) => {
                write!(f, "record{{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}:{}", field.name, field.ty)?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn congruence_ignores_names() {
        let a = Type::record([("src", Type::Address), ("dst", Type::Address)]);
        let b = Type::record([("orig", Type::Address), ("resp", Type::Address)]);
        assert!(a.congruent(&b));
    }

    #[test]
    fn congruence_rejects_structural_mismatch() {
        let a = Type::record([("src", Type::Address)]);
        let b = Type::record([("src", Type::Port)]);
        assert!(!a.congruent(&b));
    }

    #[test]
    fn field_path_resolves_nested_record() {
        let id = Type::record([("orig_h", Type::Address), ("resp_h", Type::Address)]);
        let conn = Type::record([("id", id), ("proto", Type::String)]);
        assert_eq!(conn.field_path("id.orig_h"), Some(&Type::Address));
        assert_eq!(conn.field_path("id.missing"), None);
    }

    #[test]
    fn fingerprint_is_stable_and_structure_sensitive() {
        let a = Type::record([("src", Type::Address)]);
        let b = Type::record([("src", Type::Address)]);
        let c = Type::record([("src", Type::Port)]);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }
}
