//! A schema is an ordered sequence of named record types (`spec.md` §3).
//! Lookup is by name through a side index; aliases resolve to their
//! underlying type before congruence checks, recovering the alias feature
//! present in `original_source/src/vast/schema.cc` but dropped by the
//! distilled spec.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::types::Type;

#[derive(Debug, Clone)]
enum Entry {
    Type(Type),
    Alias(String),
}

#[derive(Debug, Clone, Default)]
pub struct Schema {
    order: Vec<String>,
    entries: HashMap<String, Entry>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_type(&mut self, name: impl Into<String>, ty: Type) -> Result<()> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(Error::schema(format!("duplicate type name: {name}")));
        }
        self.order.push(name.clone());
        self.entries.insert(name, Entry::Type(ty));
        Ok(())
    }

    pub fn add_alias(&mut self, name: impl Into<String>, target: impl Into<String>) -> Result<()> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(Error::schema(format!("duplicate type name: {name}")));
        }
        self.order.push(name.clone());
        self.entries.insert(name, Entry::Alias(target.into()));
        Ok(())
    }

    /// Resolves `name` through any chain of aliases to its underlying
    /// structural type.
    pub fn resolve(&self, name: &str) -> Result<&Type> {
        let mut current = name;
        let mut hops = 0;
        loop {
            hops += 1;
            if hops > 64 {
                return Err(Error::schema(format!("alias cycle at {name}")));
            }
            match self.entries.get(current) {
                Some(Entry::Type(ty)) => return Ok(ty),
                Some(Entry::Alias(target)) => current = target,
                None => return Err(Error::schema(format!("unknown type: {current}"))),
            }
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn types(&self) -> Result<Vec<(&str, &Type)>> {
        self.order
            .iter()
            .map(|name| Ok((name.as_str(), self.resolve(name)?)))
            .collect()
    }

    /// Merges `other` into `self`. Same-named entries must be congruent;
    /// otherwise this is a schema error (`spec.md` §3, "Schemas support type
    /// aliasing and congruence checking against externally discovered
    /// types").
    pub fn merge(&mut self, other: &Schema) -> Result<()> {
        for name in other.order.iter() {
            let incoming = other.resolve(name)?;
            match self.entries.get(name) {
                None => {
                    self.order.push(name.clone());
                    self.entries.insert(name.clone(), Entry::Type(incoming.clone()));
                }
                Some(Entry::Type(existing)) => {
                    if !existing.congruent(incoming) {
                        return Err(Error::schema(format!(
                            "incongruent redefinition of type {name}"
                        )));
                    }
                }
                Some(Entry::Alias(_)) => {
                    let existing = self.resolve(name)?;
                    if !existing.congruent(incoming) {
                        return Err(Error::schema(format!(
                            "incongruent redefinition of type {name}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_resolves_to_underlying_type() {
        let mut schema = Schema::new();
        schema.add_type("addr_pair", Type::record([("a", Type::Address)])).unwrap();
        schema.add_alias("conn_endpoint", "addr_pair").unwrap();
        assert_eq!(
            schema.resolve("conn_endpoint").unwrap(),
            schema.resolve("addr_pair").unwrap()
        );
    }

    #[test]
    fn merge_rejects_incongruent_collision() {
        let mut a = Schema::new();
        a.add_type("conn", Type::record([("src", Type::Address)])).unwrap();
        let mut b = Schema::new();
        b.add_type("conn", Type::record([("src", Type::Port)])).unwrap();
        assert!(a.merge(&b).is_err());
    }

    #[test]
    fn merge_accepts_congruent_collision() {
        let mut a = Schema::new();
        a.add_type("conn", Type::record([("src", Type::Address)])).unwrap();
        let mut b = Schema::new();
        b.add_type("conn", Type::record([("orig", Type::Address)])).unwrap();
        assert!(a.merge(&b).is_ok());
    }
}
