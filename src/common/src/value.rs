//! Concrete data carried by events and expression literals, mirroring
//! [`crate::types::Type`] one variant at a time.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::{Address, Port, Subnet};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Count(u64),
    Real(f64),
    TimePoint(i64),
    TimeDuration(i64),
    String(String),
    Pattern(String),
    Address(Address),
    Subnet(Subnet),
    Port(Port),
    Enum(String),
    Vector(Vec<Value>),
    Set(Vec<Value>),
    Table(BTreeMap<String, Value>),
    Record(Vec<(String, Value)>),
    Absent,
}

impl Value {
    pub fn as_record_field(&self, path: &str) -> Option<&Value> {
        let mut current = self;
        for segment in path.split('.') {
            match current {
                Value::Record(fields) => {
                    current = &fields.iter().find(|(name, _)| name == segment)?.1;
                }
                _ => return None,
            }
        }
        Some(current)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(x) => Some(*x as f64),
            Value::Count(x) => Some(*x as f64),
            Value::Real(x) => Some(*x),
            Value::TimePoint(x) | Value::TimeDuration(x) => Some(*x as f64),
            Value::Port(p) => Some(p.number as f64),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(x) => write!(f, "{x}"),
            Value::Count(x) => write!(f, "{x}"),
            Value::Real(x) => write!(f, "{x}"),
            Value::TimePoint(x) => write!(f, "{x}"),
            Value::TimeDuration(x) => write!(f, "{x}ns"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Pattern(p) => write!(f, "/{p}/"),
            Value::Address(a) => write!(f, "{a}"),
            Value::Subnet(s) => write!(f, "{s}"),
            Value::Port(p) => write!(f, "{p}"),
            Value::Enum(e) => write!(f, "{e}"),
            Value::Vector(v) => write!(f, "{v:?}"),
            Value::Set(v) => write!(f, "{v:?}"),
            Value::Table(t) => write!(f, "{t:?}"),
            Value::Record(r) => write!(f, "{r:?}"),
            Value::Absent => write!(f, "<absent>"),
        }
    }
}
