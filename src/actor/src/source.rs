//! SOURCE isn't one of the five actor kinds `spec.md` names, but the
//! workspace needs *something* feeding IMPORTER to exercise the pipeline
//! end to end: a schema-driven generator for tests and a line-delimited
//! JSON reader for real input, both behind one trait so `importer.rs`
//! doesn't care which it's pulling from.

use std::io::BufRead;
use std::path::Path;

use vast_common::address::{Address, Port, Protocol, Subnet};
use vast_common::types::Type;
use vast_common::value::Value;
use vast_common::{Error, Result};

/// One record pulled off a source, before the importer assigns it a
/// global identifier and hands it to a chunk.
pub struct RawEvent {
    pub type_name: String,
    pub timestamp: i64,
    pub value: Value,
}

pub trait Source: Send {
    /// Returns the next record, or `None` once the source is exhausted.
    fn next(&mut self) -> Result<Option<RawEvent>>;
}

/// Deterministically generates `count` records of `ty`, so tests don't
/// need a fixture file to drive the importer. Not a real PRNG: each
/// scalar is derived from the record's own sequence number, which keeps
/// runs reproducible without a `rand` dependency.
pub struct TestGenerator {
    type_name: String,
    ty: Type,
    remaining: usize,
    next_seq: u64,
}

impl TestGenerator {
    pub fn new(type_name: impl Into<String>, ty: Type, count: usize) -> Self {
        TestGenerator {
            type_name: type_name.into(),
            ty,
            remaining: count,
            next_seq: 0,
        }
    }

    fn generate(ty: &Type, seq: u64) -> Value {
        match ty {
            Type::Bool => Value::Bool(seq % 2 == 0),
            Type::Int => Value::Int(seq as i64),
            Type::Count => Value::Count(seq),
            Type::Real => Value::Real(seq as f64 * 0.5),
            Type::TimePoint => Value::TimePoint(seq as i64 * 1_000_000_000),
            Type::TimeDuration => Value::TimeDuration(seq as i64),
            Type::String => Value::String(format!("event-{seq}")),
            Type::Pattern => Value::Pattern(format!("event-{seq}")),
            Type::Address => Value::Address(Address::v4(std::net::Ipv4Addr::from(seq as u32))),
            Type::Subnet => {
                let addr = Address::v4(std::net::Ipv4Addr::from(seq as u32));
                Value::Subnet(Subnet::new(addr, 120).expect("120 <= 128"))
            }
            Type::Port => Value::Port(Port {
                number: (seq % 65536) as u16,
                proto: Protocol::Tcp,
            }),
            Type::Enum(variants) => {
                Value::Enum(variants[seq as usize % variants.len().max(1)].clone())
            }
            Type::Vector(inner) => Value::Vector(vec![Self::generate(inner, seq)]),
            Type::Set(inner) => Value::Set(vec![Self::generate(inner, seq)]),
            Type::Table(_, _) => Value::Table(Default::default()),
            Type::Record(fields) => Value::Record(
                fields
                    .iter()
                    .map(|f| (f.name.clone(), Self::generate(&f.ty, seq)))
                    .collect(),
            ),
        }
    }
}

impl Source for TestGenerator {
    fn next(&mut self) -> Result<Option<RawEvent>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        let seq = self.next_seq;
        self.next_seq += 1;
        Ok(Some(RawEvent {
            type_name: self.type_name.clone(),
            timestamp: seq as i64 * 1_000_000_000,
            value: Self::generate(&self.ty, seq),
        }))
    }
}

fn value_from_json(json: &serde_json::Value, ty: &Type) -> Result<Value> {
    use serde_json::Value as Json;
    if json.is_null() {
        return Ok(Value::Absent);
    }
    Ok(match ty {
        Type::Bool => Value::Bool(json.as_bool().ok_or_else(|| type_err(ty, json))?),
        Type::Int => Value::Int(json.as_i64().ok_or_else(|| type_err(ty, json))?),
        Type::Count => Value::Count(json.as_u64().ok_or_else(|| type_err(ty, json))?),
        Type::Real => Value::Real(json.as_f64().ok_or_else(|| type_err(ty, json))?),
        Type::TimePoint => Value::TimePoint(json.as_i64().ok_or_else(|| type_err(ty, json))?),
        Type::TimeDuration => Value::TimeDuration(json.as_i64().ok_or_else(|| type_err(ty, json))?),
        Type::String | Type::Pattern => {
            let s = json.as_str().ok_or_else(|| type_err(ty, json))?.to_string();
            if matches!(ty, Type::Pattern) {
                Value::Pattern(s)
            } else {
                Value::String(s)
            }
        }
        Type::Address => Value::Address(
            json.as_str()
                .ok_or_else(|| type_err(ty, json))?
                .parse()
                .map_err(|e| Error::schema(format!("invalid address: {e}")))?,
        ),
        Type::Subnet => Value::Subnet(
            json.as_str()
                .ok_or_else(|| type_err(ty, json))?
                .parse()
                .map_err(|e| Error::schema(format!("invalid subnet: {e}")))?,
        ),
        Type::Port => Value::Port(
            json.as_str()
                .ok_or_else(|| type_err(ty, json))?
                .parse()
                .map_err(|e| Error::schema(format!("invalid port: {e}")))?,
        ),
        Type::Enum(_) => Value::Enum(json.as_str().ok_or_else(|| type_err(ty, json))?.to_string()),
        Type::Vector(inner) => {
            let Json::Array(items) = json else { return Err(type_err(ty, json)) };
            Value::Vector(
                items
                    .iter()
                    .map(|item| value_from_json(item, inner))
                    .collect::<Result<_>>()?,
            )
        }
        Type::Set(inner) => {
            let Json::Array(items) = json else { return Err(type_err(ty, json)) };
            Value::Set(
                items
                    .iter()
                    .map(|item| value_from_json(item, inner))
                    .collect::<Result<_>>()?,
            )
        }
        Type::Table(_, _) => Value::Table(Default::default()),
        Type::Record(fields) => {
            let Json::Object(map) = json else { return Err(type_err(ty, json)) };
            Value::Record(
                fields
                    .iter()
                    .map(|f| {
                        let field_json = map.get(&f.name).unwrap_or(&Json::Null);
                        Ok((f.name.clone(), value_from_json(field_json, &f.ty)?))
                    })
                    .collect::<Result<_>>()?,
            )
        }
    })
}

fn type_err(ty: &Type, json: &serde_json::Value) -> Error {
    Error::schema(format!("value {json} does not match type {ty}"))
}

/// Reads one JSON object per line, converting it against `ty` field by
/// field. A record with no top-level `"timestamp"` key defaults to `0`.
pub struct JsonLineSource {
    type_name: String,
    ty: Type,
    lines: std::io::Lines<std::io::BufReader<std::fs::File>>,
}

impl JsonLineSource {
    pub fn open(path: &Path, type_name: impl Into<String>, ty: Type) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Ok(JsonLineSource {
            type_name: type_name.into(),
            ty,
            lines: std::io::BufReader::new(file).lines(),
        })
    }
}

impl Source for JsonLineSource {
    fn next(&mut self) -> Result<Option<RawEvent>> {
        loop {
            let Some(line) = self.lines.next() else {
                return Ok(None);
            };
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let json: serde_json::Value = serde_json::from_str(&line)
                .map_err(|e| Error::schema(format!("invalid JSON line: {e}")))?;
            let timestamp = json.get("timestamp").and_then(|v| v.as_i64()).unwrap_or(0);
            let value = value_from_json(&json, &self.ty)?;
            return Ok(Some(RawEvent {
                type_name: self.type_name.clone(),
                timestamp,
                value,
            }));
        }
    }
}
