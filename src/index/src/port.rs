//! Port bitmap index (`spec.md` §4.2): a 16-bit-sliced unsigned index over
//! the port number (ports have no sign, so `order` is the identity) plus a
//! small discrete equality map over the handful of known protocols.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use vast_bitstream::{Bitstream, EwahBitstream};
use vast_common::address::Protocol;
use vast_common::event::EventId;
use vast_common::value::Value;
use vast_common::{Error, Result};

use crate::{header, Op};

const BITS: u32 = 16;

#[derive(Serialize, Deserialize)]
struct Body {
    number_planes: Vec<EwahBitstream>,
    protocol: HashMap<String, EwahBitstream>,
}

pub struct PortIndex {
    highest_id: Option<EventId>,
    number_planes: Vec<EwahBitstream>,
    protocol: HashMap<Protocol, EwahBitstream>,
}

fn protocol_key(p: Protocol) -> &'static str {
    match p {
        Protocol::Tcp => "tcp",
        Protocol::Udp => "udp",
        Protocol::Icmp => "icmp",
        Protocol::Unknown => "?",
    }
}

fn protocol_from_key(key: &str) -> Protocol {
    match key {
        "tcp" => Protocol::Tcp,
        "udp" => Protocol::Udp,
        "icmp" => Protocol::Icmp,
        _ => Protocol::Unknown,
    }
}

impl PortIndex {
    pub fn new() -> Self {
        PortIndex {
            highest_id: None,
            number_planes: (0..BITS).map(|_| EwahBitstream::new()).collect(),
            protocol: HashMap::new(),
        }
    }

    pub fn highest_id(&self) -> Option<EventId> {
        self.highest_id
    }

    fn len(&self) -> u64 {
        self.highest_id.map(|id| id + 1).unwrap_or(0)
    }

    pub fn append(&mut self, id: EventId, value: &Value) -> Result<()> {
        let port = match value {
            Value::Port(p) => *p,
            other => return Err(Error::schema(format!("{other} is not a port"))),
        };
        if let Some(highest) = self.highest_id {
            if id <= highest {
                return Err(Error::query(format!(
                    "index append out of order: id {id} <= highest appended {highest}"
                )));
            }
        }
        let gap = id - self.highest_id.map(|h| h + 1).unwrap_or(0);
        for (bit, plane) in self.number_planes.iter_mut().enumerate() {
            if gap > 0 {
                plane.append(gap, false);
            }
            plane.push_back((port.number >> bit) & 1 == 1);
        }
        for (proto, bm) in self.protocol.iter_mut() {
            if gap > 0 {
                bm.append(gap, false);
            }
            bm.push_back(*proto == port.proto);
        }
        if !self.protocol.contains_key(&port.proto) {
            let mut bm = EwahBitstream::new();
            bm.append(id, false);
            bm.push_back(true);
            self.protocol.insert(port.proto, bm);
        }
        self.highest_id = Some(id);
        Ok(())
    }

    fn clamp(&self, mut b: EwahBitstream) -> EwahBitstream {
        let len = self.len();
        if b.size() < len {
            b.append(len - b.size(), false);
        } else if b.size() > len {
            b.trim();
        }
        b
    }

    fn number_eq(&self, n: u16) -> EwahBitstream {
        let mut mismatch = EwahBitstream::new();
        for bit in 0..BITS {
            let target_bit = (n >> bit) & 1 == 1;
            let mut m = self.number_planes[bit as usize].clone();
            if target_bit {
                m.not();
            }
            mismatch.or(&m);
        }
        mismatch.not();
        self.clamp(mismatch)
    }

    pub fn lookup(&self, op: Op, value: &Value) -> Result<EwahBitstream> {
        let port = match value {
            Value::Port(p) => *p,
            other => return Err(Error::query(format!("{other} is not a port"))),
        };
        let number_hits = self.number_eq(port.number);
        let proto_hits = if port.proto == Protocol::Unknown {
            // `?` as a query protocol means "any protocol", matching the
            // `995/?` literal in `spec.md` §8 scenario 5.
            self.all()
        } else {
            let bm = self.protocol.get(&port.proto).cloned().unwrap_or_default();
            self.clamp(bm)
        };
        let mut both = number_hits;
        both.and(&proto_hits);
        Ok(match op {
            Op::Eq => both,
            Op::Ne => {
                let mut b = both;
                b.not();
                self.clamp(b)
            }
            other => {
                return Err(Error::query(format!(
                    "operator {other:?} is not supported on a port index"
                )))
            }
        })
    }

    fn all(&self) -> EwahBitstream {
        let mut all = EwahBitstream::new();
        all.append(self.len(), true);
        all
    }

    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        let body = Body {
            number_planes: self.number_planes.clone(),
            protocol: self
                .protocol
                .iter()
                .map(|(p, b)| (protocol_key(*p).to_string(), b.clone()))
                .collect(),
        };
        header::save(path, "port", self.highest_id, &body)
    }

    pub fn load(path: &std::path::Path) -> Result<Self> {
        let (highest_id, body): (_, Body) = header::load(path, "port")?;
        Ok(PortIndex {
            highest_id,
            number_planes: body.number_planes,
            protocol: body
                .protocol
                .into_iter()
                .map(|(k, b)| (protocol_from_key(&k), b))
                .collect(),
        })
    }
}

impl Default for PortIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_protocol_matches_any() {
        let mut idx = PortIndex::new();
        idx.append(0, &Value::Port("995/tcp".parse().unwrap()))
            .unwrap();
        idx.append(1, &Value::Port("995/udp".parse().unwrap()))
            .unwrap();
        idx.append(2, &Value::Port("80/tcp".parse().unwrap()))
            .unwrap();
        let hits = idx
            .lookup(Op::Eq, &Value::Port("995/?".parse().unwrap()))
            .unwrap();
        assert!(hits.get(0) && hits.get(1));
        assert!(!hits.get(2));
    }

    #[test]
    fn exact_protocol_narrows_match() {
        let mut idx = PortIndex::new();
        idx.append(0, &Value::Port("995/tcp".parse().unwrap()))
            .unwrap();
        idx.append(1, &Value::Port("995/udp".parse().unwrap()))
            .unwrap();
        let hits = idx
            .lookup(Op::Eq, &Value::Port("995/tcp".parse().unwrap()))
            .unwrap();
        assert!(hits.get(0));
        assert!(!hits.get(1));
    }
}
