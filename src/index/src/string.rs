//! String bitmap index (`spec.md` §4.2): exact equality via a map from
//! distinct value to bitstream, plus substring (`in`) and regex-match
//! facets. Unlike the numeric/address/port families, substring and regex
//! matching have no useful bit-sliced encoding, so those two facets fall
//! back to scanning the raw stored values — correct, and adequate for the
//! event volumes this engine targets, but not sublinear; a future facet
//! (e.g. n-gram bitmaps) would speed it up without changing the contract.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use vast_bitstream::{Bitstream, EwahBitstream};
use vast_common::event::EventId;
use vast_common::value::Value;
use vast_common::{Error, Result};

use crate::{header, Op};

#[derive(Serialize, Deserialize)]
struct Body {
    equality: HashMap<String, EwahBitstream>,
    values: Vec<String>,
}

pub struct StringIndex {
    highest_id: Option<EventId>,
    equality: HashMap<String, EwahBitstream>,
    /// Raw values by id, needed for substring/regex scans.
    values: Vec<String>,
}

impl StringIndex {
    pub fn new() -> Self {
        StringIndex {
            highest_id: None,
            equality: HashMap::new(),
            values: Vec::new(),
        }
    }

    pub fn highest_id(&self) -> Option<EventId> {
        self.highest_id
    }

    fn len(&self) -> u64 {
        self.highest_id.map(|id| id + 1).unwrap_or(0)
    }

    pub fn append(&mut self, id: EventId, value: &Value) -> Result<()> {
        let s = match value {
            Value::String(s) | Value::Pattern(s) | Value::Enum(s) => s.clone(),
            other => return Err(Error::schema(format!("{other} is not a string"))),
        };
        if let Some(highest) = self.highest_id {
            if id <= highest {
                return Err(Error::query(format!(
                    "index append out of order: id {id} <= highest appended {highest}"
                )));
            }
        }
        let gap = id - self.highest_id.map(|h| h + 1).unwrap_or(0);
        self.values
            .extend(std::iter::repeat(String::new()).take(gap as usize));
        self.values.push(s.clone());

        for bm in self.equality.values_mut() {
            if gap > 0 {
                bm.append(gap, false);
            }
        }
        if !self.equality.contains_key(&s) {
            let mut b = EwahBitstream::new();
            b.append(id, false);
            self.equality.insert(s.clone(), b);
        }
        for (k, bm) in self.equality.iter_mut() {
            bm.push_back(*k == s);
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

    fn scan(&self, pred: impl Fn(&str) -> bool) -> EwahBitstream {
        let mut b = EwahBitstream::new();
        for v in &self.values {
            b.push_back(pred(v));
        }
        self.clamp(b)
    }

    pub fn lookup(&self, op: Op, value: &Value) -> Result<EwahBitstream> {
        let needle = match value {
            Value::String(s) | Value::Pattern(s) | Value::Enum(s) => s.as_str(),
            other => return Err(Error::query(format!("{other} is not a string"))),
        };
        Ok(match op {
            Op::Eq => self.clamp(
                self.equality
                    .get(needle)
                    .cloned()
                    .unwrap_or_default(),
            ),
            Op::Ne => {
                let mut b = self.clamp(self.equality.get(needle).cloned().unwrap_or_default());
                b.not();
                self.clamp(b)
            }
            Op::In => self.scan(|v| v.contains(needle)),
            Op::NotIn => {
                let mut b = self.scan(|v| v.contains(needle));
                b.not();
                self.clamp(b)
            }
            Op::Match => {
                let re = Regex::new(needle)
                    .map_err(|e| Error::query(format!("invalid pattern {needle:?}: {e}")))?;
                self.scan(|v| re.is_match(v))
            }
            Op::NotMatch => {
                let re = Regex::new(needle)
                    .map_err(|e| Error::query(format!("invalid pattern {needle:?}: {e}")))?;
                let mut b = self.scan(|v| re.is_match(v));
                b.not();
                self.clamp(b)
            }
            other => {
                return Err(Error::query(format!(
                    "operator {other:?} is not supported on a string index"
                )))
            }
        })
    }

    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        let body = Body {
            equality: self.equality.clone(),
            values: self.values.clone(),
        };
        header::save(path, "string", self.highest_id, &body)
    }

    pub fn load(path: &std::path::Path) -> Result<Self> {
        let (highest_id, body): (_, Body) = header::load(path, "string")?;
        Ok(StringIndex {
            highest_id,
            equality: body.equality,
            values: body.values,
        })
    }
}

impl Default for StringIndex {
    fn default() -> Self {
        Self::new()
    }
}
