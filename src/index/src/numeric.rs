//! Order-preserving bitmap index for the numeric `Type` variants (`spec.md`
//! §4.2): int, count, real, time-point, time-duration all reduce to the same
//! 64-bit bit-sliced encoding once passed through `order(value)`.
//!
//! Each of the 64 bit positions of `order(value)` gets its own EWAH plane
//! recording, for every appended id, whether that bit was set. A value's
//! exact match is the bitwise AND of the planes (complemented where the
//! target bit is zero); range comparisons resolve to the standard
//! most-significant-bit-first bitslice sweep, expressed — as `spec.md` §3
//! puts it — as "bitstream ORs over bit-plane slices".

use serde::{Deserialize, Serialize};

use vast_bitstream::{Bitstream, EwahBitstream};
use vast_common::event::EventId;
use vast_common::order::{order_f64, order_i64, order_u64};
use vast_common::value::Value;
use vast_common::{Error, Result};

use crate::{header, Op};

const BITS: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NumericKind {
    Int,
    Count,
    Real,
    TimePoint,
    TimeDuration,
}

impl NumericKind {
    fn type_name(self) -> &'static str {
        match self {
            NumericKind::Int => "numeric-int",
            NumericKind::Count => "numeric-count",
            NumericKind::Real => "numeric-real",
            NumericKind::TimePoint => "numeric-time-point",
            NumericKind::TimeDuration => "numeric-time-duration",
        }
    }

    fn order_of(self, value: &Value) -> Result<u64> {
        match (self, value) {
            (NumericKind::Int, Value::Int(x)) => Ok(order_i64(*x)),
            (NumericKind::Count, Value::Count(x)) => Ok(order_u64(*x)),
            (NumericKind::Real, Value::Real(x)) => order_f64(*x),
            (NumericKind::TimePoint, Value::TimePoint(x)) => Ok(order_i64(*x)),
            (NumericKind::TimeDuration, Value::TimeDuration(x)) => Ok(order_i64(*x)),
            _ => Err(Error::schema(format!(
                "value {value} does not match numeric index kind {:?}",
                self
            ))),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Body {
    planes: Vec<EwahBitstream>,
}

pub struct NumericIndex {
    kind: NumericKind,
    highest_id: Option<EventId>,
    planes: Vec<EwahBitstream>,
}

impl NumericIndex {
    pub fn new(kind: NumericKind) -> Self {
        NumericIndex {
            kind,
            highest_id: None,
            planes: (0..BITS).map(|_| EwahBitstream::new()).collect(),
        }
    }

    pub fn kind(&self) -> NumericKind {
        self.kind
    }

    pub fn highest_id(&self) -> Option<EventId> {
        self.highest_id
    }

    fn len(&self) -> u64 {
        self.highest_id.map(|id| id + 1).unwrap_or(0)
    }

    pub fn append(&mut self, id: EventId, value: &Value) -> Result<()> {
        if let Some(highest) = self.highest_id {
            if id <= highest {
                return Err(Error::query(format!(
                    "index append out of order: id {id} <= highest appended {highest}"
                )));
            }
        }
        let code = self.kind.order_of(value)?;
        let gap = id - self.highest_id.map(|h| h + 1).unwrap_or(0);
        for (bit, plane) in self.planes.iter_mut().enumerate() {
            if gap > 0 {
                plane.append(gap, false);
            }
            plane.push_back((code >> bit) & 1 == 1);
        }
        self.highest_id = Some(id);
        Ok(())
    }

    /// `OR` of per-bit mismatch indicators, complemented: every id whose
    /// 64-bit code agrees with `target` on every bit.
    fn eq_code(&self, target: u64) -> EwahBitstream {
        let mut mismatch = EwahBitstream::new();
        for (bit, plane) in self.planes.iter().enumerate() {
            let target_bit = (target >> bit) & 1 == 1;
            let mut m = plane.clone();
            if target_bit {
                m.not();
            }
            mismatch.or(&m);
        }
        mismatch.not();
        self.clamp(mismatch)
    }

    /// Ids whose code is strictly less than `target`, via the standard
    /// MSB-first bitslice sweep.
    fn lt_code(&self, target: u64) -> EwahBitstream {
        let mut candidates = self.all();
        let mut less = EwahBitstream::new();
        less.append(self.len(), false);
        for bit in (0..BITS).rev() {
            let plane = &self.planes[bit as usize];
            let target_bit = (target >> bit) & 1 == 1;
            if target_bit {
                let mut newly_less = candidates.clone();
                let mut not_plane = plane.clone();
                not_plane.not();
                newly_less.and(&not_plane);
                less.or(&newly_less);
                candidates.and(plane);
            } else {
                let mut not_plane = plane.clone();
                not_plane.not();
                candidates.and(&not_plane);
            }
        }
        self.clamp(less)
    }

    fn all(&self) -> EwahBitstream {
        let mut all = EwahBitstream::new();
        all.append(self.len(), true);
        all
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

    pub fn lookup(&self, op: Op, value: &Value) -> Result<EwahBitstream> {
        let target = self.kind.order_of(value)?;
        Ok(match op {
            Op::Eq => self.eq_code(target),
            Op::Ne => {
                let mut b = self.eq_code(target);
                b.not();
                self.clamp(b)
            }
            Op::Lt => self.lt_code(target),
            Op::Le => {
                let mut b = self.lt_code(target);
                b.or(&self.eq_code(target));
                self.clamp(b)
            }
            Op::Gt => {
                let mut b = self.lt_code(target);
                b.or(&self.eq_code(target));
                b.not();
                self.clamp(b)
            }
            Op::Ge => {
                let mut b = self.lt_code(target);
                b.not();
                self.clamp(b)
            }
            other => {
                return Err(Error::query(format!(
                    "operator {other:?} is not supported on a numeric index"
                )))
            }
        })
    }

    pub fn save(&self, path: &std::path::Path) -> Result<()> {
        let body = Body {
            planes: self.planes.clone(),
        };
        header::save(path, self.kind.type_name(), self.highest_id, &body)
    }

    pub fn load(path: &std::path::Path, kind: NumericKind) -> Result<Self> {
        let (highest_id, body): (_, Body) = header::load(path, kind.type_name())?;
        Ok(NumericIndex {
            kind,
            highest_id,
            planes: body.planes,
        })
    }
}
