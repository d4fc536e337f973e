//! Bitmap index family (`spec.md` §4.2, `SPEC_FULL.md` §4.2): one variant
//! per semantic [`vast_common::types::Type`], each mapping attribute values
//! to a bitstream of matching event identifiers.

pub mod address;
pub mod header;
pub mod numeric;
pub mod port;
pub mod string;

pub use address::AddressIndex;
pub use numeric::{NumericIndex, NumericKind};
pub use port::PortIndex;
pub use string::StringIndex;

/// Relational operators a bitmap index may be asked to evaluate
/// (`spec.md` §4.4's `RelationalOperator`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// String substring containment, or address-in-subnet membership.
    In,
    NotIn,
    /// Regex match against a string index's pattern facet.
    Match,
    NotMatch,
}
