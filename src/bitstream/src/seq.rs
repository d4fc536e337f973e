/// A lazily-decoded run produced by [`crate::Bitstream::sequence`]: either a
/// uniform fill of `len` bits or a literal word carrying up to 64 concrete
/// bits. Mirrors `spec.md` §4.1's `sequence_range`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Seq {
    Fill { polarity: bool, len: u64 },
    Literal { word: u64, bits: u32 },
}

impl Seq {
    pub fn len(&self) -> u64 {
        match *self {
            Seq::Fill { len, .. } => len,
            Seq::Literal { bits, .. } => bits as u64,
        }
    }
}
