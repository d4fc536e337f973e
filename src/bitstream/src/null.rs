//! Uncompressed reference bitstream (`spec.md` §3), used to cross-check
//! [`crate::ewah::EwahBitstream`] in tests rather than in production indexes.

use crate::{Bitstream, Seq, NPOS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NullBitstream {
    bits: Vec<bool>,
}

impl Bitstream for NullBitstream {
    fn new() -> Self {
        NullBitstream { bits: Vec::new() }
    }

    fn append(&mut self, n: u64, bit: bool) {
        self.bits
            .extend(std::iter::repeat(bit).take(n as usize));
    }

    fn append_block(&mut self, word: u64, bits: u32) {
        assert!(bits <= 64);
        for i in 0..bits {
            self.bits.push((word >> i) & 1 == 1);
        }
    }

    fn size(&self) -> u64 {
        self.bits.len() as u64
    }

    fn count(&self) -> u64 {
        self.bits.iter().filter(|&&b| b).count() as u64
    }

    fn trim(&mut self) {
        while matches!(self.bits.last(), Some(false)) {
            self.bits.pop();
        }
    }

    fn get(&self, i: u64) -> bool {
        self.bits.get(i as usize).copied().unwrap_or(false)
    }

    fn find_first(&self) -> u64 {
        self.bits
            .iter()
            .position(|&b| b)
            .map(|i| i as u64)
            .unwrap_or(NPOS)
    }

    fn find_next(&self, i: u64) -> u64 {
        let start = match i.checked_add(1) {
            Some(s) => s as usize,
            None => return NPOS,
        };
        self.bits
            .iter()
            .enumerate()
            .skip(start)
            .find(|(_, &b)| b)
            .map(|(i, _)| i as u64)
            .unwrap_or(NPOS)
    }

    fn find_last(&self) -> u64 {
        self.bits
            .iter()
            .rposition(|&b| b)
            .map(|i| i as u64)
            .unwrap_or(NPOS)
    }

    fn find_prev(&self, i: u64) -> u64 {
        if i == 0 {
            return NPOS;
        }
        self.bits[..i as usize]
            .iter()
            .rposition(|&b| b)
            .map(|i| i as u64)
            .unwrap_or(NPOS)
    }

    fn not(&mut self) {
        for b in &mut self.bits {
            *b = !*b;
        }
    }

    fn and(&mut self, other: &Self) {
        self.zip_with(other, |a, b| a && b);
    }

    fn or(&mut self, other: &Self) {
        self.zip_with(other, |a, b| a || b);
    }

    fn xor(&mut self, other: &Self) {
        self.zip_with(other, |a, b| a ^ b);
    }

    fn subtract(&mut self, other: &Self) {
        self.zip_with(other, |a, b| a && !b);
    }

    fn sequence(&self) -> Vec<Seq> {
        self.bits
            .chunks(64)
            .map(|chunk| {
                let mut word = 0u64;
                for (i, &b) in chunk.iter().enumerate() {
                    if b {
                        word |= 1u64 << i;
                    }
                }
                Seq::Literal {
                    word,
                    bits: chunk.len() as u32,
                }
            })
            .collect()
    }
}

impl NullBitstream {
    fn zip_with(&mut self, other: &Self, f: impl Fn(bool, bool) -> bool) {
        let len = self.bits.len().max(other.bits.len());
        self.bits.resize(len, false);
        for i in 0..len {
            let a = self.bits[i];
            let b = other.bits.get(i).copied().unwrap_or(false);
            self.bits[i] = f(a, b);
        }
    }
}
