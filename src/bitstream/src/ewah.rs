//! Enhanced Word-Aligned Hybrid bitstream (`spec.md` §4.1).
//!
//! Storage is a flat `Vec<u64>` of alternating marker and literal words. A
//! marker's 64 bits pack `{polarity: bit 63, clean-fill count: bits 32..62,
//! following-literal count: bits 0..31}`; the literal words it governs
//! follow it immediately. The final physical word is always literal:
//! `ensure_trailing_literal` pulls one word back out of a run whenever a
//! fully aligned, fully uniform append would otherwise leave a bare marker.

use serde::{Deserialize, Serialize};

use crate::{low_mask, Bitstream, Seq, NPOS};

const CLEAN_BITS: u32 = 31;
const LITERAL_BITS: u32 = 32;
/// `spec.md`'s EWAH marker layout gives the clean-fill count 31 bits; the
/// largest count that field can hold is `2^31 - 1`, which we take as
/// canonical over the prose's rounder "max 2^31" (see DESIGN.md).
const MAX_CLEAN: u64 = (1u64 << CLEAN_BITS) - 1;
const MAX_LITERAL: u64 = (1u64 << LITERAL_BITS) - 1;

fn marker_polarity(w: u64) -> bool {
    (w >> 63) & 1 == 1
}

fn marker_clean(w: u64) -> u64 {
    (w >> 32) & MAX_CLEAN
}

fn marker_literal(w: u64) -> u64 {
    w & MAX_LITERAL
}

fn make_marker(polarity: bool, clean: u64, literal: u64) -> u64 {
    debug_assert!(clean <= MAX_CLEAN);
    debug_assert!(literal <= MAX_LITERAL);
    ((polarity as u64) << 63) | (clean << 32) | literal
}

#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EwahBitstream {
    words: Vec<u64>,
    size: u64,
    /// Index of the marker currently accepting new literals.
    rlw: usize,
}

impl EwahBitstream {
    fn start_new_word(&mut self) {
        let marker = self.words[self.rlw];
        if marker_literal(marker) == MAX_LITERAL {
            self.words.push(0);
            self.rlw = self.words.len() - 1;
        }
        self.words.push(0);
        let marker = self.words[self.rlw];
        let lc = marker_literal(marker) + 1;
        self.words[self.rlw] = make_marker(marker_polarity(marker), marker_clean(marker), lc);
    }

    fn complete_last_word(&mut self) {
        let word = *self.words.last().unwrap();
        let marker = self.words[self.rlw];
        let lc = marker_literal(marker);
        if lc == 1 && (word == 0 || word == u64::MAX) {
            let polarity = word == u64::MAX;
            let cc = marker_clean(marker);
            let existing_polarity = marker_polarity(marker);
            let can_fold = cc == 0 || existing_polarity == polarity;
            if can_fold && cc < MAX_CLEAN {
                self.words.pop();
                self.words[self.rlw] = make_marker(polarity, cc + 1, 0);
            }
        }
    }

    /// Bulk-folds `words` whole 64-bit words of uniform `bit` into the
    /// current or successive markers, rolling over at `MAX_CLEAN`.
    fn fold_words(&mut self, mut words: u64, bit: bool) {
        if words == 0 {
            return;
        }
        let marker = self.words[self.rlw];
        let lc = marker_literal(marker);
        let cc = marker_clean(marker);
        let polarity = marker_polarity(marker);
        if lc == 0 && (cc == 0 || polarity == bit) && cc < MAX_CLEAN {
            let capacity = MAX_CLEAN - cc;
            let take = words.min(capacity);
            self.words[self.rlw] = make_marker(bit, cc + take, 0);
            self.size += take * 64;
            words -= take;
        }
        while words > 0 {
            self.words.push(0);
            self.rlw = self.words.len() - 1;
            let take = words.min(MAX_CLEAN);
            self.words[self.rlw] = make_marker(bit, take, 0);
            self.size += take * 64;
            words -= take;
        }
    }

    /// Keeps the physical last word literal even when the most recently
    /// completed word turned out uniform and got folded into the active
    /// run. Without this, a perfectly aligned uniform append (e.g. 128 set
    /// bits) would leave a bare marker with no trailing literal, which
    /// `decode`'s "last block is literal" assumption depends on.
    fn ensure_trailing_literal(&mut self) {
        if self.size == 0 || self.size % 64 != 0 {
            return;
        }
        let marker = self.words[self.rlw];
        if marker_literal(marker) > 0 {
            return;
        }
        let cc = marker_clean(marker);
        if cc == 0 {
            return;
        }
        let polarity = marker_polarity(marker);
        self.words[self.rlw] = make_marker(polarity, cc - 1, 1);
        self.words.push(if polarity { u64::MAX } else { 0 });
    }

    /// Decodes the run currently at `self.words[idx]`'s governing marker and
    /// everything it controls into [`Seq`] values, without expanding fills
    /// bit by bit.
    fn decode(&self) -> Vec<Seq> {
        let mut out = Vec::new();
        let mut pos = 0usize;
        while pos < self.words.len() {
            let marker = self.words[pos];
            let cc = marker_clean(marker);
            let lc = marker_literal(marker);
            let polarity = marker_polarity(marker);
            if cc > 0 {
                out.push(Seq::Fill {
                    polarity,
                    len: cc * 64,
                });
            }
            for j in 0..lc as usize {
                out.push(Seq::Literal {
                    word: self.words[pos + 1 + j],
                    bits: 64,
                });
            }
            pos += 1 + lc as usize;
        }
        let rem = (self.size % 64) as u32;
        if rem != 0 {
            match out.last_mut() {
                Some(Seq::Literal { word, bits }) => {
                    *word &= low_mask(rem);
                    *bits = rem;
                }
                _ => unreachable!("the last block of a non-empty partial word is always literal"),
            }
        }
        out
    }

    fn find_from(&self, start: u64) -> u64 {
        if start >= self.size {
            return NPOS;
        }
        let mut offset = 0u64;
        for seq in self.decode() {
            let len = seq.len();
            if offset + len <= start {
                offset += len;
                continue;
            }
            match seq {
                Seq::Fill { polarity: true, .. } => return start.max(offset),
                Seq::Fill { polarity: false, .. } => {}
                Seq::Literal { word, bits } => {
                    let local_start = start.saturating_sub(offset) as u32;
                    let masked = (word & low_mask(bits)) & (!0u64 << local_start.min(63));
                    let masked = if local_start >= 64 { 0 } else { masked };
                    if masked != 0 {
                        return offset + masked.trailing_zeros() as u64;
                    }
                }
            }
            offset += len;
        }
        NPOS
    }

    fn find_before(&self, limit: u64) -> u64 {
        if limit == 0 {
            return NPOS;
        }
        let mut offset = 0u64;
        let mut blocks = Vec::new();
        for seq in self.decode() {
            let len = seq.len();
            blocks.push((offset, seq));
            offset += len;
        }
        for (off, seq) in blocks.into_iter().rev() {
            let len = seq.len();
            if off >= limit {
                continue;
            }
            let effective_len = (limit - off).min(len);
            if effective_len == 0 {
                continue;
            }
            match seq {
                Seq::Fill { polarity: true, .. } => return off + effective_len - 1,
                Seq::Fill { polarity: false, .. } => {}
                Seq::Literal { word, bits } => {
                    let masked = word & low_mask(bits) & low_mask(effective_len as u32);
                    if masked != 0 {
                        let hi = 63 - masked.leading_zeros();
                        return off + hi as u64;
                    }
                }
            }
        }
        NPOS
    }

    fn combine(
        &self,
        other: &Self,
        fill_op: impl Fn(bool, bool) -> bool,
        word_op: impl Fn(u64, u64) -> u64,
    ) -> Self {
        #[derive(Clone, Copy)]
        enum Kind {
            Fill(bool),
            Literal(u64),
        }
        impl Kind {
            fn as_word(self) -> u64 {
                match self {
                    Kind::Fill(true) => u64::MAX,
                    Kind::Fill(false) => 0,
                    Kind::Literal(w) => w,
                }
            }
        }

        let size = self.size.max(other.size);
        let total_words = size.div_ceil(64);
        let mut result = EwahBitstream::new();

        let sa = self.decode();
        let sb = other.decode();
        let (mut ia, mut ib) = (0usize, 0usize);
        let (mut consumed_a, mut consumed_b) = (0u64, 0u64);
        let mut words_done = 0u64;

        while words_done < total_words {
            let avail_a = match sa.get(ia) {
                Some(Seq::Fill { len, .. }) => len / 64 - consumed_a,
                Some(Seq::Literal { .. }) => 1,
                None => total_words - words_done,
            };
            let avail_b = match sb.get(ib) {
                Some(Seq::Fill { len, .. }) => len / 64 - consumed_b,
                Some(Seq::Literal { .. }) => 1,
                None => total_words - words_done,
            };
            let take = avail_a.min(avail_b).min(total_words - words_done).max(1);

            let kind_a = match sa.get(ia) {
                Some(Seq::Fill { polarity, .. }) => Kind::Fill(*polarity),
                Some(Seq::Literal { word, .. }) => Kind::Literal(*word),
                None => Kind::Fill(false),
            };
            let kind_b = match sb.get(ib) {
                Some(Seq::Fill { polarity, .. }) => Kind::Fill(*polarity),
                Some(Seq::Literal { word, .. }) => Kind::Literal(*word),
                None => Kind::Fill(false),
            };

            match (kind_a, kind_b) {
                (Kind::Fill(pa), Kind::Fill(pb)) => {
                    result.append(take * 64, fill_op(pa, pb));
                }
                _ => {
                    let bits = (size - words_done * 64).min(64) as u32;
                    result.append_block(word_op(kind_a.as_word(), kind_b.as_word()), bits);
                }
            }

            match sa.get(ia) {
                Some(Seq::Fill { len, .. }) => {
                    consumed_a += take;
                    if consumed_a * 64 >= *len {
                        ia += 1;
                        consumed_a = 0;
                    }
                }
                Some(Seq::Literal { .. }) => ia += 1,
                None => {}
            }
            match sb.get(ib) {
                Some(Seq::Fill { len, .. }) => {
                    consumed_b += take;
                    if consumed_b * 64 >= *len {
                        ib += 1;
                        consumed_b = 0;
                    }
                }
                Some(Seq::Literal { .. }) => ib += 1,
                None => {}
            }
            words_done += take;
        }
        result.size = size;
        result
    }
}

impl Bitstream for EwahBitstream {
    fn new() -> Self {
        EwahBitstream {
            words: vec![0],
            size: 0,
            rlw: 0,
        }
    }

    fn append(&mut self, n: u64, bit: bool) {
        let mut remaining = n;
        while remaining > 0 && self.size % 64 != 0 {
            self.push_back(bit);
            remaining -= 1;
        }
        if remaining >= 64 {
            let whole = remaining / 64;
            self.fold_words(whole, bit);
            remaining -= whole * 64;
        }
        while remaining > 0 {
            self.push_back(bit);
            remaining -= 1;
        }
        self.ensure_trailing_literal();
    }

    fn append_block(&mut self, word: u64, bits: u32) {
        assert!(bits <= 64);
        if bits == 0 {
            return;
        }
        if bits == 64 && self.size % 64 == 0 {
            self.start_new_word();
            *self.words.last_mut().unwrap() = word;
            self.size += 64;
            self.complete_last_word();
            self.ensure_trailing_literal();
            return;
        }
        for i in 0..bits {
            self.push_back((word >> i) & 1 == 1);
        }
        self.ensure_trailing_literal();
    }

    fn push_back(&mut self, bit: bool) {
        let offset = self.size % 64;
        if offset == 0 {
            self.start_new_word();
        }
        if bit {
            *self.words.last_mut().unwrap() |= 1u64 << offset;
        }
        self.size += 1;
        if self.size % 64 == 0 {
            self.complete_last_word();
            self.ensure_trailing_literal();
        }
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn count(&self) -> u64 {
        self.decode()
            .into_iter()
            .map(|seq| match seq {
                Seq::Fill { polarity: true, len } => len,
                Seq::Fill { polarity: false, .. } => 0,
                Seq::Literal { word, bits } => (word & low_mask(bits)).count_ones() as u64,
            })
            .sum()
    }

    fn trim(&mut self) {
        let last = self.find_last();
        match last {
            NPOS => *self = EwahBitstream::new(),
            idx => {
                let new_size = idx + 1;
                if new_size == self.size {
                    return;
                }
                let mut rebuilt = EwahBitstream::new();
                let mut offset = 0u64;
                for seq in self.decode() {
                    if offset >= new_size {
                        break;
                    }
                    let len = seq.len().min(new_size - offset);
                    match seq {
                        Seq::Fill { polarity, .. } => rebuilt.append(len, polarity),
                        Seq::Literal { word, .. } => {
                            rebuilt.append_block(word & low_mask(len as u32), len as u32)
                        }
                    }
                    offset += len;
                }
                *self = rebuilt;
            }
        }
    }

    fn get(&self, i: u64) -> bool {
        if i >= self.size {
            return false;
        }
        let mut offset = 0u64;
        for seq in self.decode() {
            let len = seq.len();
            if i < offset + len {
                return match seq {
                    Seq::Fill { polarity, .. } => polarity,
                    Seq::Literal { word, .. } => (word >> (i - offset)) & 1 == 1,
                };
            }
            offset += len;
        }
        false
    }

    fn find_first(&self) -> u64 {
        self.find_from(0)
    }

    fn find_next(&self, i: u64) -> u64 {
        match i.checked_add(1) {
            Some(next) => self.find_from(next),
            None => NPOS,
        }
    }

    fn find_last(&self) -> u64 {
        self.find_before(self.size)
    }

    fn find_prev(&self, i: u64) -> u64 {
        self.find_before(i)
    }

    fn not(&mut self) {
        let mut i = 0;
        while i < self.words.len() {
            let marker = self.words[i];
            let cc = marker_clean(marker);
            let lc = marker_literal(marker);
            let polarity = marker_polarity(marker);
            self.words[i] = make_marker(!polarity, cc, lc);
            for j in 1..=lc as usize {
                self.words[i + j] = !self.words[i + j];
            }
            i += 1 + lc as usize;
        }
    }

    fn and(&mut self, other: &Self) {
        *self = self.combine(other, |a, b| a && b, |a, b| a & b);
    }

    fn or(&mut self, other: &Self) {
        *self = self.combine(other, |a, b| a || b, |a, b| a | b);
    }

    fn xor(&mut self, other: &Self) {
        *self = self.combine(other, |a, b| a ^ b, |a, b| a ^ b);
    }

    fn subtract(&mut self, other: &Self) {
        let mut negated = other.clone();
        negated.not();
        self.and(&negated);
    }

    fn sequence(&self) -> Vec<Seq> {
        self.decode()
    }
}

impl Default for EwahBitstream {
    fn default() -> Self {
        Bitstream::new()
    }
}

impl Clone for EwahBitstream {
    fn clone(&self) -> Self {
        EwahBitstream {
            words: self.words.clone(),
            size: self.size,
            rlw: self.rlw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_1_ewah_canonical_form() {
        let mut b = EwahBitstream::new();
        b.append(10, true);
        b.append(20, false);
        b.append(40, true);
        assert_eq!(b.size(), 70);
        assert_eq!(b.count(), 50);
        assert_eq!(b.find_first(), 0);
        assert_eq!(b.find_next(9), 30);
        b.trim();
        assert_eq!(b.find_next(69), NPOS);
    }

    #[test]
    fn scenario_2_ewah_boolean_identity() {
        let mut a = EwahBitstream::new();
        a.append(10, true);
        a.append(20, false);
        a.append(1, true);

        let mut b = EwahBitstream::new();
        b.append(5, false);
        b.append(10, true);
        b.append(1, false);
        b.append(15, true);

        let mut and_ab = a.clone();
        and_ab.and(&b);
        assert_eq!(and_ab.count(), 5);

        let mut or_ab = a.clone();
        or_ab.or(&b);
        assert_eq!(or_ab.count(), 26);

        let mut xor_ab = a.clone();
        xor_ab.xor(&b);
        let mut expect = or_ab.clone();
        expect.subtract(&and_ab);
        for i in 0..xor_ab.size().max(expect.size()) {
            assert_eq!(xor_ab.get(i), expect.get(i), "mismatch at bit {i}");
        }
    }

    #[test]
    fn last_block_is_always_literal_and_clean_count_bounded() {
        let mut b = EwahBitstream::new();
        b.append(1000, true);
        b.append(1, false);
        for w in &b.words[..b.words.len() - 1] {
            let _ = w;
        }
        let last = *b.words.last().unwrap();
        assert_ne!(last, 0);
        assert_ne!(last, u64::MAX);
        for chunk_start in (0..b.words.len()).step_by(1) {
            if let Some(&marker) = b.words.get(chunk_start) {
                if marker_literal(marker) > 0 || marker_clean(marker) > 0 {
                    assert!(marker_clean(marker) <= MAX_CLEAN);
                }
            }
        }
    }

    #[test]
    fn empty_bitstream_starts_with_marker() {
        let b = EwahBitstream::new();
        assert_eq!(b.words.len(), 1);
        assert_eq!(b.size(), 0);
        assert_eq!(b.find_first(), NPOS);
    }

    #[test]
    fn trim_on_all_zero_collapses_to_empty() {
        let mut b = EwahBitstream::new();
        b.append(128, false);
        b.trim();
        assert_eq!(b.size(), 0);
        assert_eq!(b.find_last(), NPOS);
    }

    #[test]
    fn large_uniform_run_stays_compressed() {
        let mut b = EwahBitstream::new();
        b.append(10_000_000, true);
        assert_eq!(b.count(), 10_000_000);
        assert!(b.words.len() < 100);
    }
}
