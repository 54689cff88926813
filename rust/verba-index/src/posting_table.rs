//! Per-field open-addressing hash of the terms buffered since the last flush.
//!
//! Term text lives in the thread's [`CharBlockPool`]; the table itself only
//! stores dense [`Posting`] records and a power-of-two slot array indexing
//! into them.

use std::cmp::Ordering;

use crate::pool::CharBlockPool;

/// Marks an empty hash slot.
const EMPTY: u32 = u32::MAX;

const INITIAL_HASH_SIZE: usize = 4;

/// In-RAM accumulator of one term's postings.
///
/// Addresses point into the owning thread's pools: `text_start` into the char
/// pool, the freq/prox pairs into the postings byte pool (`*_start` is where the
/// stream begins, `*_upto` where the next byte goes).
#[derive(Clone, Copy, Debug, Default)]
pub struct Posting {
    pub text_start: u32,
    /// Occurrences in the current document (or in `last_doc_id` once it has
    /// been finished but not yet written).
    pub doc_freq: u32,
    pub freq_start: u32,
    pub freq_upto: u32,
    pub prox_start: u32,
    pub prox_upto: u32,
    pub last_doc_id: u32,
    /// `(doc_delta << 1)` pending for `last_doc_id`.
    pub last_doc_code: u32,
    pub last_position: u32,
    /// Index of this term's vector record in the current document.
    pub vector: Option<u32>,
}

/// Bytes accounted for a single posting record.
pub const POSTING_BYTES: u64 = std::mem::size_of::<Posting>() as u64;

/// Result of probing the table for a term.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lookup {
    Found(usize),
    Vacant { slot: usize },
}

/// Hash code of a term: base-31 multiplicative hash over the UTF-16 units,
/// last unit first.
pub fn hash_text(text: &[u16]) -> i32 {
    text.iter()
        .rev()
        .fold(0i32, |code, &ch| code.wrapping_mul(31).wrapping_add(ch as i32))
}

fn probe_increment(code: i32) -> i32 {
    ((code >> 8).wrapping_add(code)) | 1
}

/// Orders term text unit by unit; a text sorts before any longer text it
/// prefixes.
pub fn compare_text(a: &[u16], b: &[u16]) -> Ordering {
    a.cmp(b)
}

pub struct PostingTable {
    postings: Vec<Posting>,
    hash: Vec<u32>,
    compacted: bool,
}

impl Default for PostingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl PostingTable {
    pub fn new() -> PostingTable {
        PostingTable {
            postings: Vec::new(),
            hash: vec![EMPTY; INITIAL_HASH_SIZE],
            compacted: false,
        }
    }

    pub fn len(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    pub fn hash_size(&self) -> usize {
        self.hash.len()
    }

    fn mask(&self) -> i32 {
        (self.hash.len() - 1) as i32
    }

    pub fn get(&self, index: usize) -> &Posting {
        &self.postings[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut Posting {
        &mut self.postings[index]
    }

    /// Looks up `text` (whose [`hash_text`] is `code`).
    pub fn lookup(&self, text: &[u16], code: i32, chars: &CharBlockPool) -> Lookup {
        debug_assert!(!self.compacted);
        let mask = self.mask();
        let mut code = code;
        let mut slot = (code & mask) as usize;
        let mut entry = self.hash[slot];
        if entry != EMPTY && !chars.text_equals(self.postings[entry as usize].text_start, text) {
            let inc = probe_increment(code);
            loop {
                code = code.wrapping_add(inc);
                slot = (code & mask) as usize;
                entry = self.hash[slot];
                if entry == EMPTY
                    || chars.text_equals(self.postings[entry as usize].text_start, text)
                {
                    break;
                }
            }
        }
        if entry == EMPTY {
            Lookup::Vacant { slot }
        } else {
            Lookup::Found(entry as usize)
        }
    }

    /// Stores `posting` in the vacant `slot` returned by [`PostingTable::lookup`].
    /// Returns the posting's index. The table doubles once it is half full.
    pub fn insert(&mut self, slot: usize, posting: Posting, chars: &CharBlockPool) -> usize {
        debug_assert_eq!(self.hash[slot], EMPTY);
        let index = self.postings.len();
        self.postings.push(posting);
        self.hash[slot] = index as u32;
        if self.postings.len() == self.hash.len() / 2 {
            self.rehash(2 * self.hash.len(), chars);
        }
        index
    }

    fn rehash(&mut self, new_size: usize, chars: &CharBlockPool) {
        debug_assert!(new_size.is_power_of_two());
        let mask = (new_size - 1) as i32;
        let mut hash = vec![EMPTY; new_size];
        for (index, posting) in self.postings.iter().enumerate() {
            let mut code = hash_text(chars.text(posting.text_start));
            let mut slot = (code & mask) as usize;
            if hash[slot] != EMPTY {
                let inc = probe_increment(code);
                while hash[slot] != EMPTY {
                    code = code.wrapping_add(inc);
                    slot = (code & mask) as usize;
                }
            }
            hash[slot] = index as u32;
        }
        self.hash = hash;
    }

    /// Freezes the table for merging and returns the live postings.
    pub fn compact(&mut self) -> &[Posting] {
        self.compacted = true;
        &self.postings
    }

    /// Returns the posting indices ordered by term text.
    pub fn sorted_view(&self, chars: &CharBlockPool) -> Vec<u32> {
        let mut order = (0..self.postings.len() as u32).collect::<Vec<_>>();
        order.sort_unstable_by(|&a, &b| {
            compare_text(
                chars.text(self.postings[a as usize].text_start),
                chars.text(self.postings[b as usize].text_start),
            )
        });
        order
    }

    /// Halves the slot array while it is much larger than `target` entries.
    pub fn shrink_hash(&mut self, target: usize) {
        debug_assert!(self.postings.is_empty());
        let mut size = self.hash.len();
        while size >= 8 && size / 4 > target {
            size /= 2;
        }
        if size != self.hash.len() {
            self.hash = vec![EMPTY; size];
        } else {
            self.hash.fill(EMPTY);
        }
    }

    /// Empties the table, moving its posting records into `free`.
    pub fn drain_into(&mut self, free: &mut Vec<Posting>) {
        free.append(&mut self.postings);
        self.hash.fill(EMPTY);
        self.compacted = false;
    }

    pub fn iter(&self) -> impl Iterator<Item = &Posting> {
        self.postings.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Posting> {
        self.postings.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use verba_ram_budget::RamBudget;

    use super::*;
    use crate::pool::IndexingContext;

    fn units(s: &str) -> Vec<u16> {
        s.encode_utf16().collect()
    }

    fn add(table: &mut PostingTable, chars: &mut CharBlockPool, term: &str) -> usize {
        let text = units(term);
        let code = hash_text(&text);
        match table.lookup(&text, code, chars) {
            Lookup::Found(index) => index,
            Lookup::Vacant { slot } => {
                let text_start = chars.add_text(&text);
                let posting = Posting {
                    text_start,
                    ..Default::default()
                };
                table.insert(slot, posting, chars)
            }
        }
    }

    #[test]
    fn test_hash_matches_reference_values() {
        assert_eq!(hash_text(&[]), 0);
        assert_eq!(hash_text(&units("a")), 97);
        // "ab" folds 'b' first: 98 * 31 + 97
        assert_eq!(hash_text(&units("ab")), 98 * 31 + 97);
        let long = units(&"z".repeat(40));
        assert_eq!(hash_text(&long), hash_text(&long));
    }

    #[test]
    fn test_insert_lookup_and_rehash() {
        let ctx: Arc<IndexingContext> = IndexingContext::new(RamBudget::new(None));
        let mut chars = CharBlockPool::new(ctx);
        let mut table = PostingTable::new();
        let words = (0..1000).map(|i| format!("w{i}")).collect::<Vec<_>>();
        let indices = words
            .iter()
            .map(|w| add(&mut table, &mut chars, w))
            .collect::<Vec<_>>();
        assert_eq!(table.len(), 1000);
        assert!(table.hash_size().is_power_of_two());
        assert!(table.hash_size() > 2 * table.len());
        for (w, &i) in words.iter().zip(&indices) {
            assert_eq!(add(&mut table, &mut chars, w), i);
            assert_eq!(chars.text(table.get(i).text_start), &units(w)[..]);
        }
        assert_eq!(table.len(), 1000);
    }

    #[test]
    fn test_sorted_view_orders_prefixes_first() {
        let ctx = IndexingContext::new(RamBudget::new(None));
        let mut chars = CharBlockPool::new(ctx);
        let mut table = PostingTable::new();
        for w in ["fox", "a", "foxes", "", "b", "fo"] {
            add(&mut table, &mut chars, w);
        }
        let sorted = table
            .sorted_view(&chars)
            .into_iter()
            .map(|i| String::from_utf16_lossy(chars.text(table.get(i as usize).text_start)))
            .collect::<Vec<_>>();
        assert_eq!(sorted, ["", "a", "b", "fo", "fox", "foxes"]);
    }

    #[test]
    fn test_drain_and_shrink() {
        let ctx = IndexingContext::new(RamBudget::new(None));
        let mut chars = CharBlockPool::new(ctx);
        let mut table = PostingTable::new();
        for i in 0..100 {
            add(&mut table, &mut chars, &i.to_string());
        }
        assert_eq!(table.compact().len(), 100);
        let mut free = Vec::new();
        table.drain_into(&mut free);
        assert_eq!(free.len(), 100);
        assert!(table.is_empty());
        table.shrink_hash(1);
        assert_eq!(table.hash_size(), 4);
        assert_eq!(add(&mut table, &mut chars, "again"), 0);
    }
}
