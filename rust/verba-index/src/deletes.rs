//! Buffered deletes and the deleted-documents file.

use ahash::AHashMap;
use roaring::RoaringBitmap;
use verba_common::{Result, verify_data};
use verba_io::{DataInput, DataOutput, Directory};
use verba_ram_budget::RamBudget;

/// Accounted bytes of one buffered delete term, on top of its text.
pub const BYTES_PER_DEL_TERM: u64 = 96;

/// Accounted bytes of one buffered delete doc id.
pub const BYTES_PER_DEL_DOCID: u64 = 20;

/// A field name and a term text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Term {
    pub field: String,
    pub text: String,
}

impl Term {
    pub fn new(field: impl Into<String>, text: impl Into<String>) -> Term {
        Term {
            field: field.into(),
            text: text.into(),
        }
    }

    fn ram_bytes(&self) -> u64 {
        BYTES_PER_DEL_TERM + 2 * (self.field.len() + self.text.len()) as u64
    }
}

/// Deletes waiting for the next flush.
///
/// Each term maps to the number of buffered documents it applies to: only
/// documents with a smaller id in the segment being built are deleted.
#[derive(Debug, Default)]
pub struct BufferedDeletes {
    terms: AHashMap<Term, u32>,
    doc_ids: Vec<u32>,
    num_terms: u32,
    bytes_used: u64,
}

impl BufferedDeletes {
    pub fn new() -> BufferedDeletes {
        Self::default()
    }

    /// Buffers `term`, applying to documents below `limit`. Re-buffering a
    /// term moves its limit.
    pub fn add_term(&mut self, term: Term, limit: u32, budget: &RamBudget) {
        let bytes = term.ram_bytes();
        if self.terms.insert(term, limit).is_none() {
            self.bytes_used += bytes;
            budget.record_used(bytes);
        }
        self.num_terms += 1;
    }

    pub fn add_doc_id(&mut self, doc_id: u32, budget: &RamBudget) {
        self.doc_ids.push(doc_id);
        self.bytes_used += BYTES_PER_DEL_DOCID;
        budget.record_used(BYTES_PER_DEL_DOCID);
    }

    /// Number of delete-term calls since the last flush, repeats included.
    pub fn num_terms(&self) -> u32 {
        self.num_terms
    }

    pub fn num_unique_terms(&self) -> usize {
        self.terms.len()
    }

    pub fn num_doc_ids(&self) -> usize {
        self.doc_ids.len()
    }

    /// Bytes recorded against the budget for the buffered terms and doc ids.
    pub fn bytes_used(&self) -> u64 {
        self.bytes_used
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty() && self.doc_ids.is_empty()
    }

    pub fn terms(&self) -> impl Iterator<Item = (&Term, u32)> {
        self.terms.iter().map(|(term, &limit)| (term, limit))
    }

    pub fn limit(&self, term: &Term) -> Option<u32> {
        self.terms.get(term).copied()
    }

    pub fn doc_ids(&self) -> &[u32] {
        &self.doc_ids
    }

    pub fn clear(&mut self) {
        self.terms.clear();
        self.doc_ids.clear();
        self.num_terms = 0;
        self.bytes_used = 0;
    }
}

/// Writes `deleted` as a bit vector of `size` bits: int size, int count, then
/// `ceil(size / 8)` bytes with bit `d` at byte `d >> 3`, mask `1 << (d & 7)`.
pub fn write_deleted_docs(
    directory: &dyn Directory,
    name: &str,
    deleted: &RoaringBitmap,
    size: u32,
) -> std::io::Result<()> {
    let mut bits = vec![0u8; size.div_ceil(8) as usize];
    let mut count = 0;
    for doc in deleted.iter().take_while(|&doc| doc < size) {
        bits[(doc >> 3) as usize] |= 1 << (doc & 7);
        count += 1;
    }
    let mut out = directory.create_output(name)?;
    out.write_int(size as i32)?;
    out.write_int(count)?;
    out.write_bytes(&bits)?;
    out.close()
}

pub fn read_deleted_docs(directory: &dyn Directory, name: &str) -> Result<RoaringBitmap> {
    let mut input = directory.open_input(name)?;
    let size = input.read_int()?;
    let count = input.read_int()?;
    verify_data!(size, size >= 0);
    let mut bits = vec![0u8; (size as u32).div_ceil(8) as usize];
    input.read_bytes(&mut bits)?;
    let mut deleted = RoaringBitmap::new();
    for (i, &b) in bits.iter().enumerate() {
        for bit in (0..8).filter(|bit| b & (1 << bit) != 0) {
            deleted.insert((i * 8 + bit) as u32);
        }
    }
    verify_data!(count, deleted.len() == count as u64);
    Ok(deleted)
}
