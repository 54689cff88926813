//! Per-thread indexing state.
//!
//! A [`ThreadState`] inverts one document at a time into its own posting
//! tables and pools, without holding the coordinator lock. Stored fields, term
//! vectors and norms of the document are buffered locally until the
//! coordinator writes them out in document order.

use std::{
    io::Read,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use ahash::AHashMap;
use verba_analysis::{Analyzer, Token, TokenStream};
use verba_common::{Result, error::Error};
use verba_io::{DataOutput, IndexOutput, MemoryOutput};

use crate::{
    config::IndexWriterConfig,
    document::{Document, Field, FieldValue},
    field_infos::{FieldInfoFlags, FieldInfos},
    norms::encode_norm,
    pool::{
        ByteBlockPool, ByteSliceReader, CharBlockPool, FIRST_LEVEL_SIZE, IndexingContext,
        SliceWriter, TEXT_END,
    },
    posting_table::{Lookup, Posting, PostingTable, compare_text, hash_text},
    stored_fields::{write_binary_field, write_text_field},
    term_vectors::write_field_header,
};

/// Posting records moved from the shared free list at a time.
const POSTINGS_CHUNK: usize = 256;

/// Units of an oversized term kept for the warning.
const MAX_TERM_PREFIX: usize = 30;

/// Replaces the text terminator inside token text.
const TERMINATOR_REPLACEMENT: u16 = 0xFFFE;

/// Something the indexer dropped from a document without failing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexingWarning {
    /// A term too long for a char block was skipped.
    ImmenseTerm { field: String, prefix: String },
    /// Tokens beyond `max_field_length` were dropped.
    FieldTruncated {
        field: String,
        doc_id: u32,
        max_field_length: u32,
    },
}

/// Pools owned by one thread state.
pub(crate) struct Pools {
    pub(crate) chars: CharBlockPool,
    pub(crate) postings: ByteBlockPool,
    vectors: ByteBlockPool,
}

impl Pools {
    fn new(ctx: &Arc<IndexingContext>) -> Pools {
        Pools {
            chars: CharBlockPool::new(ctx.clone()),
            postings: ByteBlockPool::new(ctx.clone(), true),
            vectors: ByteBlockPool::new(ctx.clone(), false),
        }
    }

    fn reset(&mut self) {
        self.chars.reset();
        self.postings.reset();
        self.vectors.reset();
    }
}

/// Term vector data of one term within the current field instance group.
struct PostingVector {
    posting: u32,
    pos_start: u32,
    pos_upto: u32,
    off_start: u32,
    off_upto: u32,
    last_offset: u32,
}

/// One field name's postings within a thread state, plus the per-document
/// inversion cursor for that field.
pub(crate) struct FieldData {
    pub(crate) name: String,
    pub(crate) number: u32,
    pub(crate) table: PostingTable,
    pub(crate) store_payloads: bool,
    /// Posting indices in term order, computed before a merge.
    pub(crate) sorted: Vec<u32>,
    used_since_flush: bool,

    last_gen: u64,
    group: usize,
    do_norms: bool,
    do_vectors: bool,
    do_vector_positions: bool,
    do_vector_offsets: bool,
    length: u32,
    position: u32,
    offset: u32,
    boost: f32,
}

impl FieldData {
    fn new(name: &str, number: u32) -> FieldData {
        FieldData {
            name: name.to_string(),
            number,
            table: PostingTable::new(),
            store_payloads: false,
            sorted: Vec::new(),
            used_since_flush: false,
            last_gen: 0,
            group: 0,
            do_norms: false,
            do_vectors: false,
            do_vector_positions: false,
            do_vector_offsets: false,
            length: 0,
            position: 0,
            offset: 0,
            boost: 1.0,
        }
    }

    fn start_document(&mut self, generation: u64, group: usize, doc_boost: f32) {
        self.last_gen = generation;
        self.group = group;
        self.used_since_flush = true;
        self.do_norms = false;
        self.do_vectors = false;
        self.do_vector_positions = false;
        self.do_vector_offsets = false;
        self.length = 0;
        self.position = 0;
        self.offset = 0;
        self.boost = doc_boost;
    }
}

/// The instances of one field name within the current document.
struct DocField {
    field: usize,
    instances: Vec<Field>,
}

pub(crate) struct ThreadState {
    ctx: Arc<IndexingContext>,
    config: Arc<IndexWriterConfig>,
    pub(crate) slot: usize,
    pub(crate) do_flush_after: bool,
    doc_id: u32,
    doc_gen: u64,
    doc_boost: f32,

    fields: Vec<FieldData>,
    field_index: AHashMap<String, usize>,
    doc_fields: Vec<DocField>,
    doc_has_vectors: bool,

    pools: Pools,
    free_postings: Vec<Posting>,
    vectors: Vec<PostingVector>,
    token: Token,
    term: Vec<u16>,
    immense_term: bool,

    stored: MemoryOutput,
    num_stored_fields: u32,
    tvf: MemoryOutput,
    vector_fields: Vec<(u32, u64)>,
    doc_norms: Vec<(u32, u8)>,
    warnings: Vec<IndexingWarning>,
}

impl ThreadState {
    pub(crate) fn new(
        ctx: Arc<IndexingContext>,
        config: Arc<IndexWriterConfig>,
        slot: usize,
    ) -> ThreadState {
        let pools = Pools::new(&ctx);
        ThreadState {
            ctx,
            config,
            slot,
            do_flush_after: false,
            doc_id: 0,
            doc_gen: 0,
            doc_boost: 1.0,
            fields: Vec::new(),
            field_index: AHashMap::new(),
            doc_fields: Vec::new(),
            doc_has_vectors: false,
            pools,
            free_postings: Vec::new(),
            vectors: Vec::new(),
            token: Token::default(),
            term: Vec::new(),
            immense_term: false,
            stored: MemoryOutput::new(),
            num_stored_fields: 0,
            tvf: MemoryOutput::new(),
            vector_fields: Vec::new(),
            doc_norms: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub(crate) fn doc_id(&self) -> u32 {
        self.doc_id
    }

    /// Prepares for `doc`: registers its fields and groups the field
    /// instances by name. Runs under the coordinator lock.
    pub(crate) fn init(&mut self, doc: Document, doc_id: u32, field_infos: &mut FieldInfos) {
        self.clear_document();
        self.doc_id = doc_id;
        self.doc_gen += 1;
        let (fields, doc_boost) = doc.into_parts();
        self.doc_boost = doc_boost;

        for field in fields {
            let term_vector = field.term_vector();
            let mut flags = FieldInfoFlags::empty();
            flags.set(FieldInfoFlags::IS_INDEXED, field.is_indexed());
            flags.set(FieldInfoFlags::STORE_TERM_VECTOR, term_vector.is_stored());
            flags.set(
                FieldInfoFlags::STORE_POSITIONS_WITH_TERM_VECTOR,
                term_vector.with_positions(),
            );
            flags.set(
                FieldInfoFlags::STORE_OFFSETS_WITH_TERM_VECTOR,
                term_vector.with_offsets(),
            );
            flags.set(FieldInfoFlags::OMIT_NORMS, field.omit_norms());
            let number = field_infos.add(field.name(), flags);
            let index = match self.field_index.get(field.name()) {
                Some(&index) => index,
                None => {
                    self.fields.push(FieldData::new(field.name(), number));
                    self.field_index
                        .insert(field.name().to_string(), self.fields.len() - 1);
                    self.fields.len() - 1
                }
            };
            let data = &mut self.fields[index];
            if data.last_gen != self.doc_gen {
                data.start_document(self.doc_gen, self.doc_fields.len(), doc_boost);
                self.doc_fields.push(DocField {
                    field: index,
                    instances: Vec::new(),
                });
            }
            if field.is_indexed() {
                data.do_norms |= !field.omit_norms();
                data.do_vectors |= term_vector.is_stored();
                data.do_vector_positions |= term_vector.with_positions();
                data.do_vector_offsets |= term_vector.with_offsets();
                self.doc_has_vectors |= term_vector.is_stored();
            }
            self.doc_fields[data.group].instances.push(field);
        }

        if self.doc_has_vectors {
            // vectors are written field by field in name order
            let fields = &self.fields;
            self.doc_fields
                .sort_by(|a, b| fields[a.field].name.cmp(&fields[b.field].name));
        }
    }

    pub(crate) fn doc_has_vectors(&self) -> bool {
        self.doc_has_vectors
    }

    /// Numbers of the fields of the current document that record norms.
    pub(crate) fn norm_fields(&self) -> impl Iterator<Item = u32> + '_ {
        self.doc_fields
            .iter()
            .map(|group| &self.fields[group.field])
            .filter(|data| data.do_norms)
            .map(|data| data.number)
    }

    /// Inverts and buffers the document set up by [`ThreadState::init`].
    ///
    /// `aborting` is checked between fields; once set, processing stops with
    /// an `Aborted` error.
    pub(crate) fn process_document(&mut self, aborting: &AtomicBool) -> Result<()> {
        let doc_fields = std::mem::take(&mut self.doc_fields);
        let mut result = Ok(());
        for group in doc_fields {
            if aborting.load(Ordering::Acquire) {
                result = Err(Error::aborted("indexing was aborted"));
                break;
            }
            if let Err(e) = self.process_field(group.field, group.instances) {
                result = Err(e);
                break;
            }
        }
        self.immense_term = false;
        result
    }

    fn process_field(&mut self, index: usize, instances: Vec<Field>) -> Result<()> {
        let analyzer = self.config.analyzer.clone();
        let number = self.fields[index].number;
        for mut field in instances {
            if field.is_indexed() {
                if let Err(e) = self.invert_field(index, &mut field, analyzer.as_ref()) {
                    self.discard_vectors(index);
                    return Err(e);
                }
            }
            if field.is_stored() {
                match field.value() {
                    FieldValue::Text(text) => {
                        write_text_field(&mut self.stored, number, field.is_tokenized(), text)?
                    }
                    FieldValue::Binary(bytes) => {
                        write_binary_field(&mut self.stored, number, bytes)?
                    }
                    FieldValue::Reader(_) | FieldValue::Tokens(_) => continue,
                }
                self.num_stored_fields += 1;
            }
        }

        if self.fields[index].do_vectors {
            self.write_vectors(index)?;
        }
        let data = &self.fields[index];
        if data.do_norms {
            let norm = data.boost * self.config.similarity.length_norm(&data.name, data.length);
            self.doc_norms.push((data.number, encode_norm(norm)));
        }
        Ok(())
    }

    fn invert_field(
        &mut self,
        index: usize,
        field: &mut Field,
        analyzer: &dyn Analyzer,
    ) -> Result<()> {
        let data = &mut self.fields[index];
        if data.length > 0 {
            data.position += analyzer.position_increment_gap(field.name());
        }
        data.boost *= field.boost();

        if !field.is_tokenized() {
            let Some(text) = field.value().as_text() else {
                return Ok(());
            };
            load_term(&mut self.term, text);
            let len = self.term.len() as u32;
            let start = self.fields[index].offset;
            self.add_position(index, start, start + len, None);
            let data = &mut self.fields[index];
            data.offset += len;
            data.length += 1;
            return Ok(());
        }

        let name = field.name().to_string();
        let text;
        let mut stream = match field.value_mut() {
            FieldValue::Text(value) => analyzer.token_stream(&name, value)?,
            FieldValue::Reader(reader) => {
                let mut value = String::new();
                reader
                    .read_to_string(&mut value)
                    .map_err(|e| Error::io(format!("reading field '{name}'"), e))?;
                text = value;
                analyzer.token_stream(&name, &text)?
            }
            FieldValue::Tokens(tokens) => return self.invert_stream(index, tokens.as_mut()),
            FieldValue::Binary(_) => return Ok(()),
        };
        self.invert_stream(index, stream.as_mut())
    }

    fn invert_stream(&mut self, index: usize, stream: &mut dyn TokenStream) -> Result<()> {
        let max_field_length = self.config.max_field_length;
        let mut token = std::mem::take(&mut self.token);
        let mut offset_end = None;
        let result = loop {
            token.clear();
            match stream.next_token(&mut token) {
                Ok(true) => {}
                Ok(false) => break Ok(()),
                Err(e) => break Err(e),
            }
            let data = &mut self.fields[index];
            data.position = (data.position + token.position_increment).saturating_sub(1);
            let start = data.offset + token.start_offset;
            let end = data.offset + token.end_offset;
            offset_end = Some(end);
            load_term(&mut self.term, &token.text);
            let payload = token.payload.as_deref().filter(|p| !p.is_empty());
            self.add_position(index, start, end, payload);

            let data = &mut self.fields[index];
            data.length += 1;
            if data.length >= max_field_length {
                token.clear();
                if let Ok(true) = stream.next_token(&mut token) {
                    log::warn!(
                        "max field length {max_field_length} reached for field '{}' in doc {}, ignoring following tokens",
                        data.name,
                        self.doc_id
                    );
                    self.warnings.push(IndexingWarning::FieldTruncated {
                        field: data.name.clone(),
                        doc_id: self.doc_id,
                        max_field_length,
                    });
                }
                break Ok(());
            }
        };
        if let Some(end) = offset_end {
            self.fields[index].offset = end + 1;
        }
        self.token = token;
        result
    }

    /// Records one occurrence of the term in `self.term` at the field's
    /// current position.
    fn add_position(&mut self, index: usize, start: u32, end: u32, payload: Option<&[u8]>) {
        let ThreadState {
            ctx,
            doc_id,
            fields,
            pools,
            free_postings,
            vectors,
            term,
            immense_term,
            warnings,
            ..
        } = self;
        let doc_id = *doc_id;
        let data = &mut fields[index];

        if !CharBlockPool::fits(term.len()) {
            if !*immense_term {
                let prefix = String::from_utf16_lossy(&term[..MAX_TERM_PREFIX.min(term.len())]);
                log::warn!(
                    "skipping immense term in field '{}' ({} units), prefix '{prefix}'",
                    data.name,
                    term.len()
                );
                warnings.push(IndexingWarning::ImmenseTerm {
                    field: data.name.clone(),
                    prefix,
                });
                *immense_term = true;
            }
            data.position += 1;
            return;
        }

        let code = hash_text(term);
        let (posting_index, prox_code) = match data.table.lookup(term, code, &pools.chars) {
            Lookup::Found(i) => {
                let p = data.table.get_mut(i);
                if p.last_doc_id != doc_id {
                    // first occurrence in this doc: the previous doc's freq is final
                    let mut freq = SliceWriter::new(&mut pools.postings, p.freq_upto);
                    if p.doc_freq == 1 {
                        freq.write_vint(p.last_doc_code | 1);
                    } else {
                        freq.write_vint(p.last_doc_code);
                        freq.write_vint(p.doc_freq);
                    }
                    p.freq_upto = freq.address();
                    p.doc_freq = 1;
                    p.last_doc_code = (doc_id - p.last_doc_id) << 1;
                    p.last_doc_id = doc_id;
                    p.vector = None;
                    (i, data.position)
                } else {
                    p.doc_freq += 1;
                    (i, data.position - p.last_position)
                }
            }
            Lookup::Vacant { slot } => {
                if free_postings.is_empty() {
                    ctx.take_postings(POSTINGS_CHUNK, free_postings);
                }
                let mut posting = free_postings.pop().unwrap_or_default();
                let freq_start = pools.postings.new_slice(FIRST_LEVEL_SIZE);
                let prox_start = pools.postings.new_slice(FIRST_LEVEL_SIZE);
                posting.text_start = pools.chars.add_text(term);
                posting.doc_freq = 1;
                posting.freq_start = freq_start;
                posting.freq_upto = freq_start;
                posting.prox_start = prox_start;
                posting.prox_upto = prox_start;
                posting.last_doc_id = doc_id;
                posting.last_doc_code = doc_id << 1;
                posting.last_position = 0;
                posting.vector = None;
                (data.table.insert(slot, posting, &pools.chars), data.position)
            }
        };

        let position = data.position;
        let p = data.table.get_mut(posting_index);
        let mut prox = SliceWriter::new(&mut pools.postings, p.prox_upto);
        match payload {
            Some(payload) => {
                prox.write_vint((prox_code << 1) | 1);
                prox.write_vint(payload.len() as u32);
                prox.write_bytes(payload);
                data.store_payloads = true;
            }
            None => prox.write_vint(prox_code << 1),
        }
        p.prox_upto = prox.address();
        p.last_position = position;

        if data.do_vectors {
            let vector = match p.vector {
                Some(v) => v as usize,
                None => {
                    let mut vector = PostingVector {
                        posting: posting_index as u32,
                        pos_start: 0,
                        pos_upto: 0,
                        off_start: 0,
                        off_upto: 0,
                        last_offset: 0,
                    };
                    if data.do_vector_positions {
                        vector.pos_start = pools.vectors.new_slice(FIRST_LEVEL_SIZE);
                        vector.pos_upto = vector.pos_start;
                    }
                    if data.do_vector_offsets {
                        vector.off_start = pools.vectors.new_slice(FIRST_LEVEL_SIZE);
                        vector.off_upto = vector.off_start;
                    }
                    vectors.push(vector);
                    p.vector = Some((vectors.len() - 1) as u32);
                    vectors.len() - 1
                }
            };
            let vector = &mut vectors[vector];
            if data.do_vector_positions {
                let mut out = SliceWriter::new(&mut pools.vectors, vector.pos_upto);
                out.write_vint(prox_code);
                vector.pos_upto = out.address();
            }
            if data.do_vector_offsets {
                let mut out = SliceWriter::new(&mut pools.vectors, vector.off_upto);
                out.write_vint(start.wrapping_sub(vector.last_offset));
                out.write_vint(end.wrapping_sub(start));
                vector.off_upto = out.address();
                vector.last_offset = end;
            }
        }

        data.position += 1;
    }

    /// Appends the current field's vector to the local `.tvf` buffer and
    /// clears the vector records.
    fn write_vectors(&mut self, index: usize) -> Result<()> {
        let ThreadState {
            fields,
            pools,
            vectors,
            tvf,
            vector_fields,
            ..
        } = self;
        let data = &mut fields[index];
        vector_fields.push((data.number, tvf.file_pointer()));
        write_field_header(
            tvf,
            vectors.len() as u32,
            data.do_vector_positions,
            data.do_vector_offsets,
        )?;

        let table = &data.table;
        let chars = &pools.chars;
        let text_of = |v: &PostingVector| chars.text(table.get(v.posting as usize).text_start);
        vectors.sort_unstable_by(|a, b| compare_text(text_of(a), text_of(b)));
        let mut last: &[u16] = &[];
        for vector in vectors.iter() {
            let text = text_of(vector);
            let prefix = text.iter().zip(last).take_while(|(a, b)| a == b).count();
            tvf.write_vint(prefix as u32)?;
            tvf.write_vint((text.len() - prefix) as u32)?;
            tvf.write_chars(&text[prefix..])?;
            tvf.write_vint(table.get(vector.posting as usize).doc_freq)?;
            if data.do_vector_positions {
                ByteSliceReader::new(&pools.vectors, vector.pos_start, vector.pos_upto)
                    .write_to(tvf)?;
            }
            if data.do_vector_offsets {
                ByteSliceReader::new(&pools.vectors, vector.off_start, vector.off_upto)
                    .write_to(tvf)?;
            }
            last = text;
        }

        for vector in vectors.drain(..) {
            data.table.get_mut(vector.posting as usize).vector = None;
        }
        pools.vectors.reset();
        Ok(())
    }

    fn discard_vectors(&mut self, index: usize) {
        let data = &mut self.fields[index];
        for vector in self.vectors.drain(..) {
            data.table.get_mut(vector.posting as usize).vector = None;
        }
        self.pools.vectors.reset();
    }

    /// Stored fields of the current document: field count and serialized fields.
    pub(crate) fn stored_fields(&self) -> (u32, &MemoryOutput) {
        (self.num_stored_fields, &self.stored)
    }

    /// Vectorized fields of the current document with their offsets in the
    /// local `.tvf` buffer.
    pub(crate) fn term_vectors(&self) -> (&[(u32, u64)], &MemoryOutput) {
        (&self.vector_fields, &self.tvf)
    }

    /// Norm bytes of the current document by field number.
    pub(crate) fn doc_norms(&self) -> &[(u32, u8)] {
        &self.doc_norms
    }

    pub(crate) fn take_warnings(&mut self) -> Vec<IndexingWarning> {
        std::mem::take(&mut self.warnings)
    }

    /// Drops the per-document buffers.
    pub(crate) fn clear_document(&mut self) {
        self.doc_fields.clear();
        self.doc_has_vectors = false;
        self.stored.reset();
        self.num_stored_fields = 0;
        self.tvf.reset();
        self.vector_fields.clear();
        self.doc_norms.clear();
        self.immense_term = false;
        if !self.vectors.is_empty() {
            for data in &mut self.fields {
                for posting in data.table.iter_mut() {
                    posting.vector = None;
                }
            }
            self.vectors.clear();
            self.pools.vectors.reset();
        }
    }

    /// Field numbers whose postings carry payloads.
    pub(crate) fn payload_fields(&self) -> impl Iterator<Item = u32> + '_ {
        self.fields
            .iter()
            .filter(|data| data.store_payloads && !data.table.is_empty())
            .map(|data| data.number)
    }

    /// Freezes the posting tables and sorts their terms for merging.
    pub(crate) fn prepare_merge(&mut self) {
        let chars = &self.pools.chars;
        for data in &mut self.fields {
            if data.table.is_empty() {
                continue;
            }
            data.table.compact();
            data.sorted = data.table.sorted_view(chars);
        }
    }

    /// Field data holding postings, with the pools they point into.
    pub(crate) fn merge_inputs(&self) -> (impl Iterator<Item = &FieldData>, &Pools) {
        (
            self.fields.iter().filter(|data| !data.table.is_empty()),
            &self.pools,
        )
    }

    #[cfg(test)]
    fn num_postings(&self) -> usize {
        self.fields.iter().map(|data| data.table.len()).sum()
    }

    /// Returns all buffered postings and pool blocks to the shared context.
    /// Field data unused since the previous reset is dropped.
    pub(crate) fn reset_postings(&mut self) {
        self.clear_document();
        self.do_flush_after = false;
        let mut free = std::mem::take(&mut self.free_postings);

        self.fields.retain(|data| data.used_since_flush);
        self.field_index = self
            .fields
            .iter()
            .enumerate()
            .map(|(i, data)| (data.name.clone(), i))
            .collect();
        for data in &mut self.fields {
            let num_postings = data.table.len();
            data.table.drain_into(&mut free);
            data.table.shrink_hash(num_postings);
            data.sorted = Vec::new();
            data.store_payloads = false;
            data.used_since_flush = false;
        }

        self.ctx.recycle_postings(&mut free);
        self.free_postings = free;
        self.pools.reset();
    }
}

/// Loads token text as UTF-16 units, replacing the pool's text terminator.
fn load_term(term: &mut Vec<u16>, text: &str) {
    term.clear();
    term.extend(text.encode_utf16().map(|unit| {
        if unit == TEXT_END {
            TERMINATOR_REPLACEMENT
        } else {
            unit
        }
    }));
}

/// Reads the freq and prox streams of `posting` back as
/// `(doc, freq, positions)`; used by tests.
#[cfg(test)]
pub(crate) fn decode_posting(pools: &Pools, posting: &Posting) -> Vec<(u32, u32, Vec<u32>)> {
    let mut freq = ByteSliceReader::new(&pools.postings, posting.freq_start, posting.freq_upto);
    let mut prox = ByteSliceReader::new(&pools.postings, posting.prox_start, posting.prox_upto);
    let mut docs = Vec::new();
    let mut doc = 0;
    while !freq.eof() {
        let code = freq.read_vint();
        doc += code >> 1;
        let tf = if code & 1 != 0 { 1 } else { freq.read_vint() };
        docs.push((doc, tf));
    }
    docs.push((posting.last_doc_id, posting.doc_freq));
    docs.into_iter()
        .map(|(doc, tf)| {
            let mut position = 0;
            let positions = (0..tf)
                .map(|_| {
                    let code = prox.read_vint();
                    if code & 1 != 0 {
                        let len = prox.read_vint() as usize;
                        let mut payload = vec![0u8; len];
                        prox.read_bytes(&mut payload);
                    }
                    position += code >> 1;
                    position
                })
                .collect();
            (doc, tf, positions)
        })
        .collect()
}
