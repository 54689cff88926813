//! Writes the postings buffered by all thread states as one segment.
//!
//! Every thread state holds its own posting table per field. On flush the
//! tables of one field are merged term by term, and within a term doc by doc,
//! into the `.frq`, `.prx`, `.tis` and `.tii` files. Doc ids of different
//! thread states never collide, so the merge only has to interleave them.

use std::cmp::Ordering;

use verba_common::Result;
use verba_io::{DataOutput, Directory, IndexOutput};

use crate::{
    config::IndexWriterConfig,
    field_infos::{FieldInfo, FieldInfos},
    file_names::{
        FIELD_INFOS_EXTENSION, FREQ_EXTENSION, POSTINGS_EXTENSIONS, PROX_EXTENSION,
        segment_file_name,
    },
    pool::ByteSliceReader,
    posting_table::{Posting, compare_text},
    skip_list::SkipListWriter,
    terms_dict::{TermInfo, TermInfosWriter},
    thread_state::{FieldData, Pools, ThreadState},
};

/// Writes `<segment>.fnm` and returns its name.
pub(crate) fn write_field_infos(
    directory: &dyn Directory,
    segment: &str,
    field_infos: &FieldInfos,
) -> Result<String> {
    let name = segment_file_name(segment, FIELD_INFOS_EXTENSION);
    let mut out = directory.create_output(&name)?;
    field_infos.write(out.as_mut())?;
    out.close()?;
    Ok(name)
}

/// Merges the postings of `states` into the segment's postings files and
/// returns their names.
///
/// The states must have been prepared with [`ThreadState::prepare_merge`].
pub(crate) fn write_postings(
    directory: &dyn Directory,
    segment: &str,
    field_infos: &FieldInfos,
    states: &[&ThreadState],
    num_docs: u32,
    config: &IndexWriterConfig,
) -> Result<Vec<String>> {
    let mut inputs = Vec::new();
    for state in states {
        let (fields, pools) = state.merge_inputs();
        inputs.extend(fields.map(|data| (data, pools)));
    }
    inputs.sort_by(|a, b| a.0.name.cmp(&b.0.name));

    let mut out = PostingsOutput {
        freq: directory.create_output(&segment_file_name(segment, FREQ_EXTENSION))?,
        prox: directory.create_output(&segment_file_name(segment, PROX_EXTENSION))?,
        terms: TermInfosWriter::create(
            directory,
            segment,
            config.term_index_interval,
            config.skip_interval,
            config.max_skip_levels,
        )?,
        skip: SkipListWriter::new(config.skip_interval, config.max_skip_levels, num_docs),
        skip_interval: config.skip_interval,
        payload: Vec::new(),
    };

    for group in inputs.chunk_by(|a, b| a.0.name == b.0.name) {
        let number = group[0].0.number;
        let store_payloads = field_infos
            .get(number)
            .is_some_and(FieldInfo::store_payloads);
        out.append_field(number, store_payloads, group)?;
    }

    let PostingsOutput {
        mut freq,
        mut prox,
        terms,
        ..
    } = out;
    log::debug!(
        "segment {segment}: wrote {} terms from {} thread states",
        terms.num_terms(),
        states.len()
    );
    freq.close()?;
    prox.close()?;
    terms.close()?;

    Ok(POSTINGS_EXTENSIONS
        .iter()
        .map(|ext| segment_file_name(segment, ext))
        .collect())
}

struct PostingsOutput {
    freq: Box<dyn IndexOutput>,
    prox: Box<dyn IndexOutput>,
    terms: TermInfosWriter,
    skip: SkipListWriter,
    skip_interval: u32,
    payload: Vec<u8>,
}

impl PostingsOutput {
    fn append_field(
        &mut self,
        number: u32,
        store_payloads: bool,
        group: &[(&FieldData, &Pools)],
    ) -> Result<()> {
        let mut states = group
            .iter()
            .filter_map(|&(data, pools)| FieldMergeState::new(data, pools))
            .collect::<Vec<_>>();

        let mut term_states = Vec::with_capacity(states.len());
        while !states.is_empty() {
            term_states.clear();
            term_states.push(0);
            for i in 1..states.len() {
                match compare_text(states[i].text, states[term_states[0]].text) {
                    Ordering::Less => {
                        term_states.clear();
                        term_states.push(i);
                    }
                    Ordering::Equal => term_states.push(i),
                    Ordering::Greater => {}
                }
            }
            let text = states[term_states[0]].text;
            let info = self.append_term(store_payloads, &mut states, &term_states)?;
            self.terms.add(number, text, &info)?;

            let mut index = 0;
            states.retain_mut(|state| {
                let keep = !term_states.contains(&index) || state.next_term();
                index += 1;
                keep
            });
        }
        Ok(())
    }

    /// Writes the docs and positions of the current term of every state in
    /// `term_states`.
    fn append_term(
        &mut self,
        store_payloads: bool,
        states: &mut [FieldMergeState<'_>],
        term_states: &[usize],
    ) -> Result<TermInfo> {
        let freq_pointer = self.freq.file_pointer();
        let prox_pointer = self.prox.file_pointer();
        self.skip.reset(freq_pointer, prox_pointer);

        let mut merging = term_states.to_vec();
        let mut df = 0u32;
        let mut last_doc = 0u32;
        let mut last_payload_length = -1i32;
        while !merging.is_empty() {
            df += 1;
            if df % self.skip_interval == 0 {
                self.skip.set_skip_data(
                    last_doc,
                    store_payloads,
                    last_payload_length,
                    self.freq.file_pointer(),
                    self.prox.file_pointer(),
                );
                self.skip.buffer_skip(df)?;
            }

            let mut min = 0;
            for j in 1..merging.len() {
                if states[merging[j]].doc_id < states[merging[min]].doc_id {
                    min = j;
                }
            }
            let state = &mut states[merging[min]];
            let doc = state.doc_id;
            let term_freq = state.term_freq;
            debug_assert!(df == 1 || doc > last_doc);
            let doc_code = (doc - last_doc) << 1;
            last_doc = doc;

            for _ in 0..term_freq {
                let code = state.prox.read_vint();
                if store_payloads {
                    let payload_length = if code & 1 != 0 {
                        state.prox.read_vint()
                    } else {
                        0
                    };
                    if payload_length as i32 != last_payload_length {
                        self.prox.write_vint(code | 1)?;
                        self.prox.write_vint(payload_length)?;
                        last_payload_length = payload_length as i32;
                    } else {
                        self.prox.write_vint(code & !1)?;
                    }
                    if payload_length > 0 {
                        self.payload.resize(payload_length as usize, 0);
                        state.prox.read_bytes(&mut self.payload);
                        self.prox.write_bytes(&self.payload)?;
                    }
                } else {
                    debug_assert_eq!(code & 1, 0);
                    self.prox.write_vint(code >> 1)?;
                }
            }

            if term_freq == 1 {
                self.freq.write_vint(doc_code | 1)?;
            } else {
                self.freq.write_vint(doc_code)?;
                self.freq.write_vint(term_freq)?;
            }

            if !state.next_doc() {
                merging.swap_remove(min);
            }
        }

        let skip_pointer = self.skip.write_skip(self.freq.as_mut())?;
        Ok(TermInfo {
            doc_freq: df,
            freq_pointer,
            prox_pointer,
            skip_offset: (skip_pointer - freq_pointer) as u32,
        })
    }
}

/// Cursor over one thread state's postings of a field, in term order.
struct FieldMergeState<'a> {
    data: &'a FieldData,
    pools: &'a Pools,
    next_term: usize,
    posting: Posting,
    text: &'a [u16],
    freq: ByteSliceReader<'a>,
    prox: ByteSliceReader<'a>,
    doc_id: u32,
    term_freq: u32,
    last_doc_pending: bool,
}

impl<'a> FieldMergeState<'a> {
    fn new(data: &'a FieldData, pools: &'a Pools) -> Option<FieldMergeState<'a>> {
        let mut state = FieldMergeState {
            data,
            pools,
            next_term: 0,
            posting: Posting::default(),
            text: &[],
            freq: ByteSliceReader::new(&pools.postings, 0, 0),
            prox: ByteSliceReader::new(&pools.postings, 0, 0),
            doc_id: 0,
            term_freq: 0,
            last_doc_pending: false,
        };
        state.next_term().then_some(state)
    }

    /// Moves to the next term and its first doc.
    fn next_term(&mut self) -> bool {
        let Some(&index) = self.data.sorted.get(self.next_term) else {
            return false;
        };
        self.next_term += 1;
        let p = *self.data.table.get(index as usize);
        self.posting = p;
        self.text = self.pools.chars.text(p.text_start);
        self.freq = ByteSliceReader::new(&self.pools.postings, p.freq_start, p.freq_upto);
        self.prox = ByteSliceReader::new(&self.pools.postings, p.prox_start, p.prox_upto);
        self.doc_id = 0;
        self.last_doc_pending = true;
        self.next_doc()
    }

    fn next_doc(&mut self) -> bool {
        if self.freq.eof() {
            // the newest doc is still held in the posting itself
            if self.last_doc_pending {
                self.last_doc_pending = false;
                self.doc_id = self.posting.last_doc_id;
                self.term_freq = self.posting.doc_freq;
                return true;
            }
            return false;
        }
        let code = self.freq.read_vint();
        self.doc_id += code >> 1;
        self.term_freq = if code & 1 != 0 {
            1
        } else {
            self.freq.read_vint()
        };
        true
    }
}
