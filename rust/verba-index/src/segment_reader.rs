//! Read access to one flushed segment.
//!
//! Used to apply buffered deletes to existing segments and to verify what the
//! writer produced. Decoding follows the writer exactly; nothing here is tuned
//! for query evaluation.

use roaring::RoaringBitmap;
use verba_common::{Result, error::Error, verify_data};
use verba_io::{DataInput, Directory, IndexInput};

use crate::{
    deletes::Term,
    field_infos::{FieldInfo, FieldInfos},
    file_names::{
        FIELD_INFOS_EXTENSION, FREQ_EXTENSION, NORMS_EXTENSION, PROX_EXTENSION, segment_file_name,
    },
    index_writer::SegmentInfo,
    norms::{check_header, read_norms},
    stored_fields::{StoredField, StoredFieldsReader},
    term_vectors::{FieldTermVector, TermVectorsReader},
    terms_dict::{TermEnum, TermInfo, TermInfosReader},
};

/// Postings of one term in one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermPosting {
    pub doc: u32,
    pub freq: u32,
    pub positions: Vec<u32>,
    /// Payload per position; empty where the position has none.
    pub payloads: Vec<Vec<u8>>,
}

pub struct SegmentReader {
    name: String,
    doc_count: u32,
    field_infos: FieldInfos,
    terms: TermInfosReader,
    freq: Box<dyn IndexInput>,
    prox: Box<dyn IndexInput>,
    norms: Option<Box<dyn IndexInput>>,
    stored_fields: StoredFieldsReader,
    vectors: Option<TermVectorsReader>,
    deleted: RoaringBitmap,
}

impl SegmentReader {
    pub fn open(directory: &dyn Directory, info: &SegmentInfo) -> Result<SegmentReader> {
        let name = info.name.clone();
        let mut input = directory.open_input(&segment_file_name(&name, FIELD_INFOS_EXTENSION))?;
        let field_infos = FieldInfos::read(input.as_mut())?;

        let stored_fields = StoredFieldsReader::open(directory, &name)?;
        verify_data!(doc_count, stored_fields.num_docs() == info.doc_count);

        let norms_name = segment_file_name(&name, NORMS_EXTENSION);
        let norms = if directory.file_exists(&norms_name)? {
            let mut input = directory.open_input(&norms_name)?;
            verify_data!(norms_header, check_header(input.as_mut())?);
            Some(input)
        } else {
            None
        };

        Ok(SegmentReader {
            doc_count: info.doc_count,
            terms: TermInfosReader::open(directory, &name)?,
            freq: directory.open_input(&segment_file_name(&name, FREQ_EXTENSION))?,
            prox: directory.open_input(&segment_file_name(&name, PROX_EXTENSION))?,
            vectors: TermVectorsReader::open(directory, &name)?,
            deleted: info.deleted.clone(),
            field_infos,
            norms,
            stored_fields,
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of documents in the segment, deleted ones included.
    pub fn doc_count(&self) -> u32 {
        self.doc_count
    }

    /// Number of documents not deleted.
    pub fn num_live_docs(&self) -> u32 {
        self.doc_count - self.deleted.len() as u32
    }

    pub fn is_deleted(&self, doc: u32) -> bool {
        self.deleted.contains(doc)
    }

    pub fn deleted_docs(&self) -> &RoaringBitmap {
        &self.deleted
    }

    pub fn field_infos(&self) -> &FieldInfos {
        &self.field_infos
    }

    pub fn num_terms(&self) -> u64 {
        self.terms.size()
    }

    /// Enumerates all terms in field-name, then text order.
    pub fn terms(&self) -> Result<TermEnum> {
        self.terms.terms()
    }

    pub fn term_info(&self, term: &Term) -> Result<Option<TermInfo>> {
        let Some(number) = self.field_infos.number(&term.field) else {
            return Ok(None);
        };
        let text = term.text.encode_utf16().collect::<Vec<_>>();
        self.terms.get(&self.field_infos, number, &text)
    }

    pub fn doc_freq(&self, term: &Term) -> Result<u32> {
        Ok(self.term_info(term)?.map_or(0, |info| info.doc_freq))
    }

    /// `(doc, freq)` pairs of `term`, deleted documents included.
    pub fn term_docs(&self, term: &Term) -> Result<Vec<(u32, u32)>> {
        let Some(info) = self.term_info(term)? else {
            return Ok(Vec::new());
        };
        let mut freq = self.freq.clone_input();
        read_docs(freq.as_mut(), &info)
    }

    /// Full postings of `term`, deleted documents included.
    pub fn postings(&self, term: &Term) -> Result<Vec<TermPosting>> {
        let Some(info) = self.term_info(term)? else {
            return Ok(Vec::new());
        };
        let store_payloads = self
            .field_infos
            .by_name(&term.field)
            .is_some_and(FieldInfo::store_payloads);
        let mut freq = self.freq.clone_input();
        let docs = read_docs(freq.as_mut(), &info)?;

        let mut prox = self.prox.clone_input();
        prox.seek(info.prox_pointer)?;
        let mut payload_length = 0;
        let mut postings = Vec::with_capacity(docs.len());
        for (doc, freq) in docs {
            let mut position = 0;
            let mut positions = Vec::with_capacity(freq as usize);
            let mut payloads = Vec::with_capacity(freq as usize);
            for _ in 0..freq {
                let code = prox.read_vint()?;
                let mut payload = Vec::new();
                if store_payloads {
                    if code & 1 != 0 {
                        payload_length = prox.read_vint()? as usize;
                    }
                    position += code >> 1;
                    payload.resize(payload_length, 0);
                    prox.read_bytes(&mut payload)?;
                } else {
                    position += code;
                }
                positions.push(position);
                payloads.push(payload);
            }
            postings.push(TermPosting {
                doc,
                freq,
                positions,
                payloads,
            });
        }
        Ok(postings)
    }

    pub fn document(&mut self, doc: u32) -> Result<Vec<StoredField>> {
        self.stored_fields.document(doc)
    }

    /// Norm bytes of `field`, one per document, or `None` if the field has no
    /// norms.
    pub fn norms(&mut self, field: &str) -> Result<Option<Vec<u8>>> {
        let (Some(input), Some(number)) = (self.norms.as_mut(), self.field_infos.number(field))
        else {
            return Ok(None);
        };
        Ok(read_norms(input.as_mut(), &self.field_infos, number, self.doc_count)?)
    }

    /// Term vectors of `doc`; empty if the segment stores none for it.
    pub fn term_vectors(&mut self, doc: u32) -> Result<Vec<FieldTermVector>> {
        match self.vectors.as_mut() {
            Some(vectors) => vectors.document(doc),
            None if doc < self.doc_count => Ok(Vec::new()),
            None => Err(Error::invalid_arg(
                "doc",
                format!("{doc} is out of range (num docs {})", self.doc_count),
            )),
        }
    }
}

fn read_docs(input: &mut dyn IndexInput, info: &TermInfo) -> Result<Vec<(u32, u32)>> {
    input.seek(info.freq_pointer)?;
    let mut doc = 0;
    let mut docs = Vec::with_capacity(info.doc_freq as usize);
    for _ in 0..info.doc_freq {
        let code = input.read_vint()?;
        doc += code >> 1;
        let freq = if code & 1 != 0 { 1 } else { input.read_vint()? };
        docs.push((doc, freq));
    }
    Ok(docs)
}
