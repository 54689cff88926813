//! Term vectors: `.tvx` indexes per-document pointers into `.tvd` (the list
//! of vectorized fields) and `.tvf` (per-field terms, positions and offsets).

use bitflags::bitflags;
use verba_common::{Result, error::Error, verify_data};
use verba_io::{DataInput, DataOutput, Directory, IndexInput, IndexOutput, MemoryOutput};

use crate::file_names::{
    VECTORS_DOCUMENTS_EXTENSION, VECTORS_FIELDS_EXTENSION, VECTORS_INDEX_EXTENSION,
    segment_file_name,
};

pub const VECTORS_FORMAT: i32 = 2;

bitflags! {
    /// What a field's `.tvf` entry carries besides term frequencies.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VectorFlags: u8 {
        const STORE_POSITIONS = 0x01;
        const STORE_OFFSETS = 0x02;
    }
}

/// Shared `.tvx`/`.tvd`/`.tvf` outputs of the segment being built.
pub struct TermVectorsWriter {
    index: Box<dyn IndexOutput>,
    documents: Box<dyn IndexOutput>,
    fields: Box<dyn IndexOutput>,
}

impl TermVectorsWriter {
    /// Creates the vector files, writing empty entries for the `num_docs`
    /// documents already in the store.
    pub fn open(
        directory: &dyn Directory,
        segment: &str,
        num_docs: u32,
    ) -> std::io::Result<TermVectorsWriter> {
        let mut index =
            directory.create_output(&segment_file_name(segment, VECTORS_INDEX_EXTENSION))?;
        let mut documents =
            directory.create_output(&segment_file_name(segment, VECTORS_DOCUMENTS_EXTENSION))?;
        let mut fields =
            directory.create_output(&segment_file_name(segment, VECTORS_FIELDS_EXTENSION))?;
        index.write_int(VECTORS_FORMAT)?;
        documents.write_int(VECTORS_FORMAT)?;
        fields.write_int(VECTORS_FORMAT)?;
        let mut writer = TermVectorsWriter {
            index,
            documents,
            fields,
        };
        for _ in 0..num_docs {
            writer.write_document(&[], &MemoryOutput::new())?;
        }
        Ok(writer)
    }

    /// Appends the next document. `vector_fields` lists the field numbers and
    /// their start offsets within `local`, which holds the `.tvf` bytes.
    pub fn write_document(
        &mut self,
        vector_fields: &[(u32, u64)],
        local: &MemoryOutput,
    ) -> std::io::Result<()> {
        self.index.write_long(self.documents.file_pointer() as i64)?;
        self.index.write_long(self.fields.file_pointer() as i64)?;
        self.documents.write_vint(vector_fields.len() as u32)?;
        if let Some(&(_, first)) = vector_fields.first() {
            for &(number, _) in vector_fields {
                self.documents.write_vint(number)?;
            }
            let mut last = first;
            for &(_, pointer) in &vector_fields[1..] {
                self.documents.write_vlong(pointer - last)?;
                last = pointer;
            }
            local.write_to(self.fields.as_mut())?;
        }
        Ok(())
    }

    pub fn close(mut self) -> std::io::Result<()> {
        let index = self.index.close();
        let documents = self.documents.close();
        let fields = self.fields.close();
        index.and(documents).and(fields)
    }
}

/// Starts one field's vector in a document's local `.tvf` buffer. The
/// `num_terms` sorted term entries follow.
pub fn write_field_header(
    out: &mut MemoryOutput,
    num_terms: u32,
    positions: bool,
    offsets: bool,
) -> std::io::Result<()> {
    out.write_vint(num_terms)?;
    let mut flags = VectorFlags::empty();
    flags.set(VectorFlags::STORE_POSITIONS, positions);
    flags.set(VectorFlags::STORE_OFFSETS, offsets);
    out.write_byte(flags.bits())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermVectorEntry {
    pub text: String,
    pub freq: u32,
    pub positions: Vec<u32>,
    /// `(start, end)` pairs in UTF-16 units.
    pub offsets: Vec<(u32, u32)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldTermVector {
    pub number: u32,
    pub terms: Vec<TermVectorEntry>,
}

pub struct TermVectorsReader {
    index: Box<dyn IndexInput>,
    documents: Box<dyn IndexInput>,
    fields: Box<dyn IndexInput>,
    num_docs: u32,
}

impl TermVectorsReader {
    /// Opens the vector files of `segment`, or returns `None` if the segment
    /// has none.
    pub fn open(directory: &dyn Directory, segment: &str) -> Result<Option<TermVectorsReader>> {
        let index_name = segment_file_name(segment, VECTORS_INDEX_EXTENSION);
        if !directory.file_exists(&index_name)? {
            return Ok(None);
        }
        let mut index = directory.open_input(&index_name)?;
        let mut documents =
            directory.open_input(&segment_file_name(segment, VECTORS_DOCUMENTS_EXTENSION))?;
        let mut fields =
            directory.open_input(&segment_file_name(segment, VECTORS_FIELDS_EXTENSION))?;
        for input in [&mut index, &mut documents, &mut fields] {
            let format = input.read_int()?;
            verify_data!(format, format == VECTORS_FORMAT);
        }
        let num_docs = ((index.length() - 4) / 16) as u32;
        Ok(Some(TermVectorsReader {
            index,
            documents,
            fields,
            num_docs,
        }))
    }

    pub fn num_docs(&self) -> u32 {
        self.num_docs
    }

    pub fn document(&mut self, doc: u32) -> Result<Vec<FieldTermVector>> {
        if doc >= self.num_docs {
            return Err(Error::invalid_arg("doc", format!("{doc} has no vector entry")));
        }
        self.index.seek(4 + doc as u64 * 16)?;
        let documents_pointer = self.index.read_long()? as u64;
        let fields_pointer = self.index.read_long()? as u64;

        self.documents.seek(documents_pointer)?;
        let count = self.documents.read_vint()? as usize;
        let mut numbers = Vec::with_capacity(count);
        for _ in 0..count {
            numbers.push(self.documents.read_vint()?);
        }
        let mut pointers = Vec::with_capacity(count);
        let mut pointer = fields_pointer;
        for i in 0..count {
            if i > 0 {
                pointer += self.documents.read_vlong()?;
            }
            pointers.push(pointer);
        }

        let mut result = Vec::with_capacity(count);
        for (number, pointer) in numbers.into_iter().zip(pointers) {
            self.fields.seek(pointer)?;
            result.push(FieldTermVector {
                number,
                terms: read_field(self.fields.as_mut())?,
            });
        }
        Ok(result)
    }
}

fn read_field(input: &mut dyn IndexInput) -> Result<Vec<TermVectorEntry>> {
    let num_terms = input.read_vint()?;
    let flags = VectorFlags::from_bits_truncate(input.read_byte()?);
    let mut terms = Vec::with_capacity(num_terms as usize);
    let mut text = Vec::<u16>::new();
    for _ in 0..num_terms {
        let prefix = input.read_vint()? as usize;
        let suffix = input.read_vint()? as usize;
        verify_data!(prefix, prefix <= text.len());
        text.truncate(prefix);
        input.read_chars(suffix, &mut text)?;
        let freq = input.read_vint()?;
        let mut positions = Vec::new();
        if flags.contains(VectorFlags::STORE_POSITIONS) {
            let mut position = 0u32;
            for _ in 0..freq {
                position = position.wrapping_add(input.read_vint()?);
                positions.push(position);
            }
        }
        let mut offsets = Vec::new();
        if flags.contains(VectorFlags::STORE_OFFSETS) {
            let mut last_end = 0u32;
            for _ in 0..freq {
                let start = last_end.wrapping_add(input.read_vint()?);
                let end = start.wrapping_add(input.read_vint()?);
                offsets.push((start, end));
                last_end = end;
            }
        }
        terms.push(TermVectorEntry {
            text: String::from_utf16_lossy(&text),
            freq,
            positions,
            offsets,
        });
    }
    Ok(terms)
}

#[cfg(test)]
mod tests {
    use verba_io::RamDirectory;

    use super::*;

    fn field(out: &mut MemoryOutput, terms: &[(&str, &[u32])]) {
        write_field_header(out, terms.len() as u32, true, false).unwrap();
        let mut last: Vec<u16> = Vec::new();
        for (text, positions) in terms {
            let units = text.encode_utf16().collect::<Vec<_>>();
            let prefix = units.iter().zip(&last).take_while(|(a, b)| a == b).count();
            out.write_vint(prefix as u32).unwrap();
            out.write_vint((units.len() - prefix) as u32).unwrap();
            out.write_chars(&units[prefix..]).unwrap();
            out.write_vint(positions.len() as u32).unwrap();
            let mut last_pos = 0;
            for &p in positions.iter() {
                out.write_vint(p - last_pos).unwrap();
                last_pos = p;
            }
            last = units;
        }
    }

    #[test]
    fn test_catch_up_and_read_back() {
        let dir = RamDirectory::new();
        let mut writer = TermVectorsWriter::open(&dir, "_0", 2).unwrap();
        let mut local = MemoryOutput::new();
        field(&mut local, &[("fox", &[2]), ("foxes", &[0, 5])]);
        let second = local.file_pointer();
        field(&mut local, &[("a", &[0])]);
        writer
            .write_document(&[(1, 0), (3, second)], &local)
            .unwrap();
        writer.write_document(&[], &MemoryOutput::new()).unwrap();
        writer.close().unwrap();

        let mut reader = TermVectorsReader::open(&dir, "_0").unwrap().unwrap();
        assert_eq!(reader.num_docs(), 4);
        assert!(reader.document(0).unwrap().is_empty());
        assert!(reader.document(1).unwrap().is_empty());
        assert!(reader.document(3).unwrap().is_empty());
        let vectors = reader.document(2).unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0].number, 1);
        assert_eq!(vectors[0].terms[1].text, "foxes");
        assert_eq!(vectors[0].terms[1].positions, vec![0, 5]);
        assert_eq!(vectors[1].number, 3);
        assert_eq!(vectors[1].terms[0].text, "a");
    }

    #[test]
    fn test_missing_vectors() {
        let dir = RamDirectory::new();
        assert!(TermVectorsReader::open(&dir, "_0").unwrap().is_none());
    }

    #[test]
    fn test_field_header_flags() {
        let mut out = MemoryOutput::new();
        write_field_header(&mut out, 3, true, true).unwrap();
        write_field_header(&mut out, 1, false, true).unwrap();
        write_field_header(&mut out, 0, false, false).unwrap();
        assert_eq!(out.as_bytes(), &[3, 0x03, 1, 0x02, 0, 0x00]);
    }
}
