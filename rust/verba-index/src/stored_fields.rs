//! Stored fields: `.fdx` holds one `.fdt` pointer per document, `.fdt` the
//! serialized field values.

use bitflags::bitflags;
use verba_common::{Result, error::Error, verify_data};
use verba_io::{DataInput, DataOutput, Directory, IndexInput, IndexOutput, MemoryOutput};

use crate::file_names::{FIELDS_EXTENSION, FIELDS_INDEX_EXTENSION, segment_file_name};

bitflags! {
    /// Per-value flags in `.fdt`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StoredFieldFlags: u8 {
        const TOKENIZED = 0x01;
        const BINARY = 0x02;
    }
}

/// A stored value as read back from a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredValue {
    Text(String),
    Binary(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredField {
    pub number: u32,
    pub tokenized: bool,
    pub value: StoredValue,
}

/// Appends one stored field to a document's local buffer.
pub fn write_text_field(
    out: &mut MemoryOutput,
    number: u32,
    tokenized: bool,
    value: &str,
) -> std::io::Result<()> {
    out.write_vint(number)?;
    let mut flags = StoredFieldFlags::empty();
    flags.set(StoredFieldFlags::TOKENIZED, tokenized);
    out.write_byte(flags.bits())?;
    out.write_string(value)
}

pub fn write_binary_field(out: &mut MemoryOutput, number: u32, value: &[u8]) -> std::io::Result<()> {
    out.write_vint(number)?;
    out.write_byte(StoredFieldFlags::BINARY.bits())?;
    out.write_vint(value.len() as u32)?;
    out.write_bytes(value)
}

/// Shared `.fdt`/`.fdx` outputs of the segment being built.
pub struct StoredFieldsWriter {
    fields: Box<dyn IndexOutput>,
    index: Box<dyn IndexOutput>,
    num_docs: u32,
}

impl StoredFieldsWriter {
    pub fn open(directory: &dyn Directory, segment: &str) -> std::io::Result<StoredFieldsWriter> {
        let fields = directory.create_output(&segment_file_name(segment, FIELDS_EXTENSION))?;
        let index = directory.create_output(&segment_file_name(segment, FIELDS_INDEX_EXTENSION))?;
        Ok(StoredFieldsWriter {
            fields,
            index,
            num_docs: 0,
        })
    }

    pub fn num_docs(&self) -> u32 {
        self.num_docs
    }

    /// Appends the next document: `num_fields` fields serialized in `local`.
    pub fn write_document(&mut self, num_fields: u32, local: &MemoryOutput) -> std::io::Result<()> {
        self.index.write_long(self.fields.file_pointer() as i64)?;
        self.fields.write_vint(num_fields)?;
        local.write_to(self.fields.as_mut())?;
        self.num_docs += 1;
        Ok(())
    }

    pub fn close(mut self) -> std::io::Result<()> {
        let fields = self.fields.close();
        let index = self.index.close();
        fields.and(index)
    }
}

/// Random access to the stored fields of a segment.
pub struct StoredFieldsReader {
    fields: Box<dyn IndexInput>,
    index: Box<dyn IndexInput>,
    num_docs: u32,
}

impl StoredFieldsReader {
    pub fn open(directory: &dyn Directory, segment: &str) -> Result<StoredFieldsReader> {
        let fields = directory.open_input(&segment_file_name(segment, FIELDS_EXTENSION))?;
        let index = directory.open_input(&segment_file_name(segment, FIELDS_INDEX_EXTENSION))?;
        verify_data!(fdx, index.length() % 8 == 0);
        let num_docs = (index.length() / 8) as u32;
        Ok(StoredFieldsReader {
            fields,
            index,
            num_docs,
        })
    }

    pub fn num_docs(&self) -> u32 {
        self.num_docs
    }

    pub fn document(&mut self, doc: u32) -> Result<Vec<StoredField>> {
        if doc >= self.num_docs {
            return Err(Error::invalid_arg(
                "doc",
                format!("{doc} is out of range (num docs {})", self.num_docs),
            ));
        }
        self.index.seek(doc as u64 * 8)?;
        let pointer = self.index.read_long()?;
        verify_data!(pointer, pointer >= 0 && (pointer as u64) <= self.fields.length());
        self.fields.seek(pointer as u64)?;
        let count = self.fields.read_vint()?;
        let mut result = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let number = self.fields.read_vint()?;
            let flags = StoredFieldFlags::from_bits_truncate(self.fields.read_byte()?);
            let value = if flags.contains(StoredFieldFlags::BINARY) {
                let len = self.fields.read_vint()? as usize;
                let mut bytes = vec![0u8; len];
                self.fields.read_bytes(&mut bytes)?;
                StoredValue::Binary(bytes)
            } else {
                StoredValue::Text(self.fields.read_string()?)
            };
            result.push(StoredField {
                number,
                tokenized: flags.contains(StoredFieldFlags::TOKENIZED),
                value,
            });
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use verba_io::RamDirectory;

    use super::*;

    #[test]
    fn test_stored_fields_round_trip() {
        let dir = RamDirectory::new();
        let mut writer = StoredFieldsWriter::open(&dir, "_0").unwrap();
        let mut local = MemoryOutput::new();
        write_text_field(&mut local, 0, true, "the quick fox").unwrap();
        write_text_field(&mut local, 1, false, "").unwrap();
        write_binary_field(&mut local, 2, &[0, 1, 2]).unwrap();
        writer.write_document(3, &local).unwrap();
        local.reset();
        writer.write_document(0, &local).unwrap();
        assert_eq!(writer.num_docs(), 2);
        writer.close().unwrap();

        let mut reader = StoredFieldsReader::open(&dir, "_0").unwrap();
        assert_eq!(reader.num_docs(), 2);
        let doc = reader.document(0).unwrap();
        assert_eq!(
            doc,
            vec![
                StoredField {
                    number: 0,
                    tokenized: true,
                    value: StoredValue::Text("the quick fox".into())
                },
                StoredField {
                    number: 1,
                    tokenized: false,
                    value: StoredValue::Text(String::new())
                },
                StoredField {
                    number: 2,
                    tokenized: false,
                    value: StoredValue::Binary(vec![0, 1, 2])
                },
            ]
        );
        assert!(reader.document(1).unwrap().is_empty());
        assert!(reader.document(2).is_err());
    }

    #[test]
    fn test_value_flag_bytes() {
        let mut local = MemoryOutput::new();
        write_text_field(&mut local, 5, true, "a").unwrap();
        write_binary_field(&mut local, 6, &[9]).unwrap();
        write_text_field(&mut local, 7, false, "").unwrap();
        assert_eq!(local.as_bytes(), &[5, 0x01, 1, b'a', 6, 0x02, 1, 9, 7, 0x00, 0]);
    }
}
