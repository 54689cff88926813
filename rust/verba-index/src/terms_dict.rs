//! Terms dictionary: `.tis` lists every term with its postings pointers,
//! `.tii` every `index_interval`-th entry of `.tis` for seeking.

use std::cmp::Ordering;

use verba_common::{Result, verify_data};
use verba_io::{DataInput, DataOutput, Directory, IndexInput, IndexOutput};

use crate::{
    field_infos::FieldInfos,
    file_names::{TERMS_EXTENSION, TERMS_INDEX_EXTENSION, segment_file_name},
    posting_table::compare_text,
};

pub const TERMS_FORMAT: i32 = -3;

/// Field number of the empty entry starting the terms index.
pub const NO_FIELD: u32 = u32::MAX;

/// Offset of the term count within the header.
const SIZE_OFFSET: u64 = 4;

const HEADER_LENGTH: u64 = 24;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TermInfo {
    pub doc_freq: u32,
    pub freq_pointer: u64,
    pub prox_pointer: u64,
    /// Offset of the skip data relative to `freq_pointer`.
    pub skip_offset: u32,
}

struct TermsOutput {
    out: Box<dyn IndexOutput>,
    is_index: bool,
    size: u64,
    last_text: Vec<u16>,
    last_field: u32,
    last_info: TermInfo,
    last_index_pointer: u64,
}

impl TermsOutput {
    fn create(
        directory: &dyn Directory,
        name: &str,
        is_index: bool,
        index_interval: u32,
        skip_interval: u32,
        max_skip_levels: u32,
    ) -> std::io::Result<TermsOutput> {
        let mut out = directory.create_output(name)?;
        out.write_int(TERMS_FORMAT)?;
        out.write_long(0)?;
        out.write_int(index_interval as i32)?;
        out.write_int(skip_interval as i32)?;
        out.write_int(max_skip_levels as i32)?;
        Ok(TermsOutput {
            out,
            is_index,
            size: 0,
            last_text: Vec::new(),
            last_field: NO_FIELD,
            last_info: TermInfo::default(),
            last_index_pointer: 0,
        })
    }

    fn add(
        &mut self,
        field: u32,
        text: &[u16],
        info: &TermInfo,
        skip_interval: u32,
        index_pointer: u64,
    ) -> std::io::Result<()> {
        debug_assert!(info.freq_pointer >= self.last_info.freq_pointer);
        debug_assert!(info.prox_pointer >= self.last_info.prox_pointer);
        let prefix = text
            .iter()
            .zip(&self.last_text)
            .take_while(|(a, b)| a == b)
            .count();
        self.out.write_vint(prefix as u32)?;
        self.out.write_vint((text.len() - prefix) as u32)?;
        self.out.write_chars(&text[prefix..])?;
        self.out.write_vint(field)?;
        self.out.write_vint(info.doc_freq)?;
        self.out
            .write_vlong(info.freq_pointer - self.last_info.freq_pointer)?;
        self.out
            .write_vlong(info.prox_pointer - self.last_info.prox_pointer)?;
        if info.doc_freq >= skip_interval {
            self.out.write_vint(info.skip_offset)?;
        }
        if self.is_index {
            self.out.write_vlong(index_pointer - self.last_index_pointer)?;
            self.last_index_pointer = index_pointer;
        }
        self.last_text.clear();
        self.last_text.extend_from_slice(text);
        self.last_field = field;
        self.last_info = *info;
        self.size += 1;
        Ok(())
    }

    fn close(mut self) -> std::io::Result<()> {
        self.out.seek(SIZE_OFFSET)?;
        self.out.write_long(self.size as i64)?;
        self.out.close()
    }
}

/// Writes `.tis` and `.tii` for one segment. Terms must arrive sorted by
/// field name, then text.
pub struct TermInfosWriter {
    terms: TermsOutput,
    index: TermsOutput,
    index_interval: u32,
    skip_interval: u32,
}

impl TermInfosWriter {
    pub fn create(
        directory: &dyn Directory,
        segment: &str,
        index_interval: u32,
        skip_interval: u32,
        max_skip_levels: u32,
    ) -> std::io::Result<TermInfosWriter> {
        let terms = TermsOutput::create(
            directory,
            &segment_file_name(segment, TERMS_EXTENSION),
            false,
            index_interval,
            skip_interval,
            max_skip_levels,
        )?;
        let index = TermsOutput::create(
            directory,
            &segment_file_name(segment, TERMS_INDEX_EXTENSION),
            true,
            index_interval,
            skip_interval,
            max_skip_levels,
        )?;
        Ok(TermInfosWriter {
            terms,
            index,
            index_interval,
            skip_interval,
        })
    }

    pub fn num_terms(&self) -> u64 {
        self.terms.size
    }

    pub fn add(&mut self, field: u32, text: &[u16], info: &TermInfo) -> std::io::Result<()> {
        if self.terms.size % self.index_interval as u64 == 0 {
            let pointer = self.terms.out.file_pointer();
            let last_text = std::mem::take(&mut self.terms.last_text);
            let result = self.index.add(
                self.terms.last_field,
                &last_text,
                &self.terms.last_info,
                self.skip_interval,
                pointer,
            );
            self.terms.last_text = last_text;
            result?;
        }
        self.terms.add(field, text, info, self.skip_interval, 0)
    }

    pub fn close(self) -> std::io::Result<()> {
        let terms = self.terms.close();
        let index = self.index.close();
        terms.and(index)
    }
}

/// Orders `(field, text)` terms by field name, then text. [`NO_FIELD`] sorts
/// first.
pub fn compare_terms(
    field_infos: &FieldInfos,
    a: (u32, &[u16]),
    b: (u32, &[u16]),
) -> Ordering {
    let name = |number: u32| {
        (number != NO_FIELD)
            .then(|| field_infos.get(number).map(|fi| fi.name.as_str()))
            .flatten()
    };
    if a.0 != b.0 {
        match name(a.0).cmp(&name(b.0)) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    compare_text(a.1, b.1)
}

struct IndexEntry {
    field: u32,
    text: Vec<u16>,
    info: TermInfo,
    pointer: u64,
}

/// Reads a segment's terms dictionary, keeping the terms index in memory.
pub struct TermInfosReader {
    terms: Box<dyn IndexInput>,
    size: u64,
    index_interval: u32,
    skip_interval: u32,
    index: Vec<IndexEntry>,
}

fn read_header(input: &mut dyn IndexInput) -> Result<(u64, u32, u32)> {
    let format = input.read_int()?;
    verify_data!(format, format == TERMS_FORMAT);
    let size = input.read_long()?;
    verify_data!(size, size >= 0);
    let index_interval = input.read_int()?;
    let skip_interval = input.read_int()?;
    let _max_skip_levels = input.read_int()?;
    verify_data!(intervals, index_interval > 0 && skip_interval > 0);
    Ok((size as u64, index_interval as u32, skip_interval as u32))
}

impl TermInfosReader {
    pub fn open(directory: &dyn Directory, segment: &str) -> Result<TermInfosReader> {
        let mut terms = directory.open_input(&segment_file_name(segment, TERMS_EXTENSION))?;
        let (size, index_interval, skip_interval) = read_header(terms.as_mut())?;

        let mut input = directory.open_input(&segment_file_name(segment, TERMS_INDEX_EXTENSION))?;
        let (index_size, _, _) = read_header(input.as_mut())?;
        let mut cursor = TermCursor::new(skip_interval, true);
        let mut index = Vec::with_capacity(index_size as usize);
        for _ in 0..index_size {
            cursor.read_next(input.as_mut())?;
            index.push(IndexEntry {
                field: cursor.field,
                text: cursor.text.clone(),
                info: cursor.info,
                pointer: cursor.index_pointer,
            });
        }
        Ok(TermInfosReader {
            terms,
            size,
            index_interval,
            skip_interval,
            index,
        })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Enumerates all terms in order.
    pub fn terms(&self) -> Result<TermEnum> {
        let mut input = self.terms.clone_input();
        input.seek(HEADER_LENGTH)?;
        Ok(TermEnum {
            input,
            cursor: TermCursor::new(self.skip_interval, false),
            remaining: self.size,
        })
    }

    /// Looks up a term's postings pointers.
    pub fn get(
        &self,
        field_infos: &FieldInfos,
        field: u32,
        text: &[u16],
    ) -> Result<Option<TermInfo>> {
        // last index entry not greater than the target
        let upto = self.index.partition_point(|entry| {
            compare_terms(field_infos, (entry.field, &entry.text), (field, text)) != Ordering::Greater
        });
        let Some(start) = upto.checked_sub(1) else {
            return Ok(None);
        };
        let entry = &self.index[start];
        let mut input = self.terms.clone_input();
        input.seek(entry.pointer)?;
        let mut cursor = TermCursor::new(self.skip_interval, false);
        cursor.field = entry.field;
        cursor.text.clone_from(&entry.text);
        cursor.info = entry.info;
        let mut remaining = self
            .size
            .saturating_sub(start as u64 * self.index_interval as u64);
        if entry.field == field && entry.text == text {
            return Ok(Some(entry.info));
        }
        while remaining > 0 {
            cursor.read_next(input.as_mut())?;
            remaining -= 1;
            match compare_terms(field_infos, (cursor.field, &cursor.text), (field, text)) {
                Ordering::Less => continue,
                Ordering::Equal => return Ok(Some(cursor.info)),
                Ordering::Greater => return Ok(None),
            }
        }
        Ok(None)
    }
}

struct TermCursor {
    skip_interval: u32,
    is_index: bool,
    field: u32,
    text: Vec<u16>,
    info: TermInfo,
    index_pointer: u64,
}

impl TermCursor {
    fn new(skip_interval: u32, is_index: bool) -> TermCursor {
        TermCursor {
            skip_interval,
            is_index,
            field: NO_FIELD,
            text: Vec::new(),
            info: TermInfo::default(),
            index_pointer: 0,
        }
    }

    fn read_next(&mut self, input: &mut dyn IndexInput) -> Result<()> {
        let prefix = input.read_vint()? as usize;
        let suffix = input.read_vint()? as usize;
        verify_data!(prefix, prefix <= self.text.len());
        self.text.truncate(prefix);
        input.read_chars(suffix, &mut self.text)?;
        self.field = input.read_vint()?;
        self.info.doc_freq = input.read_vint()?;
        self.info.freq_pointer += input.read_vlong()?;
        self.info.prox_pointer += input.read_vlong()?;
        self.info.skip_offset = if self.info.doc_freq >= self.skip_interval {
            input.read_vint()?
        } else {
            0
        };
        if self.is_index {
            self.index_pointer += input.read_vlong()?;
        }
        Ok(())
    }
}

/// Sequential iterator over a terms dictionary.
pub struct TermEnum {
    input: Box<dyn IndexInput>,
    cursor: TermCursor,
    remaining: u64,
}

impl TermEnum {
    /// Advances to the next term. Returns `false` at the end.
    pub fn next(&mut self) -> Result<bool> {
        if self.remaining == 0 {
            return Ok(false);
        }
        self.cursor.read_next(self.input.as_mut())?;
        self.remaining -= 1;
        Ok(true)
    }

    pub fn field(&self) -> u32 {
        self.cursor.field
    }

    pub fn text(&self) -> &[u16] {
        &self.cursor.text
    }

    pub fn term_info(&self) -> &TermInfo {
        &self.cursor.info
    }
}

#[cfg(test)]
mod tests {
    use verba_io::RamDirectory;

    use super::*;
    use crate::field_infos::FieldInfoFlags;

    fn units(s: &str) -> Vec<u16> {
        s.encode_utf16().collect()
    }

    fn info(i: u64, doc_freq: u32) -> TermInfo {
        TermInfo {
            doc_freq,
            freq_pointer: i * 10,
            prox_pointer: i * 20,
            skip_offset: if doc_freq >= 2 { 7 } else { 0 },
        }
    }

    #[test]
    fn test_write_and_seek() {
        let dir = RamDirectory::new();
        let mut infos = FieldInfos::new();
        // numbered out of name order on purpose
        let title = infos.add("title", FieldInfoFlags::empty());
        let body = infos.add("body", FieldInfoFlags::empty());

        let mut terms = Vec::new();
        for i in 0..20 {
            terms.push((body, format!("b{i:02}")));
        }
        for i in 0..5 {
            terms.push((title, format!("t{i}")));
        }
        let mut writer = TermInfosWriter::create(&dir, "_0", 4, 2, 10).unwrap();
        for (i, (field, text)) in terms.iter().enumerate() {
            writer
                .add(*field, &units(text), &info(i as u64, (i % 3) as u32 + 1))
                .unwrap();
        }
        assert_eq!(writer.num_terms(), 25);
        writer.close().unwrap();

        let reader = TermInfosReader::open(&dir, "_0").unwrap();
        assert_eq!(reader.size(), 25);
        let mut all = reader.terms().unwrap();
        let mut i = 0u64;
        while all.next().unwrap() {
            let (field, text) = &terms[i as usize];
            assert_eq!(all.field(), *field);
            assert_eq!(all.text(), &units(text)[..]);
            assert_eq!(*all.term_info(), info(i, (i % 3) as u32 + 1));
            i += 1;
        }
        assert_eq!(i, 25);

        for (i, (field, text)) in terms.iter().enumerate() {
            let found = reader.get(&infos, *field, &units(text)).unwrap();
            assert_eq!(found, Some(info(i as u64, (i % 3) as u32 + 1)), "{text}");
        }
        assert_eq!(reader.get(&infos, body, &units("a")).unwrap(), None);
        assert_eq!(reader.get(&infos, body, &units("b055")).unwrap(), None);
        assert_eq!(reader.get(&infos, title, &units("zzz")).unwrap(), None);
    }

    #[test]
    fn test_header_size_is_patched() {
        let dir = RamDirectory::new();
        let mut writer = TermInfosWriter::create(&dir, "_1", 128, 16, 10).unwrap();
        writer.add(0, &units("only"), &TermInfo::default()).unwrap();
        writer.close().unwrap();
        let mut input = dir.open_input("_1.tis").unwrap();
        assert_eq!(input.read_int().unwrap(), TERMS_FORMAT);
        assert_eq!(input.read_long().unwrap(), 1);
        let mut index = dir.open_input("_1.tii").unwrap();
        index.seek(SIZE_OFFSET).unwrap();
        // the empty sentinel entry
        assert_eq!(index.read_long().unwrap(), 1);
    }
}
