//! Registry of field names, numbers and indexing flags (`.fnm`).

use ahash::AHashMap;
use bitflags::bitflags;
use verba_common::{Result, error::Error};
use verba_io::{DataInput, DataOutput, IndexInput, IndexOutput};

bitflags! {
    /// Indexing options of a field, as written to `.fnm`.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct FieldInfoFlags: u8 {
        const IS_INDEXED = 0x01;
        const STORE_TERM_VECTOR = 0x02;
        const STORE_POSITIONS_WITH_TERM_VECTOR = 0x04;
        const STORE_OFFSETS_WITH_TERM_VECTOR = 0x08;
        const OMIT_NORMS = 0x10;
        const STORE_PAYLOADS = 0x20;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: String,
    pub number: u32,
    pub flags: FieldInfoFlags,
}

impl FieldInfo {
    pub fn is_indexed(&self) -> bool {
        self.flags.contains(FieldInfoFlags::IS_INDEXED)
    }

    pub fn store_term_vector(&self) -> bool {
        self.flags.contains(FieldInfoFlags::STORE_TERM_VECTOR)
    }

    pub fn omit_norms(&self) -> bool {
        self.flags.contains(FieldInfoFlags::OMIT_NORMS)
    }

    pub fn store_payloads(&self) -> bool {
        self.flags.contains(FieldInfoFlags::STORE_PAYLOADS)
    }

    /// Returns `true` if a norm byte is recorded for this field.
    pub fn has_norms(&self) -> bool {
        self.is_indexed() && !self.omit_norms()
    }
}

/// Append-only table of fields; numbers are assigned in order of first appearance.
#[derive(Debug, Clone, Default)]
pub struct FieldInfos {
    by_number: Vec<FieldInfo>,
    by_name: AHashMap<String, u32>,
}

impl FieldInfos {
    pub fn new() -> FieldInfos {
        Default::default()
    }

    pub fn len(&self) -> usize {
        self.by_number.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_number.is_empty()
    }

    pub fn get(&self, number: u32) -> Option<&FieldInfo> {
        self.by_number.get(number as usize)
    }

    pub fn by_name(&self, name: &str) -> Option<&FieldInfo> {
        self.by_name.get(name).map(|&n| &self.by_number[n as usize])
    }

    pub fn number(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldInfo> {
        self.by_number.iter()
    }

    /// Returns `true` if any field records norms.
    pub fn has_norms(&self) -> bool {
        self.by_number.iter().any(FieldInfo::has_norms)
    }

    pub fn has_vectors(&self) -> bool {
        self.by_number.iter().any(FieldInfo::store_term_vector)
    }

    /// Registers a field occurrence, returning the field's number.
    ///
    /// Capabilities are sticky: once any occurrence is indexed, vectorized or
    /// carries payloads, the field keeps that flag. Norms are omitted only while
    /// every occurrence omits them.
    pub fn add(&mut self, name: &str, flags: FieldInfoFlags) -> u32 {
        if let Some(&number) = self.by_name.get(name) {
            let fi = &mut self.by_number[number as usize];
            let omit_norms = fi.omit_norms() && flags.contains(FieldInfoFlags::OMIT_NORMS);
            fi.flags |= flags;
            fi.flags.set(FieldInfoFlags::OMIT_NORMS, omit_norms);
            return number;
        }
        let number = self.by_number.len() as u32;
        self.by_number.push(FieldInfo {
            name: name.to_string(),
            number,
            flags,
        });
        self.by_name.insert(name.to_string(), number);
        number
    }

    pub fn set_store_payloads(&mut self, number: u32) {
        if let Some(fi) = self.by_number.get_mut(number as usize) {
            fi.flags.insert(FieldInfoFlags::STORE_PAYLOADS);
        }
    }

    pub fn write(&self, out: &mut dyn IndexOutput) -> std::io::Result<()> {
        out.write_vint(self.by_number.len() as u32)?;
        for fi in &self.by_number {
            out.write_string(&fi.name)?;
            out.write_byte(fi.flags.bits())?;
        }
        Ok(())
    }

    pub fn read(input: &mut dyn IndexInput) -> Result<FieldInfos> {
        let count = input.read_vint()?;
        let mut infos = FieldInfos::new();
        for number in 0..count {
            let name = input.read_string()?;
            let bits = input.read_byte()?;
            if infos.by_name.contains_key(&name) {
                return Err(Error::invalid_format(
                    "fnm",
                    format!("duplicate field name '{name}'"),
                ));
            }
            infos.by_name.insert(name.clone(), number);
            infos.by_number.push(FieldInfo {
                name,
                number,
                flags: FieldInfoFlags::from_bits_truncate(bits),
            });
        }
        Ok(infos)
    }
}

#[cfg(test)]
mod tests {
    use verba_io::{IndexOutput, MemoryOutput};

    use super::*;

    #[test]
    fn test_add_merges_flags() {
        let mut infos = FieldInfos::new();
        let body = infos.add("body", FieldInfoFlags::IS_INDEXED | FieldInfoFlags::OMIT_NORMS);
        let id = infos.add("id", FieldInfoFlags::empty());
        assert_eq!((body, id), (0, 1));
        assert!(infos.get(0).unwrap().omit_norms());

        let again = infos.add(
            "body",
            FieldInfoFlags::IS_INDEXED | FieldInfoFlags::STORE_TERM_VECTOR,
        );
        assert_eq!(again, 0);
        let fi = infos.by_name("body").unwrap();
        assert!(fi.store_term_vector());
        assert!(!fi.omit_norms());
        assert!(fi.has_norms());
        assert!(!infos.by_name("id").unwrap().has_norms());
    }

    #[test]
    fn test_fnm_layout() {
        let mut infos = FieldInfos::new();
        infos.add(
            "a",
            FieldInfoFlags::IS_INDEXED
                | FieldInfoFlags::STORE_TERM_VECTOR
                | FieldInfoFlags::STORE_OFFSETS_WITH_TERM_VECTOR,
        );
        infos.add("b", FieldInfoFlags::empty());
        infos.set_store_payloads(0);

        let mut out = MemoryOutput::new();
        infos.write(&mut out).unwrap();
        assert_eq!(out.as_bytes(), &[2, 1, b'a', 0x01 | 0x02 | 0x08 | 0x20, 1, b'b', 0]);
        assert_eq!(out.file_pointer(), 7);

        let read = FieldInfos::read(&mut out.to_input()).unwrap();
        assert_eq!(read.get(0), infos.get(0));
        assert!(read.get(0).unwrap().store_payloads());
        assert_eq!(read.number("b"), Some(1));
    }
}
