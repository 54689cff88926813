//! Memory-backed storage: a growable scratch output and an in-memory directory.

use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use parking_lot::{Mutex, RwLock};

use crate::{BufferedInput, BufferedOutput, Directory, IndexInput, IndexOutput, Lock, ReadAt, WriteAt};

/// In-memory file contents, shared between writers and readers.
#[derive(Default)]
pub struct RamFile {
    data: RwLock<Vec<u8>>,
}

impl RamFile {
    pub fn new() -> RamFile {
        Default::default()
    }

    pub fn from_vec(data: Vec<u8>) -> RamFile {
        RamFile {
            data: RwLock::new(data),
        }
    }

    pub fn len(&self) -> u64 {
        self.data.read().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl ReadAt for RamFile {
    fn size(&self) -> std::io::Result<u64> {
        Ok(self.len())
    }

    fn read_at(&self, pos: u64, buf: &mut [u8]) -> std::io::Result<()> {
        let data = self.data.read();
        let start = pos as usize;
        let end = start + buf.len();
        if end > data.len() {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        buf.copy_from_slice(&data[start..end]);
        Ok(())
    }
}

impl WriteAt for RamFile {
    fn write_at(&self, pos: u64, buf: &[u8]) -> std::io::Result<()> {
        let mut data = self.data.write();
        let start = pos as usize;
        let end = start + buf.len();
        if end > data.len() {
            data.resize(end, 0);
        }
        data[start..end].copy_from_slice(buf);
        Ok(())
    }
}

/// Growable in-memory output used as a per-document scratch buffer.
///
/// The accumulated bytes are later appended to a segment stream with
/// [`write_to`](MemoryOutput::write_to).
#[derive(Default)]
pub struct MemoryOutput {
    data: Vec<u8>,
    pos: usize,
}

impl MemoryOutput {
    pub fn new() -> MemoryOutput {
        Default::default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Copies the buffered bytes to `out`.
    pub fn write_to(&self, out: &mut dyn IndexOutput) -> std::io::Result<()> {
        out.write_bytes(&self.data)
    }

    /// Discards the contents, keeping the allocation.
    pub fn reset(&mut self) {
        self.data.clear();
        self.pos = 0;
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Returns a reader over a snapshot of the current contents.
    pub fn to_input(&self) -> BufferedInput<RamFile> {
        let length = self.data.len() as u64;
        BufferedInput::with_length(Arc::new(RamFile::from_vec(self.data.clone())), length)
    }
}

impl IndexOutput for MemoryOutput {
    fn write_byte(&mut self, b: u8) -> std::io::Result<()> {
        if self.pos == self.data.len() {
            self.data.push(b);
        } else {
            self.data[self.pos] = b;
        }
        self.pos += 1;
        Ok(())
    }

    fn write_bytes(&mut self, buf: &[u8]) -> std::io::Result<()> {
        let end = self.pos + buf.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[self.pos..end].copy_from_slice(buf);
        self.pos = end;
        Ok(())
    }

    fn file_pointer(&self) -> u64 {
        self.pos as u64
    }

    fn seek(&mut self, pos: u64) -> std::io::Result<()> {
        let pos = pos as usize;
        if pos > self.data.len() {
            self.data.resize(pos, 0);
        }
        self.pos = pos;
        Ok(())
    }

    fn length(&self) -> u64 {
        self.data.len() as u64
    }

    fn close(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// A [`Directory`] keeping every file in memory.
#[derive(Default)]
pub struct RamDirectory {
    files: Mutex<AHashMap<String, Arc<RamFile>>>,
    locks: Arc<Mutex<AHashSet<String>>>,
}

impl RamDirectory {
    pub fn new() -> RamDirectory {
        Default::default()
    }

    /// Total size of all files.
    pub fn size_in_bytes(&self) -> u64 {
        self.files.lock().values().map(|f| f.len()).sum()
    }

    fn get(&self, name: &str) -> std::io::Result<Arc<RamFile>> {
        self.files
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| not_found(name))
    }
}

impl Directory for RamDirectory {
    fn list_all(&self) -> std::io::Result<Vec<String>> {
        Ok(self.files.lock().keys().cloned().collect())
    }

    fn file_exists(&self, name: &str) -> std::io::Result<bool> {
        Ok(self.files.lock().contains_key(name))
    }

    fn file_length(&self, name: &str) -> std::io::Result<u64> {
        Ok(self.get(name)?.len())
    }

    fn delete_file(&self, name: &str) -> std::io::Result<()> {
        self.files
            .lock()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found(name))
    }

    fn rename_file(&self, from: &str, to: &str) -> std::io::Result<()> {
        let mut files = self.files.lock();
        let file = files.remove(from).ok_or_else(|| not_found(from))?;
        files.insert(to.to_string(), file);
        Ok(())
    }

    fn create_output(&self, name: &str) -> std::io::Result<Box<dyn IndexOutput>> {
        let file = Arc::new(RamFile::new());
        self.files.lock().insert(name.to_string(), file.clone());
        Ok(Box::new(BufferedOutput::new(file)))
    }

    fn open_input(&self, name: &str) -> std::io::Result<Box<dyn IndexInput>> {
        Ok(Box::new(BufferedInput::new(self.get(name)?)?))
    }

    fn try_lock(&self, name: &str) -> std::io::Result<Option<Box<dyn Lock>>> {
        if !self.locks.lock().insert(name.to_string()) {
            return Ok(None);
        }
        Ok(Some(Box::new(RamLock {
            name: Some(name.to_string()),
            locks: self.locks.clone(),
        })))
    }
}

struct RamLock {
    name: Option<String>,
    locks: Arc<Mutex<AHashSet<String>>>,
}

impl Lock for RamLock {
    fn release(&mut self) -> std::io::Result<()> {
        if let Some(name) = self.name.take() {
            self.locks.lock().remove(&name);
        }
        Ok(())
    }
}

impl Drop for RamLock {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

fn not_found(name: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::NotFound, format!("file not found: {name}"))
}

#[cfg(test)]
mod tests {
    use crate::{DataInput, DataOutput, Directory, IndexInput, IndexOutput};

    use super::{MemoryOutput, RamDirectory};

    #[test]
    fn test_ram_directory_files() {
        let dir = RamDirectory::new();
        let mut out = dir.create_output("_0.tis").unwrap();
        out.write_int(-3).unwrap();
        out.write_long(0).unwrap();
        for i in 0..10_000u32 {
            out.write_vint(i).unwrap();
        }
        let end = out.file_pointer();
        out.seek(4).unwrap();
        out.write_long(10_000).unwrap();
        assert_eq!(out.length(), end);
        out.close().unwrap();

        assert!(dir.file_exists("_0.tis").unwrap());
        assert_eq!(dir.file_length("_0.tis").unwrap(), end);

        let mut input = dir.open_input("_0.tis").unwrap();
        assert_eq!(input.read_int().unwrap(), -3);
        assert_eq!(input.read_long().unwrap(), 10_000);
        let mut clone = input.clone_input();
        for i in 0..10_000u32 {
            assert_eq!(input.read_vint().unwrap(), i);
        }
        assert_eq!(clone.read_vint().unwrap(), 0);
        assert!(input.read_byte().is_err());

        dir.rename_file("_0.tis", "_1.tis").unwrap();
        assert!(!dir.file_exists("_0.tis").unwrap());
        dir.delete_file("_1.tis").unwrap();
        assert!(dir.list_all().unwrap().is_empty());
        assert!(dir.delete_file("_1.tis").is_err());
    }

    #[test]
    fn test_ram_lock() {
        let dir = RamDirectory::new();
        let mut lock = dir.try_lock("write.lock").unwrap().expect("lock");
        assert!(dir.try_lock("write.lock").unwrap().is_none());
        lock.release().unwrap();
        let lock = dir.try_lock("write.lock").unwrap();
        assert!(lock.is_some());
        drop(lock);
        assert!(dir.try_lock("write.lock").unwrap().is_some());
    }

    #[test]
    fn test_memory_output_write_to() {
        let mut scratch = MemoryOutput::new();
        scratch.write_vint(300).unwrap();
        scratch.write_string("body").unwrap();

        let dir = RamDirectory::new();
        let mut out = dir.create_output("_0.fdt").unwrap();
        out.write_byte(7).unwrap();
        scratch.write_to(&mut out).unwrap();
        out.close().unwrap();
        scratch.reset();
        assert_eq!(scratch.file_pointer(), 0);

        let mut input = dir.open_input("_0.fdt").unwrap();
        assert_eq!(input.read_byte().unwrap(), 7);
        assert_eq!(input.read_vint().unwrap(), 300);
        assert_eq!(input.read_string().unwrap(), "body");
    }
}
