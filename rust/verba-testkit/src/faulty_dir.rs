//! A [`Directory`] wrapper injecting I/O failures.
//!
//! Faults are keyed by file extension: creating a matching output can be made
//! to fail outright, or its writes can start failing once a byte threshold is
//! crossed.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use parking_lot::Mutex;
use verba_io::{Directory, IndexInput, IndexOutput, Lock};

#[derive(Debug, Clone)]
enum Fault {
    Create,
    WriteAfter(u64),
}

pub struct FaultyDirectory {
    inner: Arc<dyn Directory>,
    faults: Mutex<Vec<(String, Fault)>>,
    injected: Arc<AtomicU64>,
}

impl FaultyDirectory {
    pub fn new(inner: Arc<dyn Directory>) -> FaultyDirectory {
        FaultyDirectory {
            inner,
            faults: Mutex::new(Vec::new()),
            injected: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn inner(&self) -> &Arc<dyn Directory> {
        &self.inner
    }

    /// Makes `create_output` fail for files with the given extension.
    pub fn fail_create(&self, extension: &str) {
        self.faults
            .lock()
            .push((extension.to_string(), Fault::Create));
    }

    /// Makes writes fail once `bytes` bytes have been written to a file with
    /// the given extension.
    pub fn fail_writes_after(&self, extension: &str, bytes: u64) {
        self.faults
            .lock()
            .push((extension.to_string(), Fault::WriteAfter(bytes)));
    }

    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    /// Number of failures injected so far.
    pub fn num_injected(&self) -> u64 {
        self.injected.load(Ordering::Relaxed)
    }

    fn fault_for(&self, name: &str) -> Option<Fault> {
        let extension = name.rsplit_once('.').map(|(_, ext)| ext)?;
        self.faults
            .lock()
            .iter()
            .find(|(ext, _)| ext == extension)
            .map(|(_, fault)| fault.clone())
    }

    fn injected_error(&self, name: &str) -> std::io::Error {
        self.injected.fetch_add(1, Ordering::Relaxed);
        injected_error(name)
    }
}

fn injected_error(name: &str) -> std::io::Error {
    std::io::Error::other(format!("injected failure writing {name}"))
}

impl Directory for FaultyDirectory {
    fn list_all(&self) -> std::io::Result<Vec<String>> {
        self.inner.list_all()
    }

    fn file_exists(&self, name: &str) -> std::io::Result<bool> {
        self.inner.file_exists(name)
    }

    fn file_length(&self, name: &str) -> std::io::Result<u64> {
        self.inner.file_length(name)
    }

    fn delete_file(&self, name: &str) -> std::io::Result<()> {
        self.inner.delete_file(name)
    }

    fn rename_file(&self, from: &str, to: &str) -> std::io::Result<()> {
        self.inner.rename_file(from, to)
    }

    fn create_output(&self, name: &str) -> std::io::Result<Box<dyn IndexOutput>> {
        match self.fault_for(name) {
            Some(Fault::Create) => Err(self.injected_error(name)),
            Some(Fault::WriteAfter(limit)) => Ok(Box::new(FaultyOutput {
                inner: self.inner.create_output(name)?,
                name: name.to_string(),
                written: 0,
                limit,
                injected: self.injected.clone(),
            })),
            None => self.inner.create_output(name),
        }
    }

    fn open_input(&self, name: &str) -> std::io::Result<Box<dyn IndexInput>> {
        self.inner.open_input(name)
    }

    fn try_lock(&self, name: &str) -> std::io::Result<Option<Box<dyn Lock>>> {
        self.inner.try_lock(name)
    }
}

struct FaultyOutput {
    inner: Box<dyn IndexOutput>,
    name: String,
    written: u64,
    limit: u64,
    injected: Arc<AtomicU64>,
}

impl FaultyOutput {
    fn check(&mut self, len: u64) -> std::io::Result<()> {
        if self.written + len > self.limit {
            self.injected.fetch_add(1, Ordering::Relaxed);
            return Err(injected_error(&self.name));
        }
        self.written += len;
        Ok(())
    }
}

impl IndexOutput for FaultyOutput {
    fn write_byte(&mut self, b: u8) -> std::io::Result<()> {
        self.check(1)?;
        self.inner.write_byte(b)
    }

    fn write_bytes(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.check(buf.len() as u64)?;
        self.inner.write_bytes(buf)
    }

    fn file_pointer(&self) -> u64 {
        self.inner.file_pointer()
    }

    fn seek(&mut self, pos: u64) -> std::io::Result<()> {
        self.inner.seek(pos)
    }

    fn length(&self) -> u64 {
        self.inner.length()
    }

    fn close(&mut self) -> std::io::Result<()> {
        self.inner.close()
    }
}
