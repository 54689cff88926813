use crate::{IndexInput, IndexOutput};

/// A flat namespace of files holding the segments of one index.
///
/// Outputs are created fresh (an existing file of the same name is replaced);
/// inputs may be cloned to obtain independent cursors.
pub trait Directory: Send + Sync + 'static {
    /// Returns the names of all files, in no particular order.
    fn list_all(&self) -> std::io::Result<Vec<String>>;

    fn file_exists(&self, name: &str) -> std::io::Result<bool>;

    fn file_length(&self, name: &str) -> std::io::Result<u64>;

    fn delete_file(&self, name: &str) -> std::io::Result<()>;

    fn rename_file(&self, from: &str, to: &str) -> std::io::Result<()>;

    fn create_output(&self, name: &str) -> std::io::Result<Box<dyn IndexOutput>>;

    fn open_input(&self, name: &str) -> std::io::Result<Box<dyn IndexInput>>;

    /// Attempts to obtain an exclusive lock with the given name.
    ///
    /// Returns `Ok(None)` when the lock is already held.
    fn try_lock(&self, name: &str) -> std::io::Result<Option<Box<dyn Lock>>>;
}

/// A held directory lock.
pub trait Lock: Send {
    /// Releases the lock. Dropping the lock releases it as well.
    fn release(&mut self) -> std::io::Result<()>;
}
