//! Storage abstractions consumed by the indexing core:
//! - `ReadAt` / `WriteAt`: positional access to a conceptual file.
//! - `IndexOutput` / `IndexInput`: sequential cursors over such files, with the
//!   primitive encodings of the segment formats layered on top (`DataOutput`,
//!   `DataInput`).
//! - `Directory`: a flat namespace of files, with an in-memory and a file-system
//!   implementation.

pub mod buffered;
pub mod data;
pub mod directory;
pub mod file;
pub mod memory;

pub use buffered::{BufferedInput, BufferedOutput};
pub use data::{DataInput, DataOutput};
pub use directory::{Directory, Lock};
pub use file::FsDirectory;
pub use memory::{MemoryOutput, RamDirectory};

/// A conceptual file that supports reading from arbitrary positions.
pub trait ReadAt: Send + Sync + 'static {
    /// Returns the size of the underlying object.
    fn size(&self) -> std::io::Result<u64>;

    /// Fills `buf` with the bytes starting at `pos`.
    ///
    /// Fails with `UnexpectedEof` if the object ends before `buf` is filled.
    fn read_at(&self, pos: u64, buf: &mut [u8]) -> std::io::Result<()>;
}

/// A conceptual file that supports writing at arbitrary positions, growing the
/// underlying storage when a write lands beyond its end.
pub trait WriteAt: Send + Sync + 'static {
    /// Writes the entire buffer at the specified position.
    fn write_at(&self, pos: u64, buf: &[u8]) -> std::io::Result<()>;

    /// Makes previously written data durable.
    fn sync(&self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Sequential writer producing one file of a segment.
///
/// The cursor may be moved back with [`seek`](IndexOutput::seek) to patch
/// previously written header fields.
pub trait IndexOutput: Send {
    fn write_byte(&mut self, b: u8) -> std::io::Result<()>;

    fn write_bytes(&mut self, buf: &[u8]) -> std::io::Result<()>;

    /// Current write position.
    fn file_pointer(&self) -> u64;

    fn seek(&mut self, pos: u64) -> std::io::Result<()>;

    /// Total number of bytes in the file, including bytes beyond the cursor.
    fn length(&self) -> u64;

    /// Flushes outstanding bytes. Further writes fail.
    fn close(&mut self) -> std::io::Result<()>;
}

/// Random-access reader over one file.
pub trait IndexInput: Send {
    fn read_byte(&mut self) -> std::io::Result<u8>;

    fn read_bytes(&mut self, buf: &mut [u8]) -> std::io::Result<()>;

    fn file_pointer(&self) -> u64;

    fn seek(&mut self, pos: u64) -> std::io::Result<()>;

    fn length(&self) -> u64;

    /// Returns an independent cursor over the same file, positioned where this one is.
    fn clone_input(&self) -> Box<dyn IndexInput>;
}

impl<T: IndexOutput + ?Sized> IndexOutput for Box<T> {
    fn write_byte(&mut self, b: u8) -> std::io::Result<()> {
        (**self).write_byte(b)
    }

    fn write_bytes(&mut self, buf: &[u8]) -> std::io::Result<()> {
        (**self).write_bytes(buf)
    }

    fn file_pointer(&self) -> u64 {
        (**self).file_pointer()
    }

    fn seek(&mut self, pos: u64) -> std::io::Result<()> {
        (**self).seek(pos)
    }

    fn length(&self) -> u64 {
        (**self).length()
    }

    fn close(&mut self) -> std::io::Result<()> {
        (**self).close()
    }
}

impl<T: IndexInput + ?Sized> IndexInput for Box<T> {
    fn read_byte(&mut self) -> std::io::Result<u8> {
        (**self).read_byte()
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        (**self).read_bytes(buf)
    }

    fn file_pointer(&self) -> u64 {
        (**self).file_pointer()
    }

    fn seek(&mut self, pos: u64) -> std::io::Result<()> {
        (**self).seek(pos)
    }

    fn length(&self) -> u64 {
        (**self).length()
    }

    fn clone_input(&self) -> Box<dyn IndexInput> {
        (**self).clone_input()
    }
}
