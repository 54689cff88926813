//! Buffered sequential cursors over positional storage.

use std::sync::Arc;

use crate::{IndexInput, IndexOutput, ReadAt, WriteAt};

pub const DEFAULT_BUFFER_SIZE: usize = 16 * 1024;

/// Sequential writer accumulating bytes in a buffer and spilling them to a
/// [`WriteAt`] sink at the buffer's starting position.
pub struct BufferedOutput<W: WriteAt> {
    sink: Arc<W>,
    buffer: Vec<u8>,
    buffer_start: u64,
    length: u64,
    closed: bool,
}

impl<W: WriteAt> BufferedOutput<W> {
    pub fn new(sink: Arc<W>) -> BufferedOutput<W> {
        BufferedOutput {
            sink,
            buffer: Vec::with_capacity(DEFAULT_BUFFER_SIZE),
            buffer_start: 0,
            length: 0,
            closed: false,
        }
    }

    fn flush_buffer(&mut self) -> std::io::Result<()> {
        if !self.buffer.is_empty() {
            self.sink.write_at(self.buffer_start, &self.buffer)?;
            self.buffer_start += self.buffer.len() as u64;
            self.buffer.clear();
        }
        Ok(())
    }

    fn check_open(&self) -> std::io::Result<()> {
        if self.closed {
            Err(std::io::Error::other("output is closed"))
        } else {
            Ok(())
        }
    }
}

impl<W: WriteAt> IndexOutput for BufferedOutput<W> {
    fn write_byte(&mut self, b: u8) -> std::io::Result<()> {
        self.check_open()?;
        if self.buffer.len() == DEFAULT_BUFFER_SIZE {
            self.flush_buffer()?;
        }
        self.buffer.push(b);
        Ok(())
    }

    fn write_bytes(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.check_open()?;
        if self.buffer.len() + buf.len() > DEFAULT_BUFFER_SIZE {
            self.flush_buffer()?;
            if buf.len() >= DEFAULT_BUFFER_SIZE {
                self.sink.write_at(self.buffer_start, buf)?;
                self.buffer_start += buf.len() as u64;
                return Ok(());
            }
        }
        self.buffer.extend_from_slice(buf);
        Ok(())
    }

    fn file_pointer(&self) -> u64 {
        self.buffer_start + self.buffer.len() as u64
    }

    fn seek(&mut self, pos: u64) -> std::io::Result<()> {
        self.check_open()?;
        self.length = self.length.max(self.file_pointer());
        self.flush_buffer()?;
        self.buffer_start = pos;
        Ok(())
    }

    fn length(&self) -> u64 {
        self.length.max(self.file_pointer())
    }

    fn close(&mut self) -> std::io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.length = self.length();
        self.flush_buffer()?;
        self.closed = true;
        self.sink.sync()
    }
}

/// Sequential reader over a [`ReadAt`] source, refilling an internal buffer on demand.
pub struct BufferedInput<R: ReadAt> {
    source: Arc<R>,
    length: u64,
    buffer: Vec<u8>,
    buffer_start: u64,
    buffer_pos: usize,
}

impl<R: ReadAt> BufferedInput<R> {
    pub fn new(source: Arc<R>) -> std::io::Result<BufferedInput<R>> {
        let length = source.size()?;
        Ok(Self::with_length(source, length))
    }

    /// Creates a reader over the first `length` bytes of `source`.
    pub fn with_length(source: Arc<R>, length: u64) -> BufferedInput<R> {
        BufferedInput {
            source,
            length,
            buffer: Vec::new(),
            buffer_start: 0,
            buffer_pos: 0,
        }
    }

    fn refill(&mut self) -> std::io::Result<()> {
        let start = self.buffer_start + self.buffer_pos as u64;
        if start >= self.length {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        let len = (self.length - start).min(DEFAULT_BUFFER_SIZE as u64) as usize;
        self.buffer.resize(len, 0);
        self.source.read_at(start, &mut self.buffer)?;
        self.buffer_start = start;
        self.buffer_pos = 0;
        Ok(())
    }
}

impl<R: ReadAt> IndexInput for BufferedInput<R> {
    fn read_byte(&mut self) -> std::io::Result<u8> {
        if self.buffer_pos >= self.buffer.len() {
            self.refill()?;
        }
        let b = self.buffer[self.buffer_pos];
        self.buffer_pos += 1;
        Ok(b)
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        let available = self.buffer.len().saturating_sub(self.buffer_pos);
        if buf.len() <= available {
            buf.copy_from_slice(&self.buffer[self.buffer_pos..self.buffer_pos + buf.len()]);
            self.buffer_pos += buf.len();
            return Ok(());
        }
        let (head, tail) = buf.split_at_mut(available);
        head.copy_from_slice(&self.buffer[self.buffer_pos..]);
        self.buffer_pos += available;
        if tail.len() < DEFAULT_BUFFER_SIZE {
            self.refill()?;
            if tail.len() > self.buffer.len() {
                return Err(std::io::ErrorKind::UnexpectedEof.into());
            }
            tail.copy_from_slice(&self.buffer[..tail.len()]);
            self.buffer_pos = tail.len();
        } else {
            let pos = self.file_pointer();
            if pos + tail.len() as u64 > self.length {
                return Err(std::io::ErrorKind::UnexpectedEof.into());
            }
            self.source.read_at(pos, tail)?;
            self.buffer.clear();
            self.buffer_start = pos + tail.len() as u64;
            self.buffer_pos = 0;
        }
        Ok(())
    }

    fn file_pointer(&self) -> u64 {
        self.buffer_start + self.buffer_pos as u64
    }

    fn seek(&mut self, pos: u64) -> std::io::Result<()> {
        if pos >= self.buffer_start && pos < self.buffer_start + self.buffer.len() as u64 {
            self.buffer_pos = (pos - self.buffer_start) as usize;
        } else {
            self.buffer.clear();
            self.buffer_start = pos;
            self.buffer_pos = 0;
        }
        Ok(())
    }

    fn length(&self) -> u64 {
        self.length
    }

    fn clone_input(&self) -> Box<dyn IndexInput> {
        Box::new(BufferedInput {
            source: self.source.clone(),
            length: self.length,
            buffer: self.buffer.clone(),
            buffer_start: self.buffer_start,
            buffer_pos: self.buffer_pos,
        })
    }
}
