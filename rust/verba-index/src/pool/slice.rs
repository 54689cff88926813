use verba_io::IndexOutput;

use super::{
    BYTE_BLOCK_SIZE, ByteBlockPool, LEVEL_SIZES, NEXT_LEVEL, block_pool::split_byte_address,
};

/// Appends to a slice stream, continuing into a larger slice whenever the
/// write position reaches a slice's marker byte.
pub struct SliceWriter<'a> {
    pool: &'a mut ByteBlockPool,
    upto: u32,
}

impl<'a> SliceWriter<'a> {
    /// Resumes writing at global address `upto`.
    pub fn new(pool: &'a mut ByteBlockPool, upto: u32) -> SliceWriter<'a> {
        SliceWriter { pool, upto }
    }

    /// Address of the next byte to be written.
    pub fn address(&self) -> u32 {
        self.upto
    }

    pub fn write_byte(&mut self, b: u8) {
        if self.pool.byte_at(self.upto) != 0 {
            self.upto = self.pool.alloc_slice(self.upto);
        }
        self.pool.set_byte(self.upto, b);
        self.upto += 1;
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.write_byte(b);
        }
    }

    pub fn write_vint(&mut self, mut value: u32) {
        while value & !0x7F != 0 {
            self.write_byte(((value & 0x7F) | 0x80) as u8);
            value >>= 7;
        }
        self.write_byte(value as u8);
    }
}

/// Sequential reader over one slice stream, from its start address up to
/// (excluding) its end address.
pub struct ByteSliceReader<'a> {
    pool: &'a ByteBlockPool,
    buffer: usize,
    buffer_offset: u32,
    upto: usize,
    limit: usize,
    level: usize,
    end_index: u32,
}

impl<'a> ByteSliceReader<'a> {
    pub fn new(pool: &'a ByteBlockPool, start_index: u32, end_index: u32) -> ByteSliceReader<'a> {
        debug_assert!(end_index >= start_index);
        let (buffer, upto) = split_byte_address(start_index);
        let buffer_offset = (buffer * BYTE_BLOCK_SIZE) as u32;
        let first_size = LEVEL_SIZES[0] as u32;
        let limit = if start_index + first_size >= end_index {
            (end_index - buffer_offset) as usize
        } else {
            upto + first_size as usize - 4
        };
        ByteSliceReader {
            pool,
            buffer,
            buffer_offset,
            upto,
            limit,
            level: 0,
            end_index,
        }
    }

    pub fn eof(&self) -> bool {
        self.upto as u32 + self.buffer_offset == self.end_index
    }

    pub fn read_byte(&mut self) -> u8 {
        debug_assert!(!self.eof());
        if self.upto == self.limit {
            self.next_slice();
        }
        let b = self.pool.buffers[self.buffer][self.upto];
        self.upto += 1;
        b
    }

    pub fn read_vint(&mut self) -> u32 {
        let mut b = self.read_byte();
        let mut value = (b & 0x7F) as u32;
        let mut shift = 7;
        while b & 0x80 != 0 {
            b = self.read_byte();
            value |= ((b & 0x7F) as u32) << shift;
            shift += 7;
        }
        value
    }

    pub fn read_bytes(&mut self, out: &mut [u8]) {
        for b in out.iter_mut() {
            *b = self.read_byte();
        }
    }

    /// Copies the remainder of the stream to `out`.
    pub fn write_to(&mut self, out: &mut dyn IndexOutput) -> std::io::Result<()> {
        loop {
            let buffer = &self.pool.buffers[self.buffer];
            out.write_bytes(&buffer[self.upto..self.limit])?;
            if self.limit as u32 + self.buffer_offset == self.end_index {
                self.upto = self.limit;
                return Ok(());
            }
            self.next_slice();
        }
    }

    fn next_slice(&mut self) {
        let buffer = &self.pool.buffers[self.buffer];
        let mut forward = [0u8; 4];
        forward.copy_from_slice(&buffer[self.limit..self.limit + 4]);
        let next_index = u32::from_be_bytes(forward);

        self.level = NEXT_LEVEL[self.level];
        let new_size = LEVEL_SIZES[self.level];

        let (buffer, upto) = split_byte_address(next_index);
        self.buffer = buffer;
        self.buffer_offset = (buffer * BYTE_BLOCK_SIZE) as u32;
        self.upto = upto;
        self.limit = if next_index + new_size as u32 >= self.end_index {
            (self.end_index - self.buffer_offset) as usize
        } else {
            upto + new_size - 4
        };
    }
}
