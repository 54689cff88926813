//! Multi-level skip data appended to each term's `.frq` entries.

use verba_io::{DataOutput, IndexOutput, MemoryOutput};

/// Number of skip levels for a posting list of `num_docs` documents:
/// `floor(log_interval(num_docs))`, capped at `max_levels`.
pub fn num_skip_levels(skip_interval: u32, max_levels: u32, num_docs: u32) -> usize {
    let mut levels = 0;
    let mut n = num_docs;
    while n >= skip_interval && skip_interval > 1 {
        n /= skip_interval;
        levels += 1;
    }
    levels.min(max_levels) as usize
}

struct Level {
    buffer: MemoryOutput,
    last_doc: u32,
    last_payload_length: i32,
    last_freq_pointer: u64,
    last_prox_pointer: u64,
}

/// Buffers skip entries for one term and appends them to `.frq` once the term
/// is complete.
pub struct SkipListWriter {
    skip_interval: u32,
    levels: Vec<Level>,
    cur_doc: u32,
    cur_store_payloads: bool,
    cur_payload_length: i32,
    cur_freq_pointer: u64,
    cur_prox_pointer: u64,
}

impl SkipListWriter {
    pub fn new(skip_interval: u32, max_levels: u32, num_docs: u32) -> SkipListWriter {
        let levels = (0..num_skip_levels(skip_interval, max_levels, num_docs))
            .map(|_| Level {
                buffer: MemoryOutput::new(),
                last_doc: 0,
                last_payload_length: -1,
                last_freq_pointer: 0,
                last_prox_pointer: 0,
            })
            .collect();
        SkipListWriter {
            skip_interval,
            levels,
            cur_doc: 0,
            cur_store_payloads: false,
            cur_payload_length: -1,
            cur_freq_pointer: 0,
            cur_prox_pointer: 0,
        }
    }

    #[cfg(test)]
    fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// Starts a new term whose postings begin at the given file pointers.
    pub fn reset(&mut self, freq_pointer: u64, prox_pointer: u64) {
        for level in &mut self.levels {
            level.buffer.reset();
            level.last_doc = 0;
            level.last_payload_length = -1;
            level.last_freq_pointer = freq_pointer;
            level.last_prox_pointer = prox_pointer;
        }
    }

    /// Records the state at the upcoming skip point.
    pub fn set_skip_data(
        &mut self,
        doc: u32,
        store_payloads: bool,
        payload_length: i32,
        freq_pointer: u64,
        prox_pointer: u64,
    ) {
        self.cur_doc = doc;
        self.cur_store_payloads = store_payloads;
        self.cur_payload_length = payload_length;
        self.cur_freq_pointer = freq_pointer;
        self.cur_prox_pointer = prox_pointer;
    }

    /// Buffers a skip entry on every level that `df` reaches.
    pub fn buffer_skip(&mut self, df: u32) -> std::io::Result<()> {
        let mut num_levels = 0;
        let mut df = df;
        while df % self.skip_interval == 0 && num_levels < self.levels.len() {
            num_levels += 1;
            df /= self.skip_interval;
        }
        let mut child_pointer = 0u64;
        for level in 0..num_levels {
            self.write_skip_data(level)?;
            let buffer = &mut self.levels[level].buffer;
            let new_child_pointer = buffer.file_pointer();
            if level != 0 {
                buffer.write_vlong(child_pointer)?;
            }
            child_pointer = new_child_pointer;
        }
        Ok(())
    }

    fn write_skip_data(&mut self, level: usize) -> std::io::Result<()> {
        let entry = &mut self.levels[level];
        let delta = self.cur_doc - entry.last_doc;
        if self.cur_store_payloads {
            if self.cur_payload_length == entry.last_payload_length {
                entry.buffer.write_vint(delta * 2)?;
            } else {
                entry.buffer.write_vint(delta * 2 + 1)?;
                entry.buffer.write_vint(self.cur_payload_length as u32)?;
                entry.last_payload_length = self.cur_payload_length;
            }
        } else {
            entry.buffer.write_vint(delta)?;
        }
        entry
            .buffer
            .write_vint((self.cur_freq_pointer - entry.last_freq_pointer) as u32)?;
        entry
            .buffer
            .write_vint((self.cur_prox_pointer - entry.last_prox_pointer) as u32)?;
        entry.last_doc = self.cur_doc;
        entry.last_freq_pointer = self.cur_freq_pointer;
        entry.last_prox_pointer = self.cur_prox_pointer;
        Ok(())
    }

    /// Appends the buffered levels to `out`, highest first, and returns the
    /// pointer where the skip data starts.
    pub fn write_skip(&self, out: &mut dyn IndexOutput) -> std::io::Result<u64> {
        let skip_pointer = out.file_pointer();
        let Some((first, upper)) = self.levels.split_first() else {
            return Ok(skip_pointer);
        };
        for level in upper.iter().rev() {
            let length = level.buffer.file_pointer();
            if length > 0 {
                out.write_vlong(length)?;
                level.buffer.write_to(out)?;
            }
        }
        first.buffer.write_to(out)?;
        Ok(skip_pointer)
    }
}

#[cfg(test)]
mod tests {
    use verba_io::{DataInput, IndexInput};

    use super::*;

    #[test]
    fn test_num_skip_levels() {
        assert_eq!(num_skip_levels(16, 10, 0), 0);
        assert_eq!(num_skip_levels(16, 10, 15), 0);
        assert_eq!(num_skip_levels(16, 10, 16), 1);
        assert_eq!(num_skip_levels(16, 10, 255), 1);
        assert_eq!(num_skip_levels(16, 10, 256), 2);
        assert_eq!(num_skip_levels(2, 3, 1 << 20), 3);
    }

    #[test]
    fn test_single_level_entries() {
        let mut writer = SkipListWriter::new(4, 10, 10);
        assert_eq!(writer.num_levels(), 1);
        writer.reset(100, 200);
        writer.set_skip_data(7, false, -1, 110, 230);
        writer.buffer_skip(4).unwrap();
        writer.set_skip_data(9, false, -1, 115, 240);
        writer.buffer_skip(8).unwrap();

        let mut out = MemoryOutput::new();
        out.write_byte(0xAA).unwrap();
        assert_eq!(writer.write_skip(&mut out).unwrap(), 1);
        assert_eq!(&out.as_bytes()[1..], &[7, 10, 30, 2, 5, 10]);
    }

    #[test]
    fn test_two_levels_with_payloads() {
        let mut writer = SkipListWriter::new(2, 10, 4);
        assert_eq!(writer.num_levels(), 2);
        writer.reset(0, 0);
        writer.set_skip_data(1, true, 3, 2, 4);
        writer.buffer_skip(2).unwrap();
        writer.set_skip_data(3, true, 3, 5, 9);
        writer.buffer_skip(4).unwrap();

        let mut out = MemoryOutput::new();
        writer.write_skip(&mut out).unwrap();
        let mut input = out.to_input();
        // level 1: one entry (doc 3, new payload length) plus the level 0 child pointer
        assert_eq!(input.read_vlong().unwrap(), 5);
        assert_eq!(input.read_vint().unwrap(), 3 * 2 + 1);
        assert_eq!(input.read_vint().unwrap(), 3);
        assert_eq!(input.read_vint().unwrap(), 5);
        assert_eq!(input.read_vint().unwrap(), 9);
        assert_eq!(input.read_vlong().unwrap(), 7);
        // level 0: two entries, the second reusing the payload length
        assert_eq!(input.read_vint().unwrap(), 1 * 2 + 1);
        assert_eq!(input.read_vint().unwrap(), 3);
        assert_eq!(input.read_vint().unwrap(), 2);
        assert_eq!(input.read_vint().unwrap(), 4);
        assert_eq!(input.read_vint().unwrap(), 2 * 2);
        assert_eq!(input.read_vint().unwrap(), 3);
        assert_eq!(input.read_vint().unwrap(), 5);
        assert_eq!(input.file_pointer(), input.length());
    }
}
