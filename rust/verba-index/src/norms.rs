//! Norms: one byte per document and indexed field, encoding the field's
//! boost times its length normalization as a small float.

use verba_io::{Directory, IndexInput, IndexOutput};

use crate::{
    field_infos::FieldInfos,
    file_names::{NORMS_EXTENSION, segment_file_name},
};

/// Leading bytes of every norms file.
pub const NORMS_HEADER: [u8; 4] = [b'N', b'R', b'M', 0xFF];

/// Encoding of `1.0`, used for documents that did not record a norm.
pub const DEFAULT_NORM: u8 = 124;

/// Encodes `f` with a 3-bit mantissa and a 5-bit exponent (zero point 15).
/// Values too small for the format round to the smallest positive byte.
pub fn encode_norm(f: f32) -> u8 {
    let bits = f.to_bits() as i32;
    let small = bits >> 21;
    let base = (63 - 15) << 3;
    if small < base {
        return if bits <= 0 { 0 } else { 1 };
    }
    if small >= base + 0x100 {
        return 0xFF;
    }
    (small - base) as u8
}

pub fn decode_norm(b: u8) -> f32 {
    if b == 0 {
        return 0.0;
    }
    let bits = ((b as u32) << 21) + ((63 - 15) << 24);
    f32::from_bits(bits)
}

/// Norm bytes of one field for the documents buffered so far.
#[derive(Default)]
pub struct BufferedNorms {
    bytes: Vec<u8>,
}

impl BufferedNorms {
    pub fn new() -> BufferedNorms {
        Self::default()
    }

    /// Number of documents covered.
    pub fn len(&self) -> u32 {
        self.bytes.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Pads with the default norm up to (excluding) `doc_id`.
    pub fn fill(&mut self, doc_id: u32) {
        if self.len() < doc_id {
            self.bytes.resize(doc_id as usize, DEFAULT_NORM);
        }
    }

    pub fn add(&mut self, norm: u8) {
        self.bytes.push(norm);
    }

    pub fn write_to(&self, out: &mut dyn IndexOutput) -> std::io::Result<()> {
        out.write_bytes(&self.bytes)
    }

    pub fn reset(&mut self) {
        self.bytes.clear();
    }
}

/// Writes `<segment>.nrm`: the header, then `num_docs` bytes for every field
/// with norms, in field number order.
pub fn write_norms(
    directory: &dyn Directory,
    segment: &str,
    field_infos: &FieldInfos,
    norms: &mut [Option<BufferedNorms>],
    num_docs: u32,
) -> std::io::Result<String> {
    let name = segment_file_name(segment, NORMS_EXTENSION);
    let mut out = directory.create_output(&name)?;
    out.write_bytes(&NORMS_HEADER)?;
    let mut padding = Vec::new();
    for fi in field_infos.iter().filter(|fi| fi.has_norms()) {
        let written = match norms.get_mut(fi.number as usize).and_then(Option::as_mut) {
            Some(buffered) => {
                buffered.write_to(out.as_mut())?;
                let len = buffered.len();
                buffered.reset();
                len
            }
            None => 0,
        };
        if written < num_docs {
            padding.clear();
            padding.resize((num_docs - written) as usize, DEFAULT_NORM);
            out.write_bytes(&padding)?;
        }
    }
    out.close()?;
    log::debug!("wrote norms of segment {segment} for {num_docs} docs");
    Ok(name)
}

/// Reads the norms of the field `number` from `<segment>.nrm`.
pub fn read_norms(
    input: &mut dyn IndexInput,
    field_infos: &FieldInfos,
    number: u32,
    num_docs: u32,
) -> std::io::Result<Option<Vec<u8>>> {
    let mut offset = NORMS_HEADER.len() as u64;
    for fi in field_infos.iter().filter(|fi| fi.has_norms()) {
        if fi.number == number {
            input.seek(offset)?;
            let mut bytes = vec![0u8; num_docs as usize];
            input.read_bytes(&mut bytes)?;
            return Ok(Some(bytes));
        }
        offset += num_docs as u64;
    }
    Ok(None)
}

/// Checks the norms file header.
pub fn check_header(input: &mut dyn IndexInput) -> std::io::Result<bool> {
    let mut header = [0u8; 4];
    input.seek(0)?;
    input.read_bytes(&mut header)?;
    Ok(header == NORMS_HEADER)
}

#[cfg(test)]
mod tests {
    use verba_io::RamDirectory;

    use super::*;
    use crate::field_infos::FieldInfoFlags;

    #[test]
    fn test_encode_norm() {
        assert_eq!(encode_norm(1.0), DEFAULT_NORM);
        assert_eq!(encode_norm(0.0), 0);
        assert_eq!(encode_norm(-1.0), 0);
        assert_eq!(encode_norm(1e-20), 1);
        assert_eq!(encode_norm(f32::MAX), 0xFF);
        assert_eq!(decode_norm(DEFAULT_NORM), 1.0);
        assert_eq!(decode_norm(encode_norm(0.5)), 0.5);
        // three mantissa bits: 1/sqrt(3) truncates to 0.5625
        assert_eq!(decode_norm(encode_norm(1.0 / 3f32.sqrt())), 0.5625);
    }

    #[test]
    fn test_write_norms_fills_missing_docs() {
        let dir = RamDirectory::new();
        let mut infos = FieldInfos::new();
        let indexed = FieldInfoFlags::IS_INDEXED;
        let a = infos.add("a", indexed);
        infos.add("b", indexed | FieldInfoFlags::OMIT_NORMS);
        let c = infos.add("c", indexed);
        let mut norms = (0..3).map(|_| None).collect::<Vec<Option<BufferedNorms>>>();
        let mut buffered = BufferedNorms::new();
        buffered.fill(1);
        buffered.add(encode_norm(0.5));
        buffered.fill(1);
        assert_eq!(buffered.len(), 2);
        norms[a as usize] = Some(buffered);

        write_norms(&dir, "_0", &infos, &mut norms, 3).unwrap();
        let mut input = dir.open_input("_0.nrm").unwrap();
        assert_eq!(input.length(), 4 + 3 + 3);
        assert!(check_header(input.as_mut()).unwrap());
        let half = encode_norm(0.5);
        assert_eq!(
            read_norms(input.as_mut(), &infos, a, 3).unwrap(),
            Some(vec![DEFAULT_NORM, half, DEFAULT_NORM])
        );
        assert_eq!(
            read_norms(input.as_mut(), &infos, c, 3).unwrap(),
            Some(vec![DEFAULT_NORM; 3])
        );
        assert_eq!(read_norms(input.as_mut(), &infos, 1, 3).unwrap(), None);
    }
}
