//! Names of the files making up a segment.

pub const FIELD_INFOS_EXTENSION: &str = "fnm";
pub const FREQ_EXTENSION: &str = "frq";
pub const PROX_EXTENSION: &str = "prx";
pub const TERMS_EXTENSION: &str = "tis";
pub const TERMS_INDEX_EXTENSION: &str = "tii";
pub const NORMS_EXTENSION: &str = "nrm";
pub const FIELDS_EXTENSION: &str = "fdt";
pub const FIELDS_INDEX_EXTENSION: &str = "fdx";
pub const VECTORS_INDEX_EXTENSION: &str = "tvx";
pub const VECTORS_DOCUMENTS_EXTENSION: &str = "tvd";
pub const VECTORS_FIELDS_EXTENSION: &str = "tvf";
pub const DELETES_EXTENSION: &str = "del";

pub const WRITE_LOCK_NAME: &str = "write.lock";

/// Extensions of the stored-field and term-vector files.
pub const DOC_STORE_EXTENSIONS: [&str; 5] = [
    FIELDS_EXTENSION,
    FIELDS_INDEX_EXTENSION,
    VECTORS_INDEX_EXTENSION,
    VECTORS_DOCUMENTS_EXTENSION,
    VECTORS_FIELDS_EXTENSION,
];

/// Extensions of the files produced from the buffered postings.
pub const POSTINGS_EXTENSIONS: [&str; 4] = [
    FREQ_EXTENSION,
    PROX_EXTENSION,
    TERMS_EXTENSION,
    TERMS_INDEX_EXTENSION,
];

pub fn segment_file_name(segment: &str, extension: &str) -> String {
    format!("{segment}.{extension}")
}

/// Name of the deletion bitmap of `segment` at generation `generation`.
pub fn deletes_file_name(segment: &str, generation: u64) -> String {
    format!("{segment}_{}.{DELETES_EXTENSION}", to_base36(generation))
}

/// Segment names are `_` followed by a base-36 counter.
pub fn segment_name(counter: u64) -> String {
    format!("_{}", to_base36(counter))
}

/// Extracts the segment counter from any file belonging to a segment.
pub fn parse_segment_counter(file_name: &str) -> Option<u64> {
    let rest = file_name.strip_prefix('_')?;
    let end = rest.find(['.', '_']).unwrap_or(rest.len());
    from_base36(&rest[..end])
}

pub fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

pub fn from_base36(s: &str) -> Option<u64> {
    if s.is_empty() {
        return None;
    }
    u64::from_str_radix(s, 36).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_names() {
        assert_eq!(segment_name(0), "_0");
        assert_eq!(segment_name(35), "_z");
        assert_eq!(segment_name(36), "_10");
        assert_eq!(segment_file_name("_a", FREQ_EXTENSION), "_a.frq");
        assert_eq!(deletes_file_name("_a", 37), "_a_11.del");
    }

    #[test]
    fn test_parse_segment_counter() {
        assert_eq!(parse_segment_counter("_10.tis"), Some(36));
        assert_eq!(parse_segment_counter("_z_1.del"), Some(35));
        assert_eq!(parse_segment_counter("write.lock"), None);
        assert_eq!(parse_segment_counter("_.fnm"), None);
    }
}
