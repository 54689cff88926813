//! Temporary directories for file-system backed indexes.

use std::path::Path;

/// Creates an empty temporary directory, removed when the returned guard drops.
pub fn temp_index_dir() -> anyhow::Result<tempfile::TempDir> {
    Ok(tempfile::Builder::new().prefix("verba-index-").tempdir()?)
}

/// Returns the sorted names of the files in `path`.
pub fn list_files(path: &Path) -> anyhow::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            let name = entry
                .file_name()
                .into_string()
                .map_err(|name| anyhow::anyhow!("non-UTF-8 file name {name:?}"))?;
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}
