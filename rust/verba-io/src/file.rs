//! File-system backed [`Directory`].

use std::{
    fs::File,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{BufferedInput, BufferedOutput, Directory, IndexInput, IndexOutput, Lock, ReadAt, WriteAt};

/// Positional access to an open file.
pub struct FsFile {
    file: File,
}

impl FsFile {
    pub fn new(file: File) -> FsFile {
        FsFile { file }
    }
}

impl ReadAt for FsFile {
    fn size(&self) -> std::io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn read_at(&self, pos: u64, buf: &mut [u8]) -> std::io::Result<()> {
        file_read_at_exact(&self.file, pos, buf)
    }
}

impl WriteAt for FsFile {
    fn write_at(&self, pos: u64, buf: &[u8]) -> std::io::Result<()> {
        file_write_at(&self.file, pos, buf)
    }

    fn sync(&self) -> std::io::Result<()> {
        self.file.sync_all()
    }
}

/// A [`Directory`] mapping file names to files inside one file-system directory.
pub struct FsDirectory {
    path: PathBuf,
}

impl FsDirectory {
    /// Opens the directory at `path`, creating it if necessary.
    pub fn open<P: AsRef<Path>>(path: P) -> std::io::Result<FsDirectory> {
        let path = path.as_ref().to_path_buf();
        std::fs::create_dir_all(&path)?;
        Ok(FsDirectory { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

impl Directory for FsDirectory {
    fn list_all(&self) -> std::io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }

    fn file_exists(&self, name: &str) -> std::io::Result<bool> {
        Ok(self.file_path(name).is_file())
    }

    fn file_length(&self, name: &str) -> std::io::Result<u64> {
        Ok(std::fs::metadata(self.file_path(name))?.len())
    }

    fn delete_file(&self, name: &str) -> std::io::Result<()> {
        std::fs::remove_file(self.file_path(name))
    }

    fn rename_file(&self, from: &str, to: &str) -> std::io::Result<()> {
        std::fs::rename(self.file_path(from), self.file_path(to))
    }

    fn create_output(&self, name: &str) -> std::io::Result<Box<dyn IndexOutput>> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.file_path(name))?;
        Ok(Box::new(BufferedOutput::new(Arc::new(FsFile::new(file)))))
    }

    fn open_input(&self, name: &str) -> std::io::Result<Box<dyn IndexInput>> {
        let file = File::open(self.file_path(name))?;
        Ok(Box::new(BufferedInput::new(Arc::new(FsFile::new(file)))?))
    }

    fn try_lock(&self, name: &str) -> std::io::Result<Option<Box<dyn Lock>>> {
        let path = self.file_path(name);
        match File::create_new(&path) {
            Ok(_) => Ok(Some(Box::new(FsLock { path: Some(path) }))),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Lock held by the existence of a file.
struct FsLock {
    path: Option<PathBuf>,
}

impl Lock for FsLock {
    fn release(&mut self) -> std::io::Result<()> {
        match self.path.take() {
            Some(path) => std::fs::remove_file(path),
            None => Ok(()),
        }
    }
}

impl Drop for FsLock {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::warn!("failed to release lock file: {e}");
        }
    }
}

#[cfg(unix)]
pub fn file_read_at_exact(file: &File, pos: u64, buf: &mut [u8]) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;

    file.read_exact_at(buf, pos)
}

#[cfg(unix)]
pub fn file_write_at(file: &File, pos: u64, buf: &[u8]) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;

    file.write_all_at(buf, pos)
}

#[cfg(windows)]
pub fn file_read_at_exact(file: &File, mut pos: u64, mut buf: &mut [u8]) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;

    while !buf.is_empty() {
        match file.seek_read(buf, pos) {
            Ok(0) => break,
            Ok(n) => {
                buf = &mut buf[n..];
                pos += n as u64;
            }
            Err(e) => return Err(e),
        }
    }
    if !buf.is_empty() {
        return Err(std::io::ErrorKind::UnexpectedEof.into());
    }
    Ok(())
}

#[cfg(windows)]
pub fn file_write_at(file: &File, mut pos: u64, mut buf: &[u8]) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;

    while !buf.is_empty() {
        let n = file.seek_write(buf, pos)?;
        buf = &buf[n..];
        pos += n as u64;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{DataInput, DataOutput, Directory, IndexOutput};

    use super::FsDirectory;

    #[test]
    fn test_fs_directory_round_trip() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let dir = FsDirectory::open(tempdir.path().join("index")).expect("open");

        let mut out = dir.create_output("_0.frq").unwrap();
        for i in 0..50_000u32 {
            out.write_vint(i * 3).unwrap();
        }
        out.close().unwrap();
        assert!(out.write_byte(0).is_err());

        let mut input = dir.open_input("_0.frq").unwrap();
        for i in 0..50_000u32 {
            assert_eq!(input.read_vint().unwrap(), i * 3);
        }
        assert_eq!(dir.list_all().unwrap(), vec!["_0.frq".to_string()]);
    }

    #[test]
    fn test_fs_lock_is_exclusive() {
        let tempdir = tempfile::tempdir().expect("tempdir");
        let dir = FsDirectory::open(tempdir.path()).expect("open");
        let lock = dir.try_lock("write.lock").unwrap();
        assert!(lock.is_some());
        assert!(dir.try_lock("write.lock").unwrap().is_none());
        drop(lock);
        assert!(!dir.file_exists("write.lock").unwrap());
    }
}
