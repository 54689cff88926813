//! The public entry point for building an index.
//!
//! An [`IndexWriter`] owns the directory's write lock and a
//! [`DocumentsWriter`]. It flushes whenever the documents writer asks for it,
//! applies the buffered deletes to the flushed segments, and keeps the list of
//! segments produced so far for an external merge policy.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use parking_lot::Mutex;
use roaring::RoaringBitmap;
use verba_common::{Result, error::Error};
use verba_io::{Directory, Lock};
use verba_ram_budget::RamBudget;

use crate::{
    config::IndexWriterConfig,
    deletes::{BufferedDeletes, Term, write_deleted_docs},
    document::Document,
    documents_writer::{DocumentsWriter, FlushedSegment, IndexingStats},
    file_names::{WRITE_LOCK_NAME, deletes_file_name, parse_segment_counter},
    pool::IndexingContext,
    segment_reader::SegmentReader,
    thread_state::IndexingWarning,
};

/// A flushed segment as tracked by the writer.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentInfo {
    pub name: String,
    /// Documents in the segment, deleted ones included.
    pub doc_count: u32,
    pub files: Vec<String>,
    pub deleted: RoaringBitmap,
    /// Generation of the current `.del` file; `0` if there is none.
    pub del_gen: u64,
}

impl SegmentInfo {
    fn new(segment: FlushedSegment) -> SegmentInfo {
        SegmentInfo {
            name: segment.name,
            doc_count: segment.doc_count,
            files: segment.files,
            deleted: RoaringBitmap::new(),
            del_gen: 0,
        }
    }

    pub fn num_live_docs(&self) -> u32 {
        self.doc_count - self.deleted.len() as u32
    }

    pub fn has_deletions(&self) -> bool {
        !self.deleted.is_empty()
    }

    pub fn deletes_file(&self) -> Option<String> {
        (self.del_gen > 0).then(|| deletes_file_name(&self.name, self.del_gen))
    }
}

pub struct IndexWriter {
    directory: Arc<dyn Directory>,
    docs: DocumentsWriter,
    segments: Mutex<Vec<SegmentInfo>>,
    flush_lock: Mutex<()>,
    write_lock: Mutex<Option<Box<dyn Lock>>>,
    closed: AtomicBool,
}

impl IndexWriter {
    /// Opens a writer on `directory`, failing with `LockObtainFailed` if
    /// another writer holds the directory.
    pub fn open(directory: Arc<dyn Directory>, config: IndexWriterConfig) -> Result<IndexWriter> {
        config.validate()?;
        let lock = directory
            .try_lock(WRITE_LOCK_NAME)?
            .ok_or_else(|| Error::lock_obtain_failed(WRITE_LOCK_NAME))?;

        let first_segment = directory
            .list_all()?
            .iter()
            .filter_map(|name| parse_segment_counter(name))
            .max()
            .map_or(0, |counter| counter + 1);
        let budget = RamBudget::from_megabytes(config.ram_buffer_size_mb);
        log::info!(
            "opening index writer (ram buffer {:?} MB, max buffered docs {:?}, first segment {first_segment})",
            config.ram_buffer_size_mb,
            config.max_buffered_docs
        );
        let docs = DocumentsWriter::new(
            directory.clone(),
            Arc::new(config),
            IndexingContext::new(budget),
            first_segment,
        );
        Ok(IndexWriter {
            directory,
            docs,
            segments: Mutex::new(Vec::new()),
            flush_lock: Mutex::new(()),
            write_lock: Mutex::new(Some(lock)),
            closed: AtomicBool::new(false),
        })
    }

    pub fn directory(&self) -> &Arc<dyn Directory> {
        &self.directory
    }

    /// Adds a document. A document that fails to index is not visible
    /// afterwards; the error is returned and the writer stays usable.
    pub fn add_document(&self, doc: Document) -> Result<()> {
        self.ensure_open()?;
        if self.docs.add_document(doc)? {
            self.flush()?;
        }
        Ok(())
    }

    /// Deletes the documents containing `term` and adds `doc`, as one step
    /// with respect to flushes.
    pub fn update_document(&self, term: Term, doc: Document) -> Result<()> {
        self.ensure_open()?;
        if self.docs.update_document(Some(term), doc)? {
            self.flush()?;
        }
        Ok(())
    }

    /// Deletes every document containing `term`, buffered and flushed.
    pub fn delete_documents(&self, term: Term) -> Result<()> {
        self.ensure_open()?;
        if self.docs.buffer_delete_term(term)? {
            self.flush()?;
        }
        Ok(())
    }

    pub fn delete_documents_terms(&self, terms: impl IntoIterator<Item = Term>) -> Result<()> {
        self.ensure_open()?;
        if self.docs.buffer_delete_terms(terms)? {
            self.flush()?;
        }
        Ok(())
    }

    /// Writes the buffered documents as a new segment and applies the
    /// buffered deletes.
    pub fn flush(&self) -> Result<()> {
        let _flushing = self.flush_lock.lock();
        let result = self.flush_locked();
        self.docs.clear_flush_pending();
        result
    }

    fn flush_locked(&self) -> Result<()> {
        let _pause = self.docs.pause();
        let outcome = self.docs.flush()?;
        let mut segments = self.segments.lock();
        let mut flushed = outcome.segment.map(SegmentInfo::new);
        if !outcome.deletes.is_empty() {
            self.apply_deletes(&outcome.deletes, &mut segments, flushed.as_mut())?;
        }
        if let Some(info) = flushed {
            segments.push(info);
        }
        Ok(())
    }

    /// Applies `deletes` to all earlier segments without limit, and to the
    /// just-flushed segment up to each term's limit.
    fn apply_deletes(
        &self,
        deletes: &BufferedDeletes,
        segments: &mut [SegmentInfo],
        flushed: Option<&mut SegmentInfo>,
    ) -> Result<()> {
        let directory = self.directory.as_ref();
        for info in segments.iter_mut() {
            let reader = SegmentReader::open(directory, info)?;
            let mut changed = false;
            for (term, _) in deletes.terms() {
                for (doc, _) in reader.term_docs(term)? {
                    changed |= info.deleted.insert(doc);
                }
            }
            if changed {
                self.write_deletes(info)?;
            }
        }

        if let Some(info) = flushed {
            let reader = SegmentReader::open(directory, info)?;
            for (term, limit) in deletes.terms() {
                for (doc, _) in reader.term_docs(term)? {
                    if doc < limit {
                        info.deleted.insert(doc);
                    }
                }
            }
            info.deleted.extend(deletes.doc_ids().iter().copied());
            if info.has_deletions() {
                self.write_deletes(info)?;
            }
        }
        log::debug!(
            "applied {} delete terms and {} doc ids",
            deletes.num_unique_terms(),
            deletes.num_doc_ids()
        );
        Ok(())
    }

    /// Writes the next generation of `info`'s deletion bitmap and drops the
    /// previous one.
    fn write_deletes(&self, info: &mut SegmentInfo) -> Result<()> {
        let previous = info.deletes_file();
        info.del_gen += 1;
        let name = deletes_file_name(&info.name, info.del_gen);
        write_deleted_docs(self.directory.as_ref(), &name, &info.deleted, info.doc_count)?;
        if let Some(previous) = previous {
            if let Err(e) = self.directory.delete_file(&previous) {
                log::warn!("failed to delete {previous}: {e}");
            }
            info.files.retain(|file| *file != previous);
        }
        info.files.push(name);
        Ok(())
    }

    /// Discards all buffered documents and deletes.
    pub fn abort(&self) -> Result<()> {
        self.ensure_open()?;
        self.docs.abort();
        Ok(())
    }

    /// Flushes, then releases the engine's memory and the write lock.
    pub fn close(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Ok(());
        }
        let flushed = self.flush();
        self.shutdown();
        flushed
    }

    fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.docs.close();
        self.docs.context().shutdown();
        if let Some(mut lock) = self.write_lock.lock().take() {
            if let Err(e) = lock.release() {
                log::warn!("failed to release {WRITE_LOCK_NAME}: {e}");
            }
        }
        log::info!("index writer closed");
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::already_closed());
        }
        Ok(())
    }

    /// Segments flushed by this writer, oldest first.
    pub fn segments(&self) -> Vec<SegmentInfo> {
        self.segments.lock().clone()
    }

    /// Opens a reader on the flushed segment `name`.
    pub fn segment_reader(&self, name: &str) -> Result<SegmentReader> {
        let segments = self.segments.lock();
        let Some(info) = segments.iter().find(|info| info.name == name) else {
            return Err(Error::invalid_arg("name", format!("unknown segment {name}")));
        };
        SegmentReader::open(self.directory.as_ref(), info)
    }

    /// Live documents in flushed segments plus the buffered documents.
    pub fn num_docs(&self) -> u32 {
        let flushed = self
            .segments
            .lock()
            .iter()
            .map(SegmentInfo::num_live_docs)
            .sum::<u32>();
        flushed + self.docs.num_docs_in_ram()
    }

    pub fn num_docs_in_ram(&self) -> u32 {
        self.docs.num_docs_in_ram()
    }

    pub fn ram_bytes_used(&self) -> u64 {
        self.docs.stats().ram_bytes_used
    }

    pub fn ram_bytes_allocated(&self) -> u64 {
        self.docs.stats().ram_bytes_allocated
    }

    pub fn num_buffered_delete_terms(&self) -> u32 {
        self.docs.stats().num_buffered_delete_terms
    }

    pub fn stats(&self) -> IndexingStats {
        self.docs.stats()
    }

    /// Drains the warnings recorded while indexing.
    pub fn take_warnings(&self) -> Vec<IndexingWarning> {
        self.docs.take_warnings()
    }
}

impl Drop for IndexWriter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use verba_io::RamDirectory;

    use super::*;
    use crate::document::Field;

    fn open(dir: &Arc<RamDirectory>) -> IndexWriter {
        IndexWriter::open(dir.clone(), IndexWriterConfig::default()).unwrap()
    }

    fn doc(id: &str, body: &str) -> Document {
        Document::new()
            .with_field(Field::keyword("id", id))
            .with_field(Field::text("body", body))
    }

    #[test]
    fn test_write_lock_is_exclusive() {
        let dir = Arc::new(RamDirectory::new());
        let writer = open(&dir);
        let err = IndexWriter::open(dir.clone(), IndexWriterConfig::default())
            .err()
            .unwrap();
        assert!(matches!(
            err.kind(),
            verba_common::error::ErrorKind::LockObtainFailed { .. }
        ));
        writer.close().unwrap();
        assert!(writer.add_document(doc("1", "a")).is_err());
        open(&dir).close().unwrap();
    }

    #[test]
    fn test_segment_names_continue_after_existing() {
        let dir = Arc::new(RamDirectory::new());
        {
            let writer = open(&dir);
            writer.add_document(doc("1", "a")).unwrap();
            writer.flush().unwrap();
            writer.add_document(doc("2", "b")).unwrap();
            writer.close().unwrap();
            let names = writer.segments().into_iter().map(|s| s.name).collect::<Vec<_>>();
            assert_eq!(names, vec!["_0", "_1"]);
        }
        let writer = open(&dir);
        writer.add_document(doc("3", "c")).unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.segments()[0].name, "_2");
    }

    #[test]
    fn test_update_deletes_earlier_documents_only() {
        let dir = Arc::new(RamDirectory::new());
        let writer = open(&dir);
        writer.add_document(doc("1", "old")).unwrap();
        writer.flush().unwrap();
        writer.add_document(doc("1", "older")).unwrap();
        writer
            .update_document(Term::new("id", "1"), doc("1", "new"))
            .unwrap();
        writer.flush().unwrap();

        let segments = writer.segments();
        assert_eq!(segments[0].num_live_docs(), 0);
        assert_eq!(segments[0].deletes_file().as_deref(), Some("_0_1.del"));
        assert_eq!(segments[1].deleted.iter().collect::<Vec<_>>(), vec![0]);
        assert_eq!(writer.num_docs(), 1);
        assert!(dir.file_exists("_1_1.del").unwrap());
    }

    #[test]
    fn test_delete_generations_replace_files() {
        let dir = Arc::new(RamDirectory::new());
        let writer = open(&dir);
        writer.add_document(doc("1", "a")).unwrap();
        writer.add_document(doc("2", "b")).unwrap();
        writer.flush().unwrap();
        writer.delete_documents(Term::new("id", "1")).unwrap();
        writer.flush().unwrap();
        writer.delete_documents(Term::new("id", "2")).unwrap();
        writer.flush().unwrap();

        let info = &writer.segments()[0];
        assert_eq!(info.del_gen, 2);
        assert!(!dir.file_exists("_0_1.del").unwrap());
        assert!(info.files.contains(&"_0_2.del".to_string()));
        assert_eq!(info.num_live_docs(), 0);
    }
}
