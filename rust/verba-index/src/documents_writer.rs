//! Coordinates concurrent document indexing into one in-memory segment.
//!
//! Callers are bound to a pool of [`ThreadState`]s. Admission (doc id
//! assignment, field registration, delete buffering) happens under a single
//! lock; inversion runs unlocked in the caller's thread state; the buffered
//! per-document output (stored fields, term vectors, norms) is then written in
//! doc id order. A document finishing out of turn parks its thread state until
//! the document before it has been written.
//!
//! Pausing, flushing and aborting all wait for every thread state to become
//! idle before touching the shared buffers.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::ThreadId,
};

use ahash::AHashMap;
use parking_lot::{Condvar, Mutex, MutexGuard};
use verba_common::{Result, error::Error};
use verba_io::Directory;

use crate::{
    config::IndexWriterConfig,
    deletes::{BufferedDeletes, Term},
    document::Document,
    field_infos::FieldInfos,
    file_names::{
        DOC_STORE_EXTENSIONS, FIELD_INFOS_EXTENSION, FIELDS_EXTENSION, FIELDS_INDEX_EXTENSION,
        NORMS_EXTENSION, POSTINGS_EXTENSIONS, VECTORS_DOCUMENTS_EXTENSION,
        VECTORS_FIELDS_EXTENSION, VECTORS_INDEX_EXTENSION, segment_file_name, segment_name,
    },
    norms::{BufferedNorms, write_norms},
    pool::IndexingContext,
    segment_writer::{write_field_infos, write_postings},
    stored_fields::StoredFieldsWriter,
    term_vectors::TermVectorsWriter,
    thread_state::{IndexingWarning, ThreadState},
};

/// A segment written by [`DocumentsWriter::flush`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushedSegment {
    pub name: String,
    pub doc_count: u32,
    pub files: Vec<String>,
}

/// Result of a flush: the new segment, if any documents were buffered, and
/// the deletes buffered since the previous flush.
#[derive(Debug)]
pub struct FlushOutcome {
    pub segment: Option<FlushedSegment>,
    pub deletes: BufferedDeletes,
}

/// Diagnostics of the in-memory buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexingStats {
    pub ram_bytes_used: u64,
    pub ram_bytes_allocated: u64,
    pub num_docs_in_ram: u32,
    pub num_buffered_delete_terms: u32,
    pub num_thread_states: usize,
}

struct Slot {
    /// `None` while a caller is using the state or it is parked.
    state: Option<Box<ThreadState>>,
    num_threads: usize,
}

struct Inner {
    slots: Vec<Slot>,
    bindings: AHashMap<ThreadId, usize>,
    /// Thread states that finished out of turn.
    waiting: Vec<Box<ThreadState>>,
    field_infos: FieldInfos,

    segment: Option<String>,
    next_segment: u64,
    next_doc_id: u32,
    next_write_doc_id: u32,
    num_docs_in_ram: u32,

    pause_count: u32,
    flush_pending: bool,
    abort_count: u32,
    closed: bool,

    deletes: BufferedDeletes,
    stored_fields: Option<StoredFieldsWriter>,
    vectors: Option<TermVectorsWriter>,
    norms: Vec<Option<BufferedNorms>>,
    warnings: Vec<IndexingWarning>,
}

impl Inner {
    fn all_idle(&self) -> bool {
        self.waiting.is_empty() && self.slots.iter().all(|slot| slot.state.is_some())
    }

    /// Returns `true` if this call raised the flag.
    fn set_flush_pending(&mut self) -> bool {
        !std::mem::replace(&mut self.flush_pending, true)
    }

    fn idle(&mut self, state: Box<ThreadState>) {
        let slot = state.slot;
        self.slots[slot].state = Some(state);
    }
}

pub struct DocumentsWriter {
    directory: Arc<dyn Directory>,
    config: Arc<IndexWriterConfig>,
    ctx: Arc<IndexingContext>,
    inner: Mutex<Inner>,
    cond: Condvar,
    aborting: AtomicBool,
}

impl DocumentsWriter {
    /// Creates a writer naming its segments from `first_segment` upwards.
    pub fn new(
        directory: Arc<dyn Directory>,
        config: Arc<IndexWriterConfig>,
        ctx: Arc<IndexingContext>,
        first_segment: u64,
    ) -> DocumentsWriter {
        DocumentsWriter {
            directory,
            config,
            ctx,
            inner: Mutex::new(Inner {
                slots: Vec::new(),
                bindings: AHashMap::new(),
                waiting: Vec::new(),
                field_infos: FieldInfos::new(),
                segment: None,
                next_segment: first_segment,
                next_doc_id: 0,
                next_write_doc_id: 0,
                num_docs_in_ram: 0,
                pause_count: 0,
                flush_pending: false,
                abort_count: 0,
                closed: false,
                deletes: BufferedDeletes::new(),
                stored_fields: None,
                vectors: None,
                norms: Vec::new(),
                warnings: Vec::new(),
            }),
            cond: Condvar::new(),
            aborting: AtomicBool::new(false),
        }
    }

    pub fn context(&self) -> &Arc<IndexingContext> {
        &self.ctx
    }

    /// Buffers `doc`. Returns `true` when the caller should flush.
    pub fn add_document(&self, doc: Document) -> Result<bool> {
        self.update_document(None, doc)
    }

    /// Buffers `doc`, first deleting the documents admitted before it that
    /// contain `del_term`. Returns `true` when the caller should flush.
    ///
    /// A document that fails to index is marked deleted and the error is
    /// returned; the rest of the buffer is unaffected.
    pub fn update_document(&self, del_term: Option<Term>, doc: Document) -> Result<bool> {
        let mut state = self.get_thread_state(doc, del_term)?;
        let result = state.process_document(&self.aborting);
        self.finish_document(state, result)
    }

    /// Buffers a delete of every document containing `term`, covering the
    /// documents admitted so far. Returns `true` when the caller should flush.
    pub fn buffer_delete_term(&self, term: Term) -> Result<bool> {
        let mut guard = self.inner.lock();
        self.wait_ready(&mut guard)?;
        let inner = &mut *guard;
        let limit = inner.num_docs_in_ram;
        inner.deletes.add_term(term, limit, self.ctx.budget());
        Ok(self.time_to_flush_deletes(inner))
    }

    pub fn buffer_delete_terms(&self, terms: impl IntoIterator<Item = Term>) -> Result<bool> {
        let mut guard = self.inner.lock();
        self.wait_ready(&mut guard)?;
        let inner = &mut *guard;
        let limit = inner.num_docs_in_ram;
        for term in terms {
            inner.deletes.add_term(term, limit, self.ctx.budget());
        }
        Ok(self.time_to_flush_deletes(inner))
    }

    fn wait_ready(&self, guard: &mut MutexGuard<'_, Inner>) -> Result<()> {
        while !guard.closed && (guard.pause_count > 0 || guard.flush_pending || guard.abort_count > 0)
        {
            self.cond.wait(guard);
        }
        if guard.closed {
            return Err(Error::already_closed());
        }
        Ok(())
    }

    /// Binds the calling thread to a thread state, waits until it is free
    /// and admits `doc` into it.
    fn get_thread_state(&self, doc: Document, del_term: Option<Term>) -> Result<Box<ThreadState>> {
        let mut guard = self.inner.lock();
        let thread = std::thread::current().id();
        let slot = match guard.bindings.get(&thread) {
            Some(&slot) => slot,
            None => {
                let slot = self.choose_slot(&mut guard);
                guard.slots[slot].num_threads += 1;
                guard.bindings.insert(thread, slot);
                slot
            }
        };

        while !guard.closed
            && (guard.slots[slot].state.is_none()
                || guard.pause_count > 0
                || guard.flush_pending
                || guard.abort_count > 0)
        {
            self.cond.wait(&mut guard);
        }
        if guard.closed {
            return Err(Error::already_closed());
        }

        let inner = &mut *guard;
        let Some(mut state) = inner.slots[slot].state.take() else {
            return Err(Error::invalid_operation("thread state is busy"));
        };
        let segment = match &inner.segment {
            Some(segment) => segment.clone(),
            None => {
                let segment = segment_name(inner.next_segment);
                inner.next_segment += 1;
                inner.segment = Some(segment.clone());
                segment
            }
        };

        let doc_id = inner.next_doc_id;
        state.init(doc, doc_id, &mut inner.field_infos);
        for number in state.norm_fields() {
            let number = number as usize;
            if inner.norms.len() <= number {
                inner.norms.resize_with(number + 1, || None);
            }
            inner.norms[number].get_or_insert_with(BufferedNorms::new);
        }

        if let Err(e) = self.open_doc_stores(inner, &segment, state.doc_has_vectors()) {
            state.clear_document();
            inner.idle(state);
            return Err(self.abort_locked(&mut guard, e));
        }

        if let Some(term) = del_term {
            inner.deletes.add_term(term, doc_id, self.ctx.budget());
            state.do_flush_after = self.time_to_flush_deletes(inner);
        }
        inner.next_doc_id += 1;
        inner.num_docs_in_ram += 1;
        if let Some(max_docs) = self.config.max_buffered_docs {
            if inner.num_docs_in_ram >= max_docs && !inner.flush_pending {
                inner.flush_pending = true;
                state.do_flush_after = true;
            }
        }
        Ok(state)
    }

    /// Least loaded slot, or a new one while the pool may still grow and
    /// every slot is taken.
    fn choose_slot(&self, inner: &mut Inner) -> usize {
        let least_loaded = inner
            .slots
            .iter()
            .enumerate()
            .min_by_key(|(_, slot)| slot.num_threads)
            .map(|(index, slot)| (index, slot.num_threads));
        match least_loaded {
            Some((index, num_threads))
                if num_threads == 0 || inner.slots.len() >= self.config.max_thread_states =>
            {
                index
            }
            _ => {
                let index = inner.slots.len();
                let state = ThreadState::new(self.ctx.clone(), self.config.clone(), index);
                inner.slots.push(Slot {
                    state: Some(Box::new(state)),
                    num_threads: 0,
                });
                index
            }
        }
    }

    fn open_doc_stores(&self, inner: &mut Inner, segment: &str, has_vectors: bool) -> Result<()> {
        if inner.stored_fields.is_none() {
            inner.stored_fields = Some(StoredFieldsWriter::open(self.directory.as_ref(), segment)?);
        }
        if has_vectors && inner.vectors.is_none() {
            // documents already written get empty vector entries
            inner.vectors = Some(TermVectorsWriter::open(
                self.directory.as_ref(),
                segment,
                inner.next_write_doc_id,
            )?);
        }
        Ok(())
    }

    /// Writes the document of `state` if it is next in line, followed by any
    /// parked documents that became next; otherwise parks `state`.
    fn finish_document(&self, mut state: Box<ThreadState>, result: Result<()>) -> Result<bool> {
        let mut guard = self.inner.lock();
        if guard.abort_count > 0 {
            // the aborting thread resets the state once it is idle
            state.clear_document();
            guard.idle(state);
            self.cond.notify_all();
            return Err(match result {
                Err(e) => e,
                Ok(()) => Error::aborted("buffered documents were discarded"),
            });
        }

        let inner = &mut *guard;
        inner.warnings.extend(state.take_warnings());
        let doc_id = state.doc_id();
        let do_flush_after = std::mem::take(&mut state.do_flush_after);

        let mut written = Ok(());
        if doc_id == inner.next_write_doc_id {
            written = Self::write_document(inner, &mut state);
            inner.idle(state);
            while written.is_ok() {
                let next = inner.next_write_doc_id;
                let Some(pos) = inner.waiting.iter().position(|s| s.doc_id() == next) else {
                    break;
                };
                let mut parked = inner.waiting.swap_remove(pos);
                written = Self::write_document(inner, &mut parked);
                inner.idle(parked);
            }
        } else {
            inner.waiting.push(state);
        }
        self.cond.notify_all();

        if let Err(e) = written {
            return Err(self.abort_locked(&mut guard, e));
        }

        let inner = &mut *guard;
        match result {
            Ok(()) => {
                if self.ctx.budget().needs_balance() {
                    self.ctx.balance();
                }
                Ok(do_flush_after || self.time_to_flush_deletes(inner))
            }
            Err(e) => {
                if do_flush_after {
                    // let another thread trigger the flush
                    inner.flush_pending = false;
                    self.cond.notify_all();
                }
                inner.deletes.add_doc_id(doc_id, self.ctx.budget());
                log::debug!("document {doc_id} failed and is marked deleted: {e}");
                Err(e)
            }
        }
    }

    fn write_document(inner: &mut Inner, state: &mut ThreadState) -> Result<()> {
        let doc_id = state.doc_id();
        if let Some(stored_fields) = inner.stored_fields.as_mut() {
            let (num_fields, buffer) = state.stored_fields();
            stored_fields.write_document(num_fields, buffer)?;
        }
        if let Some(vectors) = inner.vectors.as_mut() {
            let (fields, buffer) = state.term_vectors();
            vectors.write_document(fields, buffer)?;
        }
        for &(number, norm) in state.doc_norms() {
            if let Some(Some(norms)) = inner.norms.get_mut(number as usize) {
                norms.fill(doc_id);
                norms.add(norm);
            }
        }
        inner.next_write_doc_id += 1;
        state.clear_document();
        Ok(())
    }

    fn deletes_full(&self, inner: &Inner) -> bool {
        let budget = self.ctx.budget();
        let ram_full = budget.limit().is_some_and(|limit| budget.used() >= limit);
        let count_full = self.config.max_buffered_delete_terms.is_some_and(|max| {
            inner.deletes.num_terms() as usize + inner.deletes.num_doc_ids() >= max as usize
        });
        ram_full || count_full
    }

    fn time_to_flush_deletes(&self, inner: &mut Inner) -> bool {
        (self.ctx.budget().is_full() || self.deletes_full(inner)) && inner.set_flush_pending()
    }

    /// Blocks new documents and waits until every thread state is idle. The
    /// pause lasts until the guard is dropped.
    pub fn pause(&self) -> PauseGuard<'_> {
        let mut guard = self.inner.lock();
        guard.pause_count += 1;
        while !guard.all_idle() {
            self.cond.wait(&mut guard);
        }
        PauseGuard { writer: self }
    }

    /// Writes the buffered documents as a new segment and resets the buffer.
    ///
    /// Must be called while paused. A failure aborts the buffered documents.
    pub fn flush(&self) -> Result<FlushOutcome> {
        let mut guard = self.inner.lock();
        while !guard.all_idle() {
            self.cond.wait(&mut guard);
        }
        let inner = &mut *guard;
        if inner.num_docs_in_ram == 0 {
            let deletes = std::mem::take(&mut inner.deletes);
            let budget = self.ctx.budget();
            budget.record_unused(deletes.bytes_used());
            budget.clear_full();
            return Ok(FlushOutcome {
                segment: None,
                deletes,
            });
        }

        match self.write_segment(inner) {
            Ok(segment) => {
                log::info!(
                    "flushed segment {} with {} docs ({} bytes used, {} allocated)",
                    segment.name,
                    segment.doc_count,
                    self.ctx.budget().used(),
                    self.ctx.budget().allocated()
                );
                let deletes = std::mem::take(&mut inner.deletes);
                self.reset_postings_data(inner);
                Ok(FlushOutcome {
                    segment: Some(segment),
                    deletes,
                })
            }
            Err(e) => Err(self.abort_locked(&mut guard, e)),
        }
    }

    fn write_segment(&self, inner: &mut Inner) -> Result<FlushedSegment> {
        let Some(segment) = inner.segment.clone() else {
            return Err(Error::invalid_operation("flush of an unnamed segment"));
        };
        let num_docs = inner.num_docs_in_ram;
        let directory = self.directory.as_ref();
        log::debug!("flushing {num_docs} docs into segment {segment}");

        let mut states = inner
            .slots
            .iter_mut()
            .filter_map(|slot| slot.state.as_deref_mut())
            .collect::<Vec<_>>();
        for state in &mut states {
            for number in state.payload_fields() {
                inner.field_infos.set_store_payloads(number);
            }
            state.prepare_merge();
        }
        let states = states.into_iter().map(|state| &*state).collect::<Vec<_>>();

        let mut files = vec![write_field_infos(directory, &segment, &inner.field_infos)?];
        files.extend(write_postings(
            directory,
            &segment,
            &inner.field_infos,
            &states,
            num_docs,
            &self.config,
        )?);
        if inner.field_infos.has_norms() {
            files.push(write_norms(
                directory,
                &segment,
                &inner.field_infos,
                &mut inner.norms,
                num_docs,
            )?);
        }
        if let Some(stored_fields) = inner.stored_fields.take() {
            stored_fields.close()?;
            files.push(segment_file_name(&segment, FIELDS_EXTENSION));
            files.push(segment_file_name(&segment, FIELDS_INDEX_EXTENSION));
        }
        if let Some(vectors) = inner.vectors.take() {
            vectors.close()?;
            files.extend(
                [
                    VECTORS_INDEX_EXTENSION,
                    VECTORS_DOCUMENTS_EXTENSION,
                    VECTORS_FIELDS_EXTENSION,
                ]
                .iter()
                .map(|ext| segment_file_name(&segment, ext)),
            );
        }

        Ok(FlushedSegment {
            name: segment,
            doc_count: num_docs,
            files,
        })
    }

    /// Returns every thread state's postings to the shared pools and starts a
    /// new segment.
    fn reset_postings_data(&self, inner: &mut Inner) {
        inner.bindings.clear();
        for slot in &mut inner.slots {
            slot.num_threads = 0;
            if let Some(state) = slot.state.as_mut() {
                state.reset_postings();
            }
        }
        inner.segment = None;
        inner.next_doc_id = 0;
        inner.next_write_doc_id = 0;
        inner.num_docs_in_ram = 0;
        inner.flush_pending = false;
        inner.norms.clear();

        let budget = self.ctx.budget();
        self.ctx.trim_free_postings();
        budget.reset_used();
        self.ctx.balance();
        budget.clear_full();
    }

    /// Discards all buffered documents and deletes.
    pub fn abort(&self) {
        let mut guard = self.inner.lock();
        self.abort_locked(&mut guard, Error::aborted("abort requested"));
    }

    /// Pauses indexing, waits for all thread states, drops every buffered
    /// document and the segment files written so far, and returns `cause`.
    fn abort_locked(&self, guard: &mut MutexGuard<'_, Inner>, cause: Error) -> Error {
        log::info!("aborting buffered documents: {cause}");
        guard.abort_count += 1;
        self.aborting.store(true, Ordering::Release);

        let waiting = std::mem::take(&mut guard.waiting);
        for mut state in waiting {
            state.clear_document();
            guard.idle(state);
        }
        guard.pause_count += 1;
        while !guard.all_idle() {
            self.cond.wait(guard);
        }

        let inner = &mut **guard;
        inner.deletes.clear();
        if let Some(stored_fields) = inner.stored_fields.take() {
            let _ = stored_fields.close();
        }
        if let Some(vectors) = inner.vectors.take() {
            let _ = vectors.close();
        }
        if let Some(segment) = &inner.segment {
            self.delete_segment_files(segment);
        }
        self.reset_postings_data(inner);

        inner.pause_count -= 1;
        inner.abort_count -= 1;
        if inner.abort_count == 0 {
            self.aborting.store(false, Ordering::Release);
        }
        self.cond.notify_all();
        cause
    }

    fn delete_segment_files(&self, segment: &str) {
        let extensions = DOC_STORE_EXTENSIONS
            .iter()
            .chain(&POSTINGS_EXTENSIONS)
            .chain(&[FIELD_INFOS_EXTENSION, NORMS_EXTENSION]);
        for ext in extensions {
            let name = segment_file_name(segment, ext);
            let result = self
                .directory
                .file_exists(&name)
                .and_then(|exists| if exists { self.directory.delete_file(&name) } else { Ok(()) });
            if let Err(e) = result {
                log::warn!("failed to delete {name} while aborting: {e}");
            }
        }
    }

    /// Lets documents in again after a flush.
    pub fn clear_flush_pending(&self) {
        let mut guard = self.inner.lock();
        guard.flush_pending = false;
        self.cond.notify_all();
    }

    /// Marks the writer closed; blocked and later callers fail with `AlreadyClosed`.
    pub fn close(&self) {
        let mut guard = self.inner.lock();
        guard.closed = true;
        self.cond.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn num_docs_in_ram(&self) -> u32 {
        self.inner.lock().num_docs_in_ram
    }

    pub fn has_buffered_deletes(&self) -> bool {
        !self.inner.lock().deletes.is_empty()
    }

    pub fn stats(&self) -> IndexingStats {
        let guard = self.inner.lock();
        let budget = self.ctx.budget();
        IndexingStats {
            ram_bytes_used: budget.used(),
            ram_bytes_allocated: budget.allocated(),
            num_docs_in_ram: guard.num_docs_in_ram,
            num_buffered_delete_terms: guard.deletes.num_terms(),
            num_thread_states: guard.slots.len(),
        }
    }

    /// Drains the warnings recorded since the previous call.
    pub fn take_warnings(&self) -> Vec<IndexingWarning> {
        std::mem::take(&mut self.inner.lock().warnings)
    }

    /// Snapshot of the field registry.
    pub fn field_infos(&self) -> FieldInfos {
        self.inner.lock().field_infos.clone()
    }
}

/// Keeps a [`DocumentsWriter`] paused; see [`DocumentsWriter::pause`].
pub struct PauseGuard<'a> {
    writer: &'a DocumentsWriter,
}

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        let mut guard = self.writer.inner.lock();
        guard.pause_count -= 1;
        self.writer.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use verba_io::RamDirectory;
    use verba_ram_budget::RamBudget;

    use super::*;
    use crate::document::Field;

    fn writer(config: IndexWriterConfig) -> (Arc<RamDirectory>, DocumentsWriter) {
        let dir = Arc::new(RamDirectory::new());
        let budget = RamBudget::from_megabytes(config.ram_buffer_size_mb);
        let writer = DocumentsWriter::new(
            dir.clone(),
            Arc::new(config),
            IndexingContext::new(budget),
            0,
        );
        (dir, writer)
    }

    fn body(text: &str) -> Document {
        Document::new().with_field(Field::text("body", text))
    }

    #[test]
    fn test_flush_writes_segment_files() {
        let (dir, writer) = writer(IndexWriterConfig::default());
        for _ in 0..3 {
            assert!(!writer.add_document(body("the quick fox")).unwrap());
        }
        assert_eq!(writer.num_docs_in_ram(), 3);
        let outcome = {
            let _pause = writer.pause();
            writer.flush().unwrap()
        };
        let segment = outcome.segment.unwrap();
        assert_eq!(segment.name, "_0");
        assert_eq!(segment.doc_count, 3);
        for file in &segment.files {
            assert!(dir.file_exists(file).unwrap(), "{file}");
        }
        assert!(segment.files.contains(&"_0.nrm".to_string()));
        assert!(!segment.files.contains(&"_0.tvx".to_string()));
        assert_eq!(writer.num_docs_in_ram(), 0);

        writer.add_document(body("again")).unwrap();
        let _pause = writer.pause();
        assert_eq!(writer.flush().unwrap().segment.unwrap().name, "_1");
    }

    #[test]
    fn test_max_buffered_docs_requests_flush() {
        let config = IndexWriterConfig::default().with_max_buffered_docs(Some(2));
        let (_dir, writer) = writer(config);
        assert!(!writer.add_document(body("a")).unwrap());
        assert!(writer.add_document(body("b")).unwrap());
        {
            let _pause = writer.pause();
            writer.flush().unwrap();
        }
        writer.clear_flush_pending();
        assert!(!writer.add_document(body("c")).unwrap());
    }

    #[test]
    fn test_delete_terms_are_counted() {
        let config = IndexWriterConfig::default().with_max_buffered_delete_terms(Some(2));
        let (_dir, writer) = writer(config);
        writer.add_document(body("fox")).unwrap();
        assert!(!writer.buffer_delete_term(Term::new("body", "fox")).unwrap());
        assert!(writer.buffer_delete_term(Term::new("body", "fox")).unwrap());
        assert_eq!(writer.stats().num_buffered_delete_terms, 2);

        let outcome = {
            let _pause = writer.pause();
            writer.flush().unwrap()
        };
        assert_eq!(outcome.deletes.num_unique_terms(), 1);
        assert_eq!(outcome.deletes.limit(&Term::new("body", "fox")), Some(1));
    }

    #[test]
    fn test_delete_only_flush() {
        let (_dir, writer) = writer(IndexWriterConfig::default());
        writer.buffer_delete_term(Term::new("id", "1")).unwrap();
        let _pause = writer.pause();
        let outcome = writer.flush().unwrap();
        assert!(outcome.segment.is_none());
        assert_eq!(outcome.deletes.num_unique_terms(), 1);
    }

    #[test]
    fn test_delete_only_flush_releases_ram() {
        let config = IndexWriterConfig::default().with_ram_buffer_size_mb(Some(0.01));
        let (_dir, writer) = writer(config);
        writer.add_document(body("fox")).unwrap();
        {
            let _pause = writer.pause();
            writer.flush().unwrap();
        }
        writer.clear_flush_pending();
        let baseline = writer.stats().ram_bytes_used;

        let mut flushes = 0;
        for i in 0..400 {
            if writer.buffer_delete_term(Term::new("id", format!("doc{i:08}"))).unwrap() {
                let outcome = {
                    let _pause = writer.pause();
                    writer.flush().unwrap()
                };
                writer.clear_flush_pending();
                assert!(outcome.segment.is_none());
                assert!(outcome.deletes.num_unique_terms() > 1);
                assert_eq!(writer.stats().ram_bytes_used, baseline);
                flushes += 1;
            }
        }
        // each flush frees the whole budget, so dozens of deletes fit between flushes
        assert!((1..=5).contains(&flushes), "{flushes} flushes");
    }

    #[test]
    fn test_abort_discards_buffer() {
        let (dir, writer) = writer(IndexWriterConfig::default());
        writer.add_document(body("a b c")).unwrap();
        writer.buffer_delete_term(Term::new("body", "a")).unwrap();
        assert!(dir.file_exists("_0.fdt").unwrap());
        writer.abort();
        assert_eq!(writer.num_docs_in_ram(), 0);
        assert!(!writer.has_buffered_deletes());
        assert!(!dir.file_exists("_0.fdt").unwrap());
        // indexing continues with a fresh segment
        writer.add_document(body("d")).unwrap();
        let _pause = writer.pause();
        assert_eq!(writer.flush().unwrap().segment.unwrap().name, "_1");
    }

    #[test]
    fn test_closed_writer_rejects_documents() {
        let (_dir, writer) = writer(IndexWriterConfig::default());
        writer.close();
        let err = writer.add_document(body("a")).unwrap_err();
        assert!(matches!(
            err.kind(),
            verba_common::error::ErrorKind::AlreadyClosed
        ));
    }
}
