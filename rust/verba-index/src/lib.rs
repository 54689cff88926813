//! In-memory inversion of documents and their flushing into segments.
//!
//! Documents added through an [`IndexWriter`] are analyzed and inverted
//! concurrently, one [`ThreadState`](thread_state) per indexing thread, into
//! shared block pools. Their stored fields, term vectors and norms are written
//! out in document id order as documents complete. When the RAM budget, the
//! buffered document count or the buffered delete count is exceeded, the
//! in-memory postings of all thread states are merged into a new segment:
//!
//! | file   | content                                     |
//! |--------|---------------------------------------------|
//! | `.fnm` | field names, numbers and flags              |
//! | `.frq` | doc deltas and term frequencies, skip data  |
//! | `.prx` | position deltas and payloads                |
//! | `.tis` | the sorted terms dictionary                 |
//! | `.tii` | every n-th term of the dictionary           |
//! | `.nrm` | one norm byte per document and field       |
//! | `.fdx`, `.fdt` | stored fields                       |
//! | `.tvx`, `.tvd`, `.tvf` | term vectors                |
//! | `.del` | deleted documents                           |
//!
//! Buffered deletes are applied to the segments after each flush.
//!
//! ```rust
//! use std::sync::Arc;
//! use verba_index::{Document, Field, IndexWriter, IndexWriterConfig, Term};
//! use verba_io::RamDirectory;
//!
//! let dir = Arc::new(RamDirectory::new());
//! let writer = IndexWriter::open(dir.clone(), IndexWriterConfig::default()).unwrap();
//! writer
//!     .add_document(
//!         Document::new()
//!             .with_field(Field::keyword("id", "1"))
//!             .with_field(Field::text("body", "the quick brown fox")),
//!     )
//!     .unwrap();
//! writer.delete_documents(Term::new("id", "2")).unwrap();
//! writer.close().unwrap();
//! assert_eq!(writer.segments()[0].doc_count, 1);
//! ```

pub mod config;
pub mod deletes;
pub mod document;
pub mod documents_writer;
pub mod field_infos;
pub mod file_names;
pub mod index_writer;
pub mod norms;
pub mod pool;
pub mod posting_table;
pub mod segment_reader;
mod segment_writer;
pub mod skip_list;
pub mod stored_fields;
pub mod term_vectors;
pub mod terms_dict;
mod thread_state;

pub use config::{DefaultSimilarity, IndexWriterConfig, Similarity};
pub use deletes::{BufferedDeletes, Term};
pub use document::{Document, Field, FieldValue, Index, Store, TermVector};
pub use documents_writer::{DocumentsWriter, FlushOutcome, FlushedSegment, IndexingStats};
pub use field_infos::{FieldInfo, FieldInfoFlags, FieldInfos};
pub use index_writer::{IndexWriter, SegmentInfo};
pub use segment_reader::{SegmentReader, TermPosting};
pub use stored_fields::{StoredField, StoredValue};
pub use term_vectors::{FieldTermVector, TermVectorEntry};
pub use thread_state::IndexingWarning;
