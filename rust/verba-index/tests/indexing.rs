use std::{collections::HashMap, sync::Arc};

use verba_analysis::{Analyzer, WhitespaceAnalyzer, collect_tokens};
use verba_index::{
    Document, Field, FieldValue, Index, IndexWriter, IndexWriterConfig, IndexingWarning,
    SegmentReader, Store, StoredValue, Term, TermVector, deletes::read_deleted_docs,
    pool::BYTE_BLOCK_SIZE,
};
use verba_io::{Directory, RamDirectory};
use verba_testkit::data_gen::{TextGenerator, doc_key};

fn whitespace_config() -> IndexWriterConfig {
    IndexWriterConfig::default().with_analyzer(Arc::new(WhitespaceAnalyzer::new()))
}

fn open_only_segment(writer: &IndexWriter) -> SegmentReader {
    let segments = writer.segments();
    assert_eq!(segments.len(), 1);
    SegmentReader::open(writer.directory().as_ref(), &segments[0]).unwrap()
}

#[test]
fn test_doc_count_matches_successful_adds() {
    let dir = Arc::new(RamDirectory::new());
    let writer = IndexWriter::open(dir.clone(), whitespace_config()).unwrap();
    for i in 0..25 {
        writer
            .add_document(Document::new().with_field(Field::text("body", format!("doc {i}"))))
            .unwrap();
    }
    assert_eq!(writer.num_docs_in_ram(), 25);
    writer.flush().unwrap();

    let segments = writer.segments();
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].doc_count, 25);
    assert_eq!(segments[0].num_live_docs(), 25);
    assert_eq!(writer.num_docs_in_ram(), 0);
    writer.close().unwrap();
}

#[test]
fn test_frequencies_match_retokenization() {
    let dir = Arc::new(RamDirectory::new());
    let writer = IndexWriter::open(dir.clone(), whitespace_config()).unwrap();
    let mut generator = TextGenerator::new(42, 300);
    let texts = generator.texts(200, 0, 40);
    for text in &texts {
        writer
            .add_document(Document::new().with_field(Field::text("body", text.clone())))
            .unwrap();
    }
    writer.flush().unwrap();

    let analyzer = WhitespaceAnalyzer::new();
    let mut expected: HashMap<String, Vec<(u32, u32)>> = HashMap::new();
    for (doc, text) in texts.iter().enumerate() {
        let mut stream = analyzer.token_stream("body", text).unwrap();
        let mut counts: HashMap<String, u32> = HashMap::new();
        for token in collect_tokens(&mut stream).unwrap() {
            *counts.entry(token.text).or_default() += 1;
        }
        for (term, freq) in counts {
            expected.entry(term).or_default().push((doc as u32, freq));
        }
    }

    let reader = open_only_segment(&writer);
    assert_eq!(reader.num_terms(), expected.len() as u64);
    for (term, mut postings) in expected {
        postings.sort_unstable();
        let term = Term::new("body", term);
        assert_eq!(reader.term_docs(&term).unwrap(), postings, "{term:?}");
        assert_eq!(reader.doc_freq(&term).unwrap(), postings.len() as u32);
    }

    let mut terms = reader.terms().unwrap();
    let mut previous = String::new();
    while terms.next().unwrap() {
        let text = String::from_utf16(terms.text()).unwrap();
        assert!(previous < text);
        previous = text;
    }
}

#[test]
fn test_stored_fields_round_trip() {
    let dir = Arc::new(RamDirectory::new());
    let writer = IndexWriter::open(dir.clone(), whitespace_config()).unwrap();
    let values = ["", "plain value", "ünïcödé ✓ 𝄞", ""];
    for (i, value) in values.iter().enumerate() {
        writer
            .add_document(
                Document::new()
                    .with_field(Field::keyword("id", doc_key(i)))
                    .with_field(Field::text("title", *value))
                    .with_field(Field::binary("blob", vec![i as u8; i])),
            )
            .unwrap();
    }
    writer.flush().unwrap();

    let mut reader = open_only_segment(&writer);
    let title = reader.field_infos().number("title").unwrap();
    let blob = reader.field_infos().number("blob").unwrap();
    for (i, value) in values.iter().enumerate() {
        let fields = reader.document(i as u32).unwrap();
        assert_eq!(fields.len(), 3);
        let stored_title = fields.iter().find(|f| f.number == title).unwrap();
        assert_eq!(stored_title.value, StoredValue::Text(value.to_string()));
        assert!(stored_title.tokenized);
        let stored_blob = fields.iter().find(|f| f.number == blob).unwrap();
        assert_eq!(stored_blob.value, StoredValue::Binary(vec![i as u8; i]));
    }
}

#[test]
fn test_repeated_delete_term_is_buffered_once() {
    let dir = Arc::new(RamDirectory::new());
    let writer = IndexWriter::open(dir.clone(), whitespace_config()).unwrap();
    let doc = |text: &str| Document::new().with_field(Field::text("body", text));
    writer.add_document(doc("red")).unwrap();
    writer.delete_documents(Term::new("body", "red")).unwrap();
    writer.add_document(doc("red")).unwrap();
    writer.delete_documents(Term::new("body", "red")).unwrap();
    writer.add_document(doc("red")).unwrap();

    let stats = writer.stats();
    assert_eq!(stats.num_buffered_delete_terms, 2);
    writer.flush().unwrap();

    // the second delete moved the boundary to cover the first two documents
    let segment = &writer.segments()[0];
    assert_eq!(segment.deleted.iter().collect::<Vec<_>>(), vec![0, 1]);
}

#[test]
fn test_positions_reset_per_document() {
    let dir = Arc::new(RamDirectory::new());
    let writer = IndexWriter::open(dir.clone(), whitespace_config()).unwrap();
    for _ in 0..3 {
        writer
            .add_document(Document::new().with_field(Field::text("body", "the quick fox")))
            .unwrap();
    }
    writer.flush().unwrap();

    let reader = open_only_segment(&writer);
    for (text, position) in [("the", 0), ("quick", 1), ("fox", 2)] {
        let term = Term::new("body", text);
        assert_eq!(reader.doc_freq(&term).unwrap(), 3);
        let postings = reader.postings(&term).unwrap();
        assert_eq!(postings.len(), 3);
        for (doc, posting) in postings.iter().enumerate() {
            assert_eq!(posting.doc, doc as u32);
            assert_eq!(posting.freq, 1);
            assert_eq!(posting.positions, vec![position]);
        }
    }
}

#[test]
fn test_immense_term_is_skipped_with_warning() {
    let dir = Arc::new(RamDirectory::new());
    let writer = IndexWriter::open(dir.clone(), whitespace_config()).unwrap();
    let immense = "x".repeat(20_000);
    writer
        .add_document(
            Document::new().with_field(Field::text("body", format!("before {immense} after"))),
        )
        .unwrap();
    writer.flush().unwrap();

    let warnings = writer.take_warnings();
    assert_eq!(warnings.len(), 1);
    assert!(matches!(
        &warnings[0],
        IndexingWarning::ImmenseTerm { field, prefix } if field == "body" && prefix.starts_with("xxx")
    ));

    let reader = open_only_segment(&writer);
    assert_eq!(reader.num_live_docs(), 1);
    assert_eq!(reader.num_terms(), 2);
    assert_eq!(reader.doc_freq(&Term::new("body", immense)).unwrap(), 0);
    let after = reader.postings(&Term::new("body", "after")).unwrap();
    assert_eq!(after[0].positions, vec![2]);
}

#[test]
fn test_deleted_postings_stay_in_segment_files() {
    let dir = Arc::new(RamDirectory::new());
    let writer = IndexWriter::open(dir.clone(), whitespace_config()).unwrap();
    for text in ["the fox", "a fox jumps", "no match"] {
        writer
            .add_document(Document::new().with_field(Field::text("body", text)))
            .unwrap();
    }
    writer.delete_documents(Term::new("body", "fox")).unwrap();
    writer.flush().unwrap();

    let segment = writer.segments()[0].clone();
    assert_eq!(segment.deleted.iter().collect::<Vec<_>>(), vec![0, 1]);
    assert_eq!(segment.num_live_docs(), 1);

    let on_disk = read_deleted_docs(dir.as_ref(), "_0_1.del").unwrap();
    assert_eq!(on_disk, segment.deleted);

    let reader = SegmentReader::open(dir.as_ref(), &segment).unwrap();
    let fox = Term::new("body", "fox");
    assert_eq!(reader.doc_freq(&fox).unwrap(), 2);
    assert_eq!(reader.term_docs(&fox).unwrap(), vec![(0, 1), (1, 1)]);
    assert!(reader.is_deleted(0) && reader.is_deleted(1) && !reader.is_deleted(2));
}

#[test]
fn test_ram_budget_triggers_flushes() {
    let dir = Arc::new(RamDirectory::new());
    let config = whitespace_config().with_ram_buffer_size_mb(Some(0.25));
    let limit = config.ram_buffer_size_bytes().unwrap();
    let writer = IndexWriter::open(dir.clone(), config).unwrap();

    let mut generator = TextGenerator::new(3, 5_000);
    let mut max_allocated = 0;
    for i in 0..4_000 {
        let body = Field::new(
            "body",
            FieldValue::Text(generator.text(60)),
            Store::No,
            Index::Tokenized,
            TermVector::No,
        )
        .unwrap();
        writer
            .add_document(
                Document::new()
                    .with_field(Field::keyword("id", doc_key(i)))
                    .with_field(body),
            )
            .unwrap();
        max_allocated = max_allocated.max(writer.ram_bytes_allocated());
    }
    writer.close().unwrap();

    let segments = writer.segments();
    assert!(segments.len() > 1, "{} segments", segments.len());
    assert_eq!(segments.iter().map(|s| s.doc_count).sum::<u32>(), 4_000);
    let bound = (limit as f64 * 1.05) as u64 + 4 * BYTE_BLOCK_SIZE as u64;
    assert!(max_allocated <= bound, "{max_allocated} > {bound}");
}

#[test]
fn test_norms_and_vectors_written() {
    let dir = Arc::new(RamDirectory::new());
    let writer = IndexWriter::open(dir.clone(), whitespace_config()).unwrap();
    writer
        .add_document(Document::new().with_field(Field::text("title", "no vectors here")))
        .unwrap();
    let body = Field::text("body", "to be or not to be")
        .with_term_vector(TermVector::WithPositionsOffsets)
        .unwrap();
    writer
        .add_document(Document::new().with_field(body).with_boost(2.0))
        .unwrap();
    writer.flush().unwrap();

    let mut reader = open_only_segment(&writer);
    assert!(reader.field_infos().has_vectors());
    assert!(reader.term_vectors(0).unwrap().is_empty());
    let vectors = reader.term_vectors(1).unwrap();
    assert_eq!(vectors.len(), 1);
    let be = vectors[0].terms.iter().find(|t| t.text == "be").unwrap();
    assert_eq!(be.freq, 2);
    assert_eq!(be.positions, vec![1, 5]);
    assert_eq!(be.offsets, vec![(3, 5), (16, 18)]);

    let title_norms = reader.norms("title").unwrap().unwrap();
    assert_eq!(title_norms.len(), 2);
    assert_eq!(title_norms[1], verba_index::norms::DEFAULT_NORM);
    let body_norms = reader.norms("body").unwrap().unwrap();
    assert_eq!(body_norms[0], verba_index::norms::DEFAULT_NORM);
    let expected = verba_index::norms::encode_norm(2.0 / 6f32.sqrt());
    assert_eq!(body_norms[1], expected);
    assert!(dir.file_exists("_0.tvf").unwrap());
}

#[test]
fn test_delete_only_flush_returns_ram() {
    let dir = Arc::new(RamDirectory::new());
    let config = whitespace_config().with_ram_buffer_size_mb(Some(0.01));
    let writer = IndexWriter::open(dir.clone(), config).unwrap();
    writer
        .add_document(Document::new().with_field(Field::keyword("id", doc_key(0))))
        .unwrap();
    writer.flush().unwrap();
    let baseline = writer.ram_bytes_used();

    for i in 0..20 {
        writer.delete_documents(Term::new("id", doc_key(i))).unwrap();
    }
    assert!(writer.ram_bytes_used() > baseline);
    assert_eq!(writer.num_buffered_delete_terms(), 20);
    writer.flush().unwrap();
    assert_eq!(writer.ram_bytes_used(), baseline);
    assert_eq!(writer.segments().len(), 1);
    assert_eq!(writer.num_docs(), 0);

    // still buffered, so the delete did not request another flush
    writer.delete_documents(Term::new("id", doc_key(100))).unwrap();
    assert_eq!(writer.num_buffered_delete_terms(), 1);
}
