use std::{sync::Arc, thread};

use verba_index::{
    Document, Field, IndexWriter, IndexWriterConfig, SegmentReader, StoredValue, Term,
};
use verba_io::RamDirectory;
use verba_testkit::{
    analyzers::{BlockingAnalyzer, Gate},
    data_gen::{TextGenerator, doc_key},
};

fn stored_ids(reader: &mut SegmentReader) -> Vec<String> {
    let id = reader.field_infos().number("id").unwrap();
    (0..reader.doc_count())
        .map(|doc| {
            let fields = reader.document(doc).unwrap();
            match &fields.iter().find(|f| f.number == id).unwrap().value {
                StoredValue::Text(text) => text.clone(),
                StoredValue::Binary(_) => panic!("binary id"),
            }
        })
        .collect()
}

#[test]
fn test_out_of_order_completion_keeps_doc_order() {
    let gate = Gate::new();
    let config = IndexWriterConfig::default()
        .with_analyzer(Arc::new(BlockingAnalyzer::new("slow", gate.clone())));
    let dir = Arc::new(RamDirectory::new());
    let writer = Arc::new(IndexWriter::open(dir.clone(), config).unwrap());

    let spawn_add = |id: &'static str, body: &'static str| {
        let writer = writer.clone();
        thread::spawn(move || {
            writer
                .add_document(
                    Document::new()
                        .with_field(Field::keyword("id", id))
                        .with_field(Field::text("body", body)),
                )
                .unwrap();
        })
    };

    let d1 = spawn_add("d1", "slow first");
    gate.wait_for_waiting(1);
    // d2 completes while d1 is still being analyzed
    spawn_add("d2", "fast second").join().unwrap();
    let d3 = spawn_add("d3", "slow third");
    gate.wait_for_waiting(2);
    assert_eq!(writer.num_docs_in_ram(), 3);

    gate.open();
    d1.join().unwrap();
    d3.join().unwrap();
    writer.flush().unwrap();

    let segment = writer.segments()[0].clone();
    let mut reader = SegmentReader::open(dir.as_ref(), &segment).unwrap();
    assert_eq!(stored_ids(&mut reader), vec!["d1", "d2", "d3"]);
    let second = reader.term_docs(&Term::new("body", "second")).unwrap();
    assert_eq!(second, vec![(1, 1)]);
}

#[test]
fn test_concurrent_indexing_with_flushes() {
    const THREADS: usize = 6;
    const DOCS_PER_THREAD: usize = 300;

    let dir = Arc::new(RamDirectory::new());
    let config = IndexWriterConfig::default().with_max_buffered_docs(Some(97));
    let writer = Arc::new(IndexWriter::open(dir.clone(), config).unwrap());

    let handles = (0..THREADS)
        .map(|t| {
            let writer = writer.clone();
            thread::spawn(move || {
                let mut generator = TextGenerator::new(t as u64, 500);
                for i in 0..DOCS_PER_THREAD {
                    let key = doc_key(t * DOCS_PER_THREAD + i);
                    writer
                        .add_document(
                            Document::new()
                                .with_field(Field::keyword("id", key))
                                .with_field(Field::text("body", generator.text(20))),
                        )
                        .unwrap();
                    if i % 50 == 49 {
                        writer
                            .delete_documents(Term::new("id", doc_key(t * DOCS_PER_THREAD + i)))
                            .unwrap();
                    }
                }
            })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        handle.join().unwrap();
    }
    writer.close().unwrap();

    let segments = writer.segments();
    let total = segments.iter().map(|s| s.doc_count).sum::<u32>();
    assert_eq!(total as usize, THREADS * DOCS_PER_THREAD);
    let deleted = segments.iter().map(|s| s.deleted.len()).sum::<u64>();
    assert_eq!(deleted as usize, THREADS * DOCS_PER_THREAD / 50);
    assert!(segments.iter().all(|s| s.doc_count <= 97));

    let mut seen = Vec::new();
    for segment in &segments {
        let mut reader = SegmentReader::open(dir.as_ref(), segment).unwrap();
        let ids = stored_ids(&mut reader);
        for (doc, id) in ids.iter().enumerate() {
            // every id is indexed under the doc it is stored with
            let postings = reader.term_docs(&Term::new("id", id.clone())).unwrap();
            assert_eq!(postings, vec![(doc as u32, 1)]);
        }
        seen.extend(ids);
    }
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), THREADS * DOCS_PER_THREAD);
}
