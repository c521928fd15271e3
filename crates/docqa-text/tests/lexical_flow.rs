use docqa_core::traits::KeywordIndexer;
use docqa_core::types::{Chunk, SourceKind};
use docqa_text::LexicalIndex;

fn corpus() -> Vec<Chunk> {
    vec![
        Chunk::new(1, 1, 0, 0, "Alpha is the first test concept."),
        Chunk::new(2, 1, 0, 1, "Beta follows after Alpha."),
        Chunk::new(1, 2, 3, 0, "Gamma rays and firecraft notes."),
        Chunk::new(2, 2, 3, 1, "Networking basics for the computer lab."),
    ]
}

#[test]
fn ranks_by_keyword_relevance() {
    let index = LexicalIndex::new().expect("index");
    assert_eq!(index.add(&corpus()), 4);

    let hits = index.search("What is Alpha?", 10, &[]);
    assert_eq!(hits.len(), 2, "only chunks sharing a query term score");
    assert!(hits.iter().all(|h| h.source == SourceKind::Keyword && h.chunk.document_id == 1));
    assert_eq!(hits[0].chunk.id, 1, "the chunk also matching 'is' ranks first");
    assert!(hits[0].score > hits[1].score);
}

#[test]
fn filter_restricts_documents() {
    let index = LexicalIndex::new().expect("index");
    index.add(&corpus());
    for q in ["alpha", "firecraft", "networking computer", "the"] {
        let hits = index.search(q, 10, &[2]);
        assert!(hits.iter().all(|h| h.chunk.document_id == 2), "query {q} leaked another document");
    }
    assert!(index.search("alpha", 10, &[2]).is_empty());
}

#[test]
fn top_k_bounds_results() {
    let index = LexicalIndex::new().expect("index");
    let chunks: Vec<Chunk> = (0..20).map(|i| Chunk::new(i, 1, 0, i as u32, format!("common term {i}"))).collect();
    index.add(&chunks);
    assert_eq!(index.search("common", 7, &[]).len(), 7);
}

#[test]
fn trait_object_delete_and_reset() {
    let index: Box<dyn KeywordIndexer> = Box::new(LexicalIndex::new().expect("index"));
    index.add(&corpus()).expect("add");
    assert_eq!(index.delete_document(1), 2);
    assert_eq!(index.len(), 2);
    assert!(index.search("alpha", 5, &[]).expect("search").is_empty());
    index.reset();
    assert!(index.is_empty());
    assert!(index.search("gamma", 5, &[]).expect("search").is_empty());
}
