use mixer_core::importer::{load_all, LoadPaths};
use mixer_core::inverted::{build_index, DOCUMENTS};
use mixer_core::mapreduce::JobConfig;
use mixer_core::pagerank::{read_ranks, run_pagerank, PageRankConfig};
use mixer_core::persist::{load_meta, write_lines};
use mixer_core::search::{search, JsonlPageSource, MixerSearcher, ScoringConfig, Searcher};
use mixer_core::IndexStore;
use tempfile::tempdir;

const DATA: [&str; 3] = [
    r#"{"id":0,"title":"Cats","content":"cats purr and chase mice","categories":["Pets"],"lastModified":"2021-03-04T05:06:07Z"}"#,
    r#"{"id":1,"title":"Dogs","content":"dogs bark at cats","categories":["Pets"]}"#,
    r#"{"id":2,"title":"Fish","content":"fish swim in water","categories":["Pets"]}"#,
];

#[test]
fn corpus_to_ranked_results() {
    let dir = tempdir().unwrap();
    let root = dir.path();
    let data = root.join("data.json");
    write_lines(&data, DATA).unwrap();
    let index = root.join("index.json");
    write_lines(&index, [
        r#"{"id":0,"title":"Cats"}"#,
        r#"{"id":1,"title":"Dogs"}"#,
        r#"{"id":2,"title":"Fish"}"#,
    ])
    .unwrap();
    // Pages without outlinks are not exported to the link file; the corpus
    // index still makes them nodes.
    let links = root.join("link.json");
    write_lines(&links, [r#"{"id":0,"links":[1]}"#, r#"{"id":1,"links":[0,2]}"#]).unwrap();

    let job = JobConfig { map_tasks: 2, reduce_tasks: 3 };
    let postings = root.join("postings");
    let built = build_index(&data, &postings, &job).unwrap();
    assert_eq!(built.counters.get(DOCUMENTS), 3);
    assert_eq!(load_meta(&postings).unwrap().counters[DOCUMENTS], 3);

    let pr = run_pagerank(&links, Some(&index), &root.join("pagerank"), &PageRankConfig { job: job.clone(), ..Default::default() })
        .unwrap();
    assert!(pr.converged);
    assert_eq!((pr.documents, pr.dangling, pr.dropped_links), (3, 1, 0));
    let ranks = read_ranks(&pr.output).unwrap();
    assert_eq!(ranks.len(), 3);
    assert!(ranks[&0] > ranks[&2], "{ranks:?}");
    assert!(ranks[&1] > ranks[&2], "{ranks:?}");

    let store = IndexStore::open(root.join("db")).unwrap();
    let report = load_all(
        &store,
        &LoadPaths { data: data.clone(), index, postings, pagerank: pr.output.clone() },
    )
    .unwrap();
    assert!(report.is_complete(), "{:?}", report.failed());

    for doc in 0..3 {
        assert_eq!(store.page_rank(doc), Some(ranks[&doc]));
    }

    let searcher = MixerSearcher::new(store.clone(), ScoringConfig::default(), true).unwrap();
    assert_eq!(searcher.stats().doc_count, 3.0);
    let outcome = searcher.search_internal("cats", "");
    assert_eq!(outcome.ranked.iter().map(|d| d.doc_id).collect::<Vec<_>>(), vec![0]);

    let pages = JsonlPageSource::load(&data).unwrap();
    let results = search(&searcher, &pages, "Cats category:pets", 1, "https://en.wikipedia.org/wiki/");
    assert_eq!((results.hits, results.page_no, results.total_pages), (1, Some(1), Some(1)));
    let entry = &results.pages.as_ref().unwrap()[0];
    assert_eq!(entry.title, "<b>Cats</b>");
    assert_eq!(entry.url, "https://en.wikipedia.org/wiki/Cats");
    assert_eq!(entry.categories.html, vec!["<b>Pets</b>"]);
    assert_eq!(entry.last_modify, "2021-03-04T05:06:07Z");
    assert!(entry.score.contains("Normalized PageRank"));

    let filtered = search(&searcher, &pages, "dogs category:birds", 1, "/");
    assert_eq!(filtered.hits, 0);
    assert!(filtered.pages.is_none());
}
