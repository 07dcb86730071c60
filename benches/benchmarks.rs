//! Performance benchmarks for sift
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sift::config::SiftConfig;
use sift::posterior::{Importance, PosteriorEngine, Prior};
use sift::query::scorer::{bm25, idf};
use sift::query::{expand_tree, normalize, parse_query};
use sift::session::Session;
use sift::source::{DocId, FastMap, MemorySource};

/// In-memory corpus of generated source-like documents
fn benchmark_corpus(docs: usize) -> MemorySource {
    let texts: Vec<(String, String)> = (0..docs)
        .map(|i| {
            let content = format!(
                r#"// File {i}
fn parse_query_{i}(input: &str) -> QueryNode {{
    let tokens = tokenize(input);
    // parseQuery handles {i} statements
    QueryParser::new(tokens).parse()
}}

struct Scorer{i} {{
    field: i32,
}}
"#,
                i = i
            );
            (format!("doc_{:04}", i), content)
        })
        .collect();
    MemorySource::from_texts("bench", texts)
}

fn bench_query_parsing(c: &mut Criterion) {
    let queries = vec![
        "simple",
        "two words",
        "\"exact phrase\"",
        "+must -exclude !not",
        "(fox bear)~ boost^2",
        "#regex\\d+ plain^",
        "parseQuery (token stream) -\"dead code\" +scorer^1.5",
    ];

    let mut group = c.benchmark_group("query_parsing");
    for query in queries {
        group.bench_with_input(BenchmarkId::from_parameter(query), &query, |b, &q| {
            b.iter(|| parse_query(black_box(q)))
        });
    }
    group.finish();
}

fn bench_expansion(c: &mut Criterion) {
    let tree = parse_query("getUserById HTTPResponseCode some_function_call").unwrap();
    c.bench_function("term_expansion", |b| {
        b.iter(|| expand_tree(black_box(&tree), true))
    });
}

fn bench_scoring(c: &mut Criterion) {
    let weight = idf(10_000, 120);
    c.bench_function("bm25_single", |b| {
        b.iter(|| bm25(black_box(7.0), black_box(1_800.0), 2_000.0, weight))
    });

    let scores = (0..10_000)
        .map(|i| (DocId::from(format!("d{}", i)), (i % 97) as f64 * 0.3))
        .collect::<FastMap<_, _>>();
    c.bench_function("normalize_10k", |b| b.iter(|| normalize(black_box(&scores))));
}

fn bench_posterior(c: &mut Criterion) {
    let candidates: Vec<DocId> = (0..10_000).map(|i| DocId::from(format!("d{}", i))).collect();
    let mut engine = PosteriorEngine::new(&SiftConfig::default().posterior);
    for (name, importance) in [("query", Importance::Medium), ("recent", Importance::High)] {
        let scores = candidates
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), (i % 100) as f64 / 100.0))
            .collect();
        if let Ok(prior) = Prior::new(name, scores) {
            engine.add_prior(prior.with_importance(importance));
        }
    }

    let mut group = c.benchmark_group("posterior");
    group.bench_function("first_page_10k", |b| {
        b.iter(|| {
            engine.invalidate();
            engine.rank(black_box(&candidates), 10).page(0, 10).len()
        })
    });
    group.bench_function("later_page_10k", |b| {
        b.iter(|| {
            engine.invalidate();
            engine.rank(black_box(&candidates), 10).page(5, 10).len()
        })
    });
    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let mut session = Session::new(SiftConfig::default()).with_source(benchmark_corpus(500));

    let mut group = c.benchmark_group("search");
    for query in ["parseQuery", "+tokenize -Scorer42", "(tokens parse)~"] {
        group.bench_with_input(BenchmarkId::from_parameter(query), &query, |b, &q| {
            b.iter(|| session.search(black_box(q), 0))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_query_parsing,
    bench_expansion,
    bench_scoring,
    bench_posterior,
    bench_search,
);

criterion_main!(benches);
