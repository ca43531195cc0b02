use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use uuid::Uuid;

use ragline::config::RetrievalDefaults;
use ragline::models::{Budgets, ChunkKind, RetrievedChunk};
use ragline::services::indexing::chunking::{chunk_markdown, ChunkingConfig};
use ragline::services::retrieval_orchestrator::{budget_trim, clean_prompt};
use ragline::services::tokenizer::{count_tokens, truncate_to_tokens};

fn sample_chunk(tokens: i32, chars: usize) -> RetrievedChunk {
    RetrievedChunk {
        chunk_id: Uuid::new_v4(),
        document_id: "doc-1".to_string(),
        datasource_id: "ds-1".to_string(),
        kind: ChunkKind::Chunk,
        text: "word ".repeat(chars / 5),
        token_count: tokens,
        lexical_rank: Some(0.4),
        similarity: Some(0.8),
        rerank_score: Some(0.9),
        metadata: None,
    }
}

// ---- retrieval_orchestrator benchmarks ----

fn bench_clean_prompt(c: &mut Criterion) {
    let prompt = "Hey #team \u{1F44B} can you *check* the `status` [here](link) for me? \u{1F680}";
    c.bench_function("clean_prompt", |b| b.iter(|| clean_prompt(black_box(prompt))));
}

fn bench_budget_trim(c: &mut Criterion) {
    let mut group = c.benchmark_group("budget_trim");
    let defaults = RetrievalDefaults {
        max_tokens: 8192,
        max_chunks: None,
        max_chars: None,
        semantic_always: false,
    };
    for size in [10usize, 50, 200].iter() {
        let chunks: Vec<RetrievedChunk> = (0..*size).map(|_| sample_chunk(400, 1500)).collect();
        group.bench_with_input(BenchmarkId::from_parameter(size), &chunks, |b, chunks| {
            b.iter(|| budget_trim(black_box(chunks.clone()), Budgets::default(), black_box(&defaults)))
        });
    }
    group.finish();
}

// ---- tokenizer benchmarks ----

fn bench_count_tokens(c: &mut Criterion) {
    let mut group = c.benchmark_group("count_tokens");
    for words in [10usize, 100, 1000].iter() {
        let text = "word ".repeat(*words);
        group.bench_with_input(BenchmarkId::from_parameter(words), &text, |b, text| {
            b.iter(|| count_tokens(black_box(text)))
        });
    }
    group.finish();
}

fn bench_truncate_to_tokens(c: &mut Criterion) {
    let text = "word ".repeat(5000);
    c.bench_function("truncate_to_tokens_5000w_to_200", |b| {
        b.iter(|| truncate_to_tokens(black_box(&text), black_box(200)))
    });
}

// ---- chunking benchmarks ----

fn bench_chunk_markdown(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunk_markdown");
    let config = ChunkingConfig::default();
    let paragraph = "This is one sentence with several words in it. ";
    for sections in [1usize, 5, 20].iter() {
        let markdown: String = (0..*sections)
            .map(|i| format!("# Section {i}\n{}\n", paragraph.repeat(30)))
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(sections), &markdown, |b, markdown| {
            b.iter(|| chunk_markdown(black_box(markdown), black_box(&config)))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_clean_prompt,
    bench_budget_trim,
    bench_count_tokens,
    bench_truncate_to_tokens,
    bench_chunk_markdown,
);
criterion_main!(benches);
