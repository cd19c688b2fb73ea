use criterion::{black_box, criterion_group, criterion_main, Criterion};
use scriptorium_parser::{to_marker_text, to_perf, tokenize, MarkerTable, SourceContext};

fn chapter_source(chapters: usize) -> String {
    let mut source = String::from("\\id PSA Psalms\n");
    for c in 1..=chapters {
        source.push_str(&format!("\\c {c}\n"));
        for v in 1..=20 {
            source.push_str("\\p\n");
            source.push_str(&format!(
                "\\v {v} The word endures \\add for ever\\add* and ever\\f + \\fr {c}:{v} \\ft a short note\\f*\n"
            ));
        }
    }
    source
}

fn parse_single_chapter(c: &mut Criterion) {
    let source = chapter_source(1);
    let table = MarkerTable::standard().unwrap();
    let context = SourceContext::new("local", "local", "en", "bench");

    c.bench_function("parse_single_chapter", |b| {
        b.iter(|| to_perf(black_box(&source), &context, &table))
    });
}

fn parse_whole_book(c: &mut Criterion) {
    let source = chapter_source(50);
    let table = MarkerTable::standard().unwrap();
    let context = SourceContext::new("local", "local", "en", "bench");

    c.bench_function("parse_whole_book_50_chapters", |b| {
        b.iter(|| to_perf(black_box(&source), &context, &table))
    });
}

fn round_trip_book(c: &mut Criterion) {
    let source = chapter_source(10);
    let table = MarkerTable::standard().unwrap();
    let context = SourceContext::new("local", "local", "en", "bench");

    c.bench_function("round_trip_10_chapters", |b| {
        b.iter(|| {
            let doc = to_perf(black_box(&source), &context, &table).unwrap();
            to_marker_text(&doc)
        })
    });
}

fn tokenize_only(c: &mut Criterion) {
    let source = chapter_source(10);

    c.bench_function("tokenize_only", |b| b.iter(|| tokenize(black_box(&source))));
}

criterion_group!(
    benches,
    parse_single_chapter,
    parse_whole_book,
    round_trip_book,
    tokenize_only
);
criterion_main!(benches);
