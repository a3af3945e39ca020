use std::hint::black_box;

use core_layout::{
    ContentEdit, IncrementalLayoutEngine, LayoutContext, LayoutMetrics, LineMetricsTable,
};
use core_text::{Document, LineProperties, WrapBreaker, WrapConstraints};
use criterion::{Criterion, criterion_group, criterion_main};

fn sample_text() -> String {
    let para = "The quick brown fox jumps over the lazy dog while the cat watches. ";
    let mut s = String::new();
    for i in 0..2_000 {
        s.push_str(&para.repeat(1 + i % 4));
        s.push('\n');
    }
    s
}

fn bench_layout(c: &mut Criterion) {
    let text = sample_text();
    let breaker = WrapBreaker::default();
    let constraints = WrapConstraints::uniform(60.0);
    let props = LineProperties::default();
    let metrics = LayoutMetrics::default();

    let base = Document::from_str("bench", &text).expect("document");
    let mut laid_out = LineMetricsTable::new();
    {
        let ctx = LayoutContext {
            text: &base,
            breaker: &breaker,
            constraints: &constraints,
            props: &props,
            metrics: &metrics,
        };
        IncrementalLayoutEngine::full_relayout(&ctx, &mut laid_out).expect("layout");
    }

    let mut edited = base.clone();
    let at = text.len() / 2;
    let change = edited.insert(at, "inserted words ");

    c.bench_function("full_relayout", |b| {
        let ctx = LayoutContext {
            text: &edited,
            breaker: &breaker,
            constraints: &constraints,
            props: &props,
            metrics: &metrics,
        };
        b.iter(|| {
            let mut table = LineMetricsTable::new();
            IncrementalLayoutEngine::full_relayout(&ctx, &mut table).expect("layout");
            black_box(table.len())
        })
    });

    c.bench_function("incremental_insert_mid_document", |b| {
        let ctx = LayoutContext {
            text: &edited,
            breaker: &breaker,
            constraints: &constraints,
            props: &props,
            metrics: &metrics,
        };
        b.iter(|| {
            let mut table = laid_out.clone();
            let changes = IncrementalLayoutEngine::apply_content_edit(
                &ctx,
                &mut table,
                ContentEdit::from(change),
            )
            .expect("incremental");
            black_box(changes.inserted)
        })
    });
}

criterion_group!(benches, bench_layout);
criterion_main!(benches);
