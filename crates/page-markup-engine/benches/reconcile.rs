use criterion::{Criterion, criterion_group, criterion_main};
use page_markup_engine::{
    Event, LayoutMetrics, MarkupStore, Page, Session, Viewport, layout_page,
};
mod common;

const URL: &str = "https://example.com/bench";

fn bench_render_passes(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile");
    group.sample_size(10);

    let html = common::generate_article_html(200);
    let base = Page::from_html(&html).unwrap();
    let mut store = common::seeded_store(&base, URL, 50);

    group.bench_function("initial_pass", |b| {
        b.iter(|| {
            let mut page = base.clone();
            let mut session = Session::new(URL);
            session.start(&mut page);
            session.pump(&mut page, &mut store, 0);
            std::hint::black_box(session.last_stats());
        });
    });

    group.bench_function("steady_state_pass", |b| {
        let mut page = base.clone();
        let mut session = Session::new(URL);
        session.start(&mut page);
        session.pump(&mut page, &mut store, 0);
        let mut now = 0u64;
        b.iter(|| {
            now += 1000;
            session.handle_event(Event::Loaded, now);
            session.pump(std::hint::black_box(&mut page), &mut store, now);
        });
    });

    group.finish();
}

fn bench_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolution");
    group.sample_size(10);

    let html = common::generate_article_html(200);
    let page = Page::from_html(&html).unwrap();
    let store = common::seeded_store(&page, URL, 50);
    let markups = store.load(URL).unwrap().unwrap();

    group.bench_function("layout_page", |b| {
        let metrics = LayoutMetrics::default();
        let viewport = Viewport::default();
        b.iter(|| {
            std::hint::black_box(layout_page(&page, &metrics, &viewport));
        });
    });

    group.bench_function("decode_anchors", |b| {
        b.iter(|| {
            for markup in markups.iter() {
                if let Some(anchor) = markup.anchor.as_range() {
                    std::hint::black_box(anchor.decode(&page));
                }
            }
        });
    });

    group.finish();
}

criterion_group!(benches, bench_render_passes, bench_resolution);
criterion_main!(benches);
