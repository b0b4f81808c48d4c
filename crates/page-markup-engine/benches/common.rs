use page_markup_engine::{
    Anchor, Boundary, Markup, MarkupKind, MarkupStore, MemoryStore, Page, RangeAnchor, TextRange,
};

// Benchmark helper functions - Rust's dead code analysis doesn't understand
// that these are used by benchmark files in the same directory
// See: https://users.rust-lang.org/t/cargo-rustc-benches-awarnings/110111/2
#[allow(dead_code)]
pub fn generate_article_html(paragraphs: usize) -> String {
    let mut html = String::from("<div id=\"article\"><h1>Generated article</h1>");
    for i in 0..paragraphs {
        html.push_str(&format!(
            "<p>Paragraph {i} carries sentence alpha, sentence beta and a <b>bold run</b> \
             followed by sentence gamma for measurement.</p>"
        ));
    }
    html.push_str("</div>");
    html
}

/// Anchor a text markup over "sentence beta" in every paragraph until
/// `count` markups exist, alternating highlights and underlines.
#[allow(dead_code)]
pub fn seeded_store(page: &Page, url: &str, count: usize) -> MemoryStore {
    let needle = "sentence beta";
    let article = page.element_by_id("article").unwrap();
    let mut markups = Vec::new();
    for &child in page.children(article) {
        if markups.len() == count {
            break;
        }
        if page.tag(child) != Some("p") {
            continue;
        }
        let text_node = page.children(child)[0];
        let at = page.text(text_node).unwrap().find(needle).unwrap();
        let range = TextRange::new(
            Boundary::new(text_node, at),
            Boundary::new(text_node, at + needle.len()),
        );
        let i = markups.len();
        markups.push(Markup {
            id: format!("markup-bench-{i}").into(),
            kind: if i % 2 == 0 {
                MarkupKind::Highlight
            } else {
                MarkupKind::Underline
            },
            text: needle.to_string(),
            anchor: Anchor::Range(RangeAnchor::encode(page, &range).unwrap()),
            color: None,
        });
    }
    let mut store = MemoryStore::new();
    store.save(url, &markups.into()).unwrap();
    store
}
