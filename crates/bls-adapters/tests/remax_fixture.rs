use std::fs;
use std::path::{Path, PathBuf};

use bls_adapters::{next_page_href, strategy_for_source, PageDoc};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .canonicalize()
        .expect("workspace root")
}

fn remax_listing_page() -> PageDoc {
    let path = workspace_root().join("fixtures/remax/sample/listing.html");
    let markup = fs::read_to_string(&path).expect("read fixture");
    PageDoc::parse(&markup)
}

#[test]
fn finds_only_candidates_with_detail_links() {
    let page = remax_listing_page();
    let strategy = strategy_for_source("remax");
    // The contact teaser matches the item selectors but has no detail link.
    assert_eq!(strategy.find_items(&page).len(), 2);
}

#[test]
fn extracts_all_fields_from_a_complete_item() {
    let page = remax_listing_page();
    let strategy = strategy_for_source("remax");
    let items = strategy.find_items(&page);

    let item = strategy.parse(&page, items[0]);
    assert_eq!(item.title, "Prodej bytu 2+kk 54 m², Praha 4");
    assert_eq!(item.link_href, "/reality/detail/123456/prodej-bytu-2-kk-54-m2-praha");
    assert_eq!(
        item.img_url.as_deref(),
        Some("https://img.portal.example/123456/main.jpg"),
        "lazy-load data-src wins over the placeholder src"
    );
    assert_eq!(item.price, 4_990_000);
    assert_eq!(item.description, "Světlý byt po rekonstrukci s lodžií a sklepem.");
    assert_eq!(item.location, "Praha 4 - Nusle");
}

#[test]
fn title_falls_back_to_detail_link_text() {
    let page = remax_listing_page();
    let strategy = strategy_for_source("remax");
    let items = strategy.find_items(&page);

    let item = strategy.parse(&page, items[1]);
    assert_eq!(item.title, "Prodej rodinného domu 5+1, Brno");
    assert_eq!(item.price, 0, "price-on-request text carries no digits");
    assert_eq!(
        item.img_url.as_deref(),
        Some("https://img.portal.example/654321/main.jpg")
    );
    assert_eq!(item.description, "");
    assert_eq!(item.location, "Brno - Židenice");
}

#[test]
fn discovers_the_next_page_link() {
    let page = remax_listing_page();
    assert_eq!(next_page_href(&page).as_deref(), Some("?stranka=2"));
}
