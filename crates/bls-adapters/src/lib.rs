//! Portal parsing strategies + the narrow HTML query layer they run on.

use scraper::{ElementRef, Html, Selector};
use tracing::warn;
use url::Url;

pub const CRATE_NAME: &str = "bls-adapters";

/// Parsed page wrapper. Strategies only ever see `select` plus the element
/// helpers below, so the underlying query engine stays swappable and the
/// strategies stay unit-testable on fixture markup.
pub struct PageDoc {
    html: Html,
}

impl PageDoc {
    pub fn parse(markup: &str) -> Self {
        Self {
            html: Html::parse_document(markup),
        }
    }

    pub fn select(&self, selector: &str) -> Vec<ElementRef<'_>> {
        match compile(selector) {
            Some(sel) => self.html.select(&sel).collect(),
            None => Vec::new(),
        }
    }
}

fn compile(selector: &str) -> Option<Selector> {
    match Selector::parse(selector) {
        Ok(sel) => Some(sel),
        Err(err) => {
            warn!(selector, %err, "invalid selector");
            None
        }
    }
}

pub fn select_within<'a>(scope: ElementRef<'a>, selector: &str) -> Vec<ElementRef<'a>> {
    match compile(selector) {
        Some(sel) => scope.select(&sel).collect(),
        None => Vec::new(),
    }
}

/// Trimmed text of the first descendant matching `selector`, or empty.
pub fn first_text(scope: ElementRef<'_>, selector: &str) -> String {
    select_within(scope, selector)
        .first()
        .map(|el| element_text(*el))
        .unwrap_or_default()
}

pub fn first_attr(scope: ElementRef<'_>, selector: &str, attr: &str) -> Option<String> {
    select_within(scope, selector)
        .first()
        .and_then(|el| el.value().attr(attr))
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

pub fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Unvalidated draft extracted from one candidate element. Extraction is
/// best-effort: absent sub-elements become empty fields, never errors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawItem {
    pub title: String,
    pub link_href: String,
    pub img_url: Option<String>,
    pub price: i64,
    pub description: String,
    pub location: String,
}

/// A named pair of pure functions: locate candidate listing elements on a
/// page, then extract fields from one candidate.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn find_items<'a>(&self, page: &'a PageDoc) -> Vec<ElementRef<'a>>;
    fn parse(&self, page: &PageDoc, el: ElementRef<'_>) -> RawItem;
}

const REMAX_ITEM_SELECTORS: &str =
    ".re-list__item, article, .listing-item, .property-item, .item, .col-md-6, .pl-items__item";
const REMAX_DETAIL_LINK: &str = r#"a[href*="/reality/detail/"]"#;
const REMAX_TITLE: &str = "h2, .re-list__title, .property-title";
const REMAX_PRICE: &str = ".re-list__price, .price, .property-price";
const REMAX_DESCRIPTION: &str = ".re-list__desc, .description";
const REMAX_LOCATION: &str = ".re-list__address, .address";

pub struct RemaxStrategy;

impl Strategy for RemaxStrategy {
    fn name(&self) -> &'static str {
        "remax"
    }

    fn find_items<'a>(&self, page: &'a PageDoc) -> Vec<ElementRef<'a>> {
        page.select(REMAX_ITEM_SELECTORS)
            .into_iter()
            .filter(|el| !select_within(*el, REMAX_DETAIL_LINK).is_empty())
            .collect()
    }

    fn parse(&self, _page: &PageDoc, el: ElementRef<'_>) -> RawItem {
        let mut title = first_text(el, REMAX_TITLE);
        let link = select_within(el, REMAX_DETAIL_LINK).first().copied();
        let link_href = link
            .and_then(|a| a.value().attr("href"))
            .unwrap_or_default()
            .to_string();
        if title.is_empty() {
            if let Some(a) = link {
                title = element_text(a);
            }
        }

        // Lazy-loaded images keep the real URL in data-src.
        let img_url = first_attr(el, "img", "data-src").or_else(|| first_attr(el, "img", "src"));

        RawItem {
            title,
            link_href,
            img_url,
            price: parse_price(&first_text(el, REMAX_PRICE)),
            description: first_text(el, REMAX_DESCRIPTION),
            location: first_text(el, REMAX_LOCATION),
        }
    }
}

const UNIVERSAL_ITEM_SELECTORS: &str = ".listing, .property, .item, article";

pub struct UniversalStrategy;

impl Strategy for UniversalStrategy {
    fn name(&self) -> &'static str {
        "universal"
    }

    fn find_items<'a>(&self, page: &'a PageDoc) -> Vec<ElementRef<'a>> {
        page.select(UNIVERSAL_ITEM_SELECTORS)
            .into_iter()
            .filter(|el| !select_within(*el, "a").is_empty())
            .collect()
    }

    fn parse(&self, _page: &PageDoc, el: ElementRef<'_>) -> RawItem {
        let link = select_within(el, "a").first().copied();
        let mut title = link.map(element_text).unwrap_or_default();
        if title.is_empty() {
            title = el
                .text()
                .collect::<String>()
                .chars()
                .take(50)
                .collect::<String>()
                .trim()
                .to_string();
        }

        RawItem {
            title,
            link_href: link
                .and_then(|a| a.value().attr("href"))
                .unwrap_or_default()
                .to_string(),
            img_url: first_attr(el, "img", "src"),
            price: 0,
            description: String::new(),
            location: String::new(),
        }
    }
}

static REMAX: RemaxStrategy = RemaxStrategy;
static UNIVERSAL: UniversalStrategy = UniversalStrategy;

/// Strategy lookup by source label; unknown labels fall back to `universal`.
pub fn strategy_for_source(source: &str) -> &'static dyn Strategy {
    match source {
        "remax" => &REMAX,
        _ => &UNIVERSAL,
    }
}

/// Derives the source label for a scrape target: portal heuristic on the
/// URL host first, then the broker profile's own hint, then `universal`.
pub fn source_label(target_url: &str, profile_hint: Option<&str>) -> String {
    let host_hit = match Url::parse(target_url) {
        Ok(url) => url.host_str().is_some_and(|host| host.contains("remax")),
        Err(_) => target_url.contains("remax"),
    };
    if host_hit {
        return "remax".to_string();
    }
    match profile_hint {
        Some(hint) if !hint.is_empty() => hint.to_string(),
        _ => "universal".to_string(),
    }
}

/// Price text carries thousands separators and currency suffixes; strip
/// everything non-numeric and parse, defaulting to 0.
pub fn parse_price(text: &str) -> i64 {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    digits.parse().unwrap_or(0)
}

const NEXT_LINK_SELECTORS: &str = r#".pagination .next, .paging .next, a[rel="next"], .next"#;

/// Href of the conventional next-page link, if the page has one.
pub fn next_page_href(page: &PageDoc) -> Option<String> {
    page.select(NEXT_LINK_SELECTORS)
        .first()
        .and_then(|el| el.value().attr("href"))
        .filter(|href| !href.is_empty())
        .map(ToString::to_string)
}
