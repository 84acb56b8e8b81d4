//! Blog and cafe content surface.

use std::sync::Arc;
use std::time::Duration;

use adledger_browser::{DeviceProfile, FetchOptions, PageFetcher};
use adledger_core::{RankPlatform, ScrapingConfig};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

use crate::cascade::{fetch_and_parse, Strategy};
use crate::embedded::{json_document, str_field};
use crate::error::{ParseMiss, ParseResult};
use crate::item::{assign_ranks, ParsedItem, RankedItem, RankingSource};
use crate::query::build_surface_url;
use crate::snapshot::SnapshotWriter;
use crate::text::element_text;

static PRIMARY_ITEM: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("li.bx._svp_item, div.view_wrap").expect("view item selector is hardcoded and valid")
});
static PRIMARY_TITLE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("a.title_link, a.api_txt_lines.total_tit")
        .expect("view title selector is hardcoded and valid")
});
static PRIMARY_AUTHOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("a.name, a.sub_txt.sub_name").expect("view author selector is hardcoded and valid")
});
static FALLBACK_LINK: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"a[href*="blog.naver.com"], a[href*="cafe.naver.com"]"#)
        .expect("view link selector is hardcoded and valid")
});

/// Post permalink: host, author or cafe slug, numeric post id.
static POST_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https?://(?:m\.)?(blog|cafe)\.naver\.com/([A-Za-z0-9_.-]+)/(\d+)")
        .expect("post url regex is hardcoded and valid")
});

const CASCADE: [Strategy<ParsedItem>; 4] = [
    Strategy::new("view-json", parse_json),
    Strategy::new("view-dom-primary", parse_dom_primary),
    Strategy::new("view-dom-fallback", parse_dom_fallback),
    Strategy::new("view-text-urls", parse_text_urls),
];

/// Ranks blog and cafe posts in the content results for a keyword.
pub struct ViewScraper {
    fetcher: Arc<dyn PageFetcher>,
    url_template: String,
    scroll_steps: u32,
    render_wait: Duration,
    snapshots: SnapshotWriter,
}

impl ViewScraper {
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: &ScrapingConfig) -> Self {
        Self {
            fetcher,
            url_template: config.view_url.clone(),
            scroll_steps: config.scroll_steps,
            render_wait: Duration::from_millis(config.render_wait_ms),
            snapshots: SnapshotWriter::new(config.snapshot_dir.clone()),
        }
    }
}

#[async_trait::async_trait]
impl RankingSource for ViewScraper {
    fn platform(&self) -> RankPlatform {
        RankPlatform::View
    }

    async fn get_rankings(&self, keyword: &str) -> Vec<RankedItem> {
        let url = build_surface_url(&self.url_template, keyword);
        let options =
            FetchOptions::rendered(DeviceProfile::Desktop, self.scroll_steps, self.render_wait);
        fetch_and_parse(
            self.fetcher.as_ref(),
            &url,
            &options,
            &CASCADE,
            &self.snapshots,
            "view",
            keyword,
        )
        .await
        .map(assign_ranks)
        .unwrap_or_default()
    }
}

/// Canonical identity of a post: the permalink without query or fragment,
/// normalised to the desktop host.
fn canonical_post(url: &str) -> Option<(String, String)> {
    let caps = POST_URL.captures(url)?;
    let canonical = format!("https://{}.naver.com/{}/{}", &caps[1], &caps[2], &caps[3]);
    Some((canonical, caps[2].to_string()))
}

fn post_item(url: &str, title: &str, author: Option<String>) -> Option<ParsedItem> {
    let title = title.trim();
    let (identity, slug) = match canonical_post(url) {
        Some(found) => found,
        None if !url.trim().is_empty() => (url.trim().to_string(), String::new()),
        None => return None,
    };
    let display = if title.is_empty() { identity.clone() } else { title.to_string() };

    Some(
        ParsedItem::new(identity.clone(), display)
            .with_attribute("url", identity)
            .with_attribute("author", author.unwrap_or(slug)),
    )
}

/// `{"result": {"items": [...]}}` or `{"contents": [...]}`.
fn parse_json(content: &str) -> ParseResult<ParsedItem> {
    let document = json_document(content)?;
    let list = document
        .pointer("/result/items")
        .or_else(|| document.get("contents"))
        .or_else(|| document.get("items"))
        .and_then(Value::as_array)
        .ok_or_else(|| ParseMiss::NoMatch("no item list".to_string()))?;

    Ok(list
        .iter()
        .filter_map(|entry| {
            let url = str_field(entry, &["url", "titleUrl", "link"])?;
            let title = str_field(entry, &["title", "name"]).unwrap_or_default();
            let author = str_field(entry, &["author", "blogName", "cafeName"]).map(str::to_string);
            post_item(url, title, author)
        })
        .collect())
}

fn parse_dom_primary(content: &str) -> ParseResult<ParsedItem> {
    let document = Html::parse_document(content);
    Ok(document
        .select(&PRIMARY_ITEM)
        .filter_map(|item| {
            let title = item.select(&PRIMARY_TITLE).next()?;
            let href = title.value().attr("href")?;
            let author = item
                .select(&PRIMARY_AUTHOR)
                .next()
                .map(|el| element_text(&el))
                .filter(|a| !a.is_empty());
            post_item(href, &element_text(&title), author)
        })
        .collect())
}

/// Any anchor pointing at a post permalink. Thumbnail and title links to
/// the same post both count.
fn parse_dom_fallback(content: &str) -> ParseResult<ParsedItem> {
    let document = Html::parse_document(content);
    Ok(document
        .select(&FALLBACK_LINK)
        .filter_map(|link: ElementRef<'_>| {
            let href = link.value().attr("href")?;
            canonical_post(href)?;
            post_item(href, &element_text(&link), None)
        })
        .collect())
}

fn parse_text_urls(content: &str) -> ParseResult<ParsedItem> {
    let items: Vec<ParsedItem> = POST_URL
        .find_iter(content)
        .filter_map(|m| post_item(m.as_str(), "", None))
        .collect();
    if items.is_empty() {
        return Err(ParseMiss::NoMatch("no post urls in text".to_string()));
    }
    Ok(items)
}
