//! Paid search listing surface.

use std::sync::Arc;
use std::time::Duration;

use adledger_browser::{DeviceProfile, FetchOptions, PageFetcher};
use adledger_core::{RankPlatform, ScrapingConfig};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;

use crate::cascade::{fetch_and_parse, Strategy};
use crate::embedded::{json_document, str_field};
use crate::error::{ParseMiss, ParseResult};
use crate::item::{assign_ranks, ParsedItem, RankedItem, RankingSource};
use crate::query::build_surface_url;
use crate::snapshot::SnapshotWriter;
use crate::text::{element_text, text_lines};

static PRIMARY_ITEM: Lazy<Selector> =
    Lazy::new(|| Selector::parse("li.lst").expect("ad item selector is hardcoded and valid"));
static PRIMARY_TITLE: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("a.lnk_tit, a.tit_wrap").expect("ad title selector is hardcoded and valid")
});
static PRIMARY_URL: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("a.url, span.url").expect("ad url selector is hardcoded and valid")
});
static DESCRIPTION: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".ad_dsc, .dsc").expect("ad description selector is hardcoded and valid")
});
static ANY_ITEM: Lazy<Selector> =
    Lazy::new(|| Selector::parse("li").expect("li selector is hardcoded and valid"));
static CLICK_LINK: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"a[href*="adcr.naver.com"]"#).expect("ad click selector is hardcoded and valid")
});

/// Bare display domain as shown under an ad title.
static DISPLAY_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:https?://)?(?:www\.)?((?:[a-z0-9-]+\.)+(?:co\.kr|or\.kr|com|kr|net|org|clinic))(?:/\S*)?$")
        .expect("display url regex is hardcoded and valid")
});

const CASCADE: [Strategy<ParsedItem>; 4] = [
    Strategy::new("ad-json", parse_json),
    Strategy::new("ad-dom-primary", parse_dom_primary),
    Strategy::new("ad-dom-fallback", parse_dom_fallback),
    Strategy::new("ad-text-display-urls", parse_text_display_urls),
];

/// Ranks advertisers in the paid listing for a keyword.
pub struct AdScraper {
    fetcher: Arc<dyn PageFetcher>,
    url_template: String,
    render_wait: Duration,
    snapshots: SnapshotWriter,
}

impl AdScraper {
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: &ScrapingConfig) -> Self {
        Self {
            fetcher,
            url_template: config.ad_url.clone(),
            render_wait: Duration::from_millis(config.render_wait_ms),
            snapshots: SnapshotWriter::new(config.snapshot_dir.clone()),
        }
    }
}

#[async_trait::async_trait]
impl RankingSource for AdScraper {
    fn platform(&self) -> RankPlatform {
        RankPlatform::Ad
    }

    async fn get_rankings(&self, keyword: &str) -> Vec<RankedItem> {
        let url = build_surface_url(&self.url_template, keyword);
        // The ad list is server-rendered; scrolling adds nothing.
        let options = FetchOptions::rendered(DeviceProfile::Desktop, 0, self.render_wait);
        fetch_and_parse(
            self.fetcher.as_ref(),
            &url,
            &options,
            &CASCADE,
            &self.snapshots,
            "ad",
            keyword,
        )
        .await
        .map(assign_ranks)
        .unwrap_or_default()
    }
}

/// Advertiser identity: the display domain when one is recognisable.
fn display_domain(text: &str) -> Option<String> {
    let lower = text.trim().to_ascii_lowercase();
    let caps = DISPLAY_URL.captures(&lower)?;
    let domain = caps[1].to_string();
    (!domain.ends_with("naver.com")).then_some(domain)
}

fn ad_item(title: &str, display_url: &str, description: Option<String>) -> Option<ParsedItem> {
    let title = title.trim();
    let domain = display_domain(display_url);
    let identity = domain.clone().or_else(|| (!title.is_empty()).then(|| title.to_string()))?;
    let display = if title.is_empty() { identity.clone() } else { title.to_string() };

    Some(
        ParsedItem::new(identity, display)
            .with_attribute("display_url", domain.unwrap_or_default())
            .with_attribute("description", description.unwrap_or_default()),
    )
}

/// `{"ads": [{"title", "displayUrl", "advertiser"}]}`.
fn parse_json(content: &str) -> ParseResult<ParsedItem> {
    let document = json_document(content)?;
    let ads = document
        .get("ads")
        .or_else(|| document.pointer("/result/ads"))
        .and_then(Value::as_array)
        .ok_or_else(|| ParseMiss::NoMatch("no ads list".to_string()))?;

    Ok(ads
        .iter()
        .filter_map(|ad| {
            let title = str_field(ad, &["title", "headline"]).unwrap_or_default();
            let url = str_field(ad, &["displayUrl", "url"]).unwrap_or_default();
            let item = ad_item(title, url, str_field(ad, &["description"]).map(str::to_string))?;
            Some(match str_field(ad, &["advertiser"]) {
                Some(advertiser) => item.with_attribute("advertiser", advertiser),
                None => item,
            })
        })
        .collect())
}

fn parse_dom_primary(content: &str) -> ParseResult<ParsedItem> {
    let document = Html::parse_document(content);
    Ok(document
        .select(&PRIMARY_ITEM)
        .filter_map(|item| {
            let title = item.select(&PRIMARY_TITLE).next().map(|el| element_text(&el))?;
            let url = item
                .select(&PRIMARY_URL)
                .next()
                .map(|el| element_text(&el))
                .unwrap_or_default();
            let description = item.select(&DESCRIPTION).next().map(|el| element_text(&el));
            ad_item(&title, &url, description)
        })
        .collect())
}

/// Any list entry carrying an ad click-tracking link, innermost first.
fn parse_dom_fallback(content: &str) -> ParseResult<ParsedItem> {
    let document = Html::parse_document(content);
    Ok(document
        .select(&ANY_ITEM)
        .filter(|li| li.select(&ANY_ITEM).next().is_none())
        .filter_map(|li| {
            let link = li.select(&CLICK_LINK).next()?;
            let title = element_text(&link);
            let url = li
                .select(&PRIMARY_URL)
                .next()
                .map(|el| element_text(&el))
                .or_else(|| {
                    text_lines(&li.html())
                        .into_iter()
                        .find(|line| display_domain(line).is_some())
                })
                .unwrap_or_default();
            ad_item(&title, &url, None)
        })
        .collect())
}

fn parse_text_display_urls(content: &str) -> ParseResult<ParsedItem> {
    let lines = text_lines(content);
    let items: Vec<ParsedItem> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| display_domain(line).is_some())
        .filter_map(|(i, line)| {
            let title = i.checked_sub(1).map_or("", |prev| lines[prev].as_str());
            let title = if display_domain(title).is_some() { "" } else { title };
            ad_item(title, line, None)
        })
        .collect();
    if items.is_empty() {
        return Err(ParseMiss::NoMatch("no display urls in text".to_string()));
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_domain() {
        assert_eq!(display_domain("www.smile-dental.co.kr").as_deref(), Some("smile-dental.co.kr"));
        assert_eq!(display_domain("https://Clinic.com/implant").as_deref(), Some("clinic.com"));
        assert!(display_domain("blog.naver.com").is_none());
        assert!(display_domain("임플란트 잘하는 곳").is_none());
    }

    #[test]
    fn test_json_ads() {
        let json = r#"{"ads": [
            {"title": "강남 임플란트 전문", "displayUrl": "www.gangnam-dent.co.kr", "advertiser": "강남치과"},
            {"title": "No domain ad"}
        ]}"#;

        let items = parse_json(json).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].identity, "gangnam-dent.co.kr");
        assert_eq!(items[0].attributes["advertiser"], "강남치과");
        assert_eq!(items[1].identity, "No domain ad");
    }

    #[test]
    fn test_dom_primary() {
        let html = r#"<ul class="lst_type">
            <li class="lst"><a class="lnk_tit">임플란트 할인</a><a class="url">www.first.co.kr</a>
                <p class="ad_dsc">상담 무료</p></li>
            <li class="lst"><a class="lnk_tit">두번째 광고</a><a class="url">second.com</a></li>
        </ul>"#;

        let items = parse_dom_primary(html).unwrap();
        assert_eq!(items[0].identity, "first.co.kr");
        assert_eq!(items[0].attributes["description"], "상담 무료");
        assert_eq!(items[1].identity, "second.com");
    }

    #[test]
    fn test_dom_fallback() {
        let html = r#"<ul>
            <li><a href="https://adcr.naver.com/adcr?x=1">Implant Center</a><span>implant.kr</span></li>
            <li><a href="https://example.org">organic</a></li>
        </ul>"#;

        let items = parse_dom_fallback(html).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].identity, "implant.kr");
        assert_eq!(items[0].display_name, "Implant Center");
    }

    #[test]
    fn test_text_display_urls() {
        let text = "<div><p>튼튼치과 임플란트</p><p>www.teunteun.co.kr</p><p>other text</p></div>";
        let items = parse_text_display_urls(text).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].display_name, "튼튼치과 임플란트");
    }
}
