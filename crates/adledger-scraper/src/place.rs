//! Local-business listing surface.

use std::sync::Arc;
use std::time::Duration;

use adledger_browser::{DeviceProfile, FetchOptions, PageFetcher};
use adledger_core::{RankPlatform, ScrapingConfig};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

use crate::cascade::{fetch_and_parse, Strategy};
use crate::embedded::{assigned_object, id_field, json_document, str_field};
use crate::error::{ParseMiss, ParseResult};
use crate::item::{assign_ranks, ParsedItem, RankedItem, RankingSource};
use crate::query::build_surface_url;
use crate::snapshot::SnapshotWriter;
use crate::text::{element_text, text_lines};

static PRIMARY_ITEM: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("li.UEzoS, li.VLTHu, li.DWs4Q").expect("place item selector is hardcoded and valid")
});
static PRIMARY_NAME: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("span.TYaxT, span.YwYLL, span.place_bluelink")
        .expect("place name selector is hardcoded and valid")
});
static PRIMARY_CATEGORY: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("span.KCMnt, span.YzBgS").expect("place category selector is hardcoded and valid")
});
static PRIMARY_ADDRESS: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("span.Pb4bU, span.LDgIH").expect("place address selector is hardcoded and valid")
});
static FALLBACK_ITEM: Lazy<Selector> =
    Lazy::new(|| Selector::parse("li[data-id]").expect("data-id selector is hardcoded and valid"));
static PLACE_LINK: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(r#"a[href*="/place/"]"#).expect("place link selector is hardcoded and valid")
});

static PLACE_ID_IN_HREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/place/(\d+)").expect("place id regex is hardcoded and valid"));

/// Korean street or lot address: province, then a city/county/district,
/// then a road, street or neighbourhood token.
static KOREAN_ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(서울|부산|대구|인천|광주|대전|울산|세종|경기|강원|충북|충남|충청|전북|전남|전라|경북|경남|경상|제주)\S*\s+\S+(시|군|구)(\s+\S+(시|군|구))?\s+\S+(로|길|동|읍|면|리)(\s|\d|$)",
    )
    .expect("address regex is hardcoded and valid")
});

const STRUCTURED: [Strategy<ParsedItem>; 2] = [
    Strategy::new("place-search-json", parse_search_json),
    Strategy::new("place-apollo-state", parse_apollo_state),
];

const CASCADE: [Strategy<ParsedItem>; 5] = [
    Strategy::new("place-search-json", parse_search_json),
    Strategy::new("place-apollo-state", parse_apollo_state),
    Strategy::new("place-dom-primary", parse_dom_primary),
    Strategy::new("place-dom-fallback", parse_dom_fallback),
    Strategy::new("place-text-address", parse_text_addresses),
];

/// Ranks businesses in the local listing for a keyword.
///
/// Tries the JSON search endpoint first and falls back to the rendered
/// mobile list page when it yields nothing.
pub struct PlaceScraper {
    fetcher: Arc<dyn PageFetcher>,
    search_url: String,
    list_url: String,
    scroll_steps: u32,
    render_wait: Duration,
    snapshots: SnapshotWriter,
}

impl PlaceScraper {
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: &ScrapingConfig) -> Self {
        Self {
            fetcher,
            search_url: config.place_url.clone(),
            list_url: config.place_list_url.clone(),
            scroll_steps: config.scroll_steps,
            render_wait: Duration::from_millis(config.render_wait_ms),
            snapshots: SnapshotWriter::new(config.snapshot_dir.clone()),
        }
    }
}

#[async_trait::async_trait]
impl RankingSource for PlaceScraper {
    fn platform(&self) -> RankPlatform {
        RankPlatform::Place
    }

    async fn get_rankings(&self, keyword: &str) -> Vec<RankedItem> {
        let json_url = build_surface_url(&self.search_url, keyword);
        let json_options = FetchOptions::json(DeviceProfile::Mobile);
        if let Some(items) = fetch_and_parse(
            self.fetcher.as_ref(),
            &json_url,
            &json_options,
            &STRUCTURED,
            &self.snapshots,
            "place-json",
            keyword,
        )
        .await
        {
            return assign_ranks(items);
        }

        tracing::debug!("Place JSON endpoint empty for '{}', trying list page", keyword);
        let list_url = build_surface_url(&self.list_url, keyword);
        let list_options =
            FetchOptions::rendered(DeviceProfile::Mobile, self.scroll_steps, self.render_wait);
        fetch_and_parse(
            self.fetcher.as_ref(),
            &list_url,
            &list_options,
            &CASCADE,
            &self.snapshots,
            "place",
            keyword,
        )
        .await
        .map(assign_ranks)
        .unwrap_or_default()
    }
}

fn place_from_json(value: &Value) -> Option<ParsedItem> {
    let name = str_field(value, &["name", "title"])?;
    let identity = id_field(value, &["id", "placeId", "sid"]).unwrap_or_else(|| name.to_string());

    let category = match value.get("category") {
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(","),
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    };
    let address = str_field(value, &["roadAddress", "address", "fullAddress"]).unwrap_or_default();

    Some(
        ParsedItem::new(identity, name)
            .with_attribute("category", category)
            .with_attribute("address", address)
            .with_attribute("phone", str_field(value, &["tel", "phone"]).unwrap_or_default()),
    )
}

/// `{"result": {"place": {"list": [...]}}}` from the map search endpoint.
fn parse_search_json(content: &str) -> ParseResult<ParsedItem> {
    let document = json_document(content)?;
    let list = document
        .pointer("/result/place/list")
        .and_then(Value::as_array)
        .ok_or_else(|| ParseMiss::NoMatch("no result.place.list".to_string()))?;

    Ok(list.iter().filter_map(place_from_json).collect())
}

/// Server-rendered Apollo cache on the list page. The ordered list lives
/// under `ROOT_QUERY` as `__ref` pointers into the normalised entries.
fn parse_apollo_state(content: &str) -> ParseResult<ParsedItem> {
    let state = assigned_object(content, "window.__APOLLO_STATE__")?;
    let root = state
        .get("ROOT_QUERY")
        .and_then(Value::as_object)
        .ok_or_else(|| ParseMiss::NoMatch("no ROOT_QUERY".to_string()))?;

    for field in root.values() {
        let Some(refs) = field.get("items").and_then(Value::as_array) else {
            continue;
        };
        let items: Vec<ParsedItem> = refs
            .iter()
            .filter_map(|r| r.get("__ref").and_then(Value::as_str))
            .filter_map(|key| state.get(key))
            .filter(|entry| {
                entry
                    .get("__typename")
                    .and_then(Value::as_str)
                    .is_some_and(|t| t.ends_with("Summary"))
            })
            .filter_map(place_from_json)
            .collect();
        if !items.is_empty() {
            return Ok(items);
        }
    }

    Err(ParseMiss::NoMatch("no summary list in Apollo state".to_string()))
}

fn first_text(item: &ElementRef<'_>, selector: &Selector) -> Option<String> {
    item.select(selector)
        .next()
        .map(|el| element_text(&el))
        .filter(|text| !text.is_empty())
}

fn place_id_from(item: &ElementRef<'_>) -> Option<String> {
    if let Some(id) = item.value().attr("data-id").filter(|id| !id.is_empty()) {
        return Some(id.to_string());
    }
    let href = item
        .select(&PLACE_LINK)
        .next()
        .and_then(|a| a.value().attr("href"))
        .or_else(|| item.value().attr("href"))?;
    PLACE_ID_IN_HREF
        .captures(href)
        .map(|caps| caps[1].to_string())
}

fn parse_dom_primary(content: &str) -> ParseResult<ParsedItem> {
    let document = Html::parse_document(content);
    let items = document
        .select(&PRIMARY_ITEM)
        .filter_map(|item| {
            let name = first_text(&item, &PRIMARY_NAME)?;
            let identity = place_id_from(&item).unwrap_or_else(|| name.clone());
            Some(
                ParsedItem::new(identity, name)
                    .with_attribute(
                        "category",
                        first_text(&item, &PRIMARY_CATEGORY).unwrap_or_default(),
                    )
                    .with_attribute(
                        "address",
                        first_text(&item, &PRIMARY_ADDRESS).unwrap_or_default(),
                    ),
            )
        })
        .collect();
    Ok(items)
}

/// Class-agnostic: `li[data-id]` entries, else bare place links.
fn parse_dom_fallback(content: &str) -> ParseResult<ParsedItem> {
    let document = Html::parse_document(content);

    let tagged: Vec<ParsedItem> = document
        .select(&FALLBACK_ITEM)
        .filter_map(|item| {
            let id = item.value().attr("data-id")?.trim();
            let name = item
                .select(&PRIMARY_NAME)
                .next()
                .or_else(|| item.select(&PLACE_LINK).next())
                .map(|el| element_text(&el))
                .filter(|name| !name.is_empty())?;
            (!id.is_empty()).then(|| ParsedItem::new(id, name))
        })
        .collect();
    if !tagged.is_empty() {
        return Ok(tagged);
    }

    Ok(document
        .select(&PLACE_LINK)
        .filter_map(|link| {
            let name = element_text(&link);
            if name.is_empty() {
                return None;
            }
            let identity = place_id_from(&link).unwrap_or_else(|| name.clone());
            Some(ParsedItem::new(identity, name))
        })
        .collect())
}

/// Last resort: each address line is attributed to the nearest preceding
/// line that looks like a business name.
fn parse_text_addresses(content: &str) -> ParseResult<ParsedItem> {
    let lines = text_lines(content);
    let mut items = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        if !KOREAN_ADDRESS.is_match(line) {
            continue;
        }
        let name = lines[..i]
            .iter()
            .rev()
            .take(3)
            .find(|candidate| looks_like_name(candidate));
        if let Some(name) = name {
            items.push(ParsedItem::new(name.clone(), name.clone()).with_attribute("address", line.clone()));
        }
    }

    if items.is_empty() {
        return Err(ParseMiss::NoMatch("no address lines".to_string()));
    }
    Ok(items)
}

fn looks_like_name(line: &str) -> bool {
    let chars = line.chars().count();
    (2..=40).contains(&chars)
        && !KOREAN_ADDRESS.is_match(line)
        && line.chars().any(char::is_alphabetic)
}
