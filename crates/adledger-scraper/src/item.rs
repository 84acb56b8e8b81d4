//! Ranked result types shared by every surface scraper.

use adledger_core::RankPlatform;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An item recovered by a parse strategy, before ranking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedItem {
    /// Stable identity on the surface (place id, post URL, advertiser domain)
    pub identity: String,
    /// Name as presented to the searcher
    pub display_name: String,
    /// Surface-specific extras (category, address, author, ...)
    pub attributes: BTreeMap<String, String>,
}

impl ParsedItem {
    /// Create an item with no attributes.
    pub fn new(identity: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            display_name: display_name.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Attach an attribute, skipping blank values.
    #[must_use]
    pub fn with_attribute(mut self, key: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        let value = value.trim();
        if !value.is_empty() {
            self.attributes.insert(key.to_string(), value.to_string());
        }
        self
    }
}

/// A parsed item with its 1-indexed presentation position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedItem {
    /// Position in presentation order, starting at 1
    pub rank: u32,
    /// Stable identity on the surface
    pub identity: String,
    /// Name as presented to the searcher
    pub display_name: String,
    /// Surface-specific extras
    pub attributes: BTreeMap<String, String>,
}

/// Assign ranks by presentation order. Duplicates are kept.
#[must_use]
pub fn assign_ranks(items: Vec<ParsedItem>) -> Vec<RankedItem> {
    items
        .into_iter()
        .zip(1u32..)
        .map(|(item, rank)| RankedItem {
            rank,
            identity: item.identity,
            display_name: item.display_name,
            attributes: item.attributes,
        })
        .collect()
}

/// A search surface that produces ranked results for a keyword.
///
/// Implementations never fail; an unreachable or unparseable surface
/// yields an empty list.
#[async_trait::async_trait]
pub trait RankingSource: Send + Sync {
    /// Surface this source captures.
    fn platform(&self) -> RankPlatform;

    /// Ranked results for `keyword`, in presentation order.
    async fn get_rankings(&self, keyword: &str) -> Vec<RankedItem>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranks_are_one_indexed_and_keep_duplicates() {
        let ranked = assign_ranks(vec![
            ParsedItem::new("a", "Alpha"),
            ParsedItem::new("b", "Beta"),
            ParsedItem::new("a", "Alpha"),
        ]);

        let ranks: Vec<_> = ranked.iter().map(|r| (r.rank, r.identity.as_str())).collect();
        assert_eq!(ranks, vec![(1, "a"), (2, "b"), (3, "a")]);
    }

    #[test]
    fn test_blank_attributes_skipped() {
        let item = ParsedItem::new("1", "Clinic")
            .with_attribute("address", "  ")
            .with_attribute("category", " 치과 ");
        assert_eq!(item.attributes.len(), 1);
        assert_eq!(item.attributes["category"], "치과");
    }
}
