//! Ordered parse strategies with first-success-wins semantics.

use adledger_browser::{FetchOptions, PageFetcher};

use crate::error::ParseResult;
use crate::snapshot::SnapshotWriter;

/// A named parse strategy over raw content.
pub struct Strategy<T> {
    /// Label used in logs
    pub name: &'static str,
    /// Parser; an empty `Ok` counts as a miss
    pub parse: fn(&str) -> ParseResult<T>,
}

impl<T> Strategy<T> {
    /// Pair a label with a parser.
    pub const fn new(name: &'static str, parse: fn(&str) -> ParseResult<T>) -> Self {
        Self { name, parse }
    }
}

/// Run strategies in order and return the first non-empty result.
///
/// Returns `None` when every strategy misses.
pub fn run_cascade<T>(content: &str, strategies: &[Strategy<T>]) -> Option<(&'static str, Vec<T>)> {
    for strategy in strategies {
        match (strategy.parse)(content) {
            Ok(items) if !items.is_empty() => {
                tracing::debug!("Strategy {} yielded {} items", strategy.name, items.len());
                return Some((strategy.name, items));
            }
            Ok(_) => tracing::debug!("Strategy {} yielded nothing", strategy.name),
            Err(miss) => tracing::debug!("Strategy {} missed: {}", strategy.name, miss),
        }
    }
    None
}

/// Fetch `url` and run the cascade over it.
///
/// `None` when the fetch came back empty or every strategy missed; in the
/// latter case the raw content is snapshotted under `surface`.
pub(crate) async fn fetch_and_parse<T>(
    fetcher: &dyn PageFetcher,
    url: &str,
    options: &FetchOptions,
    strategies: &[Strategy<T>],
    snapshots: &SnapshotWriter,
    surface: &str,
    keyword: &str,
) -> Option<Vec<T>> {
    let Some(content) = fetcher.fetch(url, options).await else {
        tracing::info!("No {} content for '{}'", surface, keyword);
        return None;
    };

    match run_cascade(&content, strategies) {
        Some((strategy, items)) => {
            tracing::info!(
                "Parsed {} {} results for '{}' via {}",
                items.len(),
                surface,
                keyword,
                strategy
            );
            Some(items)
        }
        None => {
            tracing::warn!(
                "All {} parse strategies missed for '{}' ({} bytes)",
                surface,
                keyword,
                content.len()
            );
            snapshots.save(surface, keyword, &content).await;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseMiss;

    fn always_miss(_: &str) -> ParseResult<u32> {
        Err(ParseMiss::NoMatch("nothing here".to_string()))
    }

    fn always_empty(_: &str) -> ParseResult<u32> {
        Ok(vec![])
    }

    fn digits(content: &str) -> ParseResult<u32> {
        Ok(content.chars().filter_map(|c| c.to_digit(10)).collect())
    }

    fn never_reached(_: &str) -> ParseResult<u32> {
        panic!("cascade should stop at the first success");
    }

    #[test]
    fn test_first_success_wins() {
        let strategies = [
            Strategy::new("miss", always_miss),
            Strategy::new("empty", always_empty),
            Strategy::new("digits", digits),
            Strategy::new("later", never_reached),
        ];

        let (name, items) = run_cascade("a1b2", &strategies).expect("digits strategy");
        assert_eq!(name, "digits");
        assert_eq!(items, vec![1, 2]);
    }

    #[test]
    fn test_all_miss_returns_none() {
        let strategies = [
            Strategy::new("miss", always_miss),
            Strategy::new("digits", digits),
        ];
        assert!(run_cascade("no digits", &strategies).is_none());
    }
}
