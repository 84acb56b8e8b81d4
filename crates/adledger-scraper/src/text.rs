//! Plain-text views of fetched content for heuristic strategies.

use scraper::Html;

/// Visible text of the content, one trimmed non-empty line per text run.
pub(crate) fn text_lines(content: &str) -> Vec<String> {
    let document = Html::parse_document(content);
    document
        .root_element()
        .text()
        .flat_map(str::lines)
        .map(collapse_whitespace)
        .filter(|line| !line.is_empty())
        .collect()
}

/// Trim and collapse internal whitespace runs to a single space.
pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Concatenated text of an element, whitespace-collapsed.
pub(crate) fn element_text(element: &scraper::ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<Vec<_>>().join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_lines_skip_markup_and_blanks() {
        let lines = text_lines("<div><b>  Alpha   Clinic </b>\n\n<p>서울 강남구</p></div>");
        assert_eq!(lines, vec!["Alpha Clinic", "서울 강남구"]);
    }

    #[test]
    fn test_text_lines_plain_text() {
        let lines = text_lines("first line\nsecond line\n");
        assert_eq!(lines, vec!["first line", "second line"]);
    }
}
