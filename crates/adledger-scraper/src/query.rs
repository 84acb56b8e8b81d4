//! Surface URL construction.

use chrono::NaiveDate;

/// Fill the `{query}` placeholder of a surface URL template with the
/// form-encoded keyword.
pub fn build_surface_url(template: &str, keyword: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(keyword.trim().as_bytes()).collect();
    template.replace("{query}", &encoded)
}

/// Fill the `{date}` placeholder of a report URL template with an ISO date.
pub fn build_report_url(template: &str, date: NaiveDate) -> String {
    template.replace("{date}", &date.format("%Y-%m-%d").to_string())
}
