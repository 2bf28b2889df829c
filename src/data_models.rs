use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

pub const HTML_VERSION_UNKNOWN: &str = "Unknown";

/// Per level heading counters. All six levels are always present.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeadingCounts {
    pub h1: usize,
    pub h2: usize,
    pub h3: usize,
    pub h4: usize,
    pub h5: usize,
    pub h6: usize,
}

impl HeadingCounts {
    /// Bumps the counter for a tag name like `h3`. Anything else is ignored.
    pub fn increment(&mut self, tag: &str) -> bool {
        let counter = match tag {
            "h1" => &mut self.h1,
            "h2" => &mut self.h2,
            "h3" => &mut self.h3,
            "h4" => &mut self.h4,
            "h5" => &mut self.h5,
            "h6" => &mut self.h6,
            _ => return false,
        };
        *counter += 1;
        true
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub url: String,
    pub is_internal: bool,
}

/// Everything pulled out of a page in one pass over its markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPage {
    pub html_version: String,
    pub title: String,
    pub headings: HeadingCounts,
    /// Every http(s) anchor in document order, duplicates included.
    pub links: Vec<Link>,
    pub has_login_form: bool,
}

impl Default for ParsedPage {
    fn default() -> Self {
        ParsedPage {
            html_version: HTML_VERSION_UNKNOWN.to_string(),
            title: "".to_string(),
            headings: HeadingCounts::default(),
            links: vec![],
            has_login_form: false,
        }
    }
}

impl ParsedPage {
    /// Unique link urls in first seen order, at most `cap` of them.
    pub fn link_set(&self, cap: usize) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.links
            .iter()
            .filter(|link| seen.insert(link.url.as_str()))
            .take(cap)
            .map(|link| link.url.clone())
            .collect()
    }

    pub fn internal_count(&self) -> usize {
        self.links.iter().filter(|l| l.is_internal).count()
    }

    pub fn external_count(&self) -> usize {
        self.links.len() - self.internal_count()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub internal_count: usize,
    pub external_count: usize,
    pub inaccessible_count: usize,
}

/// Final report handed back to the caller.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AnalysisResult {
    pub url: String,
    pub html_version: String,
    pub title: String,
    pub headings: HeadingCounts,
    pub links: LinkStats,
    pub has_login_form: bool,
}

impl AnalysisResult {
    pub fn new(url: String, page: ParsedPage, inaccessible_count: usize) -> AnalysisResult {
        let links = LinkStats {
            internal_count: page.internal_count(),
            external_count: page.external_count(),
            inaccessible_count,
        };
        AnalysisResult {
            url,
            html_version: page.html_version,
            title: page.title,
            headings: page.headings,
            links,
            has_login_form: page.has_login_form,
        }
    }
}

/// JSON body returned on failure.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
    pub status_code: u16,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(status: StatusCode, message: impl Into<String>) -> ErrorResponse {
        ErrorResponse {
            error: status.canonical_reason().unwrap_or("Unknown").to_string(),
            status_code: status.as_u16(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(url: &str, is_internal: bool) -> Link {
        Link {
            url: url.to_string(),
            is_internal,
        }
    }

    #[test]
    fn test_heading_counts_serialize_all_levels() {
        let mut headings = HeadingCounts::default();
        headings.increment("h1");
        headings.increment("h1");
        headings.increment("h2");
        assert!(!headings.increment("header"));

        let json = serde_json::to_value(headings).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"h1": 2, "h2": 1, "h3": 0, "h4": 0, "h5": 0, "h6": 0})
        );
    }

    #[test]
    fn test_link_set_dedups_in_order_and_caps() {
        let page = ParsedPage {
            links: vec![
                link("https://example.com/b", true),
                link("https://other.com/", false),
                link("https://example.com/b", true),
                link("https://example.com/a", true),
            ],
            ..ParsedPage::default()
        };

        assert_eq!(
            page.link_set(10),
            vec![
                "https://example.com/b",
                "https://other.com/",
                "https://example.com/a"
            ]
        );
        assert_eq!(page.link_set(2).len(), 2);
        assert_eq!(page.internal_count(), 3);
        assert_eq!(page.external_count(), 1);
    }

    #[test]
    fn test_analysis_result_json_shape() {
        let page = ParsedPage {
            html_version: "HTML5".to_string(),
            title: "Example".to_string(),
            links: vec![link("https://example.com/", true), link("https://x.org/", false)],
            ..ParsedPage::default()
        };
        let result = AnalysisResult::new("https://example.com".to_string(), page, 1);
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["html_version"], "HTML5");
        assert_eq!(json["links"]["internal_count"], 1);
        assert_eq!(json["links"]["external_count"], 1);
        assert_eq!(json["links"]["inaccessible_count"], 1);
        assert_eq!(json["has_login_form"], false);
        assert_eq!(json["headings"].as_object().unwrap().len(), 6);
    }

    #[test]
    fn test_error_response_uses_reason_phrase() {
        let body = ErrorResponse::new(StatusCode::BAD_GATEWAY, "nope");
        assert_eq!(body.error, "Bad Gateway");
        assert_eq!(body.status_code, 502);
    }
}
