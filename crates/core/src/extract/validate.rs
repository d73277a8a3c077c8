use crate::domain::ticker::Ticker;
use crate::extract::PageContent;

const ERROR_MARKERS: [&str; 3] = ["NOT FOUND", "ERROR", "404"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCheck {
    pub valid: bool,
    /// Upper-cased title text, when the page has a title.
    pub title: Option<String>,
}

/// A page is a listing page when it has a title free of error markers.
pub fn validate_page(page: &PageContent<'_>) -> PageCheck {
    let Some(title) = page.title().map(|t| t.to_uppercase()) else {
        return PageCheck {
            valid: false,
            title: None,
        };
    };
    let valid = !ERROR_MARKERS.iter().any(|marker| title.contains(marker));
    PageCheck {
        valid,
        title: Some(title),
    }
}

/// Weak proof the page belongs to `ticker`: the symbol, with or without dots, is in the title.
pub fn ticker_in_title(title: &str, ticker: &Ticker) -> bool {
    let title = title.to_uppercase();
    title.contains(ticker.as_str()) || title.contains(&ticker.without_dots())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_titles_fail_regardless_of_body() {
        let page = PageContent::parse(
            "<html><head><title>404 Error</title></head><body>AAPL Strong Buy</body></html>",
        );
        let check = validate_page(&page);
        assert!(!check.valid);
        assert_eq!(check.title.as_deref(), Some("404 ERROR"));

        let not_found = PageContent::parse("<title>Page not found</title>");
        assert!(!validate_page(&not_found).valid);
    }

    #[test]
    fn missing_title_is_invalid() {
        let page = PageContent::parse("<html><body>hello</body></html>");
        assert_eq!(
            validate_page(&page),
            PageCheck {
                valid: false,
                title: None
            }
        );
    }

    #[test]
    fn ticker_matches_with_or_without_dots() {
        let brk = Ticker::normalize("brk.b");
        assert!(ticker_in_title("BERKSHIRE HATHAWAY (BRKB) STOCK", &brk));
        assert!(ticker_in_title("brk.b quote", &brk));
        assert!(!ticker_in_title("APPLE INC", &Ticker::normalize("MSFT")));
    }
}
