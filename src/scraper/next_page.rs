//! "Next page" link detection. The absence of a match is the only end-of-chapter signal.

use scraper::{ElementRef, Html, Selector};

/// The anchor accepted as the next-page control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextLink {
    pub href: Option<String>,
    pub text: String,
}

fn is_next_anchor(a: &ElementRef<'_>) -> bool {
    let text = a.text().collect::<String>();
    let text = text.trim();
    let lower = text.to_lowercase();
    if lower == "next" || lower.contains("next »") || text == "»" {
        return true;
    }
    let class = a.value().attr("class").unwrap_or("").to_lowercase();
    if class.contains("pager-next") || class.contains("b-pager-next") {
        return true;
    }
    let title = a.value().attr("title").unwrap_or("").to_lowercase();
    title.contains("next page")
}

/// First anchor in document order that looks like a "next page" control.
pub fn find_next_page(doc: &Html) -> Option<NextLink> {
    let sel = Selector::parse("a").ok()?;
    doc.select(&sel).find(is_next_anchor).map(|a| NextLink {
        href: a.value().attr("href").map(String::from),
        text: a.text().collect::<String>().trim().to_string(),
    })
}
